use std::fs;
use std::path::{Path, PathBuf};

use textclf_core::ModelConfig;
use trainer::metrics::MetricFiles;
use trainer::report::PREDICTIONS_FILE;
use trainer::{evaluate_run, train_run, RunConfig};

const POSITIVE: [&str; 6] = [
    "great room and friendly staff",
    "lovely view , great breakfast",
    "friendly staff , clean room",
    "great location and lovely pool",
    "clean and friendly , would return",
    "lovely stay , great value",
];

const NEGATIVE: [&str; 6] = [
    "dirty room and rude staff",
    "awful noise , rude reception",
    "dirty bathroom , awful smell",
    "rude staff and awful food",
    "noisy , dirty and overpriced",
    "awful stay , never again",
];

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("textclf_{name}_{}", std::process::id()));
    fs::remove_dir_all(&dir).ok();
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_dataset(root: &Path, name: &str) -> usize {
    let dir = root.join("data").join(name);
    fs::create_dir_all(&dir).unwrap();

    let mut train = String::new();
    for (pos, neg) in POSITIVE.iter().zip(NEGATIVE.iter()) {
        train.push_str(&format!("pos\t{pos}\nneg\t{neg}\n"));
    }
    let test = "pos\tgreat friendly staff\nneg\trude and dirty\npos\tlovely clean room\n";
    fs::write(dir.join("train.tsv"), train).unwrap();
    fs::write(dir.join("test.tsv"), test).unwrap();
    test.lines().count()
}

fn small_config(root: &Path, model: &str) -> RunConfig {
    RunConfig {
        model: model.to_string(),
        dataset: "hotels".to_string(),
        batch_size: 4,
        epochs: 2,
        seq_len: 10,
        data_dir: root.join("data"),
        embeddings_dir: root.join("embeddings"),
        output_dir: root.join("runs"),
        network: ModelConfig {
            embedding_dim: 16,
            hidden_size: 8,
            num_filters: 6,
            kernel_sizes: vec![2, 3],
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn cnn_run_writes_every_artefact() {
    let root = scratch_dir("cnn_run");
    let test_size = write_dataset(&root, "hotels");

    let outcome = train_run(small_config(&root, "CNN_Text_Model")).unwrap();
    let history = &outcome.history;

    assert_eq!(history.train_accuracies.len(), 2);
    assert_eq!(history.train_losses.len(), 2);
    assert_eq!(history.test_accuracies.len(), 2);
    assert_eq!(history.test_losses.len(), 2);
    for s in history.summaries() {
        assert!((0.0..=1.0).contains(&s.train_accuracy));
        assert!((0.0..=1.0).contains(&s.test_accuracy));
        assert!(s.train_loss >= 0.0);
        assert!(s.test_loss >= 0.0);
    }

    let run_name = outcome.run_dir.file_name().unwrap().to_string_lossy().into_owned();
    assert!(run_name.ends_with("_hotels_random"));
    assert!(outcome.run_dir.starts_with(root.join("runs").join("CNN_Text_Model")));

    let csv = fs::read_to_string(outcome.run_dir.join(PREDICTIONS_FILE)).unwrap();
    assert_eq!(csv.lines().count(), test_size + 1);

    let test_acc = fs::read_to_string(outcome.run_dir.join(MetricFiles::TEST_ACC)).unwrap();
    assert_eq!(test_acc.lines().count(), 2);

    for file in [
        "log.txt",
        "config.yaml",
        "model_config.json",
        "vocab.json",
        "labels.json",
        "lr.txt",
        "CNN_Text_Model.safetensors",
        "confusion_matrix.csv",
        "accuracy.png",
        "loss.png",
        "report.md",
    ] {
        assert!(outcome.run_dir.join(file).exists(), "missing {file}");
    }

    let log = fs::read_to_string(outcome.run_dir.join("log.txt")).unwrap();
    assert!(log.contains("epoch: 1"));
    assert!(log.contains("[TEST] accumulated accuracy:"));
    assert!(log.contains("============Finish============"));

    let best = outcome.best.as_ref().unwrap();
    let reevaluated = evaluate_run(&outcome.run_dir).unwrap();
    assert_eq!(reevaluated.predictions.len(), test_size);
    assert!((reevaluated.accuracy - best.accuracy).abs() < 1e-6);
    assert_eq!(reevaluated.predictions, best.predictions);

    fs::remove_dir_all(&root).ok();
}

#[test]
fn bilstm_run_with_pretrained_vectors() {
    let root = scratch_dir("bilstm_run");
    write_dataset(&root, "hotels");
    let embeddings = root.join("embeddings");
    fs::create_dir_all(&embeddings).unwrap();
    fs::write(
        embeddings.join("tiny.txt"),
        "great 0.1 0.2 0.3 0.4\nrude -0.1 -0.2 -0.3 -0.4\nunrelated 1 1 1 1\n",
    )
    .unwrap();

    let mut config = small_config(&root, "BiLSTMConv");
    config.wordembedding = "tiny".to_string();
    config.epochs = 1;

    let outcome = train_run(config).unwrap();
    assert_eq!(outcome.history.len(), 1);

    let model_config: ModelConfig = serde_json::from_str(
        &fs::read_to_string(outcome.run_dir.join("model_config.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(model_config.embedding_dim, 4);
    assert_eq!(model_config.num_classes, 2);

    let log = fs::read_to_string(outcome.run_dir.join("log.txt")).unwrap();
    assert!(log.contains("2 of"));

    fs::remove_dir_all(&root).ok();
}

#[test]
fn vdcnn_run_trains_one_epoch() {
    let root = scratch_dir("vdcnn_run");
    let test_size = write_dataset(&root, "hotels");

    let mut config = small_config(&root, "VDCNN");
    config.epochs = 1;
    config.network.vdcnn_depth = 9;

    let outcome = train_run(config).unwrap();
    assert_eq!(outcome.history.len(), 1);
    assert!((0.0..=1.0).contains(&outcome.history.test_accuracies[0]));
    assert!(outcome.run_dir.join("VDCNN.safetensors").exists());

    let csv = fs::read_to_string(outcome.run_dir.join(PREDICTIONS_FILE)).unwrap();
    assert_eq!(csv.lines().count(), test_size + 1);

    fs::remove_dir_all(&root).ok();
}

#[test]
fn checkpoint_is_only_written_on_strict_improvement() {
    let root = scratch_dir("frozen_run");
    write_dataset(&root, "hotels");

    // parameters never move, so every epoch ties the first one
    let mut config = small_config(&root, "CNN_Text_Model");
    config.learning_rate = 0.0;
    config.epochs = 3;

    let outcome = train_run(config).unwrap();
    let accuracies = &outcome.history.test_accuracies;
    assert_eq!(accuracies.len(), 3);
    assert!(accuracies.iter().all(|&acc| acc == accuracies[0]));

    let best = outcome.best.as_ref().unwrap();
    assert_eq!(best.epoch, 0);

    let log = fs::read_to_string(outcome.run_dir.join("log.txt")).unwrap();
    let saves: Vec<&str> = log
        .lines()
        .filter(|line| line.starts_with("saved best checkpoint"))
        .collect();
    let expected = format!("saved best checkpoint (epoch 0, accuracy {})", best.accuracy);
    assert_eq!(saves, vec![expected.as_str()]);
    assert!(outcome.run_dir.join("CNN_Text_Model.safetensors").exists());

    fs::remove_dir_all(&root).ok();
}

#[test]
fn zero_batch_size_is_rejected_before_any_output() {
    let root = scratch_dir("zero_batch");
    write_dataset(&root, "hotels");

    let mut config = small_config(&root, "CNN_Text_Model");
    config.batch_size = 0;

    let err = train_run(config).unwrap_err();
    assert!(format!("{err:#}").contains("batch_size"));
    assert!(!root.join("runs").exists());

    fs::remove_dir_all(&root).ok();
}

#[test]
fn unknown_model_fails_before_any_output() {
    let root = scratch_dir("unknown_model");
    write_dataset(&root, "hotels");

    let err = train_run(small_config(&root, "BiGRU")).unwrap_err();
    assert!(format!("{err:#}").contains("BiGRU"));
    assert!(!root.join("runs").exists());

    fs::remove_dir_all(&root).ok();
}

#[test]
fn missing_dataset_is_reported() {
    let root = scratch_dir("missing_dataset");
    let mut config = small_config(&root, "CNN_Text_Model");
    config.dataset = "nowhere".to_string();

    let err = train_run(config).unwrap_err();
    assert!(format!("{err:#}").contains("train.tsv"));

    fs::remove_dir_all(&root).ok();
}
