use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tch::nn;
use textclf_core::safetensors_util::load_safetensors;
use textclf_core::ModelConfig;
use tokenizer::{Vocab, WordTokenizer};

use crate::checkpoint::{BestCheckpoint, MODEL_CONFIG_FILE};
use crate::context::RunContext;
use crate::dataset::{read_split, LabelSet, TextDataset};
use crate::metrics::EpochHistory;
use crate::notebook::{self, REPORT_FILE, RUN_REPORT_TEMPLATE};
use crate::plot::plot_history;
use crate::prepare::{prepare_data_and_model, LABELS_FILE, TEST_SPLIT, VOCAB_FILE};
use crate::report::{write_predictions_csv, ConfusionMatrix, CONFUSION_MATRIX_FILE, PREDICTIONS_FILE};
use crate::train::{evaluate, Evaluation, Trainer};
use crate::RunConfig;

pub const CONFIG_FILE: &str = "config.yaml";
const FINISH_BANNER: &str = "============Finish============";

/// What a finished training run leaves behind.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_dir: PathBuf,
    pub history: EpochHistory,
    pub best: Option<BestCheckpoint>,
}

/// Trains the configured model from scratch and writes every run artefact
/// into a new run directory.
pub fn train_run(config: RunConfig) -> Result<RunOutcome> {
    let ctx = RunContext::create(config)?;
    if ctx.config.debug {
        ctx.log.line("[Debug mode]")?;
    }
    ctx.log.line(format!("args: {:?}", ctx.config))?;
    ctx.log.line(format!("device: {:?}", ctx.device))?;
    ctx.config.save_yaml(&ctx.path(CONFIG_FILE))?;

    let prepared = prepare_data_and_model(&ctx).context("failed to prepare data and model")?;
    let (outcome, prepared) = Trainer::new(&ctx, prepared)?.run()?;

    let mut sections = vec![
        notebook::overview_section(
            &ctx.config,
            &run_name(&ctx.run_dir),
            outcome.best.as_ref().map(|b| (b.epoch, b.accuracy)),
        ),
        notebook::configuration_section(&ctx.config)?,
        notebook::metrics_section(&outcome.history),
    ];

    match &outcome.best {
        Some(best) => {
            ctx.log.line(format!(
                "best test accuracy {} at epoch {}",
                best.accuracy, best.epoch
            ))?;
            let matrix = write_classification_results(
                &ctx,
                &best.predictions,
                &best.ground_truth,
                &prepared.labels,
            )?;
            sections.push(notebook::classification_section(&matrix));
        }
        None => ctx.log.line("no epoch was run; skipping classification results")?,
    }

    let figures = plot_history(&ctx.run_dir, &ctx.config.dataset, &outcome.history)
        .context("failed to plot metric curves")?;
    sections.push(notebook::figures_section(&figures));
    write_report(&ctx, &sections)?;

    ctx.log.line(FINISH_BANNER)?;
    ctx.log.line(format!(
        "total time: {}",
        ctx.started.elapsed().as_secs_f64()
    ))?;

    Ok(RunOutcome {
        run_dir: ctx.run_dir.clone(),
        history: outcome.history,
        best: outcome.best,
    })
}

/// Reloads a finished run, evaluates its checkpoint on the configured test
/// split and rewrites the prediction CSV and confusion matrix.
pub fn evaluate_run(run_dir: &Path) -> Result<Evaluation> {
    let config = RunConfig::from_yaml_file(&run_dir.join(CONFIG_FILE))?;
    let ctx = RunContext::reopen(config, run_dir)?;
    ctx.log.line(format!("re-evaluating {}", ctx.checkpoint_path().display()))?;

    let model_config_path = ctx.path(MODEL_CONFIG_FILE);
    let model_config: ModelConfig = serde_json::from_str(
        &fs::read_to_string(&model_config_path)
            .with_context(|| format!("failed to read {}", model_config_path.display()))?,
    )
    .with_context(|| format!("failed to parse {}", model_config_path.display()))?;

    let vocab = Vocab::load(ctx.path(VOCAB_FILE)).context("failed to load vocabulary")?;
    let labels = LabelSet::load(&ctx.path(LABELS_FILE)).context("failed to load labels")?;
    let tokenizer = WordTokenizer::new(vocab)?;

    let test_rows = read_split(&ctx.config.dataset_dir().join(TEST_SPLIT))?;
    let test = TextDataset::encode(&test_rows, &labels, &tokenizer, ctx.config.seq_len, ctx.device)?;

    let mut vs = nn::VarStore::new(ctx.device);
    let model = ctx.architecture.build(&vs.root(), &model_config)?;
    let restored = load_safetensors(&mut vs, ctx.checkpoint_path())
        .with_context(|| format!("failed to load {}", ctx.checkpoint_path().display()))?;
    log::debug!("restored {restored} tensors");

    let eval = evaluate(model.as_ref(), &test, ctx.config.batch_size)?;
    ctx.log.line(format!("[TEST] accumulated accuracy: {}", eval.accuracy))?;

    let matrix = write_classification_results(&ctx, &eval.predictions, &eval.ground_truth, &labels)?;
    write_report(&ctx, &[notebook::classification_section(&matrix)])?;
    ctx.log.line(FINISH_BANNER)?;
    Ok(eval)
}

fn write_classification_results(
    ctx: &RunContext,
    predictions: &[i64],
    ground_truth: &[i64],
    labels: &LabelSet,
) -> Result<ConfusionMatrix> {
    write_predictions_csv(&ctx.path(PREDICTIONS_FILE), predictions, ground_truth, labels)
        .context("failed to write prediction CSV")?;

    let matrix = ConfusionMatrix::from_predictions(predictions, ground_truth, labels)?;
    ctx.log.line(format!("confusion matrix:\n{}", matrix.to_text()))?;
    ctx.log.line(matrix.classification_report())?;
    matrix
        .write_csv(&ctx.path(CONFUSION_MATRIX_FILE))
        .context("failed to write confusion matrix")?;
    Ok(matrix)
}

fn write_report(ctx: &RunContext, sections: &[notebook::ReportSection]) -> Result<()> {
    let path = ctx.path(REPORT_FILE);
    notebook::ensure_report_file(&path, RUN_REPORT_TEMPLATE)?;
    notebook::update_sections(&path, sections)
}

fn run_name(run_dir: &Path) -> String {
    run_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
