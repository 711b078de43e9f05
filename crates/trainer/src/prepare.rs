use anyhow::{Context, Result};
use std::path::Path;
use tch::nn;
use textclf_core::embedding::PretrainedEmbeddings;
use textclf_core::ModelConfig;
use tokenizer::{Vocab, VocabBuilder, WordTokenizer};

use crate::context::RunContext;
use crate::dataset::{read_split, LabelSet, TextDataset};

pub const TRAIN_SPLIT: &str = "train.tsv";
pub const TEST_SPLIT: &str = "test.tsv";
pub const VOCAB_FILE: &str = "vocab.json";
pub const LABELS_FILE: &str = "labels.json";

/// Encoded splits plus the freshly built model that will train on them.
pub struct Prepared {
    pub train: TextDataset,
    pub test: TextDataset,
    pub labels: LabelSet,
    pub tokenizer: WordTokenizer,
    pub model_config: ModelConfig,
    pub vs: nn::VarStore,
    pub model: Box<dyn nn::ModuleT>,
}

/// Reads both splits, builds the vocabulary and label set from the training
/// split, encodes the texts and builds the selected architecture. Vocabulary
/// and labels are written to the run directory.
pub fn prepare_data_and_model(ctx: &RunContext) -> Result<Prepared> {
    let config = &ctx.config;
    let dataset_dir = config.dataset_dir();
    let train_rows = read_split(&dataset_dir.join(TRAIN_SPLIT))?;
    let test_rows = read_split(&dataset_dir.join(TEST_SPLIT))?;

    let labels = LabelSet::from_examples(&train_rows);
    let vocab = VocabBuilder::new(config.min_frequency, config.max_vocab_size)
        .build(train_rows.iter().map(|row| row.text.as_str()))?;
    ctx.log.line(format!(
        "dataset {}: {} train / {} test examples, {} classes, vocabulary {}",
        config.dataset,
        train_rows.len(),
        test_rows.len(),
        labels.len(),
        vocab.len()
    ))?;
    if vocab.has_no_words() {
        log::warn!(
            "vocabulary of {} holds only reserved tokens; check min_frequency",
            config.dataset
        );
    }

    let embeddings = match config.embedding_path() {
        Some(path) => Some(load_embeddings(&path, &vocab)?),
        None => None,
    };

    let mut model_config = config.network.clone();
    model_config.vocab_size = vocab.len() as i64;
    model_config.num_classes = labels.len() as i64;
    if let Some(embeddings) = &embeddings {
        model_config.embedding_dim = embeddings.dim() as i64;
    }

    vocab
        .save(ctx.path(VOCAB_FILE))
        .context("failed to write vocabulary")?;
    labels
        .save(&ctx.path(LABELS_FILE))
        .context("failed to write labels")?;

    let tokenizer = WordTokenizer::new(vocab)?;
    let train = TextDataset::encode(&train_rows, &labels, &tokenizer, config.seq_len, ctx.device)?;
    let test = TextDataset::encode(&test_rows, &labels, &tokenizer, config.seq_len, ctx.device)?;

    tch::manual_seed(config.seed as i64);
    let vs = nn::VarStore::new(ctx.device);
    let model = ctx.architecture.build(&vs.root(), &model_config)?;

    if let Some(embeddings) = embeddings {
        let replaced = embeddings.copy_into(&vs, tokenizer.vocab().tokens())?;
        ctx.log.line(format!(
            "word embedding {}: {replaced} of {} vocabulary rows initialized",
            config.wordembedding,
            tokenizer.vocab().len()
        ))?;
    }

    Ok(Prepared {
        train,
        test,
        labels,
        tokenizer,
        model_config,
        vs,
        model,
    })
}

fn load_embeddings(path: &Path, vocab: &Vocab) -> Result<PretrainedEmbeddings> {
    PretrainedEmbeddings::load(path, |word| vocab.get_id(word).is_some())
        .with_context(|| format!("failed to load word embedding {}", path.display()))
}
