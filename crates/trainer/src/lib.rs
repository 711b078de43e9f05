pub mod checkpoint;
pub mod context;
pub mod dataset;
pub mod metrics;
pub mod notebook;
pub mod plot;
pub mod prepare;
pub mod report;
pub mod run;
pub mod run_log;
pub mod schedule;
pub mod train;

pub use context::RunContext;
pub use run::{evaluate_run, train_run, RunOutcome};
pub use train::Trainer;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use textclf_core::ModelConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Architecture name: BiLSTMConv, CNN_Text_Model or VDCNN.
    pub model: String,
    /// Dataset directory name under `data_dir`.
    pub dataset: String,
    /// `random`, or the stem of a vector file under `embeddings_dir`.
    pub wordembedding: String,
    pub batch_size: usize,
    pub epochs: usize,
    pub debug: bool,
    pub learning_rate: f64,
    pub weight_decay: f64,
    /// Batches between learning-rate decays.
    pub lr_step_size: usize,
    pub lr_gamma: f64,
    /// Tokens per example after truncation/padding.
    pub seq_len: usize,
    pub min_frequency: u32,
    pub max_vocab_size: Option<usize>,
    pub seed: u64,
    pub data_dir: PathBuf,
    pub embeddings_dir: PathBuf,
    pub output_dir: PathBuf,
    pub network: ModelConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            model: "CNN_Text_Model".to_string(),
            dataset: "tripadvisor".to_string(),
            wordembedding: "random".to_string(),
            batch_size: 64,
            epochs: 10,
            debug: false,
            learning_rate: 1e-3,
            weight_decay: 1e-4,
            lr_step_size: 1000,
            lr_gamma: 0.99,
            seq_len: 128,
            min_frequency: 1,
            max_vocab_size: None,
            seed: 42,
            data_dir: PathBuf::from("data"),
            embeddings_dir: PathBuf::from("embeddings"),
            output_dir: PathBuf::from("classification_Accuracy"),
            network: ModelConfig::default(),
        }
    }
}

impl RunConfig {
    pub const RANDOM_EMBEDDING: &'static str = "random";

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))
    }

    pub fn save_yaml(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content)
            .with_context(|| format!("failed to write config to {}", path.display()))
    }

    /// Rejects values that would produce degenerate tensors or meaningless
    /// metrics later in the run.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if self.seq_len == 0 {
            bail!("seq_len must be at least 1");
        }
        if self.lr_step_size == 0 {
            bail!("lr_step_size must be at least 1");
        }
        if !(self.learning_rate.is_finite() && self.learning_rate >= 0.0) {
            bail!("learning_rate must be a non-negative number, got {}", self.learning_rate);
        }
        if !(self.weight_decay.is_finite() && self.weight_decay >= 0.0) {
            bail!("weight_decay must be a non-negative number, got {}", self.weight_decay);
        }
        if !(self.lr_gamma.is_finite() && self.lr_gamma > 0.0) {
            bail!("lr_gamma must be positive, got {}", self.lr_gamma);
        }
        if self.max_vocab_size.is_some_and(|size| size < 3) {
            bail!("max_vocab_size must leave room for at least one word besides <pad> and <unk>");
        }

        let net = &self.network;
        if !(0.0..1.0).contains(&net.dropout) {
            bail!("network.dropout must be in [0, 1), got {}", net.dropout);
        }
        for (name, value) in [
            ("network.embedding_dim", net.embedding_dim),
            ("network.hidden_size", net.hidden_size),
            ("network.num_filters", net.num_filters),
        ] {
            if value <= 0 {
                bail!("{name} must be positive, got {value}");
            }
        }
        if net.kernel_sizes.is_empty() {
            bail!("network.kernel_sizes must name at least one kernel width");
        }
        if let Some(&bad) = net.kernel_sizes.iter().find(|&&k| k <= 0) {
            bail!("network.kernel_sizes must be positive, got {bad}");
        }
        Ok(())
    }

    pub fn dataset_dir(&self) -> PathBuf {
        self.data_dir.join(&self.dataset)
    }

    /// Vector file for the configured word embedding, or `None` for `random`.
    pub fn embedding_path(&self) -> Option<PathBuf> {
        if self.wordembedding == Self::RANDOM_EMBEDDING {
            None
        } else {
            Some(self.embeddings_dir.join(format!("{}.txt", self.wordembedding)))
        }
    }
}
