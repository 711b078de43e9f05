use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tch::Device;
use textclf_core::Architecture;

use crate::run_log::RunLog;
use crate::RunConfig;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";
pub const LOG_FILE: &str = "log.txt";

/// Everything a run stage needs: the resolved configuration, the selected
/// architecture, the output directory, the device and the run log.
#[derive(Debug)]
pub struct RunContext {
    pub config: RunConfig,
    pub architecture: Architecture,
    pub run_dir: PathBuf,
    pub device: Device,
    pub log: RunLog,
    pub started: Instant,
}

/// `<output_dir>/<Model>/<timestamp>_<dataset>_<embedding>`, with the model
/// directory prefixed by `Debug-` in debug mode.
pub fn run_dir_path(
    config: &RunConfig,
    architecture: Architecture,
    timestamp: &DateTime<Local>,
) -> PathBuf {
    let model_dir = if config.debug {
        format!("Debug-{}", architecture.name())
    } else {
        architecture.name().to_string()
    };
    let leaf = format!(
        "{}_{}_{}",
        timestamp.format(TIMESTAMP_FORMAT),
        config.dataset,
        config.wordembedding
    );
    config.output_dir.join(model_dir).join(leaf)
}

impl RunContext {
    /// Validates the configuration and resolves the architecture, then
    /// creates a fresh run directory. Bad settings and unknown model names
    /// fail here, before anything is written.
    pub fn create(config: RunConfig) -> Result<Self> {
        config.validate().context("invalid run configuration")?;
        let architecture = config
            .model
            .parse::<Architecture>()
            .context("invalid model selection")?;

        let run_dir = run_dir_path(&config, architecture, &Local::now());
        if let Some(parent) = run_dir.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        fs::create_dir(&run_dir)
            .with_context(|| format!("failed to create run directory {}", run_dir.display()))?;

        let device = select_device();
        let log = RunLog::new(run_dir.join(LOG_FILE));

        Ok(Self {
            config,
            architecture,
            run_dir,
            device,
            log,
            started: Instant::now(),
        })
    }

    /// Context over an existing run directory, used to re-evaluate a finished run.
    pub fn reopen(config: RunConfig, run_dir: &Path) -> Result<Self> {
        config.validate().context("invalid run configuration")?;
        let architecture = config
            .model
            .parse::<Architecture>()
            .context("invalid model selection")?;

        Ok(Self {
            config,
            architecture,
            run_dir: run_dir.to_path_buf(),
            device: select_device(),
            log: RunLog::new(run_dir.join(LOG_FILE)),
            started: Instant::now(),
        })
    }

    pub fn path(&self, file_name: &str) -> PathBuf {
        self.run_dir.join(file_name)
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.path(&self.architecture.checkpoint_file_name())
    }
}

fn select_device() -> Device {
    let device = Device::cuda_if_available();
    if device.is_cuda() {
        tch::Cuda::cudnn_set_benchmark(true);
    }
    device
}
