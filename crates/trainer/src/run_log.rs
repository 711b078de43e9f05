use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Plain-text log of a run. Every line is appended to the file and echoed
/// through `log::info!`.
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn line(&self, message: impl AsRef<str>) -> Result<()> {
        let message = message.as_ref();
        log::info!("{message}");

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open run log {}", self.path.display()))?;
        writeln!(file, "{message}")
            .with_context(|| format!("failed to append to run log {}", self.path.display()))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
