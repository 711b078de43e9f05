use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tch::{Device, Kind, Tensor};

/// Running mean of per-batch values.
#[derive(Debug, Clone, Copy, Default)]
pub struct AverageMeter {
    sum: f64,
    count: usize,
}

impl AverageMeter {
    pub fn update(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    /// 0.0 when nothing was recorded.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

/// Fraction of rows whose arg-max logit equals the target class.
pub fn accuracy(logits: &Tensor, targets: &Tensor) -> f64 {
    logits
        .argmax(-1, false)
        .eq_tensor(targets)
        .to_kind(Kind::Float)
        .mean(Kind::Float)
        .double_value(&[])
}

/// Top-1 class index of every row.
pub fn predictions(logits: &Tensor) -> Result<Vec<i64>> {
    let top = logits.argmax(-1, false).to_device(Device::Cpu);
    Vec::<i64>::try_from(&top).context("failed to read predictions")
}

/// Averages of one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    pub epoch: usize,
    pub train_accuracy: f64,
    pub train_loss: f64,
    pub test_accuracy: f64,
    pub test_loss: f64,
    pub learning_rate: f64,
    pub seconds: f64,
}

/// Per-epoch metric sequences of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EpochHistory {
    pub train_accuracies: Vec<f64>,
    pub train_losses: Vec<f64>,
    pub test_accuracies: Vec<f64>,
    pub test_losses: Vec<f64>,
    pub learning_rates: Vec<f64>,
    pub seconds: Vec<f64>,
}

impl EpochHistory {
    pub fn record(&mut self, summary: &EpochSummary) {
        self.train_accuracies.push(summary.train_accuracy);
        self.train_losses.push(summary.train_loss);
        self.test_accuracies.push(summary.test_accuracy);
        self.test_losses.push(summary.test_loss);
        self.learning_rates.push(summary.learning_rate);
        self.seconds.push(summary.seconds);
    }

    pub fn len(&self) -> usize {
        self.train_accuracies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.train_accuracies.is_empty()
    }

    pub fn summaries(&self) -> impl Iterator<Item = EpochSummary> + '_ {
        (0..self.len()).map(|i| EpochSummary {
            epoch: i,
            train_accuracy: self.train_accuracies[i],
            train_loss: self.train_losses[i],
            test_accuracy: self.test_accuracies[i],
            test_loss: self.test_losses[i],
            learning_rate: self.learning_rates[i],
            seconds: self.seconds[i],
        })
    }
}

/// One text file per metric in the run directory, one value per line.
#[derive(Debug, Clone)]
pub struct MetricFiles {
    dir: PathBuf,
}

impl MetricFiles {
    pub const TRAIN_ACC: &'static str = "train_acc.txt";
    pub const TRAIN_LOSSES: &'static str = "train_losses.txt";
    pub const TEST_ACC: &'static str = "test_acc.txt";
    pub const TEST_LOSSES: &'static str = "test_losses.txt";
    pub const LR: &'static str = "lr.txt";

    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn append(&self, summary: &EpochSummary) -> Result<()> {
        self.append_value(Self::TRAIN_ACC, summary.train_accuracy)?;
        self.append_value(Self::TRAIN_LOSSES, summary.train_loss)?;
        self.append_value(Self::TEST_ACC, summary.test_accuracy)?;
        self.append_value(Self::TEST_LOSSES, summary.test_loss)?;
        self.append_value(Self::LR, summary.learning_rate)
    }

    fn append_value(&self, file_name: &str, value: f64) -> Result<()> {
        let path = self.dir.join(file_name);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        writeln!(file, "{value}").with_context(|| format!("failed to write {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_meter_reports_zero() {
        let meter = AverageMeter::default();
        assert_eq!(meter.mean(), 0.0);
        assert_eq!(meter.count(), 0);
    }

    #[test]
    fn meter_averages_updates() {
        let mut meter = AverageMeter::default();
        meter.update(0.25);
        meter.update(0.75);
        meter.update(0.5);
        assert!((meter.mean() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn accuracy_and_predictions_use_arg_max() {
        let logits = Tensor::from_slice(&[2.0f32, 1.0, 0.1, 0.3, 0.2, 0.9]).view([3, 2]);
        let targets = Tensor::from_slice(&[0i64, 1, 0]);

        assert_eq!(predictions(&logits).unwrap(), vec![0, 1, 1]);
        assert!((accuracy(&logits, &targets) - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn metric_files_gain_one_line_per_epoch() {
        let dir = std::env::temp_dir().join(format!("metric_files_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let files = MetricFiles::new(&dir);

        for epoch in 0..3 {
            files
                .append(&EpochSummary {
                    epoch,
                    train_accuracy: 0.5,
                    train_loss: 0.01,
                    test_accuracy: 0.4,
                    test_loss: 0.02,
                    learning_rate: 1e-3,
                    seconds: 1.0,
                })
                .unwrap();
        }

        let test_acc = std::fs::read_to_string(dir.join(MetricFiles::TEST_ACC)).unwrap();
        std::fs::remove_dir_all(&dir).ok();
        assert_eq!(test_acc.lines().collect::<Vec<_>>(), vec!["0.4", "0.4", "0.4"]);
    }

    #[test]
    fn history_keeps_one_entry_per_record() {
        let mut history = EpochHistory::default();
        let summary = EpochSummary {
            epoch: 0,
            train_accuracy: 0.6,
            train_loss: 0.1,
            test_accuracy: 0.5,
            test_loss: 0.2,
            learning_rate: 1e-3,
            seconds: 2.0,
        };
        history.record(&summary);
        history.record(&EpochSummary { epoch: 1, ..summary });

        assert_eq!(history.len(), 2);
        let collected: Vec<EpochSummary> = history.summaries().collect();
        assert_eq!(collected[1].epoch, 1);
        assert_eq!(collected[1].test_accuracy, 0.5);
    }
}
