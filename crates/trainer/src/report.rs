use anyhow::{bail, Context, Result};
use std::fmt::Write as _;
use std::path::Path;

use crate::dataset::LabelSet;

pub const PREDICTIONS_FILE: &str = "test_classification_result.csv";
pub const CONFUSION_MATRIX_FILE: &str = "confusion_matrix.csv";

/// Writes `index,test_label,ground_truth`, one row per evaluated example.
pub fn write_predictions_csv(
    path: &Path,
    predictions: &[i64],
    ground_truth: &[i64],
    labels: &LabelSet,
) -> Result<()> {
    if predictions.len() != ground_truth.len() {
        bail!(
            "{} predictions for {} ground-truth labels",
            predictions.len(),
            ground_truth.len()
        );
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    writer.write_record(["index", "test_label", "ground_truth"])?;
    for (idx, (&pred, &truth)) in predictions.iter().zip(ground_truth).enumerate() {
        writer.write_record([
            idx.to_string(),
            label_name(labels, pred)?.to_string(),
            label_name(labels, truth)?.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn label_name(labels: &LabelSet, index: i64) -> Result<&str> {
    match labels.name(index) {
        Some(name) => Ok(name),
        None => bail!("class index {index} is outside the {} known labels", labels.len()),
    }
}

/// Precision, recall, F1 and support of one class or of an average.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClassScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Counts indexed `[ground_truth][predicted]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfusionMatrix {
    labels: Vec<String>,
    counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn from_predictions(
        predictions: &[i64],
        ground_truth: &[i64],
        labels: &LabelSet,
    ) -> Result<Self> {
        if predictions.len() != ground_truth.len() {
            bail!(
                "{} predictions for {} ground-truth labels",
                predictions.len(),
                ground_truth.len()
            );
        }

        let n = labels.len();
        let mut counts = vec![vec![0usize; n]; n];
        for (&pred, &truth) in predictions.iter().zip(ground_truth) {
            let (p, t) = (class_slot(pred, n)?, class_slot(truth, n)?);
            counts[t][p] += 1;
        }

        Ok(Self {
            labels: labels.names().to_vec(),
            counts,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// `None` when either class is outside the label set.
    pub fn count(&self, truth: usize, predicted: usize) -> Option<usize> {
        self.counts.get(truth)?.get(predicted).copied()
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn accuracy(&self) -> f64 {
        let correct: usize = (0..self.labels.len()).map(|c| self.counts[c][c]).sum();
        ratio(correct, self.total())
    }

    pub fn scores(&self, class: usize) -> ClassScores {
        let tp = self.counts[class][class];
        let predicted: usize = self.counts.iter().map(|row| row[class]).sum();
        let support: usize = self.counts[class].iter().sum();

        let precision = ratio(tp, predicted);
        let recall = ratio(tp, support);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        ClassScores {
            precision,
            recall,
            f1,
            support,
        }
    }

    /// Unweighted mean over classes.
    pub fn macro_avg(&self) -> ClassScores {
        let n = self.labels.len();
        let mut avg = ClassScores {
            support: self.total(),
            ..Default::default()
        };
        if n == 0 {
            return avg;
        }
        for class in 0..n {
            let s = self.scores(class);
            avg.precision += s.precision / n as f64;
            avg.recall += s.recall / n as f64;
            avg.f1 += s.f1 / n as f64;
        }
        avg
    }

    /// Mean over classes weighted by support.
    pub fn weighted_avg(&self) -> ClassScores {
        let total = self.total();
        let mut avg = ClassScores {
            support: total,
            ..Default::default()
        };
        if total == 0 {
            return avg;
        }
        for class in 0..self.labels.len() {
            let s = self.scores(class);
            let weight = s.support as f64 / total as f64;
            avg.precision += s.precision * weight;
            avg.recall += s.recall * weight;
            avg.f1 += s.f1 * weight;
        }
        avg
    }

    /// Plain-text table of per-class scores, accuracy and both averages.
    pub fn classification_report(&self) -> String {
        let width = self
            .labels
            .iter()
            .map(String::len)
            .chain(["weighted avg".len()])
            .max()
            .unwrap_or(0);

        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:>width$} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        );
        out.push('\n');
        for (class, label) in self.labels.iter().enumerate() {
            push_row(&mut out, label, &self.scores(class), width);
        }
        out.push('\n');
        let _ = writeln!(
            out,
            "{:>width$} {:>9} {:>9} {:>9.4} {:>9}",
            "accuracy",
            "",
            "",
            self.accuracy(),
            self.total()
        );
        push_row(&mut out, "macro avg", &self.macro_avg(), width);
        push_row(&mut out, "weighted avg", &self.weighted_avg(), width);
        out
    }

    /// Matrix as text, one ground-truth row per line.
    pub fn to_text(&self) -> String {
        self.counts
            .iter()
            .map(|row| {
                let cells: Vec<String> = row.iter().map(usize::to_string).collect();
                format!("[{}]", cells.join(" "))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("failed to create {}", path.display()))?;

        let mut header = vec!["ground_truth\\predicted".to_string()];
        header.extend(self.labels.iter().cloned());
        writer.write_record(&header)?;

        for (label, row) in self.labels.iter().zip(&self.counts) {
            let mut record = vec![label.clone()];
            record.extend(row.iter().map(usize::to_string));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn class_slot(index: i64, num_classes: usize) -> Result<usize> {
    match usize::try_from(index) {
        Ok(slot) if slot < num_classes => Ok(slot),
        _ => bail!("class index {index} is outside the {num_classes} known labels"),
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn push_row(out: &mut String, name: &str, s: &ClassScores, width: usize) {
    let _ = writeln!(
        out,
        "{:>width$} {:>9.4} {:>9.4} {:>9.4} {:>9}",
        name, s.precision, s.recall, s.f1, s.support
    );
}
