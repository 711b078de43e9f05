use anyhow::{anyhow, Context, Result};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::metrics::EpochHistory;
use crate::plot::Figure;
use crate::report::ConfusionMatrix;
use crate::RunConfig;

pub const REPORT_FILE: &str = "report.md";

pub const RUN_REPORT_TEMPLATE: &str = r"# Run Report

<!-- SECTION:overview start -->
<!-- SECTION:overview end -->

## Configuration

<!-- SECTION:configuration start -->
<!-- SECTION:configuration end -->

## Metrics

<!-- SECTION:metrics start -->
<!-- SECTION:metrics end -->

## Figures

<!-- SECTION:figures start -->
<!-- SECTION:figures end -->

## Classification Report

<!-- SECTION:classification start -->
<!-- SECTION:classification end -->

> Regions between `<!-- SECTION:name start/end -->` markers are rewritten on every run or
> re-evaluation; notes outside them are kept.
";

#[derive(Clone, Debug)]
pub struct ReportSection {
    id: String,
    content: String,
}

impl ReportSection {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }

    fn start_marker(&self) -> String {
        format!("<!-- SECTION:{} start -->", self.id)
    }

    fn end_marker(&self) -> String {
        format!("<!-- SECTION:{} end -->", self.id)
    }
}

/// Writes `template` to `path` unless a report is already there.
pub fn ensure_report_file(path: &Path, template: &str) -> Result<()> {
    if !path.exists() {
        fs::write(path, template)
            .with_context(|| format!("failed to write report template to {}", path.display()))?;
    }
    Ok(())
}

pub fn update_sections(path: &Path, sections: &[ReportSection]) -> Result<()> {
    let mut content = fs::read_to_string(path)
        .with_context(|| format!("failed to read report at {}", path.display()))?;

    for section in sections {
        content = replace_section(&content, section)?;
    }

    fs::write(path, content)
        .with_context(|| format!("failed to write report to {}", path.display()))
}

fn replace_section(content: &str, section: &ReportSection) -> Result<String> {
    let start_marker = section.start_marker();
    let end_marker = section.end_marker();

    let start = content
        .find(&start_marker)
        .ok_or_else(|| anyhow!("report has no section {:?}", section.id))?
        + start_marker.len();
    let end = start
        + content[start..]
            .find(&end_marker)
            .ok_or_else(|| anyhow!("section {:?} is not closed", section.id))?;

    let body = section.content.trim_matches('\n');
    let mut updated = String::with_capacity(content.len() + body.len());
    updated.push_str(&content[..start]);
    updated.push('\n');
    if !body.is_empty() {
        updated.push_str(body);
        updated.push('\n');
    }
    updated.push_str(&content[end..]);
    Ok(updated)
}

pub fn overview_section(config: &RunConfig, run_name: &str, best: Option<(usize, f64)>) -> ReportSection {
    let mut body = format!(
        "Model `{}` on dataset `{}` with `{}` word embedding.\n\nRun: `{run_name}`\n",
        config.model, config.dataset, config.wordembedding
    );
    match best {
        Some((epoch, accuracy)) => {
            let _ = write!(body, "\nBest test accuracy **{accuracy:.4}** at epoch {epoch}.");
        }
        None => body.push_str("\nNo epoch was evaluated."),
    }
    ReportSection::new("overview", body)
}

pub fn configuration_section(config: &RunConfig) -> Result<ReportSection> {
    let yaml = serde_yaml::to_string(config)?;
    Ok(ReportSection::new(
        "configuration",
        format!("```yaml\n{}\n```", yaml.trim_end()),
    ))
}

pub fn metrics_section(history: &EpochHistory) -> ReportSection {
    let mut body = String::from(
        "| epoch | train acc | train loss | test acc | test loss | lr | seconds |\n\
         |---:|---:|---:|---:|---:|---:|---:|\n",
    );
    for s in history.summaries() {
        let _ = writeln!(
            body,
            "| {} | {:.4} | {:.6} | {:.4} | {:.6} | {:.3e} | {:.1} |",
            s.epoch,
            s.train_accuracy,
            s.train_loss,
            s.test_accuracy,
            s.test_loss,
            s.learning_rate,
            s.seconds
        );
    }
    ReportSection::new("metrics", body)
}

pub fn figures_section(figures: &[Figure]) -> ReportSection {
    let mut body = String::new();
    for figure in figures {
        let legend: Vec<String> = figure
            .legend
            .iter()
            .map(|(name, [r, g, b])| format!("{name} (#{r:02x}{g:02x}{b:02x})"))
            .collect();
        let _ = writeln!(
            body,
            "![{title} {y}]({file})\n\n*{title}*: {y} per {x}; {legend}.\n",
            title = figure.title,
            y = figure.y_label,
            x = figure.x_label,
            file = figure.file_name,
            legend = legend.join(", ")
        );
    }
    ReportSection::new("figures", body)
}

pub fn classification_section(matrix: &ConfusionMatrix) -> ReportSection {
    ReportSection::new(
        "classification",
        format!(
            "Labels: {}\n\n```text\n{}\n\n{}```",
            matrix.labels().join(", "),
            matrix.to_text(),
            matrix.classification_report()
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_report(name: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{name}_{}.md", std::process::id()));
        std::fs::remove_file(&path).ok();
        path
    }

    #[test]
    fn sections_are_rewritten_in_place() {
        let path = temp_report("notebook_rewrite");
        ensure_report_file(&path, RUN_REPORT_TEMPLATE).unwrap();

        update_sections(&path, &[ReportSection::new("metrics", "first")]).unwrap();
        update_sections(&path, &[ReportSection::new("metrics", "\nsecond\n")]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(content.contains(
            "<!-- SECTION:metrics start -->\nsecond\n<!-- SECTION:metrics end -->"
        ));
        assert!(!content.contains("first"));
        assert!(content.starts_with("# Run Report"));
    }

    #[test]
    fn existing_report_is_not_overwritten() {
        let path = temp_report("notebook_keep");
        std::fs::write(&path, "<!-- SECTION:overview start -->\nnotes\n<!-- SECTION:overview end -->\n").unwrap();
        ensure_report_file(&path, RUN_REPORT_TEMPLATE).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("notes"));
        let err = update_sections(&path, &[ReportSection::new("metrics", "x")]).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(err.to_string().contains("metrics"));
    }

    #[test]
    fn metrics_table_has_a_row_per_epoch() {
        let history = EpochHistory {
            train_accuracies: vec![0.5, 0.75],
            train_losses: vec![0.02, 0.01],
            test_accuracies: vec![0.5, 0.5],
            test_losses: vec![0.03, 0.03],
            learning_rates: vec![1e-3, 9.9e-4],
            seconds: vec![1.5, 1.4],
        };
        let section = metrics_section(&history);
        let rows = section.content.lines().filter(|l| l.starts_with("| ")).count();
        assert_eq!(rows, 3);
        assert!(section.content.contains("| 1 | 0.7500 |"));
    }
}
