use anyhow::{bail, Context};
use clap::Parser;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Split one `label<TAB>text` file into train.tsv and test.tsv
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(short, long)]
    input: PathBuf,
    /// Dataset directory, e.g. data/tripadvisor
    #[arg(short, long)]
    output_dir: PathBuf,
    /// Fraction of examples that go to test.tsv
    #[arg(short, long, default_value_t = 0.2)]
    test_ratio: f64,
    #[arg(short, long, default_value_t = 42)]
    seed: u64,
}

fn read_examples(path: &Path) -> anyhow::Result<Vec<String>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut examples = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match line.split_once('\t') {
            Some((label, _)) if !label.trim().is_empty() => examples.push(line),
            _ => bail!("{}:{}: expected `label<TAB>text`", path.display(), i + 1),
        }
    }
    Ok(examples)
}

/// Shuffles with `seed` and moves the first `round(len * test_ratio)` lines to
/// the test split.
fn split(mut examples: Vec<String>, test_ratio: f64, seed: u64) -> (Vec<String>, Vec<String>) {
    examples.shuffle(&mut StdRng::seed_from_u64(seed));
    let test_len = ((examples.len() as f64) * test_ratio).round() as usize;
    let train = examples.split_off(test_len.min(examples.len()));
    (train, examples)
}

fn write_split(path: &Path, lines: &[String]) -> anyhow::Result<()> {
    let mut writer = BufWriter::new(
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
    );
    for line in lines {
        writeln!(writer, "{line}")?;
    }
    writer.flush()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if !(0.0..1.0).contains(&cli.test_ratio) {
        bail!("test ratio must be in [0, 1), got {}", cli.test_ratio);
    }

    if !cli.output_dir.exists() {
        std::fs::create_dir_all(&cli.output_dir)?;
    }

    let examples = read_examples(&cli.input)?;
    let total = examples.len();
    let (train, test) = split(examples, cli.test_ratio, cli.seed);

    write_split(&cli.output_dir.join("train.tsv"), &train)?;
    write_split(&cli.output_dir.join("test.tsv"), &test)?;

    println!(
        "Done. {} examples: {} train, {} test in {}",
        total,
        train.len(),
        test.len(),
        cli.output_dir.display()
    );
    Ok(())
}
