use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use trainer::{evaluate_run, train_run, RunConfig};

#[derive(Parser)]
#[command(author, version, about = "Train and evaluate text classifiers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model and write a new run directory
    Train(TrainArgs),
    /// Re-evaluate the checkpoint of a finished run
    Evaluate {
        /// Run directory produced by `train`
        #[arg(long)]
        run_dir: PathBuf,
    },
}

#[derive(Args)]
struct TrainArgs {
    /// YAML run configuration; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// BiLSTMConv, CNN_Text_Model or VDCNN
    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    dataset: Option<String>,

    /// `random` or the name of a vector file in the embeddings directory
    #[arg(long)]
    wordembedding: Option<String>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    debug: bool,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[arg(long)]
    output_dir: Option<PathBuf>,
}

impl TrainArgs {
    fn resolve(self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_yaml_file(path)?,
            None => RunConfig::default(),
        };

        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(dataset) = self.dataset {
            config.dataset = dataset;
        }
        if let Some(wordembedding) = self.wordembedding {
            config.wordembedding = wordembedding;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(output_dir) = self.output_dir {
            config.output_dir = output_dir;
        }
        config.debug |= self.debug;
        Ok(config)
    }
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Train(args) => {
            let config = args.resolve()?;
            init_logging(config.debug);

            let outcome = train_run(config)?;
            match &outcome.best {
                Some(best) => println!(
                    "Best test accuracy {:.4} at epoch {}; results in {}",
                    best.accuracy,
                    best.epoch,
                    outcome.run_dir.display()
                ),
                None => println!("No epochs run; results in {}", outcome.run_dir.display()),
            }
        }
        Commands::Evaluate { run_dir } => {
            init_logging(false);
            let eval = evaluate_run(&run_dir)?;
            println!(
                "Test accuracy {:.4} over {} examples",
                eval.accuracy,
                eval.predictions.len()
            );
        }
    }

    Ok(())
}
