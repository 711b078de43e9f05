use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Instant;
use tch::nn::{self, ModuleT, OptimizerConfig};

use crate::checkpoint::{save_checkpoint, BestCheckpoint, BestTracker};
use crate::context::RunContext;
use crate::dataset::TextDataset;
use crate::metrics::{self, AverageMeter, EpochHistory, EpochSummary, MetricFiles};
use crate::prepare::Prepared;
use crate::schedule::StepLr;

const LOG_EVERY: usize = 10;

/// Result of one full pass over the evaluation split.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub accuracy: f64,
    pub loss: f64,
    pub predictions: Vec<i64>,
    pub ground_truth: Vec<i64>,
}

/// Runs `model` over every batch of `data` in eval mode without gradient
/// tracking. Losses are normalized by `batch_size`.
pub fn evaluate(model: &dyn ModuleT, data: &TextDataset, batch_size: usize) -> Result<Evaluation> {
    let mut accuracy = AverageMeter::default();
    let mut loss = AverageMeter::default();
    let mut predictions = Vec::with_capacity(data.len());
    let mut ground_truth = Vec::with_capacity(data.len());

    tch::no_grad(|| -> Result<()> {
        for batch in data.batches(batch_size) {
            let logits = model.forward_t(&batch.text, false);
            let batch_loss = logits.cross_entropy_for_logits(&batch.label);

            loss.update(batch_loss.double_value(&[]) / batch_size as f64);
            accuracy.update(metrics::accuracy(&logits, &batch.label));
            predictions.extend(metrics::predictions(&logits)?);
            ground_truth.extend_from_slice(&batch.targets);
        }
        Ok(())
    })?;

    Ok(Evaluation {
        accuracy: accuracy.mean(),
        loss: loss.mean(),
        predictions,
        ground_truth,
    })
}

/// Everything a finished training loop hands back to the run.
#[derive(Debug)]
pub struct TrainingOutcome {
    pub history: EpochHistory,
    pub best: Option<BestCheckpoint>,
}

pub struct Trainer<'a> {
    ctx: &'a RunContext,
    data: Prepared,
    optimizer: nn::Optimizer,
    schedule: StepLr,
    rng: StdRng,
    metric_files: MetricFiles,
    history: EpochHistory,
    best: BestTracker,
}

impl<'a> Trainer<'a> {
    pub fn new(ctx: &'a RunContext, data: Prepared) -> Result<Self> {
        let config = &ctx.config;
        let optimizer = nn::Adam {
            wd: config.weight_decay,
            ..Default::default()
        }
        .build(&data.vs, config.learning_rate)?;

        Ok(Self {
            ctx,
            data,
            optimizer,
            schedule: StepLr::new(config.learning_rate, config.lr_step_size, config.lr_gamma),
            rng: StdRng::seed_from_u64(config.seed),
            metric_files: MetricFiles::new(&ctx.run_dir),
            history: EpochHistory::default(),
            best: BestTracker::default(),
        })
    }

    /// Runs every configured epoch and returns the history and best epoch.
    pub fn run(mut self) -> Result<(TrainingOutcome, Prepared)> {
        for epoch in 0..self.ctx.config.epochs {
            self.run_epoch(epoch)?;
        }
        let outcome = TrainingOutcome {
            history: self.history,
            best: self.best.into_best(),
        };
        Ok((outcome, self.data))
    }

    fn run_epoch(&mut self, epoch: usize) -> Result<EpochSummary> {
        let started = Instant::now();
        let ctx = self.ctx;
        let log = &ctx.log;

        let (train_accuracy, train_loss) = self.train_epoch(epoch)?;
        log.line(format!("epoch: {epoch}"))?;
        log.line(format!("[TRAIN] accumulated accuracy: {train_accuracy}"))?;

        let eval = evaluate(
            self.data.model.as_ref(),
            &self.data.test,
            ctx.config.batch_size,
        )?;
        log.line(format!("[TEST] accumulated accuracy: {}", eval.accuracy))?;

        let summary = EpochSummary {
            epoch,
            train_accuracy,
            train_loss,
            test_accuracy: eval.accuracy,
            test_loss: eval.loss,
            learning_rate: self.schedule.current_lr(),
            seconds: started.elapsed().as_secs_f64(),
        };

        if self
            .best
            .offer(epoch, eval.accuracy, eval.predictions, eval.ground_truth)
        {
            save_checkpoint(ctx, &self.data.vs, &self.data.model_config)?;
            log.line(format!(
                "saved best checkpoint (epoch {epoch}, accuracy {})",
                eval.accuracy
            ))?;
        }

        self.history.record(&summary);
        self.metric_files.append(&summary)?;
        log.line(format!("lr: {}", summary.learning_rate))?;
        log.line(format!("last time: {}", summary.seconds))?;
        Ok(summary)
    }

    fn train_epoch(&mut self, epoch: usize) -> Result<(f64, f64)> {
        let batch_size = self.ctx.config.batch_size;
        let mut accuracy = AverageMeter::default();
        let mut loss = AverageMeter::default();

        let batches = self.data.train.shuffled_batches(batch_size, &mut self.rng);
        let num_batches = batches.num_batches();
        for (idx, batch) in batches.enumerate() {
            self.optimizer.set_lr(self.schedule.step());

            let logits = self.data.model.forward_t(&batch.text, true);
            let batch_loss = logits.cross_entropy_for_logits(&batch.label);
            self.optimizer.backward_step(&batch_loss);

            let batch_loss = batch_loss.double_value(&[]) / batch_size as f64;
            loss.update(batch_loss);
            accuracy.update(metrics::accuracy(&logits, &batch.label));

            if idx % LOG_EVERY == 0 {
                log::debug!(
                    "epoch {epoch} | batch {idx}/{num_batches} | loss {batch_loss:.6} | lr {:.3e}",
                    self.schedule.current_lr()
                );
            }
        }

        Ok((accuracy.mean(), loss.mean()))
    }
}
