use anyhow::{Context, Result};
use std::fs;
use tch::nn;
use textclf_core::safetensors_util::save_safetensors;
use textclf_core::ModelConfig;

use crate::context::RunContext;

pub const MODEL_CONFIG_FILE: &str = "model_config.json";

/// Best evaluation seen so far in a run, with the predictions that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct BestCheckpoint {
    pub epoch: usize,
    pub accuracy: f64,
    pub predictions: Vec<i64>,
    pub ground_truth: Vec<i64>,
}

/// Tracks the best test accuracy across every epoch of a run.
#[derive(Debug, Clone, Default)]
pub struct BestTracker {
    best: Option<BestCheckpoint>,
}

impl BestTracker {
    /// True when `accuracy` strictly beats every earlier epoch. The first
    /// epoch always qualifies.
    pub fn is_improvement(&self, accuracy: f64) -> bool {
        match &self.best {
            None => true,
            Some(best) => accuracy > best.accuracy,
        }
    }

    /// Records the epoch if it improves on the best. Returns whether it did.
    pub fn offer(
        &mut self,
        epoch: usize,
        accuracy: f64,
        predictions: Vec<i64>,
        ground_truth: Vec<i64>,
    ) -> bool {
        if !self.is_improvement(accuracy) {
            return false;
        }
        self.best = Some(BestCheckpoint {
            epoch,
            accuracy,
            predictions,
            ground_truth,
        });
        true
    }

    pub fn best(&self) -> Option<&BestCheckpoint> {
        self.best.as_ref()
    }

    pub fn into_best(self) -> Option<BestCheckpoint> {
        self.best
    }
}

/// Writes the model parameters and the network configuration into the run directory.
pub fn save_checkpoint(ctx: &RunContext, vs: &nn::VarStore, config: &ModelConfig) -> Result<()> {
    let path = ctx.checkpoint_path();
    save_safetensors(vs, &path)
        .with_context(|| format!("failed to save checkpoint to {}", path.display()))?;

    let config_path = ctx.path(MODEL_CONFIG_FILE);
    let config_json = serde_json::to_string_pretty(config)?;
    fs::write(&config_path, config_json)
        .with_context(|| format!("failed to write {}", config_path.display()))?;

    log::debug!("saved checkpoint to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_epoch_is_always_best() {
        let mut tracker = BestTracker::default();
        assert!(tracker.offer(0, 0.0, vec![1], vec![0]));
        assert_eq!(tracker.best().unwrap().epoch, 0);
    }

    #[test]
    fn only_strict_improvements_replace_the_best() {
        let mut tracker = BestTracker::default();
        assert!(tracker.offer(0, 0.6, vec![0, 1], vec![0, 1]));
        assert!(!tracker.offer(1, 0.4, vec![1, 1], vec![0, 1]));
        assert!(!tracker.offer(2, 0.6, vec![1, 0], vec![0, 1]));
        assert!(tracker.offer(3, 0.7, vec![0, 0], vec![0, 1]));

        let best = tracker.into_best().unwrap();
        assert_eq!(best.epoch, 3);
        assert_eq!(best.predictions, vec![0, 0]);
    }

    #[test]
    fn a_worse_epoch_after_a_good_one_keeps_the_earlier_best() {
        let mut tracker = BestTracker::default();
        tracker.offer(0, 0.9, vec![1], vec![1]);
        for epoch in 1..5 {
            tracker.offer(epoch, 0.5, vec![0], vec![1]);
        }
        assert_eq!(tracker.best().unwrap().epoch, 0);
        assert_eq!(tracker.best().unwrap().accuracy, 0.9);
    }
}
