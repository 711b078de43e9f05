use tch::{nn, Tensor};

use crate::config::ModelConfig;
use crate::error::{CoreError, Result};

const STAGE_CHANNELS: [i64; 4] = [64, 128, 256, 512];
const POOLED_POSITIONS: i64 = 8;
const FC_HIDDEN: i64 = 2048;

/// Convolutional blocks per stage for each supported depth.
fn blocks_per_stage(depth: i64) -> Result<[usize; 4]> {
    match depth {
        9 => Ok([1, 1, 1, 1]),
        17 => Ok([2, 2, 2, 2]),
        29 => Ok([5, 5, 2, 2]),
        49 => Ok([8, 8, 5, 3]),
        other => Err(CoreError::UnsupportedDepth(other)),
    }
}

fn same_padding() -> nn::ConvConfig {
    nn::ConvConfig {
        padding: 1,
        ..Default::default()
    }
}

/// Two conv-batchnorm-relu layers.
#[derive(Debug)]
struct ConvBlock {
    conv1: nn::Conv1D,
    bn1: nn::BatchNorm,
    conv2: nn::Conv1D,
    bn2: nn::BatchNorm,
}

impl ConvBlock {
    fn new(vs: &nn::Path, in_channels: i64, out_channels: i64) -> Self {
        Self {
            conv1: nn::conv1d(vs / "conv1", in_channels, out_channels, 3, same_padding()),
            bn1: nn::batch_norm1d(vs / "bn1", out_channels, Default::default()),
            conv2: nn::conv1d(vs / "conv2", out_channels, out_channels, 3, same_padding()),
            bn2: nn::batch_norm1d(vs / "bn2", out_channels, Default::default()),
        }
    }

    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        xs.apply(&self.conv1)
            .apply_t(&self.bn1, train)
            .relu()
            .apply(&self.conv2)
            .apply_t(&self.bn2, train)
            .relu()
    }
}

/// Very deep convolutional network over token embeddings.
#[derive(Debug)]
pub struct Vdcnn {
    embedding: nn::Embedding,
    first_conv: nn::Conv1D,
    stages: Vec<Vec<ConvBlock>>,
    fc1: nn::Linear,
    fc2: nn::Linear,
    fc3: nn::Linear,
    dropout: f64,
}

impl Vdcnn {
    pub fn new(vs: &nn::Path, config: &ModelConfig) -> Result<Self> {
        let layout = blocks_per_stage(config.vdcnn_depth)?;

        let embedding = nn::embedding(
            vs / "embedding",
            config.vocab_size,
            config.embedding_dim,
            Default::default(),
        );
        let first_conv = nn::conv1d(
            vs / "first_conv",
            config.embedding_dim,
            STAGE_CHANNELS[0],
            3,
            same_padding(),
        );

        let mut stages = Vec::with_capacity(layout.len());
        let mut in_channels = STAGE_CHANNELS[0];
        for (stage_idx, (&blocks, &channels)) in layout.iter().zip(STAGE_CHANNELS.iter()).enumerate() {
            let stage_vs = vs / "stages" / stage_idx;
            let mut stage = Vec::with_capacity(blocks);
            for block_idx in 0..blocks {
                stage.push(ConvBlock::new(&(&stage_vs / block_idx), in_channels, channels));
                in_channels = channels;
            }
            stages.push(stage);
        }

        let flat = STAGE_CHANNELS[3] * POOLED_POSITIONS;
        let fc1 = nn::linear(vs / "fc1", flat, FC_HIDDEN, Default::default());
        let fc2 = nn::linear(vs / "fc2", FC_HIDDEN, FC_HIDDEN, Default::default());
        let fc3 = nn::linear(vs / "fc3", FC_HIDDEN, config.num_classes, Default::default());

        Ok(Self {
            embedding,
            first_conv,
            stages,
            fc1,
            fc2,
            fc3,
            dropout: config.dropout,
        })
    }
}

impl nn::ModuleT for Vdcnn {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let mut x = xs
            .apply(&self.embedding)
            .transpose(1, 2)
            .apply(&self.first_conv);

        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                x = x.max_pool1d([3], [2], [1], [1], false);
            }
            for block in stage {
                x = block.forward_t(&x, train);
            }
        }

        let (pooled, _) = x.adaptive_max_pool1d([POOLED_POSITIONS]);
        pooled
            .flatten(1, -1)
            .apply(&self.fc1)
            .relu()
            .dropout(self.dropout, train)
            .apply(&self.fc2)
            .relu()
            .dropout(self.dropout, train)
            .apply(&self.fc3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{nn::ModuleT, Device, Kind};

    #[test]
    fn rejects_unknown_depth() {
        let vs = nn::VarStore::new(Device::Cpu);
        let config = ModelConfig {
            vdcnn_depth: 11,
            ..Default::default()
        };
        assert!(matches!(
            Vdcnn::new(&vs.root(), &config),
            Err(CoreError::UnsupportedDepth(11))
        ));
    }

    #[test]
    fn handles_sequences_shorter_than_pool_output() {
        let vs = nn::VarStore::new(Device::Cpu);
        let config = ModelConfig {
            vocab_size: 10,
            embedding_dim: 4,
            num_classes: 2,
            ..Default::default()
        };
        let model = Vdcnn::new(&vs.root(), &config).unwrap();

        let xs = Tensor::randint(10, [2, 5], (Kind::Int64, Device::Cpu));
        assert_eq!(model.forward_t(&xs, false).size(), vec![2, 2]);
    }
}
