use tch::{nn, Tensor};

use crate::config::ModelConfig;

/// Convolutional sentence classifier: parallel 1-D convolutions of several
/// widths over the embedded tokens, max-pooled over time.
#[derive(Debug)]
pub struct CnnText {
    embedding: nn::Embedding,
    convs: Vec<nn::Conv1D>,
    fc: nn::Linear,
    dropout: f64,
}

impl CnnText {
    pub fn new(vs: &nn::Path, config: &ModelConfig) -> Self {
        let embedding = nn::embedding(
            vs / "embedding",
            config.vocab_size,
            config.embedding_dim,
            Default::default(),
        );

        let convs = config
            .kernel_sizes
            .iter()
            .enumerate()
            .map(|(i, &kernel)| {
                // k - 1 padding keeps at least one output position for short inputs
                let conv_config = nn::ConvConfig {
                    padding: kernel - 1,
                    ..Default::default()
                };
                nn::conv1d(
                    vs / "convs" / i,
                    config.embedding_dim,
                    config.num_filters,
                    kernel,
                    conv_config,
                )
            })
            .collect::<Vec<_>>();

        let features = config.num_filters * convs.len() as i64;
        let fc = nn::linear(vs / "fc", features, config.num_classes, Default::default());

        Self {
            embedding,
            convs,
            fc,
            dropout: config.dropout,
        }
    }
}

impl nn::ModuleT for CnnText {
    /// xs: [batch, seq_len] token ids -> [batch, num_classes] logits
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let emb = xs.apply(&self.embedding).transpose(1, 2);

        let pooled: Vec<Tensor> = self
            .convs
            .iter()
            .map(|conv| emb.apply(conv).relu().max_dim(2, false).0)
            .collect();

        Tensor::cat(&pooled, 1)
            .dropout(self.dropout, train)
            .apply(&self.fc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{nn::ModuleT, Device, Kind};

    #[test]
    fn produces_one_logit_row_per_example() {
        let vs = nn::VarStore::new(Device::Cpu);
        let config = ModelConfig {
            vocab_size: 20,
            embedding_dim: 8,
            num_classes: 3,
            num_filters: 4,
            ..Default::default()
        };
        let model = CnnText::new(&vs.root(), &config);

        let xs = Tensor::randint(20, [5, 12], (Kind::Int64, Device::Cpu));
        assert_eq!(model.forward_t(&xs, false).size(), vec![5, 3]);

        // shorter than the widest kernel
        let short = Tensor::randint(20, [2, 1], (Kind::Int64, Device::Cpu));
        assert_eq!(model.forward_t(&short, true).size(), vec![2, 3]);
    }
}
