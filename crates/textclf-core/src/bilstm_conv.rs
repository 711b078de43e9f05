use tch::nn::{self, RNN};
use tch::Tensor;

use crate::config::ModelConfig;

/// Bidirectional LSTM followed by a convolution over its per-step outputs.
#[derive(Debug)]
pub struct BiLstmConv {
    embedding: nn::Embedding,
    lstm: nn::LSTM,
    conv: nn::Conv1D,
    fc: nn::Linear,
    dropout: f64,
}

impl BiLstmConv {
    pub fn new(vs: &nn::Path, config: &ModelConfig) -> Self {
        let embedding = nn::embedding(
            vs / "embedding",
            config.vocab_size,
            config.embedding_dim,
            Default::default(),
        );

        let rnn_config = nn::RNNConfig {
            bidirectional: true,
            batch_first: true,
            ..Default::default()
        };
        let lstm = nn::lstm(
            vs / "lstm",
            config.embedding_dim,
            config.hidden_size,
            rnn_config,
        );

        let conv_config = nn::ConvConfig {
            padding: 1,
            ..Default::default()
        };
        let conv = nn::conv1d(
            vs / "conv",
            2 * config.hidden_size,
            config.num_filters,
            3,
            conv_config,
        );

        let fc = nn::linear(
            vs / "fc",
            config.num_filters,
            config.num_classes,
            Default::default(),
        );

        Self {
            embedding,
            lstm,
            conv,
            fc,
            dropout: config.dropout,
        }
    }
}

impl nn::ModuleT for BiLstmConv {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let emb = xs.apply(&self.embedding);

        // [batch, seq_len, 2 * hidden]
        let (outputs, _) = self.lstm.seq(&emb);

        outputs
            .transpose(1, 2)
            .apply(&self.conv)
            .relu()
            .max_dim(2, false)
            .0
            .dropout(self.dropout, train)
            .apply(&self.fc)
    }
}
