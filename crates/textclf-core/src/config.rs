use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Number of rows in the token embedding table.
    pub vocab_size: i64,
    /// Width of the token embeddings. Replaced by the vector width when
    /// pretrained embeddings are loaded.
    pub embedding_dim: i64,
    /// Number of output classes.
    pub num_classes: i64,
    /// Dropout probability applied before the classifier head.
    pub dropout: f64,
    /// Hidden size of each LSTM direction (BiLSTMConv).
    pub hidden_size: i64,
    /// Output channels per convolution (BiLSTMConv, CNN_Text_Model).
    pub num_filters: i64,
    /// Convolution widths of the parallel branches (CNN_Text_Model).
    pub kernel_sizes: Vec<i64>,
    /// Network depth (VDCNN): 9, 17, 29 or 49.
    pub vdcnn_depth: i64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            vocab_size: 2,
            embedding_dim: 128,
            num_classes: 2,
            dropout: 0.5,
            hidden_size: 128,
            num_filters: 100,
            kernel_sizes: vec![3, 4, 5],
            vdcnn_depth: 9,
        }
    }
}

impl ModelConfig {
    pub fn max_kernel_size(&self) -> i64 {
        self.kernel_sizes.iter().copied().max().unwrap_or(1)
    }
}
