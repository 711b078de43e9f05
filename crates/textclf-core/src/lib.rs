pub mod architecture;
pub mod bilstm_conv;
pub mod cnn_text;
pub mod config;
pub mod embedding;
pub mod error;
pub mod safetensors_util;
pub mod vdcnn;

pub use architecture::Architecture;
pub use bilstm_conv::BiLstmConv;
pub use cnn_text::CnnText;
pub use config::ModelConfig;
pub use error::CoreError;
pub use vdcnn::Vdcnn;

/// Variable name of the token embedding table shared by every architecture.
pub const EMBEDDING_VAR: &str = "embedding.weight";
