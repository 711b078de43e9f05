use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("unknown model architecture {name:?} (expected one of: {known})")]
    UnknownArchitecture { name: String, known: String },

    #[error("unsupported VDCNN depth {0} (expected 9, 17, 29 or 49)")]
    UnsupportedDepth(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("torch error: {0}")]
    Tch(#[from] tch::TchError),

    #[error("safetensors error: {0}")]
    SafeTensors(#[from] safetensors::SafeTensorError),

    #[error("unsupported tensor dtype {0}")]
    UnsupportedDtype(String),

    #[error("malformed embedding file at line {line}: {reason}")]
    EmbeddingFormat { line: usize, reason: String },

    #[error("model has no variable named {0}")]
    MissingVariable(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
