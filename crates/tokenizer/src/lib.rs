pub mod builder;
pub mod error;
pub mod vocab;
pub mod word;

pub use builder::VocabBuilder;
pub use error::TokenizerError;
pub use vocab::{Vocab, PAD_TOKEN, UNK_TOKEN};
pub use word::WordTokenizer;
