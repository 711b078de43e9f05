use rayon::prelude::*;
use regex::Regex;

use crate::error::Result;
use crate::vocab::Vocab;

pub(crate) const WORD_PATTERN: &str = r"[\p{L}\p{N}]+(?:'[\p{L}]+)?|[^\s\p{L}\p{N}]";

/// Lowercasing word/punctuation tokenizer backed by a fixed vocabulary.
#[derive(Clone)]
pub struct WordTokenizer {
    vocab: Vocab,
    regex: Regex,
}

// Custom Debug impl to skip regex
impl std::fmt::Debug for WordTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WordTokenizer")
            .field("vocab_size", &self.vocab.len())
            .finish()
    }
}

/// Splits `text` into lowercased words and single punctuation marks.
pub fn split_words(regex: &Regex, text: &str) -> Vec<String> {
    regex
        .find_iter(text)
        .map(|mat| mat.as_str().to_lowercase())
        .collect()
}

impl WordTokenizer {
    pub fn new(vocab: Vocab) -> Result<Self> {
        Ok(Self {
            vocab,
            regex: Regex::new(WORD_PATTERN)?,
        })
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        split_words(&self.regex, text)
    }

    pub fn encode(&self, text: &str) -> Vec<u32> {
        self.regex
            .find_iter(text)
            .map(|mat| self.vocab.id_or_unk(&mat.as_str().to_lowercase()))
            .collect()
    }

    /// Encodes `text` truncated or right-padded with `<pad>` to exactly `len` ids.
    pub fn encode_padded(&self, text: &str, len: usize) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .encode(text)
            .into_iter()
            .take(len)
            .map(i64::from)
            .collect();
        ids.resize(len, i64::from(Vocab::PAD_ID));
        ids
    }

    /// Parallel `encode_padded` over many texts; output order matches input order.
    pub fn encode_batch<S: AsRef<str> + Sync>(&self, texts: &[S], len: usize) -> Vec<Vec<i64>> {
        texts
            .par_iter()
            .map(|text| self.encode_padded(text.as_ref(), len))
            .collect()
    }

    pub fn decode(&self, ids: &[u32]) -> String {
        ids.iter()
            .filter(|&&id| id != Vocab::PAD_ID)
            .filter_map(|&id| self.vocab.get_token(id))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenizer() -> WordTokenizer {
        let mut vocab = Vocab::new();
        for word in ["the", "room", "was", "clean", "."] {
            vocab.insert(word.to_string());
        }
        WordTokenizer::new(vocab).unwrap()
    }

    #[test]
    fn splits_words_and_punctuation() {
        let tok = tokenizer();
        assert_eq!(
            tok.tokenize("The room wasn't CLEAN!"),
            vec!["the", "room", "wasn't", "clean", "!"]
        );
    }

    #[test]
    fn unknown_words_map_to_unk() {
        let tok = tokenizer();
        assert_eq!(tok.encode("the pool was clean."), vec![2, 1, 4, 5, 6]);
    }

    #[test]
    fn encode_padded_truncates_and_pads() {
        let tok = tokenizer();
        assert_eq!(tok.encode_padded("the room", 4), vec![2, 3, 0, 0]);
        assert_eq!(tok.encode_padded("the room was clean.", 3), vec![2, 3, 4]);
        assert!(tok.encode_padded("", 2).iter().all(|&id| id == 0));
    }

    #[test]
    fn batch_encoding_preserves_order() {
        let tok = tokenizer();
        let texts = vec!["clean", "room", "the"];
        let encoded = tok.encode_batch(&texts, 1);
        assert_eq!(encoded, vec![vec![5], vec![3], vec![2]]);
    }

    #[test]
    fn decode_skips_padding() {
        let tok = tokenizer();
        assert_eq!(tok.decode(&[2, 3, 0, 0]), "the room");
    }
}
