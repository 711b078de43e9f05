use regex::Regex;
use std::collections::HashMap;

use crate::error::Result;
use crate::vocab::Vocab;
use crate::word::{split_words, WORD_PATTERN};

/// Builds a word vocabulary from a training corpus.
///
/// Words are ordered by descending frequency with ties broken
/// lexicographically, so the same corpus always yields the same ids.
pub struct VocabBuilder {
    min_frequency: u32,
    max_size: Option<usize>,
}

impl VocabBuilder {
    pub fn new(min_frequency: u32, max_size: Option<usize>) -> Self {
        Self {
            min_frequency,
            max_size,
        }
    }

    pub fn build<'a, I>(&self, texts: I) -> Result<Vocab>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let regex = Regex::new(WORD_PATTERN)?;

        let mut word_counts: HashMap<String, u32> = HashMap::new();
        for text in texts {
            for word in split_words(&regex, text) {
                *word_counts.entry(word).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(String, u32)> = word_counts
            .into_iter()
            .filter(|(_, count)| *count >= self.min_frequency)
            .collect();
        ranked.sort_by(|(a_word, a_count), (b_word, b_count)| {
            b_count.cmp(a_count).then_with(|| a_word.cmp(b_word))
        });

        let mut vocab = Vocab::new();
        // max_size counts the reserved tokens too
        let limit = self.max_size.unwrap_or(usize::MAX);
        for (word, _) in ranked {
            if vocab.len() >= limit {
                break;
            }
            vocab.insert(word);
        }

        Ok(vocab)
    }
}

impl Default for VocabBuilder {
    fn default() -> Self {
        Self::new(1, None)
    }
}
