use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tch::{nn, Tensor};

use crate::error::{CoreError, Result};
use crate::EMBEDDING_VAR;

/// Word vectors read from a whitespace-separated text file (GloVe layout,
/// optionally preceded by a word2vec `<count> <dim>` header line).
#[derive(Debug, Clone)]
pub struct PretrainedEmbeddings {
    dim: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl PretrainedEmbeddings {
    /// Reads the vectors of every word for which `keep` returns true.
    /// All rows must share the same width, including skipped ones.
    pub fn load<P, F>(path: P, keep: F) -> Result<Self>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> bool,
    {
        let reader = BufReader::new(File::open(path)?);
        let mut dim: Option<usize> = None;
        let mut vectors = HashMap::new();

        let mut lines = reader.lines().enumerate().peekable();
        while let Some((i, line)) = lines.next() {
            let line = line?;
            let mut fields = line.split_whitespace();
            let Some(word) = fields.next() else {
                continue;
            };
            let values: Vec<&str> = fields.collect();

            if i == 0 && is_word2vec_header(word, &values, lines.peek()) {
                continue;
            }

            let width = values.len();
            if width == 0 {
                return Err(CoreError::EmbeddingFormat {
                    line: i + 1,
                    reason: format!("word {word:?} has no vector"),
                });
            }
            match dim {
                None => dim = Some(width),
                Some(expected) if expected != width => {
                    return Err(CoreError::EmbeddingFormat {
                        line: i + 1,
                        reason: format!("expected {expected} values, found {width}"),
                    });
                }
                Some(_) => {}
            }

            if !keep(word) {
                continue;
            }
            let vector = values
                .iter()
                .map(|v| v.parse::<f32>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|err| CoreError::EmbeddingFormat {
                    line: i + 1,
                    reason: err.to_string(),
                })?;
            vectors.insert(word.to_string(), vector);
        }

        let dim = dim.ok_or_else(|| CoreError::EmbeddingFormat {
            line: 0,
            reason: "file contains no vectors".to_string(),
        })?;

        Ok(Self { dim, vectors })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn get(&self, word: &str) -> Option<&[f32]> {
        self.vectors.get(word).map(Vec::as_slice)
    }

    /// Overwrites the embedding rows of every `(id, word)` that has a vector.
    /// Returns how many rows were replaced.
    pub fn copy_into<'a, I>(&self, vs: &nn::VarStore, words: I) -> Result<usize>
    where
        I: IntoIterator<Item = (u32, &'a str)>,
    {
        let variables = vs.variables();
        let weight = variables
            .get(EMBEDDING_VAR)
            .ok_or_else(|| CoreError::MissingVariable(EMBEDDING_VAR.to_string()))?;

        let (rows, cols) = weight.size2()?;
        if cols != self.dim as i64 {
            return Err(CoreError::EmbeddingFormat {
                line: 0,
                reason: format!("model embedding width {cols} != vector width {}", self.dim),
            });
        }

        let mut replaced = 0;
        tch::no_grad(|| {
            for (id, word) in words {
                let id = i64::from(id);
                if id >= rows {
                    continue;
                }
                if let Some(vector) = self.get(word) {
                    let mut row = weight.get(id);
                    row.copy_(&Tensor::from_slice(vector));
                    replaced += 1;
                }
            }
        });

        Ok(replaced)
    }
}

/// A `<count> <dim>` first line whose `dim` matches the width of the row after it.
fn is_word2vec_header(
    first: &str,
    values: &[&str],
    next: Option<&(usize, std::io::Result<String>)>,
) -> bool {
    let [dim] = values else {
        return false;
    };
    if first.parse::<usize>().is_err() {
        return false;
    }
    let Ok(dim) = dim.parse::<usize>() else {
        return false;
    };
    match next {
        Some((_, Ok(row))) => row.split_whitespace().count() == dim + 1,
        _ => false,
    }
}
