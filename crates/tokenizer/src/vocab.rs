use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::error::{Result, TokenizerError};

pub const PAD_TOKEN: &str = "<pad>";
pub const UNK_TOKEN: &str = "<unk>";

/// Word vocabulary with `<pad>` at id 0 and `<unk>` at id 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vocab {
    token_to_id: HashMap<String, u32>,
    id_to_token: Vec<String>,
}

impl Vocab {
    pub const PAD_ID: u32 = 0;
    pub const UNK_ID: u32 = 1;

    pub fn new() -> Self {
        let mut vocab = Self {
            token_to_id: HashMap::new(),
            id_to_token: Vec::new(),
        };
        vocab.insert(PAD_TOKEN.to_string());
        vocab.insert(UNK_TOKEN.to_string());
        vocab
    }

    /// Appends `token` and returns its id. Known tokens keep their id.
    pub fn insert(&mut self, token: String) -> u32 {
        if let Some(&id) = self.token_to_id.get(&token) {
            return id;
        }
        let id = self.id_to_token.len() as u32;
        self.token_to_id.insert(token.clone(), id);
        self.id_to_token.push(token);
        id
    }

    pub fn get_id(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    pub fn id_or_unk(&self, token: &str) -> u32 {
        self.get_id(token).unwrap_or(Self::UNK_ID)
    }

    pub fn get_token(&self, id: u32) -> Option<&str> {
        self.id_to_token.get(id as usize).map(String::as_str)
    }

    pub fn tokens(&self) -> impl Iterator<Item = (u32, &str)> {
        self.id_to_token
            .iter()
            .enumerate()
            .map(|(id, token)| (id as u32, token.as_str()))
    }

    pub fn len(&self) -> usize {
        self.id_to_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_token.is_empty()
    }

    /// True when nothing but the reserved tokens is present.
    pub fn has_no_words(&self) -> bool {
        self.id_to_token.len() <= 2
    }

    /// Writes the tokens as a JSON array ordered by id.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &self.id_to_token)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let id_to_token: Vec<String> = serde_json::from_reader(reader)?;

        if id_to_token.first().map(String::as_str) != Some(PAD_TOKEN) {
            return Err(TokenizerError::MissingSpecialToken(PAD_TOKEN));
        }
        if id_to_token.get(1).map(String::as_str) != Some(UNK_TOKEN) {
            return Err(TokenizerError::MissingSpecialToken(UNK_TOKEN));
        }

        let mut token_to_id = HashMap::with_capacity(id_to_token.len());
        for (id, token) in id_to_token.iter().enumerate() {
            if token_to_id.insert(token.clone(), id as u32).is_some() {
                return Err(TokenizerError::DuplicateToken(token.clone()));
            }
        }

        Ok(Self {
            token_to_id,
            id_to_token,
        })
    }
}

impl Default for Vocab {
    fn default() -> Self {
        Self::new()
    }
}
