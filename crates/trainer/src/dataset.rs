use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tch::{Device, Tensor};
use thiserror::Error;
use tokenizer::WordTokenizer;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("dataset split {0} does not exist")]
    MissingSplit(PathBuf),

    #[error("{path}:{line}: expected `label<TAB>text`")]
    MalformedLine { path: PathBuf, line: u64 },

    #[error("label {0:?} does not occur in the training split")]
    UnknownLabel(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DatasetError>;

/// One line of a dataset split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelledText {
    pub label: String,
    pub text: String,
}

/// Reads a `label<TAB>text` file. Quotes are not interpreted; extra tabs are
/// folded into the text.
pub fn read_split(path: &Path) -> Result<Vec<LabelledText>> {
    if !path.exists() {
        return Err(DatasetError::MissingSplit(path.to_path_buf()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_path(path)?;

    let mut examples = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        if record.len() < 2 || record[0].trim().is_empty() {
            return Err(DatasetError::MalformedLine {
                path: path.to_path_buf(),
                line,
            });
        }
        let text = record.iter().skip(1).collect::<Vec<_>>().join(" ");
        examples.push(LabelledText {
            label: record[0].trim().to_string(),
            text,
        });
    }

    Ok(examples)
}

/// Sorted distinct class labels; a label's class index is its position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet {
    names: Vec<String>,
}

impl LabelSet {
    pub fn from_examples(examples: &[LabelledText]) -> Self {
        let names: BTreeSet<&str> = examples.iter().map(|e| e.label.as_str()).collect();
        Self {
            names: names.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn index_of(&self, label: &str) -> Result<i64> {
        self.names
            .binary_search_by(|name| name.as_str().cmp(label))
            .map(|idx| idx as i64)
            .map_err(|_| DatasetError::UnknownLabel(label.to_string()))
    }

    pub fn name(&self, index: i64) -> Option<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.names.get(i))
            .map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

/// A pair of input token ids `[B, T]` and class indices `[B]`, both int64 on
/// the dataset's device. `targets` keeps a host copy of the labels.
#[derive(Debug)]
pub struct Batch {
    pub text: Tensor,
    pub label: Tensor,
    pub targets: Vec<i64>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Encoded split: fixed-length token rows and their class indices.
#[derive(Debug)]
pub struct TextDataset {
    rows: Vec<Vec<i64>>,
    labels: Vec<i64>,
    seq_len: usize,
    device: Device,
}

impl TextDataset {
    pub fn encode(
        examples: &[LabelledText],
        labels: &LabelSet,
        tokenizer: &WordTokenizer,
        seq_len: usize,
        device: Device,
    ) -> Result<Self> {
        let texts: Vec<&str> = examples.iter().map(|e| e.text.as_str()).collect();
        let rows = tokenizer.encode_batch(&texts, seq_len);
        let labels = examples
            .iter()
            .map(|e| labels.index_of(&e.label))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            rows,
            labels,
            seq_len,
            device,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[i64] {
        &self.labels
    }

    /// Batches in dataset order.
    pub fn batches(&self, batch_size: usize) -> Batches<'_> {
        Batches::new(self, (0..self.len()).collect(), batch_size)
    }

    /// Batches in an order drawn from `rng`.
    pub fn shuffled_batches(&self, batch_size: usize, rng: &mut StdRng) -> Batches<'_> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(rng);
        Batches::new(self, order, batch_size)
    }

    fn batch(&self, indices: &[usize]) -> Batch {
        let mut tokens = Vec::with_capacity(indices.len() * self.seq_len);
        let mut targets = Vec::with_capacity(indices.len());
        for &i in indices {
            tokens.extend_from_slice(&self.rows[i]);
            targets.push(self.labels[i]);
        }

        let text = Tensor::from_slice(&tokens)
            .view([indices.len() as i64, self.seq_len as i64])
            .to(self.device);
        let label = Tensor::from_slice(&targets).to(self.device);

        Batch {
            text,
            label,
            targets,
        }
    }
}

/// Iterator over the batches of a `TextDataset`; the last batch may be short.
pub struct Batches<'a> {
    dataset: &'a TextDataset,
    order: Vec<usize>,
    batch_size: usize,
    position: usize,
}

impl<'a> Batches<'a> {
    fn new(dataset: &'a TextDataset, order: Vec<usize>, batch_size: usize) -> Self {
        Self {
            dataset,
            order,
            batch_size: batch_size.max(1),
            position: 0,
        }
    }

    pub fn num_batches(&self) -> usize {
        self.order.len().div_ceil(self.batch_size)
    }
}

impl Iterator for Batches<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.position >= self.order.len() {
            return None;
        }
        let end = (self.position + self.batch_size).min(self.order.len());
        let batch = self.dataset.batch(&self.order[self.position..end]);
        self.position = end;
        Some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use tokenizer::VocabBuilder;

    fn write_split(name: &str, body: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{name}_{}.tsv", std::process::id()));
        std::fs::write(&path, body).unwrap();
        path
    }

    fn examples() -> Vec<LabelledText> {
        ["pos\tgreat stay", "neg\tawful room", "pos\tlovely staff", "neu\tit was ok", "neg\t\"dirty\" sheets"]
            .iter()
            .map(|line| {
                let (label, text) = line.split_once('\t').unwrap();
                LabelledText {
                    label: label.to_string(),
                    text: text.to_string(),
                }
            })
            .collect()
    }

    #[test]
    fn reads_tab_separated_lines_without_quoting() {
        let path = write_split("split_ok", "pos\tgreat \"value\"\n\nneg\tnot\tgood\n");
        let rows = read_split(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text, "great \"value\"");
        assert_eq!(rows[1].label, "neg");
        assert_eq!(rows[1].text, "not good");
    }

    #[test]
    fn rejects_lines_without_text() {
        let path = write_split("split_bad", "pos\tfine\nlonely\n");
        let err = read_split(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, DatasetError::MalformedLine { line: 2, .. }));
    }

    #[test]
    fn missing_split_is_reported() {
        let err = read_split(Path::new("/definitely/not/here.tsv")).unwrap_err();
        assert!(matches!(err, DatasetError::MissingSplit(_)));
    }

    #[test]
    fn label_indices_follow_sorted_order() {
        let labels = LabelSet::from_examples(&examples());
        assert_eq!(labels.names(), &["neg", "neu", "pos"]);
        assert_eq!(labels.index_of("pos").unwrap(), 2);
        assert_eq!(labels.name(1), Some("neu"));
        assert!(matches!(
            labels.index_of("mixed"),
            Err(DatasetError::UnknownLabel(_))
        ));
    }

    #[test]
    fn batches_cover_every_example_once() {
        let examples = examples();
        let labels = LabelSet::from_examples(&examples);
        let vocab = VocabBuilder::default()
            .build(examples.iter().map(|e| e.text.as_str()))
            .unwrap();
        let tokenizer = WordTokenizer::new(vocab).unwrap();
        let dataset = TextDataset::encode(&examples, &labels, &tokenizer, 4, Device::Cpu).unwrap();

        let batches: Vec<Batch> = dataset.batches(2).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].text.size(), vec![2, 4]);
        assert_eq!(batches[2].len(), 1);
        let seen: Vec<i64> = batches.iter().flat_map(|b| b.targets.clone()).collect();
        assert_eq!(seen, dataset.labels());

        let mut rng = StdRng::seed_from_u64(7);
        let mut shuffled: Vec<i64> = dataset
            .shuffled_batches(2, &mut rng)
            .flat_map(|b| b.targets)
            .collect();
        shuffled.sort_unstable();
        let mut expected = dataset.labels().to_vec();
        expected.sort_unstable();
        assert_eq!(shuffled, expected);
    }
}
