//! Evaluation documents and the word-to-subword token mask.
//!
//! All span positions are subword-encoding offsets with the classifier
//! token at position 0, half-open on the right. Documents are read-only
//! once loaded.

use std::{fs, path::Path};

use derive_new::new;
use log::info;
use serde::Deserialize;

use super::DatasetError;

/// Boolean matrix mapping encoding rows to covered subword positions.
///
/// Row 0 is the classifier-token slot; row `i + 1` covers the subwords of
/// word `i`. Special positions (classifier/separator) are never marked.
#[derive(Debug, Clone, Deserialize, new)]
#[serde(transparent)]
pub struct TokenMask {
    rows: Vec<Vec<bool>>,
}

impl TokenMask {
    /// The number of rows, including the classifier-token slot
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// The last subword position covered by a row, if any
    pub fn last_subword(&self, row: usize) -> Option<usize> {
        self.rows
            .get(row)?
            .iter()
            .rposition(|&covered| covered)
    }

    /// The first subword position covered by a row, if any
    pub fn first_subword(&self, row: usize) -> Option<usize> {
        self.rows.get(row)?.iter().position(|&covered| covered)
    }

    /// Translate a half-open encoding interval into a half-open word range.
    ///
    /// Returns the words whose subwords fall inside `[start, end)`. Used
    /// when rendering example reports over the word-level token stream.
    pub fn word_range(&self, start: usize, end: usize) -> (usize, usize) {
        let mut first = None;
        let mut last = 0;

        for (row, cols) in self.rows.iter().enumerate().skip(1) {
            let covered = cols
                .iter()
                .enumerate()
                .any(|(pos, &c)| c && pos >= start && pos < end);

            if covered {
                let word = row - 1;
                first.get_or_insert(word);
                last = word;
            }
        }

        match first {
            Some(first) => (first, last + 1),
            None => (0, 0),
        }
    }
}

/// A gold entity annotation over encoding positions
#[derive(Debug, Clone, Deserialize, new)]
pub struct GoldEntity {
    /// First covered encoding position
    pub start: usize,

    /// One past the last covered encoding position
    pub end: usize,

    /// The entity type index
    pub entity_type: usize,
}

/// A gold relation annotation between two entities of the same document
#[derive(Debug, Clone, Deserialize, new)]
pub struct GoldRelation {
    /// Position of the head entity in the document's entity list
    pub head: usize,

    /// Position of the tail entity in the document's entity list
    pub tail: usize,

    /// The relation type index
    pub relation_type: usize,
}

/// One evaluation document
#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    /// The word-level token stream
    pub tokens: Vec<String>,

    /// Gold entity annotations
    pub entities: Vec<GoldEntity>,

    /// Gold relation annotations
    pub relations: Vec<GoldRelation>,

    /// The word-to-subword coverage mask
    pub token_mask: TokenMask,
}

#[derive(Debug, Deserialize)]
struct RawDataset {
    label: String,
    documents: Vec<Document>,
}

/// An ordered collection of evaluation documents
#[derive(Debug, Clone)]
pub struct Dataset {
    /// The dataset label, e.g. `valid` or `test`
    pub label: String,

    documents: Vec<Document>,
}

impl Dataset {
    /// Create a dataset from pre-built documents
    pub fn from_documents(label: &str, documents: Vec<Document>) -> Result<Self, DatasetError> {
        for (i, doc) in documents.iter().enumerate() {
            for rel in &doc.relations {
                for endpoint in [rel.head, rel.tail] {
                    if endpoint >= doc.entities.len() {
                        return Err(DatasetError::BadRelationEndpoint {
                            document: i,
                            endpoint,
                        });
                    }
                }
            }
        }

        Ok(Self {
            label: label.to_string(),
            documents,
        })
    }

    /// Load a dataset from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DatasetError> {
        let contents = fs::read_to_string(path)?;
        let raw: RawDataset = serde_json::from_str(&contents)?;

        let dataset = Self::from_documents(&raw.label, raw.documents)?;
        dataset.log_statistics();

        Ok(dataset)
    }

    /// The documents, in dataset order
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// The number of documents
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// The total number of gold entities
    pub fn entity_count(&self) -> usize {
        self.documents.iter().map(|d| d.entities.len()).sum()
    }

    /// The total number of gold relations
    pub fn relation_count(&self) -> usize {
        self.documents.iter().map(|d| d.relations.len()).sum()
    }

    /// The total number of word-level tokens
    pub fn token_count(&self) -> usize {
        self.documents.iter().map(|d| d.tokens.len()).sum()
    }

    /// Log dataset statistics
    pub fn log_statistics(&self) {
        info!("Dataset: {}", self.label);
        info!("Document count: {}", self.document_count());
        info!("Relation count: {}", self.relation_count());
        info!("Entity count: {}", self.entity_count());
        info!("Token count: {}", self.token_count());
    }
}
