/// Documents, token masks, and dataset loading
pub mod documents;

pub use documents::{Dataset, Document, GoldEntity, GoldRelation, TokenMask};

/// Dataset Error
#[derive(thiserror::Error, Debug)]
pub enum DatasetError {
    /// The dataset file could not be read
    #[error("unable to read dataset file: {0}")]
    Io(#[from] std::io::Error),

    /// The dataset file could not be parsed
    #[error("unable to parse dataset file: {0}")]
    Json(#[from] serde_json::Error),

    /// A gold relation endpoint points outside the document's entity list
    #[error("relation endpoint {endpoint} out of range for document {document}")]
    BadRelationEndpoint {
        /// The document position within the dataset
        document: usize,

        /// The offending entity list position
        endpoint: usize,
    },
}
