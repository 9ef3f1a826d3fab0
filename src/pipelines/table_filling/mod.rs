//! Joint named-entity recognition and relation extraction with a table
//! filling formulation: entity labels per token, relation labels per
//! ordered pair of table positions. This module is the evaluation and
//! decoding core; the encoder forward pass stays behind the
//! [`model::Model`] trait.

/// Candidate extraction and label alignment
pub mod batcher;

/// Beam selection over candidate decodings
pub mod beam;

/// The evaluator lifecycle
pub mod evaluator;

/// Liquid-rendered comparison reports
pub mod examples;

/// The upstream model contract
pub mod model;

/// Relation decoding from the filled table
pub mod relation;

/// Union-alignment scoring
pub mod scoring;

/// BILOU-parity span decoding
pub mod span;

/// Shared value types
pub mod types;

pub use batcher::PredictionBatch;
pub use evaluator::{EvalConfig, Evaluator};
pub use scoring::EvalScores;
pub use types::{EntitySpan, RelationTuple, SpanTriple};

use burn::tensor::backend::Backend;

use crate::{datasets::Dataset, schema::Schema};

/// The unique string token that identifies this pipeline
pub static PIPELINE: &str = "table-filling";

/// Evaluation Error
#[derive(thiserror::Error, Debug)]
pub enum EvalError {
    /// The model produced no candidates for a document
    #[error("empty candidate beam")]
    EmptyBeam,

    /// A raw label implied an entity type the schema does not define
    #[error("unknown entity type index {0}")]
    UnknownEntityType(usize),

    /// A raw label implied a relation type the schema does not define
    #[error("unknown relation type index {0}")]
    UnknownRelationType(usize),

    /// A raw per-token label is outside the schema's label table
    #[error("unknown entity label index {0}")]
    UnknownEntityLabel(usize),

    /// A token mask row covers no subword positions
    #[error("token mask row {0} covers no subword positions")]
    EmptyMaskRow(usize),

    /// Prediction and document counts diverged; document order must be
    /// preserved end to end
    #[error("{predictions} prediction lists for {documents} documents")]
    LengthMismatch {
        /// Accumulated prediction lists
        predictions: usize,

        /// Documents in the dataset
        documents: usize,
    },

    /// The evaluator was used after finalization
    #[error("evaluator is already finalized")]
    Finalized,

    /// An output file could not be written
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The metrics CSV could not be written
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// A report template failed to parse or render
    #[error(transparent)]
    Template(#[from] liquid::Error),
}

/// Evaluate a model over a dataset, batch by batch.
///
/// Returns the NER, untyped relation, and typed relation scores. Example
/// reports are written afterwards when the config names a directory.
pub fn evaluate<B: Backend, M: model::Model<B>>(
    model: &M,
    dataset: &Dataset,
    schema: &Schema,
    config: EvalConfig,
    batch_size: usize,
) -> Result<(EvalScores, EvalScores, EvalScores), EvalError> {
    let store_examples = config.examples_dir.is_some();
    let mut evaluator = Evaluator::new(dataset, schema, config)?;

    for chunk in dataset.documents().chunks(batch_size.max(1)) {
        let output = model.forward_eval(chunk);
        let batch = PredictionBatch::from_output(output);
        evaluator.eval_batch(&batch)?;
    }

    let scores = evaluator.compute_scores()?;

    if store_examples {
        evaluator.store_examples()?;
    }

    Ok(scores)
}
