//! The upstream model contract for table filling.
//!
//! Evaluation is restricted to a single device and a single model
//! instance; data-parallel wrappers must be unwrapped before handing the
//! model to [`super::evaluate`].

use burn::tensor::{backend::Backend, Int, Tensor};
use derive_new::new;

use crate::datasets::Document;

/// Model output for one evaluation batch, one beam of candidate
/// decodings per document
#[derive(Debug, Clone, new)]
pub struct EvalOutput<B: Backend> {
    /// Per document: candidate entity label predictions, `[beam, tokens]`
    pub entity_preds: Vec<Tensor<B, 2, Int>>,

    /// Per document: candidate entity scores, `[beam]`
    pub entity_scores: Vec<Tensor<B, 1>>,

    /// Per document: candidate relation logits, `[beam, labels, n, n]`
    pub rel_logits: Vec<Tensor<B, 4>>,
}

/// Model output for one training batch
#[derive(Debug, Clone, new)]
pub struct TrainOutput<B: Backend> {
    /// Per-token entity logits, `[batch, tokens, labels]`
    pub entity_logits: Tensor<B, 3>,

    /// Per-cell relation logits, `[batch, labels, n, n]`
    pub rel_logits: Tensor<B, 4>,
}

/// A trait for models that can be used for joint entity and relation
/// extraction via table filling
pub trait Model<B: Backend> {
    /// Forward pass for evaluation, producing a beam of candidate
    /// decodings per document
    fn forward_eval(&self, documents: &[Document]) -> EvalOutput<B>;

    /// Forward pass for training.
    ///
    /// `allow_rel` gates relation supervision so relation learning can be
    /// delayed until entity detection stabilizes.
    fn forward_train(
        &self,
        documents: &[Document],
        entity_labels: Tensor<B, 2, Int>,
        rel_labels: Tensor<B, 3, Int>,
        allow_rel: bool,
    ) -> TrainOutput<B>;
}
