//! Extraction of model tensors into candidate buffers, and label
//! alignment for the training side.

use burn::tensor::backend::Backend;
use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::utils::tensors::{to_float_vec, to_int_vec};

use super::{beam::Candidate, model::EvalOutput};

/// Candidate decodings for a batch of documents, extracted from the
/// model's tensors once per batch
#[derive(Debug, Clone, Serialize, Deserialize, new)]
pub struct PredictionBatch {
    /// Per document: the candidate beam
    pub docs: Vec<Vec<Candidate>>,
}

impl PredictionBatch {
    /// Extract an evaluation output into plain candidate buffers
    pub fn from_output<B: Backend>(output: EvalOutput<B>) -> Self {
        let mut docs = Vec::with_capacity(output.entity_preds.len());

        let documents = output
            .entity_preds
            .into_iter()
            .zip(output.entity_scores)
            .zip(output.rel_logits);

        for ((preds, scores), logits) in documents {
            let [beam_size, token_count] = preds.dims();
            let [_, label_count, n, _] = logits.dims();

            let pred_values = to_int_vec(preds);
            let score_values = to_float_vec(scores);
            let logit_values = to_float_vec(logits);

            let mut candidates = Vec::with_capacity(beam_size);

            for beam in 0..beam_size {
                let entity_labels = pred_values[beam * token_count..(beam + 1) * token_count]
                    .iter()
                    .map(|&l| l as usize)
                    .collect();

                let mut rel_logits = vec![vec![vec![0.0; n]; n]; label_count];
                let base = beam * label_count * n * n;
                for (label, matrix) in rel_logits.iter_mut().enumerate() {
                    for (i, row) in matrix.iter_mut().enumerate() {
                        for (j, cell) in row.iter_mut().enumerate() {
                            *cell = logit_values[base + label * n * n + i * n + j];
                        }
                    }
                }

                candidates.push(Candidate::new(entity_labels, score_values[beam], rel_logits));
            }

            docs.push(candidates);
        }

        Self { docs }
    }

    /// The number of documents in the batch
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Whether the batch holds no documents
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

/// Reduce subword-level label grids to the word-start positions.
///
/// `keep[b]` flags the encoding positions that begin a word; entity rows
/// keep the flagged positions and relation grids keep the flagged rows
/// and columns, so training labels line up with the model's word-level
/// table.
pub fn align_labels(
    entity: &[Vec<i64>],
    rel: &[Vec<Vec<i64>>],
    keep: &[Vec<bool>],
) -> (Vec<Vec<i64>>, Vec<Vec<Vec<i64>>>) {
    let mut entity_out = Vec::with_capacity(entity.len());
    let mut rel_out = Vec::with_capacity(rel.len());

    for ((entity_row, rel_grid), flags) in entity.iter().zip(rel.iter()).zip(keep.iter()) {
        entity_out.push(
            entity_row
                .iter()
                .zip(flags.iter())
                .filter_map(|(&label, &kept)| kept.then_some(label))
                .collect(),
        );

        let rows: Vec<&Vec<i64>> = rel_grid
            .iter()
            .zip(flags.iter())
            .filter_map(|(row, &kept)| kept.then_some(row))
            .collect();

        rel_out.push(
            rows.iter()
                .map(|row| {
                    row.iter()
                        .zip(flags.iter())
                        .filter_map(|(&label, &kept)| kept.then_some(label))
                        .collect()
                })
                .collect(),
        );
    }

    (entity_out, rel_out)
}

#[cfg(test)]
mod tests {
    use burn::{
        backend::NdArray,
        tensor::{Data, Int, Shape, Tensor},
    };
    use pretty_assertions::assert_eq;

    use crate::pipelines::table_filling::model::EvalOutput;

    use super::*;

    type B = NdArray<f32>;

    #[test]
    fn extracts_beam_candidates_from_tensors() {
        let device = Default::default();

        // Two candidates, two tokens
        let preds = Tensor::<B, 2, Int>::from_data(
            Data::new(vec![2i64, 0, 1, 3], Shape::new([2, 2])).convert(),
            &device,
        );
        let scores = Tensor::<B, 1>::from_data(
            Data::new(vec![0.25f64, 0.75], Shape::new([2])).convert(),
            &device,
        );
        // [beam=2, labels=1, n=2, n=2]
        let logits = Tensor::<B, 4>::from_data(
            Data::new(
                vec![0.0f64, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0],
                Shape::new([2, 1, 2, 2]),
            )
            .convert(),
            &device,
        );

        let output = EvalOutput::new(vec![preds], vec![scores], vec![logits]);
        let batch = PredictionBatch::from_output(output);

        assert_eq!(batch.len(), 1);
        let candidates = &batch.docs[0];
        assert_eq!(candidates.len(), 2);

        assert_eq!(candidates[0].entity_labels, vec![2, 0]);
        assert_eq!(candidates[1].entity_labels, vec![1, 3]);
        assert_eq!(candidates[0].entity_score, 0.25);
        assert_eq!(candidates[1].entity_score, 0.75);

        assert_eq!(candidates[0].rel_logits[0][0][1], 1.0);
        assert_eq!(candidates[1].rel_logits[0][1][0], 6.0);
    }

    #[test]
    fn align_labels_keeps_word_start_rows_and_columns() {
        let entity = vec![vec![1, 9, 4, 0]];
        let rel = vec![vec![
            vec![0, 1, 2, 3],
            vec![4, 5, 6, 7],
            vec![8, 9, 10, 11],
            vec![12, 13, 14, 15],
        ]];
        let keep = vec![vec![true, false, true, true]];

        let (entity_out, rel_out) = align_labels(&entity, &rel, &keep);

        assert_eq!(entity_out, vec![vec![1, 4, 0]]);
        assert_eq!(
            rel_out,
            vec![vec![vec![0, 2, 3], vec![8, 10, 11], vec![12, 14, 15]]]
        );
    }
}
