//! Beam selection over candidate decodings.
//!
//! The model emits several candidate decodings per document. Each is
//! collapsed to a single scalar: the candidate's entity score plus the
//! strict-upper-triangle sum of per-cell best relation scores, the latter
//! divided by the token count so relation totals cannot dominate on long
//! documents. Relation logits are variance-stabilized with
//! `x / sqrt(|x|)` before any reduction to blunt outlier logits.

use derive_new::new;
use serde::{Deserialize, Serialize};

use super::EvalError;

/// One candidate decoding from the model beam
#[derive(Debug, Clone, Serialize, Deserialize, new)]
pub struct Candidate {
    /// Raw per-token entity label predictions
    pub entity_labels: Vec<usize>,

    /// The candidate's scalar entity score
    pub entity_score: f64,

    /// Relation logits laid out `[label][i][j]` over table positions
    pub rel_logits: Vec<Vec<Vec<f64>>>,
}

/// The per-cell winning relation label and its probability
#[derive(Debug, Clone)]
pub struct RelationTable {
    /// Winning raw label per ordered cell
    pub labels: Vec<Vec<usize>>,

    /// Post-softmax probability of the winning label per cell
    pub scores: Vec<Vec<f64>>,
}

impl RelationTable {
    /// The table side length
    pub fn size(&self) -> usize {
        self.labels.len()
    }
}

/// Variance-stabilize a relation logit
fn stabilize(x: f64) -> f64 {
    if x == 0.0 {
        0.0
    } else {
        x / x.abs().sqrt()
    }
}

/// The combined entity+relation score of one candidate
fn candidate_score(candidate: &Candidate) -> f64 {
    let token_count = candidate.entity_labels.len().max(1);
    let labels = &candidate.rel_logits;

    let n = labels.first().map(|m| m.len()).unwrap_or(0);
    let mut rel_total = 0.0;

    for i in 0..n {
        for j in (i + 1)..n {
            let best = labels
                .iter()
                .map(|m| stabilize(m[i][j]))
                .fold(f64::NEG_INFINITY, f64::max);

            if best.is_finite() {
                rel_total += best;
            }
        }
    }

    candidate.entity_score + rel_total / token_count as f64
}

/// Softmax the chosen candidate's stabilized logits over the label axis
/// and reduce each cell to its winning label and probability
fn relation_table(candidate: &Candidate) -> RelationTable {
    let label_count = candidate.rel_logits.len();
    let n = candidate.rel_logits.first().map(|m| m.len()).unwrap_or(0);

    let mut labels = vec![vec![0; n]; n];
    let mut scores = vec![vec![0.0; n]; n];

    for i in 0..n {
        for j in 0..n {
            let logits: Vec<f64> = (0..label_count)
                .map(|l| stabilize(candidate.rel_logits[l][i][j]))
                .collect();

            let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let exps: Vec<f64> = logits.iter().map(|&x| (x - max).exp()).collect();
            let total: f64 = exps.iter().sum();

            let mut best_label = 0;
            let mut best_score = f64::NEG_INFINITY;
            for (label, &e) in exps.iter().enumerate() {
                let p = e / total;
                if p > best_score {
                    best_label = label;
                    best_score = p;
                }
            }

            labels[i][j] = best_label;
            scores[i][j] = best_score;
        }
    }

    RelationTable { labels, scores }
}

/// Select the best candidate from a beam.
///
/// Returns the chosen beam index and the per-cell relation table of the
/// winning candidate. Ties resolve to the lowest index.
pub fn select(candidates: &[Candidate]) -> Result<(usize, RelationTable), EvalError> {
    let mut best: Option<(usize, f64)> = None;

    for (i, candidate) in candidates.iter().enumerate() {
        let score = candidate_score(candidate);
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((i, score)),
        }
    }

    let (beam_id, _) = best.ok_or(EvalError::EmptyBeam)?;

    Ok((beam_id, relation_table(&candidates[beam_id])))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn flat_logits(label_count: usize, n: usize, fill: f64) -> Vec<Vec<Vec<f64>>> {
        vec![vec![vec![fill; n]; n]; label_count]
    }

    #[test]
    fn prefers_higher_entity_score_with_identical_relations() {
        let low = Candidate::new(vec![1, 0], 1.0, flat_logits(3, 2, 0.5));
        let high = Candidate::new(vec![1, 0], 2.0, flat_logits(3, 2, 0.5));

        let (beam_id, _) = select(&[low, high]).unwrap();

        assert_eq!(beam_id, 1);
    }

    #[test]
    fn ties_resolve_to_lowest_index() {
        let a = Candidate::new(vec![1, 0], 1.0, flat_logits(3, 2, 0.5));
        let b = a.clone();

        let (beam_id, _) = select(&[a, b]).unwrap();

        assert_eq!(beam_id, 0);
    }

    #[test]
    fn selection_is_deterministic() {
        let a = Candidate::new(vec![2, 4], 0.3, flat_logits(3, 2, -1.5));
        let b = Candidate::new(vec![0, 0], 0.9, flat_logits(3, 2, 2.0));

        let first = select(&[a.clone(), b.clone()]).unwrap().0;
        let second = select(&[a, b]).unwrap().0;

        assert_eq!(first, second);
    }

    #[test]
    fn empty_beam_is_an_error() {
        assert!(matches!(select(&[]), Err(EvalError::EmptyBeam)));
    }

    #[test]
    fn relation_table_picks_argmax_label_per_cell() {
        let mut logits = flat_logits(3, 2, 0.1);
        // Cell (0, 1): label 2 dominates
        logits[2][0][1] = 4.0;

        let candidate = Candidate::new(vec![1, 0], 1.0, logits);
        let (_, table) = select(&[candidate]).unwrap();

        assert_eq!(table.labels[0][1], 2);
        assert!(table.scores[0][1] > 1.0 / 3.0);
    }

    #[test]
    fn stabilize_is_signed_square_root() {
        assert_eq!(stabilize(4.0), 2.0);
        assert_eq!(stabilize(-4.0), -2.0);
        assert_eq!(stabilize(0.0), 0.0);
    }

    #[test]
    fn relation_scores_are_length_normalized() {
        // Same relation mass, longer document: relation share must shrink
        let short = Candidate::new(vec![1], 0.0, flat_logits(1, 2, 1.0));
        let long = Candidate::new(vec![1, 1, 1, 1], 0.0, flat_logits(1, 2, 1.0));

        assert!(candidate_score(&short) > candidate_score(&long));
    }
}
