//! Union-alignment scoring with per-type and micro/macro averages.
//!
//! Gold and predicted tuples for a document are merged into one ordered
//! union; each member contributes its type index to the gold stream when
//! it is gold (else 0) and to the prediction stream when it is predicted
//! (else 0). Because tuple equality already requires exact span and type
//! agreement, the two equal-length streams feed a standard multi-class
//! precision/recall/F1 computation with no explicit bipartite matching:
//! matched items become true positives, missed gold items false
//! negatives, and unmatched predictions false positives.

use std::{
    collections::{BTreeMap, HashSet},
    hash::Hash,
};

use derive_new::new;

use super::{
    types::{EntitySpan, RelationTuple},
    EvalError,
};

/// An item the scoring engine can place in a typed label stream
pub trait Labeled {
    /// The type index contributed to the label streams
    fn type_index(&self) -> usize;

    /// The type name shown in the metrics table
    fn type_name(&self) -> &str;
}

impl Labeled for EntitySpan {
    fn type_index(&self) -> usize {
        self.entity_type.index
    }

    fn type_name(&self) -> &str {
        &self.entity_type.short_name
    }
}

impl Labeled for RelationTuple {
    fn type_index(&self) -> usize {
        self.relation_type.index
    }

    fn type_name(&self) -> &str {
        &self.relation_type.short_name
    }
}

/// Precision, recall, and F1 as percentages, plus the support count
#[derive(Debug, Clone, Copy, PartialEq, new)]
pub struct Prf {
    /// Precision in percent
    pub precision: f64,

    /// Recall in percent
    pub recall: f64,

    /// F1 score in percent
    pub f1: f64,

    /// The number of gold instances
    pub support: usize,
}

/// Micro and macro averages for one evaluation setting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalScores {
    /// Instance-pooled averages
    pub micro: Prf,

    /// Unweighted mean over observed types
    pub macro_avg: Prf,
}

impl EvalScores {
    /// The six metric values in reporting order: micro P/R/F1, macro P/R/F1
    pub fn as_row(&self) -> [f64; 6] {
        [
            self.micro.precision,
            self.micro.recall,
            self.micro.f1,
            self.macro_avg.precision,
            self.macro_avg.recall,
            self.macro_avg.f1,
        ]
    }
}

/// Score per-document gold and prediction lists for one evaluation setting.
///
/// `gt` and `pred` must be index-aligned per document. Set `print_results`
/// to emit the per-type metrics table on stdout.
pub fn score<T>(gt: &[Vec<T>], pred: &[Vec<T>], print_results: bool) -> Result<EvalScores, EvalError>
where
    T: Labeled + Eq + Hash + Clone,
{
    if gt.len() != pred.len() {
        return Err(EvalError::LengthMismatch {
            predictions: pred.len(),
            documents: gt.len(),
        });
    }

    let mut gt_flat = Vec::new();
    let mut pred_flat = Vec::new();
    let mut types: BTreeMap<usize, String> = BTreeMap::new();

    for (sample_gt, sample_pred) in gt.iter().zip(pred.iter()) {
        let gt_set: HashSet<&T> = sample_gt.iter().collect();
        let pred_set: HashSet<&T> = sample_pred.iter().collect();

        // Gold items first, then unmatched predictions, deduplicated in
        // first-occurrence order so repeated runs emit identical streams
        let mut seen = HashSet::new();
        let union = sample_gt
            .iter()
            .chain(sample_pred.iter())
            .filter(|item| seen.insert(*item));

        for item in union {
            if gt_set.contains(item) {
                gt_flat.push(item.type_index());
                types
                    .entry(item.type_index())
                    .or_insert_with(|| item.type_name().to_string());
            } else {
                gt_flat.push(0);
            }

            if pred_set.contains(item) {
                pred_flat.push(item.type_index());
                types
                    .entry(item.type_index())
                    .or_insert_with(|| item.type_name().to_string());
            } else {
                pred_flat.push(0);
            }
        }
    }

    Ok(compute_metrics(&gt_flat, &pred_flat, &types, print_results))
}

/// Per-type counts for one label
#[derive(Debug, Default, Clone, Copy)]
struct Counts {
    tp: usize,
    fp: usize,
    fn_: usize,
}

impl Counts {
    fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    fn f1(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    fn support(&self) -> usize {
        self.tp + self.fn_
    }
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        0.0
    } else {
        num as f64 / denom as f64
    }
}

fn compute_metrics(
    gt: &[usize],
    pred: &[usize],
    types: &BTreeMap<usize, String>,
    print_results: bool,
) -> EvalScores {
    let mut per_type: BTreeMap<usize, Counts> = BTreeMap::new();

    for label in types.keys() {
        per_type.insert(*label, Counts::default());
    }

    for (&g, &p) in gt.iter().zip(pred.iter()) {
        if g == p {
            if let Some(counts) = per_type.get_mut(&g) {
                counts.tp += 1;
            }
        } else {
            if let Some(counts) = per_type.get_mut(&g) {
                counts.fn_ += 1;
            }
            if let Some(counts) = per_type.get_mut(&p) {
                counts.fp += 1;
            }
        }
    }

    let pooled = per_type.values().fold(Counts::default(), |mut acc, c| {
        acc.tp += c.tp;
        acc.fp += c.fp;
        acc.fn_ += c.fn_;
        acc
    });

    let total_support = pooled.support();

    let micro = Prf::new(
        pooled.precision() * 100.0,
        pooled.recall() * 100.0,
        pooled.f1() * 100.0,
        total_support,
    );

    let type_count = per_type.len().max(1);
    let macro_avg = Prf::new(
        per_type.values().map(Counts::precision).sum::<f64>() / type_count as f64 * 100.0,
        per_type.values().map(Counts::recall).sum::<f64>() / type_count as f64 * 100.0,
        per_type.values().map(Counts::f1).sum::<f64>() / type_count as f64 * 100.0,
        total_support,
    );

    if print_results {
        print_table(&per_type, types, &micro, &macro_avg);
    }

    EvalScores { micro, macro_avg }
}

fn print_table(
    per_type: &BTreeMap<usize, Counts>,
    types: &BTreeMap<usize, String>,
    micro: &Prf,
    macro_avg: &Prf,
) {
    println!("{}", format_row("type", "precision", "recall", "f1-score", "support"));

    for (label, counts) in per_type {
        let prf = Prf::new(
            counts.precision() * 100.0,
            counts.recall() * 100.0,
            counts.f1() * 100.0,
            counts.support(),
        );
        println!("{}", format_metric_row(&types[label], &prf));
    }

    println!();
    println!("{}", format_metric_row("micro", micro));
    println!("{}", format_metric_row("macro", macro_avg));
}

fn format_row(a: &str, b: &str, c: &str, d: &str, e: &str) -> String {
    format!("{:>20} {:>12} {:>12} {:>12} {:>12}", a, b, c, d, e)
}

fn format_metric_row(label: &str, prf: &Prf) -> String {
    format_row(
        label,
        &format!("{:.2}", prf.precision),
        &format!("{:.2}", prf.recall),
        &format!("{:.2}", prf.f1),
        &prf.support.to_string(),
    )
}
