//! Relation extraction from the filled table.
//!
//! The winning-label matrix is direction-encoded and mirrored across the
//! diagonal, so only the strict upper triangle is consulted; walking both
//! halves would double-count every pair. Raw label `v != 0` encodes
//! `relation_type = ceil(v / 2)`; whether the row or the column position
//! is the head depends on the right-direction label set. Endpoints attach
//! to the decoded span whose end boundary covers them; pairs with an
//! unresolved endpoint are dropped rather than reported.

use crate::{
    datasets::TokenMask,
    schema::Schema,
};

use super::{
    beam::RelationTable,
    types::{EntitySpan, RelationTuple},
    EvalError,
};

/// Decode directed relation tuples from the per-cell winning labels.
pub fn decode_relations(
    table: &RelationTable,
    spans: &[EntitySpan],
    mask: &TokenMask,
    schema: &Schema,
) -> Result<Vec<RelationTuple>, EvalError> {
    let mut relations = Vec::new();
    let n = table.size();

    for i in 0..n {
        for j in (i + 1)..n {
            let label = table.labels[i][j];
            if label == 0 {
                continue;
            }

            let type_idx = (label + 1) / 2;
            let relation_type = schema
                .relation_type(type_idx)
                .ok_or(EvalError::UnknownRelationType(type_idx))?;

            let (head_idx, tail_idx) = if schema.is_right_direction(label) {
                (i, j)
            } else {
                (j, i)
            };

            let head = find_entity(head_idx + 1, mask, spans);
            let tail = find_entity(tail_idx + 1, mask, spans);

            // Endpoints without a covering decoded entity drop the pair
            let (Some(head), Some(tail)) = (head, tail) else {
                continue;
            };

            relations.push(RelationTuple::new(
                head.triple(),
                tail.triple(),
                relation_type.clone(),
                Some(table.scores[i][j]),
            ));
        }
    }

    Ok(relations)
}

/// The decoded span whose end boundary matches the word at a mask row
fn find_entity<'a>(
    row: usize,
    mask: &TokenMask,
    spans: &'a [EntitySpan],
) -> Option<&'a EntitySpan> {
    let last = mask.last_subword(row)?;

    spans.iter().find(|span| last == span.end - 1)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::pipelines::table_filling::span::decode_spans;

    use super::*;

    fn aligned_mask(words: usize) -> TokenMask {
        let width = words + 2;
        let mut rows = vec![vec![false; width]];

        for word in 0..words {
            let mut row = vec![false; width];
            row[word + 1] = true;
            rows.push(row);
        }

        TokenMask::new(rows)
    }

    fn schema() -> Schema {
        Schema::from_parts(
            &[("Per", "Person"), ("Org", "Organization")],
            &[("Works", "Works at"), ("Owns", "Owns")],
        )
    }

    fn table(n: usize) -> RelationTable {
        RelationTable {
            labels: vec![vec![0; n]; n],
            scores: vec![vec![0.0; n]; n],
        }
    }

    #[test]
    fn right_direction_label_maps_row_to_head() {
        let schema = schema();
        let mask = aligned_mask(3);

        // "U-Per O U-Org"
        let spans = decode_spans(&[2, 0, 6], 0.5, &mask, &schema).unwrap();

        let mut t = table(3);
        // Raw label 1 = Works, head precedes tail
        t.labels[0][2] = 1;
        t.scores[0][2] = 0.8;

        let relations = decode_relations(&t, &spans, &mask, &schema).unwrap();

        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].head.start, 1);
        assert_eq!(relations[0].tail.start, 3);
        assert_eq!(relations[0].relation_type.index, 1);
        assert_eq!(relations[0].score, Some(0.8));
    }

    #[test]
    fn reversed_label_swaps_head_and_tail() {
        let schema = schema();
        let mask = aligned_mask(3);

        let spans = decode_spans(&[2, 0, 6], 0.5, &mask, &schema).unwrap();

        let mut t = table(3);
        // Raw label 2 = Works, tail precedes head in the table
        t.labels[0][2] = 2;
        t.scores[0][2] = 0.6;

        let relations = decode_relations(&t, &spans, &mask, &schema).unwrap();

        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].head.start, 3);
        assert_eq!(relations[0].tail.start, 1);
    }

    #[test]
    fn lower_triangle_is_ignored() {
        let schema = schema();
        let mask = aligned_mask(3);

        let spans = decode_spans(&[2, 0, 6], 0.5, &mask, &schema).unwrap();

        let mut t = table(3);
        t.labels[2][0] = 1;

        let relations = decode_relations(&t, &spans, &mask, &schema).unwrap();

        assert!(relations.is_empty());
    }

    #[test]
    fn unresolved_endpoints_drop_the_pair() {
        let schema = schema();
        let mask = aligned_mask(3);

        // Only one decoded span; cell endpoints at words 0 and 1
        let spans = decode_spans(&[2, 0, 0], 0.5, &mask, &schema).unwrap();

        let mut t = table(3);
        t.labels[0][1] = 1;

        let relations = decode_relations(&t, &spans, &mask, &schema).unwrap();

        assert!(relations.is_empty());
    }

    #[test]
    fn second_relation_type_uses_labels_three_and_four() {
        let schema = schema();
        let mask = aligned_mask(2);

        let spans = decode_spans(&[2, 6], 0.5, &mask, &schema).unwrap();

        let mut t = table(2);
        // Raw label 4 = Owns, reversed
        t.labels[0][1] = 4;
        t.scores[0][1] = 0.4;

        let relations = decode_relations(&t, &spans, &mask, &schema).unwrap();

        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].relation_type.index, 2);
        assert_eq!(relations[0].head.start, 2);
    }

    #[test]
    fn decoding_is_idempotent() {
        let schema = schema();
        let mask = aligned_mask(3);
        let spans = decode_spans(&[2, 0, 6], 0.5, &mask, &schema).unwrap();

        let mut t = table(3);
        t.labels[0][2] = 1;
        t.scores[0][2] = 0.8;

        let first = decode_relations(&t, &spans, &mask, &schema).unwrap();
        let second = decode_relations(&t, &spans, &mask, &schema).unwrap();

        assert_eq!(first, second);
    }
}
