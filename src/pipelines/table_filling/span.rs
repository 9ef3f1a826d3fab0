//! End-anchored BILOU-parity span decoding.
//!
//! Raw label `L != 0` encodes `entity_type = ceil(L / 4)`; an even label
//! marks the end of a span (the `U` and `L` positions of the BILOU
//! group). Decoding walks tokens left to right and keeps a single running
//! start boundary: an end-parity label with a nonzero type closes the
//! span, an outside label resets the boundary. A trailing open span that
//! never sees an end marker is dropped; that asymmetry is the accepted
//! decoding path's behavior and is kept as is.

use crate::{
    datasets::TokenMask,
    schema::Schema,
};

use super::{types::EntitySpan, EvalError};

/// Decode word-level entity spans from one candidate's raw label sequence.
///
/// `labels[i]` is the prediction for word `i`; the mask row for word `i`
/// is `i + 1` because row 0 is the classifier-token slot. The candidate's
/// scalar score is attached to every emitted span. Output is ordered left
/// to right and non-overlapping by construction.
pub fn decode_spans(
    labels: &[usize],
    score: f64,
    mask: &TokenMask,
    schema: &Schema,
) -> Result<Vec<EntitySpan>, EvalError> {
    let mut spans = Vec::new();

    // First valid encoding position, just past the classifier token
    let mut start = 1;

    for (i, &label) in labels.iter().enumerate() {
        let row = i + 1;
        let last = mask
            .last_subword(row)
            .ok_or(EvalError::EmptyMaskRow(row))?;
        let boundary = last + 1;

        let entity_type = (label + 3) / 4;
        let is_end = label % 2 == 0;

        // Transition table keyed on (outside, end parity)
        match (label == 0, is_end) {
            // Outside label: reset the boundary past this token
            (true, _) => start = boundary,

            // End marker: close the span and reset the boundary
            (false, true) => {
                let entity_type = schema
                    .entity_type(entity_type)
                    .ok_or(EvalError::UnknownEntityType(entity_type))?;

                // Guards against non-monotonic token masks
                if boundary > start {
                    spans.push(EntitySpan::new(start, boundary, entity_type.clone(), Some(score)));
                }
                start = boundary;
            }

            // Begin or inside marker: the span stays open
            (false, false) => {}
        }
    }

    Ok(spans)
}
