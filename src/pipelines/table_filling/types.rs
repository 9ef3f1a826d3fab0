//! Value types shared by the decoders and the scoring engine.
//!
//! Equality and hashing deliberately exclude prediction scores so that
//! gold and predicted items land in the same set slots during
//! union-based alignment; scores travel alongside the identity fields.

use std::hash::{Hash, Hasher};

use derive_new::new;

use crate::schema::{EntityType, RelationType};

/// An entity span over encoding positions, half-open on the right.
///
/// `score` is present for predictions only and never participates in
/// equality or hashing.
#[derive(Debug, Clone, new)]
pub struct EntitySpan {
    /// First covered encoding position
    pub start: usize,

    /// One past the last covered encoding position
    pub end: usize,

    /// The entity type
    pub entity_type: EntityType,

    /// The candidate score, predictions only
    pub score: Option<f64>,
}

impl PartialEq for EntitySpan {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start
            && self.end == other.end
            && self.entity_type.index == other.entity_type.index
    }
}

impl Eq for EntitySpan {}

impl Hash for EntitySpan {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.start.hash(state);
        self.end.hash(state);
        self.entity_type.index.hash(state);
    }
}

impl EntitySpan {
    /// The scoreless `(start, end, type)` view used as a relation endpoint
    pub fn triple(&self) -> SpanTriple {
        SpanTriple::new(self.start, self.end, self.entity_type.clone())
    }

    /// A copy with the entity type collapsed to the pseudo type
    pub fn untyped(&self) -> Self {
        Self {
            start: self.start,
            end: self.end,
            entity_type: EntityType::pseudo(),
            score: self.score,
        }
    }
}

/// A scoreless `(start, end, type)` span triple
#[derive(Debug, Clone, new)]
pub struct SpanTriple {
    /// First covered encoding position
    pub start: usize,

    /// One past the last covered encoding position
    pub end: usize,

    /// The entity type
    pub entity_type: EntityType,
}

impl PartialEq for SpanTriple {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start
            && self.end == other.end
            && self.entity_type.index == other.entity_type.index
    }
}

impl Eq for SpanTriple {}

impl Hash for SpanTriple {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.start.hash(state);
        self.end.hash(state);
        self.entity_type.index.hash(state);
    }
}

impl SpanTriple {
    /// A copy with the entity type collapsed to the pseudo type
    pub fn untyped(&self) -> Self {
        Self::new(self.start, self.end, EntityType::pseudo())
    }
}

/// A directed relation between two decoded or gold spans.
///
/// Equality covers head, tail, and relation type; the score is carried
/// alongside for reporting.
#[derive(Debug, Clone, new)]
pub struct RelationTuple {
    /// The head span
    pub head: SpanTriple,

    /// The tail span
    pub tail: SpanTriple,

    /// The relation type
    pub relation_type: RelationType,

    /// The cell probability, predictions only
    pub score: Option<f64>,
}

impl PartialEq for RelationTuple {
    fn eq(&self, other: &Self) -> bool {
        self.head == other.head
            && self.tail == other.tail
            && self.relation_type.index == other.relation_type.index
    }
}

impl Eq for RelationTuple {}

impl Hash for RelationTuple {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.head.hash(state);
        self.tail.hash(state);
        self.relation_type.index.hash(state);
    }
}

impl RelationTuple {
    /// A copy with both endpoint types collapsed to the pseudo type
    pub fn untyped(&self) -> Self {
        Self {
            head: self.head.untyped(),
            tail: self.tail.untyped(),
            relation_type: self.relation_type.clone(),
            score: self.score,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use pretty_assertions::assert_eq;

    use crate::schema::Schema;

    use super::*;

    fn schema() -> Schema {
        Schema::from_parts(&[("Per", "Person")], &[("Works", "Works at")])
    }

    #[test]
    fn span_equality_ignores_score() {
        let schema = schema();
        let per = schema.entity_type(1).unwrap().clone();

        let gold = EntitySpan::new(1, 2, per.clone(), None);
        let pred = EntitySpan::new(1, 2, per, Some(0.9));

        assert_eq!(gold, pred);

        let mut set = HashSet::new();
        set.insert(gold);
        assert!(set.contains(&pred));
    }

    #[test]
    fn relation_equality_ignores_score() {
        let schema = schema();
        let per = schema.entity_type(1).unwrap().clone();
        let works = schema.relation_type(1).unwrap().clone();

        let head = SpanTriple::new(1, 2, per.clone());
        let tail = SpanTriple::new(4, 6, per);

        let gold = RelationTuple::new(head.clone(), tail.clone(), works.clone(), None);
        let pred = RelationTuple::new(head, tail, works, Some(0.7));

        assert_eq!(gold, pred);
    }

    #[test]
    fn untyped_collapses_to_pseudo_type() {
        let schema = schema();
        let per = schema.entity_type(1).unwrap().clone();

        let span = EntitySpan::new(1, 2, per, Some(0.5)).untyped();

        assert_eq!(span.entity_type.index, crate::schema::PSEUDO_INDEX);
        assert_eq!(span.score, Some(0.5));
    }
}
