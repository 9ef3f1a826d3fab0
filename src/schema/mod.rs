//! Entity and relation type registry.
//!
//! The schema maps raw per-token label indices and raw table-cell label
//! values to their type metadata. Raw entity label `L != 0` encodes
//! `entity_type = ceil(L / 4)` with the four labels of each type ordered
//! `[B, U, I, L]`, so an even label marks the end of a span and
//! `L % 4 ∈ {1, 2}` marks the start. Raw relation label `v != 0` encodes
//! `relation_type = ceil(v / 2)`; which of the two labels per type denotes
//! "head precedes tail" is carried by the right-direction set.

use std::{
    collections::{BTreeMap, HashSet},
    fs,
    hash::{Hash, Hasher},
    path::Path,
};

use serde::Deserialize;

/// The reserved index for the "no entity" / "no relation" class
pub const NONE_INDEX: usize = 0;

/// The index of the synthetic pseudo type used for untyped evaluation
pub const PSEUDO_INDEX: usize = 1;

/// BILOU prefixes in raw-label order within one entity type's label group
const BILOU_ORDER: [char; 4] = ['B', 'U', 'I', 'L'];

/// A named entity category
#[derive(Debug, Clone)]
pub struct EntityType {
    /// The type identity; 0 is reserved for "no entity"
    pub index: usize,

    /// The short name used in metric tables
    pub short_name: String,

    /// The human-readable name used in example reports
    pub verbose_name: String,
}

impl PartialEq for EntityType {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for EntityType {}

impl Hash for EntityType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl EntityType {
    /// The synthetic type every span collapses to when entity typing is
    /// excluded from scoring
    pub fn pseudo() -> Self {
        Self {
            index: PSEUDO_INDEX,
            short_name: "Entity".to_string(),
            verbose_name: "Entity".to_string(),
        }
    }
}

/// A directed relation category
#[derive(Debug, Clone)]
pub struct RelationType {
    /// The type identity; 0 is reserved for "no relation"
    pub index: usize,

    /// The short name used in metric tables
    pub short_name: String,

    /// The human-readable name used in example reports
    pub verbose_name: String,
}

impl PartialEq for RelationType {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for RelationType {}

impl Hash for RelationType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

/// Metadata for one raw per-token entity label
#[derive(Debug, Clone)]
pub struct EntityLabel {
    /// The raw label index as predicted by the model
    pub index: usize,

    /// The BILOU tag, e.g. `B-Per`; `O` for the outside label
    pub short_name: String,
}

/// Schema Error
#[derive(thiserror::Error, Debug)]
pub enum SchemaError {
    /// The types file could not be read
    #[error("unable to read types file: {0}")]
    Io(#[from] std::io::Error),

    /// The types file could not be parsed
    #[error("unable to parse types file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct RawType {
    short: String,
    verbose: String,
}

#[derive(Debug, Deserialize)]
struct RawSchema {
    entities: BTreeMap<String, RawType>,
    relations: BTreeMap<String, RawType>,
}

/// The registry of entity/relation types and raw label metadata
#[derive(Debug, Clone)]
pub struct Schema {
    entity_types: Vec<EntityType>,
    relation_types: Vec<RelationType>,
    entity_labels: Vec<EntityLabel>,
    right_rel_labels: HashSet<usize>,
}

impl Schema {
    /// Build a schema from ordered `(short, verbose)` type name pairs
    pub fn from_parts(entities: &[(&str, &str)], relations: &[(&str, &str)]) -> Self {
        let mut entity_types = vec![EntityType {
            index: NONE_INDEX,
            short_name: "None".to_string(),
            verbose_name: "No Entity".to_string(),
        }];

        for (i, (short, verbose)) in entities.iter().enumerate() {
            entity_types.push(EntityType {
                index: i + 1,
                short_name: short.to_string(),
                verbose_name: verbose.to_string(),
            });
        }

        let mut relation_types = vec![RelationType {
            index: NONE_INDEX,
            short_name: "None".to_string(),
            verbose_name: "No Relation".to_string(),
        }];

        for (i, (short, verbose)) in relations.iter().enumerate() {
            relation_types.push(RelationType {
                index: i + 1,
                short_name: short.to_string(),
                verbose_name: verbose.to_string(),
            });
        }

        // Per-type label group [B, U, I, L]; raw labels 4t-3 ..= 4t
        let mut entity_labels = vec![EntityLabel {
            index: 0,
            short_name: "O".to_string(),
        }];

        for entity_type in entity_types.iter().skip(1) {
            for (offset, prefix) in BILOU_ORDER.iter().enumerate() {
                entity_labels.push(EntityLabel {
                    index: 4 * (entity_type.index - 1) + offset + 1,
                    short_name: format!("{}-{}", prefix, entity_type.short_name),
                });
            }
        }

        // Raw relation labels 2r-1 (head precedes tail) and 2r (reversed)
        let right_rel_labels = relation_types
            .iter()
            .skip(1)
            .map(|r| 2 * r.index - 1)
            .collect();

        Self {
            entity_types,
            relation_types,
            entity_labels,
            right_rel_labels,
        }
    }

    /// Load a schema from a JSON types file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SchemaError> {
        let contents = fs::read_to_string(path)?;
        let raw: RawSchema = serde_json::from_str(&contents)?;

        let entities: Vec<_> = raw
            .entities
            .values()
            .map(|t| (t.short.as_str(), t.verbose.as_str()))
            .collect();

        let relations: Vec<_> = raw
            .relations
            .values()
            .map(|t| (t.short.as_str(), t.verbose.as_str()))
            .collect();

        Ok(Self::from_parts(&entities, &relations))
    }

    /// Look up an entity type by index
    pub fn entity_type(&self, index: usize) -> Option<&EntityType> {
        self.entity_types.get(index)
    }

    /// Look up a relation type by index
    pub fn relation_type(&self, index: usize) -> Option<&RelationType> {
        self.relation_types.get(index)
    }

    /// Look up a raw per-token entity label
    pub fn entity_label(&self, raw: usize) -> Option<&EntityLabel> {
        self.entity_labels.get(raw)
    }

    /// Whether a raw table-cell label denotes "head precedes tail"
    pub fn is_right_direction(&self, raw: usize) -> bool {
        self.right_rel_labels.contains(&raw)
    }

    /// The number of entity types, including the reserved "no entity"
    pub fn entity_type_count(&self) -> usize {
        self.entity_types.len()
    }

    /// The number of relation types, including the reserved "no relation"
    pub fn relation_type_count(&self) -> usize {
        self.relation_types.len()
    }

    /// The number of raw per-token entity labels, including the outside label
    pub fn entity_label_count(&self) -> usize {
        self.entity_labels.len()
    }

    /// The number of raw table-cell relation labels, including "no relation"
    pub fn relation_label_count(&self) -> usize {
        2 * (self.relation_types.len() - 1) + 1
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn schema() -> Schema {
        Schema::from_parts(
            &[("Per", "Person"), ("Org", "Organization")],
            &[("Works", "Works at")],
        )
    }

    #[test]
    fn generates_bilou_label_groups_in_raw_order() {
        let schema = schema();

        let tags: Vec<_> = (0..schema.entity_label_count())
            .map(|i| schema.entity_label(i).unwrap().short_name.clone())
            .collect();

        assert_eq!(
            tags,
            vec!["O", "B-Per", "U-Per", "I-Per", "L-Per", "B-Org", "U-Org", "I-Org", "L-Org"]
        );
    }

    #[test]
    fn label_arithmetic_matches_group_layout() {
        let schema = schema();

        for raw in 1..schema.entity_label_count() {
            let tag = &schema.entity_label(raw).unwrap().short_name;
            let type_idx = (raw + 3) / 4;
            let suffix = &schema.entity_type(type_idx).unwrap().short_name;

            assert_eq!(&tag[2..], suffix.as_str());

            // Even labels are span ends (U and L tags)
            let is_end = raw % 2 == 0;
            assert_eq!(is_end, tag.starts_with('U') || tag.starts_with('L'));
        }
    }

    #[test]
    fn odd_relation_labels_are_right_direction() {
        let schema = schema();

        assert!(schema.is_right_direction(1));
        assert!(!schema.is_right_direction(2));
        assert!(!schema.is_right_direction(0));
    }

    #[test]
    fn equality_ignores_names() {
        let a = EntityType {
            index: 2,
            short_name: "Org".to_string(),
            verbose_name: "Organization".to_string(),
        };
        let b = EntityType {
            index: 2,
            short_name: "Renamed".to_string(),
            verbose_name: "Renamed".to_string(),
        };

        assert_eq!(a, b);
    }

    #[test]
    fn loads_types_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("types.json");
        std::fs::write(
            &path,
            r#"{
                "entities": {
                    "Per": {"short": "Per", "verbose": "Person"}
                },
                "relations": {
                    "Works": {"short": "Works", "verbose": "Works at"}
                }
            }"#,
        )
        .unwrap();

        let schema = Schema::load(&path).unwrap();

        assert_eq!(schema.entity_type_count(), 2);
        assert_eq!(schema.relation_type_count(), 2);
        assert_eq!(schema.entity_label_count(), 5);
        assert_eq!(schema.relation_label_count(), 3);
    }
}
