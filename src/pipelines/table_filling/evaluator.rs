//! Batch-at-a-time evaluation with an explicit lifecycle.
//!
//! Ground truth is converted once at construction and never mutated.
//! `eval_batch` appends exactly one prediction list per document, in
//! dataset order; `compute_scores` runs once and produces the three
//! scored views (NER, relations without entity types, relations with
//! entity types). Calling `eval_batch` after finalization, or finalizing
//! twice, is a lifecycle error.

use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::PathBuf,
};

use log::info;

use crate::{
    datasets::Dataset,
    schema::Schema,
};

use super::{
    batcher::PredictionBatch,
    beam,
    relation::decode_relations,
    scoring::{self, EvalScores},
    span::decode_spans,
    types::{EntitySpan, RelationTuple},
    EvalError,
};

/// Evaluator configuration
#[derive(Debug, Clone)]
pub struct EvalConfig {
    /// The current epoch
    pub epoch: usize,

    /// The final epoch; the tag dump is written once
    /// `epoch + 1 >= max_epoch`
    pub max_epoch: usize,

    /// How many documents to include in example reports
    pub example_count: usize,

    /// Where to write the two-column tag dump, if anywhere
    pub tag_path: Option<PathBuf>,

    /// Where to write the chosen-beam audit log, if anywhere
    pub beam_audit_path: Option<PathBuf>,

    /// Where to append the CSV metrics row, if anywhere
    pub csv_path: Option<PathBuf>,

    /// Where to write example reports, if anywhere
    pub examples_dir: Option<PathBuf>,

    /// Where the report templates live
    pub template_dir: PathBuf,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            epoch: 0,
            max_epoch: 0,
            example_count: 10,
            tag_path: None,
            beam_audit_path: None,
            csv_path: None,
            examples_dir: None,
            template_dir: PathBuf::from("templates"),
        }
    }
}

/// The accumulate-then-finalize lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    /// No predictions accumulated yet
    Empty,

    /// Predictions are being appended batch by batch
    Accumulating,

    /// Scores have been computed; the evaluator is frozen
    Finalized,
}

/// Joint entity and relation extraction evaluator
pub struct Evaluator<'a> {
    schema: &'a Schema,
    dataset: &'a Dataset,
    config: EvalConfig,

    gt_entities: Vec<Vec<EntitySpan>>,
    gt_relations: Vec<Vec<RelationTuple>>,

    pred_entities: Vec<Vec<EntitySpan>>,
    pred_relations: Vec<Vec<RelationTuple>>,
    pred_tags: Vec<Vec<String>>,

    beam_ids: Vec<usize>,
    state: Lifecycle,
}

impl<'a> Evaluator<'a> {
    /// Create an evaluator and cache the converted ground truth
    pub fn new(
        dataset: &'a Dataset,
        schema: &'a Schema,
        config: EvalConfig,
    ) -> Result<Self, EvalError> {
        let mut gt_entities = Vec::with_capacity(dataset.document_count());
        let mut gt_relations = Vec::with_capacity(dataset.document_count());

        for doc in dataset.documents() {
            let entities: Vec<EntitySpan> = doc
                .entities
                .iter()
                .map(|e| {
                    let entity_type = schema
                        .entity_type(e.entity_type)
                        .ok_or(EvalError::UnknownEntityType(e.entity_type))?;
                    Ok(EntitySpan::new(e.start, e.end, entity_type.clone(), None))
                })
                .collect::<Result<_, EvalError>>()?;

            let relations = doc
                .relations
                .iter()
                .map(|r| {
                    let relation_type = schema
                        .relation_type(r.relation_type)
                        .ok_or(EvalError::UnknownRelationType(r.relation_type))?;

                    // Endpoints are validated at dataset load
                    let head = &entities[r.head];
                    let tail = &entities[r.tail];

                    Ok(RelationTuple::new(
                        head.triple(),
                        tail.triple(),
                        relation_type.clone(),
                        None,
                    ))
                })
                .collect::<Result<_, EvalError>>()?;

            gt_entities.push(entities);
            gt_relations.push(relations);
        }

        Ok(Self {
            schema,
            dataset,
            config,
            gt_entities,
            gt_relations,
            pred_entities: Vec::new(),
            pred_relations: Vec::new(),
            pred_tags: Vec::new(),
            beam_ids: Vec::new(),
            state: Lifecycle::Empty,
        })
    }

    /// Decode and accumulate one batch of candidate predictions.
    ///
    /// Batches must arrive in dataset order, one candidate beam per
    /// document.
    pub fn eval_batch(&mut self, batch: &PredictionBatch) -> Result<(), EvalError> {
        if self.state == Lifecycle::Finalized {
            return Err(EvalError::Finalized);
        }

        let cursor = self.pred_entities.len();
        if cursor + batch.len() > self.dataset.document_count() {
            return Err(EvalError::LengthMismatch {
                predictions: cursor + batch.len(),
                documents: self.dataset.document_count(),
            });
        }

        for (offset, candidates) in batch.docs.iter().enumerate() {
            let doc = &self.dataset.documents()[cursor + offset];

            let (beam_id, table) = beam::select(candidates)?;
            let chosen = &candidates[beam_id];

            let entities = decode_spans(
                &chosen.entity_labels,
                chosen.entity_score,
                &doc.token_mask,
                self.schema,
            )?;
            let relations =
                decode_relations(&table, &entities, &doc.token_mask, self.schema)?;

            self.pred_tags.push(self.bio_tags(&chosen.entity_labels)?);
            self.beam_ids.push(beam_id);
            self.pred_entities.push(entities);
            self.pred_relations.push(relations);
        }

        self.state = Lifecycle::Accumulating;

        Ok(())
    }

    /// Compute the three scored views and write the configured outputs.
    ///
    /// Must be called exactly once, after every batch has been consumed.
    pub fn compute_scores(
        &mut self,
    ) -> Result<(EvalScores, EvalScores, EvalScores), EvalError> {
        if self.state == Lifecycle::Finalized {
            return Err(EvalError::Finalized);
        }

        if self.pred_entities.len() != self.dataset.document_count() {
            return Err(EvalError::LengthMismatch {
                predictions: self.pred_entities.len(),
                documents: self.dataset.document_count(),
            });
        }

        println!("Evaluation");
        println!();
        println!("--- Entities (NER) ---");
        println!();
        let ner_eval = scoring::score(&self.gt_entities, &self.pred_entities, true)?;

        if self.config.epoch + 1 >= self.config.max_epoch {
            self.write_tag_dump()?;
        }

        println!();
        println!("--- Relations ---");
        println!();
        println!("Without NER");
        let gt_untyped: Vec<Vec<RelationTuple>> = self
            .gt_relations
            .iter()
            .map(|rels| rels.iter().map(RelationTuple::untyped).collect())
            .collect();
        let pred_untyped: Vec<Vec<RelationTuple>> = self
            .pred_relations
            .iter()
            .map(|rels| rels.iter().map(RelationTuple::untyped).collect())
            .collect();
        let rel_eval = scoring::score(&gt_untyped, &pred_untyped, true)?;

        println!();
        println!("With NER");
        let rel_ner_eval = scoring::score(&self.gt_relations, &self.pred_relations, true)?;

        self.write_beam_audit()?;
        self.write_csv_row(&ner_eval, &rel_eval, &rel_ner_eval)?;

        self.state = Lifecycle::Finalized;

        Ok((ner_eval, rel_eval, rel_ner_eval))
    }

    /// Render and store example reports for the accumulated predictions
    pub fn store_examples(&self) -> Result<(), EvalError> {
        let Some(examples_dir) = &self.config.examples_dir else {
            return Ok(());
        };

        super::examples::store_examples(
            self.dataset,
            &self.gt_entities,
            &self.pred_entities,
            &self.gt_relations,
            &self.pred_relations,
            examples_dir,
            &self.config.template_dir,
            self.config.example_count,
            self.config.epoch,
        )
    }

    /// The chosen beam index per document, in dataset order
    pub fn beam_ids(&self) -> &[usize] {
        &self.beam_ids
    }

    /// Gold spans per document, converted at construction
    pub fn gt_entities(&self) -> &[Vec<EntitySpan>] {
        &self.gt_entities
    }

    /// Decoded prediction spans per document
    pub fn pred_entities(&self) -> &[Vec<EntitySpan>] {
        &self.pred_entities
    }

    /// Gold relation tuples per document
    pub fn gt_relations(&self) -> &[Vec<RelationTuple>] {
        &self.gt_relations
    }

    /// Decoded prediction tuples per document
    pub fn pred_relations(&self) -> &[Vec<RelationTuple>] {
        &self.pred_relations
    }

    /// Convert one candidate's raw BILOU labels to BIO tags.
    ///
    /// `U` becomes `B`; `L` becomes `I` when it continues the previous
    /// tag's type and `B` otherwise.
    fn bio_tags(&self, labels: &[usize]) -> Result<Vec<String>, EvalError> {
        let mut tags: Vec<String> = Vec::with_capacity(labels.len());

        for &label in labels {
            let short = &self
                .schema
                .entity_label(label)
                .ok_or(EvalError::UnknownEntityLabel(label))?
                .short_name;

            let tag = if let Some(suffix) = short.strip_prefix('U') {
                format!("B{}", suffix)
            } else if let Some(suffix) = short.strip_prefix('L') {
                let continues = tags
                    .last()
                    .map(|prev| prev.len() > 1 && prev[1..] == short[1..])
                    .unwrap_or(false);

                if continues {
                    format!("I{}", suffix)
                } else {
                    format!("B{}", suffix)
                }
            } else {
                short.clone()
            };

            tags.push(tag);
        }

        Ok(tags)
    }

    /// Write `token tag` lines per document, blank line between documents
    fn write_tag_dump(&self) -> Result<(), EvalError> {
        let Some(path) = &self.config.tag_path else {
            return Ok(());
        };

        let mut file = File::create(path)?;

        for (doc, tags) in self.dataset.documents().iter().zip(self.pred_tags.iter()) {
            for (token, tag) in doc.tokens.iter().zip(tags.iter()) {
                writeln!(file, "{} {}", token, tag)?;
            }
            writeln!(file)?;
        }

        info!("Wrote tag dump: {}", path.display());

        Ok(())
    }

    /// Write one chosen beam index per line, in dataset order
    fn write_beam_audit(&self) -> Result<(), EvalError> {
        let Some(path) = &self.config.beam_audit_path else {
            return Ok(());
        };

        let mut file = File::create(path)?;
        for beam_id in &self.beam_ids {
            writeln!(file, "{}", beam_id)?;
        }

        info!("Wrote beam audit log: {}", path.display());

        Ok(())
    }

    /// Append the metrics row for this evaluation run
    fn write_csv_row(
        &self,
        ner: &EvalScores,
        rel: &EvalScores,
        rel_ner: &EvalScores,
    ) -> Result<(), EvalError> {
        let Some(path) = &self.config.csv_path else {
            return Ok(());
        };

        let new_file = !path.exists();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if new_file {
            writer.write_record([
                "ner_prec_micro",
                "ner_rec_micro",
                "ner_f1_micro",
                "ner_prec_macro",
                "ner_rec_macro",
                "ner_f1_macro",
                "rel_prec_micro",
                "rel_rec_micro",
                "rel_f1_micro",
                "rel_prec_macro",
                "rel_rec_macro",
                "rel_f1_macro",
                "rel_ner_prec_micro",
                "rel_ner_rec_micro",
                "rel_ner_f1_micro",
                "rel_ner_prec_macro",
                "rel_ner_rec_macro",
                "rel_ner_f1_macro",
                "epoch",
                "label",
            ])?;
        }

        let mut record: Vec<String> = Vec::with_capacity(20);
        for scores in [ner, rel, rel_ner] {
            // as_row emits micro P/R/F1 then macro P/R/F1
            for value in scores.as_row() {
                record.push(format!("{:.4}", value));
            }
        }
        record.push(self.config.epoch.to_string());
        record.push(self.dataset.label.clone());

        writer.write_record(&record)?;
        writer.flush()?;

        Ok(())
    }
}
