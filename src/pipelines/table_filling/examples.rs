//! Liquid-rendered comparison reports.
//!
//! For each document the union of gold and predicted items is split into
//! true positives, false negatives, and false positives, highlighted in
//! the token stream and rendered through the report templates. A missing
//! template skips the export with a warning; scoring is unaffected.

#![allow(clippy::too_many_arguments)]

use std::{collections::HashSet, fs, path::Path};

use log::warn;
use serde::Serialize;

use crate::datasets::{Dataset, Document};

use super::{
    scoring::{self, Labeled},
    types::{EntitySpan, RelationTuple},
    EvalError,
};

/// One highlighted union member
#[derive(Debug, Clone, Serialize)]
struct ExampleItem {
    /// The document text with the item highlighted
    html: String,

    /// The verbose type name
    #[serde(rename = "type")]
    type_verbose: String,

    /// The prediction score; -1 for missed gold items
    score: f64,
}

/// One document's comparison
#[derive(Debug, Clone, Serialize)]
struct Example {
    text: String,
    tp: Vec<ExampleItem>,
    #[serde(rename = "fn")]
    fn_: Vec<ExampleItem>,
    fp: Vec<ExampleItem>,
    precision: f64,
    recall: f64,
    f1: f64,
    length: usize,
}

#[derive(Debug, Serialize)]
struct ReportContext {
    examples: Vec<Example>,
}

/// Render and write the six report files (three kinds, each with a
/// length-sorted variant)
pub(super) fn store_examples(
    dataset: &Dataset,
    gt_entities: &[Vec<EntitySpan>],
    pred_entities: &[Vec<EntitySpan>],
    gt_relations: &[Vec<RelationTuple>],
    pred_relations: &[Vec<RelationTuple>],
    examples_dir: &Path,
    template_dir: &Path,
    example_count: usize,
    epoch: usize,
) -> Result<(), EvalError> {
    let mut entity_examples = Vec::with_capacity(dataset.document_count());
    let mut rel_examples = Vec::with_capacity(dataset.document_count());
    let mut rel_ner_examples = Vec::with_capacity(dataset.document_count());

    for (i, doc) in dataset.documents().iter().enumerate() {
        entity_examples.push(convert_example(
            doc,
            &gt_entities[i],
            &pred_entities[i],
            |item, doc| entity_to_html(item, doc),
        )?);

        let gt_untyped: Vec<RelationTuple> =
            gt_relations[i].iter().map(RelationTuple::untyped).collect();
        let pred_untyped: Vec<RelationTuple> = pred_relations[i]
            .iter()
            .map(RelationTuple::untyped)
            .collect();

        rel_examples.push(convert_example(doc, &gt_untyped, &pred_untyped, |item, doc| {
            rel_to_html(item, doc)
        })?);

        rel_ner_examples.push(convert_example(
            doc,
            &gt_relations[i],
            &pred_relations[i],
            |item, doc| rel_to_html(item, doc),
        )?);
    }

    fs::create_dir_all(examples_dir)?;

    let reports = [
        ("entities", "entity_examples.html", entity_examples),
        ("rel", "relation_examples.html", rel_examples),
        ("rel_ner", "relation_examples.html", rel_ner_examples),
    ];

    for (kind, template_name, mut examples) in reports {
        examples.truncate(example_count);

        let template_path = template_dir.join(template_name);
        if !template_path.exists() {
            warn!(
                "Examples cannot be stored since template {} is missing",
                template_path.display()
            );
            return Ok(());
        }

        write_report(
            &examples,
            &template_path,
            &examples_dir.join(report_name(kind, &dataset.label, epoch)),
        )?;

        examples.sort_by_key(|e| e.length);
        write_report(
            &examples,
            &template_path,
            &examples_dir.join(report_name(&format!("{}_sorted", kind), &dataset.label, epoch)),
        )?;
    }

    Ok(())
}

fn report_name(kind: &str, label: &str, epoch: usize) -> String {
    format!("examples_{}_{}_epoch_{}.html", kind, label, epoch)
}

fn write_report(
    examples: &[Example],
    template_path: &Path,
    out_path: &Path,
) -> Result<(), EvalError> {
    let contents = fs::read_to_string(template_path)?;

    let template = liquid::ParserBuilder::with_stdlib()
        .build()?
        .parse(&contents)?;

    let globals = liquid::model::to_object(&ReportContext {
        examples: examples.to_vec(),
    })?;

    fs::write(out_path, template.render(&globals)?)?;

    Ok(())
}

/// Classify the union of gold and predicted items for one document
fn convert_example<T, F>(
    doc: &Document,
    gt: &[T],
    pred: &[T],
    to_html: F,
) -> Result<Example, EvalError>
where
    T: Labeled + VerboseLabeled + Eq + std::hash::Hash + Clone + Scored,
    F: Fn(&T, &Document) -> String,
{
    // Vacuously perfect when there is nothing on either side
    let (precision, recall, f1) = if gt.is_empty() && pred.is_empty() {
        (100.0, 100.0, 100.0)
    } else {
        let scores = scoring::score(&[gt.to_vec()], &[pred.to_vec()], false)?;
        (
            scores.micro.precision,
            scores.micro.recall,
            scores.micro.f1,
        )
    };

    let gt_set: HashSet<&T> = gt.iter().collect();
    let pred_set: HashSet<&T> = pred.iter().collect();

    let mut seen = HashSet::new();
    let union: Vec<&T> = gt
        .iter()
        .chain(pred.iter())
        .filter(|item| seen.insert(*item))
        .collect();

    let mut tp = Vec::new();
    let mut fn_ = Vec::new();
    let mut fp = Vec::new();

    for item in union {
        let in_gt = gt_set.contains(item);
        let in_pred = pred_set.contains(item);

        // Scores live on the predicted copy, not the gold one
        let score = pred_set
            .get(item)
            .and_then(|p| p.score())
            .unwrap_or(-1.0);

        let rendered = ExampleItem {
            html: to_html(item, doc),
            type_verbose: item.verbose_name().to_string(),
            score,
        };

        match (in_gt, in_pred) {
            (true, true) => tp.push(rendered),
            (true, false) => fn_.push(rendered),
            (false, _) => fp.push(rendered),
        }
    }

    tp.sort_by(|a, b| b.score.total_cmp(&a.score));
    fp.sort_by(|a, b| b.score.total_cmp(&a.score));

    Ok(Example {
        text: doc.tokens.join(" "),
        tp,
        fn_,
        fp,
        precision,
        recall,
        f1,
        length: doc.tokens.len(),
    })
}

/// Access to the optional prediction score
trait Scored {
    fn score(&self) -> Option<f64>;
}

impl Scored for EntitySpan {
    fn score(&self) -> Option<f64> {
        self.score
    }
}

impl Scored for RelationTuple {
    fn score(&self) -> Option<f64> {
        self.score
    }
}

/// Access to the verbose type name
trait VerboseLabeled {
    fn verbose_name(&self) -> &str;
}

impl VerboseLabeled for EntitySpan {
    fn verbose_name(&self) -> &str {
        &self.entity_type.verbose_name
    }
}

impl VerboseLabeled for RelationTuple {
    fn verbose_name(&self) -> &str {
        &self.relation_type.verbose_name
    }
}

fn entity_to_html(span: &EntitySpan, doc: &Document) -> String {
    let (w0, w1) = doc.token_mask.word_range(span.start, span.end);

    let tag = format!(
        " <span class=\"entity\"><span class=\"type\">{}</span>",
        span.entity_type.verbose_name
    );

    format!(
        "{}{}{}</span> {}",
        doc.tokens[..w0].join(" "),
        tag,
        doc.tokens[w0..w1].join(" "),
        doc.tokens[w1..].join(" "),
    )
}

fn rel_to_html(relation: &RelationTuple, doc: &Document) -> String {
    let head_tag = format!(
        " <span class=\"head\"><span class=\"type\">{}</span>",
        relation.head.entity_type.verbose_name
    );
    let tail_tag = format!(
        " <span class=\"tail\"><span class=\"type\">{}</span>",
        relation.tail.entity_type.verbose_name
    );

    // Render in document order regardless of direction
    let (e1, e1_tag, e2, e2_tag) = if relation.head.start < relation.tail.start {
        (&relation.head, head_tag, &relation.tail, tail_tag)
    } else {
        (&relation.tail, tail_tag, &relation.head, head_tag)
    };

    let (a0, a1) = doc.token_mask.word_range(e1.start, e1.end);
    let (b0, b1) = doc.token_mask.word_range(e2.start, e2.end);

    format!(
        "{}{}{}</span> {}{}{}</span> {}",
        doc.tokens[..a0].join(" "),
        e1_tag,
        doc.tokens[a0..a1].join(" "),
        doc.tokens[a1..b0].join(" "),
        e2_tag,
        doc.tokens[b0..b1].join(" "),
        doc.tokens[b1..].join(" "),
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::schema::Schema;

    use crate::datasets::{GoldEntity, TokenMask};

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
        Schema::from_parts(&[("Per", "Person")], &[("Works", "Works at")])
    }

    fn doc() -> Document {
        Document {
            tokens: ["John", "works", "here"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            entities: vec![GoldEntity::new(1, 2, 1)],
            relations: vec![],
            token_mask: aligned_mask(3),
        }
    }

    #[test]
    fn entity_html_highlights_the_span() {
        let schema = schema();
        let doc = doc();
        let span = EntitySpan::new(1, 2, schema.entity_type(1).unwrap().clone(), None);

        let html = entity_to_html(&span, &doc);

        assert_eq!(
            html,
            " <span class=\"entity\"><span class=\"type\">Person</span>John</span> works here"
        );
    }

    #[test]
    fn empty_comparison_is_vacuously_perfect() {
        let doc = doc();

        let example =
            convert_example::<EntitySpan, _>(&doc, &[], &[], |item, doc| {
                entity_to_html(item, doc)
            })
            .unwrap();

        assert_eq!(example.precision, 100.0);
        assert_eq!(example.recall, 100.0);
        assert_eq!(example.f1, 100.0);
        assert!(example.tp.is_empty());
    }

    #[test]
    fn union_members_split_into_tp_fn_fp() {
        let schema = schema();
        let doc = doc();
        let per = schema.entity_type(1).unwrap().clone();

        let gold = vec![
            EntitySpan::new(1, 2, per.clone(), None),
            EntitySpan::new(3, 4, per.clone(), None),
        ];
        let pred = vec![
            EntitySpan::new(1, 2, per.clone(), Some(0.9)),
            EntitySpan::new(2, 3, per, Some(0.4)),
        ];

        let example = convert_example(&doc, &gold, &pred, |item, doc| {
            entity_to_html(item, doc)
        })
        .unwrap();

        assert_eq!(example.tp.len(), 1);
        assert_eq!(example.fn_.len(), 1);
        assert_eq!(example.fp.len(), 1);
        assert_eq!(example.tp[0].score, 0.9);
        assert_eq!(example.fn_[0].score, -1.0);
    }

    #[test]
    fn missing_template_skips_export_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let schema = schema();
        let dataset =
            crate::datasets::Dataset::from_documents("test", vec![doc()]).unwrap();

        let gt = vec![vec![EntitySpan::new(
            1,
            2,
            schema.entity_type(1).unwrap().clone(),
            None,
        )]];
        let pred = gt.clone();

        let result = store_examples(
            &dataset,
            &gt,
            &pred,
            &[vec![]],
            &[vec![]],
            &dir.path().join("reports"),
            &dir.path().join("no-templates"),
            10,
            0,
        );

        assert!(result.is_ok());
    }

    #[test]
    fn renders_reports_through_the_template() {
        let dir = tempfile::tempdir().unwrap();
        let template_dir = dir.path().join("templates");
        fs::create_dir_all(&template_dir).unwrap();

        let template = "{% for example in examples %}{{ example.text }}|{% endfor %}";
        fs::write(template_dir.join("entity_examples.html"), template).unwrap();
        fs::write(template_dir.join("relation_examples.html"), template).unwrap();

        let schema = schema();
        let dataset =
            crate::datasets::Dataset::from_documents("test", vec![doc()]).unwrap();

        let gt = vec![vec![EntitySpan::new(
            1,
            2,
            schema.entity_type(1).unwrap().clone(),
            None,
        )]];

        let reports_dir = dir.path().join("reports");
        store_examples(
            &dataset,
            &gt,
            &gt.clone(),
            &[vec![]],
            &[vec![]],
            &reports_dir,
            &template_dir,
            10,
            3,
        )
        .unwrap();

        let rendered = fs::read_to_string(
            reports_dir.join("examples_entities_test_epoch_3.html"),
        )
        .unwrap();

        assert_eq!(rendered, "John works here|");
    }
}
