//! Command line tool to run the evaluation core over a dataset and a raw
//! prediction dump

use std::path::PathBuf;

use anyhow::anyhow;
use pico_args::Arguments;
use tablefill::{
    datasets::Dataset,
    pipelines::table_filling::{EvalConfig, Evaluator, PredictionBatch},
    schema::Schema,
};

const HELP: &str = "\
Usage: evaluate TYPES DATASET PREDICTIONS [OPTIONS]

Arguments:
  TYPES                Path to the JSON types file
  DATASET              Path to the JSON dataset file
  PREDICTIONS          Path to the JSON prediction dump (candidate beams per document)

Options:
  -h, --help           Print help
  -b, --batch-size     Documents per evaluation batch (defaults to 1)
  -e, --epoch          The current epoch (defaults to 0)
  --max-epoch          The final epoch; gates the tag dump
  --tags               Where to write the two-column tag dump
  --beam-audit         Where to write the chosen-beam audit log
  --csv                Where to append the CSV metrics row
  --examples           Where to write example reports
  --templates          Where the report templates live (defaults to 'templates')
";

#[derive(Debug)]
struct Args {
    types: PathBuf,
    dataset: PathBuf,
    predictions: PathBuf,
    batch_size: usize,
    epoch: usize,
    max_epoch: usize,
    tags: Option<PathBuf>,
    beam_audit: Option<PathBuf>,
    csv: Option<PathBuf>,
    examples: Option<PathBuf>,
    templates: Option<PathBuf>,
}

impl Args {
    fn parse() -> anyhow::Result<Option<Self>> {
        let mut pargs = Arguments::from_env();

        // Help has a higher priority and should be handled separately.
        if pargs.contains(["-h", "--help"]) {
            return Ok(None);
        }

        let args = Args {
            batch_size: pargs
                .opt_value_from_str(["-b", "--batch-size"])?
                .unwrap_or(1),
            epoch: pargs.opt_value_from_str(["-e", "--epoch"])?.unwrap_or(0),
            max_epoch: pargs.opt_value_from_str("--max-epoch")?.unwrap_or(0),
            tags: pargs.opt_value_from_str("--tags")?,
            beam_audit: pargs.opt_value_from_str("--beam-audit")?,
            csv: pargs.opt_value_from_str("--csv")?,
            examples: pargs.opt_value_from_str("--examples")?,
            templates: pargs.opt_value_from_str("--templates")?,
            types: pargs.free_from_str().map_err(|e| match e {
                pico_args::Error::MissingArgument => anyhow!("Missing required argument: TYPES"),
                _ => anyhow!("{}", e),
            })?,
            dataset: pargs.free_from_str().map_err(|e| match e {
                pico_args::Error::MissingArgument => anyhow!("Missing required argument: DATASET"),
                _ => anyhow!("{}", e),
            })?,
            predictions: pargs.free_from_str().map_err(|e| match e {
                pico_args::Error::MissingArgument => {
                    anyhow!("Missing required argument: PREDICTIONS")
                }
                _ => anyhow!("{}", e),
            })?,
        };

        Ok(Some(args))
    }
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let output = Args::parse()?;

    if output.is_none() {
        print!("{}", HELP);

        return Ok(());
    }
    let args = output.unwrap();

    let schema = Schema::load(&args.types)?;
    let dataset = Dataset::load(&args.dataset)?;

    let contents = std::fs::read_to_string(&args.predictions)?;
    let predictions: PredictionBatch = serde_json::from_str(&contents)?;

    let mut config = EvalConfig {
        epoch: args.epoch,
        max_epoch: args.max_epoch,
        tag_path: args.tags,
        beam_audit_path: args.beam_audit,
        csv_path: args.csv,
        examples_dir: args.examples,
        ..EvalConfig::default()
    };

    if let Some(templates) = args.templates {
        config.template_dir = templates;
    }

    let store_examples = config.examples_dir.is_some();
    let mut evaluator = Evaluator::new(&dataset, &schema, config)?;

    for chunk in predictions.docs.chunks(args.batch_size.max(1)) {
        let batch = PredictionBatch::new(chunk.to_vec());
        evaluator.eval_batch(&batch)?;
    }

    evaluator.compute_scores()?;

    if store_examples {
        evaluator.store_examples()?;
    }

    Ok(())
}
