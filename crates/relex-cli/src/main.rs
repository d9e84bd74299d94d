//! Relex CLI - Command-line interface
//!
//! Usage:
//!   relex train <corpus-dir> --model relex-model.json
//!   relex predict <input-dir> --model relex-model.json --output predictions.json
//!   relex evaluate <gold-dir> <predictions.json> --metric f1score
//!   relex demo

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use relex_annotate::{Annotator, AnnotatorService, HttpAnnotator, RemoteSession, RuleAnnotator};
use relex_classifier::{evaluate, evaluate_report, RelationClassifier, TrainedModel};
use relex_core::config::LoggingConfig;
use relex_core::{datagen, AnnotatorKind, AppConfig, Document, Relation, UnlabeledDocument};

#[derive(Parser)]
#[command(name = "relex")]
#[command(about = "Relation classification over entity-tagged text")]
#[command(version)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a classifier from a directory of tagged documents
    Train {
        /// Directory of .txt files with inline entity and relation tags
        corpus: PathBuf,

        /// Where to write the trained model
        #[arg(long, default_value = "relex-model.json")]
        model: PathBuf,
    },
    /// Predict relations for tagged documents with a trained model
    Predict {
        /// Directory of .txt files with inline entity tags
        input: PathBuf,

        /// Trained model produced by `train`
        #[arg(long, default_value = "relex-model.json")]
        model: PathBuf,

        /// Write predictions to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Score a predictions file against a gold corpus
    Evaluate {
        /// Directory of gold .txt files with relation tags
        gold: PathBuf,

        /// Predictions JSON produced by `predict`
        predictions: PathBuf,

        /// Metric to print: precision, recall, or f1score
        #[arg(long, default_value = "f1score")]
        metric: String,

        /// Print the full per-type report instead of a single score
        #[arg(long)]
        report: bool,
    },
    /// Train and evaluate on the built-in synthetic corpus
    Demo {
        /// Positive documents to generate
        #[arg(long, default_value_t = 100)]
        positives: usize,

        /// Negative documents to generate
        #[arg(long, default_value_t = 100)]
        negatives: usize,
    },
}

/// One document's predictions, keyed by corpus file name
#[derive(Serialize, Deserialize)]
struct PredictedDocument {
    file: String,
    relations: Vec<Relation>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Train { corpus, model } => run_train(&config, &corpus, &model),
        Commands::Predict {
            input,
            model,
            output,
        } => run_predict(&config, &input, &model, output.as_deref()),
        Commands::Evaluate {
            gold,
            predictions,
            metric,
            report,
        } => run_evaluate(&gold, &predictions, &metric, report),
        Commands::Demo {
            positives,
            negatives,
        } => run_demo(&config, positives, negatives),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    Ok(config.with_env_override()?)
}

fn init_tracing(logging: &LoggingConfig) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level)),
        )
        .with_file(logging.include_location)
        .with_line_number(logging.include_location)
        .init();
}

fn build_annotator(config: &AppConfig) -> anyhow::Result<Arc<dyn Annotator>> {
    match config.annotator.kind {
        AnnotatorKind::Rule => Ok(Arc::new(RuleAnnotator::new())),
        AnnotatorKind::Http => {
            let mut session = RemoteSession::new(&config.annotator.url)?.with_max_probes(
                config.annotator.max_probes,
                Duration::from_millis(config.annotator.initial_probe_delay_ms),
            );
            session
                .start()
                .context("annotation server is not reachable")?;
            Ok(Arc::new(HttpAnnotator::from_config(&config.annotator)?))
        }
    }
}

/// Load a directory of tagged documents, sorted by file name
fn load_corpus(dir: &Path) -> anyhow::Result<Vec<(String, Document)>> {
    let mut paths = Vec::new();
    let entries =
        fs::read_dir(dir).with_context(|| format!("reading corpus directory {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.extension().map_or(false, |ext| ext == "txt") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let markup =
            fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        let document = Document::from_tagged(&markup)
            .with_context(|| format!("parsing {}", path.display()))?;
        let file = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        documents.push((file, document));
    }

    if documents.is_empty() {
        anyhow::bail!("no .txt documents in {}", dir.display());
    }
    Ok(documents)
}

fn run_train(config: &AppConfig, corpus: &Path, model_path: &Path) -> anyhow::Result<()> {
    let documents: Vec<Document> = load_corpus(corpus)?
        .into_iter()
        .map(|(_, document)| document)
        .collect();
    tracing::info!(
        "Loaded {} document(s) from {}",
        documents.len(),
        corpus.display()
    );

    let annotator = build_annotator(config)?;
    let mut classifier = RelationClassifier::with_config(annotator, config.classifier.clone());
    classifier.train(&documents)?;

    let model = classifier.model().context("no model after training")?;
    model.save(model_path)?;
    println!("Model written to {}", model_path.display());
    Ok(())
}

fn run_predict(
    config: &AppConfig,
    input: &Path,
    model_path: &Path,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let mut model = TrainedModel::load(model_path)?;
    // a threshold from the config file or environment overrides the one
    // echoed in the model
    if config.classifier.threshold.is_some() {
        model.config.threshold = config.classifier.threshold;
    }

    let annotator = build_annotator(config)?;
    let classifier = RelationClassifier::from_model(annotator, model);

    let corpus = load_corpus(input)?;
    let inputs: Vec<UnlabeledDocument> = corpus
        .iter()
        .map(|(_, document)| document.to_unlabeled())
        .collect();
    let predictions = classifier.predict(&inputs)?;

    let results: Vec<PredictedDocument> = corpus
        .into_iter()
        .zip(predictions)
        .map(|((file, _), relations)| PredictedDocument { file, relations })
        .collect();
    let json = serde_json::to_string_pretty(&results)?;

    match output {
        Some(path) => {
            fs::write(path, &json).with_context(|| format!("writing {}", path.display()))?;
            println!("Predictions written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn run_evaluate(gold: &Path, predictions: &Path, metric: &str, report: bool) -> anyhow::Result<()> {
    let corpus = load_corpus(gold)?;
    let json = fs::read_to_string(predictions)
        .with_context(|| format!("reading {}", predictions.display()))?;
    let entries: Vec<PredictedDocument> = serde_json::from_str(&json)
        .with_context(|| format!("parsing {}", predictions.display()))?;

    let mut by_file: HashMap<String, Vec<Relation>> = entries
        .into_iter()
        .map(|entry| (entry.file, entry.relations))
        .collect();

    let mut gold_documents = Vec::with_capacity(corpus.len());
    let mut predicted = Vec::with_capacity(corpus.len());
    for (file, document) in corpus {
        let relations = by_file
            .remove(&file)
            .with_context(|| format!("no prediction entry for {file}"))?;
        gold_documents.push(document);
        predicted.push(relations);
    }

    if report {
        let report = evaluate_report(&gold_documents, &predicted)?;
        println!("{}", report.report());
    } else {
        let score = evaluate(&gold_documents, &predicted, metric)?;
        println!("{metric}: {score:.4}");
    }
    Ok(())
}

fn run_demo(config: &AppConfig, positives: usize, negatives: usize) -> anyhow::Result<()> {
    let (train, test) = datagen::generate_split(positives, negatives);
    tracing::info!(
        "Generated {} training and {} test document(s)",
        train.len(),
        test.len()
    );

    let mut classifier =
        RelationClassifier::with_config(Arc::new(RuleAnnotator::new()), config.classifier.clone());
    classifier.train(&train)?;

    let inputs: Vec<UnlabeledDocument> = test.iter().map(|d| d.to_unlabeled()).collect();
    let predictions = classifier.predict(&inputs)?;

    let report = evaluate_report(&test, &predictions)?;
    println!("{}", report.report());
    Ok(())
}
