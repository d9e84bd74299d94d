//! Relex Classifier - Relation classification pipeline
//!
//! Turns annotated documents into relation predictions:
//! - `candidates`: same-sentence entity pairs and the class label inventory
//! - `features`: sparse feature extraction (lexical, positional, syntactic)
//! - `model`: feature vocabulary, tf-idf, multinomial logistic regression
//! - `classifier`: the train/predict orchestrator and its model snapshot
//! - `eval`: precision/recall/F1 scoring of predictions against gold
//!
//! Training and prediction are synchronous and free of randomness: a fixed
//! corpus always fits the same model, and a fixed model always predicts the
//! same relations.

pub mod candidates;
pub mod classifier;
pub mod eval;
pub mod features;
pub mod model;

pub use candidates::{Candidate, CandidateBuilder, Direction, LabelSet, RelationLabel};
pub use classifier::{RelationClassifier, TrainedModel};
pub use eval::{evaluate, evaluate_report, EvaluationReport, Metric, RelationCounts};
pub use features::{FeatureExtractor, FeatureFamily, FeatureVector};
pub use model::{LogisticModel, SparseRow, TfidfWeights, TrainOptions, Vocabulary};
