//! The relation classifier: train over gold documents, predict over new text.
//!
//! `train` annotates every document, enumerates candidates, extracts
//! features, freezes the vocabulary (and idf table when tf-idf is on), and
//! fits the logistic model. `predict` reruns the identical candidate and
//! feature path against the frozen model. The previous model stays in place
//! until a new one is fully built, and prediction never mutates it.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use relex_annotate::{align, AnnotatedDocument, Annotator};
use relex_core::{
    ClassifierConfig, Document, Entity, Relation, RelexError, Result, UnlabeledDocument,
};

use crate::candidates::{Candidate, CandidateBuilder, LabelSet};
use crate::features::FeatureExtractor;
use crate::model::{LogisticModel, SparseRow, TfidfWeights, TrainOptions, Vocabulary};

// ============================================================================
// Trained model snapshot
// ============================================================================

/// Everything learned by `train`, frozen and serializable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    /// Class inventory (class 0 is "none")
    pub labels: LabelSet,

    /// Frozen feature vocabulary
    pub vocabulary: Vocabulary,

    /// Idf table, present when tf-idf was enabled at train time
    pub tfidf: Option<TfidfWeights>,

    /// Fitted logistic weights
    pub model: LogisticModel,

    /// Classifier settings in effect at train time
    pub config: ClassifierConfig,

    /// When training finished
    pub trained_at: DateTime<Utc>,
}

impl TrainedModel {
    /// Serialize the model to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self).map_err(anyhow::Error::from)?)
    }

    /// Deserialize a model from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json).map_err(anyhow::Error::from)?)
    }

    /// Write the model to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_json()?)
            .with_context(|| format!("writing model to {}", path.display()))?;
        Ok(())
    }

    /// Read a model back from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("reading model from {}", path.display()))?;
        Self::from_json(&json)
    }
}

// ============================================================================
// Classifier
// ============================================================================

/// Trains on gold documents and predicts relations in new ones.
///
/// A trained classifier can be shared across threads for prediction;
/// `train` takes `&mut self` and so serializes naturally.
pub struct RelationClassifier {
    annotator: Arc<dyn Annotator>,
    config: ClassifierConfig,
    model: Option<TrainedModel>,
}

impl RelationClassifier {
    /// Create an untrained classifier with default settings
    pub fn new(annotator: Arc<dyn Annotator>) -> Self {
        Self::with_config(annotator, ClassifierConfig::default())
    }

    /// Create an untrained classifier with explicit settings
    pub fn with_config(annotator: Arc<dyn Annotator>, config: ClassifierConfig) -> Self {
        Self {
            annotator,
            config,
            model: None,
        }
    }

    /// Resume from a previously trained model
    pub fn from_model(annotator: Arc<dyn Annotator>, model: TrainedModel) -> Self {
        Self {
            annotator,
            config: model.config.clone(),
            model: Some(model),
        }
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    /// The trained model, if any
    pub fn model(&self) -> Option<&TrainedModel> {
        self.model.as_ref()
    }

    /// Train the classifier over gold-annotated documents.
    ///
    /// Entity pairs without a gold relation become "none" examples. Fails
    /// with `EmptyTrainingSet` when no document yields a candidate pair.
    /// The previous model, if any, stays in place until the new one is
    /// complete.
    pub fn train(&mut self, documents: &[Document]) -> Result<()> {
        let started = Instant::now();
        tracing::info!("Training on {} document(s)", documents.len());

        let annotated = self.annotate_all(
            documents
                .iter()
                .map(|d| (d.text.as_str(), d.entities.as_slice())),
        )?;

        let labels = LabelSet::from_documents(documents);
        let builder = CandidateBuilder::from_config(&self.config);
        let extractor = FeatureExtractor::from_config(&self.config)?;

        let mut vectors = Vec::new();
        let mut classes = Vec::new();
        for (document_index, document) in annotated.iter().enumerate() {
            for candidate in builder.build(document_index, document) {
                let aligned = &document.sentences[candidate.sentence_index];
                vectors.push(extractor.extract(&candidate, aligned)?);
                classes.push(labels.label_of(&candidate, &documents[document_index]));
            }
        }
        if vectors.is_empty() {
            return Err(RelexError::EmptyTrainingSet {
                documents: documents.len(),
            });
        }
        tracing::debug!(
            "Extracted {} candidate(s) over {} class(es)",
            vectors.len(),
            labels.num_classes()
        );

        let vocabulary = Vocabulary::fit(&vectors);
        let num_features = vocabulary.len();
        let mut rows: Vec<SparseRow> = vectors.iter().map(|v| vocabulary.encode(v)).collect();
        let tfidf = if self.config.tfidf {
            let tfidf = TfidfWeights::fit(&rows, num_features);
            for row in &mut rows {
                tfidf.apply(row);
            }
            Some(tfidf)
        } else {
            None
        };

        let options = TrainOptions::from_config(&self.config);
        let model = LogisticModel::fit(
            &rows,
            &classes,
            labels.num_classes(),
            num_features,
            &options,
        );

        self.model = Some(TrainedModel {
            labels,
            vocabulary,
            tfidf,
            model,
            config: self.config.clone(),
            trained_at: Utc::now(),
        });
        tracing::info!(
            "Training finished in {:.2}s over {} feature(s)",
            started.elapsed().as_secs_f64(),
            num_features
        );
        Ok(())
    }

    /// Predict relations for unlabeled documents, one result set per input.
    ///
    /// Candidates are generated and featurized exactly as at train time,
    /// using the settings frozen in the model. Without a configured
    /// threshold the most probable relation class wins (or none); with one,
    /// every relation class whose probability clears it yields a relation.
    pub fn predict(&self, documents: &[UnlabeledDocument]) -> Result<Vec<Vec<Relation>>> {
        let model = self.model.as_ref().ok_or(RelexError::NotTrained)?;
        let builder = CandidateBuilder::from_config(&model.config);
        let extractor = FeatureExtractor::from_config(&model.config)?;

        let annotated = self.annotate_all(
            documents
                .iter()
                .map(|d| (d.text.as_str(), d.entities.as_slice())),
        )?;

        let mut results = Vec::with_capacity(documents.len());
        for (document_index, document) in annotated.iter().enumerate() {
            let mut relations = Vec::new();
            for candidate in builder.build(document_index, document) {
                let aligned = &document.sentences[candidate.sentence_index];
                let features = extractor.extract(&candidate, aligned)?;
                let mut row = model.vocabulary.encode(&features);
                if let Some(tfidf) = &model.tfidf {
                    tfidf.apply(&mut row);
                }
                let probabilities = model.model.predict_proba(&row);
                emit_relations(model, &candidate, &probabilities, &mut relations);
            }
            results.push(relations);
        }
        tracing::debug!(
            "Predicted {} relation(s) across {} document(s)",
            results.iter().map(|r| r.len()).sum::<usize>(),
            results.len()
        );
        Ok(results)
    }

    fn annotate_all<'a>(
        &self,
        documents: impl Iterator<Item = (&'a str, &'a [Entity])>,
    ) -> Result<Vec<AnnotatedDocument>> {
        documents
            .map(|(text, entities)| {
                let annotation = self.annotator.annotate(text)?;
                Ok(align(entities, annotation))
            })
            .collect()
    }
}

fn emit_relations(
    model: &TrainedModel,
    candidate: &Candidate,
    probabilities: &[f64],
    out: &mut Vec<Relation>,
) {
    match model.config.threshold {
        Some(threshold) => {
            for (class, &probability) in probabilities.iter().enumerate().skip(1) {
                if probability < threshold {
                    continue;
                }
                if let Some(label) = model.labels.get(class) {
                    out.push(label.to_relation(candidate).with_confidence(probability));
                }
            }
        }
        None => {
            let mut best = 0;
            for (class, &probability) in probabilities.iter().enumerate() {
                if probability > probabilities[best] {
                    best = class;
                }
            }
            if let Some(label) = model.labels.get(best) {
                out.push(
                    label
                        .to_relation(candidate)
                        .with_confidence(probabilities[best]),
                );
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use relex_annotate::RuleAnnotator;
    use relex_core::{datagen, Span};

    fn make_classifier() -> RelationClassifier {
        RelationClassifier::new(Arc::new(RuleAnnotator::new()))
    }

    #[test]
    fn test_predict_before_train_is_an_error() {
        let classifier = make_classifier();
        let documents = vec![UnlabeledDocument::new("aspirin treats migraine", Vec::new())];

        let err = classifier.predict(&documents).unwrap_err();
        assert!(matches!(err, RelexError::NotTrained));
    }

    #[test]
    fn test_train_without_candidate_pairs_is_an_error() {
        let mut classifier = make_classifier();
        let documents = vec![Document::new("aspirin helps")
            .with_entities(vec![Entity::new(1, "drug", "aspirin", Span::new(0, 7))])];

        let err = classifier.train(&documents).unwrap_err();
        assert!(matches!(err, RelexError::EmptyTrainingSet { documents: 1 }));
    }

    #[test]
    fn test_train_then_predict_finds_relations() {
        let corpus = datagen::generate(6, 6);
        let mut classifier = make_classifier();
        classifier.train(&corpus).unwrap();
        assert!(classifier.is_trained());

        let inputs: Vec<UnlabeledDocument> = corpus.iter().map(|d| d.to_unlabeled()).collect();
        let predictions = classifier.predict(&inputs).unwrap();

        assert_eq!(predictions.len(), corpus.len());
        for (document, predicted) in corpus.iter().zip(&predictions) {
            let expected: Vec<_> = document.relations.iter().map(Relation::key).collect();
            let got: Vec<_> = predicted.iter().map(Relation::key).collect();
            assert_eq!(got, expected);
        }
        for relation in predictions.iter().flatten() {
            let confidence = relation.confidence.unwrap();
            assert!((0.0..=1.0).contains(&confidence));
        }
    }

    #[test]
    fn test_prediction_is_deterministic() {
        let corpus = datagen::generate(5, 5);
        let mut classifier = make_classifier();
        classifier.train(&corpus).unwrap();

        let inputs: Vec<UnlabeledDocument> = corpus.iter().map(|d| d.to_unlabeled()).collect();
        let once = classifier.predict(&inputs).unwrap();
        let twice = classifier.predict(&inputs).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_unreachable_threshold_suppresses_every_relation() {
        let corpus = datagen::generate(5, 5);
        let config = ClassifierConfig {
            threshold: Some(2.0),
            ..ClassifierConfig::default()
        };
        let mut classifier =
            RelationClassifier::with_config(Arc::new(RuleAnnotator::new()), config);
        classifier.train(&corpus).unwrap();

        let inputs: Vec<UnlabeledDocument> = corpus.iter().map(|d| d.to_unlabeled()).collect();
        let predictions = classifier.predict(&inputs).unwrap();
        assert!(predictions.iter().all(|p| p.is_empty()));
    }

    #[test]
    fn test_model_snapshot_round_trips_through_json() {
        let corpus = datagen::generate(4, 4);
        let mut classifier = make_classifier();
        classifier.train(&corpus).unwrap();

        let model = classifier.model().unwrap();
        let restored = TrainedModel::from_json(&model.to_json().unwrap()).unwrap();
        assert_eq!(&restored, model);

        let resumed = RelationClassifier::from_model(Arc::new(RuleAnnotator::new()), restored);
        let inputs: Vec<UnlabeledDocument> = corpus.iter().map(|d| d.to_unlabeled()).collect();
        assert_eq!(
            resumed.predict(&inputs).unwrap(),
            classifier.predict(&inputs).unwrap()
        );
    }
}
