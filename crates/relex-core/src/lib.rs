//! Relex Core - Domain models, error types, and shared configuration
//!
//! This crate defines the core abstractions used throughout the relex system:
//! - Corpus models (documents, entities, relations, character spans)
//! - Inline-tag markup parsing and rendering
//! - Deterministic synthetic corpus generation
//! - Common error types
//! - Configuration management

pub mod config;
pub mod datagen;
pub mod tagged;

pub use config::{
    AnnotatorConfig, AnnotatorKind, AppConfig, ClassWeighting, ClassifierConfig, ConfigError,
};
pub use datagen::{generate, generate_split};
pub use tagged::{parse_tagged, render_tagged};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for relex operations
#[derive(Error, Debug)]
pub enum RelexError {
    #[error("Missing {layer} annotation in sentence {sentence}")]
    MissingAnnotation { sentence: usize, layer: &'static str },

    #[error("No relation candidates found in {documents} training document(s)")]
    EmptyTrainingSet { documents: usize },

    #[error("Classifier has not been trained")]
    NotTrained,

    #[error("Gold corpus has {gold} document(s) but {predicted} prediction group(s) were given")]
    DocumentMismatch { gold: usize, predicted: usize },

    #[error("Unsupported metric: {0}")]
    UnsupportedMetric(String),

    #[error("Annotation server unavailable: {0}")]
    AnnotatorUnavailable(String),

    #[error("Invalid markup: {0}")]
    Markup(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RelexError>;

// ============================================================================
// Character Spans
// ============================================================================

/// Identifier of an entity, unique within one document
pub type EntityId = u32;

/// A half-open character range `[start, end)` into a document's text
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
    /// Byte offset of the first character
    pub start: usize,

    /// Byte offset one past the last character
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Check whether two spans share at least one character
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

// ============================================================================
// Entities and Relations
// ============================================================================

/// A typed entity mention in a document
///
/// An entity may cover several non-contiguous character ranges, e.g. the two
/// halves of a coordinated phrase. `spans` is kept in ascending order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Identifier, unique within the owning document
    pub id: EntityId,

    /// Entity type label (e.g. "drug", "disease")
    pub entity_type: String,

    /// Surface text covered by the spans
    pub text: String,

    /// Character ranges covered by this mention
    pub spans: Vec<Span>,

    /// Identifier carried over from the source markup or corpus, if any
    pub source_id: Option<String>,
}

impl Entity {
    /// Create an entity covering a single contiguous span
    pub fn new(id: EntityId, entity_type: impl Into<String>, text: impl Into<String>, span: Span) -> Self {
        Self {
            id,
            entity_type: entity_type.into(),
            text: text.into(),
            spans: vec![span],
            source_id: None,
        }
    }

    /// Create an entity covering several non-contiguous spans
    pub fn with_spans(
        id: EntityId,
        entity_type: impl Into<String>,
        text: impl Into<String>,
        spans: Vec<Span>,
    ) -> Self {
        Self {
            id,
            entity_type: entity_type.into(),
            text: text.into(),
            spans,
            source_id: None,
        }
    }

    /// Attach the identifier used by the source markup
    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    /// First character offset of the mention
    pub fn start(&self) -> usize {
        self.spans.first().map(|s| s.start).unwrap_or(0)
    }

    /// One past the last character offset of the mention
    pub fn end(&self) -> usize {
        self.spans.last().map(|s| s.end).unwrap_or(0)
    }
}

/// Whether the order of a relation's endpoints is meaningful
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Symmetry {
    /// `causes(A, B)` differs from `causes(B, A)`
    #[default]
    Directed,
    /// `interacts(A, B)` equals `interacts(B, A)`
    Symmetric,
}

/// A typed, binary relation between two entities of one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    /// Relation type label (e.g. "treats")
    pub relation_type: String,

    /// Subject entity ID
    pub subject: EntityId,

    /// Object entity ID
    pub object: EntityId,

    /// Whether endpoint order matters for this relation
    pub symmetry: Symmetry,

    /// Classifier confidence (absent on gold relations)
    pub confidence: Option<f64>,
}

impl Relation {
    /// Create a directed relation
    pub fn new(relation_type: impl Into<String>, subject: EntityId, object: EntityId) -> Self {
        Self {
            relation_type: relation_type.into(),
            subject,
            object,
            symmetry: Symmetry::Directed,
            confidence: None,
        }
    }

    /// Create a symmetric relation
    pub fn symmetric(relation_type: impl Into<String>, subject: EntityId, object: EntityId) -> Self {
        Self {
            relation_type: relation_type.into(),
            subject,
            object,
            symmetry: Symmetry::Symmetric,
            confidence: None,
        }
    }

    /// Set the classifier confidence score
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Canonical comparison key for this relation
    ///
    /// Symmetric relations sort their endpoint pair so that `r(A, B)` and
    /// `r(B, A)` produce the same key; directed relations keep the
    /// subject/object order.
    pub fn key(&self) -> RelationKey {
        let (a, b) = match self.symmetry {
            Symmetry::Directed => (self.subject, self.object),
            Symmetry::Symmetric => {
                if self.subject <= self.object {
                    (self.subject, self.object)
                } else {
                    (self.object, self.subject)
                }
            }
        };
        RelationKey {
            relation_type: self.relation_type.clone(),
            first: a,
            second: b,
        }
    }

    /// Check whether two relations denote the same assertion
    pub fn matches(&self, other: &Relation) -> bool {
        self.key() == other.key()
    }
}

/// Canonical identity of a relation, used for set comparison in evaluation
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationKey {
    pub relation_type: String,
    pub first: EntityId,
    pub second: EntityId,
}

// ============================================================================
// Documents
// ============================================================================

/// A document: raw text plus its entities and (optionally) gold relations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Raw text, with markup already stripped
    pub text: String,

    /// Entity mentions, ordered by first character offset
    pub entities: Vec<Entity>,

    /// Gold relations; empty for prediction inputs
    pub relations: Vec<Relation>,
}

impl Document {
    /// Create a document with no entities or relations
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            entities: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Parse a document from inline-tag markup
    pub fn from_tagged(markup: &str) -> Result<Self> {
        tagged::parse_tagged(markup)
    }

    /// Set the entity list
    pub fn with_entities(mut self, entities: Vec<Entity>) -> Self {
        self.entities = entities;
        self
    }

    /// Set the gold relation list
    pub fn with_relations(mut self, relations: Vec<Relation>) -> Self {
        self.relations = relations;
        self
    }

    /// Look up an entity by its document-scoped ID
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == id)
    }

    /// Copy of this document with the gold relations removed
    ///
    /// Prediction inputs carry text and entities only, so gold labels can
    /// never leak into the features.
    pub fn to_unlabeled(&self) -> UnlabeledDocument {
        UnlabeledDocument {
            text: self.text.clone(),
            entities: self.entities.clone(),
        }
    }
}

/// Prediction input: a document's text and entities without gold relations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnlabeledDocument {
    pub text: String,
    pub entities: Vec<Entity>,
}

impl UnlabeledDocument {
    pub fn new(text: impl Into<String>, entities: Vec<Entity>) -> Self {
        Self {
            text: text.into(),
            entities,
        }
    }
}

impl From<UnlabeledDocument> for Document {
    fn from(input: UnlabeledDocument) -> Self {
        Self {
            text: input.text,
            entities: input.entities,
            relations: Vec::new(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_overlap() {
        let a = Span::new(0, 5);
        let b = Span::new(4, 8);
        let c = Span::new(5, 8);

        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert_eq!(a.len(), 5);
    }

    #[test]
    fn test_directed_key_keeps_order() {
        let forward = Relation::new("causes", 1, 2);
        let backward = Relation::new("causes", 2, 1);

        assert_ne!(forward.key(), backward.key());
        assert!(!forward.matches(&backward));
    }

    #[test]
    fn test_symmetric_key_ignores_order() {
        let forward = Relation::symmetric("interacts", 1, 2);
        let backward = Relation::symmetric("interacts", 2, 1);

        assert_eq!(forward.key(), backward.key());
        assert!(forward.matches(&backward));
    }

    #[test]
    fn test_key_distinguishes_relation_types() {
        let treats = Relation::new("treats", 1, 2);
        let causes = Relation::new("causes", 1, 2);

        assert!(!treats.matches(&causes));
    }

    #[test]
    fn test_entity_lookup() {
        let doc = Document::new("aspirin cures headaches").with_entities(vec![
            Entity::new(1, "drug", "aspirin", Span::new(0, 7)),
            Entity::new(2, "disease", "headaches", Span::new(14, 23)),
        ]);

        assert_eq!(doc.entity(2).map(|e| e.text.as_str()), Some("headaches"));
        assert!(doc.entity(9).is_none());
    }

    #[test]
    fn test_unlabeled_drops_relations() {
        let doc = Document::new("x")
            .with_entities(vec![Entity::new(1, "drug", "x", Span::new(0, 1))])
            .with_relations(vec![Relation::new("treats", 1, 1)]);

        let unlabeled = doc.to_unlabeled();
        assert_eq!(unlabeled.entities.len(), 1);

        let round_trip: Document = unlabeled.into();
        assert!(round_trip.relations.is_empty());
    }

    #[test]
    fn test_multi_span_entity_extent() {
        let entity = Entity::with_spans(
            1,
            "disease",
            "breast and ovarian cancer",
            vec![Span::new(10, 16), Span::new(29, 35)],
        );

        assert_eq!(entity.start(), 10);
        assert_eq!(entity.end(), 35);
        assert_eq!(entity.spans.len(), 2);
    }
}
