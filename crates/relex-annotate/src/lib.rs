//! Relex Annotate - Linguistic annotation backends
//!
//! Turns raw text into the sentence-level annotation the classifier consumes:
//! - Token spans with part-of-speech tags and lemmas
//! - Sentence boundaries
//! - Dependency parses
//! - Entity mention spans proposed by the backend (optional layer)
//!
//! Two backends are provided: a deterministic rule annotator for offline use
//! and tests, and an HTTP client for CoreNLP-style annotation servers. The
//! `session` module manages the lifecycle of an external server process.

pub mod http;
pub mod rules;
pub mod session;

pub use http::HttpAnnotator;
pub use rules::RuleAnnotator;
pub use session::{AnnotatorService, RemoteSession, ServerSession, SessionConfig};

use relex_core::{Entity, EntityId, Result, Span};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// Annotation Layers
// ============================================================================

/// A single token with its character extent and tags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Surface text
    pub text: String,

    /// Lemmatized form (best effort; falls back to the lowercased surface)
    pub lemma: String,

    /// Part-of-speech tag
    pub pos: String,

    /// Byte offset of the token start in the document text
    pub start: usize,

    /// Byte offset one past the token end
    pub end: usize,
}

impl Token {
    pub fn span(&self) -> Span {
        Span::new(self.start, self.end)
    }
}

/// A dependency edge between two tokens of one sentence
///
/// Indices refer to the sentence's token vector. The root token has no
/// incoming edge; it is recorded on [`Sentence::root`] instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub head: usize,
    pub dependent: usize,
    pub label: String,
}

/// Annotation of one sentence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sentence {
    pub tokens: Vec<Token>,
    pub dependencies: Vec<DependencyEdge>,
    pub root: Option<usize>,
}

impl Sentence {
    /// Byte offset where the sentence starts
    pub fn start(&self) -> usize {
        self.tokens.first().map(|t| t.start).unwrap_or(0)
    }

    /// Byte offset where the sentence ends
    pub fn end(&self) -> usize {
        self.tokens.last().map(|t| t.end).unwrap_or(0)
    }
}

/// An entity mention span proposed by the annotation backend
///
/// Distinct from [`relex_core::Entity`]: mentions are the backend's own
/// suggestions and carry no document-scoped identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentionSpan {
    pub start: usize,
    pub end: usize,
    pub label: String,
}

/// Full annotation of one document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub sentences: Vec<Sentence>,
    pub mentions: Vec<MentionSpan>,
}

// ============================================================================
// Annotator Interface
// ============================================================================

/// Interface implemented by every annotation backend
pub trait Annotator: Send + Sync {
    /// Annotate raw text with sentences, tokens, and dependency parses
    fn annotate(&self, text: &str) -> Result<Annotation>;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

// ============================================================================
// Entity Alignment
// ============================================================================

/// An entity projected onto the token layer of one sentence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedEntity {
    pub id: EntityId,
    pub entity_type: String,

    /// Indices of the tokens this entity covers, ascending
    pub token_indices: Vec<usize>,
}

impl AlignedEntity {
    /// Index of the first covered token
    pub fn first_token(&self) -> usize {
        self.token_indices[0]
    }

    /// Index of the last covered token
    pub fn last_token(&self) -> usize {
        self.token_indices[self.token_indices.len() - 1]
    }
}

/// A sentence together with the entities aligned into it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignedSentence {
    pub sentence: Sentence,

    /// Entities whose mentions fall in this sentence, by first token index
    pub entities: Vec<AlignedEntity>,
}

/// A document's annotation with its entities projected onto the tokens
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedDocument {
    pub sentences: Vec<AlignedSentence>,
}

/// Project entities onto a document's annotation
///
/// Each entity is assigned to the first sentence containing a token that
/// overlaps one of its spans; tokens from later sentences are not collected,
/// so a mention straddling a sentence boundary is truncated to its first
/// sentence. Entities overlapping no token at all are skipped with a debug
/// log, and never become candidates.
pub fn align(entities: &[Entity], annotation: Annotation) -> AnnotatedDocument {
    let mut sentences: Vec<AlignedSentence> = annotation
        .sentences
        .into_iter()
        .map(|sentence| AlignedSentence {
            sentence,
            entities: Vec::new(),
        })
        .collect();

    for entity in entities {
        let mut placed = false;
        for aligned in sentences.iter_mut() {
            let token_indices: Vec<usize> = aligned
                .sentence
                .tokens
                .iter()
                .enumerate()
                .filter(|(_, token)| {
                    entity.spans.iter().any(|span| span.overlaps(&token.span()))
                })
                .map(|(index, _)| index)
                .collect();

            if !token_indices.is_empty() {
                aligned.entities.push(AlignedEntity {
                    id: entity.id,
                    entity_type: entity.entity_type.clone(),
                    token_indices,
                });
                placed = true;
                break;
            }
        }

        if !placed {
            debug!(
                entity_id = entity.id,
                entity_type = %entity.entity_type,
                "entity overlaps no annotated token, skipping"
            );
        }
    }

    for aligned in &mut sentences {
        aligned.entities.sort_by_key(|entity| entity.first_token());
    }

    AnnotatedDocument { sentences }
}

// ============================================================================
// Tests
// ============================================================================
