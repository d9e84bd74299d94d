//! Candidate generation and the class label inventory.
//!
//! A candidate is an unordered pair of entities mentioned in the same
//! sentence, kept in mention order. Directionality is not expressed by
//! duplicating pairs: a directed gold relation maps to a class label that
//! records whether its subject is the earlier or the later mention.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use relex_annotate::{AlignedEntity, AnnotatedDocument};
use relex_core::{ClassifierConfig, Document, Relation, Symmetry};

// ============================================================================
// Candidates
// ============================================================================

/// An entity pair from one sentence, in mention order
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Index of the source document within the batch
    pub document_index: usize,

    /// Index of the sentence within the document
    pub sentence_index: usize,

    /// Entity mentioned earlier in the sentence
    pub first: AlignedEntity,

    /// Entity mentioned later in the sentence
    pub second: AlignedEntity,
}

/// Subject position of a directed relation relative to mention order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// The subject is the earlier mention
    FirstToSecond,
    /// The subject is the later mention
    SecondToFirst,
}

/// One non-"none" class of the classifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationLabel {
    pub relation_type: String,
    pub direction: Direction,
    pub symmetry: Symmetry,
}

impl RelationLabel {
    /// Instantiate this label over a candidate's entity pair
    pub fn to_relation(&self, candidate: &Candidate) -> Relation {
        let (subject, object) = match self.direction {
            Direction::FirstToSecond => (candidate.first.id, candidate.second.id),
            Direction::SecondToFirst => (candidate.second.id, candidate.first.id),
        };
        Relation {
            relation_type: self.relation_type.clone(),
            subject,
            object,
            symmetry: self.symmetry,
            confidence: None,
        }
    }
}

// ============================================================================
// Label inventory
// ============================================================================

/// Ordered class inventory: class 0 is "none", classes 1.. are relation labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSet {
    labels: Vec<RelationLabel>,
}

impl LabelSet {
    /// Collect the label inventory from the gold relations of a corpus.
    ///
    /// Each gold relation contributes one label: its type plus, for directed
    /// types, whether the subject precedes the object in the text. A type
    /// declared symmetric anywhere is treated as symmetric everywhere and
    /// collapses to a single label.
    pub fn from_documents(documents: &[Document]) -> Self {
        let mut symmetric_types: HashSet<&str> = HashSet::new();
        for document in documents {
            for relation in &document.relations {
                if relation.symmetry == Symmetry::Symmetric {
                    symmetric_types.insert(relation.relation_type.as_str());
                }
            }
        }

        let mut labels: BTreeSet<RelationLabel> = BTreeSet::new();
        for document in documents {
            for relation in &document.relations {
                if symmetric_types.contains(relation.relation_type.as_str()) {
                    labels.insert(RelationLabel {
                        relation_type: relation.relation_type.clone(),
                        direction: Direction::FirstToSecond,
                        symmetry: Symmetry::Symmetric,
                    });
                    continue;
                }
                let direction = match (
                    document.entity(relation.subject),
                    document.entity(relation.object),
                ) {
                    (Some(subject), Some(object)) if object.start() < subject.start() => {
                        Direction::SecondToFirst
                    }
                    _ => Direction::FirstToSecond,
                };
                labels.insert(RelationLabel {
                    relation_type: relation.relation_type.clone(),
                    direction,
                    symmetry: Symmetry::Directed,
                });
            }
        }

        Self {
            labels: labels.into_iter().collect(),
        }
    }

    /// Total class count, including the "none" class
    pub fn num_classes(&self) -> usize {
        self.labels.len() + 1
    }

    /// Label for a non-zero class index
    pub fn get(&self, class: usize) -> Option<&RelationLabel> {
        if class == 0 {
            None
        } else {
            self.labels.get(class - 1)
        }
    }

    /// All relation labels in class order (class 1 first)
    pub fn labels(&self) -> &[RelationLabel] {
        &self.labels
    }

    fn symmetric_class(&self, relation_type: &str) -> Option<usize> {
        self.labels
            .iter()
            .position(|l| l.symmetry == Symmetry::Symmetric && l.relation_type == relation_type)
            .map(|i| i + 1)
    }

    fn directed_class(&self, relation_type: &str, direction: Direction) -> Option<usize> {
        self.labels
            .iter()
            .position(|l| {
                l.symmetry == Symmetry::Directed
                    && l.direction == direction
                    && l.relation_type == relation_type
            })
            .map(|i| i + 1)
    }

    /// Gold class of a candidate: its first matching gold relation, else 0.
    ///
    /// Symmetric types match the pair in either endpoint order; directed
    /// types require the exact subject/object orientation.
    pub fn label_of(&self, candidate: &Candidate, document: &Document) -> usize {
        for relation in &document.relations {
            if let Some(class) = self.symmetric_class(&relation.relation_type) {
                let covers = (relation.subject == candidate.first.id
                    && relation.object == candidate.second.id)
                    || (relation.subject == candidate.second.id
                        && relation.object == candidate.first.id);
                if covers {
                    return class;
                }
                continue;
            }
            let direction = if relation.subject == candidate.first.id
                && relation.object == candidate.second.id
            {
                Direction::FirstToSecond
            } else if relation.subject == candidate.second.id
                && relation.object == candidate.first.id
            {
                Direction::SecondToFirst
            } else {
                continue;
            };
            if let Some(class) = self.directed_class(&relation.relation_type, direction) {
                return class;
            }
        }
        0
    }
}

// ============================================================================
// Candidate builder
// ============================================================================

/// Enumerates same-sentence entity pairs as classification candidates
#[derive(Debug, Clone, Default)]
pub struct CandidateBuilder {
    /// Accepted entity type pairs, stored with the lesser type first
    type_pairs: Option<HashSet<(String, String)>>,
}

impl CandidateBuilder {
    /// Accept every entity type pair
    pub fn new() -> Self {
        Self { type_pairs: None }
    }

    /// Restrict candidates to the entity type pairs named in the config
    pub fn from_config(config: &ClassifierConfig) -> Self {
        if config.entity_type_pairs.is_empty() {
            return Self::new();
        }
        let type_pairs = config
            .entity_type_pairs
            .iter()
            .map(|(a, b)| Self::ordered(a, b))
            .collect();
        Self {
            type_pairs: Some(type_pairs),
        }
    }

    fn ordered(a: &str, b: &str) -> (String, String) {
        if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        }
    }

    /// Check an entity type pair against the filter, in either order
    pub fn accepts(&self, a: &str, b: &str) -> bool {
        match &self.type_pairs {
            None => true,
            Some(pairs) => pairs.contains(&Self::ordered(a, b)),
        }
    }

    /// Enumerate candidates for one annotated document, in document order.
    ///
    /// Sentences holding zero or one entity contribute nothing; self-pairs
    /// are never produced.
    pub fn build(&self, document_index: usize, document: &AnnotatedDocument) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        for (sentence_index, aligned) in document.sentences.iter().enumerate() {
            for i in 0..aligned.entities.len() {
                for j in (i + 1)..aligned.entities.len() {
                    let first = &aligned.entities[i];
                    let second = &aligned.entities[j];
                    if !self.accepts(&first.entity_type, &second.entity_type) {
                        continue;
                    }
                    candidates.push(Candidate {
                        document_index,
                        sentence_index,
                        first: first.clone(),
                        second: second.clone(),
                    });
                }
            }
        }
        candidates
    }
}

// ============================================================================
// Tests
// ============================================================================
