//! Sparse feature extraction over relation candidates.
//!
//! Six feature families, selectable by name in `ClassifierConfig`:
//! - `entity_types`: the (type, type) pair of the two mentions
//! - `unigrams_between`: lowercased tokens strictly between the mentions
//! - `bigrams`: lowercased token bigrams over the whole sentence
//! - `dependency_path`: edge labels on the dependency path between mentions
//! - `dependency_path_near_entities`: dependency edges touching one mention
//! - `token_distance`: token gap between the mentions
//!
//! Extraction is pure: the same candidate and sentence always produce the
//! same vector.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use petgraph::algo::astar;
use petgraph::graph::{NodeIndex, UnGraph};
use serde::{Deserialize, Serialize};

use relex_annotate::{AlignedSentence, Sentence};
use relex_core::{ClassifierConfig, RelexError, Result};

use crate::candidates::Candidate;

// ============================================================================
// Feature families
// ============================================================================

/// A selectable family of candidate features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureFamily {
    EntityTypePair,
    UnigramsBetween,
    Bigrams,
    DependencyPath,
    DependencyPathNearEntities,
    TokenDistance,
}

impl FeatureFamily {
    /// Every family, in canonical order
    pub const ALL: [FeatureFamily; 6] = [
        FeatureFamily::EntityTypePair,
        FeatureFamily::UnigramsBetween,
        FeatureFamily::Bigrams,
        FeatureFamily::DependencyPath,
        FeatureFamily::DependencyPathNearEntities,
        FeatureFamily::TokenDistance,
    ];

    /// Config-file name of this family
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureFamily::EntityTypePair => "entity_types",
            FeatureFamily::UnigramsBetween => "unigrams_between",
            FeatureFamily::Bigrams => "bigrams",
            FeatureFamily::DependencyPath => "dependency_path",
            FeatureFamily::DependencyPathNearEntities => "dependency_path_near_entities",
            FeatureFamily::TokenDistance => "token_distance",
        }
    }

    fn needs_dependencies(&self) -> bool {
        matches!(
            self,
            FeatureFamily::DependencyPath | FeatureFamily::DependencyPathNearEntities
        )
    }
}

impl FromStr for FeatureFamily {
    type Err = RelexError;

    fn from_str(s: &str) -> Result<Self> {
        FeatureFamily::ALL
            .iter()
            .find(|family| family.as_str() == s)
            .copied()
            .ok_or_else(|| RelexError::Config(format!("Unknown feature family: {s}")))
    }
}

impl fmt::Display for FeatureFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Feature vectors
// ============================================================================

/// Sparse mapping from feature name to value, ordered by name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    values: BTreeMap<String, f64>,
}

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add to a feature's value, starting from zero if absent
    pub fn add(&mut self, name: impl Into<String>, value: f64) {
        *self.values.entry(name.into()).or_insert(0.0) += value;
    }

    /// Value of a feature, zero if absent
    pub fn get(&self, name: &str) -> f64 {
        self.values.get(name).copied().unwrap_or(0.0)
    }

    /// Iterate (name, value) pairs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(name, value)| (name.as_str(), *value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ============================================================================
// Extractor
// ============================================================================

/// Extracts the configured feature families from candidates
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    families: Vec<FeatureFamily>,
}

impl FeatureExtractor {
    /// Extract every feature family
    pub fn all() -> Self {
        Self {
            families: FeatureFamily::ALL.to_vec(),
        }
    }

    /// Extract the families named in the config
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        let families = config
            .features
            .iter()
            .map(|name| name.parse())
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { families })
    }

    /// Families this extractor produces
    pub fn families(&self) -> &[FeatureFamily] {
        &self.families
    }

    /// Build the sparse feature vector for one candidate.
    ///
    /// Fails with `MissingAnnotation` when a dependency family is selected
    /// but the sentence carries no dependency parse.
    pub fn extract(
        &self,
        candidate: &Candidate,
        aligned: &AlignedSentence,
    ) -> Result<FeatureVector> {
        let sentence = &aligned.sentence;
        let mut features = FeatureVector::new();

        for family in &self.families {
            if family.needs_dependencies()
                && sentence.dependencies.is_empty()
                && sentence.tokens.len() > 1
            {
                return Err(RelexError::MissingAnnotation {
                    sentence: candidate.sentence_index,
                    layer: "dependency",
                });
            }
            match family {
                FeatureFamily::EntityTypePair => entity_type_pair(&mut features, candidate),
                FeatureFamily::UnigramsBetween => {
                    unigrams_between(&mut features, candidate, sentence)
                }
                FeatureFamily::Bigrams => bigrams(&mut features, sentence),
                FeatureFamily::DependencyPath => {
                    dependency_path(&mut features, candidate, sentence)
                }
                FeatureFamily::DependencyPathNearEntities => {
                    dependency_near_entities(&mut features, candidate, sentence)
                }
                FeatureFamily::TokenDistance => token_distance(&mut features, candidate),
            }
        }

        Ok(features)
    }
}

fn entity_type_pair(features: &mut FeatureVector, candidate: &Candidate) {
    features.add(
        format!(
            "types/{}~{}",
            candidate.first.entity_type, candidate.second.entity_type
        ),
        1.0,
    );
}

fn unigrams_between(features: &mut FeatureVector, candidate: &Candidate, sentence: &Sentence) {
    let start = candidate.first.last_token() + 1;
    let end = candidate.second.first_token();
    if start >= end {
        return;
    }
    for token in &sentence.tokens[start..end] {
        features.add(format!("uni_between/{}", token.text.to_lowercase()), 1.0);
    }
}

fn bigrams(features: &mut FeatureVector, sentence: &Sentence) {
    for pair in sentence.tokens.windows(2) {
        features.add(
            format!(
                "bigram/{}~{}",
                pair[0].text.to_lowercase(),
                pair[1].text.to_lowercase()
            ),
            1.0,
        );
    }
}

fn dependency_path(features: &mut FeatureVector, candidate: &Candidate, sentence: &Sentence) {
    let labels = path_edge_labels(
        sentence,
        candidate.first.first_token(),
        candidate.second.first_token(),
    );
    for label in labels {
        features.add(format!("dep_path/{label}"), 1.0);
    }
}

/// Edge labels along the shortest dependency path between two tokens.
///
/// The parse is walked as an undirected graph. Disconnected parses or
/// out-of-range endpoints yield no labels rather than an error.
fn path_edge_labels(sentence: &Sentence, from: usize, to: usize) -> Vec<String> {
    let mut graph: UnGraph<usize, usize> = UnGraph::default();
    let nodes: Vec<NodeIndex> = (0..sentence.tokens.len())
        .map(|index| graph.add_node(index))
        .collect();
    for (index, edge) in sentence.dependencies.iter().enumerate() {
        if edge.head < nodes.len() && edge.dependent < nodes.len() {
            graph.add_edge(nodes[edge.head], nodes[edge.dependent], index);
        }
    }

    let (Some(&start), Some(&goal)) = (nodes.get(from), nodes.get(to)) else {
        return Vec::new();
    };
    let Some((_, path)) = astar(&graph, start, |node| node == goal, |_| 1usize, |_| 0) else {
        return Vec::new();
    };

    let mut labels = Vec::new();
    for pair in path.windows(2) {
        if let Some(edge) = graph.find_edge(pair[0], pair[1]) {
            if let Some(&index) = graph.edge_weight(edge) {
                labels.push(sentence.dependencies[index].label.clone());
            }
        }
    }
    labels
}

fn dependency_near_entities(
    features: &mut FeatureVector,
    candidate: &Candidate,
    sentence: &Sentence,
) {
    let first: HashSet<usize> = candidate.first.token_indices.iter().copied().collect();
    let second: HashSet<usize> = candidate.second.token_indices.iter().copied().collect();

    for edge in &sentence.dependencies {
        // edges with exactly one endpoint inside the mention
        if first.contains(&edge.head) != first.contains(&edge.dependent) {
            features.add(format!("dep_near/e1/{}", edge.label), 1.0);
        }
        if second.contains(&edge.head) != second.contains(&edge.dependent) {
            features.add(format!("dep_near/e2/{}", edge.label), 1.0);
        }
    }
}

fn token_distance(features: &mut FeatureVector, candidate: &Candidate) {
    let gap = candidate
        .second
        .first_token()
        .saturating_sub(candidate.first.last_token());
    features.add("position/token_gap", gap as f64);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use relex_annotate::{AlignedEntity, DependencyEdge, Token};

    fn make_token(text: &str, start: usize) -> Token {
        Token {
            text: text.to_string(),
            lemma: text.to_lowercase(),
            pos: "NN".to_string(),
            start,
            end: start + text.len(),
        }
    }

    fn make_aligned(id: u32, entity_type: &str, token_indices: Vec<usize>) -> AlignedEntity {
        AlignedEntity {
            id,
            entity_type: entity_type.to_string(),
            token_indices,
        }
    }

    fn make_edge(head: usize, dependent: usize, label: &str) -> DependencyEdge {
        DependencyEdge {
            head,
            dependent,
            label: label.to_string(),
        }
    }

    // "Aspirin clearly treats migraine ." with a verb-rooted parse
    fn make_sentence() -> AlignedSentence {
        let words = ["Aspirin", "clearly", "treats", "migraine", "."];
        let mut tokens = Vec::new();
        let mut offset = 0;
        for word in words {
            tokens.push(make_token(word, offset));
            offset += word.len() + 1;
        }
        AlignedSentence {
            sentence: Sentence {
                tokens,
                dependencies: vec![
                    make_edge(2, 0, "nsubj"),
                    make_edge(2, 1, "advmod"),
                    make_edge(2, 3, "obj"),
                    make_edge(2, 4, "punct"),
                ],
                root: Some(2),
            },
            entities: vec![
                make_aligned(1, "drug", vec![0]),
                make_aligned(2, "disease", vec![3]),
            ],
        }
    }

    fn make_candidate(aligned: &AlignedSentence) -> Candidate {
        Candidate {
            document_index: 0,
            sentence_index: 0,
            first: aligned.entities[0].clone(),
            second: aligned.entities[1].clone(),
        }
    }

    fn extract_family(family: &str) -> FeatureVector {
        let aligned = make_sentence();
        let candidate = make_candidate(&aligned);
        let config = ClassifierConfig {
            features: vec![family.to_string()],
            ..ClassifierConfig::default()
        };
        let extractor = FeatureExtractor::from_config(&config).unwrap();
        extractor.extract(&candidate, &aligned).unwrap()
    }

    #[test]
    fn test_entity_type_pair_feature() {
        let features = extract_family("entity_types");
        assert_eq!(features.len(), 1);
        assert_eq!(features.get("types/drug~disease"), 1.0);
    }

    #[test]
    fn test_unigrams_between_are_lowercased_inner_tokens() {
        let features = extract_family("unigrams_between");
        assert_eq!(features.get("uni_between/clearly"), 1.0);
        assert_eq!(features.get("uni_between/treats"), 1.0);
        // mention tokens themselves are outside the window
        assert_eq!(features.get("uni_between/aspirin"), 0.0);
        assert_eq!(features.get("uni_between/migraine"), 0.0);
    }

    #[test]
    fn test_unigrams_between_adjacent_mentions_are_empty() {
        let mut aligned = make_sentence();
        aligned.entities[1].token_indices = vec![1];
        let candidate = make_candidate(&aligned);
        let config = ClassifierConfig {
            features: vec!["unigrams_between".to_string()],
            ..ClassifierConfig::default()
        };
        let extractor = FeatureExtractor::from_config(&config).unwrap();

        let features = extractor.extract(&candidate, &aligned).unwrap();
        assert!(features.is_empty());
    }

    #[test]
    fn test_bigrams_cover_the_sentence() {
        let features = extract_family("bigrams");
        assert_eq!(features.len(), 4);
        assert_eq!(features.get("bigram/aspirin~clearly"), 1.0);
        assert_eq!(features.get("bigram/migraine~."), 1.0);
    }

    #[test]
    fn test_dependency_path_edge_labels() {
        let features = extract_family("dependency_path");
        // Aspirin -nsubj-> treats -obj-> migraine
        assert_eq!(features.get("dep_path/nsubj"), 1.0);
        assert_eq!(features.get("dep_path/obj"), 1.0);
        assert_eq!(features.get("dep_path/advmod"), 0.0);
    }

    #[test]
    fn test_dependency_edges_near_each_entity() {
        let features = extract_family("dependency_path_near_entities");
        assert_eq!(features.get("dep_near/e1/nsubj"), 1.0);
        assert_eq!(features.get("dep_near/e2/obj"), 1.0);
        assert_eq!(features.get("dep_near/e1/obj"), 0.0);
    }

    #[test]
    fn test_token_distance_value() {
        let features = extract_family("token_distance");
        assert_eq!(features.get("position/token_gap"), 3.0);
    }

    #[test]
    fn test_missing_dependency_parse_is_an_error() {
        let mut aligned = make_sentence();
        aligned.sentence.dependencies.clear();
        let candidate = make_candidate(&aligned);
        let extractor = FeatureExtractor::all();

        let err = extractor.extract(&candidate, &aligned).unwrap_err();
        assert!(matches!(
            err,
            RelexError::MissingAnnotation {
                layer: "dependency",
                ..
            }
        ));
    }

    #[test]
    fn test_single_token_sentence_skips_dependency_check() {
        let aligned = AlignedSentence {
            sentence: Sentence {
                tokens: vec![make_token("aspirin", 0)],
                dependencies: Vec::new(),
                root: None,
            },
            entities: vec![
                make_aligned(1, "drug", vec![0]),
                make_aligned(2, "drug", vec![0]),
            ],
        };
        let candidate = Candidate {
            document_index: 0,
            sentence_index: 0,
            first: aligned.entities[0].clone(),
            second: aligned.entities[1].clone(),
        };

        let features = FeatureExtractor::all().extract(&candidate, &aligned).unwrap();
        assert_eq!(features.get("types/drug~drug"), 1.0);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let aligned = make_sentence();
        let candidate = make_candidate(&aligned);
        let extractor = FeatureExtractor::all();

        let once = extractor.extract(&candidate, &aligned).unwrap();
        let twice = extractor.extract(&candidate, &aligned).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_unknown_family_name_is_a_config_error() {
        let config = ClassifierConfig {
            features: vec!["character_trigrams".to_string()],
            ..ClassifierConfig::default()
        };

        let err = FeatureExtractor::from_config(&config).unwrap_err();
        assert!(matches!(err, RelexError::Config(_)));
    }

    #[test]
    fn test_family_names_round_trip() {
        for family in FeatureFamily::ALL {
            assert_eq!(family.as_str().parse::<FeatureFamily>().unwrap(), family);
        }
    }
}
