//! HTTP annotation backend
//!
//! Client for CoreNLP-style annotation servers: the document text is POSTed
//! with a `properties` query parameter selecting the annotator stages, and
//! the server replies with sentence-segmented JSON. Connection and protocol
//! failures surface as [`RelexError::AnnotatorUnavailable`] so the caller
//! can distinguish a dead server from bad input.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::{Annotation, Annotator, DependencyEdge, MentionSpan, Sentence, Token};
use relex_core::{AnnotatorConfig, RelexError, Result};

/// Annotation client for an external HTTP server
pub struct HttpAnnotator {
    client: reqwest::blocking::Client,
    url: String,
    annotators: String,
}

impl HttpAnnotator {
    /// Create a client for the given server URL with default settings
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::from_config(&AnnotatorConfig {
            url: url.into(),
            ..AnnotatorConfig::default()
        })
    }

    /// Create a client from an annotator configuration
    pub fn from_config(config: &AnnotatorConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RelexError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            annotators: config.annotators.clone(),
        })
    }

    /// Override the annotator stages requested from the server
    pub fn with_annotators(mut self, annotators: impl Into<String>) -> Self {
        self.annotators = annotators.into();
        self
    }
}

impl Annotator for HttpAnnotator {
    fn annotate(&self, text: &str) -> Result<Annotation> {
        let properties = serde_json::json!({
            "annotators": self.annotators,
            "outputFormat": "json",
        });

        let response = self
            .client
            .post(&self.url)
            .query(&[("properties", properties.to_string())])
            .body(text.to_string())
            .send()
            .map_err(|e| RelexError::AnnotatorUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelexError::AnnotatorUnavailable(format!(
                "server returned {status}"
            )));
        }

        let wire: WireResponse = response.json().map_err(|e| {
            RelexError::AnnotatorUnavailable(format!("unexpected response body: {e}"))
        })?;

        debug!(
            sentences = wire.sentences.len(),
            backend = self.name(),
            "received annotation"
        );
        Ok(decode(text, wire))
    }

    fn name(&self) -> &str {
        "http"
    }
}

// ============================================================================
// Wire Format
// ============================================================================

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    sentences: Vec<WireSentence>,
}

#[derive(Debug, Deserialize)]
struct WireSentence {
    #[serde(default)]
    tokens: Vec<WireToken>,

    #[serde(rename = "basicDependencies", default)]
    basic_dependencies: Vec<WireDependency>,

    #[serde(rename = "entitymentions", default)]
    entity_mentions: Vec<WireMention>,
}

#[derive(Debug, Deserialize)]
struct WireToken {
    word: String,

    #[serde(default)]
    lemma: Option<String>,

    #[serde(default)]
    pos: Option<String>,

    #[serde(rename = "characterOffsetBegin")]
    begin: usize,

    #[serde(rename = "characterOffsetEnd")]
    end: usize,
}

/// Dependency in 1-based token numbering; governor 0 marks the root edge
#[derive(Debug, Deserialize)]
struct WireDependency {
    dep: String,
    governor: usize,
    dependent: usize,
}

#[derive(Debug, Deserialize)]
struct WireMention {
    #[serde(rename = "characterOffsetBegin")]
    begin: usize,

    #[serde(rename = "characterOffsetEnd")]
    end: usize,

    #[serde(default)]
    ner: Option<String>,
}

/// Convert a wire response into the internal annotation model
///
/// The server reports character offsets; internal spans are byte offsets, so
/// offsets are remapped through the original text. Out-of-range indices in
/// malformed dependency entries are dropped.
fn decode(text: &str, wire: WireResponse) -> Annotation {
    let mut byte_offsets: Vec<usize> = text.char_indices().map(|(byte, _)| byte).collect();
    byte_offsets.push(text.len());
    let to_byte = |char_offset: usize| -> usize {
        byte_offsets.get(char_offset).copied().unwrap_or(text.len())
    };

    let mut sentences = Vec::with_capacity(wire.sentences.len());
    let mut mentions = Vec::new();

    for wire_sentence in wire.sentences {
        let tokens: Vec<Token> = wire_sentence
            .tokens
            .into_iter()
            .map(|t| Token {
                lemma: t.lemma.unwrap_or_else(|| t.word.to_lowercase()),
                pos: t.pos.unwrap_or_default(),
                start: to_byte(t.begin),
                end: to_byte(t.end),
                text: t.word,
            })
            .collect();

        let mut dependencies = Vec::new();
        let mut root = None;
        for dep in wire_sentence.basic_dependencies {
            if dep.dependent == 0 || dep.dependent > tokens.len() || dep.governor > tokens.len() {
                continue;
            }
            if dep.governor == 0 {
                root = Some(dep.dependent - 1);
            } else {
                dependencies.push(DependencyEdge {
                    head: dep.governor - 1,
                    dependent: dep.dependent - 1,
                    label: dep.dep,
                });
            }
        }

        for mention in wire_sentence.entity_mentions {
            mentions.push(MentionSpan {
                start: to_byte(mention.begin),
                end: to_byte(mention.end),
                label: mention.ner.unwrap_or_else(|| "MENTION".to_string()),
            });
        }

        sentences.push(Sentence {
            tokens,
            dependencies,
            root,
        });
    }

    Annotation {
        sentences,
        mentions,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "sentences": [
            {
                "index": 0,
                "tokens": [
                    {"index": 1, "word": "aspirin", "lemma": "aspirin", "pos": "NN",
                     "characterOffsetBegin": 0, "characterOffsetEnd": 7},
                    {"index": 2, "word": "helps", "lemma": "help", "pos": "VBZ",
                     "characterOffsetBegin": 8, "characterOffsetEnd": 13}
                ],
                "basicDependencies": [
                    {"dep": "ROOT", "governor": 0, "dependent": 2},
                    {"dep": "nsubj", "governor": 2, "dependent": 1}
                ],
                "entitymentions": [
                    {"characterOffsetBegin": 0, "characterOffsetEnd": 7, "ner": "CHEMICAL"}
                ]
            }
        ]
    }"#;

    #[test]
    fn test_decode_sample_response() {
        let wire: WireResponse = serde_json::from_str(SAMPLE).unwrap();
        let annotation = decode("aspirin helps", wire);

        assert_eq!(annotation.sentences.len(), 1);
        let sentence = &annotation.sentences[0];

        assert_eq!(sentence.tokens.len(), 2);
        assert_eq!(sentence.tokens[0].text, "aspirin");
        assert_eq!(sentence.tokens[1].lemma, "help");
        assert_eq!(sentence.root, Some(1));

        assert_eq!(sentence.dependencies.len(), 1);
        assert_eq!(sentence.dependencies[0].head, 1);
        assert_eq!(sentence.dependencies[0].dependent, 0);
        assert_eq!(sentence.dependencies[0].label, "nsubj");

        assert_eq!(annotation.mentions.len(), 1);
        assert_eq!(annotation.mentions[0].label, "CHEMICAL");
    }

    #[test]
    fn test_decode_remaps_char_offsets_to_bytes() {
        let body = r#"{
            "sentences": [{
                "tokens": [
                    {"word": "émtricitabine", "characterOffsetBegin": 0, "characterOffsetEnd": 13},
                    {"word": "works", "characterOffsetBegin": 14, "characterOffsetEnd": 19}
                ],
                "basicDependencies": []
            }]
        }"#;
        let text = "émtricitabine works";

        let wire: WireResponse = serde_json::from_str(body).unwrap();
        let annotation = decode(text, wire);
        let tokens = &annotation.sentences[0].tokens;

        // é is two bytes, so byte offsets shift right of the char offsets
        assert_eq!(&text[tokens[0].start..tokens[0].end], "émtricitabine");
        assert_eq!(&text[tokens[1].start..tokens[1].end], "works");
    }

    #[test]
    fn test_decode_drops_malformed_dependencies() {
        let body = r#"{
            "sentences": [{
                "tokens": [
                    {"word": "x", "characterOffsetBegin": 0, "characterOffsetEnd": 1}
                ],
                "basicDependencies": [
                    {"dep": "nsubj", "governor": 5, "dependent": 1},
                    {"dep": "obj", "governor": 1, "dependent": 9}
                ]
            }]
        }"#;

        let wire: WireResponse = serde_json::from_str(body).unwrap();
        let annotation = decode("x", wire);
        assert!(annotation.sentences[0].dependencies.is_empty());
        assert_eq!(annotation.sentences[0].root, None);
    }

    #[test]
    fn test_missing_tags_default_to_lowercased_word() {
        let body = r#"{
            "sentences": [{
                "tokens": [
                    {"word": "Aspirin", "characterOffsetBegin": 0, "characterOffsetEnd": 7}
                ],
                "basicDependencies": []
            }]
        }"#;

        let wire: WireResponse = serde_json::from_str(body).unwrap();
        let annotation = decode("Aspirin", wire);
        let token = &annotation.sentences[0].tokens[0];

        assert_eq!(token.lemma, "aspirin");
        assert_eq!(token.pos, "");
    }
}
