//! Rule-based annotation backend
//!
//! A deterministic, dependency-free approximation of a full NLP pipeline:
//! - Sentence splitting on terminal punctuation
//! - Regex tokenization with byte offsets
//! - Part-of-speech tagging from closed-class tables and suffix rules
//! - A flat dependency parse hung off the first verb
//!
//! The same text always produces the same annotation, which makes this
//! backend the default for tests and offline experiments. Accuracy is
//! secondary: the classifier only needs stable, plausible layers.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{Annotation, Annotator, DependencyEdge, Sentence, Token};
use relex_core::Result;

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9][A-Za-z0-9'-]*|[^\sA-Za-z0-9]").expect("valid token regex"));

static SENTENCE_END_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+").expect("valid regex"));

/// Deterministic rule-based annotator
pub struct RuleAnnotator {
    /// Closed-class words with fixed tags
    closed_class: HashMap<&'static str, &'static str>,

    /// Verb lemmas recognized beyond the suffix rules
    verbs: HashSet<String>,
}

impl RuleAnnotator {
    /// Create an annotator with the default English tables
    pub fn new() -> Self {
        let mut annotator = Self {
            closed_class: HashMap::new(),
            verbs: HashSet::new(),
        };
        annotator.init_closed_class();
        annotator.init_verb_lexicon();
        annotator
    }

    /// Extend the verb lexicon with domain-specific lemmas
    pub fn with_verbs(mut self, verbs: &[&str]) -> Self {
        for verb in verbs {
            self.verbs.insert(verb.to_lowercase());
        }
        self
    }

    /// Initialize closed-class word tables
    fn init_closed_class(&mut self) {
        let entries: &[(&str, &str)] = &[
            // Determiners
            ("the", "DT"),
            ("a", "DT"),
            ("an", "DT"),
            ("this", "DT"),
            ("that", "DT"),
            ("these", "DT"),
            ("those", "DT"),
            ("no", "DT"),
            ("each", "DT"),
            ("every", "DT"),
            // Prepositions
            ("of", "IN"),
            ("in", "IN"),
            ("on", "IN"),
            ("for", "IN"),
            ("with", "IN"),
            ("without", "IN"),
            ("against", "IN"),
            ("to", "IN"),
            ("from", "IN"),
            ("by", "IN"),
            ("at", "IN"),
            ("as", "IN"),
            ("into", "IN"),
            ("than", "IN"),
            ("after", "IN"),
            ("before", "IN"),
            ("during", "IN"),
            // Conjunctions
            ("and", "CC"),
            ("or", "CC"),
            ("but", "CC"),
            ("nor", "CC"),
            // Pronouns
            ("it", "PRP"),
            ("they", "PRP"),
            ("we", "PRP"),
            ("he", "PRP"),
            ("she", "PRP"),
            // Auxiliaries and copulas
            ("is", "VBZ"),
            ("has", "VBZ"),
            ("does", "VBZ"),
            ("are", "VBP"),
            ("have", "VBP"),
            ("do", "VBP"),
            ("am", "VBP"),
            ("was", "VBD"),
            ("were", "VBD"),
            ("did", "VBD"),
            ("had", "VBD"),
            ("be", "VB"),
            ("been", "VBN"),
            ("being", "VBG"),
            // Negation and frequent adverbs
            ("not", "RB"),
            ("never", "RB"),
            ("also", "RB"),
        ];
        self.closed_class.extend(entries.iter().copied());
    }

    /// Initialize the verb lexicon with common clinical/biomedical lemmas
    fn init_verb_lexicon(&mut self) {
        let lemmas = [
            "treat", "cause", "induce", "inhibit", "prevent", "reduce", "increase", "decrease",
            "improve", "affect", "associate", "correlate", "interact", "target", "bind",
            "activate", "suppress", "block", "trigger", "show", "appear", "remain", "receive",
            "report", "observe", "compare", "recover", "respond", "approve", "require",
        ];
        for lemma in lemmas {
            self.verbs.insert(lemma.to_string());
        }
    }

    /// Assign a part-of-speech tag to one token
    fn tag_word(&self, word: &str, sentence_initial: bool) -> &'static str {
        if word.chars().all(|c| c.is_ascii_digit()) {
            return "CD";
        }
        if !word.chars().next().is_some_and(|c| c.is_ascii_alphanumeric()) {
            return match word {
                "." | "!" | "?" => ".",
                "," => ",",
                _ => "SYM",
            };
        }

        let lower = word.to_lowercase();
        if let Some(&tag) = self.closed_class.get(lower.as_str()) {
            return tag;
        }

        if self.verbs.contains(&lower) {
            return "VB";
        }
        if let Some(base) = lower.strip_suffix('s') {
            if self.verbs.contains(base) {
                return "VBZ";
            }
        }
        if lower.ends_with("ed") && lower.len() > 3 {
            return "VBD";
        }
        if lower.ends_with("ing") && lower.len() > 4 {
            return "VBG";
        }
        if lower.ends_with("ly") && lower.len() > 3 {
            return "RB";
        }
        if lower.ends_with('s') && lower.len() > 3 {
            return "NNS";
        }
        if !sentence_initial && word.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
            return "NNP";
        }
        "NN"
    }
}

impl Default for RuleAnnotator {
    fn default() -> Self {
        Self::new()
    }
}

impl Annotator for RuleAnnotator {
    fn annotate(&self, text: &str) -> Result<Annotation> {
        let mut sentences = Vec::new();

        for (start, end) in sentence_ranges(text) {
            let mut tokens: Vec<Token> = TOKEN_RE
                .find_iter(&text[start..end])
                .map(|m| Token {
                    text: m.as_str().to_string(),
                    lemma: String::new(),
                    pos: String::new(),
                    start: start + m.start(),
                    end: start + m.end(),
                })
                .collect();

            if tokens.is_empty() {
                continue;
            }

            for index in 0..tokens.len() {
                let tag = self.tag_word(&tokens[index].text, index == 0);
                tokens[index].lemma = lemma_of(&tokens[index].text.to_lowercase(), tag);
                tokens[index].pos = tag.to_string();
            }

            let (dependencies, root) = parse_dependencies(&tokens);
            sentences.push(Sentence {
                tokens,
                dependencies,
                root,
            });
        }

        Ok(Annotation {
            sentences,
            mentions: Vec::new(),
        })
    }

    fn name(&self) -> &str {
        "rule"
    }
}

/// Split text into sentence byte ranges
///
/// A run of terminal punctuation ends a sentence when followed by whitespace
/// or the end of the text. Abbreviation periods split too; the downstream
/// pipeline tolerates that.
fn sentence_ranges(text: &str) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut start = 0;

    for m in SENTENCE_END_RE.find_iter(text) {
        let end = m.end();
        let at_boundary = text[end..].chars().next().is_none_or(|c| c.is_whitespace());
        if at_boundary {
            ranges.push((start, end));
            start = end;
        }
    }

    if !text[start..].trim().is_empty() {
        ranges.push((start, text.len()));
    }
    ranges
}

/// Crude suffix-stripping lemmatizer; irregular forms pass through unchanged
fn lemma_of(lower: &str, pos: &str) -> String {
    let stripped = match pos {
        "NNS" | "VBZ" => lower.strip_suffix('s'),
        "VBD" | "VBN" => lower.strip_suffix("ed"),
        "VBG" => lower.strip_suffix("ing"),
        _ => None,
    };
    stripped.unwrap_or(lower).to_string()
}

/// Build a flat dependency tree rooted at the first verb
///
/// Every token attaches to the root with a label derived from its tag and
/// position, except determiners and numbers, which attach to the next noun.
fn parse_dependencies(tokens: &[Token]) -> (Vec<DependencyEdge>, Option<usize>) {
    if tokens.is_empty() {
        return (Vec::new(), None);
    }

    let root = tokens
        .iter()
        .position(|t| t.pos.starts_with("VB"))
        .unwrap_or(0);

    let next_noun = |from: usize| {
        tokens[from + 1..]
            .iter()
            .position(|t| t.pos.starts_with("NN"))
            .map(|offset| from + 1 + offset)
    };

    let mut edges = Vec::with_capacity(tokens.len().saturating_sub(1));
    for (index, token) in tokens.iter().enumerate() {
        if index == root {
            continue;
        }
        let (head, label) = match token.pos.as_str() {
            "DT" => match next_noun(index) {
                Some(noun) => (noun, "det"),
                None => (root, "dep"),
            },
            "CD" => match next_noun(index) {
                Some(noun) => (noun, "nummod"),
                None => (root, "dep"),
            },
            "IN" => (root, "prep"),
            "CC" => (root, "cc"),
            "RB" => (root, "advmod"),
            "." | "," | "SYM" => (root, "punct"),
            pos if pos.starts_with("NN") || pos == "PRP" => {
                (root, if index < root { "nsubj" } else { "obj" })
            }
            pos if pos.starts_with("VB") => (root, "conj"),
            _ => (root, "dep"),
        };
        edges.push(DependencyEdge {
            head,
            dependent: index,
            label: label.to_string(),
        });
    }

    (edges, Some(root))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentence_split() {
        let annotator = RuleAnnotator::new();
        let annotation = annotator
            .annotate("abexatol treats achrosis . The trial ended early !")
            .unwrap();

        assert_eq!(annotation.sentences.len(), 2);
        assert_eq!(annotation.sentences[0].tokens[0].text, "abexatol");
        assert_eq!(annotation.sentences[1].tokens[1].text, "trial");
    }

    #[test]
    fn test_token_offsets_cover_surface_text() {
        let annotator = RuleAnnotator::new();
        let text = "lumarodine reduces the severity of thalamitis .";
        let annotation = annotator.annotate(text).unwrap();

        for sentence in &annotation.sentences {
            for token in &sentence.tokens {
                assert_eq!(&text[token.start..token.end], token.text);
            }
        }
    }

    #[test]
    fn test_pos_tagging_basics() {
        let annotator = RuleAnnotator::new();
        let annotation = annotator
            .annotate("the drug was approved quickly for 30 patients")
            .unwrap();
        let tags: Vec<&str> = annotation.sentences[0]
            .tokens
            .iter()
            .map(|t| t.pos.as_str())
            .collect();

        assert_eq!(tags, vec!["DT", "NN", "VBD", "VBD", "RB", "IN", "CD", "NNS"]);
    }

    #[test]
    fn test_root_is_first_verb() {
        let annotator = RuleAnnotator::new();
        let annotation = annotator.annotate("abexatol treats achrosis .").unwrap();
        let sentence = &annotation.sentences[0];

        assert_eq!(sentence.root, Some(1));
        assert_eq!(sentence.tokens[1].pos, "VBZ");
        assert_eq!(sentence.tokens[1].lemma, "treat");
    }

    #[test]
    fn test_every_non_root_token_has_an_edge() {
        let annotator = RuleAnnotator::new();
        let annotation = annotator
            .annotate("the drug reduces the severity of the disease .")
            .unwrap();
        let sentence = &annotation.sentences[0];

        assert_eq!(sentence.dependencies.len(), sentence.tokens.len() - 1);

        let labels: Vec<&str> = sentence
            .dependencies
            .iter()
            .map(|e| e.label.as_str())
            .collect();
        assert!(labels.contains(&"nsubj"));
        assert!(labels.contains(&"obj"));
        assert!(labels.contains(&"det"));
    }

    #[test]
    fn test_determinism() {
        let annotator = RuleAnnotator::new();
        let text = "pambrocort was ineffective against splenomegaly .";
        assert_eq!(
            annotator.annotate(text).unwrap(),
            annotator.annotate(text).unwrap()
        );
    }

    #[test]
    fn test_with_verbs_extends_lexicon() {
        let plain = RuleAnnotator::new();
        let extended = RuleAnnotator::new().with_verbs(&["potentiate"]);

        let tag = |annotator: &RuleAnnotator, text: &str| {
            annotator.annotate(text).unwrap().sentences[0].tokens[1]
                .pos
                .clone()
        };

        assert_eq!(tag(&plain, "x potentiates y"), "NNS");
        assert_eq!(tag(&extended, "x potentiates y"), "VBZ");
    }
}
