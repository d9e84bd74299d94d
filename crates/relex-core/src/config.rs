//! Relex Configuration Management
//!
//! Handles configuration from environment variables and config files
//! with sensible defaults for local experimentation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Annotation backend configuration
    pub annotator: AnnotatorConfig,

    /// Classifier training and prediction configuration
    pub classifier: ClassifierConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Annotator
        if let Ok(kind) = std::env::var("RELEX_ANNOTATOR") {
            config.annotator.kind = kind.parse()?;
        }
        if let Ok(url) = std::env::var("RELEX_ANNOTATOR_URL") {
            config.annotator.url = url;
        }
        if let Ok(timeout) = std::env::var("RELEX_ANNOTATOR_TIMEOUT_SECS") {
            config.annotator.timeout_secs =
                timeout.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "RELEX_ANNOTATOR_TIMEOUT_SECS".to_string(),
                    value: timeout,
                })?;
        }

        // Classifier
        if let Ok(threshold) = std::env::var("RELEX_THRESHOLD") {
            config.classifier.threshold =
                Some(threshold.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "RELEX_THRESHOLD".to_string(),
                    value: threshold,
                })?);
        }

        // Logging
        if let Ok(level) = std::env::var("RELEX_LOG_LEVEL") {
            config.logging.level = level;
        }

        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        let env_config = Self::from_env()?;
        let defaults = Self::default();

        if env_config.annotator.kind != defaults.annotator.kind {
            self.annotator.kind = env_config.annotator.kind;
        }
        if env_config.annotator.url != defaults.annotator.url {
            self.annotator.url = env_config.annotator.url;
        }
        if env_config.annotator.timeout_secs != defaults.annotator.timeout_secs {
            self.annotator.timeout_secs = env_config.annotator.timeout_secs;
        }
        if env_config.classifier.threshold.is_some() {
            self.classifier.threshold = env_config.classifier.threshold;
        }
        if env_config.logging.level != defaults.logging.level {
            self.logging.level = env_config.logging.level;
        }

        Ok(self)
    }
}

/// Annotation backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotatorConfig {
    /// Which annotation backend to use
    pub kind: AnnotatorKind,

    /// Annotation server URL (for the `http` backend)
    pub url: String,

    /// Annotator stages requested from the server
    pub annotators: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Readiness probes before giving up on a starting server
    pub max_probes: u32,

    /// Delay before the first readiness probe, in milliseconds
    ///
    /// Subsequent probes double the delay up to an 8 second cap.
    pub initial_probe_delay_ms: u64,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            kind: AnnotatorKind::Rule,
            url: "http://localhost:9000".to_string(),
            annotators: "tokenize,ssplit,pos,lemma,depparse".to_string(),
            timeout_secs: 60,
            max_probes: 10,
            initial_probe_delay_ms: 500,
        }
    }
}

/// Supported annotation backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotatorKind {
    /// Built-in deterministic rule annotator
    Rule,
    /// External CoreNLP-style annotation server
    Http,
}

impl std::str::FromStr for AnnotatorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rule" => Ok(Self::Rule),
            "http" => Ok(Self::Http),
            _ => Err(ConfigError::InvalidValue {
                key: "RELEX_ANNOTATOR".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Classifier training and prediction configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Feature families to extract, by name
    pub features: Vec<String>,

    /// Reweight feature counts by inverse document frequency
    pub tfidf: bool,

    /// How training samples are weighted per class
    pub class_weighting: ClassWeighting,

    /// Minimum predicted probability for emitting a relation
    ///
    /// With a threshold set, every relation class whose probability clears it
    /// produces a prediction; without one, only the argmax class does.
    pub threshold: Option<f64>,

    /// Entity type pairs eligible as candidates (unordered; empty accepts all)
    pub entity_type_pairs: Vec<(String, String)>,

    /// Gradient descent step size
    pub learning_rate: f64,

    /// Full-batch gradient descent epochs
    pub epochs: usize,

    /// L2 regularization strength
    pub l2: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            features: vec![
                "entity_types".to_string(),
                "unigrams_between".to_string(),
                "bigrams".to_string(),
                "dependency_path".to_string(),
                "dependency_path_near_entities".to_string(),
                "token_distance".to_string(),
            ],
            tfidf: true,
            class_weighting: ClassWeighting::Balanced,
            threshold: None,
            entity_type_pairs: Vec::new(),
            learning_rate: 0.5,
            epochs: 500,
            l2: 1e-4,
        }
    }
}

/// Per-class weighting of training samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassWeighting {
    /// Weight each sample by `n_samples / (n_classes * count(class))`
    ///
    /// Counters the class imbalance inherent to candidate generation, where
    /// unrelated pairs vastly outnumber related ones.
    #[default]
    Balanced,
    /// Weight every sample equally
    Uniform,
}

impl std::str::FromStr for ClassWeighting {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "balanced" => Ok(Self::Balanced),
            "uniform" => Ok(Self::Uniform),
            _ => Err(ConfigError::InvalidValue {
                key: "class_weighting".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

impl From<ConfigError> for crate::RelexError {
    fn from(e: ConfigError) -> Self {
        crate::RelexError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.annotator.kind, AnnotatorKind::Rule);
        assert_eq!(config.classifier.features.len(), 6);
        assert!(config.classifier.tfidf);
        assert!(config.classifier.threshold.is_none());
    }

    #[test]
    fn test_annotator_kind_parse() {
        assert_eq!("rule".parse::<AnnotatorKind>().unwrap(), AnnotatorKind::Rule);
        assert_eq!("HTTP".parse::<AnnotatorKind>().unwrap(), AnnotatorKind::Http);
        assert!("corenlp".parse::<AnnotatorKind>().is_err());
    }

    #[test]
    fn test_class_weighting_parse() {
        assert_eq!(
            "balanced".parse::<ClassWeighting>().unwrap(),
            ClassWeighting::Balanced
        );
        assert!("quadratic".parse::<ClassWeighting>().is_err());
    }

    #[test]
    fn test_config_round_trip() {
        let config = AppConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        let restored: AppConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(restored.classifier.epochs, config.classifier.epochs);
    }

    #[test]
    fn test_classifier_config_equality() {
        let config = ClassifierConfig::default();
        assert_eq!(config, config.clone());

        let mut tweaked = config.clone();
        tweaked.threshold = Some(0.5);
        assert_ne!(tweaked, config);
    }
}
