//! Feature vocabulary, tf-idf weighting, and the multinomial logistic model.
//!
//! All three are frozen at train time and serialized into the model
//! snapshot. Nothing here uses randomness: the vocabulary is sorted, tf-idf
//! is counted, and fitting runs full-batch gradient descent from zero
//! weights, so a fixed training set always yields the same model.

use std::collections::{BTreeMap, BTreeSet};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use relex_core::{ClassWeighting, ClassifierConfig};

use crate::features::FeatureVector;

/// Sparse encoded row: (column, value) pairs in column order
pub type SparseRow = Vec<(usize, f64)>;

// ============================================================================
// Vocabulary
// ============================================================================

/// Frozen mapping from feature name to column index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    indices: BTreeMap<String, usize>,
}

impl Vocabulary {
    /// Assign column indices to every feature name in the training set.
    ///
    /// Names are indexed in sorted order, so the same training set always
    /// produces the same layout.
    pub fn fit(vectors: &[FeatureVector]) -> Self {
        let names: BTreeSet<&str> = vectors
            .iter()
            .flat_map(|vector| vector.iter().map(|(name, _)| name))
            .collect();
        let indices = names
            .into_iter()
            .enumerate()
            .map(|(index, name)| (name.to_string(), index))
            .collect();
        Self { indices }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Column index of a feature name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.indices.get(name).copied()
    }

    /// Encode a vector against the frozen vocabulary.
    ///
    /// Names unseen at train time are dropped. Columns come out in
    /// ascending order because indices were assigned in name order.
    pub fn encode(&self, vector: &FeatureVector) -> SparseRow {
        vector
            .iter()
            .filter_map(|(name, value)| self.index_of(name).map(|index| (index, value)))
            .collect()
    }
}

// ============================================================================
// Tf-idf
// ============================================================================

/// Inverse document frequency weights learned at train time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfWeights {
    idf: Vec<f64>,
}

impl TfidfWeights {
    /// Learn smoothed idf weights over the encoded training rows:
    /// `idf = ln((1 + n) / (1 + df)) + 1`
    pub fn fit(rows: &[SparseRow], num_features: usize) -> Self {
        let mut document_frequency = vec![0usize; num_features];
        for row in rows {
            for &(index, value) in row {
                if value != 0.0 {
                    document_frequency[index] += 1;
                }
            }
        }
        let n = rows.len() as f64;
        let idf = document_frequency
            .iter()
            .map(|&df| ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0)
            .collect();
        Self { idf }
    }

    /// Reweight a row by idf, then scale it to unit length
    pub fn apply(&self, row: &mut SparseRow) {
        for (index, value) in row.iter_mut() {
            if let Some(&idf) = self.idf.get(*index) {
                *value *= idf;
            }
        }
        let norm = row.iter().map(|(_, value)| value * value).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, value) in row.iter_mut() {
                *value /= norm;
            }
        }
    }
}

// ============================================================================
// Logistic model
// ============================================================================

/// Gradient descent settings for the logistic model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainOptions {
    pub learning_rate: f64,
    pub epochs: usize,
    pub l2: f64,
    pub class_weighting: ClassWeighting,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            learning_rate: 0.5,
            epochs: 500,
            l2: 1e-4,
            class_weighting: ClassWeighting::Balanced,
        }
    }
}

impl TrainOptions {
    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self {
            learning_rate: config.learning_rate,
            epochs: config.epochs,
            l2: config.l2,
            class_weighting: config.class_weighting,
        }
    }
}

/// Multinomial logistic regression over sparse rows.
///
/// One weight row per class, bias in the last column. Prediction never
/// mutates the model, so a trained instance is safe to share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    weights: Array2<f64>,
    num_classes: usize,
    num_features: usize,
}

impl LogisticModel {
    /// Fit the model over encoded rows and their class labels
    pub fn fit(
        rows: &[SparseRow],
        labels: &[usize],
        num_classes: usize,
        num_features: usize,
        options: &TrainOptions,
    ) -> Self {
        let mut weights = Array2::<f64>::zeros((num_classes, num_features + 1));
        let sample_weights = class_weights(labels, num_classes, options.class_weighting);
        let n = (rows.len() as f64).max(1.0);

        for _ in 0..options.epochs {
            let mut gradient = Array2::<f64>::zeros((num_classes, num_features + 1));
            for (row, &label) in rows.iter().zip(labels) {
                let probabilities = softmax(&scores(&weights, row));
                let sample_weight = sample_weights[label];
                for class in 0..num_classes {
                    let target = if class == label { 1.0 } else { 0.0 };
                    let delta = (probabilities[class] - target) * sample_weight;
                    for &(index, value) in row {
                        gradient[[class, index]] += delta * value;
                    }
                    gradient[[class, num_features]] += delta;
                }
            }
            gradient /= n;

            for class in 0..num_classes {
                for column in 0..=num_features {
                    let mut step = gradient[[class, column]];
                    // bias is exempt from regularization
                    if column < num_features {
                        step += options.l2 * weights[[class, column]];
                    }
                    weights[[class, column]] -= options.learning_rate * step;
                }
            }
        }

        Self {
            weights,
            num_classes,
            num_features,
        }
    }

    /// Per-class probabilities for one encoded row
    pub fn predict_proba(&self, row: &SparseRow) -> Vec<f64> {
        softmax(&scores(&self.weights, row))
    }

    /// Most probable class for one encoded row
    pub fn predict(&self, row: &SparseRow) -> usize {
        let probabilities = self.predict_proba(row);
        let mut best = 0;
        for (class, &probability) in probabilities.iter().enumerate() {
            if probability > probabilities[best] {
                best = class;
            }
        }
        best
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }
}

fn scores(weights: &Array2<f64>, row: &SparseRow) -> Vec<f64> {
    let bias_column = weights.ncols() - 1;
    (0..weights.nrows())
        .map(|class| {
            let mut score = weights[[class, bias_column]];
            for &(index, value) in row {
                score += weights[[class, index]] * value;
            }
            score
        })
        .collect()
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exponentials: Vec<f64> = scores.iter().map(|score| (score - max).exp()).collect();
    let total: f64 = exponentials.iter().sum();
    exponentials.into_iter().map(|e| e / total).collect()
}

/// Per-class sample weights under the configured imbalance policy
fn class_weights(labels: &[usize], num_classes: usize, weighting: ClassWeighting) -> Vec<f64> {
    match weighting {
        ClassWeighting::Uniform => vec![1.0; num_classes],
        ClassWeighting::Balanced => {
            let mut counts = vec![0usize; num_classes];
            for &label in labels {
                if label < num_classes {
                    counts[label] += 1;
                }
            }
            let n = labels.len() as f64;
            let k = num_classes as f64;
            counts
                .iter()
                .map(|&count| n / (k * count.max(1) as f64))
                .collect()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn make_vector(names: &[&str]) -> FeatureVector {
        let mut vector = FeatureVector::new();
        for name in names {
            vector.add(*name, 1.0);
        }
        vector
    }

    #[test]
    fn test_vocabulary_indices_follow_name_order() {
        let vectors = vec![make_vector(&["zeta", "alpha"]), make_vector(&["mid"])];
        let vocabulary = Vocabulary::fit(&vectors);

        assert_eq!(vocabulary.len(), 3);
        assert_eq!(vocabulary.index_of("alpha"), Some(0));
        assert_eq!(vocabulary.index_of("mid"), Some(1));
        assert_eq!(vocabulary.index_of("zeta"), Some(2));
    }

    #[test]
    fn test_encode_drops_unseen_names() {
        let vocabulary = Vocabulary::fit(&[make_vector(&["alpha", "beta"])]);
        let row = vocabulary.encode(&make_vector(&["beta", "gamma"]));

        assert_eq!(row, vec![(1, 1.0)]);
    }

    #[test]
    fn test_idf_of_ubiquitous_feature_is_one() {
        let rows: Vec<SparseRow> = vec![vec![(0, 1.0)], vec![(0, 2.0)], vec![(0, 1.0)]];
        let tfidf = TfidfWeights::fit(&rows, 1);

        let mut row: SparseRow = vec![(0, 3.0)];
        tfidf.apply(&mut row);
        // idf = ln(4/4) + 1 = 1, then the single column normalizes to 1
        assert!((row[0].1 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_tfidf_rows_are_unit_length() {
        let rows: Vec<SparseRow> = vec![vec![(0, 1.0), (1, 1.0)], vec![(0, 1.0)]];
        let tfidf = TfidfWeights::fit(&rows, 2);

        let mut row: SparseRow = vec![(0, 2.0), (1, 5.0)];
        tfidf.apply(&mut row);
        let norm: f64 = row.iter().map(|(_, v)| v * v).sum();
        assert!((norm - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_tfidf_leaves_empty_rows_alone() {
        let tfidf = TfidfWeights::fit(&[vec![(0, 1.0)]], 1);
        let mut row: SparseRow = Vec::new();
        tfidf.apply(&mut row);
        assert!(row.is_empty());
    }

    #[test]
    fn test_fit_separates_disjoint_classes() {
        let mut rows: Vec<SparseRow> = Vec::new();
        let mut labels = Vec::new();
        for _ in 0..4 {
            rows.push(vec![(0, 1.0)]);
            labels.push(0);
            rows.push(vec![(1, 1.0)]);
            labels.push(1);
            rows.push(vec![(2, 1.0)]);
            labels.push(2);
        }

        let model = LogisticModel::fit(&rows, &labels, 3, 3, &TrainOptions::default());

        assert_eq!(model.predict(&vec![(0, 1.0)]), 0);
        assert_eq!(model.predict(&vec![(1, 1.0)]), 1);
        assert_eq!(model.predict(&vec![(2, 1.0)]), 2);

        let probabilities = model.predict_proba(&vec![(1, 1.0)]);
        assert_eq!(probabilities.len(), 3);
        assert!((probabilities.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(probabilities[1] > 0.5);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let rows: Vec<SparseRow> = vec![vec![(0, 1.0)], vec![(1, 1.0)], vec![(0, 1.0), (1, 1.0)]];
        let labels = vec![0, 1, 1];
        let options = TrainOptions::default();

        let once = LogisticModel::fit(&rows, &labels, 2, 2, &options);
        let twice = LogisticModel::fit(&rows, &labels, 2, 2, &options);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_weights_survive_json_bit_for_bit() {
        // fitted weights land on decimals like these, which only exact
        // float parsing reloads without ulp drift
        let weights = ndarray::arr2(&[
            [0.9251390567829304, -0.04862246708422252],
            [2.0657416557038773e-5, -1.3407945362944033],
        ]);
        let model = LogisticModel {
            weights,
            num_classes: 2,
            num_features: 1,
        };

        let serialized = serde_json::to_string(&model).unwrap();
        let restored: LogisticModel = serde_json::from_str(&serialized).unwrap();
        assert_eq!(restored, model);
    }

    #[test]
    fn test_balanced_weights_upweight_rare_classes() {
        let labels = vec![0, 0, 0, 1];
        let weights = class_weights(&labels, 2, ClassWeighting::Balanced);

        assert!((weights[0] - 4.0 / 6.0).abs() < 1e-12);
        assert!((weights[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_uniform_weights_are_flat() {
        let weights = class_weights(&[0, 1, 1, 1], 2, ClassWeighting::Uniform);
        assert_eq!(weights, vec![1.0, 1.0]);
    }
}
