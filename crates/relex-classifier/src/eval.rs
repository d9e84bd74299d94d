//! Evaluation of predicted relations against gold relations.
//!
//! Gold documents and prediction groups align by index. Relation identity
//! follows `Relation::key`, so symmetric relations match in either endpoint
//! order, directed relations require the exact orientation, and duplicate
//! predictions collapse before counting.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use relex_core::{Document, Relation, RelationKey, RelexError, Result};

// ============================================================================
// Metrics
// ============================================================================

/// Supported evaluation metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Precision,
    Recall,
    F1,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Precision => "precision",
            Metric::Recall => "recall",
            Metric::F1 => "f1score",
        }
    }
}

impl FromStr for Metric {
    type Err = RelexError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "precision" => Ok(Metric::Precision),
            "recall" => Ok(Metric::Recall),
            "f1score" => Ok(Metric::F1),
            other => Err(RelexError::UnsupportedMetric(other.to_string())),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregated match counts for a set of relations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationCounts {
    /// Predicted relations that match a gold relation
    pub true_positives: usize,
    /// Predicted relations with no gold counterpart
    pub false_positives: usize,
    /// Gold relations never predicted
    pub false_negatives: usize,
    /// Distinct gold relations
    pub gold_total: usize,
    /// Distinct predicted relations
    pub predicted_total: usize,
}

impl RelationCounts {
    /// Calculate precision (TP / (TP + FP))
    pub fn precision(&self) -> f64 {
        if self.true_positives + self.false_positives == 0 {
            0.0
        } else {
            self.true_positives as f64 / (self.true_positives + self.false_positives) as f64
        }
    }

    /// Calculate recall (TP / (TP + FN))
    pub fn recall(&self) -> f64 {
        if self.true_positives + self.false_negatives == 0 {
            0.0
        } else {
            self.true_positives as f64 / (self.true_positives + self.false_negatives) as f64
        }
    }

    /// Calculate F1 score (2 * P * R / (P + R))
    pub fn f1_score(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    /// Value of one named metric
    pub fn score(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Precision => self.precision(),
            Metric::Recall => self.recall(),
            Metric::F1 => self.f1_score(),
        }
    }

    fn absorb(&mut self, other: &RelationCounts) {
        self.true_positives += other.true_positives;
        self.false_positives += other.false_positives;
        self.false_negatives += other.false_negatives;
        self.gold_total += other.gold_total;
        self.predicted_total += other.predicted_total;
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Corpus-level evaluation with a per-type breakdown
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Counts aggregated over every document and relation type
    pub counts: RelationCounts,
    /// Counts split by relation type
    pub per_type: BTreeMap<String, RelationCounts>,
    /// Number of documents evaluated
    pub documents: usize,
}

impl EvaluationReport {
    /// Value of one named metric over the whole corpus
    pub fn score(&self, metric: Metric) -> f64 {
        self.counts.score(metric)
    }

    /// Print a summary report
    pub fn report(&self) -> String {
        let mut text = format!(
            "=== Relation Evaluation Report ===\n\n\
             Documents evaluated: {}\n\n\
             Overall:\n\
               Precision: {:.1}%\n\
               Recall:    {:.1}%\n\
               F1 Score:  {:.1}%\n\
               Gold: {} | Predicted: {} | TP: {} | FP: {} | FN: {}\n",
            self.documents,
            self.counts.precision() * 100.0,
            self.counts.recall() * 100.0,
            self.counts.f1_score() * 100.0,
            self.counts.gold_total,
            self.counts.predicted_total,
            self.counts.true_positives,
            self.counts.false_positives,
            self.counts.false_negatives,
        );
        for (relation_type, counts) in &self.per_type {
            text.push_str(&format!(
                "\n{}:\n\
                   Precision: {:.1}%\n\
                   Recall:    {:.1}%\n\
                   F1 Score:  {:.1}%\n\
                   Gold: {} | Predicted: {} | TP: {} | FP: {} | FN: {}\n",
                relation_type,
                counts.precision() * 100.0,
                counts.recall() * 100.0,
                counts.f1_score() * 100.0,
                counts.gold_total,
                counts.predicted_total,
                counts.true_positives,
                counts.false_positives,
                counts.false_negatives,
            ));
        }
        text
    }
}

// ============================================================================
// Evaluation
// ============================================================================

fn relation_keys(relations: &[Relation]) -> BTreeSet<RelationKey> {
    relations.iter().map(Relation::key).collect()
}

/// Score predictions against gold documents with a per-type breakdown.
///
/// `predicted[i]` holds the predictions for `gold[i]`; a length mismatch
/// is an error.
pub fn evaluate_report(gold: &[Document], predicted: &[Vec<Relation>]) -> Result<EvaluationReport> {
    if gold.len() != predicted.len() {
        return Err(RelexError::DocumentMismatch {
            gold: gold.len(),
            predicted: predicted.len(),
        });
    }

    let mut report = EvaluationReport {
        documents: gold.len(),
        ..EvaluationReport::default()
    };

    for (document, predictions) in gold.iter().zip(predicted) {
        let gold_keys = relation_keys(&document.relations);
        let predicted_keys = relation_keys(predictions);

        for key in gold_keys.union(&predicted_keys) {
            let entry = report
                .per_type
                .entry(key.relation_type.clone())
                .or_default();
            match (gold_keys.contains(key), predicted_keys.contains(key)) {
                (true, true) => {
                    entry.true_positives += 1;
                    entry.gold_total += 1;
                    entry.predicted_total += 1;
                }
                (true, false) => {
                    entry.false_negatives += 1;
                    entry.gold_total += 1;
                }
                (false, _) => {
                    entry.false_positives += 1;
                    entry.predicted_total += 1;
                }
            }
        }
    }

    let per_type = std::mem::take(&mut report.per_type);
    for counts in per_type.values() {
        report.counts.absorb(counts);
    }
    report.per_type = per_type;

    Ok(report)
}

/// Score predictions with one named metric: `precision`, `recall`, or `f1score`
pub fn evaluate(gold: &[Document], predicted: &[Vec<Relation>], metric: &str) -> Result<f64> {
    let metric = metric.parse::<Metric>()?;
    let report = evaluate_report(gold, predicted)?;
    Ok(report.score(metric))
}

// ============================================================================
// Tests
// ============================================================================
