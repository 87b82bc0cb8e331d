//! Field-level scoring of extracted records against ground truth.
//!
//! Records are paired by an optimal assignment over their similarities, so
//! the order in which an extractor lists them does not matter.

use serde::{Deserialize, Serialize};

use crate::core::model::Record;
use crate::core::text::{value_distance, value_similarity};
use crate::metrics::assignment::min_cost_assignment;

/// A field counts as correct below this normalized edit distance.
pub const DEFAULT_FIELD_THRESHOLD: f64 = 0.4;

/// Mean similarity of `pred` to `gt` over the ground-truth record's fields.
pub fn record_similarity(pred: &Record, gt: &Record) -> f64 {
    let gt_fields = gt.flat_fields();
    if gt_fields.is_empty() {
        return 0.0;
    }
    let pred_fields = pred.flat_fields();
    let total: f64 = gt_fields
        .iter()
        .map(|(name, truth)| {
            let predicted = pred_fields.get(name).and_then(|v| v.value());
            value_similarity(predicted, truth.value())
        })
        .sum();
    total / gt_fields.len() as f64
}

/// Square predicted × ground-truth similarity matrix; positions outside
/// either list hold 0.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    values: Vec<Vec<f64>>,
}

impl SimilarityMatrix {
    pub fn build(pred: &[Record], gt: &[Record]) -> Self {
        let size = pred.len().max(gt.len());
        let mut values = vec![vec![0.0; size]; size];
        for (i, p) in pred.iter().enumerate() {
            for (j, g) in gt.iter().enumerate() {
                values[i][j] = record_similarity(p, g);
            }
        }
        Self { values }
    }

    pub fn size(&self) -> usize {
        self.values.len()
    }

    pub fn get(&self, pred: usize, gt: usize) -> f64 {
        self.values
            .get(pred)
            .and_then(|row| row.get(gt))
            .copied()
            .unwrap_or(0.0)
    }

    /// Assignment maximising total similarity, padding included.
    fn assign(&self) -> Vec<(usize, usize)> {
        let cost: Vec<Vec<f64>> = self
            .values
            .iter()
            .map(|row| row.iter().map(|s| 1.0 - s).collect())
            .collect();
        min_cost_assignment(&cost)
    }
}

/// Optimal `(pred, gt)` index pairs; pairings with padding are left out.
pub fn match_records(pred: &[Record], gt: &[Record]) -> Vec<(usize, usize)> {
    SimilarityMatrix::build(pred, gt)
        .assign()
        .into_iter()
        .filter(|&(i, j)| i < pred.len() && j < gt.len())
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PrecisionRecall {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl PrecisionRecall {
    pub fn new(precision: f64, recall: f64) -> Self {
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            precision: round4(precision),
            recall: round4(recall),
            f1: round4(f1),
        }
    }
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

/// Fraction of `from`'s fields whose counterpart in `against` lies within
/// `threshold`.
fn fraction_correct(from: &Record, against: &Record, threshold: f64) -> f64 {
    let fields = from.flat_fields();
    if fields.is_empty() {
        return 0.0;
    }
    let other = against.flat_fields();
    let correct = fields
        .iter()
        .filter(|(name, value)| {
            let counterpart = other.get(*name).and_then(|v| v.value());
            value_distance(value.value(), counterpart) < threshold
        })
        .count();
    correct as f64 / fields.len() as f64
}

/// Field-level precision, recall and F1 of `pred` against `gt`.
///
/// Precision sums over matched pairs and divides by the number of predicted
/// records, recall by the number of ground-truth records, so unmatched
/// records on either side count as fully wrong.
pub fn information_extraction_pr(pred: &[Record], gt: &[Record], threshold: f64) -> PrecisionRecall {
    if pred.is_empty() || gt.is_empty() {
        return PrecisionRecall::default();
    }
    let pairs = match_records(pred, gt);
    let (precision_sum, recall_sum) = pairs.iter().fold((0.0, 0.0), |(p, r), &(i, j)| {
        (
            p + fraction_correct(&pred[i], &gt[j], threshold),
            r + fraction_correct(&gt[j], &pred[i], threshold),
        )
    });
    tracing::debug!(
        pairs = pairs.len(),
        predicted = pred.len(),
        expected = gt.len(),
        "matched records"
    );
    PrecisionRecall::new(precision_sum / pred.len() as f64, recall_sum / gt.len() as f64)
}

/// Mean similarity of the optimal pairing between two record lists; records
/// left unpaired contribute 0.
pub fn best_match_similarity(a: &[Record], b: &[Record]) -> f64 {
    let matrix = SimilarityMatrix::build(a, b);
    if matrix.size() == 0 {
        return 0.0;
    }
    let total: f64 = matrix
        .assign()
        .into_iter()
        .map(|(i, j)| matrix.get(i, j))
        .sum();
    total / matrix.size() as f64
}

/// Mean normalized edit distance over every predicted field, comparing the
/// lists position by position. `None` when the lists differ in length.
pub fn normalized_information_distance(pred: &[Record], gt: &[Record]) -> Option<f64> {
    if pred.len() != gt.len() {
        tracing::warn!(
            predicted = pred.len(),
            expected = gt.len(),
            "record counts differ; cannot compare positionally"
        );
        return None;
    }
    let mut total = 0.0;
    let mut fields = 0usize;
    for (p, g) in pred.iter().zip(gt) {
        let truth = g.flat_fields();
        for (name, value) in p.flat_fields() {
            let expected = truth.get(&name).and_then(|v| v.value());
            total += match (value.value(), expected) {
                (None, None) => 0.0,
                (a, b) => value_distance(a, b),
            };
            fields += 1;
        }
    }
    Some(if fields == 0 { 0.0 } else { total / fields as f64 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn person(name: &str, place: &str) -> Record {
        Record::new().with_value("name", name).with_value("birth_place", place)
    }

    #[test]
    fn identical_single_record_scores_one() {
        let pred = vec![Record::new().with_value("name", "Jan")];
        let gt = pred.clone();
        let pr = information_extraction_pr(&pred, &gt, DEFAULT_FIELD_THRESHOLD);
        assert_eq!(pr, PrecisionRecall { precision: 1.0, recall: 1.0, f1: 1.0 });
    }

    #[test]
    fn empty_lists_score_zero_either_way() {
        let some = vec![person("Jan", "Batavia")];
        assert_eq!(information_extraction_pr(&[], &some, 0.4), PrecisionRecall::default());
        assert_eq!(information_extraction_pr(&some, &[], 0.4), PrecisionRecall::default());
        assert_eq!(information_extraction_pr(&[], &[], 0.4), PrecisionRecall::default());
    }

    #[test]
    fn prediction_order_does_not_matter() {
        let gt = vec![person("Jan Jansen", "Batavia"), person("Piet de Vries", "Leiden")];
        let swapped = vec![person("Piet de Vries", "Leiden"), person("Jan Jansen", "Batavia")];
        assert_eq!(match_records(&swapped, &gt), vec![(0, 1), (1, 0)]);
        let pr = information_extraction_pr(&swapped, &gt, 0.4);
        assert_eq!(pr.precision, 1.0);
        assert_eq!(pr.recall, 1.0);
    }

    #[test]
    fn unmatched_ground_truth_lowers_recall_only() {
        let gt = vec![person("Jan Jansen", "Batavia"), person("Piet de Vries", "Leiden")];
        let pred = vec![person("Jan Jansen", "Batavia")];
        let pr = information_extraction_pr(&pred, &gt, 0.4);
        assert_eq!(pr.precision, 1.0);
        assert_eq!(pr.recall, 0.5);
        assert_eq!(pr.f1, 0.6667);
    }

    #[test]
    fn fuzzy_values_within_threshold_count() {
        let gt = vec![person("Jansen", "Batavia")];
        // One substitution in six characters and a missing field.
        let pred = vec![Record::new().with_value("name", "Jansem")];
        let pr = information_extraction_pr(&pred, &gt, 0.4);
        assert_eq!(pr.precision, 1.0);
        assert_eq!(pr.recall, 0.5);
    }

    #[test]
    fn similarity_matrix_is_padded() {
        let m = SimilarityMatrix::build(&[person("a", "b")], &[person("a", "b"), person("x", "y")]);
        assert_eq!(m.size(), 2);
        assert_eq!(m.get(0, 0), 1.0);
        assert_eq!(m.get(1, 0), 0.0);
    }

    #[test]
    fn best_match_counts_padding_as_zero() {
        let a = vec![person("Jan", "Batavia")];
        let b = vec![person("Piet", "Leiden"), person("Jan", "Batavia")];
        assert_eq!(best_match_similarity(&a, &b), 0.5);
        assert_eq!(best_match_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn information_distance_requires_equal_lengths() {
        let a = vec![person("Jan", "Batavia")];
        assert_eq!(normalized_information_distance(&a, &a), Some(0.0));
        assert_eq!(normalized_information_distance(&a, &[]), None);

        let off = vec![Record::new().with_value("name", "Jam").with_field(
            "birth_place",
            crate::core::model::FieldEntry::Value(crate::core::model::FieldValue::empty()),
        )];
        // name: 1/3, birth_place: missing on one side -> 1.
        let d = normalized_information_distance(&off, &a).unwrap_or_default();
        assert!((d - (1.0 / 3.0 + 1.0) / 2.0).abs() < 1e-9);
    }
}
