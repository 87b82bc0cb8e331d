//! Detection quality of predicted cell polygons.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::geometry::{iou, Polygon};

/// IoU thresholds a prediction is checked against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IouThresholds(Vec<f64>);

impl Default for IouThresholds {
    /// 0.50, 0.55, ..., 0.95
    fn default() -> Self {
        Self((0..10).map(|i| f64::from(50 + 5 * i) / 100.0).collect())
    }
}

impl IouThresholds {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionScore {
    pub key: String,
    /// `None` when nothing was predicted for this key.
    pub iou: Option<f64>,
    pub average_precision: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub map: f64,
    pub regions: Vec<RegionScore>,
}

/// Fraction of thresholds that `overlap` reaches.
pub fn average_precision(overlap: f64, thresholds: &IouThresholds) -> f64 {
    if thresholds.is_empty() {
        return 0.0;
    }
    let hits = thresholds.as_slice().iter().filter(|&&t| overlap >= t).count();
    hits as f64 / thresholds.as_slice().len() as f64
}

/// Scores every ground-truth region against the prediction with the same
/// key. Predictions without a ground-truth counterpart are ignored.
pub fn mean_average_precision(
    gt: &BTreeMap<String, Polygon>,
    pred: &BTreeMap<String, Polygon>,
    thresholds: &IouThresholds,
) -> DetectionReport {
    let regions: Vec<RegionScore> = gt
        .iter()
        .map(|(key, truth)| {
            let overlap = pred.get(key).map(|p| iou(p, truth));
            RegionScore {
                key: key.clone(),
                iou: overlap,
                average_precision: overlap
                    .map(|o| average_precision(o, thresholds))
                    .unwrap_or(0.0),
            }
        })
        .collect();

    if regions.is_empty() {
        return DetectionReport::default();
    }
    let map = regions.iter().map(|r| r.average_precision).sum::<f64>() / regions.len() as f64;
    tracing::debug!(regions = regions.len(), map, "scored detections");
    DetectionReport { map, regions }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::parse_polygon;
    use pretty_assertions::assert_eq;

    fn map_of(entries: &[(&str, &str)]) -> BTreeMap<String, Polygon> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), parse_polygon(v)))
            .collect()
    }

    #[test]
    fn default_sweep_has_ten_steps() {
        let t = IouThresholds::default();
        assert_eq!(t.as_slice().len(), 10);
        assert!((t.as_slice()[0] - 0.5).abs() < 1e-12);
        assert!((t.as_slice()[9] - 0.95).abs() < 1e-12);
    }

    #[test]
    fn perfect_predictions_score_one() {
        let gt = map_of(&[("c1", "0,0 10,0 10,10 0,10"), ("c2", "20,0 30,0 30,10 20,10")]);
        let report = mean_average_precision(&gt, &gt.clone(), &IouThresholds::default());
        assert_eq!(report.map, 1.0);
        assert_eq!(report.regions.len(), 2);
    }

    #[test]
    fn missing_prediction_scores_zero_for_that_key() {
        let gt = map_of(&[("c1", "0,0 10,0 10,10 0,10"), ("c2", "20,0 30,0 30,10 20,10")]);
        let pred = map_of(&[("c1", "0,0 10,0 10,10 0,10"), ("stray", "0,0 1,0 1,1")]);
        let report = mean_average_precision(&gt, &pred, &IouThresholds::default());
        assert_eq!(report.map, 0.5);
        assert_eq!(report.regions[1].iou, None);
    }

    #[test]
    fn partial_overlap_hits_lower_thresholds_only() {
        // IoU = 0.62: hits 0.50, 0.55 and 0.60.
        let gt = map_of(&[("c", "0,0 10,0 10,10 0,10")]);
        let pred = map_of(&[("c", "0,0 10,0 10,6.2 0,6.2")]);
        let report = mean_average_precision(&gt, &pred, &IouThresholds::default());
        assert!((report.map - 0.3).abs() < 1e-9);
    }

    #[test]
    fn no_ground_truth_keys_scores_zero() {
        let pred = map_of(&[("c", "0,0 10,0 10,10 0,10")]);
        let report = mean_average_precision(&BTreeMap::new(), &pred, &IouThresholds::default());
        assert_eq!(report, DetectionReport::default());
    }

    #[test]
    fn better_overlap_never_scores_lower() {
        let t = IouThresholds::default();
        let mut last = 0.0;
        for step in 0..=20 {
            let ap = average_precision(step as f64 / 20.0, &t);
            assert!(ap >= last);
            last = ap;
        }
        assert_eq!(last, 1.0);
    }
}
