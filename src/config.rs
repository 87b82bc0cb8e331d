use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::geometry::LINE_CELL_THRESHOLD;
use crate::metrics::detection::IouThresholds;
use crate::metrics::records::DEFAULT_FIELD_THRESHOLD;

/// Evaluation settings. Every field has a default, so a YAML file only
/// needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvalConfig {
    /// Share of a text line's area a cell must cover to receive the line.
    pub line_cell_threshold: f64,
    /// Normalized edit distance below which a record field is correct.
    pub field_threshold: f64,
    pub iou_thresholds: IouThresholds,
    /// Score only predicted fields that point back to a table cell.
    pub provenance_filter: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            line_cell_threshold: LINE_CELL_THRESHOLD,
            field_threshold: DEFAULT_FIELD_THRESHOLD,
            iou_thresholds: IouThresholds::default(),
            provenance_filter: false,
        }
    }
}

impl EvalConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).context("invalid evaluation config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Config from `path`, or the defaults when no path is given.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    pub fn validate(&self) -> Result<()> {
        let unit = 0.0..=1.0;
        if !unit.contains(&self.line_cell_threshold) {
            bail!("line_cell_threshold must be within [0, 1], got {}", self.line_cell_threshold);
        }
        if !unit.contains(&self.field_threshold) {
            bail!("field_threshold must be within [0, 1], got {}", self.field_threshold);
        }
        if self.iou_thresholds.is_empty() {
            bail!("iou_thresholds must not be empty");
        }
        if let Some(t) = self.iou_thresholds.as_slice().iter().find(|t| !unit.contains(*t)) {
            bail!("iou threshold {t} is outside [0, 1]");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_yaml_gives_defaults() -> Result<()> {
        assert_eq!(EvalConfig::from_yaml_str("{}")?, EvalConfig::default());
        Ok(())
    }

    #[test]
    fn overrides_selected_fields() -> Result<()> {
        let config = EvalConfig::from_yaml_str(
            "field_threshold: 0.25\niou_thresholds: [0.5, 0.75]\nprovenance_filter: true\n",
        )?;
        assert_eq!(config.field_threshold, 0.25);
        assert_eq!(config.iou_thresholds.as_slice(), &[0.5, 0.75]);
        assert!(config.provenance_filter);
        assert_eq!(config.line_cell_threshold, LINE_CELL_THRESHOLD);
        Ok(())
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(EvalConfig::from_yaml_str("field_threshold: 1.5").is_err());
        assert!(EvalConfig::from_yaml_str("iou_thresholds: []").is_err());
        assert!(EvalConfig::from_yaml_str("iou_thresholds: [0.5, 2.0]").is_err());
        assert!(EvalConfig::from_yaml_str("unknown_key: 1").is_err());
    }
}
