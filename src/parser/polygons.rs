//! Ground-truth cell polygons, `[{"id": "...", "points": [[x, y], ...]}]`.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::geometry::{Point, Polygon};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonEntry {
    pub id: String,
    pub points: Vec<[f64; 2]>,
}

impl PolygonEntry {
    pub fn polygon(&self) -> Polygon {
        Polygon::new(self.points.iter().map(|&[x, y]| Point::new(x, y)).collect())
    }
}

pub fn read_polygon_json(json: &str) -> Result<BTreeMap<String, Polygon>> {
    let entries: Vec<PolygonEntry> =
        serde_json::from_str(json).context("expected a list of {id, points} objects")?;
    let mut polygons = BTreeMap::new();
    for entry in entries {
        if polygons.insert(entry.id.clone(), entry.polygon()).is_some() {
            tracing::warn!(id = %entry.id, "duplicate polygon id; keeping the last one");
        }
    }
    Ok(polygons)
}

/// Serializes polygons in the same layout [`read_polygon_json`] accepts.
pub fn to_polygon_json(polygons: &BTreeMap<String, Polygon>) -> Result<String> {
    let entries: Vec<PolygonEntry> = polygons
        .iter()
        .map(|(id, polygon)| PolygonEntry {
            id: id.clone(),
            points: polygon.points().iter().map(|p| [p.x, p.y]).collect(),
        })
        .collect();
    Ok(serde_json::to_string_pretty(&entries)?)
}
