use std::panic::{self, AssertUnwindSafe};

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{Area, BooleanOps, Coord, Line, LineString, MultiPolygon};
use serde::{Deserialize, Serialize};

/// Minimum share of a text line that must fall inside a cell for the line to
/// be assigned to that cell.
pub const LINE_CELL_THRESHOLD: f64 = 0.2;

/// Default share used for general "A lies inside B" checks.
pub const CONTAINMENT_THRESHOLD: f64 = 0.5;

const AREA_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<Point> for Coord<f64> {
    fn from(p: Point) -> Self {
        Coord { x: p.x, y: p.y }
    }
}

/// Simple polygon given by its outer ring. The closing point is implicit.
/// Serialized as a PAGE point string, `"x,y x,y ..."`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(into = "String", from = "String")]
pub struct Polygon {
    points: Vec<Point>,
}

impl Polygon {
    pub fn new(points: Vec<Point>) -> Self {
        let mut ring: Vec<Point> = Vec::with_capacity(points.len());
        for point in points {
            if ring.last() != Some(&point) {
                ring.push(point);
            }
        }
        if ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        Self { points: ring }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points in PAGE `Coords@points` form, readable by [`parse_polygon`].
    pub fn to_points_string(&self) -> String {
        self.points
            .iter()
            .map(|p| format!("{},{}", p.x, p.y))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// At least three finite points, a non-degenerate area and no
    /// self-intersections.
    pub fn is_valid(&self) -> bool {
        if self.points.len() < 3 {
            return false;
        }
        if self
            .points
            .iter()
            .any(|p| !p.x.is_finite() || !p.y.is_finite())
        {
            return false;
        }
        if self.to_geo().unsigned_area() <= AREA_EPSILON {
            return false;
        }
        self.is_simple()
    }

    pub fn area(&self) -> f64 {
        if self.is_valid() {
            self.to_geo().unsigned_area()
        } else {
            0.0
        }
    }

    fn edges(&self) -> Vec<Line<f64>> {
        let n = self.points.len();
        (0..n)
            .map(|i| Line::new(self.points[i], self.points[(i + 1) % n]))
            .collect()
    }

    fn is_simple(&self) -> bool {
        let edges = self.edges();
        let n = edges.len();
        for i in 0..n {
            for j in (i + 1)..n {
                let adjacent = j == i + 1 || (i == 0 && j == n - 1);
                match line_intersection(edges[i], edges[j]) {
                    None => {}
                    Some(LineIntersection::SinglePoint { .. }) if adjacent => {}
                    Some(_) => return false,
                }
            }
        }
        true
    }

    fn to_geo(&self) -> geo::Polygon<f64> {
        let coords: Vec<Coord<f64>> = self.points.iter().map(|&p| p.into()).collect();
        geo::Polygon::new(LineString::from(coords), vec![])
    }
}

impl From<Polygon> for String {
    fn from(polygon: Polygon) -> Self {
        polygon.to_points_string()
    }
}

impl From<String> for Polygon {
    fn from(points: String) -> Self {
        parse_polygon(&points)
    }
}

/// Parses `"x1,y1;x2,y2;..."` or `"x1,y1 x2,y2 ..."`. Tokens that are not an
/// `x,y` pair of numbers are skipped.
pub fn parse_polygon(s: &str) -> Polygon {
    let mut points = Vec::new();
    for token in s.split(|c: char| c == ';' || c.is_whitespace()) {
        if token.is_empty() {
            continue;
        }
        match parse_point(token) {
            Some(point) => points.push(point),
            None => tracing::warn!(token, "skipping invalid polygon point"),
        }
    }
    Polygon::new(points)
}

fn parse_point(token: &str) -> Option<Point> {
    let (x, y) = token.split_once(',')?;
    let x: f64 = x.trim().parse().ok()?;
    let y: f64 = y.trim().parse().ok()?;
    Some(Point::new(x, y))
}

/// Share of `a` covered by `b`: `area(a ∩ b) / area(a)`.
pub fn coverage(a: &Polygon, b: &Polygon) -> f64 {
    if !a.is_valid() || !b.is_valid() {
        return 0.0;
    }
    let area_a = a.area();
    if area_a <= AREA_EPSILON {
        return 0.0;
    }
    let (ga, gb) = (a.to_geo(), b.to_geo());
    match guarded_area(|| ga.intersection(&gb)) {
        Some(inter) => (inter / area_a).clamp(0.0, 1.0),
        None => 0.0,
    }
}

/// Intersection over union of two polygons.
pub fn iou(a: &Polygon, b: &Polygon) -> f64 {
    if !a.is_valid() || !b.is_valid() {
        return 0.0;
    }
    let (ga, gb) = (a.to_geo(), b.to_geo());
    let inter = match guarded_area(|| ga.intersection(&gb)) {
        Some(inter) if inter > 0.0 => inter,
        _ => return 0.0,
    };
    match guarded_area(|| ga.union(&gb)) {
        Some(union) if union > 0.0 => (inter / union).clamp(0.0, 1.0),
        _ => 0.0,
    }
}

pub fn overlaps(a: &Polygon, b: &Polygon, threshold: f64) -> bool {
    coverage(a, b) >= threshold
}

pub fn coverage_str(a: &str, b: &str) -> f64 {
    coverage(&parse_polygon(a), &parse_polygon(b))
}

pub fn iou_str(a: &str, b: &str) -> f64 {
    iou(&parse_polygon(a), &parse_polygon(b))
}

pub fn overlaps_str(a: &str, b: &str, threshold: f64) -> bool {
    overlaps(&parse_polygon(a), &parse_polygon(b), threshold)
}

// Boolean ops on near-degenerate rings can panic inside the sweep; such
// geometry counts as no overlap.
fn guarded_area<F>(op: F) -> Option<f64>
where
    F: FnOnce() -> MultiPolygon<f64>,
{
    match panic::catch_unwind(AssertUnwindSafe(op)) {
        Ok(shape) => Some(shape.unsigned_area()),
        Err(_) => {
            tracing::warn!("polygon boolean operation failed; treating as empty");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn square(x0: f64, y0: f64, size: f64) -> Polygon {
        Polygon::new(vec![
            Point::new(x0, y0),
            Point::new(x0 + size, y0),
            Point::new(x0 + size, y0 + size),
            Point::new(x0, y0 + size),
        ])
    }

    #[test]
    fn parses_semicolon_and_space_separated_points() {
        let a = parse_polygon("0,0;10,0;10,10;0,10");
        let b = parse_polygon("0,0 10,0  10,10\n0,10");
        assert_eq!(a, b);
        assert_eq!(a.points().len(), 4);
    }

    #[test]
    fn skips_invalid_tokens() {
        let poly = parse_polygon("0,0;oops;10,0;1,2,3;10,10;0,10");
        assert_eq!(poly.points().len(), 4);
        assert!(poly.is_valid());
    }

    #[test]
    fn drops_explicit_closing_point() {
        let poly = parse_polygon("0,0 4,0 4,4 0,4 0,0");
        assert_eq!(poly.points().len(), 4);
        assert_eq!(poly.area(), 16.0);
    }

    #[test]
    fn too_few_points_is_invalid() {
        let poly = parse_polygon("0,0;1,1");
        assert!(!poly.is_valid());
        assert_eq!(coverage(&poly, &square(0.0, 0.0, 5.0)), 0.0);
        assert_eq!(iou(&poly, &square(0.0, 0.0, 5.0)), 0.0);
    }

    #[test]
    fn bowtie_is_invalid() {
        let bowtie = parse_polygon("0,0 10,10 10,0 0,10");
        assert!(!bowtie.is_valid());
        assert!(!overlaps(&bowtie, &square(0.0, 0.0, 10.0), 0.0001));
    }

    #[test]
    fn computes_iou() {
        let a = square(0.0, 0.0, 10.0);
        let b = square(5.0, 5.0, 10.0);
        let value = iou(&a, &b);
        assert!((value - 25.0 / 175.0).abs() < 1e-9);
    }

    #[test]
    fn disjoint_polygons_have_zero_iou() {
        assert_eq!(iou(&square(0.0, 0.0, 1.0), &square(5.0, 5.0, 1.0)), 0.0);
    }

    #[test]
    fn coverage_is_relative_to_first_polygon() {
        let small = square(0.0, 0.0, 2.0);
        let large = square(0.0, 0.0, 10.0);
        assert!((coverage(&small, &large) - 1.0).abs() < 1e-9);
        assert!((coverage(&large, &small) - 0.04).abs() < 1e-9);
        assert!(overlaps(&small, &large, CONTAINMENT_THRESHOLD));
        assert!(!overlaps(&large, &small, CONTAINMENT_THRESHOLD));
    }

    #[test]
    fn serializes_as_page_point_string() {
        let poly = parse_polygon("2,12;18.5,12;18.5,18;2,18");
        let json = serde_json::to_string(&poly).unwrap();
        assert_eq!(json, r#""2,12 18.5,12 18.5,18 2,18""#);
        let back: Polygon = serde_json::from_str(&json).unwrap();
        assert_eq!(back, poly);
    }

    #[test]
    fn string_forms_parse_both_sides() {
        let a = "0,0 10,0 10,10 0,10";
        let b = "5,0;15,0;15,10;5,10";
        assert!((coverage_str(a, b) - 0.5).abs() < 1e-9);
        assert!((iou_str(a, b) - 50.0 / 150.0).abs() < 1e-9);
    }

    #[test]
    fn overlap_threshold_for_text_lines() {
        let line = "1021,1055 1071,1048 1118,1034 1131,1078 1077,1093 1027,1100";
        let cell = "1031.3846,974.5904;1122.732,974.5985;1122.7303,1081.7006;1031.3759,1081.7185";
        assert!(overlaps_str(line, cell, LINE_CELL_THRESHOLD));
        assert!(!overlaps_str(line, cell, 0.99));
    }
}
