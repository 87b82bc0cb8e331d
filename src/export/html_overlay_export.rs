use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::Result;

use crate::core::geometry::Polygon;
use crate::export::Exporter;
use crate::metrics::detection::DetectionReport;

/// Ground-truth and predicted cells of one page with their scores.
#[derive(Debug, Clone)]
pub struct DetectionOverlay {
    pub name: String,
    /// Page image drawn under the polygons, relative to the output file.
    pub image: Option<String>,
    pub gt: BTreeMap<String, Polygon>,
    pub pred: BTreeMap<String, Polygon>,
    pub report: DetectionReport,
}

#[derive(Debug, Clone)]
pub struct HtmlOverlayExporter {
    out_dir: PathBuf,
}

impl HtmlOverlayExporter {
    pub fn new(out_dir: PathBuf) -> Self {
        Self { out_dir }
    }

    fn polygon_to_svg(key: &str, polygon: &Polygon, layer: &str, iou: &str, ap: &str) -> String {
        let points = polygon.to_points_string();
        format!(
            r#"<polygon class='cell {layer}' points='{points}' data-key='{key}' data-layer='{layer}' data-iou='{iou}' data-ap='{ap}'/>"#,
            key = html_escape::encode_single_quoted_attribute(key),
        )
    }

    /// Smallest `(width, height)` holding every polygon.
    fn extent(overlay: &DetectionOverlay) -> (f64, f64) {
        overlay
            .gt
            .values()
            .chain(overlay.pred.values())
            .flat_map(|polygon| polygon.points().iter())
            .fold((1.0_f64, 1.0_f64), |(w, h), p| (w.max(p.x), h.max(p.y)))
    }

    pub fn render(overlay: &DetectionOverlay) -> String {
        let scores: BTreeMap<&str, (String, String)> = overlay
            .report
            .regions
            .iter()
            .map(|r| {
                let iou = r.iou.map(|v| format!("{v:.3}")).unwrap_or_else(|| "missing".to_string());
                (r.key.as_str(), (iou, format!("{:.3}", r.average_precision)))
            })
            .collect();

        let mut shapes = String::new();
        for (key, polygon) in &overlay.gt {
            let (iou, ap) = scores.get(key.as_str()).cloned().unwrap_or_default();
            shapes.push_str(&Self::polygon_to_svg(key, polygon, "gt", &iou, &ap));
        }
        for (key, polygon) in &overlay.pred {
            let (iou, ap) = scores.get(key.as_str()).cloned().unwrap_or_default();
            shapes.push_str(&Self::polygon_to_svg(key, polygon, "pred", &iou, &ap));
        }

        let (width, height) = Self::extent(overlay);
        let image = overlay
            .image
            .as_deref()
            .map(|src| {
                format!(
                    "<image href='{}' x='0' y='0' />",
                    html_escape::encode_single_quoted_attribute(src)
                )
            })
            .unwrap_or_default();

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
<meta charset='utf-8'>
<title>Cell detection: {name}</title>
<style>
body {{ margin: 0; font-family: Arial, sans-serif; }}
svg {{ display: block; }}
.cell {{ fill-opacity: 0.1; stroke-width: 2; cursor: pointer; }}
.cell.gt {{ fill: rgb(0,0,255); stroke: rgba(0,0,255,0.7); }}
.cell.pred {{ fill: rgb(255,0,0); stroke: rgba(255,0,0,0.7); stroke-dasharray: 6 3; }}
#info {{ position: fixed; right: 10px; top: 10px; background: #fff; padding: 10px; border: 1px solid #ddd; max-width: 300px; }}
#legend {{ position: fixed; right: 10px; bottom: 10px; background: #fff; padding: 10px; border: 1px solid #ddd; font-size: 12px; }}
.legend-item {{ margin: 5px 0; }}
.legend-box {{ display: inline-block; width: 20px; height: 15px; border: 2px solid; vertical-align: middle; margin-right: 5px; }}
</style>
</head>
<body>
<div id='info'>mAP: {map:.4}<br/>Click a cell to inspect.</div>
<div id='legend'>
<div class='legend-item'><span class='legend-box' style='border-color: rgba(0,0,255,0.7);'></span>Ground truth</div>
<div class='legend-item'><span class='legend-box' style='border: 2px dashed rgba(255,0,0,0.7);'></span>Prediction</div>
</div>
<svg xmlns='http://www.w3.org/2000/svg' width='{width}' height='{height}' viewBox='0 0 {width} {height}'>
{image}
{shapes}
</svg>
<script>
const info = document.getElementById('info');
for (const el of document.querySelectorAll('.cell')) {{
  el.addEventListener('click', () => {{
    info.innerHTML = `cell: ${{el.dataset.key}}<br/>layer: ${{el.dataset.layer}}<br/>IoU: ${{el.dataset.iou}}<br/>AP: ${{el.dataset.ap}}`;
  }});
}}
</script>
</body>
</html>"#,
            name = html_escape::encode_text(&overlay.name),
            map = overlay.report.map,
            width = width.ceil(),
            height = height.ceil(),
        )
    }
}

impl Exporter<DetectionOverlay> for HtmlOverlayExporter {
    fn export(&self, overlay: &DetectionOverlay) -> Result<()> {
        fs::create_dir_all(&self.out_dir)?;
        let path = self.out_dir.join(format!("{}.overlay.html", overlay.name));
        fs::write(path, Self::render(overlay))?;
        Ok(())
    }
}
