use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::EvalConfig;
use crate::core::geometry::Polygon;
use crate::core::model::{CellDescriptor, TextLine};
use crate::export::json_export::JsonExporter;
use crate::export::text_export::TextExporter;
use crate::export::Exporter;
use crate::metrics::detection::{mean_average_precision, DetectionReport};
use crate::metrics::provenance::{count_provenance, filter_records, ProvenanceCount};
use crate::metrics::records::{information_extraction_pr, PrecisionRecall};
use crate::metrics::teds::{teds_pair, TedsScores};
use crate::parser::{self, PageContent};
use crate::table::cell_text::{assign_lines_to_cells, attach_cell_text};
use crate::table::Grid;

/// Files needed to rebuild one table from detected cells.
#[derive(Debug, Clone)]
pub struct ReconstructInputs {
    pub name: String,
    /// PAGE XML holding the recognized text lines.
    pub page_xml: PathBuf,
    /// One cell polygon per line.
    pub cells: PathBuf,
    /// One `start_row,end_row,start_col,end_col` span per line.
    pub structure: PathBuf,
}

/// Text lines assigned to one detected cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellMatch {
    pub cell: usize,
    pub lines: Vec<TextLine>,
}

#[derive(Debug, Clone)]
pub struct ReconstructedTable {
    pub name: String,
    pub grid: Grid,
    pub html: String,
    pub matches: Vec<CellMatch>,
}

pub fn reconstruct_table(inputs: &ReconstructInputs, config: &EvalConfig) -> Result<ReconstructedTable> {
    let lines = parser::load(&inputs.page_xml, parser::read_text_lines)?;
    let cells = parser::read_cell_polygons(&parser::read_file(&inputs.cells)?);
    let structure = parser::load(&inputs.structure, parser::read_structure)?;
    if cells.len() != structure.len() {
        bail!(
            "{} has {} cell polygons but {} has {} spans",
            inputs.cells.display(),
            cells.len(),
            inputs.structure.display(),
            structure.len()
        );
    }
    Ok(reconstruct_from_parts(
        &inputs.name,
        &lines,
        &cells,
        &structure,
        config.line_cell_threshold,
    ))
}

/// Assigns text lines to cells and rebuilds the table grid.
pub fn reconstruct_from_parts(
    name: &str,
    lines: &[TextLine],
    cells: &[Polygon],
    structure: &[CellDescriptor],
    threshold: f64,
) -> ReconstructedTable {
    let assigned = assign_lines_to_cells(lines, cells, threshold);
    let descriptors = attach_cell_text(structure, lines, &assigned);
    let grid = Grid::build(&descriptors);
    let html = grid.to_html();
    let matches = assigned
        .iter()
        .enumerate()
        .map(|(cell, ids)| CellMatch {
            cell,
            lines: ids.iter().filter_map(|&i| lines.get(i).cloned()).collect(),
        })
        .collect();
    ReconstructedTable {
        name: name.to_string(),
        grid,
        html,
        matches,
    }
}

/// Inputs of one document; absent files skip the metric that needs them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentInputs {
    pub name: String,
    pub gt_table: Option<PathBuf>,
    pub pred_table: Option<PathBuf>,
    pub gt_polygons: Option<PathBuf>,
    pub pred_page: Option<PathBuf>,
    pub gt_records: Option<PathBuf>,
    pub pred_records: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentScores {
    pub name: String,
    pub detection: Option<DetectionReport>,
    pub teds: Option<TedsScores>,
    pub extraction: Option<PrecisionRecall>,
    pub provenance: Option<ProvenanceCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub name: String,
    pub error: String,
}

/// Per-metric means over the documents that produced the metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricAverages {
    pub map: Option<f64>,
    pub teds_struct: Option<f64>,
    pub teds: Option<f64>,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub f1: Option<f64>,
}

impl MetricAverages {
    pub fn from_scores(documents: &[DocumentScores]) -> Self {
        Self {
            map: mean_of(documents, |d| d.detection.as_ref().map(|r| r.map)),
            teds_struct: mean_of(documents, |d| d.teds.map(|t| t.teds_struct)),
            teds: mean_of(documents, |d| d.teds.map(|t| t.teds)),
            precision: mean_of(documents, |d| d.extraction.map(|e| e.precision)),
            recall: mean_of(documents, |d| d.extraction.map(|e| e.recall)),
            f1: mean_of(documents, |d| d.extraction.map(|e| e.f1)),
        }
    }
}

fn mean_of(
    documents: &[DocumentScores],
    metric: impl Fn(&DocumentScores) -> Option<f64>,
) -> Option<f64> {
    let values: Vec<f64> = documents.iter().filter_map(metric).collect();
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub documents: Vec<DocumentScores>,
    pub failures: Vec<DocumentFailure>,
    pub averages: MetricAverages,
}

/// Predicted table markup: the given file, or the grid rebuilt from the
/// cell positions in the predicted PAGE XML.
fn predicted_table(inputs: &DocumentInputs, page: Option<&PageContent>) -> Result<Option<String>> {
    if let Some(path) = &inputs.pred_table {
        return parser::read_file(path).map(Some);
    }
    Ok(page
        .map(PageContent::table_descriptors)
        .filter(|descriptors| !descriptors.is_empty())
        .map(|descriptors| Grid::build(&descriptors).to_html()))
}

pub fn evaluate_document(inputs: &DocumentInputs, config: &EvalConfig) -> Result<DocumentScores> {
    let page = inputs
        .pred_page
        .as_deref()
        .map(|path| parser::load(path, parser::parse_page))
        .transpose()?;

    let detection = match (&inputs.gt_polygons, &page) {
        (Some(gt_path), Some(page)) => {
            let gt = parser::load(gt_path, parser::read_polygon_json)?;
            Some(mean_average_precision(
                &gt,
                &page.cell_polygons(),
                &config.iou_thresholds,
            ))
        }
        _ => None,
    };

    let teds = match (&inputs.gt_table, predicted_table(inputs, page.as_ref())?) {
        (Some(gt_path), Some(pred_html)) => {
            let gt_html = parser::read_file(gt_path)?;
            Some(teds_pair(&gt_html, &pred_html))
        }
        _ => None,
    };

    let (extraction, provenance) = match (&inputs.gt_records, &inputs.pred_records) {
        (Some(gt_path), Some(pred_path)) => {
            let gt = parser::load(gt_path, parser::read_records)?;
            let pred = parser::load(pred_path, parser::read_records)?;
            let provenance = count_provenance(&pred);
            let pred = if config.provenance_filter {
                filter_records(&pred)
            } else {
                pred
            };
            (
                Some(information_extraction_pr(&pred, &gt, config.field_threshold)),
                Some(provenance),
            )
        }
        _ => (None, None),
    };

    if detection.is_none() && teds.is_none() && extraction.is_none() {
        bail!("no ground truth with a matching prediction for '{}'", inputs.name);
    }

    Ok(DocumentScores {
        name: inputs.name.clone(),
        detection,
        teds,
        extraction,
        provenance,
    })
}

/// Scores every document. A document that fails is logged and listed under
/// `failures`; it does not stop the run or enter the averages.
pub fn evaluate_batch(documents: &[DocumentInputs], config: &EvalConfig) -> BatchReport {
    let mut report = BatchReport::default();
    for inputs in documents {
        match evaluate_document(inputs, config) {
            Ok(scores) => {
                tracing::info!(document = %inputs.name, "evaluated");
                report.documents.push(scores);
            }
            Err(err) => {
                let error = format!("{err:#}");
                tracing::error!(document = %inputs.name, %error, "evaluation failed");
                report.failures.push(DocumentFailure {
                    name: inputs.name.clone(),
                    error,
                });
            }
        }
    }
    report.averages = MetricAverages::from_scores(&report.documents);
    report
}

/// Directory layout of an evaluation run.
pub const GT_TABLES: &str = "gt/tables";
pub const GT_POLYGONS: &str = "gt/polygons";
pub const GT_RECORDS: &str = "gt/records";
pub const PRED_TABLES: &str = "pred/tables";
pub const PRED_PAGES: &str = "pred/pagexml";
pub const PRED_RECORDS: &str = "pred/records";

const POLYGONS_SUFFIX: &str = ".polygons.json";

/// Document names under `dir` with the given file suffix.
fn names_in(dir: &Path, suffix: &str) -> Result<BTreeMap<String, PathBuf>> {
    let mut names = BTreeMap::new();
    if !dir.is_dir() {
        return Ok(names);
    }
    for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let path = entry?.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(stem) = file_name.strip_suffix(suffix) {
            if !stem.is_empty() {
                names.insert(stem.to_string(), path.clone());
            }
        }
    }
    Ok(names)
}

/// Collects every document that has at least one prediction under `root`.
pub fn discover_documents(root: &Path) -> Result<Vec<DocumentInputs>> {
    if !root.is_dir() {
        bail!("evaluation root is not a directory: {}", root.display());
    }
    let gt_tables = names_in(&root.join(GT_TABLES), ".html")?;
    let gt_polygons = names_in(&root.join(GT_POLYGONS), POLYGONS_SUFFIX)?;
    let gt_records = names_in(&root.join(GT_RECORDS), ".json")?;
    let pred_tables = names_in(&root.join(PRED_TABLES), ".html")?;
    let pred_pages = names_in(&root.join(PRED_PAGES), ".xml")?;
    let pred_records = names_in(&root.join(PRED_RECORDS), ".json")?;

    let names: BTreeSet<&String> = pred_tables
        .keys()
        .chain(pred_pages.keys())
        .chain(pred_records.keys())
        .collect();

    Ok(names
        .into_iter()
        .map(|name| DocumentInputs {
            name: name.clone(),
            gt_table: gt_tables.get(name).cloned(),
            pred_table: pred_tables.get(name).cloned(),
            gt_polygons: gt_polygons.get(name).cloned(),
            pred_page: pred_pages.get(name).cloned(),
            gt_records: gt_records.get(name).cloned(),
            pred_records: pred_records.get(name).cloned(),
        })
        .collect())
}

pub fn export_report(report: &BatchReport, output: &Path) -> Result<()> {
    let json_exporter = JsonExporter::new(output.to_path_buf());
    json_exporter.export(report)?;

    let text_exporter = TextExporter::new(output.to_path_buf());
    text_exporter.export(report)?;

    Ok(())
}
