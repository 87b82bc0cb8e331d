use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::export::Exporter;
use crate::pipeline::{BatchReport, DocumentScores, MetricAverages};

#[derive(Debug, Clone)]
pub struct TextExporter {
    out_dir: PathBuf,
}

impl TextExporter {
    pub fn new(out_dir: PathBuf) -> Self {
        Self { out_dir }
    }

    fn format_document(doc: &DocumentScores) -> String {
        let mut out = format!("=== {} ===\n", doc.name);
        if let Some(detection) = &doc.detection {
            out.push_str(&format!("Mean Average Precision (mAP): {:.4}\n", detection.map));
        }
        if let Some(teds) = &doc.teds {
            out.push_str(&format!("TEDS-Struct: {:.4}\n", teds.teds_struct));
            out.push_str(&format!("TEDS: {:.4}\n", teds.teds));
        }
        if let Some(pr) = &doc.extraction {
            out.push_str(&format!(
                "Precision: {:.4}, Recall: {:.4}, F1-score: {:.4}\n",
                pr.precision, pr.recall, pr.f1
            ));
        }
        if let Some(prov) = &doc.provenance {
            out.push_str(&format!(
                "Cell provenance: {}/{} ({:.2}%)\n",
                prov.with_cell, prov.total, prov.ratio_percent
            ));
        }
        out
    }

    fn format_averages(averages: &MetricAverages) -> String {
        let rows = [
            ("mAP", averages.map),
            ("TEDS-Struct", averages.teds_struct),
            ("TEDS", averages.teds),
            ("Precision", averages.precision),
            ("Recall", averages.recall),
            ("F1-score", averages.f1),
        ];
        let mut out = String::from("=== Average Metrics Across All Documents ===\n");
        for (label, value) in rows {
            let value = value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}"));
            out.push_str(&format!("{label}: {value}\n"));
        }
        out
    }

    pub fn render(report: &BatchReport) -> String {
        let mut text = String::new();
        for doc in &report.documents {
            text.push_str(&Self::format_document(doc));
            text.push('\n');
        }
        if !report.failures.is_empty() {
            text.push_str("=== Failures ===\n");
            for failure in &report.failures {
                text.push_str(&format!("{}: {}\n", failure.name, failure.error));
            }
            text.push('\n');
        }
        text.push_str(&Self::format_averages(&report.averages));
        text
    }
}

impl Exporter<BatchReport> for TextExporter {
    fn export(&self, report: &BatchReport) -> Result<()> {
        fs::create_dir_all(&self.out_dir)?;
        let path = self.out_dir.join("summary.txt");
        fs::write(&path, Self::render(report))
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::teds::TedsScores;
    use crate::pipeline::DocumentFailure;

    #[test]
    fn summary_lists_documents_failures_and_averages() {
        let doc = DocumentScores {
            name: "scan_0355".to_string(),
            detection: None,
            teds: Some(TedsScores {
                teds: 0.8,
                teds_struct: 1.0,
            }),
            extraction: None,
            provenance: None,
        };
        let report = BatchReport {
            averages: MetricAverages::from_scores(std::slice::from_ref(&doc)),
            documents: vec![doc],
            failures: vec![DocumentFailure {
                name: "scan_0356".to_string(),
                error: "failed to read gt/tables/scan_0356.html".to_string(),
            }],
        };
        let text = TextExporter::render(&report);
        assert!(text.contains("=== scan_0355 ===\nTEDS-Struct: 1.0000\nTEDS: 0.8000\n"));
        assert!(text.contains("scan_0356: failed to read"));
        assert!(text.contains("mAP: n/a"));
        assert!(text.contains("TEDS: 0.8000"));
    }

    #[test]
    fn every_line_is_terminated() {
        let doc = DocumentScores {
            name: "scan_0401".to_string(),
            detection: None,
            teds: None,
            extraction: Some(crate::metrics::records::PrecisionRecall::new(1.0, 0.5)),
            provenance: Some(crate::metrics::provenance::ProvenanceCount {
                with_cell: 1,
                total: 2,
                ratio_percent: 50.0,
            }),
        };
        let text = TextExporter::format_document(&doc);
        assert_eq!(
            text,
            "=== scan_0401 ===\nPrecision: 1.0000, Recall: 0.5000, F1-score: 0.6667\nCell provenance: 1/2 (50.00%)\n"
        );
    }
}
