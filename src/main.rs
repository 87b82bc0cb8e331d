use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tabeval::config::EvalConfig;
use tabeval::export::{DetectionOverlay, Exporter, HtmlOverlayExporter, TableExporter, TextExporter};
use tabeval::metrics::detection::mean_average_precision;
use tabeval::metrics::provenance::{count_provenance, filter_records};
use tabeval::metrics::records::{
    best_match_similarity, information_extraction_pr, normalized_information_distance,
};
use tabeval::metrics::teds::teds_pair;
use tabeval::parser;
use tabeval::pipeline::{
    discover_documents, evaluate_batch, export_report, reconstruct_table, ReconstructInputs,
};
use tabeval::table::parse_logical_rows;

#[derive(Parser, Debug)]
#[command(name = "tabeval")]
#[command(version, about = "Table reconstruction and table/record extraction evaluation", long_about = None)]
struct Cli {
    /// Evaluation config (YAML); defaults apply to anything it leaves out
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rebuild a table from detected cells and recognized text lines
    Reconstruct {
        /// PAGE XML with the recognized text lines
        page_xml: PathBuf,

        /// Cell polygons, one per line
        cells: PathBuf,

        /// Cell spans (start_row,end_row,start_col,end_col), one per line
        structure: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Base name of the written files (default: PAGE XML file stem)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Print the logical rows of an HTML table
    Rows {
        /// HTML file holding the table
        input: PathBuf,

        /// Print the rows as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare two HTML tables with TEDS and TEDS-Struct
    Teds {
        /// Ground-truth table
        gt: PathBuf,

        /// Predicted table
        pred: PathBuf,
    },

    /// Score predicted table cells against ground-truth polygons (mAP)
    Detection {
        /// Ground-truth polygons JSON
        gt: PathBuf,

        /// Predicted PAGE XML
        pred: PathBuf,

        /// Write an HTML overlay of both cell sets into this directory
        #[arg(long)]
        overlay: Option<PathBuf>,

        /// Page image shown under the overlay
        #[arg(long, requires = "overlay")]
        image: Option<String>,

        /// Print per-cell IoU and AP
        #[arg(short, long)]
        verbose: bool,
    },

    /// Score extracted records against ground truth (precision/recall/F1)
    Records {
        /// Ground-truth records JSON
        gt: PathBuf,

        /// Predicted records JSON
        pred: PathBuf,

        /// Field distance threshold (overrides the config)
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Score only predicted fields linked to a table cell
        #[arg(long)]
        provenance_filter: bool,
    },

    /// Evaluate every document under a directory
    Evaluate {
        /// Root holding gt/{tables,polygons,records} and pred/{tables,pagexml,records}
        root: PathBuf,

        /// Output directory for report.json and summary.txt
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tabeval=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let cli = Cli::parse();
    let config = EvalConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Reconstruct {
            page_xml,
            cells,
            structure,
            output,
            name,
        } => reconstruct(page_xml, cells, structure, output, name, &config),
        Commands::Rows { input, json } => show_rows(&input, json),
        Commands::Teds { gt, pred } => compare_tables(&gt, &pred),
        Commands::Detection {
            gt,
            pred,
            overlay,
            image,
            verbose,
        } => score_detection(&gt, &pred, overlay, image, verbose, &config),
        Commands::Records {
            gt,
            pred,
            threshold,
            provenance_filter,
        } => score_records(&gt, &pred, threshold, provenance_filter, &config),
        Commands::Evaluate { root, output } => evaluate(&root, output, &config),
    }
}

fn ensure_file(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("Input file does not exist: {}", path.display());
    }
    if !path.is_file() {
        anyhow::bail!("Input is not a file: {}", path.display());
    }
    Ok(())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "table".to_string())
}

fn reconstruct(
    page_xml: PathBuf,
    cells: PathBuf,
    structure: PathBuf,
    output: PathBuf,
    name: Option<String>,
    config: &EvalConfig,
) -> Result<()> {
    for path in [&page_xml, &cells, &structure] {
        ensure_file(path)?;
    }
    let name = name.unwrap_or_else(|| file_stem(&page_xml));

    println!("[*] Reconstructing: {name}");
    let inputs = ReconstructInputs {
        name,
        page_xml,
        cells,
        structure,
    };
    let table = reconstruct_table(&inputs, config)
        .with_context(|| format!("Failed to reconstruct table: {}", inputs.name))?;

    let (rows, cols) = table.grid.dimensions();
    println!("[+] Grid: {rows} x {cols}");

    TableExporter::new(output.clone())
        .export(&table)
        .with_context(|| format!("Failed to export to: {}", output.display()))?;

    println!("[✓] Done! Table saved to: {}", output.join(format!("{}.html", table.name)).display());
    Ok(())
}

fn show_rows(input: &Path, json: bool) -> Result<()> {
    ensure_file(input)?;
    let html = parser::read_file(input)?;
    let rows = parse_logical_rows(&html)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    for (i, row) in rows.iter().enumerate() {
        let cells = row
            .iter()
            .map(|c| format!("({},{}) {}", c.row, c.col, c.text))
            .collect::<Vec<_>>()
            .join(" | ");
        println!("Row {}: {cells}", i + 1);
    }
    Ok(())
}

fn compare_tables(gt: &Path, pred: &Path) -> Result<()> {
    ensure_file(gt)?;
    ensure_file(pred)?;
    let scores = teds_pair(&parser::read_file(gt)?, &parser::read_file(pred)?);
    println!("TEDS-Struct: {:.4}", scores.teds_struct);
    println!("TEDS: {:.4}", scores.teds);
    Ok(())
}

fn score_detection(
    gt: &Path,
    pred: &Path,
    overlay: Option<PathBuf>,
    image: Option<String>,
    verbose: bool,
    config: &EvalConfig,
) -> Result<()> {
    ensure_file(gt)?;
    ensure_file(pred)?;
    let gt_cells = parser::load(gt, parser::read_polygon_json)?;
    let pred_cells = parser::load(pred, parser::read_table_cells)?;
    let report = mean_average_precision(&gt_cells, &pred_cells, &config.iou_thresholds);

    if verbose {
        for region in &report.regions {
            match region.iou {
                Some(iou) => println!(
                    "  {}: IoU {:.4}, AP {:.4}",
                    region.key, iou, region.average_precision
                ),
                None => println!("  {}: no prediction", region.key),
            }
        }
    }
    println!("Mean Average Precision (mAP): {:.4}", report.map);

    if let Some(dir) = overlay {
        let name = file_stem(pred);
        HtmlOverlayExporter::new(dir.clone()).export(&DetectionOverlay {
            name: name.clone(),
            image,
            gt: gt_cells,
            pred: pred_cells,
            report,
        })?;
        println!("[✓] Overlay saved to: {}", dir.join(format!("{name}.overlay.html")).display());
    }
    Ok(())
}

fn score_records(
    gt: &Path,
    pred: &Path,
    threshold: Option<f64>,
    provenance_filter: bool,
    config: &EvalConfig,
) -> Result<()> {
    ensure_file(gt)?;
    ensure_file(pred)?;
    let threshold = threshold.unwrap_or(config.field_threshold);
    if !(0.0..=1.0).contains(&threshold) {
        anyhow::bail!("threshold must be within [0, 1], got {threshold}");
    }
    let gt_records = parser::load(gt, parser::read_records)?;
    let mut pred_records = parser::load(pred, parser::read_records)?;

    let provenance = count_provenance(&pred_records);
    println!(
        "Cell provenance: {}/{} ({:.2}%)",
        provenance.with_cell, provenance.total, provenance.ratio_percent
    );
    if provenance_filter || config.provenance_filter {
        pred_records = filter_records(&pred_records);
        println!("[*] Scoring provenance-backed fields only");
    }

    let pr = information_extraction_pr(&pred_records, &gt_records, threshold);
    println!("Information Extraction -");
    println!("Precision: {:.4}", pr.precision);
    println!("Recall: {:.4}", pr.recall);
    println!("F1-score: {:.4}", pr.f1);
    println!(
        "Best-match similarity: {:.4}",
        best_match_similarity(&pred_records, &gt_records)
    );
    if let Some(distance) = normalized_information_distance(&pred_records, &gt_records) {
        println!("Normalized edit distance (positional): {distance:.3}");
    }
    Ok(())
}

fn evaluate(root: &Path, output: Option<PathBuf>, config: &EvalConfig) -> Result<()> {
    let documents = discover_documents(root)?;
    if documents.is_empty() {
        anyhow::bail!("No predictions found under {}", root.display());
    }
    let output_dir = output.unwrap_or_else(|| root.join("report"));

    println!("[*] Evaluating {} document(s)", documents.len());
    println!("[*] Output: {}\n", output_dir.display());

    let report = evaluate_batch(&documents, config);
    for doc in &report.documents {
        println!("  [✓] {}", doc.name);
    }
    for failure in &report.failures {
        eprintln!("  [✗] {}: {}", failure.name, failure.error);
    }

    export_report(&report, &output_dir)
        .with_context(|| format!("Failed to export to: {}", output_dir.display()))?;

    println!();
    print!("{}", TextExporter::render(&report));
    println!(
        "\n[*] Summary: {} succeeded, {} failed",
        report.documents.len(),
        report.failures.len()
    );

    if !report.failures.is_empty() {
        anyhow::bail!("{} document(s) failed to evaluate", report.failures.len());
    }
    Ok(())
}
