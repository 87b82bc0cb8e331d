use anyhow::{bail, Context, Result};

use crate::core::geometry::{overlaps, Polygon};
use crate::core::model::{CellDescriptor, TextLine};

/// Separator placed between the text lines that make up one cell.
pub const LINE_BREAK: &str = "<br/>";

/// Parses a `start_row,end_row,start_col,end_col` structure line.
pub fn parse_structure_line(line: &str) -> Result<CellDescriptor> {
    let parts = line
        .trim()
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<usize>()
                .with_context(|| format!("invalid grid index '{part}' in '{line}'"))
        })
        .collect::<Result<Vec<_>>>()?;
    let [start_row, end_row, start_col, end_col] = parts[..] else {
        bail!("expected 4 comma-separated indices, got {} in '{line}'", parts.len());
    };
    if end_row < start_row || end_col < start_col {
        bail!("span ends before it starts in '{line}'");
    }
    Ok(CellDescriptor::new(start_row, end_row, start_col, end_col, ""))
}

/// For every cell polygon, the indices of the text lines it covers by at
/// least `threshold` of the line's area, in page order.
pub fn assign_lines_to_cells(
    lines: &[TextLine],
    cells: &[Polygon],
    threshold: f64,
) -> Vec<Vec<usize>> {
    cells
        .iter()
        .enumerate()
        .map(|(cell_idx, cell)| {
            if !cell.is_valid() {
                tracing::warn!(cell_idx, "cell polygon is invalid; no text assigned");
                return Vec::new();
            }
            lines
                .iter()
                .enumerate()
                .filter(|(_, line)| overlaps(&line.coords, cell, threshold))
                .map(|(idx, _)| idx)
                .collect()
        })
        .collect()
}

/// Fills each structure descriptor with the escaped text of its matched
/// lines. Descriptor `i` takes the lines matched to cell polygon `i`.
pub fn attach_cell_text(
    structure: &[CellDescriptor],
    lines: &[TextLine],
    matches: &[Vec<usize>],
) -> Vec<CellDescriptor> {
    if structure.len() != matches.len() {
        tracing::warn!(
            structure = structure.len(),
            cells = matches.len(),
            "structure and cell polygon counts differ"
        );
    }
    structure
        .iter()
        .enumerate()
        .map(|(idx, descriptor)| {
            let content = matches
                .get(idx)
                .map(|line_ids| {
                    line_ids
                        .iter()
                        .filter_map(|&i| lines.get(i))
                        .map(|line| html_escape::encode_text(&line.text).into_owned())
                        .collect::<Vec<_>>()
                        .join(LINE_BREAK)
                })
                .unwrap_or_default();
            CellDescriptor {
                content,
                ..descriptor.clone()
            }
        })
        .collect()
}
