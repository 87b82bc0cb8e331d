//! Dense table grid rebuilt from span descriptors.
//!
//! Descriptors are applied in `(start_row, start_col)` order and the first
//! descriptor to claim a position keeps it. Later descriptors never overwrite
//! an anchor or a merged position, so the same set of descriptors always
//! yields the same grid whatever order they arrive in.

use crate::core::model::{CellAnchor, CellDescriptor, GridCell};

/// Upper bound on `rows * cols`. A descriptor that would grow the grid past
/// it is dropped.
pub const MAX_GRID_CELLS: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Grid {
    cells: Vec<Vec<GridCell>>,
    cols: usize,
}

impl Grid {
    pub fn build(descriptors: &[CellDescriptor]) -> Self {
        let mut sorted: Vec<&CellDescriptor> = descriptors
            .iter()
            .filter(|d| {
                let ok = d.end_row >= d.start_row && d.end_col >= d.start_col;
                if !ok {
                    tracing::warn!(?d, "ignoring descriptor with inverted span");
                }
                ok
            })
            .collect();
        if sorted.is_empty() {
            return Self::default();
        }
        sorted.sort_by(|a, b| {
            (a.start_row, a.start_col, a.end_row, a.end_col, &a.content).cmp(&(
                b.start_row,
                b.start_col,
                b.end_row,
                b.end_col,
                &b.content,
            ))
        });

        let (mut rows, mut cols) = (0, 0);
        sorted.retain(|d| {
            let grown = (
                rows.max(d.end_row.saturating_add(1)),
                cols.max(d.end_col.saturating_add(1)),
            );
            if grown.0.checked_mul(grown.1).map_or(true, |n| n > MAX_GRID_CELLS) {
                tracing::warn!(?d, "descriptor exceeds the grid size limit; dropping it");
                return false;
            }
            (rows, cols) = grown;
            true
        });
        if sorted.is_empty() {
            return Self::default();
        }
        let mut cells = vec![vec![GridCell::Empty; cols]; rows];

        for d in sorted {
            let (r0, c0) = (d.start_row, d.start_col);
            if cells[r0][c0] != GridCell::Empty {
                tracing::warn!(
                    row = r0,
                    col = c0,
                    "cell position already claimed; dropping descriptor"
                );
                continue;
            }
            cells[r0][c0] = GridCell::Anchor(CellAnchor {
                rowspan: d.rowspan(),
                colspan: d.colspan(),
                content: d.content.clone(),
            });
            for row in cells.iter_mut().take(d.end_row + 1).skip(r0) {
                for cell in row.iter_mut().take(d.end_col + 1).skip(c0) {
                    if *cell == GridCell::Empty {
                        *cell = GridCell::MergedInto { row: r0, col: c0 };
                    }
                }
            }
        }

        Self { cells, cols }
    }

    /// `(rows, cols)`
    pub fn dimensions(&self) -> (usize, usize) {
        (self.cells.len(), self.cols)
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&GridCell> {
        self.cells.get(row).and_then(|r| r.get(col))
    }

    pub fn rows(&self) -> &[Vec<GridCell>] {
        &self.cells
    }

    /// Anchored cells in row-major order.
    pub fn anchors(&self) -> Vec<CellDescriptor> {
        let mut out = Vec::new();
        for (r, row) in self.cells.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                if let GridCell::Anchor(anchor) = cell {
                    out.push(CellDescriptor::new(
                        r,
                        r + anchor.rowspan - 1,
                        c,
                        c + anchor.colspan - 1,
                        anchor.content.clone(),
                    ));
                }
            }
        }
        out
    }

    pub fn to_html(&self) -> String {
        let mut markup = String::from("<table>");
        for row in &self.cells {
            markup.push_str("<tr>");
            for cell in row {
                match cell {
                    GridCell::Empty => markup.push_str("<td></td>"),
                    GridCell::MergedInto { .. } => {}
                    GridCell::Anchor(anchor) => {
                        markup.push_str("<td");
                        if anchor.rowspan > 1 {
                            markup.push_str(&format!(r#" rowspan="{}""#, anchor.rowspan));
                        }
                        if anchor.colspan > 1 {
                            markup.push_str(&format!(r#" colspan="{}""#, anchor.colspan));
                        }
                        markup.push('>');
                        markup.push_str(&anchor.content);
                        markup.push_str("</td>");
                    }
                }
            }
            markup.push_str("</tr>");
        }
        markup.push_str("</table>");
        markup
    }

    /// One line per row, positions separated by `;`.
    pub fn to_text_dump(&self) -> String {
        let mut out = String::new();
        for row in &self.cells {
            let line = row
                .iter()
                .map(|cell| match cell {
                    GridCell::Empty => String::new(),
                    GridCell::MergedInto { .. } => "merged".to_string(),
                    GridCell::Anchor(a) => format!(
                        "{{rowspan: {}, colspan: {}, content: {:?}}}",
                        a.rowspan, a.colspan, a.content
                    ),
                })
                .collect::<Vec<_>>()
                .join(";");
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}

/// Builds the grid and renders it in one step.
pub fn build_table_html(descriptors: &[CellDescriptor]) -> String {
    Grid::build(descriptors).to_html()
}
