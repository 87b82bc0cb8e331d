//! Markup table to logical rows.
//!
//! Each logical row lists the cells carried down from earlier rows by a
//! `rowspan` (in column order) followed by the row's own cells.

use std::collections::BTreeMap;
use std::ops::Range;

use anyhow::{anyhow, Result};
use scraper::{ElementRef, Html, Selector};

use crate::core::model::{parse_span, LogicalCell, MAX_COLSPAN, MAX_ROWSPAN};

/// A `td` element as written in the markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCell {
    pub id: Option<String>,
    pub row: Option<usize>,
    pub col: Option<usize>,
    pub rowspan: usize,
    pub colspan: usize,
    pub text: String,
}

impl RawCell {
    fn from_element(td: &ElementRef<'_>) -> Self {
        let attrs = td.value();
        Self {
            id: attrs.attr("id").map(str::to_string),
            row: attrs.attr("row").and_then(|v| v.trim().parse().ok()),
            col: attrs.attr("col").and_then(|v| v.trim().parse().ok()),
            rowspan: parse_span(attrs.attr("rowspan"), MAX_ROWSPAN),
            colspan: parse_span(attrs.attr("colspan"), MAX_COLSPAN),
            text: cell_text(td),
        }
    }
}

fn cell_text(td: &ElementRef<'_>) -> String {
    td.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone)]
struct Carry {
    remaining: usize,
    cell: LogicalCell,
}

/// Cells still spanning down into later rows, keyed by the column they
/// were registered at.
#[derive(Debug, Clone, Default)]
pub struct CarryState {
    carried: BTreeMap<usize, Carry>,
}

impl CarryState {
    pub fn is_empty(&self) -> bool {
        self.carried.is_empty()
    }

    pub fn len(&self) -> usize {
        self.carried.len()
    }
}

/// Processes one row: emits the carried cells, then places the row's own
/// cells around the columns those carried cells occupy.
pub fn step(
    mut carry: CarryState,
    row_index: usize,
    cells: &[RawCell],
) -> (Vec<LogicalCell>, CarryState) {
    let mut row = Vec::with_capacity(carry.len() + cells.len());
    let mut occupied: Vec<Range<usize>> = Vec::with_capacity(carry.len());
    let mut finished = Vec::new();

    for (&col, entry) in carry.carried.iter_mut() {
        row.push(entry.cell.clone());
        occupied.push(col..col.saturating_add(entry.cell.colspan));
        entry.remaining -= 1;
        if entry.remaining == 0 {
            finished.push(col);
        }
    }
    for col in finished {
        carry.carried.remove(&col);
    }

    let mut cursor = 0;
    for raw in cells {
        while let Some(range) = occupied.iter().find(|r| r.contains(&cursor)) {
            cursor = range.end;
        }
        let cell = LogicalCell {
            id: raw.id.clone(),
            row: raw.row.unwrap_or(row_index),
            col: raw.col.unwrap_or(cursor),
            rowspan: raw.rowspan,
            colspan: raw.colspan,
            text: raw.text.clone(),
        };
        if cell.rowspan > 1 {
            carry.carried.insert(
                cursor,
                Carry {
                    remaining: cell.rowspan - 1,
                    cell: cell.clone(),
                },
            );
        }
        cursor = cursor.saturating_add(cell.colspan);
        row.push(cell);
    }

    (row, carry)
}

/// Parsed markup table; rows are produced on demand by [`LogicalTable::rows`].
#[derive(Debug, Clone, Default)]
pub struct LogicalTable {
    raw_rows: Vec<Vec<RawCell>>,
}

impl LogicalTable {
    pub fn parse(html: &str) -> Result<Self> {
        let document = Html::parse_fragment(html);
        let tr = selector("tr")?;
        let td = selector("td")?;
        let raw_rows = document
            .select(&tr)
            .map(|row| row.select(&td).map(|cell| RawCell::from_element(&cell)).collect())
            .collect();
        Ok(Self { raw_rows })
    }

    pub fn row_count(&self) -> usize {
        self.raw_rows.len()
    }

    pub fn rows(&self) -> RowParser<'_> {
        RowParser {
            raw_rows: &self.raw_rows,
            next_row: 0,
            carry: CarryState::default(),
        }
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector '{css}': {e}"))
}

/// Single pass over the rows of a [`LogicalTable`].
#[derive(Debug)]
pub struct RowParser<'a> {
    raw_rows: &'a [Vec<RawCell>],
    next_row: usize,
    carry: CarryState,
}

impl Iterator for RowParser<'_> {
    type Item = Vec<LogicalCell>;

    fn next(&mut self) -> Option<Self::Item> {
        let cells = self.raw_rows.get(self.next_row)?;
        let (row, carry) = step(std::mem::take(&mut self.carry), self.next_row, cells);
        self.carry = carry;
        self.next_row += 1;
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.raw_rows.len() - self.next_row;
        (left, Some(left))
    }
}

impl ExactSizeIterator for RowParser<'_> {}

/// Parses `html` and collects every logical row.
pub fn parse_logical_rows(html: &str) -> Result<Vec<Vec<LogicalCell>>> {
    Ok(LogicalTable::parse(html)?.rows().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn positions(row: &[LogicalCell]) -> Vec<(usize, usize, &str)> {
        row.iter().map(|c| (c.row, c.col, c.text.as_str())).collect()
    }

    #[test]
    fn carries_rowspan_cells_into_following_rows() -> Result<()> {
        let html = r#"<table>
            <tr><td rowspan="3">name</td><td>a</td></tr>
            <tr><td>b</td></tr>
            <tr><td>c</td></tr>
            <tr><td>d</td><td>e</td></tr>
        </table>"#;
        let rows = parse_logical_rows(html)?;
        assert_eq!(rows.len(), 4);
        assert_eq!(positions(&rows[0]), vec![(0, 0, "name"), (0, 1, "a")]);
        assert_eq!(positions(&rows[1]), vec![(0, 0, "name"), (1, 1, "b")]);
        assert_eq!(positions(&rows[2]), vec![(0, 0, "name"), (2, 1, "c")]);
        assert_eq!(positions(&rows[3]), vec![(3, 0, "d"), (3, 1, "e")]);
        Ok(())
    }

    #[test]
    fn skips_columns_covered_by_wide_carried_cells() -> Result<()> {
        let html = r#"<table>
            <tr><td rowspan="2" colspan="2">block</td><td>x</td></tr>
            <tr><td>y</td></tr>
        </table>"#;
        let rows = parse_logical_rows(html)?;
        assert_eq!(positions(&rows[1]), vec![(0, 0, "block"), (1, 2, "y")]);
        Ok(())
    }

    #[test]
    fn colspan_advances_cursor() -> Result<()> {
        let html = r#"<table><tr><td colspan="3">wide</td><td>after</td></tr></table>"#;
        let rows = parse_logical_rows(html)?;
        assert_eq!(positions(&rows[0]), vec![(0, 0, "wide"), (0, 3, "after")]);
        Ok(())
    }

    #[test]
    fn explicit_attributes_override_positions() -> Result<()> {
        let html = r#"<table><tr><td id="c7" row="4" col="9">v</td></tr></table>"#;
        let rows = parse_logical_rows(html)?;
        let cell = &rows[0][0];
        assert_eq!(cell.id.as_deref(), Some("c7"));
        assert_eq!((cell.row, cell.col), (4, 9));
        Ok(())
    }

    #[test]
    fn text_is_trimmed_and_joined_across_line_breaks() -> Result<()> {
        let html = "<table><tr><td>  Jan <br/> Jansen </td></tr></table>";
        let rows = parse_logical_rows(html)?;
        assert_eq!(rows[0][0].text, "Jan Jansen");
        Ok(())
    }

    #[test]
    fn malformed_span_values_fall_back_to_one() -> Result<()> {
        let html = r#"<table><tr><td rowspan="abc" colspan="0">v</td></tr></table>"#;
        let rows = parse_logical_rows(html)?;
        assert_eq!((rows[0][0].rowspan, rows[0][0].colspan), (1, 1));
        Ok(())
    }

    #[test]
    fn oversized_spans_are_capped() -> Result<()> {
        let html = r#"<table>
            <tr><td rowspan="2" colspan="50000000">x</td></tr>
            <tr><td>y</td></tr>
            <tr><td rowspan="18446744073709551615" colspan="99999999999999999999999">z</td></tr>
        </table>"#;
        let rows = parse_logical_rows(html)?;
        assert_eq!(rows[0][0].colspan, MAX_COLSPAN);
        assert_eq!(positions(&rows[1]), vec![(0, 0, "x"), (1, MAX_COLSPAN, "y")]);
        assert_eq!((rows[2][0].rowspan, rows[2][0].colspan), (MAX_ROWSPAN, MAX_COLSPAN));
        Ok(())
    }

    #[test]
    fn rows_can_be_iterated_again() -> Result<()> {
        let table = LogicalTable::parse(
            r#"<table><tr><td rowspan="2">a</td></tr><tr><td>b</td></tr></table>"#,
        )?;
        let first: Vec<_> = table.rows().collect();
        let second: Vec<_> = table.rows().collect();
        assert_eq!(first, second);
        assert_eq!(table.rows().len(), 2);
        Ok(())
    }

    #[test]
    fn step_threads_carry_state() {
        let tall = RawCell {
            id: None,
            row: None,
            col: None,
            rowspan: 2,
            colspan: 1,
            text: "t".to_string(),
        };
        let (row, carry) = step(CarryState::default(), 0, &[tall]);
        assert_eq!(row.len(), 1);
        assert_eq!(carry.len(), 1);
        let (row, carry) = step(carry, 1, &[]);
        assert_eq!(row.len(), 1);
        assert!(carry.is_empty());
    }
}
