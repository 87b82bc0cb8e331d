pub mod cells;
pub mod pagexml;
pub mod polygons;
pub mod records;

pub use cells::{read_cell_polygons, read_structure};
pub use pagexml::{parse_page, read_table_cells, read_text_lines, PageContent, PageTableCell};
pub use polygons::read_polygon_json;
pub use records::read_records;

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Reads `path` and hands its contents to `parse`, naming the file on error.
pub fn load<T>(path: &Path, parse: impl FnOnce(&str) -> Result<T>) -> Result<T> {
    let text = read_file(path)?;
    parse(&text).with_context(|| format!("failed to parse {}", path.display()))
}
