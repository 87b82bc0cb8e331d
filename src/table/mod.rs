pub mod cell_text;
pub mod grid;
pub mod rows;

pub use grid::{build_table_html, Grid};
pub use rows::{parse_logical_rows, LogicalTable, RowParser};
