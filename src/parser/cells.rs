//! Line-oriented outputs of the cell detector: one polygon per line in the
//! cells file, one `start_row,end_row,start_col,end_col` span per line in
//! the structure file. Line `i` of both files describes the same cell.

use anyhow::{Context, Result};

use crate::core::geometry::{parse_polygon, Polygon};
use crate::core::model::CellDescriptor;
use crate::table::cell_text::parse_structure_line;

pub fn read_cell_polygons(text: &str) -> Vec<Polygon> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(parse_polygon)
        .collect()
}

pub fn read_structure(text: &str) -> Result<Vec<CellDescriptor>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            parse_structure_line(line).with_context(|| format!("structure line {}", idx + 1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn skips_blank_lines() -> Result<()> {
        let cells = read_cell_polygons("0,0;10,0;10,10;0,10\n\n  \n20,0;30,0;30,10\n");
        assert_eq!(cells.len(), 2);

        let structure = read_structure("0,0,0,1\n\n1,1,0,0\n")?;
        assert_eq!(
            structure,
            vec![CellDescriptor::new(0, 0, 0, 1, ""), CellDescriptor::new(1, 1, 0, 0, "")]
        );
        Ok(())
    }

    #[test]
    fn structure_errors_name_the_line() {
        let err = read_structure("0,0,0,0\n1,x,0,0\n").unwrap_err();
        assert!(format!("{err:#}").contains("structure line 2"));
    }
}
