use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::export::Exporter;
use crate::pipeline::ReconstructedTable;

/// Writes `<name>.html`, the `<name>.grid.txt` dump and the per-cell line
/// matches as `<name>.matches.jsonl`.
#[derive(Debug, Clone)]
pub struct TableExporter {
    out_dir: PathBuf,
}

impl TableExporter {
    pub fn new(out_dir: PathBuf) -> Self {
        Self { out_dir }
    }

    fn matches_jsonl(table: &ReconstructedTable) -> Result<String> {
        let mut out = String::new();
        for entry in &table.matches {
            let mut line = serde_json::Map::new();
            line.insert(entry.cell.to_string(), serde_json::to_value(&entry.lines)?);
            out.push_str(&serde_json::to_string(&line)?);
            out.push('\n');
        }
        Ok(out)
    }
}

impl Exporter<ReconstructedTable> for TableExporter {
    fn export(&self, table: &ReconstructedTable) -> Result<()> {
        fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("failed to create {}", self.out_dir.display()))?;

        fs::write(self.out_dir.join(format!("{}.html", table.name)), &table.html)?;
        fs::write(
            self.out_dir.join(format!("{}.grid.txt", table.name)),
            table.grid.to_text_dump(),
        )?;
        fs::write(
            self.out_dir.join(format!("{}.matches.jsonl", table.name)),
            Self::matches_jsonl(table)?,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::parse_polygon;
    use crate::core::model::TextLine;
    use crate::pipeline::reconstruct_from_parts;
    use crate::table::cell_text::parse_structure_line;

    #[test]
    fn matches_keep_page_point_strings() -> Result<()> {
        let lines = vec![TextLine {
            region_id: Some("r1".to_string()),
            line_id: Some("l1".to_string()),
            coords: parse_polygon("1,1 9,1 9,4.5 1,4.5"),
            text: "Jan".to_string(),
        }];
        let cells = vec![parse_polygon("0,0;10,0;10,10;0,10")];
        let structure = vec![parse_structure_line("0,0,0,0")?];
        let table = reconstruct_from_parts("p1", &lines, &cells, &structure, 0.2);

        let jsonl = TableExporter::matches_jsonl(&table)?;
        let line: serde_json::Value = serde_json::from_str(jsonl.trim_end())?;
        let coords = line["0"][0]["coords"].as_str().unwrap_or_default();
        assert_eq!(coords, "1,1 9,1 9,4.5 1,4.5");
        assert_eq!(parse_polygon(coords), lines[0].coords);
        Ok(())
    }
}
