//! PAGE XML reader for recognized text lines and detected table cells.
//!
//! Element names are matched on their local part, so any PAGE schema
//! version (2013-07-15, 2019-07-15, ...) is accepted.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::core::geometry::{parse_polygon, Polygon};
use crate::core::model::{parse_span, CellDescriptor, TextLine, MAX_COLSPAN, MAX_ROWSPAN};
use crate::table::cell_text::LINE_BREAK;

/// A `TableCell` as written by the layout analysis step.
#[derive(Debug, Clone, PartialEq)]
pub struct PageTableCell {
    pub id: Option<String>,
    pub coords: Option<Polygon>,
    pub row: Option<usize>,
    pub col: Option<usize>,
    pub rowspan: usize,
    pub colspan: usize,
    /// Text of the lines inside the cell, in document order.
    pub lines: Vec<String>,
}

impl PageTableCell {
    /// Grid span and escaped text; `None` without `row`/`col` attributes.
    pub fn descriptor(&self) -> Option<CellDescriptor> {
        let (row, col) = (self.row?, self.col?);
        let content = self
            .lines
            .iter()
            .map(|line| html_escape::encode_text(line).into_owned())
            .collect::<Vec<_>>()
            .join(LINE_BREAK);
        Some(CellDescriptor::new(
            row,
            row.saturating_add(self.rowspan.saturating_sub(1)),
            col,
            col.saturating_add(self.colspan.saturating_sub(1)),
            content,
        ))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageContent {
    pub lines: Vec<TextLine>,
    pub cells: Vec<PageTableCell>,
}

impl PageContent {
    /// Cell polygons keyed by cell id; cells without id or coordinates are
    /// left out.
    pub fn cell_polygons(&self) -> BTreeMap<String, Polygon> {
        self.cells
            .iter()
            .filter_map(|cell| Some((cell.id.clone()?, cell.coords.clone()?)))
            .collect()
    }

    /// Span descriptors of every cell that carries its grid position.
    pub fn table_descriptors(&self) -> Vec<CellDescriptor> {
        self.cells.iter().filter_map(PageTableCell::descriptor).collect()
    }
}

pub fn read_text_lines(xml: &str) -> Result<Vec<TextLine>> {
    Ok(parse_page(xml)?.lines)
}

pub fn read_table_cells(xml: &str) -> Result<BTreeMap<String, Polygon>> {
    Ok(parse_page(xml)?.cell_polygons())
}

#[derive(Debug)]
struct Frame {
    name: String,
    id: Option<String>,
}

#[derive(Debug, Default)]
struct LineDraft {
    region_id: Option<String>,
    line_id: Option<String>,
    coords: Option<String>,
    plain: Option<String>,
    unicode: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextKind {
    Plain,
    Unicode,
}

impl TextKind {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "PlainText" => Some(Self::Plain),
            "Unicode" => Some(Self::Unicode),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct PageState {
    stack: Vec<Frame>,
    line: Option<LineDraft>,
    cell: Option<PageTableCell>,
    capture: Option<TextKind>,
    buffer: String,
    content: PageContent,
}

impl PageState {
    fn parent(&self) -> Option<&str> {
        self.stack.last().map(|f| f.name.as_str())
    }

    /// Directly inside `TextLine/TextEquiv`, which excludes word-level text.
    fn in_line_equiv(&self) -> bool {
        let n = self.stack.len();
        n >= 2 && self.stack[n - 2].name == "TextLine" && self.stack[n - 1].name == "TextEquiv"
    }

    fn open(&mut self, name: &str, e: &BytesStart<'_>) -> Result<()> {
        match name {
            "TextLine" if matches!(self.parent(), Some("TextRegion" | "TableCell")) => {
                self.line = Some(LineDraft {
                    region_id: self.stack.last().and_then(|f| f.id.clone()),
                    line_id: attr(e, "id")?,
                    ..LineDraft::default()
                });
            }
            "TableCell" => {
                self.cell = Some(PageTableCell {
                    id: attr(e, "id")?,
                    coords: None,
                    row: attr(e, "row")?.and_then(|v| v.trim().parse().ok()),
                    col: attr(e, "col")?.and_then(|v| v.trim().parse().ok()),
                    rowspan: parse_span(attr(e, "rowSpan")?.as_deref(), MAX_ROWSPAN),
                    colspan: parse_span(attr(e, "colSpan")?.as_deref(), MAX_COLSPAN),
                    lines: Vec::new(),
                });
            }
            "Coords" => {
                let points = attr(e, "points")?;
                let parent = self.parent().map(str::to_string);
                match parent.as_deref() {
                    Some("TextLine") => {
                        if let Some(line) = self.line.as_mut() {
                            if line.coords.is_none() {
                                line.coords = points;
                            }
                        }
                    }
                    Some("TableCell") => {
                        if let Some(cell) = self.cell.as_mut() {
                            if cell.coords.is_none() {
                                cell.coords = points.as_deref().map(parse_polygon);
                            }
                        }
                    }
                    _ => {}
                }
            }
            "PlainText" | "Unicode" if self.in_line_equiv() && self.line.is_some() => {
                self.capture = TextKind::from_name(name);
                self.buffer.clear();
            }
            _ => {}
        }
        Ok(())
    }

    fn store_text(&mut self) {
        let Some(kind) = self.capture.take() else {
            return;
        };
        let text = std::mem::take(&mut self.buffer);
        if let Some(line) = self.line.as_mut() {
            let slot = match kind {
                TextKind::Plain => &mut line.plain,
                TextKind::Unicode => &mut line.unicode,
            };
            slot.get_or_insert(text);
        }
    }

    fn close(&mut self, name: &str) {
        self.stack.pop();
        match name {
            "PlainText" | "Unicode" => self.store_text(),
            "TextLine" => {
                if let Some(draft) = self.line.take() {
                    self.finish_line(draft);
                }
            }
            "TableCell" => {
                if let Some(cell) = self.cell.take() {
                    self.content.cells.push(cell);
                }
            }
            _ => {}
        }
    }

    fn finish_line(&mut self, draft: LineDraft) {
        let Some(text) = draft.plain.or(draft.unicode) else {
            return;
        };
        if let Some(cell) = self.cell.as_mut() {
            cell.lines.push(text.clone());
        }
        let Some(points) = draft.coords else {
            tracing::warn!(line_id = ?draft.line_id, "text line without coordinates; skipped");
            return;
        };
        self.content.lines.push(TextLine {
            region_id: draft.region_id,
            line_id: draft.line_id,
            coords: parse_polygon(&points),
            text,
        });
    }
}

fn attr(e: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    match e.try_get_attribute(name)? {
        Some(a) => Ok(Some(a.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}


fn local_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

/// Walks the whole page once, collecting text lines and table cells.
pub fn parse_page(xml: &str) -> Result<PageContent> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut state = PageState::default();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .with_context(|| format!("malformed PAGE XML at byte {}", reader.buffer_position()))?;
        match event {
            Event::Start(e) => {
                let name = local_name(e.local_name().as_ref());
                state.open(&name, &e)?;
                let id = attr(&e, "id")?;
                state.stack.push(Frame { name, id });
            }
            Event::Empty(e) => {
                let name = local_name(e.local_name().as_ref());
                state.open(&name, &e)?;
                state.stack.push(Frame {
                    name: name.clone(),
                    id: None,
                });
                state.close(&name);
            }
            Event::Text(e) => {
                if state.capture.is_some() {
                    let text = e.unescape()?;
                    state.buffer.push_str(&text);
                }
            }
            Event::End(e) => {
                let name = local_name(e.local_name().as_ref());
                state.close(&name);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    tracing::debug!(
        lines = state.content.lines.len(),
        cells = state.content.cells.len(),
        "parsed PAGE XML"
    );
    Ok(state.content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PAGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<PcGts xmlns="http://schema.primaresearch.org/PAGE/gts/pagecontent/2013-07-15">
  <Page imageFilename="scan.jpg" imageWidth="100" imageHeight="100">
    <TextRegion id="r1">
      <Coords points="0,0 50,0 50,50 0,50"/>
      <TextLine id="r1l1">
        <Coords points="1,1 20,1 20,5 1,5"/>
        <Word id="w1">
          <TextEquiv><Unicode>word-level</Unicode></TextEquiv>
        </Word>
        <TextEquiv><PlainText>Jan &amp; Piet</PlainText><Unicode>ignored</Unicode></TextEquiv>
      </TextLine>
      <TextLine id="r1l2">
        <Coords points="1,6 20,6 20,10 1,10"/>
        <TextEquiv><Unicode>Batavia</Unicode></TextEquiv>
      </TextLine>
      <TextLine id="r1l3">
        <Coords points="1,11 20,11 20,15 1,15"/>
      </TextLine>
    </TextRegion>
    <TableRegion id="t1">
      <TableCell id="t1c1" row="0" col="0" colSpan="2">
        <Coords points="0,60 40,60 40,70 0,70"/>
        <TextLine id="t1c1l1">
          <Coords points="2,62 30,62 30,68 2,68"/>
          <TextEquiv><PlainText>Naam</PlainText></TextEquiv>
        </TextLine>
      </TableCell>
      <TableCell id="t1c2" row="1" col="0">
        <Coords points="0,70 20,70 20,80 0,80"/>
      </TableCell>
      <TableCell id="t1c3"/>
    </TableRegion>
  </Page>
</PcGts>"#;

    #[test]
    fn reads_line_level_text_only() -> Result<()> {
        let lines = read_text_lines(PAGE)?;
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["Jan & Piet", "Batavia", "Naam"]);
        assert_eq!(lines[0].region_id.as_deref(), Some("r1"));
        assert_eq!(lines[0].line_id.as_deref(), Some("r1l1"));
        assert_eq!(lines[2].region_id.as_deref(), Some("t1c1"));
        assert!(lines[0].coords.is_valid());
        Ok(())
    }

    #[test]
    fn reads_table_cell_polygons() -> Result<()> {
        let cells = read_table_cells(PAGE)?;
        assert_eq!(cells.keys().collect::<Vec<_>>(), vec!["t1c1", "t1c2"]);
        assert!((cells["t1c1"].area() - 400.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn table_cells_carry_grid_positions_and_text() -> Result<()> {
        let page = parse_page(PAGE)?;
        assert_eq!(page.cells.len(), 3);
        assert_eq!(
            page.table_descriptors(),
            vec![
                CellDescriptor::new(0, 0, 0, 1, "Naam"),
                CellDescriptor::new(1, 1, 0, 0, ""),
            ]
        );
        Ok(())
    }

    #[test]
    fn accepts_newer_namespace() -> Result<()> {
        let xml = PAGE.replace("2013-07-15", "2019-07-15");
        assert_eq!(read_text_lines(&xml)?.len(), 3);
        Ok(())
    }

    #[test]
    fn oversized_cell_positions_and_spans_are_bounded() -> Result<()> {
        let xml = r#"<PcGts><Page><TableRegion id="t1">
            <TableCell id="c1" row="18446744073709551615" col="3" rowSpan="5" colSpan="18446744073709551615">
              <Coords points="0,0 10,0 10,10 0,10"/>
            </TableCell>
        </TableRegion></Page></PcGts>"#;
        let page = parse_page(xml)?;
        assert_eq!(page.cells[0].rowspan, 5);
        assert_eq!(page.cells[0].colspan, MAX_COLSPAN);
        let descriptor = page.cells[0].descriptor().expect("cell has a position");
        assert_eq!(descriptor.end_row, usize::MAX);
        assert_eq!(descriptor.end_col, 3 + MAX_COLSPAN - 1);
        Ok(())
    }

    #[test]
    fn rejects_malformed_xml() {
        assert!(parse_page("<PcGts><Page></PcGts>").is_err());
    }
}
