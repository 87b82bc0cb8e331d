//! Tree-edit-distance based similarity between two HTML tables.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

use crate::core::model::{parse_span, MAX_COLSPAN, MAX_ROWSPAN};
use crate::core::text::normalized_edit_distance;
use crate::metrics::tree_edit::{tree_edit_distance, EditCosts, Tree};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLabel {
    pub tag: String,
    pub colspan: usize,
    pub rowspan: usize,
    /// Cell text, one token per character. `None` for non-cell nodes and in
    /// structure-only mode.
    pub content: Option<String>,
}

impl NodeLabel {
    fn element(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            colspan: 1,
            rowspan: 1,
            content: None,
        }
    }
}

pub type LabeledTree = Tree<NodeLabel>;

struct TableCosts;

impl EditCosts<NodeLabel> for TableCosts {
    fn rename(&self, from: &NodeLabel, to: &NodeLabel) -> f64 {
        if from.tag != to.tag || from.colspan != to.colspan || from.rowspan != to.rowspan {
            return 1.0;
        }
        if from.tag != "td" {
            return 0.0;
        }
        match (&from.content, &to.content) {
            (None, None) => 0.0,
            (a, b) => normalized_edit_distance(
                a.as_deref().unwrap_or_default(),
                b.as_deref().unwrap_or_default(),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TedsScores {
    pub teds: f64,
    pub teds_struct: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Teds {
    structure_only: bool,
}

impl Teds {
    pub fn new(structure_only: bool) -> Self {
        Self { structure_only }
    }

    pub fn structure_only() -> Self {
        Self::new(true)
    }

    /// Similarity in `[0, 1]`; 0 when either document has no `<table>`.
    pub fn evaluate(&self, pred_html: &str, true_html: &str) -> f64 {
        let (Some(pred), Some(truth)) = (self.load_tree(pred_html), self.load_tree(true_html))
        else {
            return 0.0;
        };
        let n = pred.node_count().max(truth.node_count()) as f64;
        let distance = tree_edit_distance(&pred, &truth, &TableCosts);
        (1.0 - distance / n).clamp(0.0, 1.0)
    }

    /// Labeled tree of the first `<table>` in `html`, holding exactly the
    /// elements written in the markup. No `tbody` is implied.
    pub fn load_tree(&self, html: &str) -> Option<LabeledTree> {
        let mut reader = Reader::from_str(html);
        reader.trim_text(false);
        reader.check_end_names(false);
        let mut builder = TreeBuilder::new(self.structure_only);
        loop {
            let done = match reader.read_event() {
                Ok(Event::Start(e)) => {
                    builder.open(&e);
                    None
                }
                Ok(Event::Empty(e)) => builder.empty(&e),
                Ok(Event::End(e)) => builder.close(&tag_name(e.local_name().as_ref())),
                Ok(Event::Text(e)) => {
                    builder.text(&html_escape::decode_html_entities(&String::from_utf8_lossy(&e)));
                    None
                }
                Ok(Event::CData(e)) => {
                    builder.text(&String::from_utf8_lossy(&e));
                    None
                }
                Ok(Event::Eof) => return builder.finish(),
                Ok(_) => None,
                Err(err) => {
                    tracing::warn!(%err, "unreadable table markup");
                    return None;
                }
            };
            if done.is_some() {
                return done;
            }
        }
    }
}

const CELL_TAGS: [&str; 2] = ["td", "th"];

struct OpenNode {
    label: NodeLabel,
    children: Vec<LabeledTree>,
}

/// Assembles the tree of the first table while the markup streams past.
/// Elements inside a cell only contribute their text.
struct TreeBuilder {
    structure_only: bool,
    stack: Vec<OpenNode>,
    cell: Option<(NodeLabel, String)>,
}

impl TreeBuilder {
    fn new(structure_only: bool) -> Self {
        Self {
            structure_only,
            stack: Vec::new(),
            cell: None,
        }
    }

    fn cell_label(tag: String, e: &BytesStart<'_>) -> NodeLabel {
        NodeLabel {
            tag,
            colspan: parse_span(attr(e, "colspan").as_deref(), MAX_COLSPAN),
            rowspan: parse_span(attr(e, "rowspan").as_deref(), MAX_ROWSPAN),
            content: None,
        }
    }

    fn cell_leaf(&self, mut label: NodeLabel, text: String) -> LabeledTree {
        label.content = (!self.structure_only).then_some(text);
        Tree::leaf(label)
    }

    fn attach(&mut self, tree: LabeledTree) {
        if let Some(parent) = self.stack.last_mut() {
            parent.children.push(tree);
        }
    }

    fn open(&mut self, e: &BytesStart<'_>) {
        if self.cell.is_some() {
            return;
        }
        let tag = tag_name(e.local_name().as_ref());
        if self.stack.is_empty() && tag != "table" {
            return;
        }
        if CELL_TAGS.contains(&tag.as_str()) {
            self.cell = Some((Self::cell_label(tag, e), String::new()));
        } else {
            self.stack.push(OpenNode {
                label: NodeLabel::element(&tag),
                children: Vec::new(),
            });
        }
    }

    fn empty(&mut self, e: &BytesStart<'_>) -> Option<LabeledTree> {
        if self.cell.is_some() {
            return None;
        }
        let tag = tag_name(e.local_name().as_ref());
        if self.stack.is_empty() {
            return (tag == "table").then(|| Tree::leaf(NodeLabel::element(&tag)));
        }
        let leaf = if CELL_TAGS.contains(&tag.as_str()) {
            self.cell_leaf(Self::cell_label(tag, e), String::new())
        } else {
            Tree::leaf(NodeLabel::element(&tag))
        };
        self.attach(leaf);
        None
    }

    fn text(&mut self, text: &str) {
        if let Some((_, content)) = self.cell.as_mut() {
            content.push_str(text);
        }
    }

    /// Closes `tag`; returns the finished tree once the table itself closes.
    /// End tags with no open element of that name are ignored.
    fn close(&mut self, tag: &str) -> Option<LabeledTree> {
        if self.cell.is_some() {
            if CELL_TAGS.contains(&tag) {
                if let Some((label, text)) = self.cell.take() {
                    let leaf = self.cell_leaf(label, text);
                    self.attach(leaf);
                }
            }
            return None;
        }
        let pos = self.stack.iter().rposition(|node| node.label.tag == tag)?;
        while self.stack.len() > pos {
            let node = self.stack.pop()?;
            let tree = Tree::with_children(node.label, node.children);
            if self.stack.is_empty() {
                return Some(tree);
            }
            self.attach(tree);
        }
        None
    }

    /// Input ended inside the table: close whatever is still open.
    fn finish(mut self) -> Option<LabeledTree> {
        if let Some((label, text)) = self.cell.take() {
            let leaf = self.cell_leaf(label, text);
            self.attach(leaf);
        }
        while let Some(node) = self.stack.pop() {
            let tree = Tree::with_children(node.label, node.children);
            match self.stack.last_mut() {
                Some(parent) => parent.children.push(tree),
                None => return Some(tree),
            }
        }
        None
    }
}

fn tag_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).to_ascii_lowercase()
}

fn attr(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.html_attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref().eq_ignore_ascii_case(name.as_bytes()))
        .map(|a| html_escape::decode_html_entities(&String::from_utf8_lossy(&a.value)).into_owned())
}

/// TEDS and TEDS-Struct of `pred_html` against `gt_html`.
pub fn teds_pair(gt_html: &str, pred_html: &str) -> TedsScores {
    TedsScores {
        teds: Teds::new(false).evaluate(pred_html, gt_html),
        teds_struct: Teds::structure_only().evaluate(pred_html, gt_html),
    }
}
