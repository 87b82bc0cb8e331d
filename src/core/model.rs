use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::core::geometry::Polygon;

/// Largest `colspan` honoured when reading markup or PAGE XML.
pub const MAX_COLSPAN: usize = 1000;
/// Largest `rowspan` honoured when reading markup or PAGE XML.
pub const MAX_ROWSPAN: usize = 65534;

/// Reads a span attribute the way HTML does: leading digits only, 0 or
/// garbage means 1, anything above `max` is capped at `max`.
pub fn parse_span(value: Option<&str>, max: usize) -> usize {
    let digits: String = value
        .unwrap_or_default()
        .trim()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    if digits.is_empty() {
        return 1;
    }
    match digits.parse::<usize>() {
        Ok(0) => 1,
        Ok(n) => n.min(max),
        // only digits, so the value overflowed
        Err(_) => max,
    }
}

/// Rectangular region of the grid (inclusive bounds) and the markup it holds.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellDescriptor {
    pub start_row: usize,
    pub end_row: usize,
    pub start_col: usize,
    pub end_col: usize,
    pub content: String,
}

impl CellDescriptor {
    pub fn new(
        start_row: usize,
        end_row: usize,
        start_col: usize,
        end_col: usize,
        content: impl Into<String>,
    ) -> Self {
        Self {
            start_row,
            end_row,
            start_col,
            end_col,
            content: content.into(),
        }
    }

    pub fn rowspan(&self) -> usize {
        (self.end_row - self.start_row).saturating_add(1)
    }

    pub fn colspan(&self) -> usize {
        (self.end_col - self.start_col).saturating_add(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellAnchor {
    pub rowspan: usize,
    pub colspan: usize,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GridCell {
    #[default]
    Empty,
    Anchor(CellAnchor),
    /// Covered by the anchor at `(row, col)`.
    MergedInto { row: usize, col: usize },
}

/// One cell of a markup table placed on the logical grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalCell {
    pub id: Option<String>,
    pub row: usize,
    pub col: usize,
    pub rowspan: usize,
    pub colspan: usize,
    pub text: String,
}

/// Recognized text line from a PageXML page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLine {
    pub region_id: Option<String>,
    pub line_id: Option<String>,
    pub coords: Polygon,
    pub text: String,
}

/// Extracted value plus whatever provenance the extractor attached to it.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FieldValue {
    pub value: Option<String>,
    #[serde(flatten)]
    pub provenance: Map<String, Value>,
}

impl FieldValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            provenance: Map::new(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Linked back to a table cell or to character spans of the source row.
    pub fn has_provenance(&self) -> bool {
        let has_cell = self.provenance.get("cell").is_some_and(|v| !v.is_null());
        let has_spans = match self.provenance.get("original_spans") {
            None | Some(Value::Null) => false,
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        };
        has_cell || has_spans
    }

    fn from_json(value: Value) -> Self {
        match value {
            Value::Object(mut map) => {
                let value = map.remove("value").and_then(scalar_to_string);
                Self {
                    value,
                    provenance: map,
                }
            }
            other => Self {
                value: scalar_to_string(other),
                provenance: Map::new(),
            },
        }
    }
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_json(Value::deserialize(deserializer)?))
    }
}

/// A record field is either a value or a group of named values (e.g. the
/// components of a person's name).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldEntry {
    Value(FieldValue),
    Nested(BTreeMap<String, FieldValue>),
}

impl<'de> Deserialize<'de> for FieldEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Object(map) if !map.contains_key("value") => {
                let mut nested = BTreeMap::new();
                for (name, inner) in map {
                    if inner.is_array() {
                        return Err(D::Error::custom(format!(
                            "nested field '{name}' must be an object or scalar"
                        )));
                    }
                    nested.insert(name, FieldValue::from_json(inner));
                }
                Ok(FieldEntry::Nested(nested))
            }
            other => Ok(FieldEntry::Value(FieldValue::from_json(other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    pub fields: BTreeMap<String, FieldEntry>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields
            .insert(name.to_string(), FieldEntry::Value(FieldValue::new(value)));
        self
    }

    pub fn with_field(mut self, name: &str, entry: FieldEntry) -> Self {
        self.fields.insert(name.to_string(), entry);
        self
    }

    /// Fields with nested groups flattened to `group.member` names.
    pub fn flat_fields(&self) -> BTreeMap<String, &FieldValue> {
        let mut flat = BTreeMap::new();
        for (name, entry) in &self.fields {
            match entry {
                FieldEntry::Value(value) => {
                    flat.insert(name.clone(), value);
                }
                FieldEntry::Nested(members) => {
                    for (member, value) in members {
                        flat.insert(format!("{name}.{member}"), value);
                    }
                }
            }
        }
        flat
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
