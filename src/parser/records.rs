use anyhow::{bail, Context, Result};
use serde_json::Value;

use crate::core::model::Record;

/// Records from `{"persons": [...]}` or from a bare array.
pub fn read_records(json: &str) -> Result<Vec<Record>> {
    let root: Value = serde_json::from_str(json).context("records file is not valid JSON")?;
    let items = match root {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("persons") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(_) => bail!("'persons' must be an array"),
        },
        _ => bail!("expected an array of records or an object with 'persons'"),
    };
    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| {
            serde_json::from_value::<Record>(item).with_context(|| format!("invalid record #{idx}"))
        })
        .collect()
}

/// Writes records under a `persons` key.
pub fn to_records_json(records: &[Record]) -> Result<String> {
    Ok(serde_json::to_string_pretty(&serde_json::json!({ "persons": records }))?)
}
