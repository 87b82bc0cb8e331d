//! Provenance bookkeeping for extracted records.

use serde::{Deserialize, Serialize};

use crate::core::model::{FieldEntry, Record};

/// Copy of `record` holding only fields linked back to the source table.
/// Nested groups left without members are dropped.
pub fn filter_record(record: &Record) -> Record {
    let mut filtered = Record::new();
    for (name, entry) in &record.fields {
        match entry {
            FieldEntry::Value(value) if value.has_provenance() => {
                filtered.fields.insert(name.clone(), entry.clone());
            }
            FieldEntry::Value(_) => {}
            FieldEntry::Nested(members) => {
                let kept: std::collections::BTreeMap<_, _> = members
                    .iter()
                    .filter(|(_, value)| value.has_provenance())
                    .map(|(member, value)| (member.clone(), value.clone()))
                    .collect();
                if !kept.is_empty() {
                    filtered.fields.insert(name.clone(), FieldEntry::Nested(kept));
                }
            }
        }
    }
    filtered
}

pub fn filter_records(records: &[Record]) -> Vec<Record> {
    records.iter().map(filter_record).collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceCount {
    /// Fields that name the table cell they came from.
    pub with_cell: usize,
    pub total: usize,
    /// `with_cell / total` as a percentage, two decimals.
    pub ratio_percent: f64,
}

pub fn count_provenance(records: &[Record]) -> ProvenanceCount {
    let mut with_cell = 0;
    let mut total = 0;
    for record in records {
        for value in record.flat_fields().values() {
            total += 1;
            if value.provenance.get("cell").is_some_and(|c| !c.is_null()) {
                with_cell += 1;
            }
        }
    }
    let ratio_percent = if total == 0 {
        0.0
    } else {
        (with_cell as f64 / total as f64 * 100.0 * 100.0).round() / 100.0
    };
    ProvenanceCount {
        with_cell,
        total,
        ratio_percent,
    }
}
