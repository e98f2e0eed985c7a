// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Key/threshold table as stored by the lookup service.
//!
//! Rows travel as JSON arrays `[key, threshold, origin]`. Thresholds are kept
//! as the raw JSON value so a table uploaded from CSV (where every cell is a
//! string) is written back exactly as it was read.

use crate::error::MonitorError;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Number, Value};

/// Origin marker for rows appended by reconciliation.
pub const AUTO_DEFAULT_ORIGIN: &str = "auto-default";

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub key: String,
    pub threshold: Value,
    pub origin: Value,
}

impl TableRow {
    pub fn auto_default(key: impl Into<String>, threshold: Number) -> Self {
        Self {
            key: key.into(),
            threshold: Value::Number(threshold),
            origin: Value::String(AUTO_DEFAULT_ORIGIN.to_string()),
        }
    }

    /// The threshold as a number, accepting numeric strings.
    pub fn threshold_value(&self) -> Option<f64> {
        match &self.threshold {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }
}

impl Serialize for TableRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.key, &self.threshold, &self.origin).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TableRow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let cells = Vec::<Value>::deserialize(deserializer)?;
        let mut cells = cells.into_iter();
        let key = match cells.next() {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => {
                return Err(D::Error::custom(format!("row key must be a string, got {other}")))
            }
            None => return Err(D::Error::custom("row is empty")),
        };
        let threshold = cells
            .next()
            .ok_or_else(|| D::Error::custom(format!("row '{key}' has no threshold")))?;
        let origin = cells.next().unwrap_or(Value::Null);
        Ok(TableRow {
            key,
            threshold,
            origin,
        })
    }
}

/// Ordered rows plus column headers. Keys are unique across rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationTable {
    #[serde(default)]
    pub headers: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl ReconciliationTable {
    pub fn new(headers: Vec<String>, rows: Vec<TableRow>) -> Self {
        Self { headers, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|row| row.key.as_str())
    }

    /// First row whose key matches exactly.
    pub fn find(&self, key: &str) -> Option<&TableRow> {
        self.rows.iter().find(|row| row.key == key)
    }

    pub fn push(&mut self, row: TableRow) {
        self.rows.push(row);
    }
}

/// Wire envelope used by both the read and the write endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct TableEnvelope<T> {
    pub table: T,
}

/// Extracts the table from a lookup service response.
pub(crate) fn parse_table_response(value: Value) -> Result<ReconciliationTable, MonitorError> {
    let table = match value {
        Value::Object(mut map) => map.remove("table"),
        _ => None,
    }
    .ok_or_else(|| MonitorError::MalformedTable("response has no 'table' field".to_string()))?;

    if table.get("rows").is_none() {
        return Err(MonitorError::MalformedTable(
            "table has no 'rows' field".to_string(),
        ));
    }

    serde_json::from_value(table).map_err(|e| MonitorError::MalformedTable(e.to_string()))
}
