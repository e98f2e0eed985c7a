// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::query::Observation;
use crate::table::{ReconciliationTable, TableRow};
use serde_json::Number;
use std::collections::HashSet;
use tracing::{info, warn};

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Keys appended to the table, in observation order
    pub discovered: Vec<String>,
}

impl ReconcileOutcome {
    /// Whether at least one row was appended.
    pub fn changed(&self) -> bool {
        !self.discovered.is_empty()
    }
}

/// Appends a default-threshold row for every observed key the table does not
/// know yet, in observation order. Existing rows are never touched.
///
/// A key repeated within one batch gets a single row and a warning.
pub fn reconcile(
    table: &mut ReconciliationTable,
    observations: &[Observation],
    default_threshold: &Number,
) -> ReconcileOutcome {
    let known: HashSet<String> = table.keys().map(str::to_string).collect();
    let mut seen: HashSet<&str> = HashSet::with_capacity(observations.len());
    let mut discovered = Vec::new();

    for observation in observations {
        let key = observation.key.as_str();
        if !seen.insert(key) {
            warn!(key, "Key reported more than once in the same observation batch");
            continue;
        }
        if known.contains(key) {
            continue;
        }
        table.push(TableRow::auto_default(key, default_threshold.clone()));
        discovered.push(key.to_string());
    }

    if !discovered.is_empty() {
        info!("New indexes were discovered: {:?}", discovered);
    }
    ReconcileOutcome { discovered }
}
