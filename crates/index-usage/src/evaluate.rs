// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::MonitorError;
use crate::query::Observation;
use crate::table::ReconciliationTable;
use serde_json::Value;
use tracing::info;

pub const USAGE_METRIC: &str = "LogIndexUsage";
pub const USAGE_PERCENT_METRIC: &str = "LogIndexUsagePercent";

/// Attributes shared by both metrics of one resource.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricAttributes {
    pub resource_key: String,
    pub breaching: bool,
    /// The table cell as stored, republished unchanged (`88` stays `88`, `"88"` stays `"88"`)
    pub threshold: Value,
}

/// One gauge sample.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedMetric {
    pub name: &'static str,
    pub value: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    pub attributes: MetricAttributes,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// Two metrics per observation, percent first, in observation order
    pub metrics: Vec<DerivedMetric>,
    pub evaluated: usize,
    pub breaching: usize,
}

/// Joins observations against the table and classifies each resource.
///
/// Every observed key must have a row; a missing row or a threshold that is
/// not a positive number fails the whole evaluation.
pub fn evaluate(
    table: &ReconciliationTable,
    observations: &[Observation],
    timestamp: u64,
) -> Result<Evaluation, MonitorError> {
    let mut evaluation = Evaluation {
        metrics: Vec::with_capacity(observations.len() * 2),
        ..Default::default()
    };

    for observation in observations {
        let row = table
            .find(&observation.key)
            .ok_or_else(|| MonitorError::UnknownKey {
                key: observation.key.clone(),
            })?;
        let threshold = row
            .threshold_value()
            .filter(|t| t.is_finite() && *t > 0.0)
            .ok_or_else(|| MonitorError::InvalidThreshold {
                key: row.key.clone(),
                threshold: row.threshold.to_string(),
            })?;

        let percent = (observation.value / threshold) * 100.0;
        let breaching = percent >= 100.0;
        if breaching {
            evaluation.breaching += 1;
        }
        info!(
            "Index '{}' has threshold: {}, value: {}, percent: {:.2}% {}",
            observation.key,
            threshold,
            observation.value,
            percent,
            if breaching { "[Breaching]" } else { "[OK]" }
        );

        let attributes = MetricAttributes {
            resource_key: observation.key.clone(),
            breaching,
            threshold: row.threshold.clone(),
        };
        evaluation.metrics.push(DerivedMetric {
            name: USAGE_PERCENT_METRIC,
            value: percent,
            timestamp,
            attributes: attributes.clone(),
        });
        evaluation.metrics.push(DerivedMetric {
            name: USAGE_METRIC,
            value: observation.value,
            timestamp,
            attributes,
        });
        evaluation.evaluated += 1;
    }

    info!(
        "{}/{} index(es) are breaching thresholds.",
        evaluation.breaching, evaluation.evaluated
    );
    Ok(evaluation)
}
