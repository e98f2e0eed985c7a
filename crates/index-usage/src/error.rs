// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// How the pipeline reacts when an error of a given kind surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abort the run and propagate to the caller.
    Fatal,
    /// Log and keep going; the run still reports success.
    Logged,
}

/// Errors that can occur during an index usage run
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Connection error on url '{url}': {reason}")]
    Connection { url: String, reason: String },

    #[error("Expected {expected:?} response code but got '{actual}' from url '{url}'")]
    UnexpectedStatus {
        url: String,
        expected: Vec<u16>,
        actual: u16,
    },

    #[error("Failed to parse response body: {0}")]
    ResponseParse(String),

    #[error("Query backend reported errors: {}", render_errors(.errors))]
    QueryBackend { errors: Vec<serde_json::Value> },

    #[error("Malformed lookup table: {0}")]
    MalformedTable(String),

    #[error("Failed to fetch lookup table '{table}': {source}")]
    TableFetch {
        table: String,
        #[source]
        source: Box<MonitorError>,
    },

    #[error("Failed to write lookup table '{table}': {source}")]
    TableWrite {
        table: String,
        #[source]
        source: Box<MonitorError>,
    },

    #[error("No lookup table row for observed key '{key}'")]
    UnknownKey { key: String },

    #[error("Threshold {threshold} for key '{key}' is not a positive number")]
    InvalidThreshold { key: String, threshold: String },

    #[error("Failed to publish metrics: {0}")]
    Publish(#[source] Box<MonitorError>),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("Run did not complete within {0:?}")]
    RunTimeout(Duration),
}

impl MonitorError {
    /// Policy table: losing a metric push is tolerable, losing input or the
    /// ability to persist discovered keys is not.
    pub fn policy(&self) -> FailurePolicy {
        match self {
            MonitorError::Publish(_) => FailurePolicy::Logged,
            MonitorError::Connection { .. }
            | MonitorError::UnexpectedStatus { .. }
            | MonitorError::ResponseParse(_)
            | MonitorError::QueryBackend { .. }
            | MonitorError::MalformedTable(_)
            | MonitorError::TableFetch { .. }
            | MonitorError::TableWrite { .. }
            | MonitorError::UnknownKey { .. }
            | MonitorError::InvalidThreshold { .. }
            | MonitorError::InvalidConfig(_)
            | MonitorError::ClientBuild(_)
            | MonitorError::RunTimeout(_) => FailurePolicy::Fatal,
        }
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(e: serde_json::Error) -> Self {
        MonitorError::ResponseParse(e.to_string())
    }
}

fn render_errors(errors: &[serde_json::Value]) -> String {
    errors
        .iter()
        .map(|e| {
            e.get("message")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| e.to_string())
        })
        .collect::<Vec<_>>()
        .join("; ")
}
