// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::MonitorError;
use serde_json::Number;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_TABLE_NAME: &str = "AutoLogThresholds";
const DEFAULT_KEY_NAME: &str = "indexName";
const DEFAULT_FIELD_NAME: &str = "value";
const DEFAULT_SOURCE_NAME: &str = "AutoLogCheck";
const DEFAULT_THRESHOLD: u64 = 30;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Which set of endpoint domains requests go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Region {
    #[default]
    Us,
    Eu,
}

impl Region {
    fn lookup_domain(self) -> &'static str {
        match self {
            Region::Us => "nrql-lookup.service.newrelic.com",
            Region::Eu => "nrql-lookup.service.eu.newrelic.com",
        }
    }

    fn graphql_domain(self) -> &'static str {
        match self {
            Region::Us => "api.newrelic.com",
            Region::Eu => "api.eu.newrelic.com",
        }
    }

    fn metric_domain(self) -> &'static str {
        match self {
            Region::Us => "metric-api.newrelic.com",
            Region::Eu => "metric-api.eu.newrelic.com",
        }
    }
}

impl FromStr for Region {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "US" => Ok(Region::Us),
            "EU" => Ok(Region::Eu),
            other => Err(MonitorError::InvalidConfig(format!(
                "Unknown region '{other}'. Must be one of: US, EU"
            ))),
        }
    }
}

/// Base urls for the three remote services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Scheme and host of the lookup table service, without trailing slash
    pub lookup_base: String,
    /// Full url of the GraphQL endpoint
    pub graphql_url: String,
    /// Full url of the metric ingest endpoint
    pub metric_url: String,
}

impl Endpoints {
    pub fn for_region(region: Region) -> Self {
        Self {
            lookup_base: format!("https://{}", region.lookup_domain()),
            graphql_url: format!("https://{}/graphql", region.graphql_domain()),
            metric_url: format!("https://{}/metric/v1", region.metric_domain()),
        }
    }
}

/// Immutable run configuration, built once at startup and shared by reference.
#[derive(Clone)]
pub struct Config {
    pub source_user_key: String,
    pub source_account_id: u64,
    pub source_account_name: String,
    pub dest_insert_key: String,
    pub source_name: String,
    pub table_name: String,
    /// Name of the key column, also the facet name in query results
    pub key_name: String,
    /// Name of the numeric field in query results
    pub field_name: String,
    pub default_threshold: Number,
    pub index_query: String,
    pub auto_update: bool,
    pub region: Region,
    pub endpoints: Endpoints,
    /// Applied to any request that does not carry its own timeout
    pub request_timeout: Duration,
    /// Deadline around the whole pipeline, if any
    pub run_timeout: Option<Duration>,
    pub dry_run: bool,
    pub log_level: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("source_user_key", &"<redacted>")
            .field("source_account_id", &self.source_account_id)
            .field("source_account_name", &self.source_account_name)
            .field("dest_insert_key", &"<redacted>")
            .field("source_name", &self.source_name)
            .field("table_name", &self.table_name)
            .field("key_name", &self.key_name)
            .field("field_name", &self.field_name)
            .field("default_threshold", &self.default_threshold)
            .field("index_query", &self.index_query)
            .field("auto_update", &self.auto_update)
            .field("region", &self.region)
            .field("endpoints", &self.endpoints)
            .field("request_timeout", &self.request_timeout)
            .field("run_timeout", &self.run_timeout)
            .field("dry_run", &self.dry_run)
            .field("log_level", &self.log_level)
            .finish()
    }
}

/// Default discovery query: daily log count per container.
pub fn default_index_query(key_name: &str, field_name: &str) -> String {
    format!(
        "FROM Log select count(*) as {field_name} facet container_name as {key_name} limit max since 1 day ago"
    )
}

impl Config {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, MonitorError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, MonitorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            var(key).ok_or_else(|| {
                MonitorError::InvalidConfig(format!("{key} environment variable is not set"))
            })
        };

        let source_user_key = required("NR_SOURCE_USER_KEY")?;
        let dest_insert_key = required("NR_DEST_INSERT_KEY")?;
        let source_account_id = required("NR_SOURCE_ACCOUNT_ID")?
            .trim()
            .parse::<u64>()
            .map_err(|_| {
                MonitorError::InvalidConfig(
                    "NR_SOURCE_ACCOUNT_ID must be a numeric account id".to_string(),
                )
            })?;
        let source_account_name = var("NR_SOURCE_ACCOUNT_NAME").unwrap_or_default();
        let source_name =
            var("NR_SOURCE_NAME").unwrap_or_else(|| DEFAULT_SOURCE_NAME.to_string());
        let table_name =
            var("NR_LOOKUP_TABLE_NAME").unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string());
        let key_name = var("NR_LOOKUP_KEY_NAME").unwrap_or_else(|| DEFAULT_KEY_NAME.to_string());
        let field_name =
            var("NR_QUERY_FIELD_NAME").unwrap_or_else(|| DEFAULT_FIELD_NAME.to_string());
        let default_threshold = match var("NR_DEFAULT_THRESHOLD") {
            Some(raw) => parse_threshold(&raw)?,
            None => Number::from(DEFAULT_THRESHOLD),
        };
        let index_query = var("NR_INDEX_QUERY")
            .unwrap_or_else(|| default_index_query(&key_name, &field_name));
        let auto_update = parse_bool("NR_AUTO_UPDATE_LOOKUP", var("NR_AUTO_UPDATE_LOOKUP"), true)?;
        let dry_run = parse_bool("NR_DRY_RUN", var("NR_DRY_RUN"), false)?;
        let region = match var("NR_REGION") {
            Some(raw) => raw.parse::<Region>()?,
            None => Region::default(),
        };

        // Overrides are primarily used by integration tests
        let mut endpoints = Endpoints::for_region(region);
        if let Some(url) = var("NR_LOOKUP_URL") {
            endpoints.lookup_base = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = var("NR_GRAPHQL_URL") {
            endpoints.graphql_url = url;
        }
        if let Some(url) = var("NR_METRIC_URL") {
            endpoints.metric_url = url;
        }

        let request_timeout = Duration::from_millis(parse_millis(
            "NR_REQUEST_TIMEOUT_MS",
            var("NR_REQUEST_TIMEOUT_MS"),
        )?
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS));
        let run_timeout =
            parse_millis("NR_RUN_TIMEOUT_MS", var("NR_RUN_TIMEOUT_MS"))?.map(Duration::from_millis);
        let log_level = var("NR_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        let config = Self {
            source_user_key,
            source_account_id,
            source_account_name,
            dest_insert_key,
            source_name,
            table_name,
            key_name,
            field_name,
            default_threshold,
            index_query,
            auto_update,
            region,
            endpoints,
            request_timeout,
            run_timeout,
            dry_run,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), MonitorError> {
        for (name, value) in [
            ("NR_LOOKUP_TABLE_NAME", &self.table_name),
            ("NR_LOOKUP_KEY_NAME", &self.key_name),
            ("NR_QUERY_FIELD_NAME", &self.field_name),
            ("NR_INDEX_QUERY", &self.index_query),
        ] {
            if value.trim().is_empty() {
                return Err(MonitorError::InvalidConfig(format!(
                    "{name} cannot be empty"
                )));
            }
        }

        match self.default_threshold.as_f64() {
            Some(t) if t.is_finite() && t > 0.0 => {}
            _ => {
                return Err(MonitorError::InvalidConfig(format!(
                    "Default threshold must be a positive number, got {}",
                    self.default_threshold
                )))
            }
        }

        if self.request_timeout.is_zero() {
            return Err(MonitorError::InvalidConfig(
                "Request timeout must be greater than 0".to_string(),
            ));
        }
        if self.run_timeout.is_some_and(|t| t.is_zero()) {
            return Err(MonitorError::InvalidConfig(
                "Run timeout must be greater than 0".to_string(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(MonitorError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }
}

/// Integral thresholds stay integers so the table is written back as `30`, not `30.0`.
fn parse_threshold(raw: &str) -> Result<Number, MonitorError> {
    let trimmed = raw.trim();
    if let Ok(n) = trimmed.parse::<u64>() {
        return Ok(Number::from(n));
    }
    trimmed
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| {
            MonitorError::InvalidConfig(format!(
                "NR_DEFAULT_THRESHOLD must be a number, got '{trimmed}'"
            ))
        })
}

fn parse_bool(name: &str, raw: Option<String>, default: bool) -> Result<bool, MonitorError> {
    match raw.map(|v| v.trim().to_lowercase()) {
        None => Ok(default),
        Some(v) if v == "true" || v == "1" || v == "yes" => Ok(true),
        Some(v) if v == "false" || v == "0" || v == "no" => Ok(false),
        Some(v) => Err(MonitorError::InvalidConfig(format!(
            "{name} must be true or false, got '{v}'"
        ))),
    }
}

fn parse_millis(name: &str, raw: Option<String>) -> Result<Option<u64>, MonitorError> {
    raw.map(|v| {
        v.trim().parse::<u64>().map_err(|_| {
            MonitorError::InvalidConfig(format!("{name} must be a whole number of milliseconds"))
        })
    })
    .transpose()
}
