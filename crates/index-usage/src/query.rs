// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::config::Config;
use crate::error::MonitorError;
use crate::transport::{RequestSpec, ServiceCaller};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

const OK: u16 = 200;

/// The NRQL text travels as a variable so quotes in the query cannot break the document.
const NRQL_DOCUMENT: &str = concat!(
    "query($accountId: Int!, $nrql: Nrql!) { actor { account(id: $accountId) { ",
    "nrql(query: $nrql) { results metadata { facets } } } } }"
);

/// One per-resource row of the observation query.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub key: String,
    pub value: f64,
}

/// Parses a response body into JSON. A body that is itself a JSON string is
/// unwrapped once, so pre-serialized payloads are accepted as well.
pub fn parse_json_body(body: &str) -> Result<Value, MonitorError> {
    let value: Value = serde_json::from_str(body).map_err(|e| {
        error!("JSON parse failed");
        MonitorError::ResponseParse(e.to_string())
    })?;
    match value {
        Value::String(inner) => Ok(serde_json::from_str(&inner)?),
        other => Ok(other),
    }
}

/// Runs observation queries against the GraphQL endpoint.
#[derive(Clone)]
pub struct NrqlClient {
    config: Arc<Config>,
    caller: ServiceCaller,
}

impl NrqlClient {
    pub fn new(config: Arc<Config>, caller: ServiceCaller) -> Self {
        NrqlClient { config, caller }
    }

    /// Executes `query` and returns one observation per result record.
    ///
    /// Backend-reported errors fail the call. Results that are simply absent
    /// from the envelope yield an empty sequence.
    pub async fn fetch_observations(&self, query: &str) -> Result<Vec<Observation>, MonitorError> {
        let body = json!({
            "query": NRQL_DOCUMENT,
            "variables": {
                "accountId": self.config.source_account_id,
                "nrql": query,
            }
        })
        .to_string();
        let request = RequestSpec::new(Method::POST, self.config.endpoints.graphql_url.as_str())
            .header("Content-Type", "application/json")?
            .header("API-Key", &self.config.source_user_key)?
            .body(body);

        let response = self
            .caller
            .call(OK, request, |body, _| parse_json_body(body))
            .await?;

        let observations = extract_observations(
            response,
            &self.config.key_name,
            &self.config.field_name,
        )?;
        info!("Loaded {} indexes", observations.len());
        Ok(observations)
    }
}

/// Pulls `data.actor.account.nrql.results` out of a GraphQL envelope.
pub fn extract_observations(
    response: Value,
    key_name: &str,
    field_name: &str,
) -> Result<Vec<Observation>, MonitorError> {
    if let Some(errors) = response.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            error!("GraphQL Errors: {:?}", errors);
            return Err(MonitorError::QueryBackend {
                errors: errors.clone(),
            });
        }
    }

    let results = match response
        .pointer("/data/actor/account/nrql/results")
        .and_then(Value::as_array)
    {
        Some(results) => results,
        None => return Ok(Vec::new()),
    };

    let mut observations = Vec::with_capacity(results.len());
    for record in results {
        let key = match record.get(key_name) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                warn!("Skipping result without a '{key_name}' value: {record}");
                continue;
            }
        };
        match record.get(field_name).and_then(Value::as_f64) {
            Some(value) => observations.push(Observation { key, value }),
            None => warn!("Skipping '{key}': '{field_name}' is not numeric in {record}"),
        }
    }
    Ok(observations)
}
