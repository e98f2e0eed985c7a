// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::config::Config;
use crate::error::{FailurePolicy, MonitorError};
use crate::evaluate::DerivedMetric;
use crate::transport::{RequestSpec, ServiceCaller};
use reqwest::Method;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error};

const ACCEPTED: [u16; 2] = [200, 202];
const GAUGE: &str = "gauge";

/// Source identity attached to every metric of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonAttributes {
    pub source: String,
    pub source_account_id: String,
    pub source_account_name: String,
}

impl CommonAttributes {
    pub fn from_config(config: &Config) -> Self {
        Self {
            source: config.source_name.clone(),
            source_account_id: config.source_account_id.to_string(),
            source_account_name: config.source_account_name.clone(),
        }
    }
}

/// Everything sent in one ingest call.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricBatch {
    pub common: CommonAttributes,
    pub metrics: Vec<DerivedMetric>,
}

#[derive(Serialize)]
struct WireCommon<'a> {
    attributes: &'a CommonAttributes,
}

#[derive(Serialize)]
struct WireMetric<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    value: f64,
    timestamp: u64,
    attributes: Map<String, Value>,
}

#[derive(Serialize)]
struct WirePayload<'a> {
    common: WireCommon<'a>,
    metrics: Vec<WireMetric<'a>>,
}

impl MetricBatch {
    /// Serializes to the ingest wire shape: a one-element array. The resource
    /// key attribute is named after the table's key column.
    pub fn to_payload(&self, key_name: &str) -> Result<String, MonitorError> {
        let metrics = self
            .metrics
            .iter()
            .map(|metric| {
                let mut attributes = Map::new();
                attributes.insert(
                    key_name.to_string(),
                    Value::String(metric.attributes.resource_key.clone()),
                );
                attributes.insert(
                    "breaching".to_string(),
                    Value::Bool(metric.attributes.breaching),
                );
                attributes.insert(
                    "threshold".to_string(),
                    metric.attributes.threshold.clone(),
                );
                WireMetric {
                    name: metric.name,
                    kind: GAUGE,
                    value: metric.value,
                    timestamp: metric.timestamp,
                    attributes,
                }
            })
            .collect();

        let payload = [WirePayload {
            common: WireCommon {
                attributes: &self.common,
            },
            metrics,
        }];
        Ok(serde_json::to_string(&payload)?)
    }
}

/// Sends metric batches to the ingest endpoint.
#[derive(Clone)]
pub struct MetricPublisher {
    config: Arc<Config>,
    caller: ServiceCaller,
}

impl MetricPublisher {
    pub fn new(config: Arc<Config>, caller: ServiceCaller) -> Self {
        MetricPublisher { config, caller }
    }

    /// Publishes `batch`. Failures whose policy is [`FailurePolicy::Logged`]
    /// are logged and reported as `Ok(false)`; only fatal ones propagate.
    pub async fn publish(&self, batch: &MetricBatch) -> Result<bool, MonitorError> {
        match self.send(batch).await {
            Ok(()) => Ok(true),
            Err(e) => match e.policy() {
                FailurePolicy::Logged => {
                    error!("NR Post failed : {e}");
                    Ok(false)
                }
                FailurePolicy::Fatal => Err(e),
            },
        }
    }

    /// Publishes `batch`, returning failures wrapped in [`MonitorError::Publish`].
    pub async fn send(&self, batch: &MetricBatch) -> Result<(), MonitorError> {
        let wrap = |e: MonitorError| MonitorError::Publish(Box::new(e));

        let payload = batch.to_payload(&self.config.key_name).map_err(wrap)?;
        let request = RequestSpec::new(Method::POST, self.config.endpoints.metric_url.as_str())
            .header("Api-Key", &self.config.dest_insert_key)
            .and_then(|r| r.header("Content-Type", "application/json"))
            .map_err(wrap)?
            .body(payload)
            .mutating();

        debug!(
            "Sending {} records to NR metrics API...",
            batch.metrics.len()
        );
        self.caller
            .call(ACCEPTED, request, |_, _| Ok(()))
            .await
            .map_err(wrap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::{MetricAttributes, USAGE_METRIC, USAGE_PERCENT_METRIC};
    use crate::transport::ReqwestTransport;
    use mockito::{Matcher, Server};
    use serde_json::json;
    use std::time::Duration;
    use tracing_test::traced_test;

    fn config_for(metric_url: &str) -> Arc<Config> {
        let metric_url = metric_url.to_string();
        Arc::new(
            Config::from_lookup(|key: &str| match key {
                "NR_SOURCE_USER_KEY" => Some("user-key".to_string()),
                "NR_SOURCE_ACCOUNT_ID" => Some("99".to_string()),
                "NR_SOURCE_ACCOUNT_NAME" => Some("Prod".to_string()),
                "NR_DEST_INSERT_KEY" => Some("insert-key".to_string()),
                "NR_METRIC_URL" => Some(metric_url.clone()),
                _ => None,
            })
            .unwrap(),
        )
    }

    fn publisher_for(config: Arc<Config>) -> MetricPublisher {
        let transport = ReqwestTransport::new(&config).unwrap();
        MetricPublisher::new(
            config,
            ServiceCaller::new(Arc::new(transport), Duration::from_secs(5)),
        )
    }

    fn batch(config: &Config) -> MetricBatch {
        let attributes = MetricAttributes {
            resource_key: "ex1".to_string(),
            breaching: false,
            threshold: json!(30),
        };
        MetricBatch {
            common: CommonAttributes::from_config(config),
            metrics: vec![
                DerivedMetric {
                    name: USAGE_PERCENT_METRIC,
                    value: 50.0,
                    timestamp: 1_700_000_000_000,
                    attributes: attributes.clone(),
                },
                DerivedMetric {
                    name: USAGE_METRIC,
                    value: 15.0,
                    timestamp: 1_700_000_000_000,
                    attributes,
                },
            ],
        }
    }

    #[test]
    fn test_payload_shape() {
        let config = config_for("http://unused");
        let payload: Value =
            serde_json::from_str(&batch(&config).to_payload("indexName").unwrap()).unwrap();
        assert_eq!(
            payload,
            json!([{
                "common": {"attributes": {
                    "source": "AutoLogCheck",
                    "sourceAccountId": "99",
                    "sourceAccountName": "Prod"
                }},
                "metrics": [
                    {
                        "name": "LogIndexUsagePercent",
                        "type": "gauge",
                        "value": 50.0,
                        "timestamp": 1_700_000_000_000u64,
                        "attributes": {"indexName": "ex1", "breaching": false, "threshold": 30}
                    },
                    {
                        "name": "LogIndexUsage",
                        "type": "gauge",
                        "value": 15.0,
                        "timestamp": 1_700_000_000_000u64,
                        "attributes": {"indexName": "ex1", "breaching": false, "threshold": 30}
                    }
                ]
            }])
        );
    }

    #[test]
    fn test_threshold_cell_is_republished_as_stored() {
        let config = config_for("http://unused");
        let mut batch = batch(&config);
        batch.metrics[0].attributes.threshold = json!("88");
        batch.metrics[1].attributes.threshold = json!(88);

        let payload: Value = serde_json::from_str(&batch.to_payload("indexName").unwrap()).unwrap();
        let metrics = &payload[0]["metrics"];
        assert_eq!(metrics[0]["attributes"]["threshold"], json!("88"));
        assert_eq!(metrics[1]["attributes"]["threshold"], json!(88));
        assert!(!batch.to_payload("indexName").unwrap().contains("88.0"));
    }

    #[tokio::test]
    async fn test_publish_accepted() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/metric/v1")
            .match_header("Api-Key", "insert-key")
            .match_body(Matcher::Regex(
                r#""common":\{"attributes":\{"source":"AutoLogCheck""#.to_string(),
            ))
            .with_status(202)
            .create_async()
            .await;

        let config = config_for(&format!("{}/metric/v1", server.url()));
        let published = publisher_for(config.clone())
            .publish(&batch(&config))
            .await
            .unwrap();

        assert!(published);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_publish_ok_200() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/metric/v1")
            .with_status(200)
            .create_async()
            .await;

        let config = config_for(&format!("{}/metric/v1", server.url()));
        let published = publisher_for(config.clone())
            .publish(&batch(&config))
            .await
            .unwrap();
        assert!(published);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_publish_failure_is_logged_not_raised() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/metric/v1")
            .with_status(403)
            .create_async()
            .await;

        let config = config_for(&format!("{}/metric/v1", server.url()));
        let published = publisher_for(config.clone())
            .publish(&batch(&config))
            .await
            .unwrap();

        assert!(!published);
        assert!(logs_contain("NR Post failed"));
    }

    #[tokio::test]
    async fn test_send_wraps_failures_as_publish_errors() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/metric/v1")
            .with_status(500)
            .create_async()
            .await;

        let config = config_for(&format!("{}/metric/v1", server.url()));
        let err = publisher_for(config.clone())
            .send(&batch(&config))
            .await
            .unwrap_err();

        assert_eq!(err.policy(), FailurePolicy::Logged);
        match err {
            MonitorError::Publish(inner) => assert!(matches!(
                *inner,
                MonitorError::UnexpectedStatus { actual: 500, .. }
            )),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_publish_connection_failure_returns_false() {
        let config = config_for("http://127.0.0.1:1/metric/v1");
        let published = publisher_for(config.clone())
            .publish(&batch(&config))
            .await
            .unwrap();
        assert!(!published);
    }
}
