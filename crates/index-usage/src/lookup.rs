// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::config::Config;
use crate::error::MonitorError;
use crate::query::parse_json_body;
use crate::table::{parse_table_response, ReconciliationTable, TableEnvelope};
use crate::transport::{RequestSpec, ServiceCaller};
use reqwest::Method;
use std::sync::Arc;
use tracing::{debug, info};

const OK: u16 = 200;

/// Reads and overwrites a whole lookup table. There is no partial update and
/// no concurrency control: the last writer wins.
#[derive(Clone)]
pub struct LookupClient {
    config: Arc<Config>,
    caller: ServiceCaller,
}

impl LookupClient {
    pub fn new(config: Arc<Config>, caller: ServiceCaller) -> Self {
        LookupClient { config, caller }
    }

    fn table_url(&self, table_name: &str) -> String {
        format!(
            "{}/v1/accounts/{}/{}",
            self.config.endpoints.lookup_base, self.config.source_account_id, table_name
        )
    }

    pub async fn read(&self, table_name: &str) -> Result<ReconciliationTable, MonitorError> {
        let wrap = |source: MonitorError| MonitorError::TableFetch {
            table: table_name.to_string(),
            source: Box::new(source),
        };

        let request = RequestSpec::new(
            Method::GET,
            format!("{}?includeTable=true", self.table_url(table_name)),
        )
        .header("Api-Key", &self.config.source_user_key)
        .map_err(wrap)?;

        let table = self
            .caller
            .call(OK, request, |body, _| {
                parse_table_response(parse_json_body(body)?)
            })
            .await
            .map_err(|e| match e {
                // A missing table/rows shape is reported as is
                MonitorError::MalformedTable(_) => e,
                other => wrap(other),
            })?;

        info!(
            table = table_name,
            rows = table.len(),
            "Lookup table loaded"
        );
        debug!("Lookup table: {:?}", table);
        Ok(table)
    }

    pub async fn write(
        &self,
        table_name: &str,
        table: &ReconciliationTable,
    ) -> Result<(), MonitorError> {
        let wrap = |source: MonitorError| MonitorError::TableWrite {
            table: table_name.to_string(),
            source: Box::new(source),
        };

        let body = serde_json::to_string(&TableEnvelope { table }).map_err(|e| wrap(e.into()))?;
        let request = RequestSpec::new(Method::PUT, self.table_url(table_name))
            .header("Api-Key", &self.config.source_user_key)
            .and_then(|r| r.header("Content-Type", "application/json"))
            .map_err(wrap)?
            .body(body)
            .mutating();

        let status = self
            .caller
            .call(OK, request, |_, response| Ok(response.status))
            .await
            .map_err(wrap)?;
        info!(table = table_name, status, "Update response");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::TableRow;
    use crate::transport::ReqwestTransport;
    use mockito::{Matcher, Server};
    use serde_json::{json, Number};
    use std::time::Duration;

    fn client_for(server: &Server) -> LookupClient {
        let url = server.url();
        let config = Config::from_lookup(|key: &str| match key {
            "NR_SOURCE_USER_KEY" => Some("user-key".to_string()),
            "NR_SOURCE_ACCOUNT_ID" => Some("1".to_string()),
            "NR_DEST_INSERT_KEY" => Some("insert-key".to_string()),
            "NR_LOOKUP_URL" => Some(url.clone()),
            _ => None,
        })
        .unwrap();
        let caller = ServiceCaller::new(
            Arc::new(ReqwestTransport::new(&config).unwrap()),
            Duration::from_secs(5),
        );
        LookupClient::new(Arc::new(config), caller)
    }

    #[tokio::test]
    async fn test_read_table() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/accounts/1/AutoLogThresholds")
            .match_query(Matcher::UrlEncoded("includeTable".into(), "true".into()))
            .match_header("Api-Key", "user-key")
            .with_status(200)
            .with_body(
                json!({
                    "name": "AutoLogThresholds",
                    "table": {
                        "headers": ["indexName", "threshold", "type"],
                        "rows": [["ex1", 30, "manual"], ["ex2", 88, "manual"]]
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let table = client_for(&server).read("AutoLogThresholds").await.unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.keys().collect::<Vec<_>>(), vec!["ex1", "ex2"]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_read_missing_table_is_malformed() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/v1/accounts/1/AutoLogThresholds")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"name": "AutoLogThresholds"}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .read("AutoLogThresholds")
            .await
            .unwrap_err();
        assert!(matches!(err, MonitorError::MalformedTable(_)), "{err}");
    }

    #[tokio::test]
    async fn test_read_failure_is_table_fetch_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/v1/accounts/1/AutoLogThresholds")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let err = client_for(&server)
            .read("AutoLogThresholds")
            .await
            .unwrap_err();
        match err {
            MonitorError::TableFetch { table, source } => {
                assert_eq!(table, "AutoLogThresholds");
                assert!(matches!(
                    *source,
                    MonitorError::UnexpectedStatus { actual: 404, .. }
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_read_invalid_json_is_table_fetch_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/v1/accounts/1/AutoLogThresholds")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let err = client_for(&server)
            .read("AutoLogThresholds")
            .await
            .unwrap_err();
        match err {
            MonitorError::TableFetch { source, .. } => {
                assert!(matches!(*source, MonitorError::ResponseParse(_)))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_write_puts_full_table() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/v1/accounts/1/AutoLogThresholds")
            .match_header("Api-Key", "user-key")
            .match_header("Content-Type", "application/json")
            .match_body(Matcher::Json(json!({
                "table": {
                    "headers": ["indexName", "threshold", "type"],
                    "rows": [["ex1", 30, "manual"], ["new1", 30, "auto-default"]]
                }
            })))
            .with_status(200)
            .create_async()
            .await;

        let table = ReconciliationTable::new(
            vec!["indexName".into(), "threshold".into(), "type".into()],
            vec![
                TableRow {
                    key: "ex1".into(),
                    threshold: json!(30),
                    origin: json!("manual"),
                },
                TableRow::auto_default("new1", Number::from(30)),
            ],
        );
        client_for(&server)
            .write("AutoLogThresholds", &table)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_write_non_200_is_table_write_error() {
        let mut server = Server::new_async().await;
        server
            .mock("PUT", "/v1/accounts/1/AutoLogThresholds")
            .with_status(500)
            .create_async()
            .await;

        let err = client_for(&server)
            .write("AutoLogThresholds", &ReconciliationTable::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MonitorError::TableWrite { .. }), "{err}");
    }
}
