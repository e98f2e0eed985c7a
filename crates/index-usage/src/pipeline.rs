// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! One start-to-finish pass: read table, fetch observations, reconcile,
//! optionally write the table back, evaluate, publish. Every remote call is
//! awaited before the next one starts.

use crate::config::Config;
use crate::dry_run::DryRunTransport;
use crate::error::MonitorError;
use crate::evaluate::evaluate;
use crate::lookup::LookupClient;
use crate::publisher::{CommonAttributes, MetricBatch, MetricPublisher};
use crate::query::NrqlClient;
use crate::reconcile::reconcile;
use crate::transport::{ReqwestTransport, ServiceCaller, Transport};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Summary of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Keys appended to the table during this run
    pub discovered: Vec<String>,
    pub table_written: bool,
    pub evaluated: usize,
    pub breaching: usize,
    pub published: bool,
}

/// Builds the live transport, wrapped for dry runs when configured.
pub fn build_transport(config: &Config) -> Result<Arc<dyn Transport>, MonitorError> {
    let live: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(config)?);
    if config.dry_run {
        info!("Dry run enabled: lookup table and metrics will not be written");
        return Ok(Arc::new(DryRunTransport::new(live)));
    }
    Ok(live)
}

pub struct Monitor {
    config: Arc<Config>,
    lookup: LookupClient,
    nrql: NrqlClient,
    publisher: MetricPublisher,
}

impl Monitor {
    pub fn new(config: Arc<Config>, transport: Arc<dyn Transport>) -> Self {
        let caller = ServiceCaller::new(transport, config.request_timeout);
        Monitor {
            lookup: LookupClient::new(Arc::clone(&config), caller.clone()),
            nrql: NrqlClient::new(Arc::clone(&config), caller.clone()),
            publisher: MetricPublisher::new(Arc::clone(&config), caller),
            config,
        }
    }

    /// Runs one pass, under the configured run deadline if there is one.
    pub async fn run(&self) -> Result<RunReport, MonitorError> {
        match self.config.run_timeout {
            Some(deadline) => tokio::time::timeout(deadline, self.run_once())
                .await
                .map_err(|_| MonitorError::RunTimeout(deadline))?,
            None => self.run_once().await,
        }
    }

    async fn run_once(&self) -> Result<RunReport, MonitorError> {
        let config = &self.config;

        let mut table = self.lookup.read(&config.table_name).await?;
        let observations = self.nrql.fetch_observations(&config.index_query).await?;

        let outcome = reconcile(&mut table, &observations, &config.default_threshold);
        let mut table_written = false;
        if outcome.changed() {
            if config.auto_update {
                info!(
                    "Updating lookup table {} with newly found index thresholds...",
                    config.table_name
                );
                self.lookup.write(&config.table_name, &table).await?;
                table_written = !config.dry_run;
            } else {
                warn!(
                    discovered = outcome.discovered.len(),
                    "Auto update is disabled; lookup table {} left unchanged", config.table_name
                );
            }
        }

        let evaluation = evaluate(&table, &observations, now_millis())?;
        let batch = MetricBatch {
            common: CommonAttributes::from_config(config),
            metrics: evaluation.metrics,
        };

        info!("Sending metric data to New Relic");
        // a dry run accepts writes locally, so nothing actually left the process
        let published = self.publisher.publish(&batch).await? && !config.dry_run;
        debug!(table_written, published, "Run complete");

        Ok(RunReport {
            discovered: outcome.discovered,
            table_written,
            evaluated: evaluation.evaluated,
            breaching: evaluation.breaching,
            published,
        })
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}
