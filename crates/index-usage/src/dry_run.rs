// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::MonitorError;
use crate::transport::{RawResponse, RequestSpec, Transport};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Forwards read-only requests to the wrapped transport and answers mutating
/// ones locally with a synthetic `200`, so a run can be rehearsed against live
/// data without touching the table or the metric store.
pub struct DryRunTransport {
    inner: Arc<dyn Transport>,
}

impl DryRunTransport {
    pub fn new(inner: Arc<dyn Transport>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Transport for DryRunTransport {
    async fn execute(&self, request: RequestSpec) -> Result<RawResponse, MonitorError> {
        if !request.mutates {
            return self.inner.execute(request).await;
        }
        info!(
            method = %request.method,
            url = %request.url,
            body = request.body.as_deref().unwrap_or_default(),
            "dry run: request not sent"
        );
        Ok(RawResponse {
            status: 200,
            body: "{}".to_string(),
        })
    }
}
