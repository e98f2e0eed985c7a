// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Single-attempt HTTP plumbing shared by every remote client.
//!
//! [`Transport`] is the injection seam: it only moves bytes. [`ServiceCaller`]
//! layers the common call contract on top of any transport: a default timeout,
//! validation against a set of acceptable status codes, and an inline success
//! callback used by callers to parse the body. There are no retries.

use crate::config::Config;
use crate::error::MonitorError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Description of one outgoing request.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<String>,
    /// Falls back to the caller's default when unset
    pub timeout: Option<Duration>,
    /// Whether the request changes remote state (table overwrite, metric ingest)
    pub mutates: bool,
}

impl RequestSpec {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
            mutates: false,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Result<Self, MonitorError> {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| MonitorError::InvalidConfig(format!("invalid header name '{name}'")))?;
        let header_value = HeaderValue::from_str(value).map_err(|_| {
            MonitorError::InvalidConfig(format!("invalid value for header '{name}'"))
        })?;
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn mutating(mut self) -> Self {
        self.mutates = true;
        self
    }
}

/// What came back from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// The set of status codes a call accepts as success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedStatus(Vec<u16>);

impl ExpectedStatus {
    pub fn contains(&self, status: u16) -> bool {
        self.0.contains(&status)
    }

    pub fn codes(&self) -> &[u16] {
        &self.0
    }
}

impl From<u16> for ExpectedStatus {
    fn from(code: u16) -> Self {
        ExpectedStatus(vec![code])
    }
}

impl<const N: usize> From<[u16; N]> for ExpectedStatus {
    fn from(codes: [u16; N]) -> Self {
        ExpectedStatus(codes.to_vec())
    }
}

impl From<&[u16]> for ExpectedStatus {
    fn from(codes: &[u16]) -> Self {
        ExpectedStatus(codes.to_vec())
    }
}

impl fmt::Display for ExpectedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Moves one request over the wire.
///
/// Implementations must map every failure to receive a response (connection
/// refused, DNS, timeout) to [`MonitorError::Connection`] and must not judge
/// status codes.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: RequestSpec) -> Result<RawResponse, MonitorError>;
}

/// Upper bound on establishing a connection, capped by the request timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const USER_AGENT: &str = concat!("index-usage/", env!("CARGO_PKG_VERSION"));

/// Live transport backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Builds the shared client. The configured request timeout is the
    /// client-wide default; a per-request timeout still takes precedence.
    pub fn new(config: &Config) -> Result<Self, MonitorError> {
        let client = tls_client_builder()?
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT.min(config.request_timeout))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| MonitorError::ClientBuild(e.to_string()))?;
        debug!(timeout = ?config.request_timeout, "HTTP client ready");
        Ok(Self { client })
    }
}

#[cfg(not(feature = "fips"))]
fn tls_client_builder() -> Result<reqwest::ClientBuilder, MonitorError> {
    Ok(reqwest::Client::builder().use_rustls_tls())
}

/// Rustls on the process-wide FIPS provider, trusting the native roots.
#[cfg(feature = "fips")]
fn tls_client_builder() -> Result<reqwest::ClientBuilder, MonitorError> {
    let fips_error =
        |reason: &str| MonitorError::ClientBuild(format!("FIPS TLS setup failed: {reason}"));

    let provider = rustls::crypto::CryptoProvider::get_default()
        .filter(|provider| provider.fips())
        .ok_or_else(|| fips_error("no FIPS crypto provider installed"))?;

    let mut roots = rustls::RootCertStore::empty();
    let (added, ignored) =
        roots.add_parsable_certificates(rustls_native_certs::load_native_certs().certs);
    if added == 0 {
        return Err(fips_error("native root store has no usable certificates"));
    }
    if ignored > 0 {
        debug!(ignored, "Skipped unparsable native root certificates");
    }

    let tls = rustls::ClientConfig::builder_with_provider(Arc::clone(provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| fips_error(&e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    if !tls.fips() {
        return Err(fips_error("client configuration is not FIPS compliant"));
    }
    Ok(reqwest::Client::builder().use_preconfigured_tls(tls))
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: RequestSpec) -> Result<RawResponse, MonitorError> {
        let url = request.url;
        let mut builder = self
            .client
            .request(request.method, url.as_str())
            .headers(request.headers);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| MonitorError::Connection {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| MonitorError::Connection {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        Ok(RawResponse { status, body })
    }
}

/// Applies the shared call contract on top of an injected [`Transport`].
#[derive(Clone)]
pub struct ServiceCaller {
    transport: Arc<dyn Transport>,
    default_timeout: Duration,
}

impl ServiceCaller {
    pub fn new(transport: Arc<dyn Transport>, default_timeout: Duration) -> Self {
        Self {
            transport,
            default_timeout,
        }
    }

    /// Sends `request` once and hands the body to `on_success` when the status
    /// is one of `expected`.
    pub async fn call<T, F>(
        &self,
        expected: impl Into<ExpectedStatus>,
        mut request: RequestSpec,
        on_success: F,
    ) -> Result<T, MonitorError>
    where
        F: FnOnce(&str, &RawResponse) -> Result<T, MonitorError>,
    {
        let expected = expected.into();
        if request.timeout.is_none() {
            request.timeout = Some(self.default_timeout);
        }
        let url = request.url.clone();
        debug!(method = %request.method, url = %url, "sending request");

        let response = match self.transport.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                error!("Error: Connection error on url '{url}'");
                return Err(e);
            }
        };

        if !expected.contains(response.status) {
            debug!(
                url = %url,
                status = response.status,
                body = %response.body,
                "unexpected response status"
            );
            return Err(MonitorError::UnexpectedStatus {
                url,
                expected: expected.codes().to_vec(),
                actual: response.status,
            });
        }

        on_success(&response.body, &response)
    }
}
