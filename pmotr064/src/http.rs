//! HTTP seam shared by the description catalog and the SOAP connector.
//!
//! Everything that talks to the device goes through [`HttpTransport`], so the
//! catalog and the connector can be driven by an in-memory transport in tests.

use std::time::Duration;

use tracing::trace;
use ureq::Agent;

use crate::errors::{Result, Tr064Error};

/// Raw HTTP response as seen by the core.
///
/// Header names are stored lower-cased.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking HTTP client used for description downloads and SOAP calls.
///
/// Implementations must not treat 4xx/5xx statuses as errors: a SOAP fault
/// arrives as an HTTP 500 with a body we still need to read, and a 401 drives
/// the digest authentication retry.
pub trait HttpTransport: Send + Sync {
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse>;

    fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &str,
        timeout: Duration,
    ) -> Result<HttpResponse>;
}

/// [`HttpTransport`] backed by ureq.
///
/// The device serves its https port with a self-signed certificate, so
/// certificate verification is disabled.
#[derive(Debug, Clone, Default)]
pub struct UreqTransport;

impl UreqTransport {
    pub fn new() -> Self {
        Self
    }

    fn agent(timeout: Duration) -> Agent {
        let config = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .tls_config(
                ureq::tls::TlsConfig::builder()
                    .disable_verification(true)
                    .build(),
            )
            .build();
        config.into()
    }

    fn into_response(
        url: &str,
        mut response: ureq::http::Response<ureq::Body>,
    ) -> Result<HttpResponse> {
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.body_mut().read_to_string().map_err(|e| {
            Tr064Error::communication(format!("failed to read body from {url}: {e}"))
        })?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

impl HttpTransport for UreqTransport {
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse> {
        trace!("GET {}", url);
        let response = Self::agent(timeout)
            .get(url)
            .call()
            .map_err(|e| Tr064Error::communication(format!("GET {url} failed: {e}")))?;
        Self::into_response(url, response)
    }

    fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &str,
        timeout: Duration,
    ) -> Result<HttpResponse> {
        trace!("POST {}", url);
        let mut request = Self::agent(timeout).post(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request
            .send(body)
            .map_err(|e| Tr064Error::communication(format!("POST {url} failed: {e}")))?;
        Self::into_response(url, response)
    }
}
