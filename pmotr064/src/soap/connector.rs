//! Serialized SOAP request/response exchange with one device.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, trace};

use crate::errors::{Result, Tr064Error};
use crate::http::{HttpResponse, HttpTransport};
use crate::scpd::Service;

use super::auth::{AuthStore, Credentials};
use super::builder::{build_soap_request, soap_action_header};
use super::envelope::{SoapEnvelope, parse_soap_envelope};

/// Timeout applied to ordinary SOAP calls.
pub const DEFAULT_SOAP_TIMEOUT: Duration = Duration::from_millis(2000);

/// SOAP client bound to one endpoint base URL and one credential store.
///
/// All calls on a connector are serialized: the credential store lock is
/// held for the whole exchange, including the authentication retry.
pub struct SoapConnector {
    endpoint_base_url: String,
    transport: Arc<dyn HttpTransport>,
    auth: Mutex<AuthStore>,
}

impl std::fmt::Debug for SoapConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoapConnector")
            .field("endpoint_base_url", &self.endpoint_base_url)
            .finish_non_exhaustive()
    }
}

impl SoapConnector {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        endpoint_base_url: impl Into<String>,
        credentials: Option<Credentials>,
    ) -> Self {
        Self {
            endpoint_base_url: endpoint_base_url.into().trim_end_matches('/').to_string(),
            transport,
            auth: Mutex::new(AuthStore::new(credentials)),
        }
    }

    pub fn endpoint_base_url(&self) -> &str {
        &self.endpoint_base_url
    }

    /// Invoke `action` on `service` and return the parsed response.
    ///
    /// A 401 clears the cached challenge and the request is retried once with
    /// the challenge of the rejection. Any status with a SOAP fault in the
    /// body becomes [`Tr064Error::SoapFault`]; transport failures and
    /// unparsable bodies become [`Tr064Error::Communication`].
    pub fn call(
        &self,
        service: &Service,
        action: &str,
        arguments: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<SoapEnvelope> {
        let mut auth = self.auth.lock().unwrap_or_else(PoisonError::into_inner);

        let url = format!("{}{}", self.endpoint_base_url, service.control_url);
        let body = build_soap_request(&service.service_type, action, arguments)
            .map_err(|e| Tr064Error::communication(format!("Failed to build request: {}", e)))?;
        let soap_action = soap_action_header(&service.service_type, action);

        trace!("Request: {}", body);
        let mut response = self.send(&mut auth, &url, &service.control_url, &soap_action, &body, timeout)?;

        if response.status == 401 {
            trace!("Re-Auth needed.");
            auth.clear();
            if let Some(challenge) = response.header("www-authenticate") {
                auth.accept_challenge(challenge);
            }
            response = self.send(&mut auth, &url, &service.control_url, &soap_action, &body, timeout)?;
            if response.status == 401 {
                auth.clear();
                return Err(Tr064Error::communication(format!(
                    "Authentication rejected for {}",
                    soap_action
                )));
            }
        }

        trace!("Received response: {}", response.body);
        let envelope = parse_soap_envelope(response.body.as_bytes()).map_err(|e| {
            Tr064Error::communication(format!(
                "HTTP-Response-Code {}, unreadable body: {}",
                response.status, e
            ))
        })?;

        if let Some(fault) = envelope.fault() {
            debug!(
                action = %soap_action,
                code = %fault.error_code,
                "Device answered with a SOAP fault"
            );
            return Err(Tr064Error::SoapFault {
                status: response.status,
                code: fault.error_code,
                description: fault.error_description,
            });
        }

        Ok(envelope)
    }

    fn send(
        &self,
        auth: &mut AuthStore,
        url: &str,
        uri: &str,
        soap_action: &str,
        body: &str,
        timeout: Duration,
    ) -> Result<HttpResponse> {
        let mut headers = vec![
            (
                "Content-Type".to_string(),
                "text/xml; charset=\"utf-8\"".to_string(),
            ),
            ("SOAPAction".to_string(), soap_action.to_string()),
        ];
        if let Some(authorization) = auth.authorization("POST", uri) {
            headers.push(("Authorization".to_string(), authorization));
        }

        self.transport.post(url, &headers, body, timeout)
    }
}
