//! SOAP plumbing: envelopes, digest authentication and the connector.

pub mod auth;
pub mod builder;
pub mod connector;
pub mod envelope;

pub use auth::{AuthStore, Credentials};
pub use builder::{build_soap_request, soap_action_header};
pub use connector::{DEFAULT_SOAP_TIMEOUT, SoapConnector};
pub use envelope::{SoapEnvelope, SoapFault, SoapParseError, parse_soap_envelope};
