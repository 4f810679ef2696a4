use thiserror::Error;

/// Errors raised by the TR-064 core.
///
/// The variants follow the way a failure is handled by a session:
/// communication-class failures are retried by the connect/poll loops,
/// configuration failures halt the session until it is reconfigured and
/// conversion failures only affect the channel operation that raised them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Tr064Error {
    #[error("Device description unavailable: {0}")]
    DescriptionUnavailable(String),
    #[error("Communication error: {0}")]
    Communication(String),
    #[error("HTTP-Response-Code {status}, SOAP-Fault: {code} ({description})")]
    SoapFault {
        status: u16,
        code: String,
        description: String,
    },
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Conversion error: {0}")]
    Conversion(String),
}

impl Tr064Error {
    pub fn communication(message: impl Into<String>) -> Self {
        Tr064Error::Communication(message.into())
    }

    pub fn description_unavailable(message: impl Into<String>) -> Self {
        Tr064Error::DescriptionUnavailable(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Tr064Error::Configuration(message.into())
    }

    pub fn conversion(message: impl Into<String>) -> Self {
        Tr064Error::Conversion(message.into())
    }

    /// True for every failure a session reports as a communication error.
    ///
    /// An unreachable or unparsable description document counts as one:
    /// the device is expected to come back, the configuration is fine.
    pub fn is_communication(&self) -> bool {
        matches!(
            self,
            Tr064Error::Communication(_)
                | Tr064Error::SoapFault { .. }
                | Tr064Error::DescriptionUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Tr064Error>;
