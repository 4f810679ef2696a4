use std::fmt;

/// Externally visible status of a root or sub-device session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Unconnected,
    Connecting,
    Online,
    OfflineCommunicationError(String),
    OfflineConfigError(String),
    /// Terminal: the session was disposed.
    Disposed,
}

impl SessionState {
    pub fn is_online(&self) -> bool {
        matches!(self, SessionState::Online)
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self, SessionState::Disposed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Unconnected => write!(f, "UNCONNECTED"),
            SessionState::Connecting => write!(f, "CONNECTING"),
            SessionState::Online => write!(f, "ONLINE"),
            SessionState::OfflineCommunicationError(detail) => {
                write!(f, "OFFLINE (COMMUNICATION_ERROR): {}", detail)
            }
            SessionState::OfflineConfigError(detail) => {
                write!(f, "OFFLINE (CONFIGURATION_ERROR): {}", detail)
            }
            SessionState::Disposed => write!(f, "DISPOSED"),
        }
    }
}
