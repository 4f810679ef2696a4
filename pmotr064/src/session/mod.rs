//! Device sessions: connection lifecycle, polling and command dispatch.
//!
//! A [`RootSession`] owns the capability catalog and the connector of a
//! FRITZ!Box. [`SubSession`]s reach their sub-device through a [`RootLink`]
//! and follow the root's status.

mod device;
mod handle;
mod root;
mod state;
mod sub;
pub mod timer;

use std::time::Duration;

pub use handle::ConnectorHandle;
pub use root::{DEVICE_INFO_SERVICE_ID, RootLink, RootSession};
pub use state::SessionState;
pub use sub::SubSession;

use crate::cache::DEFAULT_STATE_TTL;

/// Delay between two connection attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(60);

/// Scheduling parameters shared by all sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub retry_interval: Duration,
    pub state_ttl: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            retry_interval: DEFAULT_RETRY_INTERVAL,
            state_ttl: DEFAULT_STATE_TTL,
        }
    }
}
