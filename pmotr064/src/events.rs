//! Notifications from sessions to the host.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::channels::ChannelBinding;
use crate::session::SessionState;
use crate::values::TypedValue;

/// Event emitted by a session. `device` is the device uuid, empty for the
/// root device.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StatusChanged {
        device: String,
        status: SessionState,
    },
    StateUpdated {
        device: String,
        channel_id: String,
        value: TypedValue,
    },
    ChannelsAdded {
        device: String,
        channels: Vec<ChannelBinding>,
    },
    ChannelsRemoved {
        device: String,
        channel_ids: Vec<String>,
    },
    PropertiesUpdated {
        device: String,
        properties: BTreeMap<String, String>,
    },
    /// Per-session channel descriptions must be dropped by the host.
    DescriptionsReleased { device: String },
}

impl SessionEvent {
    pub fn device(&self) -> &str {
        match self {
            SessionEvent::StatusChanged { device, .. }
            | SessionEvent::StateUpdated { device, .. }
            | SessionEvent::ChannelsAdded { device, .. }
            | SessionEvent::ChannelsRemoved { device, .. }
            | SessionEvent::PropertiesUpdated { device, .. }
            | SessionEvent::DescriptionsReleased { device } => device,
        }
    }
}

/// Fan-out of session events to any number of subscribers.
#[derive(Clone, Default)]
pub struct SessionEventBus {
    subscribers: Arc<Mutex<Vec<Sender<SessionEvent>>>>,
}

impl SessionEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        let (tx, rx) = unbounded::<SessionEvent>();
        {
            let mut subscribers = self
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            subscribers.push(tx);
        }
        rx
    }

    pub(crate) fn broadcast(&self, event: SessionEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
