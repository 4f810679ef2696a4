//! Channel state handling shared by root and sub-device sessions.

use std::collections::{BTreeMap, HashSet};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use super::handle::ConnectorHandle;
use super::state::SessionState;
use super::timer::TaskSlot;
use crate::cache::{Populated, StateCache};
use crate::channels::{ChannelBinding, ChannelRegistry};
use crate::errors::{Result, Tr064Error};
use crate::events::{SessionEvent, SessionEventBus};
use crate::soap::DEFAULT_SOAP_TIMEOUT;
use crate::values::{Command, TypedValue, from_wire_value, parse_wire_literal, to_wire_value};

/// State, channels and timers of one device session.
pub(crate) struct DeviceCore {
    pub(crate) device: String,
    pub(crate) runtime: Handle,
    pub(crate) events: SessionEventBus,
    pub(crate) connector: ConnectorHandle,
    pub(crate) cache: StateCache,
    pub(crate) retry_task: TaskSlot,
    poll_task: TaskSlot,
    registry: RwLock<ChannelRegistry>,
    linked: RwLock<HashSet<String>>,
    status: watch::Sender<SessionState>,
    disposed: AtomicBool,
    poll_generation: AtomicU64,
}

impl DeviceCore {
    pub(crate) fn new(
        device: String,
        runtime: Handle,
        events: SessionEventBus,
        connector: ConnectorHandle,
        cache: StateCache,
    ) -> Self {
        let (status, _) = watch::channel(SessionState::Unconnected);
        Self {
            device,
            runtime,
            events,
            connector,
            cache,
            retry_task: TaskSlot::new("connect"),
            poll_task: TaskSlot::new("poll"),
            registry: RwLock::new(ChannelRegistry::new()),
            linked: RwLock::new(HashSet::new()),
            status,
            disposed: AtomicBool::new(false),
            poll_generation: AtomicU64::new(0),
        }
    }

    pub(crate) fn status(&self) -> SessionState {
        self.status.borrow().clone()
    }

    pub(crate) fn subscribe_status(&self) -> watch::Receiver<SessionState> {
        self.status.subscribe()
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Publish a new status. Ignored once the session is disposed.
    pub(crate) fn set_status(&self, status: SessionState) {
        if self.is_disposed() && !status.is_disposed() {
            return;
        }
        let changed = self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status.clone();
                true
            }
        });
        if changed {
            debug!(device = %self.device, "Status changed to {}", status);
            self.events.broadcast(SessionEvent::StatusChanged {
                device: self.device.clone(),
                status,
            });
        }
    }

    /// Cancel every timer, drop cached values and enter the terminal state.
    pub(crate) fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.retry_task.cancel();
        self.stop_polling();
        self.cache.clear();
        self.events.broadcast(SessionEvent::DescriptionsReleased {
            device: self.device.clone(),
        });
        self.set_status(SessionState::Disposed);
    }

    pub(crate) fn publish_properties(&self, properties: BTreeMap<String, String>) {
        if self.is_disposed() {
            return;
        }
        self.events.broadcast(SessionEvent::PropertiesUpdated {
            device: self.device.clone(),
            properties,
        });
    }

    /// Install freshly discovered channels and report the difference.
    pub(crate) fn apply_channels(&self, discovered: Vec<ChannelBinding>) {
        if self.is_disposed() {
            return;
        }
        let diff = self
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(discovered);

        for removed in &diff.removed {
            self.cache.invalidate(removed);
        }
        if !diff.removed.is_empty() {
            debug!(device = %self.device, "Removing {} channels", diff.removed.len());
            self.events.broadcast(SessionEvent::ChannelsRemoved {
                device: self.device.clone(),
                channel_ids: diff.removed,
            });
        }
        if !diff.added.is_empty() {
            debug!(device = %self.device, "Adding {} channels", diff.added.len());
            self.events.broadcast(SessionEvent::ChannelsAdded {
                device: self.device.clone(),
                channels: diff.added,
            });
        }
    }

    pub(crate) fn channels(&self) -> Vec<ChannelBinding> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub(crate) fn binding(&self, channel_id: &str) -> Option<ChannelBinding> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel_id)
            .cloned()
    }

    pub(crate) fn link(&self, channel_id: &str) {
        self.linked
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel_id.to_string());
        debug!("Channel {} linked", channel_id);
    }

    pub(crate) fn unlink(&self, channel_id: &str) {
        self.linked
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(channel_id);
        debug!("Channel {} unlinked", channel_id);
    }

    pub(crate) fn is_linked(&self, channel_id: &str) -> bool {
        self.linked
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(channel_id)
    }

    fn publish_state(&self, channel_id: &str, value: TypedValue) {
        if self.is_disposed() {
            return;
        }
        self.events.broadcast(SessionEvent::StateUpdated {
            device: self.device.clone(),
            channel_id: channel_id.to_string(),
            value,
        });
    }

    /// Fetch the value of `binding` from the device, along with the values
    /// of the channels answered by the same call. Blocking.
    pub(crate) fn fetch_channel_state(&self, binding: &ChannelBinding) -> Populated {
        let Some(get_action) = &binding.get_action else {
            return Populated::single(TypedValue::default_for(&binding.data_type));
        };

        match self.try_fetch_channel_state(binding, &get_action.name) {
            Ok(populated) => populated,
            Err(e) => {
                info!("Failed to get {}: {}", binding.channel_id, e);
                Populated::single(TypedValue::Undefined)
            }
        }
    }

    fn try_fetch_channel_state(&self, binding: &ChannelBinding, action: &str) -> Result<Populated> {
        let mut arguments = BTreeMap::new();
        if let Some(parameter) = binding.parameter.as_ref().filter(|p| !p.internal_only) {
            arguments.insert(parameter.name.clone(), parameter.value.clone());
        }

        let response = self.connector.load().call(
            &binding.service,
            action,
            &arguments,
            DEFAULT_SOAP_TIMEOUT,
        )?;

        let siblings = {
            let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
            registry
                .siblings_of(binding)
                .filter_map(|sibling| {
                    let argument = sibling.get_action.as_ref()?.argument_name()?;
                    from_wire_value(&response, argument, &sibling.data_type, sibling.units)
                        .map(|value| (sibling.channel_id.clone(), value))
                })
                .collect::<Vec<_>>()
        };
        trace!(
            "{} also answered {} sibling channels",
            binding.channel_id,
            siblings.len()
        );

        let argument = binding
            .get_action
            .as_ref()
            .and_then(|a| a.argument_name())
            .unwrap_or_default();
        let value = from_wire_value(&response, argument, &binding.data_type, binding.units)
            .ok_or_else(|| Tr064Error::conversion(format!("failed to transform '{}'", argument)))?;

        Ok(Populated { value, siblings })
    }

    /// Cached value of a channel, fetched on a miss. Blocking.
    pub(crate) fn read_channel(&self, channel_id: &str) -> Option<TypedValue> {
        let binding = self.binding(channel_id)?;
        Some(
            self.cache
                .get_or_populate(channel_id, || self.fetch_channel_state(&binding)),
        )
    }

    /// Force a fetch of one channel and publish it. Blocking.
    pub(crate) fn refresh_channel(&self, channel_id: &str) {
        self.cache.invalidate(channel_id);
        if let Some(value) = self.read_channel(channel_id) {
            self.publish_state(channel_id, value);
        }
    }

    /// Read and publish every linked channel. Blocking.
    ///
    /// Stops between two channels once `generation` is no longer the
    /// current poll generation.
    pub(crate) fn poll(&self, generation: u64) {
        for binding in self.channels() {
            if self.is_disposed() || !self.is_polling(generation) {
                trace!(device = %self.device, "Poll interrupted");
                return;
            }
            if !self.is_linked(&binding.channel_id) {
                continue;
            }
            let value = self
                .cache
                .get_or_populate(&binding.channel_id, || self.fetch_channel_state(&binding));
            self.publish_state(&binding.channel_id, value);
        }
    }

    fn is_polling(&self, generation: u64) -> bool {
        self.poll_generation.load(Ordering::SeqCst) == generation
    }

    /// (Re)start the poll loop with the given interval.
    pub(crate) fn install_polling(core: &Arc<Self>, interval: Duration) {
        let generation = core.poll_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let poller = core.clone();
        core.poll_task.reschedule(&core.runtime, interval, move || {
            let core = poller.clone();
            async move {
                let worker = core.clone();
                if let Err(e) = core
                    .runtime
                    .spawn_blocking(move || worker.poll(generation))
                    .await
                {
                    warn!("Poll of {} aborted: {}", core.device, e);
                }
                if core.is_disposed() || !core.is_polling(generation) {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }
        });
    }

    /// Cancel the poll loop. A poll already running stops before its next
    /// channel.
    pub(crate) fn stop_polling(&self) {
        self.poll_generation.fetch_add(1, Ordering::SeqCst);
        self.poll_task.cancel();
    }

    /// Convert and send a write command. Blocking.
    pub(crate) fn send_command(&self, binding: &ChannelBinding, command: &Command) {
        let Some(set_action) = &binding.set_action else {
            return;
        };
        let Some(value) = to_wire_value(command, &binding.data_type, binding.units) else {
            info!("Could not convert {} to SOAP value", command);
            return;
        };

        debug!(
            "Sending {} as {} to {}/{}",
            command, value, binding.service.service_id, set_action.name
        );

        let mut arguments = BTreeMap::new();
        if let Some(argument) = set_action.argument_name() {
            arguments.insert(argument.to_string(), value.clone());
        }
        if let Some(parameter) = binding.parameter.as_ref().filter(|p| !p.internal_only) {
            arguments.insert(parameter.name.clone(), parameter.value.clone());
        }

        match self.connector.load().call(
            &binding.service,
            &set_action.name,
            &arguments,
            DEFAULT_SOAP_TIMEOUT,
        ) {
            Ok(_) => {
                if self.is_disposed() {
                    return;
                }
                if let Some(state) = parse_wire_literal(&value, &binding.data_type, binding.units) {
                    self.cache.insert(&binding.channel_id, state);
                }
            }
            Err(e) => warn!("Could not send command {}: {}", command, e),
        }
    }

    /// Dispatch a host command for `channel_id`.
    ///
    /// Returns the handle of the spawned dispatch, or `None` when the
    /// command is dropped.
    pub(crate) fn dispatch_command(
        core: &Arc<Self>,
        channel_id: &str,
        command: Command,
    ) -> Option<tokio::task::JoinHandle<()>> {
        if core.is_disposed() {
            return None;
        }
        let Some(binding) = core.binding(channel_id) else {
            trace!("Channel {} not supported.", channel_id);
            return None;
        };

        let worker = core.clone();
        if command == Command::Refresh {
            let id = channel_id.to_string();
            return Some(core.runtime.spawn_blocking(move || worker.refresh_channel(&id)));
        }

        if !binding.is_writable() {
            debug!("Discarding command {} to {}, read-only channel", command, channel_id);
            return None;
        }

        Some(
            core.runtime
                .spawn_blocking(move || worker.send_command(&binding, &command)),
        )
    }
}
