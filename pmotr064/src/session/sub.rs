use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::SessionOptions;
use super::device::DeviceCore;
use super::root::RootLink;
use super::state::SessionState;
use crate::cache::StateCache;
use crate::channels::{ChannelBinding, ChannelTypeTable, discover_channels};
use crate::config_ext::SubDeviceConfig;
use crate::errors::{Result, Tr064Error};
use crate::events::SessionEventBus;
use crate::values::{Command, TypedValue};

const BRIDGE_OFFLINE: &str = "bridge offline";

struct SubInner {
    core: Arc<DeviceCore>,
    config: SubDeviceConfig,
    options: SessionOptions,
    table: Arc<ChannelTypeTable>,
    root: RootLink,
    initialized: AtomicBool,
}

/// Session of a sub-device (LAN, WAN, WLAN...) of a root device.
///
/// The session follows the root status: it goes offline as soon as the root
/// leaves [`SessionState::Online`] and resumes when the root comes back.
pub struct SubSession {
    inner: Arc<SubInner>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl SubSession {
    pub fn new(
        config: SubDeviceConfig,
        root: RootLink,
        table: Arc<ChannelTypeTable>,
        events: SessionEventBus,
        runtime: Handle,
        options: SessionOptions,
    ) -> Self {
        let core = Arc::new(DeviceCore::new(
            config.uuid.clone(),
            runtime,
            events,
            root.connector.clone(),
            StateCache::new(options.state_ttl),
        ));

        Self {
            inner: Arc::new(SubInner {
                core,
                config,
                options,
                table,
                root,
                initialized: AtomicBool::new(false),
            }),
            watcher: Mutex::new(None),
        }
    }

    /// Validate the configuration and start following the root status.
    pub fn start(&self) {
        let core = &self.inner.core;
        if core.is_disposed() {
            return;
        }
        if let Err(e) = self.inner.config.validate() {
            core.set_status(SessionState::OfflineConfigError(e.to_string()));
            return;
        }

        let inner = self.inner.clone();
        let mut parent = self.inner.root.status.clone();
        let task = core.runtime.spawn(async move {
            loop {
                let status = parent.borrow_and_update().clone();
                inner.on_parent_status(&status);
                if parent.changed().await.is_err() {
                    inner.on_parent_status(&SessionState::Disposed);
                    break;
                }
            }
        });

        let mut watcher = self.watcher.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = watcher.replace(task) {
            previous.abort();
        }
    }

    pub fn dispose(&self) {
        if let Some(task) = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        self.inner.initialized.store(false, Ordering::SeqCst);
        self.inner.core.dispose();
    }

    pub fn uuid(&self) -> &str {
        &self.inner.config.uuid
    }

    pub fn status(&self) -> SessionState {
        self.inner.core.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionState> {
        self.inner.core.subscribe_status()
    }

    pub fn channels(&self) -> Vec<ChannelBinding> {
        self.inner.core.channels()
    }

    pub fn link_channel(&self, channel_id: &str) {
        self.inner.core.link(channel_id);
    }

    pub fn unlink_channel(&self, channel_id: &str) {
        self.inner.core.unlink(channel_id);
    }

    /// Dispatch a host command.
    ///
    /// `Refresh` re-reads the channel and publishes it. Other commands are
    /// sent to the device unless the channel is read-only, in which case
    /// they are discarded. Returns the spawned dispatch, `None` if the
    /// command was dropped.
    pub fn handle_command(&self, channel_id: &str, command: Command) -> Option<JoinHandle<()>> {
        DeviceCore::dispatch_command(&self.inner.core, channel_id, command)
    }

    pub async fn read_channel(&self, channel_id: &str) -> Option<TypedValue> {
        let core = self.inner.core.clone();
        let id = channel_id.to_string();
        self.inner
            .core
            .runtime
            .spawn_blocking(move || core.read_channel(&id))
            .await
            .ok()
            .flatten()
    }
}

impl Drop for SubSession {
    fn drop(&mut self) {
        if let Some(task) = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        self.inner.core.retry_task.cancel();
        self.inner.core.stop_polling();
    }
}

impl SubInner {
    fn on_parent_status(self: &Arc<Self>, parent: &SessionState) {
        let core = &self.core;
        if core.is_disposed() {
            return;
        }

        if !parent.is_online() {
            core.retry_task.cancel();
            core.stop_polling();
            core.set_status(SessionState::OfflineCommunicationError(BRIDGE_OFFLINE.to_string()));
            return;
        }

        if self.initialized.load(Ordering::SeqCst) {
            DeviceCore::install_polling(core, self.config.refresh_interval());
            core.set_status(SessionState::Online);
            return;
        }

        core.set_status(SessionState::Connecting);
        let inner = self.clone();
        core.retry_task
            .reschedule(&core.runtime, self.options.retry_interval, move || {
                let inner = inner.clone();
                async move { inner.connect_tick().await }
            });
    }

    async fn connect_tick(self: Arc<Self>) -> ControlFlow<()> {
        let worker = self.clone();
        let outcome = self
            .core
            .runtime
            .spawn_blocking(move || worker.connect())
            .await;

        if self.core.is_disposed() {
            return ControlFlow::Break(());
        }

        match outcome {
            Ok(Ok(())) => {
                self.initialized.store(true, Ordering::SeqCst);
                if !self.root.status().is_online() {
                    debug!("Root went offline while {} was connecting", self.config.uuid);
                    return ControlFlow::Break(());
                }
                DeviceCore::install_polling(&self.core, self.config.refresh_interval());
                self.core.set_status(SessionState::Online);
                ControlFlow::Break(())
            }
            Ok(Err(e)) => {
                self.core
                    .set_status(SessionState::OfflineCommunicationError(e.to_string()));
                ControlFlow::Continue(())
            }
            Err(e) => {
                warn!("Connection attempt aborted: {}", e);
                ControlFlow::Continue(())
            }
        }
    }

    /// One connection attempt. Blocking.
    fn connect(&self) -> Result<()> {
        let catalog = self
            .root
            .catalog
            .load_full()
            .ok_or_else(|| Tr064Error::communication("Could not get device definitions"))?;
        let device = catalog.get_device(&self.config.uuid).ok_or_else(|| {
            Tr064Error::communication(format!(
                "Failed to update device properties: Could not find device {}",
                self.config.uuid
            ))
        })?;

        let mut properties = BTreeMap::new();
        properties.insert("deviceType".to_string(), device.device_type.clone());
        self.core.publish_properties(properties);

        let discovered = discover_channels(
            device,
            &catalog,
            &self.table,
            &self.config.discovery_options(),
        );
        self.core.apply_channels(discovered);
        Ok(())
    }
}
