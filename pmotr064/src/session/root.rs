use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::SessionOptions;
use super::device::DeviceCore;
use super::handle::ConnectorHandle;
use super::state::SessionState;
use crate::cache::StateCache;
use crate::channels::{ChannelBinding, ChannelTypeTable, discover_channels};
use crate::config_ext::RootDeviceConfig;
use crate::errors::{Result, Tr064Error};
use crate::events::SessionEventBus;
use crate::http::HttpTransport;
use crate::scpd::{CapabilityCatalog, Device};
use crate::soap::SoapConnector;
use crate::values::{Command, TypedValue};

pub const DEVICE_INFO_SERVICE_ID: &str = "urn:DeviceInfo-com:serviceId:DeviceInfo1";

const DEFAULT_PORT: u16 = 49000;
const SECURITY_PORT_TIMEOUT: Duration = Duration::from_millis(1000);
const GET_INFO_TIMEOUT: Duration = Duration::from_millis(5000);
const PROPERTY_ARGUMENTS: [&str; 3] = ["NewSerialNumber", "NewSoftwareVersion", "NewModelName"];

fn http_base_url(host: &str) -> String {
    format!("http://{}:{}", host, DEFAULT_PORT)
}

/// What a sub-device session needs from its root, without owning it.
#[derive(Clone)]
pub struct RootLink {
    pub(crate) status: watch::Receiver<SessionState>,
    pub(crate) catalog: Arc<ArcSwapOption<CapabilityCatalog>>,
    pub(crate) connector: ConnectorHandle,
}

impl RootLink {
    pub fn status(&self) -> SessionState {
        self.status.borrow().clone()
    }
}

struct RootInner {
    core: Arc<DeviceCore>,
    config: RwLock<RootDeviceConfig>,
    options: SessionOptions,
    transport: Arc<dyn HttpTransport>,
    table: Arc<ChannelTypeTable>,
    catalog: Arc<ArcSwapOption<CapabilityCatalog>>,
}

/// Session of a root device.
pub struct RootSession {
    inner: Arc<RootInner>,
}

impl RootSession {
    pub fn new(
        config: RootDeviceConfig,
        transport: Arc<dyn HttpTransport>,
        table: Arc<ChannelTypeTable>,
        events: SessionEventBus,
        runtime: Handle,
        options: SessionOptions,
    ) -> Self {
        let connector = ConnectorHandle::new(SoapConnector::new(
            transport.clone(),
            http_base_url(&config.host),
            Some(config.credentials()),
        ));
        let core = Arc::new(DeviceCore::new(
            String::new(),
            runtime,
            events,
            connector,
            StateCache::new(options.state_ttl),
        ));

        Self {
            inner: Arc::new(RootInner {
                core,
                config: RwLock::new(config),
                options,
                transport,
                table,
                catalog: Arc::new(ArcSwapOption::empty()),
            }),
        }
    }

    /// Validate the configuration and start connecting.
    ///
    /// An invalid configuration leaves the session in
    /// [`SessionState::OfflineConfigError`] without any retry.
    pub fn start(&self) {
        let core = &self.inner.core;
        if core.is_disposed() {
            return;
        }
        if let Err(e) = self.inner.config().validate() {
            core.set_status(SessionState::OfflineConfigError(e.to_string()));
            return;
        }

        core.set_status(SessionState::Connecting);
        let inner = self.inner.clone();
        core.retry_task
            .reschedule(&core.runtime, self.inner.options.retry_interval, move || {
                let inner = inner.clone();
                async move { inner.connect_tick().await }
            });
    }

    /// Drop the current connection state and connect again.
    pub fn restart(&self) {
        let core = &self.inner.core;
        core.stop_polling();
        core.cache.clear();
        self.start();
    }

    /// Apply a new configuration and connect again with it.
    ///
    /// Channels that the new configuration no longer produces are removed
    /// on the next successful connection.
    pub fn reconfigure(&self, config: RootDeviceConfig) {
        if self.inner.core.is_disposed() {
            return;
        }
        self.inner.core.connector.replace(SoapConnector::new(
            self.inner.transport.clone(),
            http_base_url(&config.host),
            Some(config.credentials()),
        ));
        *self
            .inner
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner) = config;
        self.restart();
    }

    pub fn dispose(&self) {
        self.inner.core.dispose();
        self.inner.catalog.store(None);
    }

    pub fn status(&self) -> SessionState {
        self.inner.core.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionState> {
        self.inner.core.subscribe_status()
    }

    /// Handle for sub-device sessions of this root.
    pub fn link(&self) -> RootLink {
        RootLink {
            status: self.inner.core.subscribe_status(),
            catalog: self.inner.catalog.clone(),
            connector: self.inner.core.connector.clone(),
        }
    }

    pub fn connector(&self) -> ConnectorHandle {
        self.inner.core.connector.clone()
    }

    pub fn catalog(&self) -> Option<Arc<CapabilityCatalog>> {
        self.inner.catalog.load_full()
    }

    /// Sub-devices of the connected device, depth-first.
    pub fn get_all_sub_devices(&self) -> Vec<Device> {
        self.catalog()
            .map(|catalog| catalog.get_all_sub_devices().into_iter().cloned().collect())
            .unwrap_or_default()
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

    /// Dispatch a host command. See [`SubSession::handle_command`].
    ///
    /// [`SubSession::handle_command`]: super::SubSession::handle_command
    pub fn handle_command(&self, channel_id: &str, command: Command) -> Option<JoinHandle<()>> {
        DeviceCore::dispatch_command(&self.inner.core, channel_id, command)
    }

    /// Value of a channel, from the cache or the device.
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

impl Drop for RootSession {
    fn drop(&mut self) {
        self.inner.core.retry_task.cancel();
        self.inner.core.stop_polling();
    }
}

impl RootInner {
    fn config(&self) -> RootDeviceConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
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
                DeviceCore::install_polling(&self.core, self.config().refresh_interval());
                self.core.set_status(SessionState::Online);
                ControlFlow::Break(())
            }
            Ok(Err(e)) if e.is_communication() => {
                self.core
                    .set_status(SessionState::OfflineCommunicationError(e.to_string()));
                ControlFlow::Continue(())
            }
            Ok(Err(e)) => {
                self.core
                    .set_status(SessionState::OfflineConfigError(e.to_string()));
                ControlFlow::Break(())
            }
            Err(e) => {
                warn!("Connection attempt aborted: {}", e);
                ControlFlow::Continue(())
            }
        }
    }

    /// One connection attempt. Blocking.
    fn connect(&self) -> Result<()> {
        let config = self.config();
        let base_url = http_base_url(&config.host);
        let catalog = CapabilityCatalog::load(self.transport.clone(), &base_url).map_err(|e| {
            info!("{}", e);
            Tr064Error::description_unavailable(format!(
                "could not get device definitions from {}",
                config.host
            ))
        })?;
        let catalog = Arc::new(catalog);

        self.establish_secure_connection_and_update_properties(&config, &catalog)?;

        if self.core.is_disposed() {
            return Ok(());
        }
        self.catalog.store(Some(catalog.clone()));
        // dispose may have run between the check and the store
        if self.core.is_disposed() {
            self.catalog.store(None);
            return Ok(());
        }

        let discovered = discover_channels(
            catalog.root_device(),
            &catalog,
            &self.table,
            &config.discovery_options(),
        );
        self.core.apply_channels(discovered);
        Ok(())
    }

    fn establish_secure_connection_and_update_properties(
        &self,
        config: &RootDeviceConfig,
        catalog: &CapabilityCatalog,
    ) -> Result<()> {
        let device = catalog.root_device();
        let service = device.find_service(DEVICE_INFO_SERVICE_ID).ok_or_else(|| {
            Tr064Error::communication(format!("service '{}' not found", DEVICE_INFO_SERVICE_ID))
        })?;

        let base_url = match self.core.connector.load().call(
            service,
            "GetSecurityPort",
            &BTreeMap::new(),
            SECURITY_PORT_TIMEOUT,
        ) {
            Ok(response) => match response
                .value("NewSecurityPort")
                .and_then(|port| port.trim().parse::<u16>().ok())
            {
                Some(port) => format!("https://{}:{}", config.host, port),
                None => {
                    warn!("Could not determine secure port, disabling https");
                    http_base_url(&config.host)
                }
            },
            Err(e) => {
                warn!("Could not determine secure port, disabling https: {}", e);
                http_base_url(&config.host)
            }
        };

        // fresh credential store, authentication is negotiated again
        self.core.connector.replace(SoapConnector::new(
            self.transport.clone(),
            base_url.clone(),
            Some(config.credentials()),
        ));
        debug!("endpointBaseURL is now '{}'", base_url);

        let description = catalog
            .get_service_description(DEVICE_INFO_SERVICE_ID)
            .ok_or_else(|| {
                Tr064Error::communication(format!(
                    "Could not get service definition for '{}'",
                    DEVICE_INFO_SERVICE_ID
                ))
            })?;
        let get_info = description
            .action("GetInfo")
            .ok_or_else(|| Tr064Error::communication("Action 'GetInfo' not found"))?;

        let response =
            self.core
                .connector
                .load()
                .call(service, &get_info.name, &BTreeMap::new(), GET_INFO_TIMEOUT)?;

        let mut properties = BTreeMap::new();
        for name in PROPERTY_ARGUMENTS {
            let Some(argument) = get_info.argument(name) else {
                continue;
            };
            if let Some(value) = response.value(name) {
                properties.insert(argument.related_state_variable.clone(), value);
            }
        }
        properties.insert("deviceType".to_string(), device.device_type.clone());
        self.core.publish_properties(properties);

        Ok(())
    }
}
