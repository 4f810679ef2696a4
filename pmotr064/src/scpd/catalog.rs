use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use super::model::{Device, Service, ServiceDescription};
use super::parser::{parse_root_description, parse_service_description};
use crate::errors::{Result, Tr064Error};
use crate::http::HttpTransport;

/// Path of the root description document below the device endpoint.
pub const ROOT_DESCRIPTION_PATH: &str = "/tr64desc.xml";

const DESCRIPTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Capability graph of one device endpoint.
///
/// The device tree is parsed once by [`CapabilityCatalog::load`]; service
/// descriptions are fetched on first use and kept for the lifetime of the
/// catalog. A catalog is shared read-only by a root session and all of its
/// sub-device sessions.
pub struct CapabilityCatalog {
    base_url: String,
    transport: Arc<dyn HttpTransport>,
    root: Device,
    services: Mutex<HashMap<String, Arc<ServiceDescription>>>,
}

impl std::fmt::Debug for CapabilityCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityCatalog")
            .field("base_url", &self.base_url)
            .field("root", &self.root.device_type)
            .finish()
    }
}

impl CapabilityCatalog {
    /// Fetch and parse the root description below `base_url`.
    pub fn load(transport: Arc<dyn HttpTransport>, base_url: &str) -> Result<Self> {
        let url = format!("{}{}", base_url, ROOT_DESCRIPTION_PATH);
        debug!("Fetching root description from {}", url);

        let response = transport
            .get(&url, DESCRIPTION_TIMEOUT)
            .map_err(|e| Tr064Error::description_unavailable(format!("{url}: {e}")))?;
        if !response.is_success() {
            return Err(Tr064Error::description_unavailable(format!(
                "{url}: HTTP status {}",
                response.status
            )));
        }

        let root = parse_root_description(&response.body)
            .map_err(|e| Tr064Error::description_unavailable(format!("{url}: {e}")))?;

        Ok(Self {
            base_url: base_url.to_string(),
            transport,
            root,
            services: Mutex::new(HashMap::new()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn root_device(&self) -> &Device {
        &self.root
    }

    /// Exact-match lookup over the flattened device list.
    ///
    /// The root device is addressed by the empty uuid.
    pub fn get_device(&self, uuid: &str) -> Option<&Device> {
        if uuid.is_empty() {
            return Some(&self.root);
        }
        self.get_all_sub_devices()
            .into_iter()
            .find(|d| d.uuid == uuid)
    }

    /// All devices below the root, depth-first in document order.
    pub fn get_all_sub_devices(&self) -> Vec<&Device> {
        fn walk<'a>(device: &'a Device, out: &mut Vec<&'a Device>) {
            for child in &device.devices {
                out.push(child);
                walk(child, out);
            }
        }

        let mut devices = Vec::new();
        walk(&self.root, &mut devices);
        devices
    }

    fn find_service(&self, service_id: &str) -> Option<&Service> {
        std::iter::once(&self.root)
            .chain(self.get_all_sub_devices())
            .find_map(|d| d.find_service(service_id))
    }

    /// Action and argument metadata of a service, fetched on first use.
    ///
    /// Failed downloads are not cached: the next call tries again.
    pub fn get_service_description(&self, service_id: &str) -> Option<Arc<ServiceDescription>> {
        if let Some(cached) = self
            .services
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(service_id)
        {
            return Some(Arc::clone(cached));
        }

        let service = self.find_service(service_id)?;
        let url = format!("{}{}", self.base_url, service.scpd_url);
        debug!("Fetching service description for {} from {}", service_id, url);

        let body = match self.transport.get(&url, DESCRIPTION_TIMEOUT) {
            Ok(response) if response.is_success() => response.body,
            Ok(response) => {
                warn!(
                    "Could not get service description {}: HTTP status {}",
                    url, response.status
                );
                return None;
            }
            Err(err) => {
                warn!("Could not get service description {}: {}", url, err);
                return None;
            }
        };

        match parse_service_description(service_id, &body) {
            Ok(description) => {
                let description = Arc::new(description);
                self.services
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(service_id.to_string(), Arc::clone(&description));
                Some(description)
            }
            Err(err) => {
                warn!("Could not parse service description {}: {}", url, err);
                None
            }
        }
    }
}
