//! Derivation of channel bindings from a device's capabilities.

use std::collections::{BTreeMap, HashSet};

use regex::Regex;
use tracing::{debug, trace, warn};

use super::table::{ActionDescription, ChannelTypeDescription, ChannelTypeTable, ParameterDescription};
use crate::scpd::{Argument, CapabilityCatalog, DataType, Device, Service, ServiceDescription};
use crate::values::UnitMapping;

/// An action a channel is bound to, with its typed argument if it has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundAction {
    pub name: String,
    pub argument: Option<Argument>,
}

impl BoundAction {
    pub fn argument_name(&self) -> Option<&str> {
        self.argument.as_ref().map(|a| a.name.as_str())
    }
}

/// Concrete value of a parameterised channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelParameter {
    pub name: String,
    pub value: String,
    pub internal_only: bool,
}

/// One addressable channel of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelBinding {
    pub channel_id: String,
    pub channel_type: String,
    pub label: String,
    pub device_uuid: String,
    pub service: Service,
    pub get_action: Option<BoundAction>,
    pub set_action: Option<BoundAction>,
    pub data_type: DataType,
    pub units: UnitMapping,
    pub parameter: Option<ChannelParameter>,
}

impl ChannelBinding {
    pub fn is_readable(&self) -> bool {
        self.get_action.is_some()
    }

    pub fn is_writable(&self) -> bool {
        self.set_action.is_some()
    }

    /// True when `other` is answered by the same remote call as `self`.
    pub fn shares_get_call_with(&self, other: &ChannelBinding) -> bool {
        match (&self.get_action, &other.get_action) {
            (Some(a), Some(b)) => {
                a.name == b.name
                    && self.service.service_id == other.service.service_id
                    && self.device_uuid == other.device_uuid
                    && self.parameter.as_ref().map(|p| &p.value)
                        == other.parameter.as_ref().map(|p| &p.value)
            }
            _ => false,
        }
    }
}

/// Per-device inputs of channel discovery.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    /// Configured values for parameterised channels, by thing parameter.
    /// Keys may be lower-cased.
    pub parameters: BTreeMap<String, Vec<String>>,
    /// Polling interval of last-seen channels, in seconds.
    pub last_seen_interval: i64,
}

/// Channel id of a parameterised channel: non-alphanumerics become `_`.
pub fn parameterised_channel_id(channel: &str, value: &str) -> String {
    let sanitised: String = value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}_{}", channel, sanitised)
}

fn bind_action(
    description: &ServiceDescription,
    action: &ActionDescription,
) -> Option<BoundAction> {
    let scpd_action = description.action(&action.name)?;
    let argument = match &action.argument {
        Some(name) => {
            if scpd_action.argument(name).is_none() {
                return None;
            }
            Some(description.typed_argument(&action.name, name)?)
        }
        None => None,
    };
    Some(BoundAction {
        name: action.name.clone(),
        argument,
    })
}

fn parameter_values(
    channel: &ChannelTypeDescription,
    parameter: &ParameterDescription,
    options: &DiscoveryOptions,
) -> Vec<String> {
    let values: Vec<String> = match (&parameter.thing_parameter, &parameter.value) {
        (Some(key), _) => options
            .parameters
            .get(key)
            .or_else(|| options.parameters.get(&key.to_lowercase()))
            .cloned()
            .unwrap_or_default(),
        (None, Some(value)) => vec![value.clone()],
        (None, None) => Vec::new(),
    };

    let pattern = match parameter.pattern.as_deref().map(|p| Regex::new(&format!("^(?:{})$", p))) {
        Some(Ok(re)) => Some(re),
        Some(Err(e)) => {
            warn!("Invalid parameter pattern for channel {}: {}", channel.name, e);
            return Vec::new();
        }
        None => None,
    };

    values
        .into_iter()
        .filter(|value| match &pattern {
            Some(re) if !re.is_match(value) => {
                warn!(
                    "Value '{}' for channel {} does not match pattern, skipping",
                    value, channel.name
                );
                false
            }
            _ => true,
        })
        .collect()
}

fn channel_data_type(get: Option<&BoundAction>, set: Option<&BoundAction>) -> DataType {
    get.and_then(|a| a.argument.as_ref())
        .or_else(|| set.and_then(|a| a.argument.as_ref()))
        .map(|a| a.data_type.clone())
        .unwrap_or(DataType::Boolean)
}

/// Derive the channel bindings of `device`, in service and table order.
///
/// Channel types whose actions or arguments are missing from the service
/// description are skipped, as are services whose description cannot be
/// fetched.
pub fn discover_channels(
    device: &Device,
    catalog: &CapabilityCatalog,
    table: &ChannelTypeTable,
    options: &DiscoveryOptions,
) -> Vec<ChannelBinding> {
    let mut bindings = Vec::new();
    let mut seen = HashSet::new();

    for service in &device.services {
        let mut channel_types = table.lookup(device, service).peekable();
        if channel_types.peek().is_none() {
            continue;
        }

        let Some(description) = catalog.get_service_description(&service.service_id) else {
            debug!("No description for service {}, skipping its channels", service.service_id);
            continue;
        };

        for channel in channel_types {
            if channel.last_seen && options.last_seen_interval <= 0 {
                trace!("Channel {} disabled by last-seen interval", channel.name);
                continue;
            }

            let get_action = match &channel.get_action {
                Some(action) => match bind_action(&description, action) {
                    Some(bound) => Some(bound),
                    None => {
                        debug!(
                            "Action {} not available in {}, skipping channel {}",
                            action.name, service.service_id, channel.name
                        );
                        continue;
                    }
                },
                None => None,
            };
            let set_action = match &channel.set_action {
                Some(action) => match bind_action(&description, action) {
                    Some(bound) => Some(bound),
                    None => {
                        debug!(
                            "Action {} not available in {}, skipping channel {}",
                            action.name, service.service_id, channel.name
                        );
                        continue;
                    }
                },
                None => None,
            };
            if get_action.is_none() && set_action.is_none() {
                continue;
            }

            let data_type = channel_data_type(get_action.as_ref(), set_action.as_ref());
            let template = ChannelBinding {
                channel_id: channel.name.clone(),
                channel_type: channel.name.clone(),
                label: channel.label.clone(),
                device_uuid: device.uuid.clone(),
                service: service.clone(),
                get_action,
                set_action,
                data_type,
                units: channel.units(),
                parameter: None,
            };

            let instances: Vec<ChannelBinding> = match channel.parameter() {
                Some(parameter) => parameter_values(channel, parameter, options)
                    .into_iter()
                    .map(|value| ChannelBinding {
                        channel_id: parameterised_channel_id(&channel.name, &value),
                        label: format!("{} {}", channel.label, value),
                        parameter: Some(ChannelParameter {
                            name: parameter.name.clone(),
                            value,
                            internal_only: parameter.internal_only,
                        }),
                        ..template.clone()
                    })
                    .collect(),
                None => vec![template],
            };

            for binding in instances {
                if !seen.insert(binding.channel_id.clone()) {
                    warn!("Duplicate channel {} ignored", binding.channel_id);
                    continue;
                }
                trace!("Discovered channel {}", binding.channel_id);
                bindings.push(binding);
            }
        }
    }

    bindings
}
