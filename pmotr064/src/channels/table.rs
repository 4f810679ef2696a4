//! Declarative channel type table.
//!
//! Each entry maps a `(device type, service id)` pattern and a get/set
//! action pair to one platform channel. The built-in table ships with the
//! crate; tests and integrators can load their own from YAML.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, Tr064Error};
use crate::scpd::{Device, Service};
use crate::values::{Unit, UnitMapping};

const BUILTIN_TABLE: &str = include_str!("channels.yaml");

/// Service selector of a channel type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceMatch {
    #[serde(default)]
    pub device_type: Option<String>,
    pub service_id: String,
}

/// Extra input argument of a get-action.
///
/// Its values come from the per-device configuration list named by
/// `thing_parameter`; each configured value yields its own channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDescription {
    pub name: String,
    #[serde(default)]
    pub thing_parameter: Option<String>,
    /// Fixed value used when no `thing_parameter` is given.
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub internal_only: bool,
    #[serde(default)]
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescription {
    pub name: String,
    #[serde(default)]
    pub argument: Option<String>,
    #[serde(default)]
    pub parameter: Option<ParameterDescription>,
}

/// One entry of the channel table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelTypeDescription {
    pub name: String,
    #[serde(default)]
    pub label: String,
    pub service: ServiceMatch,
    #[serde(default)]
    pub get_action: Option<ActionDescription>,
    #[serde(default)]
    pub set_action: Option<ActionDescription>,
    #[serde(default)]
    pub unit: Option<Unit>,
    #[serde(default)]
    pub wire_unit: Option<Unit>,
    /// Only offered while the last-seen polling interval is positive.
    #[serde(default)]
    pub last_seen: bool,
}

impl ChannelTypeDescription {
    pub fn units(&self) -> UnitMapping {
        UnitMapping::new(self.unit, self.wire_unit)
    }

    /// The parameter of the channel, declared on its get-action.
    pub fn parameter(&self) -> Option<&ParameterDescription> {
        self.get_action.as_ref()?.parameter.as_ref()
    }
}

#[derive(Debug, Deserialize)]
struct TableFile {
    channels: Vec<ChannelTypeDescription>,
}

#[derive(Debug)]
struct CompiledEntry {
    description: ChannelTypeDescription,
    device_type: Option<Regex>,
    service_id: Regex,
}

/// Lookup table from device services to channel types.
#[derive(Debug)]
pub struct ChannelTypeTable {
    entries: Vec<CompiledEntry>,
}

fn anchored(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{})$", pattern))
        .map_err(|e| Tr064Error::configuration(format!("Invalid pattern '{}': {}", pattern, e)))
}

impl ChannelTypeTable {
    /// Table shipped with the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(BUILTIN_TABLE)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: TableFile = serde_yaml::from_str(yaml)
            .map_err(|e| Tr064Error::configuration(format!("Invalid channel table: {}", e)))?;

        let entries = file
            .channels
            .into_iter()
            .map(|description| {
                let device_type = description
                    .service
                    .device_type
                    .as_deref()
                    .map(anchored)
                    .transpose()?;
                let service_id = anchored(&description.service.service_id)?;
                Ok(CompiledEntry {
                    description,
                    device_type,
                    service_id,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Channel types declared for `service` of `device`, in table order.
    pub fn lookup<'a>(
        &'a self,
        device: &'a Device,
        service: &'a Service,
    ) -> impl Iterator<Item = &'a ChannelTypeDescription> + 'a {
        self.entries
            .iter()
            .filter(move |entry| {
                entry
                    .device_type
                    .as_ref()
                    .is_none_or(|re| re.is_match(&device.device_type))
                    && entry.service_id.is_match(&service.service_id)
            })
            .map(|entry| &entry.description)
    }
}
