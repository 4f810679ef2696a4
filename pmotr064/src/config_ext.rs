//! Extension pour intégrer la configuration TR-064 dans pmoconfig
//!
//! Ce module fournit le trait `Tr064ConfigExt` qui décode le sous-arbre
//! `tr064` de la configuration en structures typées par équipement.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use pmoconfig::Config;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::warn;

use crate::channels::DiscoveryOptions;
use crate::errors::Tr064Error;
use crate::session::SessionOptions;
use crate::soap::Credentials;

const DEFAULT_REFRESH: i64 = 60;
const DEFAULT_RETRY_INTERVAL: u64 = 60;
const MIN_RETRY_INTERVAL: u64 = 1;
const DEFAULT_STATE_TTL_MS: u64 = 2000;

fn default_refresh() -> i64 {
    DEFAULT_REFRESH
}

/// Configuration of the root device (the FRITZ!Box itself).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootDeviceConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Poll interval in seconds.
    #[serde(default = "default_refresh")]
    pub refresh: i64,
    #[serde(default)]
    pub last_seen_interval: i64,
    /// Values of parameterised channels, by thing parameter name.
    #[serde(default)]
    pub parameters: BTreeMap<String, Vec<String>>,
}

impl Default for RootDeviceConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            user: String::new(),
            password: String::new(),
            refresh: DEFAULT_REFRESH,
            last_seen_interval: 0,
            parameters: BTreeMap::new(),
        }
    }
}

impl RootDeviceConfig {
    pub fn validate(&self) -> crate::errors::Result<()> {
        if self.host.trim().is_empty() || self.user.is_empty() || self.password.is_empty() {
            return Err(Tr064Error::configuration(
                "One or more mandatory configuration field is empty",
            ));
        }
        if self.refresh <= 0 {
            return Err(Tr064Error::configuration("refresh must be positive"));
        }
        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.user.clone(), self.password.clone())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh.max(1) as u64)
    }

    pub fn discovery_options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            parameters: self.parameters.clone(),
            last_seen_interval: self.last_seen_interval,
        }
    }
}

/// Configuration of a sub-device reached through the root device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubDeviceConfig {
    #[serde(default)]
    pub uuid: String,
    #[serde(default = "default_refresh")]
    pub refresh: i64,
    #[serde(default)]
    pub parameters: BTreeMap<String, Vec<String>>,
}

impl SubDeviceConfig {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            refresh: DEFAULT_REFRESH,
            parameters: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> crate::errors::Result<()> {
        if self.uuid.trim().is_empty() {
            return Err(Tr064Error::configuration(
                "One or more mandatory configuration field is empty",
            ));
        }
        if self.refresh <= 0 {
            return Err(Tr064Error::configuration("refresh must be positive"));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh.max(1) as u64)
    }

    pub fn discovery_options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            parameters: self.parameters.clone(),
            last_seen_interval: 0,
        }
    }
}

/// Trait d'extension pour gérer la configuration TR-064 dans pmoconfig
///
/// # Exemple
///
/// ```rust,ignore
/// use pmoconfig::get_config;
/// use pmotr064::Tr064ConfigExt;
///
/// let config = get_config()?;
/// let root = config.get_tr064_root()?;
/// println!("FRITZ!Box: {}", root.host);
/// ```
pub trait Tr064ConfigExt {
    /// Récupère la configuration de l'équipement racine
    fn get_tr064_root(&self) -> Result<RootDeviceConfig>;

    /// Enregistre la configuration de l'équipement racine
    fn set_tr064_root(&self, root: &RootDeviceConfig) -> Result<()>;

    /// Récupère la liste des sous-équipements configurés
    fn get_tr064_subdevices(&self) -> Result<Vec<SubDeviceConfig>>;

    /// Récupère les paramètres d'ordonnancement des sessions
    fn get_tr064_session_options(&self) -> Result<SessionOptions>;
}

impl Tr064ConfigExt for Config {
    fn get_tr064_root(&self) -> Result<RootDeviceConfig> {
        match self.get_value(&["tr064", "root"]) {
            Ok(value) => serde_yaml::from_value(value).context("Invalid tr064.root configuration"),
            Err(_) => Ok(RootDeviceConfig::default()),
        }
    }

    fn set_tr064_root(&self, root: &RootDeviceConfig) -> Result<()> {
        let value = serde_yaml::to_value(root)?;
        self.set_value(&["tr064", "root"], value)
    }

    fn get_tr064_subdevices(&self) -> Result<Vec<SubDeviceConfig>> {
        match self.get_value(&["tr064", "subdevices"]) {
            Ok(Value::Null) | Err(_) => Ok(Vec::new()),
            Ok(value) => {
                serde_yaml::from_value(value).context("Invalid tr064.subdevices configuration")
            }
        }
    }

    fn get_tr064_session_options(&self) -> Result<SessionOptions> {
        let retry = match self.get_value(&["tr064", "retry_interval"]) {
            Ok(Value::Number(n)) => n.as_u64().unwrap_or(DEFAULT_RETRY_INTERVAL),
            _ => DEFAULT_RETRY_INTERVAL,
        };
        let ttl = match self.get_value(&["tr064", "state_ttl_ms"]) {
            Ok(Value::Number(n)) => n.as_u64().unwrap_or(DEFAULT_STATE_TTL_MS),
            _ => DEFAULT_STATE_TTL_MS,
        };
        let retry = if retry < MIN_RETRY_INTERVAL {
            warn!("tr064.retry_interval {} too small, using {}s", retry, MIN_RETRY_INTERVAL);
            MIN_RETRY_INTERVAL
        } else {
            retry
        };
        Ok(SessionOptions {
            retry_interval: Duration::from_secs(retry),
            state_ttl: Duration::from_millis(ttl),
        })
    }
}
