//! # pmotr064
//!
//! Device communication core for TR-064 home gateways (FRITZ!Box):
//!
//! - `scpd`: capability catalog parsed from the device descriptions
//! - `soap`: SOAP connector with digest authentication and fault handling
//! - `values`: conversion between wire literals and typed channel values
//! - `channels`: declarative channel table, discovery and registry
//! - `cache`: short-lived channel value cache with sibling coalescing
//! - `session`: root and sub-device sessions (connect, poll, commands)
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pmotr064::{ChannelTypeTable, RootSession, SessionEventBus, SessionOptions, UreqTransport};
//!
//! let events = SessionEventBus::new();
//! let root = RootSession::new(
//!     config.get_tr064_root()?,
//!     Arc::new(UreqTransport::new()),
//!     Arc::new(ChannelTypeTable::builtin()?),
//!     events.clone(),
//!     tokio::runtime::Handle::current(),
//!     SessionOptions::default(),
//! );
//! root.start();
//! ```

pub mod cache;
pub mod channels;
pub mod config_ext;
pub mod errors;
pub mod events;
pub mod http;
pub mod scpd;
pub mod session;
pub mod soap;
pub mod values;

pub use cache::{Populated, StateCache};
pub use channels::{ChannelBinding, ChannelDiff, ChannelRegistry, ChannelTypeTable};
pub use config_ext::{RootDeviceConfig, SubDeviceConfig, Tr064ConfigExt};
pub use errors::{Result, Tr064Error};
pub use events::{SessionEvent, SessionEventBus};
pub use http::{HttpResponse, HttpTransport, UreqTransport};
pub use scpd::CapabilityCatalog;
pub use session::{RootLink, RootSession, SessionOptions, SessionState, SubSession};
pub use soap::{Credentials, SoapConnector};
pub use values::{Command, TypedValue, Unit};
