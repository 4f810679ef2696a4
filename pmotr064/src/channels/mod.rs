//! Mapping of a device's capabilities to addressable channels.

pub mod discovery;
pub mod registry;
pub mod table;

pub use discovery::{
    BoundAction, ChannelBinding, ChannelParameter, DiscoveryOptions, discover_channels,
    parameterised_channel_id,
};
pub use registry::{ChannelDiff, ChannelRegistry};
pub use table::{ChannelTypeDescription, ChannelTypeTable};
