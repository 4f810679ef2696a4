//! Capability catalog: the device/service/action graph of a TR-064 device.

mod catalog;
mod model;
mod parser;

pub use catalog::{CapabilityCatalog, ROOT_DESCRIPTION_PATH};
pub use model::{
    Action, ActionArgument, AllowedValueRange, Argument, DataType, Device, Direction, Service,
    ServiceDescription, StateVariable,
};
pub use parser::{ScpdParseError, parse_root_description, parse_service_description};
