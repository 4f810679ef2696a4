//! In-memory graph of a TR-064 capability description.

use std::fmt;

/// Wire data type of an argument, derived from its related state variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    Boolean,
    String,
    /// Any of the integer SCPD types (`ui1`, `ui2`, `ui4`, `i1`, `i2`, `i4`, `int`).
    Numeric(String),
    /// A string variable restricted to an `allowedValueList`.
    Enumerated(Vec<String>),
}

impl DataType {
    /// Map a raw SCPD `dataType` to a data type.
    ///
    /// `dateTime` and `uuid` are carried as strings. A non-empty allowed
    /// value list turns a string variable into an enumeration.
    pub fn from_scpd(tag: &str, allowed_values: &[String]) -> Self {
        match tag {
            "boolean" => DataType::Boolean,
            "ui1" | "ui2" | "ui4" | "i1" | "i2" | "i4" | "int" => DataType::Numeric(tag.to_string()),
            _ if !allowed_values.is_empty() => DataType::Enumerated(allowed_values.to_vec()),
            _ => DataType::String,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Numeric(_))
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Boolean => write!(f, "boolean"),
            DataType::String => write!(f, "string"),
            DataType::Numeric(tag) => write!(f, "{tag}"),
            DataType::Enumerated(_) => write!(f, "string"),
        }
    }
}

/// A device node from the root description.
///
/// The root device carries an empty `uuid`; sub-devices carry their UDN
/// without the `uuid:` prefix.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Device {
    pub uuid: String,
    pub device_type: String,
    pub friendly_name: String,
    pub manufacturer: String,
    pub model_name: String,
    pub services: Vec<Service>,
    pub devices: Vec<Device>,
}

impl Device {
    pub fn find_service(&self, service_id: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.service_id == service_id)
    }
}

/// A service entry of a device's `serviceList`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Service {
    pub service_type: String,
    pub service_id: String,
    pub control_url: String,
    pub scpd_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

/// One argument of an action as listed in the service description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionArgument {
    pub name: String,
    pub direction: Direction,
    pub related_state_variable: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Action {
    pub name: String,
    pub arguments: Vec<ActionArgument>,
}

impl Action {
    pub fn argument(&self, name: &str) -> Option<&ActionArgument> {
        self.arguments.iter().find(|a| a.name == name)
    }

    pub fn has_input(&self, name: &str) -> bool {
        self.argument(name).is_some_and(|a| a.direction == Direction::In)
    }

    pub fn has_output(&self, name: &str) -> bool {
        self.argument(name).is_some_and(|a| a.direction == Direction::Out)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllowedValueRange {
    pub minimum: i64,
    pub maximum: i64,
    pub step: Option<i64>,
}

impl AllowedValueRange {
    pub fn contains(&self, value: i64) -> bool {
        (self.minimum..=self.maximum).contains(&value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateVariable {
    pub name: String,
    pub data_type: String,
    pub allowed_values: Vec<String>,
    pub allowed_range: Option<AllowedValueRange>,
}

/// Action and state variable metadata of one service (its SCPD document).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceDescription {
    pub service_id: String,
    pub actions: Vec<Action>,
    pub state_variables: Vec<StateVariable>,
}

impl ServiceDescription {
    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn state_variable(&self, name: &str) -> Option<&StateVariable> {
        self.state_variables.iter().find(|v| v.name == name)
    }

    /// Resolve the typed argument behind `action`/`argument`.
    ///
    /// Returns `None` if the action or argument is unknown to this service.
    pub fn typed_argument(&self, action: &str, argument: &str) -> Option<Argument> {
        let arg = self.action(action)?.argument(argument)?;
        let variable = self.state_variable(&arg.related_state_variable);
        let (data_type, allowed_range) = match variable {
            Some(v) => (
                DataType::from_scpd(&v.data_type, &v.allowed_values),
                v.allowed_range,
            ),
            None => (DataType::String, None),
        };
        Some(Argument {
            name: arg.name.clone(),
            related_state_variable: arg.related_state_variable.clone(),
            data_type,
            internal_only: false,
            allowed_range,
        })
    }
}

/// A typed argument bound to a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub name: String,
    pub related_state_variable: String,
    pub data_type: DataType,
    /// Never sent to the device, only used locally.
    pub internal_only: bool,
    pub allowed_range: Option<AllowedValueRange>,
}
