//! Conversion between SOAP argument literals and typed channel values.
//!
//! Booleans travel as the literals `"1"` and `"0"`; numbers travel as
//! integers in the device's native unit, which may differ from the unit a
//! channel is exposed with (bit/s on the wire, kbit/s on the channel).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::scpd::DataType;
use crate::soap::SoapEnvelope;

const WIRE_TRUE: &str = "1";
const WIRE_FALSE: &str = "0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dimension {
    DataRate,
    DataAmount,
    Time,
    Ratio,
    Level,
}

/// Units a numeric channel can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "bit/s")]
    BitPerSecond,
    #[serde(rename = "kbit/s")]
    KilobitPerSecond,
    #[serde(rename = "Mbit/s")]
    MegabitPerSecond,
    #[serde(rename = "B")]
    Byte,
    #[serde(rename = "kB")]
    Kilobyte,
    #[serde(rename = "MB")]
    Megabyte,
    #[serde(rename = "s")]
    Second,
    #[serde(rename = "min")]
    Minute,
    #[serde(rename = "h")]
    Hour,
    #[serde(rename = "%")]
    Percent,
    #[serde(rename = "dB")]
    Decibel,
}

impl Unit {
    fn dimension(self) -> Dimension {
        match self {
            Unit::BitPerSecond | Unit::KilobitPerSecond | Unit::MegabitPerSecond => {
                Dimension::DataRate
            }
            Unit::Byte | Unit::Kilobyte | Unit::Megabyte => Dimension::DataAmount,
            Unit::Second | Unit::Minute | Unit::Hour => Dimension::Time,
            Unit::Percent => Dimension::Ratio,
            Unit::Decibel => Dimension::Level,
        }
    }

    /// Size of one unit expressed in the base unit of its dimension.
    fn factor(self) -> f64 {
        match self {
            Unit::BitPerSecond | Unit::Byte | Unit::Second => 1.0,
            Unit::KilobitPerSecond | Unit::Kilobyte => 1_000.0,
            Unit::MegabitPerSecond | Unit::Megabyte => 1_000_000.0,
            Unit::Minute => 60.0,
            Unit::Hour => 3_600.0,
            Unit::Percent | Unit::Decibel => 1.0,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Unit::BitPerSecond => "bit/s",
            Unit::KilobitPerSecond => "kbit/s",
            Unit::MegabitPerSecond => "Mbit/s",
            Unit::Byte => "B",
            Unit::Kilobyte => "kB",
            Unit::Megabyte => "MB",
            Unit::Second => "s",
            Unit::Minute => "min",
            Unit::Hour => "h",
            Unit::Percent => "%",
            Unit::Decibel => "dB",
        }
    }

    /// Convert `value` from `self` to `target`.
    ///
    /// Returns `None` when both units measure different things.
    pub fn convert(self, value: f64, target: Unit) -> Option<f64> {
        if self.dimension() != target.dimension() {
            return None;
        }
        Some(value * self.factor() / target.factor())
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Unit of a channel, plus the unit the device uses on the wire when it
/// differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnitMapping {
    pub unit: Option<Unit>,
    pub wire_unit: Option<Unit>,
}

impl UnitMapping {
    pub fn new(unit: Option<Unit>, wire_unit: Option<Unit>) -> Self {
        Self { unit, wire_unit }
    }

    fn wire(&self) -> Option<Unit> {
        self.wire_unit.or(self.unit)
    }
}

/// Platform-side value of a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    OnOff(bool),
    Text(String),
    Number(f64),
    Quantity { value: f64, unit: Unit },
    Undefined,
}

impl TypedValue {
    /// Value reported for channels that cannot be read from the device.
    pub fn default_for(data_type: &DataType) -> Self {
        match data_type {
            DataType::Boolean => TypedValue::OnOff(false),
            DataType::String | DataType::Enumerated(_) => TypedValue::Text(String::new()),
            _ => TypedValue::Undefined,
        }
    }

    pub fn is_defined(&self) -> bool {
        !matches!(self, TypedValue::Undefined)
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::OnOff(true) => write!(f, "ON"),
            TypedValue::OnOff(false) => write!(f, "OFF"),
            TypedValue::Text(text) => write!(f, "{}", text),
            TypedValue::Number(value) => write!(f, "{}", format_number(*value)),
            TypedValue::Quantity { value, unit } => {
                write!(f, "{} {}", format_number(*value), unit)
            }
            TypedValue::Undefined => write!(f, "UNDEF"),
        }
    }
}

/// Command sent to a channel by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Refresh,
    OnOff(bool),
    Text(String),
    Decimal(f64),
    Quantity { value: f64, unit: Unit },
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Refresh => write!(f, "REFRESH"),
            Command::OnOff(true) => write!(f, "ON"),
            Command::OnOff(false) => write!(f, "OFF"),
            Command::Text(text) => write!(f, "{}", text),
            Command::Decimal(value) => write!(f, "{}", format_number(*value)),
            Command::Quantity { value, unit } => write!(f, "{} {}", format_number(*value), unit),
        }
    }
}

fn is_unsigned(data_type: &DataType) -> bool {
    matches!(data_type, DataType::Numeric(tag) if tag.starts_with("ui"))
}

/// Wire literal for `command`, or `None` if it cannot be represented in
/// `data_type`.
pub fn to_wire_value(command: &Command, data_type: &DataType, units: UnitMapping) -> Option<String> {
    match (data_type, command) {
        (DataType::Boolean, Command::OnOff(on)) => {
            Some(if *on { WIRE_TRUE } else { WIRE_FALSE }.to_string())
        }
        (DataType::String, Command::Text(text)) => Some(text.clone()),
        (DataType::Enumerated(allowed), Command::Text(text)) => {
            allowed.iter().any(|v| v == text).then(|| text.clone())
        }
        (DataType::Numeric(_), Command::Decimal(value)) => {
            let wire = match (units.unit, units.wire()) {
                (Some(unit), Some(wire)) => unit.convert(*value, wire)?,
                _ => *value,
            };
            numeric_literal(wire, data_type)
        }
        (DataType::Numeric(_), Command::Quantity { value, unit }) => {
            let wire = unit.convert(*value, units.wire()?)?;
            numeric_literal(wire, data_type)
        }
        _ => None,
    }
}

fn numeric_literal(value: f64, data_type: &DataType) -> Option<String> {
    if !value.is_finite() {
        return None;
    }
    let rounded = value.round() as i64;
    if rounded < 0 && is_unsigned(data_type) {
        return None;
    }
    Some(rounded.to_string())
}

/// Typed value of output argument `argument` in `envelope`.
///
/// `None` if the argument is absent or its literal does not fit `data_type`.
pub fn from_wire_value(
    envelope: &SoapEnvelope,
    argument: &str,
    data_type: &DataType,
    units: UnitMapping,
) -> Option<TypedValue> {
    let literal = envelope.value(argument)?;
    parse_wire_literal(&literal, data_type, units)
}

/// Typed value of a single wire literal.
pub fn parse_wire_literal(literal: &str, data_type: &DataType, units: UnitMapping) -> Option<TypedValue> {
    match data_type {
        DataType::Boolean => match literal.trim() {
            WIRE_TRUE => Some(TypedValue::OnOff(true)),
            WIRE_FALSE => Some(TypedValue::OnOff(false)),
            _ => None,
        },
        DataType::String | DataType::Enumerated(_) => Some(TypedValue::Text(literal.to_string())),
        DataType::Numeric(_) => {
            let raw = literal.trim().parse::<i64>().ok()? as f64;
            match (units.wire(), units.unit) {
                (Some(wire), Some(unit)) => Some(TypedValue::Quantity {
                    value: wire.convert(raw, unit)?,
                    unit,
                }),
                _ => Some(TypedValue::Number(raw)),
            }
        }
    }
}
