//! Parsers for the root description (`tr64desc.xml`) and the per-service
//! SCPD documents.

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::{Error as XmlError, Reader, events::Event};
use thiserror::Error;
use xmltree::Element;

use super::model::{
    Action, ActionArgument, AllowedValueRange, Device, Direction, Service, ServiceDescription,
    StateVariable,
};

#[derive(Debug, Error)]
pub enum ScpdParseError {
    #[error("XML tree parse error: {0}")]
    Tree(#[from] xmltree::ParseError),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Missing required element: {0}")]
    MissingElement(&'static str),
}

/// Parse the root description into the device tree.
pub fn parse_root_description(xml: &str) -> Result<Device, ScpdParseError> {
    let root = Element::parse(xml.as_bytes())?;
    if root.name != "root" {
        return Err(ScpdParseError::MissingElement("root"));
    }
    let device = root
        .get_child("device")
        .ok_or(ScpdParseError::MissingElement("device"))?;
    Ok(parse_device(device, true))
}

fn child_text(elem: &Element, name: &str) -> String {
    elem.get_child(name)
        .and_then(|e| e.get_text())
        .map(|t| t.trim().to_string())
        .unwrap_or_default()
}

fn child_elements<'a>(elem: &'a Element, list: &str, item: &'a str) -> Vec<&'a Element> {
    elem.get_child(list)
        .map(|l| {
            l.children
                .iter()
                .filter_map(|n| n.as_element())
                .filter(|e| e.name == item)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_device(elem: &Element, is_root: bool) -> Device {
    let uuid = if is_root {
        String::new()
    } else {
        let udn = child_text(elem, "UDN");
        udn.strip_prefix("uuid:").unwrap_or(&udn).to_string()
    };

    let services = child_elements(elem, "serviceList", "service")
        .into_iter()
        .map(|s| Service {
            service_type: child_text(s, "serviceType"),
            service_id: child_text(s, "serviceId"),
            control_url: child_text(s, "controlURL"),
            scpd_url: child_text(s, "SCPDURL"),
        })
        .collect();

    let devices = child_elements(elem, "deviceList", "device")
        .into_iter()
        .map(|d| parse_device(d, false))
        .collect();

    Device {
        uuid,
        device_type: child_text(elem, "deviceType"),
        friendly_name: child_text(elem, "friendlyName"),
        manufacturer: child_text(elem, "manufacturer"),
        model_name: child_text(elem, "modelName"),
        services,
        devices,
    }
}

/// Append the replacement text of `&entity;` to `text`.
fn push_entity(text: &mut String, entity: &str) {
    if let Some(resolved) = resolve_predefined_entity(entity) {
        text.push_str(resolved);
        return;
    }
    let code = match entity.strip_prefix("#x") {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => entity.strip_prefix('#').and_then(|dec| dec.parse::<u32>().ok()),
    };
    match code.and_then(char::from_u32) {
        Some(c) => text.push(c),
        None => {
            text.push('&');
            text.push_str(entity);
            text.push(';');
        }
    }
}

/// Parse a service description (SCPD) document.
pub fn parse_service_description(
    service_id: &str,
    xml: &str,
) -> Result<ServiceDescription, ScpdParseError> {
    let mut reader = Reader::from_str(xml);

    let mut description = ServiceDescription {
        service_id: service_id.to_string(),
        ..Default::default()
    };
    let mut seen_scpd = false;

    let mut action: Option<Action> = None;
    let mut argument: Option<(String, Option<Direction>, String)> = None;
    let mut variable: Option<StateVariable> = None;
    let mut range: Option<AllowedValueRange> = None;
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match name.as_str() {
                    "scpd" => seen_scpd = true,
                    "action" => action = Some(Action::default()),
                    "argument" if action.is_some() => {
                        argument = Some((String::new(), None, String::new()))
                    }
                    "stateVariable" => variable = Some(StateVariable::default()),
                    "allowedValueRange" if variable.is_some() => {
                        range = Some(AllowedValueRange::default())
                    }
                    _ => {}
                }
                text.clear();
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let text = std::mem::take(&mut text).trim().to_string();
                if !text.is_empty() {
                    match name.as_str() {
                        "name" => {
                            if let Some((arg_name, _, _)) = argument.as_mut() {
                                *arg_name = text;
                            } else if let Some(current) = action.as_mut() {
                                current.name = text;
                            } else if let Some(current) = variable.as_mut() {
                                current.name = text;
                            }
                        }
                        "direction" => {
                            if let Some((_, direction, _)) = argument.as_mut() {
                                *direction = match text.as_str() {
                                    "in" => Some(Direction::In),
                                    "out" => Some(Direction::Out),
                                    _ => None,
                                };
                            }
                        }
                        "relatedStateVariable" => {
                            if let Some((_, _, related)) = argument.as_mut() {
                                *related = text;
                            }
                        }
                        "dataType" => {
                            if let Some(current) = variable.as_mut() {
                                current.data_type = text;
                            }
                        }
                        "allowedValue" => {
                            if let Some(current) = variable.as_mut() {
                                current.allowed_values.push(text);
                            }
                        }
                        "minimum" | "maximum" | "step" => {
                            if let (Some(r), Ok(value)) = (range.as_mut(), text.parse::<i64>()) {
                                match name.as_str() {
                                    "minimum" => r.minimum = value,
                                    "maximum" => r.maximum = value,
                                    _ => r.step = Some(value),
                                }
                            }
                        }
                        _ => {}
                    }
                }
                match name.as_str() {
                    "argument" => {
                        if let (Some(current), Some((arg_name, Some(direction), related))) =
                            (action.as_mut(), argument.take())
                        {
                            current.arguments.push(ActionArgument {
                                name: arg_name,
                                direction,
                                related_state_variable: related,
                            });
                        }
                    }
                    "action" => {
                        if let Some(current) = action.take() {
                            if !current.name.is_empty() {
                                description.actions.push(current);
                            }
                        }
                    }
                    "allowedValueRange" => {
                        if let (Some(current), Some(r)) = (variable.as_mut(), range.take()) {
                            current.allowed_range = Some(r);
                        }
                    }
                    "stateVariable" => {
                        if let Some(current) = variable.take() {
                            description.state_variables.push(current);
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(e) => {
                text.push_str(&e.decode().map_err(XmlError::Encoding)?);
            }
            Event::GeneralRef(e) => {
                let entity = e.decode().map_err(XmlError::Encoding)?;
                push_entity(&mut text, &entity);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_scpd {
        return Err(ScpdParseError::MissingElement("scpd"));
    }
    Ok(description)
}
