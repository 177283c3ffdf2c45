//! MQTT topic builders and parsers for the `iot-2` topic namespace.
//!
//! Topic structure:
//! ```text
//! iot-2/evt/{event}/fmt/{format}
//! iot-2/cmd/{command}/fmt/{format}
//! iot-2/type/{type}/id/{id}/evt/{event}/fmt/{format}
//! iot-2/type/{type}/id/{id}/cmd/{command}/fmt/{format}
//! iot-2/type/{type}/id/{id}/notify
//! ```
//!
//! Devices publish and subscribe on the short forms; gateways use the
//! `type/{type}/id/{id}` scoped forms both for themselves and for the
//! devices they act for.

use thiserror::Error;

const PREFIX: &str = "iot-2";

/// Single-level MQTT wildcard.
pub const WILDCARD: &str = "+";

/// Multi-level MQTT wildcard.
pub const MULTI_WILDCARD: &str = "#";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    #[error("topic segment `{field}` is empty")]
    EmptySegment { field: &'static str },

    #[error("topic segment `{field}` contains a reserved character: {value:?}")]
    InvalidSegment { field: &'static str, value: String },

    #[error("topic is {len} bytes, exceeding the {capacity}-byte buffer")]
    TooLong { len: usize, capacity: usize },
}

// ─── Event topics ───

pub fn device_event(event_type: &str, format: &str) -> String {
    format!("{PREFIX}/evt/{event_type}/fmt/{format}")
}

/// Event scoped to a type/id pair. Used by a gateway for its own events
/// and for events it publishes on behalf of an attached device.
pub fn scoped_event(device_type: &str, device_id: &str, event_type: &str, format: &str) -> String {
    format!("{PREFIX}/type/{device_type}/id/{device_id}/evt/{event_type}/fmt/{format}")
}

// ─── Command topics ───

pub fn device_command(command: &str, format: &str) -> String {
    format!("{PREFIX}/cmd/{command}/fmt/{format}")
}

/// Every command addressed to a device, in any format.
pub fn device_commands_all() -> String {
    device_command(WILDCARD, WILDCARD)
}

pub fn scoped_command(device_type: &str, device_id: &str, command: &str, format: &str) -> String {
    format!("{PREFIX}/type/{device_type}/id/{device_id}/cmd/{command}/fmt/{format}")
}

pub fn notification(device_type: &str, device_id: &str) -> String {
    format!("{PREFIX}/type/{device_type}/id/{device_id}/notify")
}

// ─── Validation ───

/// Check a segment that will appear in a published topic name.
///
/// Publish topics must not carry wildcards or level separators.
pub fn validate_segment(field: &'static str, value: &str) -> Result<(), TopicError> {
    if value.is_empty() {
        return Err(TopicError::EmptySegment { field });
    }
    if value.contains(['/', '+', '#']) {
        return Err(TopicError::InvalidSegment {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Check a segment of a subscription filter.
///
/// `+` may replace any whole segment; `#` only the final one.
pub fn validate_filter_segment(
    field: &'static str,
    value: &str,
    is_last: bool,
) -> Result<(), TopicError> {
    match value {
        WILDCARD => Ok(()),
        MULTI_WILDCARD if is_last => Ok(()),
        _ => validate_segment(field, value),
    }
}

/// Check a complete topic name used for a raw publish.
pub fn validate_topic_name(topic: &str) -> Result<(), TopicError> {
    if topic.is_empty() {
        return Err(TopicError::EmptySegment { field: "topic" });
    }
    if topic.contains(['+', '#']) {
        return Err(TopicError::InvalidSegment {
            field: "topic",
            value: topic.to_string(),
        });
    }
    Ok(())
}

/// Reject a topic that would not fit into a buffer of `capacity` bytes.
pub fn ensure_capacity(topic: String, capacity: usize) -> Result<String, TopicError> {
    if topic.len() > capacity {
        return Err(TopicError::TooLong {
            len: topic.len(),
            capacity,
        });
    }
    Ok(topic)
}

// ─── Topic parsing ───

/// Components of a command topic. `device_type`/`device_id` are absent on
/// the short device form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTopic {
    pub device_type: Option<String>,
    pub device_id: Option<String>,
    pub command: String,
    pub format: String,
}

/// Components of an event topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTopic {
    pub device_type: Option<String>,
    pub device_id: Option<String>,
    pub event: String,
    pub format: String,
}

/// An inbound topic a client can receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundTopic {
    Command(CommandTopic),
    Notification {
        device_type: String,
        device_id: String,
    },
}

/// Split off an optional `type/{type}/id/{id}` scope.
/// Returns the scope and the remaining segments.
fn split_scope<'a>(parts: &'a [&'a str]) -> Option<(Option<(String, String)>, &'a [&'a str])> {
    match parts {
        ["type", device_type, "id", device_id, rest @ ..] => {
            if device_type.is_empty() || device_id.is_empty() {
                return None;
            }
            Some((
                Some((device_type.to_string(), device_id.to_string())),
                rest,
            ))
        }
        rest => Some((None, rest)),
    }
}

/// Parse `{kind}/{name}/fmt/{format}` after the scope.
fn parse_named<'a>(rest: &[&'a str], kind: &str) -> Option<(&'a str, &'a str)> {
    match rest {
        [k, name, "fmt", format] if *k == kind && !name.is_empty() && !format.is_empty() => {
            Some((*name, *format))
        }
        _ => None,
    }
}

fn segments(topic: &str) -> Option<Vec<&str>> {
    let mut parts = topic.split('/');
    if parts.next() != Some(PREFIX) {
        return None;
    }
    Some(parts.collect())
}

/// Parse a command topic, short or scoped form.
/// Returns `None` if the topic doesn't match the expected format.
pub fn parse_command_topic(topic: &str) -> Option<CommandTopic> {
    let parts = segments(topic)?;
    let (scope, rest) = split_scope(&parts)?;
    let (command, format) = parse_named(rest, "cmd")?;
    let (device_type, device_id) = scope.unzip();

    Some(CommandTopic {
        device_type,
        device_id,
        command: command.to_string(),
        format: format.to_string(),
    })
}

/// Parse an event topic, short or scoped form.
pub fn parse_event_topic(topic: &str) -> Option<EventTopic> {
    let parts = segments(topic)?;
    let (scope, rest) = split_scope(&parts)?;
    let (event, format) = parse_named(rest, "evt")?;
    let (device_type, device_id) = scope.unzip();

    Some(EventTopic {
        device_type,
        device_id,
        event: event.to_string(),
        format: format.to_string(),
    })
}

/// Classify a topic received from the broker.
pub fn parse_inbound(topic: &str) -> Option<InboundTopic> {
    let parts = segments(topic)?;
    let (scope, rest) = split_scope(&parts)?;

    if let (Some((device_type, device_id)), ["notify"]) = (&scope, rest) {
        return Some(InboundTopic::Notification {
            device_type: device_type.clone(),
            device_id: device_id.clone(),
        });
    }

    let (command, format) = parse_named(rest, "cmd")?;
    let (device_type, device_id) = scope.unzip();
    Some(InboundTopic::Command(CommandTopic {
        device_type,
        device_id,
        command: command.to_string(),
        format: format.to_string(),
    }))
}
