//! Inbound command dispatch.
//!
//! Parses broker topics into typed commands and hands them to the single
//! registered [`CommandHandler`]. The payload is copied into the handle's
//! receive buffer and lent to the handler for the duration of the call.

use iotf_protocol::topics::{self, InboundTopic};

/// A command received from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command<'a> {
    pub device_type: &'a str,
    pub device_id: &'a str,
    pub name: &'a str,
    pub format: &'a str,
    pub payload: &'a [u8],
}

impl Command<'_> {
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(self.payload).ok()
    }
}

/// A gateway notification (e.g. an error report for an attached device).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification<'a> {
    pub device_type: &'a str,
    pub device_id: &'a str,
    pub payload: &'a [u8],
}

/// Receives commands dispatched by a handle.
///
/// Any `FnMut(&Command<'_>) + Send` closure is a handler.
pub trait CommandHandler: Send {
    fn on_command(&mut self, command: &Command<'_>);

    fn on_notification(&mut self, notification: &Notification<'_>) {
        tracing::debug!(
            device_type = notification.device_type,
            device_id = notification.device_id,
            "ignoring gateway notification"
        );
    }
}

impl<F> CommandHandler for F
where
    F: FnMut(&Command<'_>) + Send,
{
    fn on_command(&mut self, command: &Command<'_>) {
        self(command)
    }
}

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Command,
    Notification,
    NoHandler,
    Malformed,
    Oversized,
}

/// Routes inbound messages to the registered handler.
pub struct Dispatcher {
    handler: Option<Box<dyn CommandHandler>>,
    read_buf: Vec<u8>,
    capacity: usize,
    device_type: String,
    device_id: String,
}

impl Dispatcher {
    /// `device_type`/`device_id` fill in commands whose topic carries no
    /// type/id scope.
    pub fn new(capacity: usize, device_type: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            handler: None,
            read_buf: Vec::with_capacity(capacity),
            capacity,
            device_type: device_type.into(),
            device_id: device_id.into(),
        }
    }

    /// Register `handler`, replacing any previous one.
    pub fn set_handler(&mut self, handler: Box<dyn CommandHandler>) {
        self.handler = Some(handler);
    }

    pub fn clear_handler(&mut self) {
        self.handler = None;
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    pub fn dispatch(&mut self, topic: &str, payload: &[u8]) -> DispatchOutcome {
        let Some(parsed) = topics::parse_inbound(topic) else {
            tracing::warn!(topic, "discarding message on malformed topic");
            return DispatchOutcome::Malformed;
        };

        if payload.len() > self.capacity {
            tracing::warn!(
                topic,
                len = payload.len(),
                capacity = self.capacity,
                "discarding oversized message"
            );
            return DispatchOutcome::Oversized;
        }

        let Some(handler) = self.handler.as_mut() else {
            tracing::debug!(topic, "no command handler registered, discarding");
            return DispatchOutcome::NoHandler;
        };

        self.read_buf.clear();
        self.read_buf.extend_from_slice(payload);

        match parsed {
            InboundTopic::Command(cmd) => {
                let command = Command {
                    device_type: cmd.device_type.as_deref().unwrap_or(self.device_type.as_str()),
                    device_id: cmd.device_id.as_deref().unwrap_or(self.device_id.as_str()),
                    name: &cmd.command,
                    format: &cmd.format,
                    payload: &self.read_buf,
                };
                tracing::debug!(
                    command = command.name,
                    format = command.format,
                    len = command.payload_len(),
                    "dispatching command"
                );
                handler.on_command(&command);
                DispatchOutcome::Command
            }
            InboundTopic::Notification {
                device_type,
                device_id,
            } => {
                handler.on_notification(&Notification {
                    device_type: &device_type,
                    device_id: &device_id,
                    payload: &self.read_buf,
                });
                DispatchOutcome::Notification
            }
        }
    }
}
