//! Role-aware topic construction.
//!
//! Wraps the raw builders in `iotf_protocol::topics` with the checks a
//! handle needs: which role may use which topic, segment validity, and
//! the buffer capacity.

use iotf_protocol::topics::{self, WILDCARD};

use crate::config::{Config, Role};
use crate::error::{ClientError, ClientResult, Unsupported};

/// Derives publish and subscribe topics for one handle.
#[derive(Debug, Clone)]
pub struct TopicRouter {
    role: Role,
    quickstart: bool,
    device_type: String,
    device_id: String,
    capacity: usize,
}

impl TopicRouter {
    pub fn new(config: &Config, capacity: usize) -> Self {
        Self {
            role: config.role,
            quickstart: config.is_quickstart(),
            device_type: config.device_type.clone(),
            device_id: config.device_id.clone(),
            capacity,
        }
    }

    /// Event published by this handle about itself.
    ///
    /// Devices use the short form; a gateway publishes under its own
    /// type/id scope.
    pub fn event(&self, event_type: &str, format: &str) -> ClientResult<String> {
        match self.role {
            Role::Device => {
                check_event(event_type, format)?;
                self.fit(topics::device_event(event_type, format))
            }
            Role::Gateway => self.gateway_event(event_type, format),
        }
    }

    pub fn gateway_event(&self, event_type: &str, format: &str) -> ClientResult<String> {
        self.require_gateway("gateway event publish")?;
        check_event(event_type, format)?;
        self.fit(topics::scoped_event(
            &self.device_type,
            &self.device_id,
            event_type,
            format,
        ))
    }

    /// Event a gateway publishes on behalf of an attached device.
    pub fn device_event(
        &self,
        device_type: &str,
        device_id: &str,
        event_type: &str,
        format: &str,
    ) -> ClientResult<String> {
        self.require_gateway("device event publish")?;
        topics::validate_segment("device type", device_type)?;
        topics::validate_segment("device id", device_id)?;
        check_event(event_type, format)?;
        self.fit(topics::scoped_event(
            device_type,
            device_id,
            event_type,
            format,
        ))
    }

    /// Command filter for this handle's own commands.
    pub fn command(&self, command: &str, format: &str) -> ClientResult<String> {
        self.require_registered("command subscription")?;
        check_command_filter(command, format)?;
        match self.role {
            Role::Device => self.fit(topics::device_command(command, format)),
            Role::Gateway => self.fit(topics::scoped_command(
                &self.device_type,
                &self.device_id,
                command,
                format,
            )),
        }
    }

    /// Every command for this handle.
    pub fn all_commands(&self) -> ClientResult<String> {
        self.command(WILDCARD, WILDCARD)
    }

    /// Every command addressed to the gateway itself.
    pub fn gateway_commands(&self) -> ClientResult<String> {
        self.require_gateway("gateway command subscription")?;
        self.all_commands()
    }

    /// Command filter for a device attached to this gateway.
    pub fn device_command(
        &self,
        device_type: &str,
        device_id: &str,
        command: &str,
        format: &str,
    ) -> ClientResult<String> {
        self.require_gateway("device command subscription")?;
        topics::validate_filter_segment("device type", device_type, false)?;
        topics::validate_filter_segment("device id", device_id, false)?;
        check_command_filter(command, format)?;
        self.fit(topics::scoped_command(
            device_type,
            device_id,
            command,
            format,
        ))
    }

    pub fn notifications(&self) -> ClientResult<String> {
        self.require_gateway("notification subscription")?;
        self.fit(topics::notification(&self.device_type, &self.device_id))
    }

    fn fit(&self, topic: String) -> ClientResult<String> {
        Ok(topics::ensure_capacity(topic, self.capacity)?)
    }

    fn require_gateway(&self, operation: &'static str) -> ClientResult<()> {
        if self.role == Role::Gateway {
            Ok(())
        } else {
            Err(ClientError::UnsupportedOperation {
                operation,
                reason: Unsupported::DeviceRole,
            })
        }
    }

    fn require_registered(&self, operation: &'static str) -> ClientResult<()> {
        if self.quickstart {
            Err(ClientError::UnsupportedOperation {
                operation,
                reason: Unsupported::Quickstart,
            })
        } else {
            Ok(())
        }
    }
}

fn check_event(event_type: &str, format: &str) -> ClientResult<()> {
    topics::validate_segment("event type", event_type)?;
    topics::validate_segment("event format", format)?;
    Ok(())
}

fn check_command_filter(command: &str, format: &str) -> ClientResult<()> {
    topics::validate_filter_segment("command", command, false)?;
    topics::validate_filter_segment("command format", format, true)?;
    Ok(())
}
