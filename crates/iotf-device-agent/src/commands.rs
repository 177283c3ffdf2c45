//! Command handling and subscriptions for the agent.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use iotf_client::{
    ClientResult, Command, CommandHandler, IotfClient, Notification, QoS, Transport,
};

use crate::config::AttachedDevice;

/// Logs every command and notification, counting commands.
pub struct CommandLogger {
    handled: Arc<AtomicU64>,
}

impl CommandLogger {
    pub fn new(handled: Arc<AtomicU64>) -> Self {
        Self { handled }
    }
}

impl CommandHandler for CommandLogger {
    fn on_command(&mut self, command: &Command<'_>) {
        self.handled.fetch_add(1, Ordering::Relaxed);
        match command.payload_str() {
            Some(body) => tracing::info!(
                device_type = command.device_type,
                device_id = command.device_id,
                command = command.name,
                format = command.format,
                payload = body,
                "received command"
            ),
            None => tracing::info!(
                device_type = command.device_type,
                device_id = command.device_id,
                command = command.name,
                format = command.format,
                len = command.payload_len(),
                "received binary command"
            ),
        }
    }

    fn on_notification(&mut self, notification: &Notification<'_>) {
        tracing::warn!(
            device_type = notification.device_type,
            device_id = notification.device_id,
            payload = %String::from_utf8_lossy(notification.payload),
            "gateway notification"
        );
    }
}

/// Subscribe to everything the agent handles.
///
/// Devices take all of their own commands. Gateways take their own
/// commands, their notifications, and the commands of every attached
/// device. Quickstart handles have no command channel and subscribe to
/// nothing.
pub async fn subscribe<T: Transport>(
    client: &mut IotfClient<T>,
    attached: &[AttachedDevice],
) -> ClientResult<()> {
    if client.config().is_quickstart() {
        tracing::info!("quickstart mode: commands are not available");
        return Ok(());
    }

    if !client.config().is_gateway() {
        return client.subscribe_commands().await;
    }

    client.subscribe_to_gateway_commands(QoS::AtMostOnce).await?;
    client.subscribe_to_gateway_notification().await?;
    for device in attached {
        client
            .subscribe_to_device_commands(
                &device.device_type,
                &device.device_id,
                "+",
                "+",
                QoS::AtMostOnce,
            )
            .await?;
    }
    Ok(())
}
