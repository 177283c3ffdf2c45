//! Periodic status event publisher.
//!
//! Publishes a `status` event at a configurable interval so the platform
//! knows the device is alive, and drives inbound dispatch and reconnects
//! between publishes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use iotf_client::{ClientResult, IotfClient, QoS, Transport};

/// Event type segment of the status topic.
pub const STATUS_EVENT: &str = "status";

/// Body of a status event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status {
    pub device_type: String,
    pub device_id: String,
    pub uptime_secs: u64,
    pub commands_handled: u64,
    pub agent_version: String,
    pub timestamp: DateTime<Utc>,
}

/// Platform JSON envelope: `{"d": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEvent {
    pub d: Status,
}

impl StatusEvent {
    pub fn new(device_type: &str, device_id: &str, uptime: Duration, commands_handled: u64) -> Self {
        Self {
            d: Status {
                device_type: device_type.to_string(),
                device_id: device_id.to_string(),
                uptime_secs: uptime.as_secs(),
                commands_handled,
                agent_version: env!("CARGO_PKG_VERSION").to_string(),
                timestamp: Utc::now(),
            },
        }
    }
}

/// Run the status loop, publishing every `interval`.
///
/// Returns only when the handle can no longer be driven (explicit
/// disconnect, or a connect that never succeeded). Publishes are skipped
/// while the handle is reconnecting.
pub async fn run<T: Transport>(
    client: &mut IotfClient<T>,
    interval: Duration,
    format: &str,
    start_time: tokio::time::Instant,
    commands_handled: &AtomicU64,
) -> ClientResult<()> {
    loop {
        if client.is_connected() {
            let event = StatusEvent::new(
                &client.config().device_type,
                &client.config().device_id,
                start_time.elapsed(),
                commands_handled.load(Ordering::Relaxed),
            );
            match serde_json::to_vec(&event) {
                Ok(payload) => {
                    if let Err(e) = client
                        .publish_event(STATUS_EVENT, format, &payload, QoS::AtMostOnce)
                        .await
                    {
                        tracing::warn!(error = %e, "failed to publish status");
                    } else {
                        tracing::debug!(uptime_secs = event.d.uptime_secs, "status sent");
                    }
                }
                Err(e) => tracing::error!(error = %e, "failed to serialize status"),
            }
        } else {
            tracing::debug!(state = %client.state(), "skipping status while not connected");
        }

        client.yield_for(interval).await?;
    }
}
