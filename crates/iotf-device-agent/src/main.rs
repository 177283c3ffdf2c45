//! IoT Foundation device agent.
//!
//! Connects a device or gateway to the platform, publishes periodic
//! status events, and logs the commands it receives.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use iotf_client::{ClientSettings, IotfClient, MqttTransport};
use iotf_device_agent::commands::{self, CommandLogger};
use iotf_device_agent::config::AgentConfig;
use iotf_device_agent::{startup, status};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Load config ─────────────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/iotf/agent.toml".to_string());

    let config = AgentConfig::from_file(&config_path)?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).json().init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path,
        "iotf-device-agent starting"
    );

    if config.client.clone().install().is_err() {
        anyhow::bail!("client settings were already installed");
    }
    let identity = config.resolve_identity()?;
    tracing::info!(
        org = %identity.org,
        device_type = %identity.device_type,
        device_id = %identity.device_id,
        role = ?identity.role,
        "identity resolved"
    );

    // ── Connect ─────────────────────────────────────────────────
    let transport = MqttTransport::from_settings(ClientSettings::current());
    let mut client = IotfClient::new(identity, transport);

    let handled = Arc::new(AtomicU64::new(0));
    client.set_command_handler(CommandLogger::new(handled.clone()));

    startup::connect(&mut client).await?;
    commands::subscribe(&mut client, &config.attached_devices).await?;
    tracing::info!("iotf-device-agent ready");

    // ── Run until shutdown ──────────────────────────────────────
    let start_time = tokio::time::Instant::now();

    tokio::select! {
        result = status::run(
            &mut client,
            Duration::from_secs(config.status_interval_secs),
            &config.status_format,
            start_time,
            &handled,
        ) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "status loop exited unexpectedly");
            }
        }
        // Graceful shutdown on SIGINT
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    client.disconnect().await?;
    tracing::info!("iotf-device-agent stopped");
    Ok(())
}
