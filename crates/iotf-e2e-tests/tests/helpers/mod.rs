//! Shared test harness for E2E integration tests.
//!
//! Wires a real `IotfClient` to a shared `MockTransport`, exercising
//! identity resolution, credential provisioning, session handling and
//! dispatch across crate boundaries.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use iotf_client::{
    ClientSettings, Command, CommandHandler, Config, IdentityParams, IotfClient, MockTransport,
    Notification, Role,
};

/// A command as seen by the handler, copied out of the borrowed envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    pub device_type: String,
    pub device_id: String,
    pub name: String,
    pub format: String,
    pub payload: Vec<u8>,
}

/// Everything the harness handler observed.
#[derive(Debug, Default)]
pub struct Recorded {
    pub commands: Vec<RecordedCommand>,
    pub notifications: Vec<(String, String, Vec<u8>)>,
}

/// Handler that records into shared state.
pub struct RecordingHandler(pub Arc<Mutex<Recorded>>);

impl CommandHandler for RecordingHandler {
    fn on_command(&mut self, command: &Command<'_>) {
        self.0.lock().unwrap().commands.push(RecordedCommand {
            device_type: command.device_type.to_string(),
            device_id: command.device_id.to_string(),
            name: command.name.to_string(),
            format: command.format.to_string(),
            payload: command.payload.to_vec(),
        });
    }

    fn on_notification(&mut self, notification: &Notification<'_>) {
        self.0.lock().unwrap().notifications.push((
            notification.device_type.to_string(),
            notification.device_id.to_string(),
            notification.payload.to_vec(),
        ));
    }
}

/// End-to-end harness: one client handle plus an observer clone of its
/// transport.
pub struct TestHarness {
    pub client: IotfClient<MockTransport>,
    /// Shares state with the transport owned by `client`.
    pub mqtt: MockTransport,
    pub recorded: Arc<Mutex<Recorded>>,
}

impl TestHarness {
    /// Registered device `thermostat/t-001` in org `abc123`, token auth,
    /// plaintext on 1883.
    pub fn device() -> Self {
        Self::with_identity(token_identity("thermostat", "t-001"), Role::Device)
    }

    /// Registered gateway `edge-gw/gw-01` in org `abc123`.
    pub fn gateway() -> Self {
        Self::with_identity(token_identity("edge-gw", "gw-01"), Role::Gateway)
    }

    /// Quickstart device `demo/aabbccddeeff`.
    pub fn quickstart() -> Self {
        let params = IdentityParams {
            org: "quickstart".into(),
            device_type: "demo".into(),
            device_id: "aabbccddeeff".into(),
            ..IdentityParams::default()
        };
        Self::with_identity(params, Role::Device)
    }

    pub fn with_identity(params: IdentityParams, role: Role) -> Self {
        let config = Config::resolve(params, role).unwrap();
        Self::with_config(config)
    }

    pub fn with_config(config: Config) -> Self {
        let mqtt = MockTransport::new();
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let mut client = IotfClient::with_settings(config, mqtt.clone(), fast_settings());
        client.set_command_handler(RecordingHandler(recorded.clone()));
        Self {
            client,
            mqtt,
            recorded,
        }
    }

    /// Deliver `payload` on `topic` and run one short yield.
    pub async fn deliver(&mut self, topic: &str, payload: &[u8]) -> bool {
        self.mqtt.push_inbound(topic, payload);
        self.client
            .yield_for(Duration::from_millis(10))
            .await
            .unwrap()
    }

    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.recorded.lock().unwrap().commands.clone()
    }

    pub fn notifications(&self) -> Vec<(String, String, Vec<u8>)> {
        self.recorded.lock().unwrap().notifications.clone()
    }
}

/// Token-auth identity on the plaintext port.
pub fn token_identity(device_type: &str, device_id: &str) -> IdentityParams {
    IdentityParams {
        org: "abc123".into(),
        device_type: device_type.into(),
        device_id: device_id.into(),
        auth_method: Some("token".into()),
        auth_token: Some("s3cret-token".into()),
        port: Some(1883),
        ..IdentityParams::default()
    }
}

/// Backoff of 10 ms doubling to 80 ms, so reconnect tests run quickly.
pub fn fast_settings() -> ClientSettings {
    ClientSettings {
        reconnect_initial_ms: 10,
        reconnect_max_ms: 80,
        ..ClientSettings::default()
    }
}

pub const PEM: &[u8] = b"-----BEGIN CERTIFICATE-----\nMIIBtest\n-----END CERTIFICATE-----\n";
