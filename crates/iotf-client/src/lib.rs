//! Device and gateway client runtime for the IoT Foundation platform.
//!
//! Provides a connection handle over MQTT:
//! - `Config` identity resolution (inline parameters or a TOML file)
//! - Credential provisioning from PEM files or a `SecureElement`
//! - `IotfClient` with connect/reconnect backoff, event publishing and
//!   command subscriptions for device and gateway roles
//! - `Transport` trait with `MqttTransport` (rumqttc) for production and
//!   `MockTransport` for testing without a broker

pub mod bootstrap;
pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod mock;
pub mod router;
pub mod session;
pub mod settings;
pub mod tls;
pub mod transport;

// Re-exports for convenience.
pub use bootstrap::{Endpoint, MqttCredentials, TlsContext};
pub use client::IotfClient;
pub use config::{Auth, Config, IdentityParams, Role, TlsMaterial};
pub use error::{
    ClientError, ClientResult, ConfigError, CredentialError, TransportError, TransportResult,
    Unsupported,
};
pub use handler::{Command, CommandHandler, Notification};
pub use iotf_protocol::QoS;
pub use mock::{MockTransport, PublishedMessage};
pub use session::{Backoff, SessionState};
pub use settings::ClientSettings;
pub use tls::{CertBundle, CredentialBundle, SecureElement, SecureElementError};
pub use transport::{InboundMessage, MqttTransport, Transport};
