//! Broker endpoint derivation.
//!
//! Turns a validated [`Config`] plus resolved credentials into everything
//! the transport needs to open a session. The endpoint is built once per
//! handle and reused verbatim on every reconnect, so the broker sees the
//! same client id each time.

use std::fmt;
use std::time::Duration;

use iotf_protocol::{QUICKSTART_HOST, TOKEN_AUTH_USERNAME};

use crate::config::{Auth, Config, TlsMaterial};
use crate::settings::ClientSettings;
use crate::tls::CredentialBundle;

/// MQTT username/password pair.
#[derive(Clone, PartialEq, Eq)]
pub struct MqttCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for MqttCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// TLS setup for the transport.
#[derive(Clone, PartialEq, Eq)]
pub enum TlsContext {
    Plaintext,
    /// Verify the broker; `ca` of `None` means the platform's default roots.
    ServerAuth { ca: Option<Vec<u8>> },
    Mutual {
        ca: Vec<u8>,
        client_cert: Vec<u8>,
        client_key: Vec<u8>,
    },
}

impl fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plaintext => f.write_str("Plaintext"),
            Self::ServerAuth { ca } => f
                .debug_struct("ServerAuth")
                .field("custom_ca", &ca.is_some())
                .finish(),
            Self::Mutual { .. } => f.write_str("Mutual"),
        }
    }
}

impl TlsContext {
    fn new(material: &TlsMaterial, bundle: CredentialBundle) -> Self {
        match (material, bundle) {
            (TlsMaterial::Plaintext, _) => Self::Plaintext,
            (
                _,
                CredentialBundle::Mutual {
                    ca,
                    client_cert,
                    client_key,
                },
            ) => Self::Mutual {
                ca,
                client_cert,
                client_key,
            },
            (_, CredentialBundle::ServerCa(ca)) => Self::ServerAuth { ca: Some(ca) },
            (_, CredentialBundle::Empty) => Self::ServerAuth { ca: None },
        }
    }

    pub fn is_tls(&self) -> bool {
        !matches!(self, Self::Plaintext)
    }
}

/// Everything needed to open one MQTT session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    pub credentials: Option<MqttCredentials>,
    pub tls: TlsContext,
}

impl Endpoint {
    pub fn new(config: &Config, bundle: CredentialBundle, settings: &ClientSettings) -> Self {
        let credentials = match &config.auth {
            Auth::Token(token) => Some(MqttCredentials {
                username: TOKEN_AUTH_USERNAME.to_string(),
                password: token.clone(),
            }),
            Auth::None | Auth::Certificate => None,
        };

        Self {
            host: broker_host(config),
            port: config.port,
            client_id: client_id(config),
            keep_alive: settings.keep_alive(),
            connect_timeout: settings.connect_timeout(),
            credentials,
            tls: TlsContext::new(&config.tls, bundle),
        }
    }
}

/// `{org}.messaging.{domain}`, or the fixed quickstart host.
pub fn broker_host(config: &Config) -> String {
    if config.is_quickstart() {
        QUICKSTART_HOST.to_string()
    } else {
        format!("{}.messaging.{}", config.org, config.domain)
    }
}

/// `d:{org}:{type}:{id}` for devices, `g:...` for gateways.
pub fn client_id(config: &Config) -> String {
    format!(
        "{}:{}:{}:{}",
        config.role.prefix(),
        config.org,
        config.device_type,
        config.device_id
    )
}
