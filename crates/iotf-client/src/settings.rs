//! Process-wide client settings.
//!
//! Settings are installed once, before the first handle is created, and
//! are immutable afterwards. Handles built with [`IotfClient::new`] read
//! [`ClientSettings::current`]; tests pass settings explicitly through
//! [`IotfClient::with_settings`].
//!
//! [`IotfClient::new`]: crate::client::IotfClient::new
//! [`IotfClient::with_settings`]: crate::client::IotfClient::with_settings

use std::sync::OnceLock;
use std::time::Duration;

use iotf_protocol::{BUFFER_SIZE, DEFAULT_KEEP_ALIVE_SECS};
use serde::Deserialize;

use crate::session::Backoff;

static INSTALLED: OnceLock<ClientSettings> = OnceLock::new();

/// Tunables shared by every handle in the process.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientSettings {
    /// MQTT keep-alive interval in seconds.
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u16,
    /// Capacity of each handle's send and receive buffer.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// How long to wait for the broker's CONNACK.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// How long to wait for publish/subscribe acknowledgements.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,
    /// First reconnect delay.
    #[serde(default = "default_reconnect_initial")]
    pub reconnect_initial_ms: u64,
    /// Upper bound on the reconnect delay.
    #[serde(default = "default_reconnect_max")]
    pub reconnect_max_ms: u64,
}

fn default_keepalive() -> u16 {
    DEFAULT_KEEP_ALIVE_SECS
}

fn default_buffer_capacity() -> usize {
    BUFFER_SIZE
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_operation_timeout() -> u64 {
    10
}

fn default_reconnect_initial() -> u64 {
    3_000
}

fn default_reconnect_max() -> u64 {
    600_000
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            keepalive_secs: default_keepalive(),
            buffer_capacity: default_buffer_capacity(),
            connect_timeout_secs: default_connect_timeout(),
            operation_timeout_secs: default_operation_timeout(),
            reconnect_initial_ms: default_reconnect_initial(),
            reconnect_max_ms: default_reconnect_max(),
        }
    }
}

impl ClientSettings {
    /// Install these settings for the whole process.
    ///
    /// Fails, handing the settings back, if settings were already installed
    /// or [`ClientSettings::current`] has already been read.
    pub fn install(self) -> Result<(), Self> {
        INSTALLED.set(self)
    }

    /// The installed settings, or the defaults if none were installed.
    pub fn current() -> &'static ClientSettings {
        INSTALLED.get_or_init(ClientSettings::default)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs.into())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.reconnect_initial_ms),
            Duration::from_millis(self.reconnect_max_ms),
        )
    }
}
