//! Constants that form the implicit contract with the platform and with
//! applications embedding the client.

/// Capacity of the per-handle send and receive buffers, in bytes.
pub const BUFFER_SIZE: usize = 1024;

/// Maximum number of simultaneous subscriptions per handle.
pub const MAX_SUBSCRIPTIONS: usize = 5;

/// Default MQTT keep-alive interval.
pub const DEFAULT_KEEP_ALIVE_SECS: u16 = 60;

/// Platform domain used when the identity does not name one.
pub const DEFAULT_DOMAIN: &str = "internetofthings.ibmcloud.com";

/// Organization id that selects quickstart mode.
pub const QUICKSTART_ORG: &str = "quickstart";

/// Broker host for quickstart connections.
pub const QUICKSTART_HOST: &str = "quickstart.messaging.internetofthings.ibmcloud.com";

pub const PLAINTEXT_PORT: u16 = 1883;
pub const TLS_PORT: u16 = 8883;

/// MQTT username announcing token authentication.
pub const TOKEN_AUTH_USERNAME: &str = "use-token-auth";

// ─── Return codes ───

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = -1;
pub const CONFIG_FILE_ERROR: i32 = -3;
pub const MISSING_INPUT_PARAM: i32 = -4;
pub const QUICKSTART_NOT_SUPPORTED: i32 = -5;
pub const SE_CERT_ERROR: i32 = -6;
