//! Client error types.

use std::fmt;

use iotf_protocol::{
    CONFIG_FILE_ERROR, FAILURE, MISSING_INPUT_PARAM, QUICKSTART_NOT_SUPPORTED, SE_CERT_ERROR,
    TopicError,
};
use thiserror::Error;

/// Bad or missing identity parameters. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("invalid parameter combination: {0}")]
    InvalidCombination(String),

    #[error("failed to load config file '{path}': {reason}")]
    ConfigFile { path: String, reason: String },
}

/// Certificate or secure element failures. Never retried.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("secure element error: {0}")]
    SecureElement(String),

    #[error("failed to read {what} '{path}': {source}")]
    CertificateFile {
        what: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{what} '{path}' does not contain PEM data")]
    NotPem { what: &'static str, path: String },
}

/// Failures reported by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("not connected")]
    NotConnected,

    #[error("subscription rejected: {0}")]
    Rejected(String),
}

/// Convenience alias for transport results.
pub type TransportResult<T> = Result<T, TransportError>;

/// Why an operation is unavailable on a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unsupported {
    Quickstart,
    DeviceRole,
}

impl fmt::Display for Unsupported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quickstart => f.write_str("in quickstart mode"),
            Self::DeviceRole => f.write_str("for a device client"),
        }
    }
}

/// Errors surfaced by [`IotfClient`](crate::client::IotfClient).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("network error: {0}")]
    Network(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("not connected")]
    NotConnected,

    #[error("subscription rejected: {0}")]
    SubscriptionRejected(String),

    #[error(transparent)]
    Topic(#[from] TopicError),

    #[error("payload is {len} bytes, exceeding the {capacity}-byte buffer")]
    PayloadTooLarge { len: usize, capacity: usize },

    #[error("{operation} is not supported {reason}")]
    UnsupportedOperation {
        operation: &'static str,
        reason: Unsupported,
    },

    #[error("subscription limit of {0} reached")]
    SubscriptionLimit(usize),
}

impl ClientError {
    /// Numeric return code, as published to applications.
    pub fn code(&self) -> i32 {
        match self {
            Self::Config(ConfigError::ConfigFile { .. }) => CONFIG_FILE_ERROR,
            Self::Config(ConfigError::MissingParameter(_)) => MISSING_INPUT_PARAM,
            Self::Credential(CredentialError::SecureElement(_)) => SE_CERT_ERROR,
            Self::UnsupportedOperation {
                reason: Unsupported::Quickstart,
                ..
            } => QUICKSTART_NOT_SUPPORTED,
            _ => FAILURE,
        }
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Network(msg) => Self::Network(msg),
            TransportError::Auth(msg) => Self::Auth(msg),
            TransportError::Tls(msg) => Self::Tls(msg),
            TransportError::NotConnected => Self::NotConnected,
            TransportError::Rejected(msg) => Self::SubscriptionRejected(msg),
        }
    }
}

/// Convenience alias for client results.
pub type ClientResult<T> = Result<T, ClientError>;
