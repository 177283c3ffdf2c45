//! Identity resolution: raw parameters in, validated `Config` out.

use std::fmt;
use std::path::{Path, PathBuf};

use iotf_protocol::{DEFAULT_DOMAIN, PLAINTEXT_PORT, QUICKSTART_ORG, TLS_PORT};
use serde::Deserialize;

use crate::error::ConfigError;

/// Directory the secure element exports its certificates into when the
/// identity does not name one.
pub const DEFAULT_SE_CERT_DIR: &str = "/var/lib/iotf/se-certs";

/// Whether a handle is a standalone device or a gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Device,
    Gateway,
}

impl Role {
    /// Client id prefix the platform expects for this role.
    pub fn prefix(&self) -> char {
        match self {
            Self::Device => 'd',
            Self::Gateway => 'g',
        }
    }
}

/// Raw identity parameters, loadable from TOML.
///
/// Everything is optional at this stage; [`Config::resolve`] decides what
/// is actually required.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IdentityParams {
    /// Organization id, or `quickstart`.
    pub org: String,
    /// Platform domain (defaults to `internetofthings.ibmcloud.com`).
    pub domain: Option<String>,
    #[serde(alias = "type")]
    pub device_type: String,
    #[serde(alias = "id")]
    pub device_id: String,
    /// `token` or `cert`.
    pub auth_method: Option<String>,
    pub auth_token: Option<String>,
    /// Custom CA for verifying the broker in server-auth TLS.
    pub server_cert_path: Option<PathBuf>,
    pub use_client_certs: bool,
    pub root_ca_path: Option<PathBuf>,
    pub client_cert_path: Option<PathBuf>,
    pub client_key_path: Option<PathBuf>,
    pub use_secure_element: bool,
    pub secure_element_cert_dir: Option<PathBuf>,
    pub port: Option<u16>,
}

/// How the client proves its identity to the broker.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// Quickstart: anonymous.
    None,
    Token(String),
    /// Identity carried by the TLS client certificate.
    Certificate,
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Token(_) => f.write_str("Token(<redacted>)"),
            Self::Certificate => f.write_str("Certificate"),
        }
    }
}

/// Where TLS material comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsMaterial {
    /// No TLS at all.
    Plaintext,
    /// Server-authenticated TLS, optionally against a custom CA.
    ServerAuth { server_cert: Option<PathBuf> },
    /// Mutual TLS from PEM files.
    Files {
        root_ca: PathBuf,
        client_cert: PathBuf,
        client_key: PathBuf,
    },
    /// Mutual TLS with client material held by a secure element.
    SecureElement {
        cert_dir: PathBuf,
        root_ca: Option<PathBuf>,
    },
}

impl TlsMaterial {
    pub fn has_client_credentials(&self) -> bool {
        matches!(self, Self::Files { .. } | Self::SecureElement { .. })
    }
}

/// A validated client identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub org: String,
    pub domain: String,
    pub device_type: String,
    pub device_id: String,
    pub auth: Auth,
    pub tls: TlsMaterial,
    pub port: u16,
    pub role: Role,
}

impl Config {
    /// Validate raw parameters for the given role.
    pub fn resolve(params: IdentityParams, role: Role) -> Result<Self, ConfigError> {
        let org = required("org", &params.org)?;
        let device_type = required("device_type", &params.device_type)?;
        let device_id = required("device_id", &params.device_id)?;
        let domain = params
            .domain
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(DEFAULT_DOMAIN)
            .to_string();

        if org == QUICKSTART_ORG {
            return resolve_quickstart(params, role, org, domain, device_type, device_id);
        }

        let port = params.port.unwrap_or(TLS_PORT);
        let tls = resolve_tls(&params, port)?;
        let auth = resolve_auth(&params, &tls)?;

        Ok(Self {
            org,
            domain,
            device_type,
            device_id,
            auth,
            tls,
            port,
            role,
        })
    }

    /// Load identity parameters from a TOML file and resolve them.
    pub fn from_file(path: impl AsRef<Path>, role: Role) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config_file_error = |reason: String| ConfigError::ConfigFile {
            path: path.display().to_string(),
            reason,
        };

        let contents = std::fs::read_to_string(path).map_err(|e| config_file_error(e.to_string()))?;
        let params: IdentityParams =
            toml::from_str(&contents).map_err(|e| config_file_error(e.to_string()))?;
        Self::resolve(params, role)
    }

    pub fn is_quickstart(&self) -> bool {
        self.org == QUICKSTART_ORG
    }

    pub fn is_gateway(&self) -> bool {
        self.role == Role::Gateway
    }
}

fn resolve_quickstart(
    params: IdentityParams,
    role: Role,
    org: String,
    domain: String,
    device_type: String,
    device_id: String,
) -> Result<Config, ConfigError> {
    if role == Role::Gateway {
        return Err(ConfigError::InvalidCombination(
            "gateway role is not available in quickstart mode".into(),
        ));
    }
    if params.use_client_certs || params.use_secure_element {
        return Err(ConfigError::InvalidCombination(
            "quickstart mode does not use client certificates".into(),
        ));
    }
    if let Some(port) = params.port.filter(|port| *port != PLAINTEXT_PORT) {
        return Err(ConfigError::InvalidCombination(format!(
            "quickstart only accepts plaintext connections on port {PLAINTEXT_PORT}, got {port}"
        )));
    }

    Ok(Config {
        org,
        domain,
        device_type,
        device_id,
        auth: Auth::None,
        tls: TlsMaterial::Plaintext,
        port: PLAINTEXT_PORT,
        role,
    })
}

fn resolve_tls(params: &IdentityParams, port: u16) -> Result<TlsMaterial, ConfigError> {
    let client_cert = present(&params.client_cert_path);
    let client_key = present(&params.client_key_path);

    if port == PLAINTEXT_PORT {
        if params.use_client_certs || params.use_secure_element {
            return Err(ConfigError::InvalidCombination(format!(
                "client certificates require TLS, but port {PLAINTEXT_PORT} is plaintext"
            )));
        }
        return Ok(TlsMaterial::Plaintext);
    }

    if params.use_secure_element {
        if client_cert.is_some() || client_key.is_some() {
            return Err(ConfigError::InvalidCombination(
                "secure element mode cannot be combined with client certificate paths".into(),
            ));
        }
        return Ok(TlsMaterial::SecureElement {
            cert_dir: present(&params.secure_element_cert_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SE_CERT_DIR)),
            root_ca: present(&params.root_ca_path),
        });
    }

    if params.use_client_certs {
        return Ok(TlsMaterial::Files {
            root_ca: present(&params.root_ca_path)
                .ok_or(ConfigError::MissingParameter("root_ca_path"))?,
            client_cert: client_cert.ok_or(ConfigError::MissingParameter("client_cert_path"))?,
            client_key: client_key.ok_or(ConfigError::MissingParameter("client_key_path"))?,
        });
    }

    Ok(TlsMaterial::ServerAuth {
        server_cert: present(&params.server_cert_path),
    })
}

fn resolve_auth(params: &IdentityParams, tls: &TlsMaterial) -> Result<Auth, ConfigError> {
    let method = params
        .auth_method
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or(ConfigError::MissingParameter("auth_method"))?;

    match method.to_ascii_lowercase().as_str() {
        "token" => {
            let token = required("auth_token", params.auth_token.as_deref().unwrap_or(""))?;
            Ok(Auth::Token(token))
        }
        "cert" | "certificate" => {
            if !tls.has_client_credentials() {
                return Err(ConfigError::InvalidCombination(
                    "certificate authentication requires client certificates or a secure element"
                        .into(),
                ));
            }
            Ok(Auth::Certificate)
        }
        other => Err(ConfigError::InvalidCombination(format!(
            "unsupported auth method {other:?}"
        ))),
    }
}

fn required(field: &'static str, value: &str) -> Result<String, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::MissingParameter(field));
    }
    Ok(value.to_string())
}

fn present(path: &Option<PathBuf>) -> Option<PathBuf> {
    path.as_ref()
        .filter(|p| !p.as_os_str().is_empty())
        .cloned()
}
