//! Credential provisioning for TLS and mutual-TLS sessions.
//!
//! Client material comes either from PEM files named in the identity or
//! from a secure element. Either way it is read once, before the first
//! connect, and handed to the bootstrapper as a [`CredentialBundle`].

use std::path::Path;

use thiserror::Error;

use crate::config::{Config, TlsMaterial};
use crate::error::CredentialError;

/// Certificate material exported by a secure element.
#[derive(Clone, PartialEq, Eq)]
pub struct CertBundle {
    pub client_cert: Vec<u8>,
    /// Private key, or a key reference the TLS engine resolves inside the
    /// element.
    pub client_key: Vec<u8>,
    pub root_ca: Option<Vec<u8>>,
}

/// Errors reported by a secure element driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecureElementError {
    #[error("secure element not present")]
    Absent,

    #[error("secure element is locked")]
    Locked,

    #[error("malformed data from secure element: {0}")]
    Malformed(String),

    #[error("{0}")]
    Other(String),
}

/// Hardware that holds the client certificate and key.
pub trait SecureElement: Send + Sync {
    /// Retrieve certificate material, using `cert_dir` as the element's
    /// export directory.
    fn retrieve_certificates(&self, cert_dir: &Path) -> Result<CertBundle, SecureElementError>;
}

/// Material the transport needs to set up TLS.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialBundle {
    /// Plaintext, or server-auth TLS against the platform's default roots.
    Empty,
    /// Server-auth TLS against a custom CA.
    ServerCa(Vec<u8>),
    /// Mutual TLS.
    Mutual {
        ca: Vec<u8>,
        client_cert: Vec<u8>,
        client_key: Vec<u8>,
    },
}

impl std::fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::ServerCa(ca) => write!(f, "ServerCa({} bytes)", ca.len()),
            Self::Mutual { ca, client_cert, .. } => write!(
                f,
                "Mutual {{ ca: {} bytes, client_cert: {} bytes, client_key: <redacted> }}",
                ca.len(),
                client_cert.len()
            ),
        }
    }
}

/// Resolve the credentials selected by `config`.
///
/// Failures here are configuration problems, never retried by the
/// reconnect loop.
pub fn resolve_credentials(
    config: &Config,
    secure_element: Option<&dyn SecureElement>,
) -> Result<CredentialBundle, CredentialError> {
    match &config.tls {
        TlsMaterial::Plaintext | TlsMaterial::ServerAuth { server_cert: None } => {
            Ok(CredentialBundle::Empty)
        }
        TlsMaterial::ServerAuth {
            server_cert: Some(path),
        } => Ok(CredentialBundle::ServerCa(read_pem(path, "server cert")?)),
        TlsMaterial::Files {
            root_ca,
            client_cert,
            client_key,
        } => Ok(CredentialBundle::Mutual {
            ca: read_pem(root_ca, "CA cert")?,
            client_cert: read_pem(client_cert, "client cert")?,
            client_key: read_pem(client_key, "client key")?,
        }),
        TlsMaterial::SecureElement { cert_dir, root_ca } => {
            let element = secure_element.ok_or_else(|| {
                CredentialError::SecureElement("no secure element driver configured".into())
            })?;
            let bundle = element
                .retrieve_certificates(cert_dir)
                .map_err(|e| CredentialError::SecureElement(e.to_string()))?;

            check_element_pem(&bundle.client_cert, "client certificate")?;
            check_element_pem(&bundle.client_key, "client key")?;

            let ca = match root_ca {
                Some(path) => read_pem(path, "CA cert")?,
                None => bundle.root_ca.ok_or_else(|| {
                    CredentialError::SecureElement(
                        "no root CA configured and none stored in the secure element".into(),
                    )
                })?,
            };

            Ok(CredentialBundle::Mutual {
                ca,
                client_cert: bundle.client_cert,
                client_key: bundle.client_key,
            })
        }
    }
}

fn is_pem(bytes: &[u8]) -> bool {
    bytes.windows(11).any(|w| w == b"-----BEGIN ")
}

fn read_pem(path: &Path, what: &'static str) -> Result<Vec<u8>, CredentialError> {
    let bytes = std::fs::read(path).map_err(|source| CredentialError::CertificateFile {
        what,
        path: path.display().to_string(),
        source,
    })?;
    if !is_pem(&bytes) {
        return Err(CredentialError::NotPem {
            what,
            path: path.display().to_string(),
        });
    }
    Ok(bytes)
}

fn check_element_pem(bytes: &[u8], what: &str) -> Result<(), CredentialError> {
    if is_pem(bytes) {
        Ok(())
    } else {
        Err(CredentialError::SecureElement(format!(
            "{what} returned by the secure element is not PEM"
        )))
    }
}
