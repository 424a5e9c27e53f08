//! Server credentials.
//!
//! A [`Credential`] is the caller-owned description of how a listener is
//! secured. It is only borrowed while a security context is built from it.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::security::error::CredentialError;

/// Credential as written in the config file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CredentialConfig {
    /// TLS with a certificate chain and private key on disk.
    Tls(TlsCredentialConfig),
    /// Test-only mode: a fake handshake with no confidentiality.
    Insecure,
}

/// TLS credential paths.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct TlsCredentialConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,

    /// ALPN protocols to offer, in preference order.
    #[serde(default)]
    pub alpn_protocols: Vec<String>,
}

/// Server credential, one variant per security mechanism.
#[derive(Clone)]
pub enum Credential {
    Tls(TlsCredential),
    Insecure,
}

impl Credential {
    /// Materialize a configured credential, reading any files it names.
    pub fn from_config(config: &CredentialConfig) -> Result<Self, CredentialError> {
        match config {
            CredentialConfig::Tls(tls) => {
                let credential = TlsCredential::from_pem_files(
                    Path::new(&tls.cert_path),
                    Path::new(&tls.key_path),
                )?
                .with_alpn_protocols(tls.alpn_protocols.iter().map(|p| p.as_bytes().to_vec()));
                Ok(Credential::Tls(credential))
            }
            CredentialConfig::Insecure => Ok(Credential::Insecure),
        }
    }

    /// Short name of the variant, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Credential::Tls(_) => "tls",
            Credential::Insecure => "insecure",
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Tls(tls) => f.debug_tuple("Tls").field(tls).finish(),
            Credential::Insecure => f.write_str("Insecure"),
        }
    }
}

/// PEM-encoded certificate chain and private key.
///
/// The material is kept encoded; parsing happens when the security context
/// is created, so malformed input is reported as a context creation failure.
#[derive(Clone)]
pub struct TlsCredential {
    pub(crate) cert_chain_pem: Vec<u8>,
    pub(crate) private_key_pem: Vec<u8>,
    pub(crate) alpn_protocols: Vec<Vec<u8>>,
}

impl TlsCredential {
    /// Build from in-memory PEM.
    pub fn from_pem(
        cert_chain_pem: impl Into<Vec<u8>>,
        private_key_pem: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            cert_chain_pem: cert_chain_pem.into(),
            private_key_pem: private_key_pem.into(),
            alpn_protocols: Vec::new(),
        }
    }

    /// Read certificate chain and key from PEM files.
    pub fn from_pem_files(cert_path: &Path, key_path: &Path) -> Result<Self, CredentialError> {
        let read = |path: &Path| {
            std::fs::read(path).map_err(|source| CredentialError::Io {
                path: path.display().to_string(),
                source,
            })
        };
        Ok(Self::from_pem(read(cert_path)?, read(key_path)?))
    }

    /// Set the ALPN protocols offered during the handshake.
    pub fn with_alpn_protocols(mut self, protocols: impl IntoIterator<Item = Vec<u8>>) -> Self {
        self.alpn_protocols = protocols.into_iter().collect();
        self
    }
}

impl fmt::Debug for TlsCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsCredential")
            .field("cert_chain_pem_len", &self.cert_chain_pem.len())
            .field("private_key", &"<redacted>")
            .field("alpn_protocols", &self.alpn_protocols.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_files_report_path() {
        let config = CredentialConfig::Tls(TlsCredentialConfig {
            cert_path: "/nonexistent/cert.pem".into(),
            key_path: "/nonexistent/key.pem".into(),
            alpn_protocols: vec![],
        });

        match Credential::from_config(&config) {
            Err(CredentialError::Io { path, .. }) => assert_eq!(path, "/nonexistent/cert.pem"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn debug_redacts_key() {
        let credential = Credential::Tls(TlsCredential::from_pem("cert", "secret-key"));
        let rendered = format!("{credential:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("secret-key"));
    }

    #[test]
    fn insecure_config_maps_to_insecure_credential() {
        let credential = Credential::from_config(&CredentialConfig::Insecure).unwrap();
        assert_eq!(credential.kind(), "insecure");
    }
}
