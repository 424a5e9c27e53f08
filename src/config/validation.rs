//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0)
//! - Check every listener carries a usable credential
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: SecurePortConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::SecurePortConfig;
use crate::security::CredentialConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("no listeners configured")]
    NoListeners,

    #[error("listener {index}: address is empty")]
    EmptyAddress { index: usize },

    #[error("listener {index}: credential is missing")]
    MissingCredential { index: usize },

    #[error("listener {index}: TLS {field} is empty")]
    EmptyTlsPath { index: usize, field: &'static str },

    #[error("server.handshake_timeout_secs must be greater than zero")]
    ZeroHandshakeTimeout,

    #[error("server.max_pending_handshakes must be greater than zero")]
    ZeroPendingHandshakes,

    #[error("observability.metrics_address {0:?} is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &SecurePortConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listeners.is_empty() {
        errors.push(ValidationError::NoListeners);
    }

    for (index, listener) in config.listeners.iter().enumerate() {
        if listener.address.trim().is_empty() {
            errors.push(ValidationError::EmptyAddress { index });
        }
        match &listener.credential {
            None => errors.push(ValidationError::MissingCredential { index }),
            Some(CredentialConfig::Tls(tls)) => {
                if tls.cert_path.trim().is_empty() {
                    errors.push(ValidationError::EmptyTlsPath { index, field: "cert_path" });
                }
                if tls.key_path.trim().is_empty() {
                    errors.push(ValidationError::EmptyTlsPath { index, field: "key_path" });
                }
            }
            Some(CredentialConfig::Insecure) => {}
        }
    }

    if config.server.handshake_timeout_secs == 0 {
        errors.push(ValidationError::ZeroHandshakeTimeout);
    }
    if config.server.max_pending_handshakes == 0 {
        errors.push(ValidationError::ZeroPendingHandshakes);
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ListenerConfig;
    use crate::net::listener::BindPolicy;
    use crate::security::TlsCredentialConfig;

    fn listener(credential: Option<CredentialConfig>) -> ListenerConfig {
        ListenerConfig {
            address: "127.0.0.1:0".into(),
            credential,
            bind_policy: BindPolicy::AllowPartial,
        }
    }

    #[test]
    fn accepts_minimal_config() {
        let mut config = SecurePortConfig::default();
        config.listeners.push(listener(Some(CredentialConfig::Insecure)));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = SecurePortConfig::default();
        config.server.handshake_timeout_secs = 0;
        config.listeners.push(listener(None));
        config.listeners.push(listener(Some(CredentialConfig::Tls(TlsCredentialConfig {
            cert_path: "".into(),
            key_path: "key.pem".into(),
            alpn_protocols: Vec::new(),
        }))));

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::MissingCredential { index: 0 },
                ValidationError::EmptyTlsPath { index: 1, field: "cert_path" },
                ValidationError::ZeroHandshakeTimeout,
            ]
        );
    }

    #[test]
    fn empty_listener_list_is_rejected() {
        let errors = validate_config(&SecurePortConfig::default()).unwrap_err();
        assert_eq!(errors, vec![ValidationError::NoListeners]);
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut config = SecurePortConfig::default();
        config.listeners.push(listener(Some(CredentialConfig::Insecure)));
        config.observability.metrics_address = "nope".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::InvalidMetricsAddress("nope".into())]
        );
    }
}
