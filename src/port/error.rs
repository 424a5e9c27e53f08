//! Errors surfaced by secure port registration.

use crate::net::{BindError, ResolveError};
use crate::security::CredentialError;
use crate::server::ServerError;

/// Coarse classification of a [`SecurePortError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing credential or context construction failure.
    Credential,
    /// The listen address could not be resolved.
    Resolution,
    /// Not enough of the resolved addresses could be bound.
    Bind,
    /// Bound sockets disagreed on the port. Indicates a platform or binder
    /// defect rather than bad input.
    ConsistencyFault,
    /// The server no longer accepts new listeners.
    Server,
}

/// Failure to add a secure listener. Nothing is registered and every
/// resource acquired by the call has been released when this is returned.
#[derive(Debug, thiserror::Error)]
pub enum SecurePortError {
    #[error("unable to create security context: {0}")]
    Credential(#[from] CredentialError),

    #[error("unable to resolve {target:?}: {source}")]
    Resolution {
        target: String,
        #[source]
        source: ResolveError,
    },

    #[error("unable to bind {target:?}: {source}")]
    Bind {
        target: String,
        #[source]
        source: BindError,
    },

    #[error(transparent)]
    Server(#[from] ServerError),
}

impl SecurePortError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SecurePortError::Credential(_) => ErrorKind::Credential,
            SecurePortError::Resolution { .. } => ErrorKind::Resolution,
            SecurePortError::Bind {
                source: BindError::PortMismatch { .. },
                ..
            } => ErrorKind::ConsistencyFault,
            SecurePortError::Bind { .. } => ErrorKind::Bind,
            SecurePortError::Server(_) => ErrorKind::Server,
        }
    }
}
