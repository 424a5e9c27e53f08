//! Error types for credentials and handshakes.

use std::time::Duration;

/// Failure to turn a credential into a security context.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("no credential supplied")]
    Missing,

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed PEM in {what}: {source}")]
    Pem {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates found in certificate chain")]
    NoCertificates,

    #[error("no private key found")]
    NoPrivateKey,

    #[error("TLS configuration rejected: {0}")]
    Tls(#[from] rustls::Error),
}

/// Failure of a single connection's security handshake.
///
/// Contained to the connection: the listener keeps accepting.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("peer closed the connection during handshake")]
    PeerClosed,

    #[error("TLS handshake failed: {0}")]
    Tls(#[source] std::io::Error),

    #[error("handshake protocol violation: {0}")]
    Protocol(String),

    #[error("I/O error during handshake: {0}")]
    Io(#[from] std::io::Error),

    #[error("handshake timed out after {0:?}")]
    TimedOut(Duration),
}

impl HandshakeError {
    /// Stable status code used in logs and metric labels.
    pub fn status(&self) -> &'static str {
        match self {
            HandshakeError::PeerClosed => "peer_closed",
            HandshakeError::Tls(_) => "tls_error",
            HandshakeError::Protocol(_) => "protocol_error",
            HandshakeError::Io(_) => "io_error",
            HandshakeError::TimedOut(_) => "timeout",
        }
    }

    /// Classify an I/O error raised while reading the peer's first flight.
    pub(crate) fn from_read(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe => HandshakeError::PeerClosed,
            _ => HandshakeError::Io(err),
        }
    }
}
