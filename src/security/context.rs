//! Security contexts: the runtime capability that performs handshakes.
//!
//! # Responsibilities
//! - Build a context from exactly one credential variant
//! - Pin certificate and key material for the context's lifetime
//! - Upgrade an accepted TCP stream into a [`SecureStream`]
//!
//! # Design Decisions
//! - Contexts are shared as `Arc<dyn SecurityContext>`; every in-flight
//!   handshake holds its own clone, so the context outlives the port that
//!   created it until the last handshake finishes
//! - The context is read-only after construction; no lock guards it

use std::sync::Arc;

use futures_util::future::BoxFuture;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;

use crate::security::credential::{Credential, TlsCredential};
use crate::security::error::{CredentialError, HandshakeError};
use crate::security::stream::SecureStream;

/// Preface a client must send to pass the insecure handshake.
pub const INSECURE_CLIENT_PREFACE: &[u8] = b"INSECURE/1\n";

/// Reply the server sends once the insecure preface is accepted.
pub const INSECURE_SERVER_REPLY: &[u8] = b"INSECURE/1 OK\n";

/// A capability that can secure a raw connection.
pub trait SecurityContext: Send + Sync + 'static {
    /// Name of the mechanism, used in logs and metric labels.
    fn kind(&self) -> &'static str;

    /// Perform the server side of the handshake over `stream`.
    ///
    /// The returned future owns everything it needs, so it can be driven on
    /// any worker after the caller has moved on.
    fn handshake(&self, stream: TcpStream) -> HandshakeFuture;
}

/// Future returned by [`SecurityContext::handshake`].
pub type HandshakeFuture = BoxFuture<'static, Result<SecureStream, HandshakeError>>;

/// Shared handle to a security context.
pub type SharedContext = Arc<dyn SecurityContext>;

/// Create a security context for `credential`.
pub fn create_context(credential: &Credential) -> Result<SharedContext, CredentialError> {
    let context: SharedContext = match credential {
        Credential::Tls(tls) => Arc::new(TlsContext::new(tls)?),
        Credential::Insecure => Arc::new(InsecureContext),
    };
    tracing::info!(kind = context.kind(), "Security context created");
    Ok(context)
}

/// TLS server context backed by rustls.
pub struct TlsContext {
    acceptor: TlsAcceptor,
}

impl TlsContext {
    /// Parse the credential's PEM material and build the rustls configuration.
    pub fn new(credential: &TlsCredential) -> Result<Self, CredentialError> {
        let certs = load_certificates(&credential.cert_chain_pem)?;
        let key = load_private_key(&credential.private_key_pem)?;

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(certs, key)?;
        config.alpn_protocols = credential.alpn_protocols.clone();

        Ok(Self {
            acceptor: TlsAcceptor::from(Arc::new(config)),
        })
    }
}

impl SecurityContext for TlsContext {
    fn kind(&self) -> &'static str {
        "tls"
    }

    fn handshake(&self, stream: TcpStream) -> HandshakeFuture {
        let acceptor = self.acceptor.clone();
        Box::pin(async move {
            match acceptor.accept(stream).await {
                Ok(tls) => Ok(SecureStream::Tls(Box::new(tls))),
                Err(err) => match HandshakeError::from_read(err) {
                    HandshakeError::Io(err) => Err(HandshakeError::Tls(err)),
                    closed => Err(closed),
                },
            }
        })
    }
}

/// Test-only context: a fixed preface exchange, then plaintext.
#[derive(Debug, Default)]
pub struct InsecureContext;

impl SecurityContext for InsecureContext {
    fn kind(&self) -> &'static str {
        "insecure"
    }

    fn handshake(&self, mut stream: TcpStream) -> HandshakeFuture {
        Box::pin(async move {
            let mut preface = [0u8; INSECURE_CLIENT_PREFACE.len()];
            stream
                .read_exact(&mut preface)
                .await
                .map_err(HandshakeError::from_read)?;
            if &preface[..] != INSECURE_CLIENT_PREFACE {
                return Err(HandshakeError::Protocol(format!(
                    "unexpected preface {:?}",
                    String::from_utf8_lossy(&preface)
                )));
            }
            stream.write_all(INSECURE_SERVER_REPLY).await?;
            stream.flush().await?;
            Ok(SecureStream::Insecure(stream))
        })
    }
}

fn load_certificates(mut pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, CredentialError> {
    let certs = rustls_pemfile::certs(&mut pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| CredentialError::Pem {
            what: "certificate chain",
            source,
        })?;
    if certs.is_empty() {
        return Err(CredentialError::NoCertificates);
    }
    Ok(certs)
}

fn load_private_key(mut pem: &[u8]) -> Result<PrivateKeyDer<'static>, CredentialError> {
    rustls_pemfile::private_key(&mut pem)
        .map_err(|source| CredentialError::Pem {
            what: "private key",
            source,
        })?
        .ok_or(CredentialError::NoPrivateKey)
}
