//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use secure_port::net::{AddressSet, ResolveError, Resolver};
use secure_port::security::{INSECURE_CLIENT_PREFACE, INSECURE_SERVER_REPLY};
use secure_port::transport::{TransportError, TransportFactory, TransportSetup};
use secure_port::TlsCredential;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

/// Self-signed certificate for "localhost" as PEM files' contents and DER.
pub struct TestCert {
    pub cert_pem: String,
    pub key_pem: String,
    pub cert_der: CertificateDer<'static>,
}

pub fn self_signed() -> TestCert {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".into()]).unwrap();
    TestCert {
        cert_pem: cert.pem(),
        key_pem: key_pair.serialize_pem(),
        cert_der: cert.der().clone(),
    }
}

impl TestCert {
    pub fn credential(&self) -> TlsCredential {
        TlsCredential::from_pem(self.cert_pem.clone(), self.key_pem.clone())
    }
}

/// Connect over TLS, trusting only `cert`.
pub async fn tls_connect(
    port: u16,
    cert: &CertificateDer<'static>,
    alpn: &[&[u8]],
) -> std::io::Result<TlsStream<TcpStream>> {
    let mut roots = RootCertStore::empty();
    roots.add(cert.clone()).unwrap();

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();

    let connector = TlsConnector::from(Arc::new(config));
    let tcp = TcpStream::connect(loopback(port)).await?;
    connector
        .connect(ServerName::try_from("localhost").unwrap(), tcp)
        .await
}

/// Connect and complete the insecure handshake.
pub async fn insecure_connect(port: u16) -> TcpStream {
    let mut stream = TcpStream::connect(loopback(port)).await.unwrap();
    stream.write_all(INSECURE_CLIENT_PREFACE).await.unwrap();
    let mut reply = vec![0u8; INSECURE_SERVER_REPLY.len()];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, INSECURE_SERVER_REPLY);
    stream
}

pub fn loopback(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

/// Transport that forwards every setup to a channel.
pub struct RecordingTransport(mpsc::UnboundedSender<TransportSetup>);

pub fn recording_transport() -> (RecordingTransport, mpsc::UnboundedReceiver<TransportSetup>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RecordingTransport(tx), rx)
}

impl TransportFactory for RecordingTransport {
    fn create(&self, setup: TransportSetup) -> Result<(), TransportError> {
        self.0
            .send(setup)
            .map_err(|_| TransportError::Rejected("test receiver dropped".into()))
    }
}

/// Wait for the next transport setup, failing the test after two seconds.
pub async fn next_setup(rx: &mut mpsc::UnboundedReceiver<TransportSetup>) -> TransportSetup {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no transport setup within timeout")
        .expect("transport channel closed")
}

/// Assert no transport setup arrives within `window`.
pub async fn assert_no_setup(rx: &mut mpsc::UnboundedReceiver<TransportSetup>, window: Duration) {
    if let Ok(Some(setup)) = tokio::time::timeout(window, rx.recv()).await {
        panic!("unexpected transport setup from {}", setup.peer_addr);
    }
}

/// Resolver returning a fixed address list regardless of target.
pub struct FixedResolver(pub Vec<SocketAddr>);

impl Resolver for FixedResolver {
    fn resolve<'a>(
        &'a self,
        _target: &'a str,
        _default_service: &'a str,
    ) -> BoxFuture<'a, Result<AddressSet, ResolveError>> {
        Box::pin(async move { Ok(AddressSet::new(self.0.clone())) })
    }
}
