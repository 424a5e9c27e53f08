//! Config-driven startup through the lifecycle entry points.

use std::io::Write;

use secure_port::config::parse_config;
use secure_port::lifecycle::{self, Shutdown, StartupError};
use secure_port::transport::EchoTransport;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

mod common;

#[tokio::test]
async fn serves_configured_listeners_until_shutdown() {
    let cert = common::self_signed();
    let mut cert_file = tempfile::NamedTempFile::new().unwrap();
    cert_file.write_all(cert.cert_pem.as_bytes()).unwrap();
    let mut key_file = tempfile::NamedTempFile::new().unwrap();
    key_file.write_all(cert.key_pem.as_bytes()).unwrap();

    let config = parse_config(&format!(
        r#"
        [[listeners]]
        address = "127.0.0.1:0"
        [listeners.credential]
        type = "insecure"

        [[listeners]]
        address = "127.0.0.1:0"
        [listeners.credential]
        type = "tls"
        cert_path = "{}"
        key_path = "{}"
        "#,
        cert_file.path().display(),
        key_file.path().display(),
    ))
    .unwrap();

    let server = lifecycle::build_server(&config, EchoTransport).await.unwrap();
    let ports = server.ports();
    assert_eq!(ports.len(), 2);

    let shutdown = Shutdown::new();
    let running = tokio::spawn(lifecycle::run(server, shutdown.subscribe()));

    let mut insecure = common::insecure_connect(ports[0]).await;
    insecure.write_all(b"echo").await.unwrap();
    let mut buf = [0u8; 4];
    insecure.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"echo");

    let mut tls = common::tls_connect(ports[1], &cert.cert_der, &[]).await.unwrap();
    tls.write_all(b"tls!").await.unwrap();
    tls.flush().await.unwrap();
    tls.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"tls!");

    shutdown.trigger();
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn unreadable_credential_fails_startup() {
    let config = parse_config(
        r#"
        [[listeners]]
        address = "127.0.0.1:0"
        [listeners.credential]
        type = "tls"
        cert_path = "/nonexistent/cert.pem"
        key_path = "/nonexistent/key.pem"
        "#,
    )
    .unwrap();

    let err = lifecycle::build_server(&config, EchoTransport).await.unwrap_err();
    match err {
        StartupError::Listener { address, source } => {
            assert_eq!(address, "127.0.0.1:0");
            assert_eq!(source.kind(), secure_port::ErrorKind::Credential);
        }
        other => panic!("unexpected error: {other}"),
    }
}
