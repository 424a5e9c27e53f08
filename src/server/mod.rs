//! Server: owner of listeners and of the transport factory.
//!
//! # Lifecycle
//! ```text
//! Configuring ──start──▶ Running ──shutdown──▶ ShutDown
//!      └──────────────── shutdown ──────────────┘
//! ```
//!
//! # Responsibilities
//! - Hold registered listeners until start, then start them all
//! - Destroy every listener on shutdown
//! - Build transports for secured connections with the server's channel config
//!
//! # Design Decisions
//! - Listeners only reach the server through [`ServerShared`] held weakly, so
//!   dropping the server never waits on an in-flight handshake
//! - Registration is closed once the server leaves `Configuring`

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures_util::future::BoxFuture;
use tokio::runtime::Handle;

use crate::config::{ListenerConfig, ServerConfig};
use crate::net::{BindPolicy, Binder, Resolver, SystemResolver, TcpBinder};
use crate::port::{add_secure_port, SecurePortError};
use crate::security::{Credential, CredentialError, SecureStream};
use crate::transport::{
    ChannelConfig, MetadataContext, TransportError, TransportFactory, TransportSetup,
    SERVER_FILTERS,
};

/// A listener owned by a [`Server`].
pub trait ServerListener: Send + 'static {
    /// Port the listener is bound to.
    fn port(&self) -> u16;

    /// Begin accepting on `runtime`.
    fn start(&mut self, runtime: &Handle);

    /// Stop accepting and release every resource. When the returned future
    /// completes no further connection from this listener reaches the server.
    fn destroy(self: Box<Self>) -> BoxFuture<'static, ()>;
}

/// Part of the server reachable from listeners and handshake tasks.
pub(crate) struct ServerShared {
    channel_config: Arc<ChannelConfig>,
    transport: Arc<dyn TransportFactory>,
}

impl ServerShared {
    /// Hand a secured stream to the transport factory.
    pub(crate) fn setup_transport(
        &self,
        stream: SecureStream,
        peer_addr: SocketAddr,
    ) -> Result<(), TransportError> {
        self.transport.create(TransportSetup {
            stream,
            peer_addr,
            filters: SERVER_FILTERS,
            channel_config: Arc::clone(&self.channel_config),
            metadata: MetadataContext::new(),
        })
    }
}

/// Server lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Configuring,
    Running,
    ShutDown,
}

/// Error type for server lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("server already started")]
    AlreadyStarted,

    #[error("server is shut down")]
    ShutDown,

    #[error("no tokio runtime available to start listeners")]
    NoRuntime,
}

struct ServerInner {
    state: ServerState,
    listeners: Vec<Box<dyn ServerListener>>,
}

/// Secure server hosting any number of listeners.
pub struct Server {
    shared: Arc<ServerShared>,
    settings: ServerConfig,
    resolver: Arc<dyn Resolver>,
    binder: Arc<dyn Binder>,
    inner: Mutex<ServerInner>,
}

impl Server {
    /// Start building a server around `transport`.
    pub fn builder(transport: impl TransportFactory) -> ServerBuilder {
        ServerBuilder::new(transport)
    }

    pub fn channel_config(&self) -> &ChannelConfig {
        &self.shared.channel_config
    }

    pub fn settings(&self) -> &ServerConfig {
        &self.settings
    }

    pub fn state(&self) -> ServerState {
        self.lock().state
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Ports of every registered listener, in registration order.
    pub fn ports(&self) -> Vec<u16> {
        self.lock().listeners.iter().map(|l| l.port()).collect()
    }

    /// Add a listener. Only allowed while configuring; on error the listener
    /// is dropped, releasing its resources.
    pub fn register_listener(&self, listener: Box<dyn ServerListener>) -> Result<(), ServerError> {
        let mut inner = self.lock();
        match inner.state {
            ServerState::Configuring => {
                inner.listeners.push(listener);
                Ok(())
            }
            ServerState::Running => Err(ServerError::AlreadyStarted),
            ServerState::ShutDown => Err(ServerError::ShutDown),
        }
    }

    /// Bind `target` with `credential` and register it as a secure port.
    /// Returns the bound port.
    pub async fn add_secure_listener(
        &self,
        target: &str,
        credential: &Credential,
    ) -> Result<u16, SecurePortError> {
        add_secure_port(self, target, credential, BindPolicy::default()).await
    }

    pub async fn add_secure_listener_with_policy(
        &self,
        target: &str,
        credential: &Credential,
        policy: BindPolicy,
    ) -> Result<u16, SecurePortError> {
        add_secure_port(self, target, credential, policy).await
    }

    /// Register a listener described by configuration.
    pub async fn add_listener_from_config(
        &self,
        config: &ListenerConfig,
    ) -> Result<u16, SecurePortError> {
        let Some(credential_config) = &config.credential else {
            tracing::error!(
                address = %config.address,
                "No credentials specified for secure server port"
            );
            return Err(CredentialError::Missing.into());
        };
        let credential = Credential::from_config(credential_config)?;
        add_secure_port(self, &config.address, &credential, config.bind_policy).await
    }

    /// Start every registered listener on the current runtime.
    pub fn start(&self) -> Result<(), ServerError> {
        let runtime = Handle::try_current().map_err(|_| ServerError::NoRuntime)?;
        let mut inner = self.lock();
        match inner.state {
            ServerState::Configuring => {}
            ServerState::Running => return Err(ServerError::AlreadyStarted),
            ServerState::ShutDown => return Err(ServerError::ShutDown),
        }

        for listener in inner.listeners.iter_mut() {
            listener.start(&runtime);
        }
        inner.state = ServerState::Running;

        tracing::info!(listeners = inner.listeners.len(), "Server started");
        Ok(())
    }

    /// Destroy every listener. Idempotent.
    pub async fn shutdown(&self) {
        let listeners = {
            let mut inner = self.lock();
            if inner.state == ServerState::ShutDown {
                return;
            }
            inner.state = ServerState::ShutDown;
            std::mem::take(&mut inner.listeners)
        };

        let count = listeners.len();
        for listener in listeners {
            listener.destroy().await;
        }
        tracing::info!(listeners = count, "Server shut down");
    }

    pub(crate) fn ensure_configuring(&self) -> Result<(), ServerError> {
        match self.lock().state {
            ServerState::Configuring => Ok(()),
            ServerState::Running => Err(ServerError::AlreadyStarted),
            ServerState::ShutDown => Err(ServerError::ShutDown),
        }
    }

    pub(crate) fn shared(&self) -> Weak<ServerShared> {
        Arc::downgrade(&self.shared)
    }

    pub(crate) fn resolver(&self) -> &dyn Resolver {
        self.resolver.as_ref()
    }

    pub(crate) fn binder(&self) -> &dyn Binder {
        self.binder.as_ref()
    }

    fn lock(&self) -> MutexGuard<'_, ServerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("Server")
            .field("state", &inner.state)
            .field("listeners", &inner.listeners.len())
            .field("settings", &self.settings)
            .finish()
    }
}

/// Builder for [`Server`].
pub struct ServerBuilder {
    transport: Arc<dyn TransportFactory>,
    settings: ServerConfig,
    channel_config: ChannelConfig,
    resolver: Arc<dyn Resolver>,
    binder: Arc<dyn Binder>,
}

impl ServerBuilder {
    fn new(transport: impl TransportFactory) -> Self {
        Self {
            transport: Arc::new(transport),
            settings: ServerConfig::default(),
            channel_config: ChannelConfig::default(),
            resolver: Arc::new(SystemResolver),
            binder: Arc::new(TcpBinder),
        }
    }

    pub fn settings(mut self, settings: ServerConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn channel_config(mut self, channel_config: ChannelConfig) -> Self {
        self.channel_config = channel_config;
        self
    }

    /// Replace the address resolver.
    pub fn resolver(mut self, resolver: impl Resolver) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Replace the socket binder.
    pub fn binder(mut self, binder: impl Binder) -> Self {
        self.binder = Arc::new(binder);
        self
    }

    pub fn build(self) -> Server {
        Server {
            shared: Arc::new(ServerShared {
                channel_config: Arc::new(self.channel_config),
                transport: self.transport,
            }),
            settings: self.settings,
            resolver: self.resolver,
            binder: self.binder,
            inner: Mutex::new(ServerInner {
                state: ServerState::Configuring,
                listeners: Vec::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullTransport;

    impl TransportFactory for NullTransport {
        fn create(&self, _setup: TransportSetup) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct Counters {
        started: Arc<AtomicUsize>,
        destroyed: Arc<AtomicUsize>,
    }

    struct FakeListener {
        port: u16,
        counters: Counters,
    }

    impl ServerListener for FakeListener {
        fn port(&self) -> u16 {
            self.port
        }

        fn start(&mut self, _runtime: &Handle) {
            self.counters.started.fetch_add(1, Ordering::SeqCst);
        }

        fn destroy(self: Box<Self>) -> BoxFuture<'static, ()> {
            let destroyed = Arc::clone(&self.counters.destroyed);
            Box::pin(async move {
                destroyed.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    fn fake(port: u16, counters: &Counters) -> Box<dyn ServerListener> {
        Box::new(FakeListener {
            port,
            counters: counters.clone(),
        })
    }

    #[tokio::test]
    async fn start_starts_every_listener() {
        let server = Server::builder(NullTransport).build();
        let counters = Counters::default();
        server.register_listener(fake(1000, &counters)).unwrap();
        server.register_listener(fake(1001, &counters)).unwrap();

        server.start().unwrap();

        assert_eq!(server.state(), ServerState::Running);
        assert_eq!(server.ports(), vec![1000, 1001]);
        assert_eq!(counters.started.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn registration_closes_after_start() {
        let server = Server::builder(NullTransport).build();
        let counters = Counters::default();
        server.start().unwrap();

        let err = server.register_listener(fake(1000, &counters)).unwrap_err();
        assert!(matches!(err, ServerError::AlreadyStarted));
        assert!(matches!(server.start(), Err(ServerError::AlreadyStarted)));
    }

    #[tokio::test]
    async fn shutdown_destroys_every_listener_once() {
        let server = Server::builder(NullTransport).build();
        let counters = Counters::default();
        server.register_listener(fake(1000, &counters)).unwrap();
        server.register_listener(fake(1001, &counters)).unwrap();
        server.start().unwrap();

        server.shutdown().await;
        server.shutdown().await;

        assert_eq!(counters.destroyed.load(Ordering::SeqCst), 2);
        assert_eq!(server.listener_count(), 0);
        assert_eq!(server.state(), ServerState::ShutDown);
        assert!(matches!(server.start(), Err(ServerError::ShutDown)));
    }

    #[test]
    fn start_without_runtime_fails() {
        let server = Server::builder(NullTransport).build();
        assert!(matches!(server.start(), Err(ServerError::NoRuntime)));
        assert_eq!(server.state(), ServerState::Configuring);
    }

    #[tokio::test]
    async fn missing_credential_in_config_is_rejected() {
        let server = Server::builder(NullTransport).build();
        let config = ListenerConfig {
            address: "127.0.0.1:0".to_string(),
            credential: None,
            bind_policy: BindPolicy::default(),
        };

        let err = server.add_listener_from_config(&config).await.unwrap_err();
        assert!(matches!(err, SecurePortError::Credential(CredentialError::Missing)));
        assert_eq!(server.listener_count(), 0);
    }

    #[test]
    fn builder_applies_settings() {
        let server = Server::builder(NullTransport)
            .settings(ServerConfig {
                handshake_timeout_secs: 3,
                max_pending_handshakes: 8,
                drain_timeout_secs: 0,
            })
            .channel_config(ChannelConfig {
                max_concurrent_streams: 5,
                ..ChannelConfig::default()
            })
            .build();

        assert_eq!(server.settings().handshake_timeout_secs, 3);
        assert_eq!(server.channel_config().max_concurrent_streams, 5);
    }
}
