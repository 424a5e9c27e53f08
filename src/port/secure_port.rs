//! Secure port assembly and lifecycle.
//!
//! # Responsibilities
//! - Compose credential, resolution and binding into one registered port
//! - Release everything acquired so far when any stage fails
//! - Start accepting on `start`, stop and release on `destroy`
//!
//! # Lifecycle
//! ```text
//! add_secure_port → Registered → start → Accepting → destroy → Destroyed
//!                        └──────────── destroy ──────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::net::TcpStream;
use tokio::runtime::Handle;

use crate::net::{bind_address_set, BindPolicy, HandshakeTracker, Listener, DEFAULT_SERVICE};
use crate::observability::metrics;
use crate::port::error::SecurePortError;
use crate::port::handshake::{DeliveryGate, HandshakeCoordinator};
use crate::security::{create_context, Credential, SharedContext};
use crate::server::{Server, ServerListener, ServerShared};

/// Lifecycle state of a [`SecurePort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    Registered,
    Accepting,
    Destroyed,
}

/// A bound listener and a security context under one lifecycle.
pub struct SecurePort {
    listener: Listener,
    context: Option<SharedContext>,
    server: Weak<ServerShared>,
    port: u16,
    state: PortState,
    gate: Arc<DeliveryGate>,
    tracker: HandshakeTracker,
    handshake_timeout: Duration,
    drain_timeout: Duration,
}

impl SecurePort {
    fn new(listener: Listener, port: u16, context: SharedContext, server: &Server) -> Self {
        let settings = server.settings();
        Self {
            listener,
            context: Some(context),
            server: server.shared(),
            port,
            state: PortState::Registered,
            gate: Arc::new(DeliveryGate::new()),
            tracker: HandshakeTracker::new(settings.max_pending_handshakes),
            handshake_timeout: Duration::from_secs(settings.handshake_timeout_secs),
            drain_timeout: Duration::from_secs(settings.drain_timeout_secs),
        }
    }

    /// Wait up to the drain timeout for in-flight handshakes to settle.
    /// Their results are already discarded by the closed gate.
    async fn drain(&self) {
        let in_flight = self.tracker.in_flight();
        if in_flight == 0 || self.drain_timeout.is_zero() {
            return;
        }
        tracing::debug!(port = self.port, in_flight, "Draining in-flight handshakes");
        if tokio::time::timeout(self.drain_timeout, self.tracker.wait_idle())
            .await
            .is_err()
        {
            tracing::warn!(
                port = self.port,
                in_flight = self.tracker.in_flight(),
                "Drain timeout elapsed with handshakes still in flight"
            );
        }
    }
}

impl ServerListener for SecurePort {
    fn port(&self) -> u16 {
        self.port
    }

    fn start(&mut self, runtime: &Handle) {
        if self.state != PortState::Registered {
            tracing::warn!(port = self.port, state = ?self.state, "Ignoring start of secure port");
            return;
        }
        let Some(context) = self.context.clone() else {
            return;
        };

        let dispatcher = AcceptDispatcher {
            context,
            server: self.server.clone(),
            gate: Arc::clone(&self.gate),
            tracker: self.tracker.clone(),
            timeout: self.handshake_timeout,
            runtime: runtime.clone(),
            port: self.port,
        };
        let accepting = self.listener.start(
            runtime,
            Arc::new(move |stream: TcpStream, peer_addr: SocketAddr| {
                dispatcher.dispatch(stream, peer_addr)
            }),
        );
        self.state = PortState::Accepting;

        let bound = self.listener.local_addrs().len();
        if accepting < bound {
            tracing::warn!(
                port = self.port,
                accepting,
                bound,
                "Secure port started on fewer sockets than were bound"
            );
        } else {
            tracing::info!(
                port = self.port,
                addresses = ?self.listener.local_addrs(),
                "Secure port started"
            );
        }
    }

    fn destroy(mut self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            self.gate.close();
            self.listener.stop().await;
            self.context = None;
            self.drain().await;
            self.state = PortState::Destroyed;
            tracing::info!(
                port = self.port,
                in_flight = self.tracker.in_flight(),
                "Secure port destroyed"
            );
        })
    }
}

impl Drop for SecurePort {
    fn drop(&mut self) {
        self.gate.close();
    }
}

impl std::fmt::Debug for SecurePort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurePort")
            .field("port", &self.port)
            .field("state", &self.state)
            .field("listener", &self.listener)
            .field("in_flight", &self.tracker.in_flight())
            .finish()
    }
}

/// Accept callback state: turns each accepted stream into a handshake task.
struct AcceptDispatcher {
    context: SharedContext,
    server: Weak<ServerShared>,
    gate: Arc<DeliveryGate>,
    tracker: HandshakeTracker,
    timeout: Duration,
    runtime: Handle,
    port: u16,
}

impl AcceptDispatcher {
    fn dispatch(&self, stream: TcpStream, peer_addr: SocketAddr) {
        metrics::connection_accepted();

        let Some(guard) = self.tracker.try_track() else {
            metrics::connection_shed();
            tracing::warn!(
                port = self.port,
                peer_addr = %peer_addr,
                limit = self.tracker.limit(),
                "Too many handshakes in flight, dropping connection"
            );
            return;
        };

        let coordinator = HandshakeCoordinator {
            stream,
            peer_addr,
            context: Arc::clone(&self.context),
            gate: Arc::clone(&self.gate),
            server: self.server.clone(),
            guard,
            timeout: self.timeout,
        };
        self.runtime.spawn(coordinator.run());
    }
}

/// Create a security context for `credential`, bind `target`, and register
/// the resulting port with `server`. Returns the canonical port.
pub async fn add_secure_port(
    server: &Server,
    target: &str,
    credential: &Credential,
    policy: BindPolicy,
) -> Result<u16, SecurePortError> {
    server.ensure_configuring()?;

    let context = create_context(credential).map_err(|e| {
        tracing::error!(
            kind = credential.kind(),
            error = %e,
            "Unable to create secure server with credentials"
        );
        e
    })?;

    bind_secure_port(server, target, context, policy).await
}

/// Bind `target` and register a port owning `context`.
///
/// `context` is dropped on every failure path, so the caller's reference is
/// the only one left when this returns an error.
pub(crate) async fn bind_secure_port(
    server: &Server,
    target: &str,
    context: SharedContext,
    policy: BindPolicy,
) -> Result<u16, SecurePortError> {
    let addresses = server
        .resolver()
        .resolve(target, DEFAULT_SERVICE)
        .await
        .map_err(|source| {
            tracing::error!(
                address = %target,
                error = %source,
                "Unable to resolve listen address"
            );
            SecurePortError::Resolution {
                target: target.to_string(),
                source,
            }
        })?;

    let (listener, port) = bind_address_set(addresses, server.binder(), policy).map_err(|source| {
        SecurePortError::Bind {
            target: target.to_string(),
            source,
        }
    })?;

    let secure_port = SecurePort::new(listener, port, context, server);
    server.register_listener(Box::new(secure_port))?;

    tracing::info!(address = %target, port, "Secure port registered");
    Ok(port)
}
