//! Per-connection handshake dispatch.
//!
//! # Responsibilities
//! - Drive one accepted connection through its security handshake
//! - Bound the handshake with a timeout
//! - On success, construct the transport through the owning server
//! - On failure, log the status and drop the connection
//!
//! # Design Decisions
//! - Each handshake runs in its own task; it never blocks accept
//! - Delivery goes through a [`DeliveryGate`] so nothing reaches the
//!   transport once the port is destroyed, even for handshakes that were
//!   already in flight

use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};

use tokio::net::TcpStream;

use crate::net::connection::HandshakeGuard;
use crate::observability::metrics;
use crate::security::{HandshakeError, SecureStream, SharedContext};
use crate::server::ServerShared;
use crate::transport::TransportError;

/// Gate closed by `destroy`; deliveries after closing are discarded.
///
/// Deliveries hold the read side while constructing a transport, so once
/// `close` returns no delivery is running or will start. `close` blocks for
/// as long as a running delivery takes, which is why transport factories
/// must not block.
#[derive(Debug)]
pub struct DeliveryGate {
    open: RwLock<bool>,
}

impl DeliveryGate {
    pub fn new() -> Self {
        Self {
            open: RwLock::new(true),
        }
    }

    pub fn close(&self) {
        *self.open.write().unwrap_or_else(PoisonError::into_inner) = false;
    }

    /// Run `deliver` if the gate is open, returning its result.
    pub fn deliver<R>(&self, deliver: impl FnOnce() -> R) -> Option<R> {
        let open = self.open.read().unwrap_or_else(PoisonError::into_inner);
        if !*open {
            return None;
        }
        Some(deliver())
    }
}

impl Default for DeliveryGate {
    fn default() -> Self {
        Self::new()
    }
}

/// State for one accepted connection until its handshake completes.
pub(crate) struct HandshakeCoordinator {
    pub(crate) stream: TcpStream,
    pub(crate) peer_addr: SocketAddr,
    pub(crate) context: SharedContext,
    pub(crate) gate: Arc<DeliveryGate>,
    pub(crate) server: Weak<ServerShared>,
    pub(crate) guard: HandshakeGuard,
    pub(crate) timeout: Duration,
}

impl HandshakeCoordinator {
    pub(crate) async fn run(self) {
        let Self {
            stream,
            peer_addr,
            context,
            gate,
            server,
            guard,
            timeout,
        } = self;
        let connection_id = guard.id();
        let started = Instant::now();

        let outcome = match tokio::time::timeout(timeout, context.handshake(stream)).await {
            Ok(result) => result,
            Err(_) => Err(HandshakeError::TimedOut(timeout)),
        };
        drop(context);

        match outcome {
            Ok(secured) => {
                metrics::record_handshake("ok", started);
                tracing::debug!(
                    connection_id = %connection_id,
                    peer_addr = %peer_addr,
                    security = secured.security_kind(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Handshake completed"
                );
                deliver(&gate, &server, secured, peer_addr, connection_id.as_u64());
            }
            Err(e) => {
                metrics::record_handshake(e.status(), started);
                tracing::error!(
                    connection_id = %connection_id,
                    peer_addr = %peer_addr,
                    status = e.status(),
                    error = %e,
                    "Secure transport failed"
                );
            }
        }

        drop(guard);
    }
}

fn deliver(
    gate: &DeliveryGate,
    server: &Weak<ServerShared>,
    secured: SecureStream,
    peer_addr: SocketAddr,
    connection_id: u64,
) {
    let delivered = gate.deliver(|| match server.upgrade() {
        Some(server) => server.setup_transport(secured, peer_addr),
        None => Err(TransportError::ServerGone),
    });

    match delivered {
        Some(Ok(())) => {
            metrics::record_transport("created");
            tracing::debug!(connection_id, peer_addr = %peer_addr, "Transport created");
        }
        Some(Err(e)) => {
            metrics::record_transport("rejected");
            tracing::warn!(
                connection_id,
                peer_addr = %peer_addr,
                error = %e,
                "Transport construction failed"
            );
        }
        None => {
            metrics::record_transport("discarded");
            tracing::debug!(
                connection_id,
                peer_addr = %peer_addr,
                "Port destroyed, discarding secured connection"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;

    #[test]
    fn open_gate_runs_delivery() {
        let gate = DeliveryGate::new();
        assert_eq!(gate.deliver(|| 7), Some(7));
    }

    #[test]
    fn closed_gate_skips_delivery() {
        let gate = DeliveryGate::new();
        gate.close();
        let mut ran = false;
        assert_eq!(gate.deliver(|| ran = true), None);
        assert!(!ran);
    }

    #[test]
    fn close_waits_for_running_delivery() {
        let gate = Arc::new(DeliveryGate::new());
        let finished = Arc::new(AtomicBool::new(false));
        let (entered_tx, entered_rx) = mpsc::channel();

        let delivery = {
            let gate = Arc::clone(&gate);
            let finished = Arc::clone(&finished);
            std::thread::spawn(move || {
                gate.deliver(|| {
                    entered_tx.send(()).unwrap();
                    std::thread::sleep(Duration::from_millis(50));
                    finished.store(true, Ordering::SeqCst);
                })
            })
        };

        entered_rx.recv().unwrap();
        gate.close();
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(delivery.join().unwrap(), Some(()));
        assert_eq!(gate.deliver(|| ()), None);
    }
}
