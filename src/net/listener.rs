//! Multi-address TCP listener.
//!
//! # Responsibilities
//! - Bind every address of an [`AddressSet`] onto one logical port
//! - Enforce that all bound sockets share the canonical port
//! - Run one accept loop per bound socket and hand each accepted
//!   connection to the registered callback
//! - Stop accepting on request, with no callback firing afterwards

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::net::resolve::AddressSet;

/// Pause after a failed accept (e.g. descriptor exhaustion) before retrying.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Callback invoked for every accepted connection.
pub type OnAccept = Arc<dyn Fn(TcpStream, SocketAddr) + Send + Sync>;

/// What to do when only part of an address set binds.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BindPolicy {
    /// Serve on whatever bound, warn about the rest.
    #[default]
    AllowPartial,
    /// Fail unless every resolved address bound.
    RequireAll,
}

/// Error type for binding operations.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("failed to bind {addr}: {source}")]
    Address {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("no address bound out of {resolved} resolved")]
    NoneBound {
        resolved: usize,
        #[source]
        last_error: Option<io::Error>,
    },

    #[error("only {bound} of {resolved} resolved addresses bound")]
    Partial {
        bound: usize,
        resolved: usize,
        #[source]
        last_error: Option<io::Error>,
    },

    #[error("{addr} bound to port {actual}, but the listener's port is {canonical}")]
    PortMismatch {
        addr: SocketAddr,
        canonical: u16,
        actual: u16,
    },
}

/// Creates listening sockets. The seam for tests and custom socket options.
pub trait Binder: Send + Sync + 'static {
    fn bind(&self, addr: SocketAddr) -> io::Result<std::net::TcpListener>;
}

/// Plain TCP binder.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpBinder;

impl Binder for TcpBinder {
    fn bind(&self, addr: SocketAddr) -> io::Result<std::net::TcpListener> {
        let listener = std::net::TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(listener)
    }
}

/// A set of bound sockets sharing one port.
///
/// Sockets are bound eagerly and only registered with the runtime on
/// [`Listener::start`]. Dropping the listener closes every socket and aborts
/// any running accept loop.
#[derive(Default)]
pub struct Listener {
    bound: Vec<std::net::TcpListener>,
    local_addrs: Vec<SocketAddr>,
    port: Option<u16>,
    stop_tx: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Listener {
    /// Create a listener with no sockets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical port, set by the first successful bind.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Addresses actually bound, in bind order.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    /// Whether accept loops are running.
    pub fn is_accepting(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Bind one more address onto this listener.
    ///
    /// A zero port is replaced by the canonical port once one exists, so
    /// every address family lands on the same port.
    pub fn add_port(
        &mut self,
        binder: &dyn Binder,
        mut addr: SocketAddr,
    ) -> Result<u16, BindError> {
        if addr.port() == 0 {
            if let Some(port) = self.port {
                addr.set_port(port);
            }
        }

        let socket = binder
            .bind(addr)
            .map_err(|source| BindError::Address { addr, source })?;
        let local = socket
            .local_addr()
            .map_err(|source| BindError::Address { addr, source })?;

        match self.port {
            None => self.port = Some(local.port()),
            Some(canonical) if canonical != local.port() => {
                return Err(BindError::PortMismatch {
                    addr: local,
                    canonical,
                    actual: local.port(),
                });
            }
            Some(_) => {}
        }

        self.bound.push(socket);
        self.local_addrs.push(local);
        Ok(local.port())
    }

    /// Start one accept loop per bound socket on `runtime`.
    ///
    /// Returns how many sockets are accepting. A socket the runtime refuses
    /// is closed and logged.
    pub fn start(&mut self, runtime: &Handle, on_accept: OnAccept) -> usize {
        let stop_rx = self
            .stop_tx
            .get_or_insert_with(|| watch::channel(false).0)
            .subscribe();
        let mut accepting = 0;
        for socket in self.bound.drain(..) {
            let registered = {
                let _enter = runtime.enter();
                TcpListener::from_std(socket)
            };
            match registered {
                Ok(listener) => {
                    let accept = accept_loop(listener, stop_rx.clone(), Arc::clone(&on_accept));
                    self.tasks.push(runtime.spawn(accept));
                    accepting += 1;
                }
                Err(e) => tracing::error!(error = %e, "Failed to register socket with runtime"),
            }
        }
        accepting
    }

    /// Stop every accept loop and wait for them to exit.
    ///
    /// Once this returns the accept callback will not be invoked again.
    pub async fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::error!(error = %e, "Accept loop panicked");
                }
            }
        }
        self.bound.clear();
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("port", &self.port)
            .field("local_addrs", &self.local_addrs)
            .field("accepting", &self.is_accepting())
            .finish()
    }
}

/// Bind every address in `set`, enforcing one shared port.
///
/// Individual bind failures are tolerated according to `policy`. A port
/// mismatch is never tolerated. On any error every socket bound so far is
/// closed before returning.
pub fn bind_address_set(
    set: AddressSet,
    binder: &dyn Binder,
    policy: BindPolicy,
) -> Result<(Listener, u16), BindError> {
    let resolved = set.len();
    let mut listener = Listener::new();
    let mut last_error = None;

    for addr in set {
        match listener.add_port(binder, addr) {
            Ok(port) => tracing::debug!(address = %addr, port, "Address bound"),
            Err(BindError::Address { addr, source }) => {
                tracing::warn!(address = %addr, error = %source, "Failed to bind address");
                last_error = Some(source);
            }
            Err(fault) => {
                tracing::error!(error = %fault, "Bound sockets disagree on port");
                return Err(fault);
            }
        }
    }

    let Some(port) = listener.port() else {
        tracing::error!(resolved, "No address bound out of total resolved");
        return Err(BindError::NoneBound { resolved, last_error });
    };
    let bound = listener.local_addrs().len();
    if bound < resolved {
        match policy {
            BindPolicy::AllowPartial => {
                tracing::warn!(
                    bound,
                    resolved,
                    "Only some resolved addresses bound, serving on those"
                );
            }
            BindPolicy::RequireAll => {
                return Err(BindError::Partial {
                    bound,
                    resolved,
                    last_error,
                });
            }
        }
    }

    Ok((listener, port))
}

async fn accept_loop(listener: TcpListener, mut stop: watch::Receiver<bool>, on_accept: OnAccept) {
    let local_addr = listener.local_addr().ok();
    tracing::info!(address = ?local_addr, "Accepting connections");

    loop {
        tokio::select! {
            biased;
            _ = stop.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    tracing::debug!(peer_addr = %peer_addr, "Connection accepted");
                    on_accept(stream, peer_addr);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to accept connection");
                    tokio::select! {
                        _ = stop.changed() => break,
                        _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => {}
                    }
                }
            },
        }
    }

    tracing::debug!(address = ?local_addr, "Accept loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn loopback(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    /// Binds everything on an ephemeral port, ignoring the requested port.
    struct EphemeralBinder;

    impl Binder for EphemeralBinder {
        fn bind(&self, addr: SocketAddr) -> io::Result<std::net::TcpListener> {
            TcpBinder.bind(SocketAddr::new(addr.ip(), 0))
        }
    }

    /// Refuses a fixed set of addresses.
    struct RefusingBinder(Vec<IpAddr>);

    impl Binder for RefusingBinder {
        fn bind(&self, addr: SocketAddr) -> io::Result<std::net::TcpListener> {
            if self.0.contains(&addr.ip()) {
                return Err(io::Error::new(io::ErrorKind::AddrNotAvailable, "refused"));
            }
            TcpBinder.bind(addr)
        }
    }

    #[test]
    fn first_bind_sets_canonical_port() {
        let mut listener = Listener::new();
        let port = listener.add_port(&TcpBinder, loopback(0)).unwrap();
        assert_ne!(port, 0);
        assert_eq!(listener.port(), Some(port));
    }

    #[test]
    fn zero_port_reuses_canonical_port() {
        let set = AddressSet::new([loopback(0), "127.0.0.2:0".parse().unwrap()]);
        // 127.0.0.2 is not routable everywhere; a refusal still leaves one socket.
        let (listener, port) = bind_address_set(set, &TcpBinder, BindPolicy::AllowPartial).unwrap();
        assert!(listener.local_addrs().iter().all(|a| a.port() == port));
    }

    #[test]
    fn mismatched_ports_fault() {
        let set = AddressSet::new([loopback(0), loopback(1)]);
        let err = bind_address_set(set, &EphemeralBinder, BindPolicy::AllowPartial).unwrap_err();
        assert!(matches!(err, BindError::PortMismatch { .. }));
    }

    #[test]
    fn partial_bind_allowed_by_default() {
        let refused: SocketAddr = "127.0.0.3:0".parse().unwrap();
        let set = AddressSet::new([refused, loopback(0)]);
        let binder = RefusingBinder(vec![refused.ip()]);
        let (listener, _) = bind_address_set(set, &binder, BindPolicy::AllowPartial).unwrap();
        assert_eq!(listener.local_addrs().len(), 1);
        assert_eq!(listener.local_addrs()[0].ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn partial_bind_rejected_when_required() {
        let refused: SocketAddr = "127.0.0.3:0".parse().unwrap();
        let set = AddressSet::new([loopback(0), refused]);
        let binder = RefusingBinder(vec![refused.ip()]);
        let err = bind_address_set(set, &binder, BindPolicy::RequireAll).unwrap_err();
        assert!(matches!(err, BindError::Partial { bound: 1, resolved: 2, .. }));
    }

    #[test]
    fn nothing_bound_is_an_error() {
        let set = AddressSet::new([loopback(0)]);
        let binder = RefusingBinder(vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]);
        let err = bind_address_set(set, &binder, BindPolicy::AllowPartial).unwrap_err();
        assert!(matches!(err, BindError::NoneBound { resolved: 1, last_error: Some(_) }));
    }

    #[test]
    fn failed_binding_releases_sockets() {
        let mut first = Listener::new();
        let port = first.add_port(&TcpBinder, loopback(0)).unwrap();
        drop(first);

        // The port is free again once the listener is gone.
        let mut second = Listener::new();
        assert_eq!(second.add_port(&TcpBinder, loopback(port)).unwrap(), port);
    }

    #[tokio::test]
    async fn stop_silences_callback() {
        let mut listener = Listener::new();
        let port = listener.add_port(&TcpBinder, loopback(0)).unwrap();

        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);
        listener.start(
            &Handle::current(),
            Arc::new(move |_: TcpStream, _: SocketAddr| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert!(listener.is_accepting());

        let _client = TcpStream::connect(loopback(port)).await.unwrap();
        for _ in 0..50 {
            if accepted.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(accepted.load(Ordering::SeqCst), 1);

        listener.stop().await;
        assert!(!listener.is_accepting());
        assert!(TcpStream::connect(loopback(port)).await.is_err());
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn start_reports_accepting_sockets() {
        let set = AddressSet::new([loopback(0)]);
        let (mut listener, _) =
            bind_address_set(set, &TcpBinder, BindPolicy::AllowPartial).unwrap();
        let on_accept: OnAccept = Arc::new(|_: TcpStream, _: SocketAddr| {});

        assert_eq!(listener.start(&Handle::current(), Arc::clone(&on_accept)), 1);
        // Sockets are handed to the runtime once; a repeat start has none left.
        assert_eq!(listener.start(&Handle::current(), on_accept), 0);
        listener.stop().await;
    }
}
