//! Connection identity and in-flight handshake tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Bound the number of handshakes in flight per port
//! - Let shutdown wait for in-flight handshakes to settle

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::observability::metrics;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Tracks handshakes in flight on one port.
///
/// A semaphore caps concurrency. Acquisition never waits: when the cap is
/// reached the caller sheds the connection so the accept loop keeps moving.
#[derive(Debug, Clone)]
pub struct HandshakeTracker {
    permits: Arc<Semaphore>,
    limit: usize,
}

impl HandshakeTracker {
    /// Create a tracker allowing `limit` concurrent handshakes.
    pub fn new(limit: usize) -> Self {
        let limit = limit.clamp(1, Semaphore::MAX_PERMITS.min(u32::MAX as usize));
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Record a new handshake, or `None` when the port is saturated.
    pub fn try_track(&self) -> Option<HandshakeGuard> {
        let permit = Arc::clone(&self.permits).try_acquire_owned().ok()?;
        metrics::handshake_started();
        Some(HandshakeGuard {
            _permit: permit,
            id: ConnectionId::new(),
        })
    }

    /// Handshakes currently in flight.
    pub fn in_flight(&self) -> usize {
        self.limit - self.permits.available_permits()
    }

    /// Configured concurrency cap.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Wait until no handshake is in flight.
    pub async fn wait_idle(&self) {
        // The cap is clamped to u32 in `new`.
        if let Ok(all) = self.permits.acquire_many(self.limit as u32).await {
            drop(all);
        }
    }
}

/// Guard held for one handshake's lifetime.
/// Releases its slot when dropped, even if the handshake task panics.
#[derive(Debug)]
pub struct HandshakeGuard {
    _permit: OwnedSemaphorePermit,
    id: ConnectionId,
}

impl HandshakeGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for HandshakeGuard {
    fn drop(&mut self) {
        metrics::handshake_finished();
        tracing::trace!(connection_id = %self.id, "Handshake slot released");
    }
}
