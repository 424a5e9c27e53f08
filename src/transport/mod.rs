//! Boundary to the application-protocol transport.
//!
//! # Data Flow
//! ```text
//! Handshake success
//!     → TransportSetup { secured stream, SERVER_FILTERS, channel config,
//!                        fresh MetadataContext, peer address }
//!     → TransportFactory::create (owned by the Server)
//!     → transport engine runs the application protocol
//! ```
//!
//! # Design Decisions
//! - The filter list is fixed and ordered; transports must apply it as given
//! - `create` is synchronous: implementations spawn their own tasks and
//!   must not block, since port destroy waits for running deliveries
//! - Every transport gets its own metadata context

pub mod echo;

use std::net::SocketAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::security::SecureStream;

pub use echo::EchoTransport;

/// Server-side protocol filters attached to every transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    /// Validates server-side request framing (method, path, content type).
    HttpServer,
    /// Generic HTTP header handling shared by client and server.
    Http,
}

impl Filter {
    pub fn name(&self) -> &'static str {
        match self {
            Filter::HttpServer => "http_server",
            Filter::Http => "http",
        }
    }
}

/// Filters for server transports, outermost first.
pub const SERVER_FILTERS: &[Filter] = &[Filter::HttpServer, Filter::Http];

/// Channel settings the owning server hands to every transport it builds.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChannelConfig {
    /// Maximum concurrent streams per connection.
    pub max_concurrent_streams: u32,

    /// Maximum inbound message size in bytes.
    pub max_message_size: usize,

    /// Keepalive ping interval in seconds.
    pub keepalive_secs: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_concurrent_streams: 100,
            max_message_size: 4 * 1024 * 1024,
            keepalive_secs: 7200,
        }
    }
}

/// Per-transport metadata context. Transports key their metadata tables by
/// its id, so no two transports share one.
#[derive(Debug)]
pub struct MetadataContext {
    id: Uuid,
}

impl MetadataContext {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Default for MetadataContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a transport needs to start serving a secured connection.
#[derive(Debug)]
pub struct TransportSetup {
    pub stream: SecureStream,
    pub peer_addr: SocketAddr,
    pub filters: &'static [Filter],
    pub channel_config: Arc<ChannelConfig>,
    pub metadata: MetadataContext,
}

/// Error type for transport construction.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("owning server is gone")]
    ServerGone,

    #[error("transport rejected connection: {0}")]
    Rejected(String),
}

/// Builds protocol transports over secured connections.
pub trait TransportFactory: Send + Sync + 'static {
    /// Take ownership of a secured connection.
    ///
    /// Called on a runtime worker while the port's delivery gate is held.
    /// Must return promptly: spawn the transport's work instead of running
    /// it here. A port being destroyed waits for this call to return.
    fn create(&self, setup: TransportSetup) -> Result<(), TransportError>;
}
