//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Listen target ("host:port")
//!     → resolve.rs (AddressSet, default service port)
//!     → listener.rs (bind every address on one port)
//!
//! Incoming TCP connection
//!     → listener.rs (accept loop per bound socket)
//!     → connection.rs (connection ID, in-flight handshake slot)
//!     → port::handshake (security handshake, transport hand-off)
//! ```
//!
//! # Design Decisions
//! - Binding is synchronous and happens before start; sockets join the
//!   runtime only when accepting begins
//! - Accept never waits on a handshake: saturated ports shed connections
//! - Resolution and binding are trait seams so tests can inject faults

pub mod connection;
pub mod listener;
pub mod resolve;

pub use connection::{ConnectionId, HandshakeGuard, HandshakeTracker};
pub use listener::{bind_address_set, BindError, BindPolicy, Binder, Listener, OnAccept, TcpBinder};
pub use resolve::{AddressSet, ResolveError, Resolver, SystemResolver, DEFAULT_SERVICE};
