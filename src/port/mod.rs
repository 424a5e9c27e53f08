//! Secure ports.
//!
//! # Data Flow
//! ```text
//! add_secure_port(server, target, credential)
//!     → security::create_context
//!     → net::Resolver (target → AddressSet)
//!     → net::bind_address_set (one shared port)
//!     → SecurePort registered with the server
//!
//! Accepted TCP stream (after start)
//!     → handshake.rs (HandshakeCoordinator, under timeout)
//!     → DeliveryGate → Server builds the transport
//! ```
//!
//! # Design Decisions
//! - Any failure releases what the call acquired and registers nothing
//! - Destroy closes the delivery gate before stopping accept, so no
//!   connection reaches the server afterwards

pub mod error;
pub mod handshake;
pub mod secure_port;

pub use error::{ErrorKind, SecurePortError};
pub use handshake::DeliveryGate;
pub use secure_port::{add_secure_port, PortState, SecurePort};
