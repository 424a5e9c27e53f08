//! Secure listening ports for a network server.
//!
//! A port pairs a set of bound sockets with a security context. Every
//! accepted connection is handshaken asynchronously and, on success, handed
//! to the owning server's transport factory.

pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod port;
pub mod security;
pub mod server;
pub mod transport;

pub use config::SecurePortConfig;
pub use lifecycle::Shutdown;
pub use net::BindPolicy;
pub use port::{add_secure_port, ErrorKind, SecurePortError};
pub use security::{Credential, TlsCredential};
pub use server::{Server, ServerBuilder, ServerListener, ServerState};
pub use transport::{TransportFactory, TransportSetup};
