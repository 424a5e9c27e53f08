//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! CredentialConfig (TOML)
//!     → credential.rs (Credential: TLS PEM material or insecure)
//!     → context.rs (create_context → Arc<dyn SecurityContext>)
//!     → per accepted TCP stream: handshake()
//!     → stream.rs (SecureStream handed to the transport)
//! ```
//!
//! # Design Decisions
//! - PEM parsing is deferred to context creation so bad material fails there
//! - The insecure variant exists for tests and local development only

pub mod context;
pub mod credential;
pub mod error;
pub mod stream;

pub use context::{
    create_context, HandshakeFuture, InsecureContext, SecurityContext, SharedContext, TlsContext,
    INSECURE_CLIENT_PREFACE, INSECURE_SERVER_REPLY,
};
pub use credential::{Credential, CredentialConfig, TlsCredential, TlsCredentialConfig};
pub use error::{CredentialError, HandshakeError};
pub use stream::SecureStream;
