//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → Server → register listeners → start
//!
//! Shutdown (shutdown.rs):
//!     Trigger → every listener destroyed → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then listeners, then accept
//! - Ordered shutdown: close delivery, stop accept, release contexts

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::{spawn_signal_handler, wait_for_signal};
pub use startup::{build_server, run, StartupError};
