//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the server from validated configuration
//! - Register every configured listener before anything accepts
//! - Start listeners, wait for shutdown, then destroy them
//!
//! # Design Decisions
//! - Fail fast: any listener that cannot be registered aborts startup, and
//!   listeners registered before it are released with the server
//! - Listeners start last (traffic only when every port is bound)

use tokio::sync::broadcast;

use crate::config::SecurePortConfig;
use crate::port::SecurePortError;
use crate::server::{Server, ServerError};
use crate::transport::TransportFactory;

/// Error type for startup.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("listener {address:?}: {source}")]
    Listener {
        address: String,
        #[source]
        source: SecurePortError,
    },

    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Build a server and register every configured listener.
pub async fn build_server(
    config: &SecurePortConfig,
    transport: impl TransportFactory,
) -> Result<Server, StartupError> {
    let server = Server::builder(transport)
        .settings(config.server.clone())
        .channel_config(config.channel.clone())
        .build();

    for listener in &config.listeners {
        let port = server
            .add_listener_from_config(listener)
            .await
            .map_err(|source| StartupError::Listener {
                address: listener.address.clone(),
                source,
            })?;
        tracing::info!(address = %listener.address, port, "Listener configured");
    }

    Ok(server)
}

/// Start `server`, block until `shutdown` fires, then shut it down.
pub async fn run(
    server: Server,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), StartupError> {
    server.start()?;
    tracing::info!(ports = ?server.ports(), "Serving");

    // A closed channel means every sender is gone; treat it as a trigger.
    let _ = shutdown.recv().await;

    tracing::info!("Shutting down");
    server.shutdown().await;
    Ok(())
}
