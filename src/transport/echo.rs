//! Echo transport used by the binary.
//!
//! Writes back every byte it reads, up to the channel's message size per
//! read, until the peer closes.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::transport::{TransportError, TransportFactory, TransportSetup};

/// Transport that echoes the secured stream back to the peer.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoTransport;

impl TransportFactory for EchoTransport {
    fn create(&self, setup: TransportSetup) -> Result<(), TransportError> {
        let TransportSetup {
            mut stream,
            peer_addr,
            filters,
            channel_config,
            metadata,
        } = setup;

        tracing::debug!(
            peer_addr = %peer_addr,
            metadata_id = %metadata.id(),
            filters = ?filters.iter().map(|f| f.name()).collect::<Vec<_>>(),
            "Echo transport started"
        );

        let buffer_size = channel_config.max_message_size.clamp(1, 64 * 1024);
        tokio::spawn(async move {
            let mut buf = vec![0u8; buffer_size];
            let mut echoed = 0u64;
            loop {
                let n = match stream.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) => {
                        tracing::debug!(peer_addr = %peer_addr, error = %e, "Echo read failed");
                        break;
                    }
                };
                if let Err(e) = stream.write_all(&buf[..n]).await {
                    tracing::debug!(peer_addr = %peer_addr, error = %e, "Echo write failed");
                    break;
                }
                echoed += n as u64;
            }
            let _ = stream.shutdown().await;
            tracing::debug!(peer_addr = %peer_addr, bytes = echoed, "Echo transport closed");
        });

        Ok(())
    }
}
