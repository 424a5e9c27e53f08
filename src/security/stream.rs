//! Secured connection handed to the transport layer.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;

/// A connection that completed its security handshake.
pub enum SecureStream {
    Tls(Box<TlsStream<TcpStream>>),
    Insecure(TcpStream),
}

impl SecureStream {
    /// Remote address of the underlying TCP connection.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.tcp().peer_addr()
    }

    /// ALPN protocol agreed during the handshake, if any.
    pub fn alpn_protocol(&self) -> Option<&[u8]> {
        match self {
            SecureStream::Tls(tls) => tls.get_ref().1.alpn_protocol(),
            SecureStream::Insecure(_) => None,
        }
    }

    /// Mechanism that secured this stream.
    pub fn security_kind(&self) -> &'static str {
        match self {
            SecureStream::Tls(_) => "tls",
            SecureStream::Insecure(_) => "insecure",
        }
    }

    fn tcp(&self) -> &TcpStream {
        match self {
            SecureStream::Tls(tls) => tls.get_ref().0,
            SecureStream::Insecure(tcp) => tcp,
        }
    }
}

impl std::fmt::Debug for SecureStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureStream")
            .field("kind", &self.security_kind())
            .field("peer_addr", &self.peer_addr().ok())
            .finish()
    }
}

impl AsyncRead for SecureStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SecureStream::Tls(tls) => Pin::new(tls.as_mut()).poll_read(cx, buf),
            SecureStream::Insecure(tcp) => Pin::new(tcp).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SecureStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            SecureStream::Tls(tls) => Pin::new(tls.as_mut()).poll_write(cx, buf),
            SecureStream::Insecure(tcp) => Pin::new(tcp).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SecureStream::Tls(tls) => Pin::new(tls.as_mut()).poll_flush(cx),
            SecureStream::Insecure(tcp) => Pin::new(tcp).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SecureStream::Tls(tls) => Pin::new(tls.as_mut()).poll_shutdown(cx),
            SecureStream::Insecure(tcp) => Pin::new(tcp).poll_shutdown(cx),
        }
    }
}
