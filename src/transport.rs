//! The Transport collaborator: a bidirectional, ordered, reliable byte
//! stream with cancellable termination, supporting a no-delay hint.

use tokio::io::{AsyncRead, AsyncWrite};

/// Anything the Session can frame over. Blanket-implemented for any
/// `AsyncRead + AsyncWrite + Unpin + Send`, so `TcpStream`, `tokio::io::DuplexStream`
/// (used throughout `tests/`) and any TLS-wrapped stream a caller supplies all
/// qualify without a bespoke adapter type.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Applies the "no-delay" hint where the concrete transport supports it.
/// `TcpStream` is the only transport in this crate
/// that does; other transports (in-memory duplexes, TLS wrappers a caller
/// brings) are expected to apply their own equivalent before handing the
/// stream to [`crate::client::connect`] / [`crate::server::accept`].
pub fn set_tcp_nodelay(stream: &tokio::net::TcpStream) -> std::io::Result<()> {
    stream.set_nodelay(true)
}
