//! A HyBi-13 (RFC 6455) WebSocket session core: handshake negotiation, the
//! ready-state machine, the framed send/receive path, and the event sink
//! applications observe it through.
//!
//! TLS, multiplexing, server-side socket acceptance/HTTP routing,
//! reconnection, and permessage-deflate/extension negotiation are all out of
//! scope. Callers bring an already-connected
//! [`transport::Transport`] (and, on the server side, an already-parsed
//! upgrade request) and this crate takes it from there.

#![warn(missing_docs)]
#![cfg_attr(docrs, feature(doc_auto_cfg))]

pub use http;

/// Client-role construction (`ClientBuilder::connect`).
#[cfg(feature = "client")]
pub mod client;
/// Frame encoding/decoding over `tokio_util::codec`.
pub mod codec;
/// The Event Sink applications attach listeners to.
pub mod events;
/// Error kinds raised across the crate.
pub mod errors;
/// Frame header parsing/encoding and the `OpCode` enum.
pub mod frame;
/// The client-side HTTP Upgrade handshake.
pub mod handshake;
/// XOR masking (RFC 6455 §5.3).
mod mask;
/// The ready-state machine, queue gate, and send/receive driver.
pub mod session;
/// Server-role construction (`ServerBuilder::accept`).
#[cfg(feature = "server")]
pub mod server;
/// The Transport collaborator trait.
pub mod transport;

#[cfg(feature = "client")]
pub use client::ClientBuilder;
pub use errors::{ProtocolError, WsError};
pub use events::{ErrorEvent, Flags, ListenerId, Listeners, MessageEvent};
pub use frame::OpCode;
pub use session::{ChunkSource, IterSource, ReadyState, Role, SendOptions, Session};
#[cfg(feature = "server")]
pub use server::ServerBuilder;
