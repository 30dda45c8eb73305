//! Error kinds for handshake, session and codec failures.

use thiserror::Error;

/// Top-level error surfaced by the public API and the `error` event.
#[derive(Debug, Error)]
pub enum WsError {
    /// URL has no host, or an unsupported scheme.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Requested `protocol_version` is neither 8 nor 13.
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    /// `Sec-WebSocket-Accept` missing or did not match the expected value.
    #[error("invalid server key: {0}")]
    InvalidServerKey(String),

    /// The underlying transport returned an I/O error.
    #[error("transport error: {0}")]
    TransportError(#[from] std::io::Error),

    /// A send-shaped operation was attempted while `ready_state != Open`.
    #[error("session not opened")]
    NotOpened,

    /// The Decoder rejected incoming bytes; carries the close code to emit
    /// on the wire before this error is raised, if the violation has one.
    #[error("protocol error: {reason}")]
    ProtocolError {
        reason: ProtocolError,
        close_code: Option<u16>,
    },

    /// The Encoder failed to write a frame to the transport.
    #[error("encoder error: {0}")]
    EncoderError(String),

    /// `stream()` was called without a callback.
    #[error("stream() requires a callback")]
    NoCallback,

    /// The HTTP upgrade handshake failed outright (bad status, no Upgrade).
    #[error("handshake failed: {0}")]
    HandShakeFailed(String),
}

/// Decode-time protocol violations, surfaced either as a `WsError::ProtocolError`
/// or (internally, before the Session wraps it) as the Decoder's raw error event.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("reserved bits set in leading byte {0:#04b}")]
    InvalidLeadingBits(u8),
    #[error("invalid opcode {0}")]
    InvalidOpcode(u8),
    #[error("continuation frame without an initial fragmented frame")]
    MissingInitialFragment,
    #[error("data frame received while a fragmented message is in progress")]
    NotContinuationAfterFragment,
    #[error("control frame must not be fragmented")]
    FragmentedControlFrame,
    #[error("control frame payload too large: {0} bytes")]
    ControlFrameTooBig(usize),
    #[error("close frame payload length {0} is invalid (must be 0 or >= 2)")]
    InvalidCloseFramePayload(usize),
    #[error("invalid utf-8 in text message")]
    InvalidUtf8,
    #[error("invalid close code {0}")]
    InvalidCloseCode(u16),
    #[error("payload of {0} bytes exceeds configured maximum of {1} bytes")]
    PayloadTooLarge(usize, usize),
}
