//! Frame encoding and decoding, implemented as
//! `tokio_util::codec::{Encoder, Decoder}` wrapping [`crate::frame::FrameHeader`].
//!
//! Kept as a single module: one `FrameEncoder`/`FrameDecoder` pair bundled
//! behind `tokio_util::codec::Framed` so the Session (`src/session.rs`) only
//! ever sees `OutgoingFrame` in and `DecodedEvent` out.

use bytes::{Bytes, BytesMut};

use crate::errors::ProtocolError;
use crate::frame::{FrameHeader, OpCode};

/// Tunables for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Reject frames (after reassembly, for data messages) larger than this.
    pub max_payload_len: usize,
    /// Reject frames with any RSV bit set (no extension negotiated).
    pub check_rsv: bool,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_len: 16 * 1024 * 1024,
            check_rsv: true,
        }
    }
}

/// A single outbound frame, already carrying its role-determined mask key.
#[derive(Debug, Clone)]
pub struct OutgoingFrame {
    pub fin: bool,
    pub opcode: OpCode,
    pub mask: Option<[u8; 4]>,
    pub payload: Bytes,
}

impl OutgoingFrame {
    pub fn data(fin: bool, opcode: OpCode, mask: Option<[u8; 4]>, payload: Bytes) -> Self {
        Self {
            fin,
            opcode,
            mask,
            payload,
        }
    }

    pub fn ping(mask: Option<[u8; 4]>, payload: Bytes) -> Self {
        Self::data(true, OpCode::Ping, mask, payload)
    }

    pub fn pong(mask: Option<[u8; 4]>, payload: Bytes) -> Self {
        Self::data(true, OpCode::Pong, mask, payload)
    }

    /// Builds a close frame. `code = None` produces the payload-less close
    /// variant allowed by RFC 6455 §5.5.1.
    pub fn close(mask: Option<[u8; 4]>, code: Option<u16>, reason: &[u8]) -> Self {
        let mut payload = BytesMut::new();
        if let Some(code) = code {
            payload.extend_from_slice(&code.to_be_bytes());
            payload.extend_from_slice(reason);
        }
        Self::data(true, OpCode::Close, mask, payload.freeze())
    }
}

/// One parsed logical event from the byte stream: exactly one of
/// text/binary/ping/pong/close/error per decoded frame boundary or
/// reassembled message.
#[derive(Debug, Clone)]
pub enum DecodedEvent {
    Text(Bytes),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close {
        code: Option<u16>,
        reason: Bytes,
    },
    Error {
        reason: ProtocolError,
        close_code: Option<u16>,
    },
}

/// Encoder half: serializes [`OutgoingFrame`] to bytes, masking in place.
#[derive(Debug, Clone, Default)]
pub struct FrameEncoder;

impl tokio_util::codec::Encoder<OutgoingFrame> for FrameEncoder {
    type Error = std::io::Error;

    fn encode(&mut self, item: OutgoingFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let header =
            FrameHeader::new(item.fin, item.opcode, item.mask, item.payload.len() as u64);
        header.encode(dst);
        let start = dst.len();
        dst.extend_from_slice(&item.payload);
        if let Some(mask) = item.mask {
            crate::mask::apply_mask_fast32(&mut dst[start..], mask);
        }
        Ok(())
    }
}

/// Whether a just-parsed frame completes a logical message or only updates
/// internal fragment-reassembly state.
enum Step {
    /// A control frame, or the final fragment of a data message: emit it.
    Emit(DecodedEvent),
    /// A non-final data fragment: keep reading within the same `decode()` call.
    KeepReading,
}

/// Decoder half: reassembles fragments, validates UTF-8 and close codes.
/// Never returns `Err` for protocol violations; those surface as
/// `DecodedEvent::Error` so the Session can auto-close with the carried
/// code and then raise `error`.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    config: FrameConfig,
    fragmented: Option<FragmentState>,
}

#[derive(Debug, Clone)]
struct FragmentState {
    opcode: OpCode,
    payload: BytesMut,
}

impl FrameDecoder {
    pub fn new(config: FrameConfig) -> Self {
        Self {
            config,
            fragmented: None,
        }
    }

    fn validate_close_payload(payload: &[u8]) -> Result<(Option<u16>, Bytes), ProtocolError> {
        match payload.len() {
            0 => Ok((None, Bytes::new())),
            1 => Err(ProtocolError::InvalidCloseFramePayload(1)),
            _ => {
                let code = u16::from_be_bytes([payload[0], payload[1]]);
                if code < 1000 || (1004..=1006).contains(&code) || code >= 5000 {
                    return Err(ProtocolError::InvalidCloseCode(code));
                }
                let reason = &payload[2..];
                std::str::from_utf8(reason).map_err(|_| ProtocolError::InvalidUtf8)?;
                Ok((Some(code), Bytes::copy_from_slice(reason)))
            }
        }
    }

    fn dispatch(&mut self, header: FrameHeader, payload: Bytes) -> Step {
        match header.opcode {
            OpCode::Continue => self.handle_continuation(header.fin, payload),
            OpCode::Text | OpCode::Binary => self.handle_data(header, payload),
            OpCode::Ping | OpCode::Pong | OpCode::Close => self.handle_control(header, payload),
            OpCode::ReservedNonControl | OpCode::ReservedControl => Step::Emit(DecodedEvent::Error {
                reason: ProtocolError::InvalidOpcode(header.opcode.as_u8()),
                close_code: Some(1002),
            }),
        }
    }

    fn handle_data(&mut self, header: FrameHeader, payload: Bytes) -> Step {
        if self.fragmented.is_some() {
            return Step::Emit(DecodedEvent::Error {
                reason: ProtocolError::NotContinuationAfterFragment,
                close_code: Some(1002),
            });
        }
        if header.fin {
            Step::Emit(self.finish_message(header.opcode, payload))
        } else {
            self.fragmented = Some(FragmentState {
                opcode: header.opcode,
                payload: BytesMut::from(&payload[..]),
            });
            Step::KeepReading
        }
    }

    fn handle_continuation(&mut self, fin: bool, payload: Bytes) -> Step {
        let Some(state) = self.fragmented.as_mut() else {
            return Step::Emit(DecodedEvent::Error {
                reason: ProtocolError::MissingInitialFragment,
                close_code: Some(1002),
            });
        };
        if state.payload.len() + payload.len() > self.config.max_payload_len {
            let attempted = state.payload.len() + payload.len();
            self.fragmented = None;
            return Step::Emit(DecodedEvent::Error {
                reason: ProtocolError::PayloadTooLarge(attempted, self.config.max_payload_len),
                close_code: Some(1009),
            });
        }
        state.payload.extend_from_slice(&payload);
        if !fin {
            return Step::KeepReading;
        }
        let state = self.fragmented.take().expect("checked above");
        Step::Emit(self.finish_message(state.opcode, state.payload.freeze()))
    }

    fn finish_message(&mut self, opcode: OpCode, payload: Bytes) -> DecodedEvent {
        if opcode == OpCode::Text && std::str::from_utf8(&payload).is_err() {
            return DecodedEvent::Error {
                reason: ProtocolError::InvalidUtf8,
                close_code: Some(1007),
            };
        }
        if opcode == OpCode::Text {
            DecodedEvent::Text(payload)
        } else {
            DecodedEvent::Binary(payload)
        }
    }

    fn handle_control(&mut self, header: FrameHeader, payload: Bytes) -> Step {
        if !header.fin {
            return Step::Emit(DecodedEvent::Error {
                reason: ProtocolError::FragmentedControlFrame,
                close_code: Some(1002),
            });
        }
        if payload.len() > 125 {
            return Step::Emit(DecodedEvent::Error {
                reason: ProtocolError::ControlFrameTooBig(payload.len()),
                close_code: Some(1002),
            });
        }
        let event = match header.opcode {
            OpCode::Ping => DecodedEvent::Ping(payload),
            OpCode::Pong => DecodedEvent::Pong(payload),
            OpCode::Close => match Self::validate_close_payload(&payload) {
                Ok((code, reason)) => DecodedEvent::Close { code, reason },
                Err(reason) => {
                    let close_code = match reason {
                        ProtocolError::InvalidUtf8 => Some(1007),
                        _ => Some(1002),
                    };
                    DecodedEvent::Error { reason, close_code }
                }
            },
            _ => unreachable!("only ping/pong/close reach handle_control"),
        };
        Step::Emit(event)
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(FrameConfig::default())
    }
}

/// Bundles the encoder and decoder halves behind one `tokio_util::codec::Framed`.
/// The Session drives a single `Framed<T, SessionCodec>` as both
/// `Sink<OutgoingFrame>` and `Stream<Item = Result<DecodedEvent, io::Error>>`.
#[derive(Debug, Clone, Default)]
pub struct SessionCodec {
    encoder: FrameEncoder,
    decoder: FrameDecoder,
}

impl SessionCodec {
    pub fn new(config: FrameConfig) -> Self {
        Self {
            encoder: FrameEncoder,
            decoder: FrameDecoder::new(config),
        }
    }
}

impl tokio_util::codec::Encoder<OutgoingFrame> for SessionCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: OutgoingFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.encoder.encode(item, dst)
    }
}

impl tokio_util::codec::Decoder for SessionCodec {
    type Item = DecodedEvent;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decoder.decode(src)
    }
}

impl tokio_util::codec::Decoder for FrameDecoder {
    type Item = DecodedEvent;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let parsed = match FrameHeader::parse(src, self.config.check_rsv) {
                Ok(Some(parsed)) => parsed,
                Ok(None) => return Ok(None),
                Err(reason) => {
                    return Ok(Some(DecodedEvent::Error {
                        reason,
                        close_code: Some(1002),
                    }))
                }
            };
            let (header, header_len) = parsed;

            if header.payload_len as usize > self.config.max_payload_len {
                return Ok(Some(DecodedEvent::Error {
                    reason: ProtocolError::PayloadTooLarge(
                        header.payload_len as usize,
                        self.config.max_payload_len,
                    ),
                    close_code: Some(1009),
                }));
            }

            let total_len = header_len + header.payload_len as usize;
            if src.len() < total_len {
                src.reserve(total_len - src.len());
                return Ok(None);
            }

            let _header_bytes = src.split_to(header_len);
            let mut payload = src.split_to(header.payload_len as usize);
            if let Some(mask) = header.mask {
                crate::mask::apply_mask_fast32(&mut payload, mask);
            }
            let payload = payload.freeze();

            match self.dispatch(header, payload) {
                Step::Emit(event) => return Ok(Some(event)),
                Step::KeepReading => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::codec::{Decoder, Encoder};

    fn encode(frame: OutgoingFrame) -> BytesMut {
        let mut buf = BytesMut::new();
        FrameEncoder.encode(frame, &mut buf).unwrap();
        buf
    }

    #[test]
    fn round_trips_unmasked_text() {
        let mut buf = encode(OutgoingFrame::data(
            true,
            OpCode::Text,
            None,
            Bytes::from_static(b"hello"),
        ));
        let mut decoder = FrameDecoder::default();
        match decoder.decode(&mut buf).unwrap().unwrap() {
            DecodedEvent::Text(payload) => assert_eq!(&payload[..], b"hello"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn reassembles_fragmented_message_in_one_decode_call() {
        let mut buf = encode(OutgoingFrame::data(
            false,
            OpCode::Text,
            None,
            Bytes::from_static(b"hel"),
        ));
        buf.extend_from_slice(&encode(OutgoingFrame::data(
            true,
            OpCode::Continue,
            None,
            Bytes::from_static(b"lo"),
        )));
        let mut decoder = FrameDecoder::default();
        match decoder.decode(&mut buf).unwrap().unwrap() {
            DecodedEvent::Text(payload) => assert_eq!(&payload[..], b"hello"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn masked_round_trip_unmasks_on_decode() {
        let mut buf = encode(OutgoingFrame::data(
            true,
            OpCode::Binary,
            Some([1, 2, 3, 4]),
            Bytes::from_static(b"secret"),
        ));
        let mut decoder = FrameDecoder::default();
        match decoder.decode(&mut buf).unwrap().unwrap() {
            DecodedEvent::Binary(payload) => assert_eq!(&payload[..], b"secret"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_invalid_utf8_text() {
        let mut buf = encode(OutgoingFrame::data(
            true,
            OpCode::Text,
            None,
            Bytes::from(vec![0xff, 0xfe]),
        ));
        let mut decoder = FrameDecoder::default();
        match decoder.decode(&mut buf).unwrap().unwrap() {
            DecodedEvent::Error { close_code, .. } => assert_eq!(close_code, Some(1007)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decode_waits_for_more_bytes() {
        let mut buf = encode(OutgoingFrame::data(
            true,
            OpCode::Text,
            None,
            Bytes::from_static(b"hello"),
        ));
        buf.truncate(buf.len() - 1);
        let mut decoder = FrameDecoder::default();
        assert!(decoder.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn empty_close_frame_decodes_with_no_code() {
        let mut buf = encode(OutgoingFrame::close(None, None, b""));
        let mut decoder = FrameDecoder::default();
        match decoder.decode(&mut buf).unwrap().unwrap() {
            DecodedEvent::Close { code, reason } => {
                assert_eq!(code, None);
                assert!(reason.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
