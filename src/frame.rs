//! Frame header bit layout (RFC 6455 §5.2) and header encode/decode helpers.
//!
//! This module is the byte-level half of the ENCODER/DECODER collaborators:
//! masking, length-prefix framing and UTF-8 validation live here and in
//! [`crate::codec`], while the Session (see [`crate::session`]) only ever
//! talks to the typed [`crate::codec::DecodedEvent`]/frame-with-flags surface
//! those modules expose.

use bytes::{BufMut, BytesMut};

use crate::errors::ProtocolError;

/// Interpretation of the "Payload data", per RFC 6455 §5.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    /// x0, continuation frame.
    Continue,
    /// x1, text frame.
    Text,
    /// x2, binary frame.
    Binary,
    /// x3-7, reserved for future non-control frames.
    ReservedNonControl,
    /// x8, connection close.
    Close,
    /// x9, ping.
    Ping,
    /// xA, pong.
    Pong,
    /// xB-F, reserved for future control frames.
    ReservedControl,
}

impl OpCode {
    pub fn as_u8(&self) -> u8 {
        match self {
            OpCode::Continue => 0,
            OpCode::Text => 1,
            OpCode::Binary => 2,
            OpCode::ReservedNonControl => 3,
            OpCode::Close => 8,
            OpCode::Ping => 9,
            OpCode::Pong => 10,
            OpCode::ReservedControl => 11,
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }

    pub fn is_data(&self) -> bool {
        matches!(self, OpCode::Text | OpCode::Binary | OpCode::Continue)
    }
}

pub(crate) fn parse_opcode(val: u8) -> Result<OpCode, ProtocolError> {
    match val & 0x0f {
        0x0 => Ok(OpCode::Continue),
        0x1 => Ok(OpCode::Text),
        0x2 => Ok(OpCode::Binary),
        0x3..=0x7 => Ok(OpCode::ReservedNonControl),
        0x8 => Ok(OpCode::Close),
        0x9 => Ok(OpCode::Ping),
        0xa => Ok(OpCode::Pong),
        other => {
            if (0xb..=0xf).contains(&other) {
                Ok(OpCode::ReservedControl)
            } else {
                Err(ProtocolError::InvalidOpcode(other))
            }
        }
    }
}

/// A decoded or to-be-encoded frame header, independent of payload bytes.
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    pub fin: bool,
    pub rsv1: bool,
    pub rsv2: bool,
    pub rsv3: bool,
    pub opcode: OpCode,
    pub mask: Option<[u8; 4]>,
    pub payload_len: u64,
}

impl FrameHeader {
    pub fn new(fin: bool, opcode: OpCode, mask: Option<[u8; 4]>, payload_len: u64) -> Self {
        Self {
            fin,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            mask,
            payload_len,
        }
    }

    /// Number of header bytes this frame occupies (not counting payload).
    pub fn header_len(&self) -> usize {
        let len_bytes = match self.payload_len {
            0..=125 => 1,
            126..=0xffff => 3,
            _ => 9,
        };
        1 + len_bytes + if self.mask.is_some() { 4 } else { 0 }
    }

    /// Serialize the header into `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        let mut first = 0u8;
        if self.fin {
            first |= 0b1000_0000;
        }
        if self.rsv1 {
            first |= 0b0100_0000;
        }
        if self.rsv2 {
            first |= 0b0010_0000;
        }
        if self.rsv3 {
            first |= 0b0001_0000;
        }
        first |= self.opcode.as_u8();
        dst.put_u8(first);

        let mask_bit = if self.mask.is_some() { 0x80 } else { 0x00 };
        match self.payload_len {
            0..=125 => dst.put_u8(mask_bit | self.payload_len as u8),
            126..=0xffff => {
                dst.put_u8(mask_bit | 126);
                dst.put_u16(self.payload_len as u16);
            }
            len => {
                dst.put_u8(mask_bit | 127);
                dst.put_u64(len);
            }
        }
        if let Some(mask) = self.mask {
            dst.extend_from_slice(&mask);
        }
    }

    /// Parse a header from the front of `src`. Returns `Ok(None)` when `src`
    /// does not yet hold a complete header (caller should wait for more
    /// bytes, mirroring `tokio_util::codec::Decoder`'s partial-frame contract).
    pub fn parse(
        src: &[u8],
        check_rsv: bool,
    ) -> Result<Option<(FrameHeader, usize)>, ProtocolError> {
        if src.len() < 2 {
            return Ok(None);
        }
        let first = src[0];
        let fin = first & 0b1000_0000 != 0;
        let rsv1 = first & 0b0100_0000 != 0;
        let rsv2 = first & 0b0010_0000 != 0;
        let rsv3 = first & 0b0001_0000 != 0;
        if check_rsv && (rsv1 || rsv2 || rsv3) {
            return Err(ProtocolError::InvalidLeadingBits(first >> 4));
        }
        let opcode = parse_opcode(first)?;

        let second = src[1];
        let masked = second & 0x80 != 0;
        let len_flag = second & 0x7f;
        let (payload_len, mut idx): (u64, usize) = match len_flag {
            0..=125 => (len_flag as u64, 2),
            126 => {
                if src.len() < 4 {
                    return Ok(None);
                }
                (u16::from_be_bytes([src[2], src[3]]) as u64, 4)
            }
            127 => {
                if src.len() < 10 {
                    return Ok(None);
                }
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&src[2..10]);
                (u64::from_be_bytes(buf), 10)
            }
            _ => unreachable!("7-bit field"),
        };

        let mask = if masked {
            if src.len() < idx + 4 {
                return Ok(None);
            }
            let mut m = [0u8; 4];
            m.copy_from_slice(&src[idx..idx + 4]);
            idx += 4;
            Some(m)
        } else {
            None
        };

        Ok(Some((
            FrameHeader {
                fin,
                rsv1,
                rsv2,
                rsv3,
                opcode,
                mask,
                payload_len,
            },
            idx,
        )))
    }
}
