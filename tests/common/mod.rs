//! Shared test helpers: a raw HTTP-upgrade stub server (for client
//! handshake scenarios) and a raw frame reader/writer (for frame-level
//! ordering scenarios), built on `tokio::io::duplex` in-memory transports.

use bytes::{Bytes, BytesMut};
use hybi_session::codec::{FrameEncoder, OutgoingFrame};
use hybi_session::frame::{FrameHeader, OpCode};
use sha1::Digest;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio_util::codec::Encoder;

const GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

pub fn compute_accept(key: &str) -> String {
    let mut hasher = sha1::Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(GUID);
    base64::encode(hasher.finalize())
}

/// Reads bytes off `stream` until the `\r\n\r\n` header terminator and
/// returns the request as a `String`, mirroring what a real HTTP server
/// does before handing the socket off to a WebSocket library.
pub async fn read_handshake_request(stream: &mut DuplexStream) -> String {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        stream.read_exact(&mut byte).await.expect("stream closed mid-handshake");
        buf.push(byte[0]);
        if buf.len() >= 4 && buf[buf.len() - 4..] == *b"\r\n\r\n" {
            break;
        }
    }
    String::from_utf8(buf).expect("handshake request was not utf-8")
}

pub fn extract_key(request: &str) -> String {
    request
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case("sec-websocket-key")
                .then(|| value.trim().to_string())
        })
        .expect("request had no Sec-WebSocket-Key header")
}

/// Writes a `101 Switching Protocols` response with the given
/// `Sec-WebSocket-Accept` value (deliberately wrong, in scenario 2).
pub async fn write_handshake_response(stream: &mut DuplexStream, accept: &str) {
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\r\n"
    );
    stream.write_all(response.as_bytes()).await.unwrap();
}

/// Reads exactly one raw frame off `stream`: `(fin, opcode, payload)`. Used
/// by the frame-ordering scenarios, which care about frame boundaries the
/// higher-level `FrameDecoder` (which reassembles fragments into one
/// logical message) deliberately hides.
pub async fn read_raw_frame(stream: &mut DuplexStream) -> (bool, OpCode, Bytes) {
    let mut buf = BytesMut::new();
    loop {
        if let Ok(Some((header, header_len))) = FrameHeader::parse(&buf, true) {
            let total = header_len + header.payload_len as usize;
            if buf.len() >= total {
                let mut frame = buf.split_to(total);
                let payload = frame.split_off(header_len).freeze();
                return (header.fin, header.opcode, payload);
            }
        }
        let mut chunk = [0u8; 4096];
        let n = stream.read(&mut chunk).await.expect("stream closed mid-frame");
        assert!(n > 0, "stream ended before a full frame arrived");
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Encodes and writes a single frame to `stream`, as a test peer injecting
/// a Decoder-visible event (ping, protocol violation, ...) into a session.
pub async fn write_raw_frame(stream: &mut DuplexStream, fin: bool, opcode: OpCode, payload: Bytes) {
    let mut buf = BytesMut::new();
    FrameEncoder
        .encode(OutgoingFrame::data(fin, opcode, None, payload), &mut buf)
        .unwrap();
    stream.write_all(&buf).await.unwrap();
}
