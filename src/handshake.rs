//! Client-side HTTP/1.1 Upgrade handshake.
//!
//! The server-side adapter's wire handling (101 response, header
//! validation) is out of scope here: the caller supplies an
//! already-validated [`http::Request`] and transport to
//! [`crate::server::accept`]. Only the shared accept-key computation is
//! reused on that side.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::BytesMut;
use sha1::Digest;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::errors::WsError;
use crate::transport::Transport;

const GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Per-request knobs for [`client_handshake`], set by [`crate::client::ClientBuilder`].
#[derive(Debug, Clone, Default)]
pub struct ClientHandshakeOpts {
    pub origin: Option<String>,
    pub sub_protocols: Vec<String>,
    pub version: u8,
    pub extra_headers: Vec<(String, String)>,
}

/// What the handshake hands back to [`crate::session`] once negotiation succeeds.
pub struct HandshakeHead {
    /// Any bytes read past the `\r\n\r\n` terminator, the "upgrade head",
    /// that must be fed to the Decoder before anything else.
    pub upgrade_head: BytesMut,
}

fn check_uri(uri: &http::Uri) -> Result<(), WsError> {
    match uri.scheme_str() {
        Some("ws") | Some("wss") => {}
        Some(other) => return Err(WsError::InvalidUrl(format!("unsupported scheme {other}"))),
        None => return Err(WsError::InvalidUrl("missing scheme".into())),
    }
    if uri.host().is_none() {
        return Err(WsError::InvalidUrl("missing host".into()));
    }
    Ok(())
}

fn gen_key(version: u8) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    base64::encode(format!("{version}-{millis}"))
}

fn compute_accept(key: &str) -> String {
    let mut hasher = sha1::Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(GUID);
    base64::encode(hasher.finalize())
}

fn default_port(uri: &http::Uri) -> u16 {
    match uri.scheme_str() {
        Some("wss") => 443,
        _ => 80,
    }
}

/// Parses the URL, composes the key, issues the Upgrade request, and
/// validates the server's `Sec-WebSocket-Accept`.
pub async fn client_handshake<T: Transport>(
    mut transport: T,
    uri: &http::Uri,
    opts: &ClientHandshakeOpts,
) -> Result<(T, HandshakeHead, Option<String>), WsError> {
    check_uri(uri)?;
    if opts.version != 8 && opts.version != 13 {
        return Err(WsError::UnsupportedVersion(opts.version));
    }

    let key = gen_key(opts.version);
    let expected_accept = compute_accept(&key);

    let request = build_request(uri, opts, &key);
    transport
        .write_all(request.as_bytes())
        .await
        .map_err(WsError::TransportError)?;

    let (status, headers, upgrade_head) = read_response(&mut transport).await?;
    if status != 101 {
        return Err(WsError::HandShakeFailed(format!(
            "expected 101 Switching Protocols, got {status}"
        )));
    }

    tracing::debug!(status, ?headers, "handshake response");

    let accept = headers
        .get("sec-websocket-accept")
        .ok_or_else(|| WsError::InvalidServerKey("missing Sec-WebSocket-Accept".into()))?;
    if accept != &expected_accept {
        return Err(WsError::InvalidServerKey(format!(
            "expected {expected_accept}, got {accept}"
        )));
    }

    let negotiated_protocol = headers.get("sec-websocket-protocol").cloned();

    Ok((transport, HandshakeHead { upgrade_head }, negotiated_protocol))
}

fn build_request(uri: &http::Uri, opts: &ClientHandshakeOpts, key: &str) -> String {
    let host = format!(
        "{}:{}",
        uri.host().unwrap_or_default(),
        uri.port_u16().unwrap_or_else(|| default_port(uri))
    );

    let mut builder = http::Request::builder()
        .uri(uri.clone())
        .header("Host", host)
        .header("Upgrade", "websocket")
        .header("Connection", "Upgrade")
        .header("Sec-WebSocket-Key", key)
        .header("Sec-WebSocket-Version", opts.version.to_string());

    builder = if opts.sub_protocols.is_empty() {
        builder
    } else {
        builder.header("Sec-WebSocket-Protocol", opts.sub_protocols.join(", "))
    };

    builder = if let Some(origin) = &opts.origin {
        if opts.version >= 13 {
            builder.header("Origin", origin)
        } else {
            builder.header("Sec-WebSocket-Origin", origin)
        }
    } else {
        builder
    };

    for (name, value) in &opts.extra_headers {
        builder = builder.header(name, value);
    }

    let req = builder.body(()).unwrap();
    let headers = req
        .headers()
        .iter()
        .map(|(name, value)| format!("{name}: {}", value.to_str().unwrap_or_default()))
        .collect::<Vec<String>>()
        .join("\r\n");
    let path = uri
        .path_and_query()
        .map(|pq| pq.to_string())
        .unwrap_or_else(|| "/".to_string());

    format!("GET {path} HTTP/1.1\r\n{headers}\r\n\r\n")
}

async fn read_response<T: Transport>(
    transport: &mut T,
) -> Result<(u16, std::collections::HashMap<String, String>, BytesMut), WsError> {
    let mut buf = BytesMut::with_capacity(1024);
    let mut byte = [0u8; 1];
    loop {
        let n = transport
            .read(&mut byte)
            .await
            .map_err(WsError::TransportError)?;
        if n == 0 {
            return Err(WsError::HandShakeFailed("transport closed during handshake".into()));
        }
        buf.extend_from_slice(&byte);
        if buf.len() >= 4 && buf[buf.len() - 4..] == *b"\r\n\r\n" {
            break;
        }
        if buf.len() > 64 * 1024 {
            return Err(WsError::HandShakeFailed("response headers too large".into()));
        }
    }

    let mut header_storage = [httparse::EMPTY_HEADER; 64];
    let mut response = httparse::Response::new(&mut header_storage);
    response
        .parse(&buf)
        .map_err(|e| WsError::HandShakeFailed(format!("invalid HTTP response: {e}")))?;

    let status = response
        .code
        .ok_or_else(|| WsError::HandShakeFailed("missing status code".into()))?;

    let mut headers = std::collections::HashMap::new();
    for header in response.headers.iter() {
        headers.insert(
            header.name.to_ascii_lowercase(),
            String::from_utf8_lossy(header.value).to_string(),
        );
    }

    // `buf` ends exactly at the header terminator by construction above, so
    // there is never leftover here; kept as an (empty) BytesMut for symmetry
    // with the server-supplied upgrade head.
    Ok((status, headers, BytesMut::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_key_matches_rfc6455_example() {
        // RFC 6455 §1.3 worked example.
        let accept = compute_accept("dGhlIHNhbXBsZSBub25jZQ==");
        assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn rejects_non_ws_scheme() {
        let uri: http::Uri = "http://example.com/ws".parse().unwrap();
        assert!(matches!(check_uri(&uri), Err(WsError::InvalidUrl(_))));
    }

    #[test]
    fn rejects_missing_host() {
        let uri = http::Uri::builder()
            .scheme("ws")
            .path_and_query("/path")
            .build()
            .unwrap();
        assert!(matches!(check_uri(&uri), Err(WsError::InvalidUrl(_))));
    }
}
