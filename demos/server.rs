//! Minimal echo server: accepts a TCP connection, performs the HTTP Upgrade
//! exchange itself (this crate's server adapter takes an already-upgraded
//! transport), then hands the socket to `ServerBuilder::accept` and echoes
//! every text/binary message back.
use clap::Parser;
use hybi_session::{transport, ServerBuilder};
use sha1::Digest;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::Level;
use tracing_subscriber::util::SubscriberInitExt;

const GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

#[derive(Parser)]
struct Args {
    /// server host
    #[clap(long, default_value = "127.0.0.1")]
    host: String,
    /// server port
    #[clap(short, long, default_value = "9000")]
    port: u16,
}

/// Reads the client's HTTP Upgrade request off `stream`, writes the 101
/// response, and returns whatever bytes were read past the header
/// terminator (the "upgrade head") for the Decoder to consume.
async fn upgrade(stream: &mut tokio::net::TcpStream) -> std::io::Result<bytes::BytesMut> {
    let mut buf = bytes::BytesMut::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    let head_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "client closed before upgrade completed",
            ));
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
    };

    let mut header_storage = [httparse::EMPTY_HEADER; 64];
    let mut request = httparse::Request::new(&mut header_storage);
    request
        .parse(&buf[..head_end])
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

    let key = request
        .headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("sec-websocket-key"))
        .map(|h| String::from_utf8_lossy(h.value).to_string())
        .ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, "missing Sec-WebSocket-Key")
        })?;

    let mut hasher = sha1::Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(GUID);
    let accept = base64::encode(hasher.finalize());

    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\r\n"
    );
    stream.write_all(response.as_bytes()).await?;

    Ok(bytes::BytesMut::from(&buf[head_end..]))
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

#[tokio::main]
async fn main() -> Result<(), ()> {
    tracing_subscriber::fmt::fmt()
        .with_max_level(Level::DEBUG)
        .finish()
        .try_init()
        .expect("failed to init log");
    let args = Args::parse();
    tracing::info!("binding on {}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind((args.host.as_str(), args.port))
        .await
        .unwrap();
    loop {
        let (mut stream, addr) = listener.accept().await.unwrap();
        tokio::spawn(async move {
            tracing::info!("got connect from {:?}", addr);
            transport::set_tcp_nodelay(&stream).ok();
            let upgrade_head = match upgrade(&mut stream).await {
                Ok(head) => head,
                Err(e) => {
                    tracing::warn!("upgrade failed: {e}");
                    return;
                }
            };

            // `Session` doesn't exist until `accept()` returns, so the
            // `on_message` listener can't close over it directly: forward
            // inbound messages over a channel and echo them from outside.
            let (inbound_tx, mut inbound_rx) = tokio::sync::mpsc::unbounded_channel();
            let (closed_tx, mut closed_rx) = tokio::sync::oneshot::channel();
            let mut closed_tx = Some(closed_tx);
            let session = ServerBuilder::new()
                .on_message(move |data, flags| {
                    let _ = inbound_tx.send((data, flags.binary));
                })
                .on_close(move |code, reason| {
                    tracing::info!(code, reason = %String::from_utf8_lossy(&reason), "peer closed");
                    if let Some(tx) = closed_tx.take() {
                        let _ = tx.send(());
                    }
                })
                .accept(stream, None, upgrade_head);

            loop {
                tokio::select! {
                    _ = &mut closed_rx => break,
                    msg = inbound_rx.recv() => match msg {
                        Some((data, binary)) => {
                            let opts = hybi_session::SendOptions { binary };
                            if session.send(data, opts).is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
            tracing::info!("one conn down");
        });
    }
}
