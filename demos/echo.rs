//! Interactive websocket client: connects, prints inbound text messages, and
//! sends whatever the user types on stdin. Demonstrates `ClientBuilder` and
//! the `Session` send/close API end to end.
use std::io::Write;

use clap::Parser;
use hybi_session::{transport, ClientBuilder, SendOptions};
use tracing::Level;
use tracing_subscriber::util::SubscriberInitExt;

/// websocket client demo with raw frame
#[derive(Parser)]
struct Args {
    uri: String,
    /// sub-protocol to request
    #[clap(short, long)]
    protocol: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), ()> {
    tracing_subscriber::fmt::fmt()
        .with_max_level(Level::DEBUG)
        .finish()
        .try_init()
        .expect("failed to init log");
    let args = Args::parse();

    let uri: http::Uri = args.uri.parse().expect("invalid uri");
    let host = uri.host().expect("uri missing host").to_string();
    let port = uri.port_u16().unwrap_or(80);
    let stream = tokio::net::TcpStream::connect((host, port))
        .await
        .expect("tcp connect failed");
    transport::set_tcp_nodelay(&stream).ok();

    let mut builder = ClientBuilder::new();
    if let Some(protocol) = args.protocol {
        builder = builder.protocol(protocol);
    }

    let (opened_tx, opened_rx) = tokio::sync::oneshot::channel();
    let mut opened_tx = Some(opened_tx);
    let client = builder
        .on_open(move || {
            if let Some(tx) = opened_tx.take() {
                let _ = tx.send(());
            }
        })
        .on_message(|data, flags| {
            if !flags.binary {
                println!("[RECV] > {}", String::from_utf8_lossy(&data));
            }
        })
        .on_error(|err| eprintln!("[ERROR] {}", err.reason))
        .on_close(|code, reason| {
            println!("[CLOSE] {code} {}", String::from_utf8_lossy(&reason));
        })
        .connect(uri, stream);

    if opened_rx.await.is_err() {
        eprintln!("handshake failed");
        return Err(());
    }

    let mut input = String::new();
    loop {
        print!("[SEND] > ");
        std::io::stdout().flush().unwrap();
        input.clear();
        if std::io::stdin().read_line(&mut input).unwrap() == 0 || input == "quit\n" {
            break;
        }
        let line = input.trim_end_matches('\n').to_string();
        if client.send(line, SendOptions::default()).is_err() {
            break;
        }
    }
    let _ = client.close(None, bytes::Bytes::new());
    Ok(())
}
