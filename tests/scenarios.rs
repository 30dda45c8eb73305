//! End-to-end coverage of the handshake, streaming queue gate, ping/pong
//! auto-reply, and protocol-error close paths, run against
//! `tokio::io::duplex` in-memory transports.

mod common;

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use hybi_session::frame::OpCode;
use hybi_session::{ClientBuilder, IterSource, ReadyState, SendOptions, ServerBuilder};

use common::*;

/// A successful client handshake opens the session and fires `open`.
#[tokio::test]
async fn client_handshake_success() {
    let (client_io, mut peer_io) = tokio::io::duplex(4096);
    let uri: http::Uri = "ws://example/ws".parse().unwrap();

    let opened = Arc::new(Mutex::new(false));
    let opened_flag = opened.clone();
    let mut session = ClientBuilder::new()
        .on_open(move || *opened_flag.lock().unwrap() = true)
        .connect(uri, client_io);

    let request = read_handshake_request(&mut peer_io).await;
    let accept = compute_accept(&extract_key(&request));
    write_handshake_response(&mut peer_io, &accept).await;

    assert_eq!(session.ready_state_changed().await, ReadyState::Open);
    assert!(*opened.lock().unwrap());
}

/// A client handshake with a wrong `Sec-WebSocket-Accept` closes instead of
/// opening, and raises `error` with a diagnosable reason.
#[tokio::test]
async fn client_handshake_bad_key() {
    let (client_io, mut peer_io) = tokio::io::duplex(4096);
    let uri: http::Uri = "ws://example/ws".parse().unwrap();

    let opened = Arc::new(Mutex::new(false));
    let opened_flag = opened.clone();
    let error_reason = Arc::new(Mutex::new(None));
    let error_slot = error_reason.clone();
    let mut session = ClientBuilder::new()
        .on_open(move || *opened_flag.lock().unwrap() = true)
        .on_error(move |e| *error_slot.lock().unwrap() = Some(e.reason.clone()))
        .connect(uri, client_io);

    let request = read_handshake_request(&mut peer_io).await;
    let _ = extract_key(&request); // server ignores its own key here, on purpose
    write_handshake_response(&mut peer_io, "xxx").await;

    assert_eq!(session.ready_state_changed().await, ReadyState::Closed);
    assert!(!*opened.lock().unwrap());
    let reason = error_reason.lock().unwrap().clone().expect("error event never fired");
    assert!(reason.contains("invalid server key"), "unexpected reason: {reason}");
}

/// `close()` called while still Connecting short-circuits to Closed without
/// ever opening, and the eventual (irrelevant) handshake
/// response does not reopen anything.
#[tokio::test]
async fn close_from_connecting_short_circuits() {
    let (client_io, mut peer_io) = tokio::io::duplex(4096);
    let uri: http::Uri = "ws://example/ws".parse().unwrap();

    let opened = Arc::new(Mutex::new(false));
    let opened_flag = opened.clone();
    let close_args = Arc::new(Mutex::new(None));
    let close_slot = close_args.clone();
    let mut session = ClientBuilder::new()
        .on_open(move || *opened_flag.lock().unwrap() = true)
        .on_close(move |code, reason| *close_slot.lock().unwrap() = Some((code, reason)))
        .connect(uri, client_io);

    session.close(None, Bytes::new()).unwrap();

    // The peer eventually answers, but the session already decided to close.
    let request = read_handshake_request(&mut peer_io).await;
    let accept = compute_accept(&extract_key(&request));
    let _ = write_handshake_response(&mut peer_io, &accept).await;

    assert_eq!(session.ready_state_changed().await, ReadyState::Closed);
    assert!(!*opened.lock().unwrap());
    let (code, reason) = close_args.lock().unwrap().clone().expect("close event never fired");
    assert_eq!(code, 1000);
    assert!(reason.is_empty());
}

/// A streaming send installs the queue gate; a `send()` issued before the
/// stream completes is deferred and only replayed after the stream's
/// terminal frame.
#[tokio::test]
async fn queue_orders_sends_after_stream_completes() {
    let (app_io, mut peer_io) = tokio::io::duplex(8192);
    let mut session = ServerBuilder::new().accept(app_io, None, bytes::BytesMut::new());
    assert_eq!(session.ready_state_changed().await, ReadyState::Open);

    let chunks = vec![Bytes::from_static(b"hel"), Bytes::from_static(b"lo")];
    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    session
        .stream(IterSource::new(chunks.into_iter()), SendOptions::default(), move |res| {
            let _ = done_tx.send(res);
        })
        .unwrap();
    session.send("X", SendOptions::default()).unwrap();

    let (fin1, _, payload1) = read_raw_frame(&mut peer_io).await;
    assert!(!fin1);
    assert_eq!(&payload1[..], b"hel");

    let (fin2, _, payload2) = read_raw_frame(&mut peer_io).await;
    assert!(fin2);
    assert_eq!(&payload2[..], b"lo");

    let (fin3, _, payload3) = read_raw_frame(&mut peer_io).await;
    assert!(fin3);
    assert_eq!(&payload3[..], b"X");

    done_rx.await.unwrap().unwrap();
}

/// An inbound ping is answered with a pong carrying the same payload before
/// the application's `ping` handler runs.
#[tokio::test]
async fn auto_pong_precedes_ping_event() {
    let (app_io, mut peer_io) = tokio::io::duplex(4096);

    let order = Arc::new(Mutex::new(Vec::new()));
    let order_ping = order.clone();
    let session = ServerBuilder::new()
        .on_ping(move |data, _| order_ping.lock().unwrap().push(("ping", data)))
        .accept(app_io, None, bytes::BytesMut::new());

    let mut ready = session.clone();
    assert_eq!(ready.ready_state_changed().await, ReadyState::Open);

    let payload = Bytes::from_static(&[0xDE, 0xAD]);
    write_raw_frame(&mut peer_io, true, OpCode::Ping, payload.clone()).await;

    let (fin, opcode, pong_payload) = read_raw_frame(&mut peer_io).await;
    assert!(fin);
    assert_eq!(opcode, OpCode::Pong);
    assert_eq!(pong_payload, payload);

    // The pong is observed on the wire strictly before the ping listener has
    // necessarily run (it may not even have been scheduled yet), so poll
    // briefly to let the driver task's `fire_ping` catch up.
    for _ in 0..50 {
        if !order.lock().unwrap().is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }
    let seen = order.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "ping");
    assert_eq!(seen[0].1, payload);
}

/// A Decoder-side protocol violation auto-closes with the carried close
/// code, then surfaces `error` to the application.
#[tokio::test]
async fn protocol_error_triggers_close_then_error() {
    let (app_io, mut peer_io) = tokio::io::duplex(4096);

    let close_args = Arc::new(Mutex::new(None));
    let close_slot = close_args.clone();
    let error_code = Arc::new(Mutex::new(None));
    let error_slot = error_code.clone();
    let session = ServerBuilder::new()
        .on_close(move |code, reason| *close_slot.lock().unwrap() = Some((code, reason)))
        .on_error(move |e| *error_slot.lock().unwrap() = Some(e.close_code))
        .accept(app_io, None, bytes::BytesMut::new());

    let mut ready = session.clone();
    assert_eq!(ready.ready_state_changed().await, ReadyState::Open);

    // A reserved, non-control opcode is a protocol violation (close code 1002).
    write_raw_frame(&mut peer_io, true, OpCode::ReservedNonControl, Bytes::new()).await;

    let (fin, opcode, payload) = read_raw_frame(&mut peer_io).await;
    assert!(fin);
    assert_eq!(opcode, OpCode::Close);
    assert_eq!(u16::from_be_bytes([payload[0], payload[1]]), 1002);

    assert_eq!(ready.ready_state_changed().await, ReadyState::Closing);
    assert_eq!(ready.ready_state_changed().await, ReadyState::Closed);
    let (code, _) = close_args.lock().unwrap().clone().expect("close event never fired");
    assert_eq!(code, 1002);
    assert_eq!(error_code.lock().unwrap().clone().expect("error event never fired"), Some(1002));
}

/// A Session that never opens (closed from Connecting) never reports Open.
#[tokio::test]
async fn ready_state_never_skips_to_open_after_terminate() {
    let (client_io, _peer_io) = tokio::io::duplex(4096);
    let uri: http::Uri = "ws://example/ws".parse().unwrap();
    let mut session = ClientBuilder::new().connect(uri, client_io);
    session.terminate();
    assert_eq!(session.ready_state_changed().await, ReadyState::Closed);
}

/// A Server-role session never masks outbound frames.
#[tokio::test]
async fn server_role_frames_are_unmasked() {
    let (app_io, mut peer_io) = tokio::io::duplex(4096);
    let mut session = ServerBuilder::new().accept(app_io, None, bytes::BytesMut::new());
    assert_eq!(session.ready_state_changed().await, ReadyState::Open);

    session.send("hi", SendOptions::default()).unwrap();
    let mut buf = bytes::BytesMut::new();
    let mut chunk = [0u8; 64];
    use tokio::io::AsyncReadExt;
    let n = peer_io.read(&mut chunk).await.unwrap();
    buf.extend_from_slice(&chunk[..n]);
    // second byte's high bit is the mask flag (RFC 6455 §5.2).
    assert_eq!(buf[1] & 0x80, 0, "server-role frame must not be masked");
}

/// `close` fires at most once even if the peer's close races with a
/// caller-initiated `close()`.
#[tokio::test]
async fn close_event_fires_exactly_once() {
    let (app_io, mut peer_io) = tokio::io::duplex(4096);
    let close_count = Arc::new(Mutex::new(0));
    let close_counter = close_count.clone();
    let mut session = ServerBuilder::new()
        .on_close(move |_, _| *close_counter.lock().unwrap() += 1)
        .accept(app_io, None, bytes::BytesMut::new());
    assert_eq!(session.ready_state_changed().await, ReadyState::Open);

    session.close(Some(1000), Bytes::new()).unwrap();
    assert_eq!(session.ready_state_changed().await, ReadyState::Closing);
    assert_eq!(session.ready_state_changed().await, ReadyState::Closed);

    // Draining whatever the session wrote (its own close frame) keeps the
    // duplex from looking like an unexpected hang if a future change starts
    // buffering more than the pipe's capacity.
    let _ = read_raw_frame(&mut peer_io).await;

    assert_eq!(*close_count.lock().unwrap(), 1);
}
