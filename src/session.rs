//! ready-state machine, queue gate, and the send/receive driver loop.
//!
//! A [`Session`] is a cheap, cloneable handle to a single background
//! driver task (spawned by [`crate::client`]/[`crate::server`]) that owns
//! the ready-state, the [`tokio_util::codec::Framed`] transport, and the
//! [`crate::events::Listeners`]. All state mutation and event dispatch
//! happen on that task, so the handle itself needs no locks.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, watch};
use tokio_util::codec::Framed;

use crate::codec::{DecodedEvent, FrameConfig, OutgoingFrame, SessionCodec};
use crate::errors::WsError;
use crate::events::{ErrorEvent, Flags, Listeners};
use crate::frame::OpCode;
use crate::handshake::{client_handshake, ClientHandshakeOpts};
use crate::transport::Transport;

/// Which side of the connection this Session plays. Immutable after
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// The four-state connection lifecycle. `Closed` is terminal; there is no
/// re-open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

/// Options accepted by [`Session::send`]/[`Session::stream`].
///
/// Masking is role-determined with no per-call override (a client always
/// masks, a server never does), so there is deliberately no `mask` field
/// here; see DESIGN.md for the reasoning.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendOptions {
    pub binary: bool,
}

/// Delivered exactly once to a send-shaped operation's callback, or (absent
/// a callback) raised through the `error` event.
pub type Callback = Box<dyn FnOnce(Option<WsError>) + Send>;
/// Delivered exactly once at the end of a [`Session::stream`] call.
pub type StreamCallback = Box<dyn FnOnce(Result<(), WsError>) + Send>;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// a byte-producing source for [`Session::stream`], file-like or
/// user-driven. `Ok(None)` signals end-of-source.
pub trait ChunkSource: Send {
    fn next_chunk(&mut self) -> BoxFuture<'_, std::io::Result<Option<Bytes>>>;
}

/// Adapts a plain iterator of chunks into a [`ChunkSource`], for tests and
/// for callers who already have all chunks in memory.
pub struct IterSource<I> {
    iter: I,
}

impl<I> IterSource<I> {
    pub fn new(iter: I) -> Self {
        Self { iter }
    }
}

impl<I> ChunkSource for IterSource<I>
where
    I: Iterator<Item = Bytes> + Send,
{
    fn next_chunk(&mut self) -> BoxFuture<'_, std::io::Result<Option<Bytes>>> {
        let item = self.iter.next();
        Box::pin(async move { Ok(item) })
    }
}

/// `Idle` means sends execute immediately. `Streaming` holds the FIFO of
/// commands that arrived while a multi-frame send was in flight; replayed
/// once the stream's terminal frame is written.
enum SendMode {
    Idle,
    Streaming { deferred: VecDeque<Command> },
}

enum Command {
    Send {
        data: Bytes,
        binary: bool,
        cb: Option<Callback>,
    },
    Stream {
        source: Box<dyn ChunkSource>,
        binary: bool,
        cb: StreamCallback,
    },
    Ping {
        data: Bytes,
        cb: Option<Callback>,
    },
    Pong {
        data: Bytes,
        cb: Option<Callback>,
    },
    Close {
        code: Option<u16>,
        reason: Bytes,
    },
    Terminate,
}

struct SessionState {
    role: Role,
    ready_state: ReadyState,
    sub_protocol: Option<String>,
    close_code: Option<u16>,
    close_reason: Option<Bytes>,
    send_mode: SendMode,
    listeners: Listeners,
}

/// A handle to a running Session. Cloning is cheap (an `mpsc::UnboundedSender`
/// plus a `watch::Receiver`); every clone talks to the same driver task.
#[derive(Clone)]
pub struct Session {
    tx: mpsc::UnboundedSender<Command>,
    ready_rx: watch::Receiver<ReadyState>,
    role: Role,
}

/// What must happen before the Session can transition Connecting to Open:
/// the client's HTTP Upgrade exchange, or (server-side) a one-tick
/// deferral so `on_open` listeners registered right after `accept()`
/// returns are in place first.
pub(crate) enum Opening<T: Transport> {
    ClientHandshake {
        transport: T,
        uri: http::Uri,
        opts: ClientHandshakeOpts,
    },
    ServerReady {
        transport: T,
        upgrade_head: bytes::BytesMut,
        sub_protocol: Option<String>,
    },
}

async fn resolve_opening<T: Transport>(
    opening: Opening<T>,
) -> Result<(T, bytes::BytesMut, Option<String>), WsError> {
    match opening {
        Opening::ClientHandshake { transport, uri, opts } => {
            let (transport, head, sub_protocol) =
                client_handshake(transport, &uri, &opts).await?;
            Ok((transport, head.upgrade_head, sub_protocol))
        }
        Opening::ServerReady {
            transport,
            upgrade_head,
            sub_protocol,
        } => {
            // defer open one tick; listeners are already registered by now
            // (builder registers before spawning), this just orders it.
            tokio::task::yield_now().await;
            Ok((transport, upgrade_head, sub_protocol))
        }
    }
}

pub(crate) fn spawn_session<T: Transport>(
    role: Role,
    sub_protocol: Option<String>,
    listeners: Listeners,
    config: FrameConfig,
    opening: Opening<T>,
) -> Session {
    let (tx, rx) = mpsc::unbounded_channel();
    let (ready_tx, ready_rx) = watch::channel(ReadyState::Connecting);

    let state = SessionState {
        role,
        ready_state: ReadyState::Connecting,
        sub_protocol,
        close_code: None,
        close_reason: None,
        send_mode: SendMode::Idle,
        listeners,
    };

    tokio::spawn(run(state, rx, ready_tx, opening, config));

    Session { tx, ready_rx, role }
}

async fn run<T: Transport>(
    mut state: SessionState,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    ready_tx: watch::Sender<ReadyState>,
    opening: Opening<T>,
    config: FrameConfig,
) {
    let mut opening_fut = Box::pin(resolve_opening(opening));

    // close()/terminate() before the handshake (or the server's
    // deferred-open tick) resolves short-circuits straight to Closed.
    let established = loop {
        tokio::select! {
            result = &mut opening_fut => break Some(result),
            cmd = cmd_rx.recv() => match cmd {
                None | Some(Command::Terminate) => break None,
                Some(Command::Close { code, reason }) => {
                    state.close_code = Some(code.unwrap_or(1000));
                    state.close_reason = Some(reason);
                    break None;
                }
                Some(other) => {
                    fail_not_opened(other);
                }
            },
        }
    };

    match established {
        None => {
            finalize_closed(&mut state, &ready_tx);
            let code = state.close_code.unwrap_or(1000);
            let reason = state.close_reason.clone().unwrap_or_default();
            state.listeners.fire_close(code, reason);
        }
        Some(Err(err)) => {
            tracing::warn!(role = ?state.role, error = %err, "handshake failed");
            raise_error(&mut state, err);
            finalize_closed(&mut state, &ready_tx);
            state.listeners.fire_close(1000, Bytes::new());
        }
        Some(Ok((transport, upgrade_head, negotiated_protocol))) => {
            if negotiated_protocol.is_some() {
                state.sub_protocol = negotiated_protocol;
            }
            let mut framed = Framed::new(transport, SessionCodec::new(config));
            if !upgrade_head.is_empty() {
                framed.read_buffer_mut().extend_from_slice(&upgrade_head);
            }

            state.ready_state = ReadyState::Open;
            let _ = ready_tx.send(ReadyState::Open);
            tracing::debug!(role = ?state.role, sub_protocol = ?state.sub_protocol, "session open");
            state.listeners.fire_open();

            drive(&mut framed, &mut state, &mut cmd_rx, &ready_tx).await;
        }
    }
}

fn fail_not_opened(cmd: Command) {
    match cmd {
        Command::Send { cb: Some(cb), .. }
        | Command::Ping { cb: Some(cb), .. }
        | Command::Pong { cb: Some(cb), .. } => cb(Some(WsError::NotOpened)),
        Command::Stream { cb, .. } => cb(Err(WsError::NotOpened)),
        _ => {}
    }
}

async fn drive<T: Transport>(
    framed: &mut Framed<T, SessionCodec>,
    state: &mut SessionState,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    ready_tx: &watch::Sender<ReadyState>,
) {
    loop {
        if state.ready_state == ReadyState::Closed {
            break;
        }
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                None => {
                    do_terminate(framed, state, ready_tx).await;
                    break;
                }
                Some(cmd) => dispatch(framed, state, cmd_rx, ready_tx, cmd).await,
            },
            event = framed.next() => match event {
                Some(Ok(decoded)) => handle_decoded(framed, state, ready_tx, decoded).await,
                Some(Err(e)) => {
                    raise_error(state, WsError::TransportError(e));
                    do_terminate(framed, state, ready_tx).await;
                }
                None => on_transport_eof(state, ready_tx),
            },
        }
    }
}

async fn dispatch<T: Transport>(
    framed: &mut Framed<T, SessionCodec>,
    state: &mut SessionState,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    ready_tx: &watch::Sender<ReadyState>,
    cmd: Command,
) {
    match cmd {
        Command::Terminate => do_terminate(framed, state, ready_tx).await,
        Command::Close { code, reason } => do_close(framed, state, ready_tx, code, reason).await,
        other => {
            if matches!(state.send_mode, SendMode::Streaming { .. }) {
                enqueue(state, other);
            } else {
                execute(framed, state, cmd_rx, ready_tx, other).await;
            }
        }
    }
}

async fn execute<T: Transport>(
    framed: &mut Framed<T, SessionCodec>,
    state: &mut SessionState,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    ready_tx: &watch::Sender<ReadyState>,
    cmd: Command,
) {
    match cmd {
        Command::Send { data, binary, cb } => do_send(framed, state, data, binary, cb).await,
        Command::Ping { data, cb } => do_ping(framed, state, data, cb).await,
        Command::Pong { data, cb } => do_pong(framed, state, data, cb).await,
        Command::Stream { source, binary, cb } => {
            do_stream(framed, state, cmd_rx, ready_tx, source, binary, cb).await
        }
        Command::Close { .. } | Command::Terminate => {
            unreachable!("Close/Terminate are handled in dispatch(), never queued")
        }
    }
}

fn enqueue(state: &mut SessionState, cmd: Command) {
    if let SendMode::Streaming { deferred } = &mut state.send_mode {
        deferred.push_back(cmd);
    }
}

fn mask_for(role: Role) -> Option<[u8; 4]> {
    match role {
        Role::Client => Some(rand::random()),
        Role::Server => None,
    }
}

async fn write_frame<T: Transport>(
    framed: &mut Framed<T, SessionCodec>,
    frame: OutgoingFrame,
) -> std::io::Result<()> {
    framed.send(frame).await
}

async fn do_send<T: Transport>(
    framed: &mut Framed<T, SessionCodec>,
    state: &mut SessionState,
    data: Bytes,
    binary: bool,
    cb: Option<Callback>,
) {
    if state.ready_state != ReadyState::Open {
        deliver_or_raise(state, cb, WsError::NotOpened);
        return;
    }
    let opcode = if binary { OpCode::Binary } else { OpCode::Text };
    let mask = mask_for(state.role);
    match write_frame(framed, OutgoingFrame::data(true, opcode, mask, data)).await {
        Ok(()) => {
            if let Some(cb) = cb {
                cb(None);
            }
        }
        Err(e) => deliver_or_raise(state, cb, WsError::TransportError(e)),
    }
}

async fn do_ping<T: Transport>(
    framed: &mut Framed<T, SessionCodec>,
    state: &mut SessionState,
    data: Bytes,
    cb: Option<Callback>,
) {
    send_control(framed, state, OpCode::Ping, data, cb).await;
}

async fn do_pong<T: Transport>(
    framed: &mut Framed<T, SessionCodec>,
    state: &mut SessionState,
    data: Bytes,
    cb: Option<Callback>,
) {
    send_control(framed, state, OpCode::Pong, data, cb).await;
}

async fn send_control<T: Transport>(
    framed: &mut Framed<T, SessionCodec>,
    state: &mut SessionState,
    opcode: OpCode,
    data: Bytes,
    cb: Option<Callback>,
) {
    if state.ready_state != ReadyState::Open {
        deliver_or_raise(state, cb, WsError::NotOpened);
        return;
    }
    if data.len() > 125 {
        deliver_or_raise(
            state,
            cb,
            WsError::EncoderError(format!("control frame payload of {} bytes exceeds 125", data.len())),
        );
        return;
    }
    let mask = mask_for(state.role);
    let frame = OutgoingFrame::data(true, opcode, mask, data);
    match write_frame(framed, frame).await {
        Ok(()) => {
            if let Some(cb) = cb {
                cb(None);
            }
        }
        Err(e) => deliver_or_raise(state, cb, WsError::TransportError(e)),
    }
}

/// writes a pong immediately, or enqueues it behind the streaming queue gate
/// so it doesn't land between two outbound fragments.
async fn reply_pong<T: Transport>(
    framed: &mut Framed<T, SessionCodec>,
    state: &mut SessionState,
    data: Bytes,
) {
    if matches!(state.send_mode, SendMode::Streaming { .. }) {
        enqueue(state, Command::Pong { data, cb: None });
        return;
    }
    let mask = mask_for(state.role);
    let _ = write_frame(framed, OutgoingFrame::pong(mask, data)).await;
}

fn deliver_or_raise(state: &mut SessionState, cb: Option<Callback>, err: WsError) {
    match cb {
        Some(cb) => cb(Some(err)),
        None => raise_error(state, err),
    }
}

async fn do_stream<T: Transport>(
    framed: &mut Framed<T, SessionCodec>,
    state: &mut SessionState,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    ready_tx: &watch::Sender<ReadyState>,
    mut source: Box<dyn ChunkSource>,
    binary: bool,
    cb: StreamCallback,
) {
    state.send_mode = SendMode::Streaming {
        deferred: VecDeque::new(),
    };
    let initial_opcode = if binary { OpCode::Binary } else { OpCode::Text };
    let mut first = true;
    // one chunk of lookahead, so the last chunk can carry fin=true itself
    // instead of a trailing empty terminal frame.
    let mut held: Option<Bytes> = None;

    let outcome: Result<(), WsError> = loop {
        if state.ready_state != ReadyState::Open {
            break Err(WsError::NotOpened);
        }
        let mut stop = None;
        tokio::select! {
            biased;
            cmd = cmd_rx.recv() => match cmd {
                None => stop = Some(Err(WsError::NotOpened)),
                Some(Command::Terminate) => {
                    do_terminate(framed, state, ready_tx).await;
                    stop = Some(Err(WsError::NotOpened));
                }
                Some(Command::Close { code, reason }) => {
                    do_close(framed, state, ready_tx, code, reason).await;
                    stop = Some(Err(WsError::NotOpened));
                }
                Some(other) => enqueue(state, other),
            },
            event = framed.next() => match event {
                Some(Ok(decoded)) => handle_decoded(framed, state, ready_tx, decoded).await,
                Some(Err(e)) => {
                    raise_error(state, WsError::TransportError(e));
                    do_terminate(framed, state, ready_tx).await;
                    stop = Some(Err(WsError::NotOpened));
                }
                None => {
                    on_transport_eof(state, ready_tx);
                    stop = Some(Err(WsError::NotOpened));
                }
            },
            chunk = source.next_chunk() => match chunk {
                Ok(Some(data)) => {
                    if let Some(prev) = held.take() {
                        let opcode = if first { initial_opcode } else { OpCode::Continue };
                        first = false;
                        let mask = mask_for(state.role);
                        if let Err(e) = write_frame(framed, OutgoingFrame::data(false, opcode, mask, prev)).await {
                            stop = Some(Err(WsError::TransportError(e)));
                        } else {
                            tokio::task::yield_now().await;
                        }
                    }
                    held = Some(data);
                }
                Ok(None) => {
                    let opcode = if first { initial_opcode } else { OpCode::Continue };
                    let mask = mask_for(state.role);
                    let payload = held.take().unwrap_or_default();
                    match write_frame(framed, OutgoingFrame::data(true, opcode, mask, payload)).await {
                        Ok(()) => stop = Some(Ok(())),
                        Err(e) => stop = Some(Err(WsError::TransportError(e))),
                    }
                }
                Err(e) => stop = Some(Err(WsError::TransportError(e))),
            },
        }
        if let Some(result) = stop {
            break result;
        }
    };

    match outcome {
        Ok(()) => {
            cb(Ok(()));
            // release the queue on the next tick.
            tokio::task::yield_now().await;
            let deferred = take_deferred(state);
            tracing::trace!(deferred = deferred.len(), "releasing queue gate");
            replay_deferred(framed, state, cmd_rx, ready_tx, deferred).await;
        }
        Err(e) => {
            cb(Err(e));
            // The session is terminal for this stream; drop whatever queued
            // up without invoking callbacks (mirrors `terminate()`'s rule).
            state.send_mode = SendMode::Idle;
        }
    }
}

fn take_deferred(state: &mut SessionState) -> VecDeque<Command> {
    match std::mem::replace(&mut state.send_mode, SendMode::Idle) {
        SendMode::Streaming { deferred } => deferred,
        SendMode::Idle => VecDeque::new(),
    }
}

async fn replay_deferred<T: Transport>(
    framed: &mut Framed<T, SessionCodec>,
    state: &mut SessionState,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    ready_tx: &watch::Sender<ReadyState>,
    mut deferred: VecDeque<Command>,
) {
    while let Some(cmd) = deferred.pop_front() {
        if state.ready_state != ReadyState::Open {
            break;
        }
        execute(framed, state, cmd_rx, ready_tx, cmd).await;
        // a replayed action can itself be a stream() that reinstalls
        // SendMode::Streaming; hand the rest of this queue to the new one.
        if let SendMode::Streaming { deferred: new_deferred } = &mut state.send_mode {
            new_deferred.extend(deferred.drain(..));
            break;
        }
    }
}

async fn handle_decoded<T: Transport>(
    framed: &mut Framed<T, SessionCodec>,
    state: &mut SessionState,
    ready_tx: &watch::Sender<ReadyState>,
    event: DecodedEvent,
) {
    match event {
        DecodedEvent::Text(data) => state.listeners.fire_message(data, Flags { binary: false }),
        DecodedEvent::Binary(data) => state.listeners.fire_message(data, Flags { binary: true }),
        DecodedEvent::Ping(data) => {
            // auto-reply pong goes out (or onto the queue) before the ping
            // event reaches the application.
            reply_pong(framed, state, data.clone()).await;
            state.listeners.fire_ping(data, Flags { binary: true });
        }
        DecodedEvent::Pong(data) => state.listeners.fire_pong(data, Flags { binary: true }),
        DecodedEvent::Close { code, reason } => {
            do_close(framed, state, ready_tx, code, reason).await;
        }
        DecodedEvent::Error { reason, close_code } => {
            tracing::warn!(%reason, ?close_code, "decoder protocol error");
            if let Some(code) = close_code {
                do_close(framed, state, ready_tx, Some(code), Bytes::new()).await;
            }
            raise_error(state, WsError::ProtocolError { reason, close_code });
        }
    }
}

async fn do_close<T: Transport>(
    framed: &mut Framed<T, SessionCodec>,
    state: &mut SessionState,
    ready_tx: &watch::Sender<ReadyState>,
    code: Option<u16>,
    reason: Bytes,
) {
    match state.ready_state {
        ReadyState::Closing | ReadyState::Closed => {}
        ReadyState::Connecting => {
            state.close_code = Some(code.unwrap_or(1000));
            state.close_reason = Some(reason.clone());
            finalize_closed(state, ready_tx);
            state.listeners.fire_close(state.close_code.unwrap(), reason);
        }
        ReadyState::Open => {
            state.ready_state = ReadyState::Closing;
            let _ = ready_tx.send(ReadyState::Closing);
            tracing::debug!(?code, "closing session");
            let final_code = code.unwrap_or(1000);
            state.close_code = Some(final_code);
            state.close_reason = Some(reason.clone());
            let mask = mask_for(state.role);
            let _ = write_frame(framed, OutgoingFrame::close(mask, Some(final_code), &reason)).await;
            do_terminate(framed, state, ready_tx).await;
        }
    }
}

async fn do_terminate<T: Transport>(
    framed: &mut Framed<T, SessionCodec>,
    state: &mut SessionState,
    ready_tx: &watch::Sender<ReadyState>,
) {
    if state.ready_state == ReadyState::Closed {
        return;
    }
    let code = state.close_code.unwrap_or(1000);
    let reason = state.close_reason.clone().unwrap_or_default();
    finalize_closed(state, ready_tx);
    state.send_mode = SendMode::Idle;
    let _ = framed.get_mut().shutdown().await;
    state.listeners.fire_close(code, reason);
}

fn on_transport_eof(state: &mut SessionState, ready_tx: &watch::Sender<ReadyState>) {
    if state.ready_state == ReadyState::Closed {
        return;
    }
    let code = state.close_code.unwrap_or(1000);
    let reason = state.close_reason.clone().unwrap_or_default();
    finalize_closed(state, ready_tx);
    state.send_mode = SendMode::Idle;
    state.listeners.fire_close(code, reason);
}

fn finalize_closed(state: &mut SessionState, ready_tx: &watch::Sender<ReadyState>) {
    state.ready_state = ReadyState::Closed;
    let _ = ready_tx.send(ReadyState::Closed);
}

/// Fires `error` and discards any in-flight queue without replay.
fn raise_error(state: &mut SessionState, err: WsError) {
    let event = ErrorEvent::from(&err);
    state.listeners.fire_error(event);
    state.send_mode = SendMode::Idle;
}

impl Session {
    pub fn ready_state(&self) -> ReadyState {
        *self.ready_rx.borrow()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Waits until `ready_state()` next changes. Used by tests to
    /// deterministically observe the deferred `open`/`close` transitions
    /// instead of polling.
    pub async fn ready_state_changed(&mut self) -> ReadyState {
        let _ = self.ready_rx.changed().await;
        *self.ready_rx.borrow()
    }

    /// sends one data frame with `fin=true`. fragmenting belongs to [`Session::stream`].
    pub fn send(&self, data: impl Into<Bytes>, opts: SendOptions) -> Result<(), WsError> {
        self.send_inner(data.into(), opts, None)
    }

    pub fn send_with(
        &self,
        data: impl Into<Bytes>,
        opts: SendOptions,
        cb: impl FnOnce(Option<WsError>) + Send + 'static,
    ) {
        let _ = self.send_inner(data.into(), opts, Some(Box::new(cb)));
    }

    fn send_inner(&self, data: Bytes, opts: SendOptions, cb: Option<Callback>) -> Result<(), WsError> {
        if self.ready_state() != ReadyState::Open {
            return self.fail_sync(WsError::NotOpened, cb);
        }
        let _ = self.tx.send(Command::Send {
            data,
            binary: opts.binary,
            cb,
        });
        Ok(())
    }

    /// streams a chunked send. `cb` is required at the type level, so a
    /// missing callback is a compile error rather than `NoCallback` at runtime.
    pub fn stream(
        &self,
        source: impl ChunkSource + 'static,
        opts: SendOptions,
        cb: impl FnOnce(Result<(), WsError>) + Send + 'static,
    ) -> Result<(), WsError> {
        if self.ready_state() != ReadyState::Open {
            cb(Err(WsError::NotOpened));
            return Ok(());
        }
        let _ = self.tx.send(Command::Stream {
            source: Box::new(source),
            binary: opts.binary,
            cb: Box::new(cb),
        });
        Ok(())
    }

    pub fn ping(&self, data: impl Into<Bytes>) -> Result<(), WsError> {
        self.ping_inner(data.into(), None)
    }

    pub fn ping_with(&self, data: impl Into<Bytes>, cb: impl FnOnce(Option<WsError>) + Send + 'static) {
        let _ = self.ping_inner(data.into(), Some(Box::new(cb)));
    }

    fn ping_inner(&self, data: Bytes, cb: Option<Callback>) -> Result<(), WsError> {
        if self.ready_state() != ReadyState::Open {
            return self.fail_sync(WsError::NotOpened, cb);
        }
        let _ = self.tx.send(Command::Ping { data, cb });
        Ok(())
    }

    pub fn pong(&self, data: impl Into<Bytes>) -> Result<(), WsError> {
        self.pong_inner(data.into(), None)
    }

    pub fn pong_with(&self, data: impl Into<Bytes>, cb: impl FnOnce(Option<WsError>) + Send + 'static) {
        let _ = self.pong_inner(data.into(), Some(Box::new(cb)));
    }

    fn pong_inner(&self, data: Bytes, cb: Option<Callback>) -> Result<(), WsError> {
        if self.ready_state() != ReadyState::Open {
            return self.fail_sync(WsError::NotOpened, cb);
        }
        let _ = self.tx.send(Command::Pong { data, cb });
        Ok(())
    }

    /// `NotOpened` only when already Closed; Closing is a no-op; Connecting
    /// short-circuits to Closed; Open runs the full close protocol.
    pub fn close(&self, code: Option<u16>, reason: impl Into<Bytes>) -> Result<(), WsError> {
        if self.ready_state() == ReadyState::Closed {
            return Err(WsError::NotOpened);
        }
        let _ = self.tx.send(Command::Close {
            code,
            reason: reason.into(),
        });
        Ok(())
    }

    /// The unconditional cancel primitive: severs the transport, transitions
    /// to Closed, drops any queued sends without invoking their callbacks.
    pub fn terminate(&self) {
        let _ = self.tx.send(Command::Terminate);
    }

    fn fail_sync(&self, err: WsError, cb: Option<Callback>) -> Result<(), WsError> {
        match cb {
            Some(cb) => {
                cb(Some(err));
                Ok(())
            }
            None => Err(err),
        }
    }
}
