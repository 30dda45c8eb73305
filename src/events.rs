//! The Event Sink: the observer interface applications attach listeners to.
//! Dispatched exclusively from inside the Session's driver task
//! (`src/session.rs`), so no synchronization is needed here.

use bytes::Bytes;

use crate::errors::WsError;

/// Flags carried alongside a data or control-frame event.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flags {
    /// `true` iff the message/frame arrived with the Binary opcode.
    pub binary: bool,
}

/// The `{ data }` shape a browser `WebSocket.onmessage` handler sees,
/// produced by [`Listeners::set_onmessage`]'s adapter.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub data: Bytes,
}

/// Reported on every `error` firing; `close_code` is set when the error
/// originated from a Decoder protocol violation that carries one.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub reason: String,
    pub close_code: Option<u16>,
}

impl From<&WsError> for ErrorEvent {
    fn from(err: &WsError) -> Self {
        let close_code = match err {
            WsError::ProtocolError { close_code, .. } => *close_code,
            _ => None,
        };
        Self {
            reason: err.to_string(),
            close_code,
        }
    }
}

type MessageListener = Box<dyn FnMut(Bytes, Flags) + Send>;
type ControlListener = Box<dyn FnMut(Bytes, Flags) + Send>;
type ErrorListener = Box<dyn FnMut(ErrorEvent) + Send>;
type CloseListener = Box<dyn FnMut(u16, Bytes) + Send>;
type OpenListener = Box<dyn FnMut() + Send>;

/// id handed back by every `on_*` registration. Used by the `onmessage`
/// adapter for read-back, since closures have no identity of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// The full `{open, message, ping, pong, error, close}` channel set.
///
/// `open` and `close` each fire at most once; the rest may fire any number
/// of times. Dispatch is synchronous from the driver loop, so a listener
/// that blocks stalls that session only.
#[derive(Default)]
pub struct Listeners {
    next_id: u64,
    open: Vec<OpenListener>,
    message: Vec<MessageListener>,
    onmessage_slot: Option<(ListenerId, MessageListener)>,
    ping: Vec<ControlListener>,
    pong: Vec<ControlListener>,
    error: Vec<ErrorListener>,
    close: Vec<CloseListener>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc_id(&mut self) -> ListenerId {
        self.next_id += 1;
        ListenerId(self.next_id)
    }

    pub fn on_open(&mut self, listener: impl FnMut() + Send + 'static) -> ListenerId {
        let id = self.alloc_id();
        self.open.push(Box::new(listener));
        id
    }

    pub fn on_message(&mut self, listener: impl FnMut(Bytes, Flags) + Send + 'static) -> ListenerId {
        let id = self.alloc_id();
        self.message.push(Box::new(listener));
        id
    }

    /// The browser-style `onmessage = ...` single-slot setter: replaces
    /// whatever was previously set, wrapping `message` so the listener's
    /// argument looks like `{ data }` instead of `(data, flags)`.
    pub fn set_onmessage(
        &mut self,
        mut listener: impl FnMut(MessageEvent) + Send + 'static,
    ) -> ListenerId {
        let id = self.alloc_id();
        let wrapped: MessageListener = Box::new(move |data, _flags| listener(MessageEvent { data }));
        self.onmessage_slot = Some((id, wrapped));
        id
    }

    /// Returns the id of the currently-installed `onmessage` listener, the
    /// closest Rust analogue to reading back `ws.onmessage`.
    pub fn onmessage_id(&self) -> Option<ListenerId> {
        self.onmessage_slot.as_ref().map(|(id, _)| *id)
    }

    pub fn on_ping(&mut self, listener: impl FnMut(Bytes, Flags) + Send + 'static) -> ListenerId {
        let id = self.alloc_id();
        self.ping.push(Box::new(listener));
        id
    }

    pub fn on_pong(&mut self, listener: impl FnMut(Bytes, Flags) + Send + 'static) -> ListenerId {
        let id = self.alloc_id();
        self.pong.push(Box::new(listener));
        id
    }

    pub fn on_error(&mut self, listener: impl FnMut(ErrorEvent) + Send + 'static) -> ListenerId {
        let id = self.alloc_id();
        self.error.push(Box::new(listener));
        id
    }

    pub fn on_close(&mut self, listener: impl FnMut(u16, Bytes) + Send + 'static) -> ListenerId {
        let id = self.alloc_id();
        self.close.push(Box::new(listener));
        id
    }

    pub(crate) fn fire_open(&mut self) {
        for listener in &mut self.open {
            listener();
        }
    }

    pub(crate) fn fire_message(&mut self, data: Bytes, flags: Flags) {
        for listener in &mut self.message {
            listener(data.clone(), flags);
        }
        if let Some((_, listener)) = &mut self.onmessage_slot {
            listener(data, flags);
        }
    }

    pub(crate) fn fire_ping(&mut self, data: Bytes, flags: Flags) {
        for listener in &mut self.ping {
            listener(data.clone(), flags);
        }
    }

    pub(crate) fn fire_pong(&mut self, data: Bytes, flags: Flags) {
        for listener in &mut self.pong {
            listener(data.clone(), flags);
        }
    }

    pub(crate) fn fire_error(&mut self, event: ErrorEvent) {
        for listener in &mut self.error {
            listener(event.clone_for_fanout());
        }
    }

    pub(crate) fn fire_close(&mut self, code: u16, reason: Bytes) {
        for listener in &mut self.close {
            listener(code, reason.clone());
        }
    }
}

impl ErrorEvent {
    fn clone_for_fanout(&self) -> Self {
        Self {
            reason: self.reason.clone(),
            close_code: self.close_code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn onmessage_slot_replaces_previous_listener() {
        let mut listeners = Listeners::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_a = seen.clone();
        listeners.set_onmessage(move |ev| seen_a.lock().unwrap().push(ev.data));
        let seen_b = seen.clone();
        listeners.set_onmessage(move |ev| seen_b.lock().unwrap().push(ev.data));

        listeners.fire_message(Bytes::from_static(b"hi"), Flags::default());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn close_and_open_fire_for_every_registration() {
        let mut listeners = Listeners::new();
        let count = Arc::new(Mutex::new(0));
        let c1 = count.clone();
        listeners.on_close(move |_, _| *c1.lock().unwrap() += 1);
        let c2 = count.clone();
        listeners.on_close(move |_, _| *c2.lock().unwrap() += 1);
        listeners.fire_close(1000, Bytes::new());
        assert_eq!(*count.lock().unwrap(), 2);
    }
}
