//! Server-role construction. The HTTP upgrade itself (parsing the client's
//! request, negotiating a sub-protocol, writing the 101 response) is out of
//! scope here. The caller supplies an already-upgraded transport plus
//! whatever sub-protocol it negotiated, and `accept()` builds the Session
//! from there.

use bytes::{Bytes, BytesMut};

use crate::codec::FrameConfig;
use crate::events::{ErrorEvent, Flags, Listeners, MessageEvent};
use crate::session::{Opening, Role, Session};
use crate::transport::Transport;

/// Accumulates event listeners before `accept()` spawns the driver task, for
/// the same reason [`crate::client::ClientBuilder`] does: listener
/// registration must happen-before the deferred `open` transition, and the
/// simplest way to guarantee that is to register before the task exists.
#[derive(Default)]
pub struct ServerBuilder {
    config: FrameConfig,
    listeners: Listeners,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_payload_len(mut self, max: usize) -> Self {
        self.config.max_payload_len = max;
        self
    }

    pub fn on_open(mut self, listener: impl FnMut() + Send + 'static) -> Self {
        self.listeners.on_open(listener);
        self
    }

    pub fn on_message(mut self, listener: impl FnMut(Bytes, Flags) + Send + 'static) -> Self {
        self.listeners.on_message(listener);
        self
    }

    pub fn set_onmessage(mut self, listener: impl FnMut(MessageEvent) + Send + 'static) -> Self {
        self.listeners.set_onmessage(listener);
        self
    }

    pub fn on_ping(mut self, listener: impl FnMut(Bytes, Flags) + Send + 'static) -> Self {
        self.listeners.on_ping(listener);
        self
    }

    pub fn on_pong(mut self, listener: impl FnMut(Bytes, Flags) + Send + 'static) -> Self {
        self.listeners.on_pong(listener);
        self
    }

    pub fn on_error(mut self, listener: impl FnMut(ErrorEvent) + Send + 'static) -> Self {
        self.listeners.on_error(listener);
        self
    }

    pub fn on_close(mut self, listener: impl FnMut(u16, Bytes) + Send + 'static) -> Self {
        self.listeners.on_close(listener);
        self
    }

    /// `upgrade_head` is whatever bytes the caller already read past the
    /// client's request header terminator (it may have read ahead into the
    /// frame stream while parsing the HTTP request), fed to the Decoder
    /// before any further socket reads.
    pub fn accept<T: Transport>(
        self,
        transport: T,
        sub_protocol: Option<String>,
        upgrade_head: BytesMut,
    ) -> Session {
        crate::session::spawn_session(
            Role::Server,
            sub_protocol.clone(),
            self.listeners,
            self.config,
            Opening::ServerReady {
                transport,
                upgrade_head,
                sub_protocol,
            },
        )
    }
}
