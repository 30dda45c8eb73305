//! Client-role construction: wires [`crate::handshake::client_handshake`] into
//! a [`crate::session::Session`] via a `ClientBuilder` method-chain.

use std::collections::HashMap;

use bytes::Bytes;

use crate::codec::FrameConfig;
use crate::events::{ErrorEvent, Flags, Listeners, MessageEvent};
use crate::handshake::ClientHandshakeOpts;
use crate::session::{Opening, Role, Session};
use crate::transport::Transport;

/// Accumulates handshake options and event listeners before a single
/// `connect()` call spawns the Session's driver task. Registering listeners
/// here, rather than on the returned handle, keeps them in place before the
/// handshake can possibly resolve.
#[derive(Default)]
pub struct ClientBuilder {
    protocols: Vec<String>,
    origin: Option<String>,
    version: u8,
    headers: HashMap<String, String>,
    config: FrameConfig,
    listeners: Listeners,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            version: 13,
            ..Default::default()
        }
    }

    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocols.push(protocol.into());
        self
    }

    pub fn protocols(self, protocols: Vec<String>) -> Self {
        Self { protocols, ..self }
    }

    pub fn origin(self, origin: impl Into<String>) -> Self {
        Self {
            origin: Some(origin.into()),
            ..self
        }
    }

    /// HyBi-13 (the default) or the draft-8 variant for interop.
    pub fn version(self, version: u8) -> Self {
        Self { version, ..self }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
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

    /// Spawns the driver task and returns a handle immediately, in
    /// `Connecting` state. The handshake runs in the background, racing
    /// against any `close()`/`terminate()` the caller issues before it
    /// resolves.
    pub fn connect<T: Transport>(self, uri: http::Uri, transport: T) -> Session {
        let opts = ClientHandshakeOpts {
            origin: self.origin,
            sub_protocols: self.protocols,
            version: self.version,
            extra_headers: self.headers.into_iter().collect(),
        };
        crate::session::spawn_session(
            Role::Client,
            None,
            self.listeners,
            self.config,
            Opening::ClientHandshake {
                transport,
                uri,
                opts,
            },
        )
    }
}
