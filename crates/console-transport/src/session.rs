//! Contract between the bridge and a protocol-client library.
//!
//! A library provides a [`SessionFactory`] (its "constructor"). Creating a
//! session binds it to a [`RenderTarget`] and a transport URL and hands it a
//! [`SessionListener`] through which it reports lifecycle events. Because the
//! listener is supplied at construction, every handler is wired before the
//! session can emit anything.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use url::Url;

use console_core::prelude::*;
use console_core::Credential;

/// Lifecycle events reported by a protocol session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// Transport and protocol handshake completed
    Connect,
    /// Session ended. `clean` is false when the connection dropped.
    Disconnect { clean: bool },
    /// The remote end asked for credentials beyond the ones supplied
    CredentialsRequired,
    /// Protocol-level security negotiation failed
    SecurityFailure { reason: String },
}

impl ProtocolEvent {
    /// Event name as used by browser-side protocol libraries
    pub fn name(&self) -> &'static str {
        match self {
            ProtocolEvent::Connect => "connect",
            ProtocolEvent::Disconnect { .. } => "disconnect",
            ProtocolEvent::CredentialsRequired => "credentialsrequired",
            ProtocolEvent::SecurityFailure { .. } => "securityfailure",
        }
    }
}

/// Callback receiving a session's events
#[derive(Clone)]
pub struct SessionListener {
    handler: Arc<dyn Fn(ProtocolEvent) + Send + Sync>,
}

impl SessionListener {
    pub fn new(handler: impl Fn(ProtocolEvent) + Send + Sync + 'static) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }

    /// Deliver an event. Never blocks.
    pub fn emit(&self, event: ProtocolEvent) {
        (self.handler)(event);
    }
}

impl fmt::Debug for SessionListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionListener").finish_non_exhaustive()
    }
}

/// Options passed to the protocol session constructor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub credentials: Credential,
    /// Leave other viewers connected when joining
    pub shared: bool,
    /// WebSocket subprotocols offered to the proxy
    pub ws_protocols: Vec<String>,
}

/// Operator input bound for the console. Shared so that whichever session
/// is live can read it; sessions take turns through the lock.
pub type ConsoleInput = Arc<Mutex<mpsc::Receiver<Vec<u8>>>>;

/// On-screen target a protocol session renders into
#[derive(Debug, Clone)]
pub struct RenderTarget {
    id: String,
    frames: Option<mpsc::Sender<Vec<u8>>>,
    input: Option<ConsoleInput>,
}

impl RenderTarget {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            frames: None,
            input: None,
        }
    }

    /// Route raw console bytes received by the session to `frames`
    pub fn with_frame_output(mut self, frames: mpsc::Sender<Vec<u8>>) -> Self {
        self.frames = Some(frames);
        self
    }

    /// Send bytes read from `input` to the console
    pub fn with_input(mut self, input: mpsc::Receiver<Vec<u8>>) -> Self {
        self.input = Some(Arc::new(Mutex::new(input)));
        self
    }

    pub fn input(&self) -> Option<&ConsoleInput> {
        self.input.as_ref()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn frame_output(&self) -> Option<&mpsc::Sender<Vec<u8>>> {
        self.frames.as_ref()
    }
}

/// A live protocol session created by a [`SessionFactory`]
pub trait ProtocolSession: Send + fmt::Debug {
    /// Close the session. Idempotent; the session may still report a final
    /// `Disconnect` event afterwards.
    fn disconnect(&mut self);
}

/// The protocol-client library's session constructor
pub trait SessionFactory: Send + Sync + fmt::Debug {
    /// Create a session bound to `target` that connects through `url`.
    ///
    /// Implementations must not report events before returning except
    /// through `listener`.
    fn create(
        &self,
        target: RenderTarget,
        url: &Url,
        options: SessionOptions,
        listener: SessionListener,
    ) -> Result<Box<dyn ProtocolSession>>;
}
