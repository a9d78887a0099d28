//! Message types for the bridge (TEA pattern)

use std::sync::Arc;

use console_transport::{ProtocolEvent, RenderTarget, SessionFactory};

/// Identifies one connect/reconnect cycle. Messages carrying an older value
/// are stale and ignored.
pub type Generation = u64;

/// Everything that can change a bridge's state
#[derive(Debug, Clone)]
pub enum Message {
    // ─────────────────────────────────────────────────────────
    // Operator commands
    // ─────────────────────────────────────────────────────────
    /// Start the first connection attempt
    Connect,

    /// Tear down the current attempt and start over with a fresh library
    Reconnect,

    /// Console removed from screen; stop everything
    Unmount,

    // ─────────────────────────────────────────────────────────
    // Attempt progress (reported by spawned tasks)
    // ─────────────────────────────────────────────────────────
    /// Follow-up to `Reconnect` once the old attempt is torn down
    StartAttempt {
        generation: Generation,
        force_reload: bool,
    },

    LibraryReady {
        generation: Generation,
        factory: Arc<dyn SessionFactory>,
    },

    LibraryLoadFailed {
        generation: Generation,
        reason: String,
    },

    SurfaceReady {
        generation: Generation,
        target: RenderTarget,
    },

    SurfaceTimedOut {
        generation: Generation,
        attempts: u32,
    },

    /// The session factory refused to create a session
    TransportFailed {
        generation: Generation,
        reason: String,
    },

    /// The transport handshake did not finish in time
    ConnectTimedOut { generation: Generation },

    /// Lifecycle event from the protocol session
    Protocol {
        generation: Generation,
        event: ProtocolEvent,
    },
}

impl Message {
    /// Generation the message belongs to; `None` for operator commands
    pub fn generation(&self) -> Option<Generation> {
        match self {
            Message::Connect | Message::Reconnect | Message::Unmount => None,
            Message::StartAttempt { generation, .. }
            | Message::LibraryReady { generation, .. }
            | Message::LibraryLoadFailed { generation, .. }
            | Message::SurfaceReady { generation, .. }
            | Message::SurfaceTimedOut { generation, .. }
            | Message::TransportFailed { generation, .. }
            | Message::ConnectTimedOut { generation }
            | Message::Protocol { generation, .. } => Some(*generation),
        }
    }
}
