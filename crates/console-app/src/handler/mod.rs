//! Handler module - TEA update function
//!
//! Organized into submodules:
//! - `update`: Main update() function and message dispatch
//!
//! `update` never performs I/O. Everything with a side effect is returned as
//! an [`UpdateAction`] for the bridge runtime to execute.

pub(crate) mod update;


use std::sync::Arc;

use url::Url;

use console_transport::{RenderTarget, SessionFactory, SessionOptions};

use crate::message::{Generation, Message};
use crate::notify::Notification;

// Re-export main entry point
pub use update::update;

/// Actions the bridge runtime performs after an update
#[derive(Debug, Clone)]
pub enum UpdateAction {
    /// Make sure the protocol library is loaded, clearing it first when
    /// `force_reload` is set
    LoadLibrary {
        generation: Generation,
        force_reload: bool,
    },

    /// Wait for the render target within the surface budget
    AwaitSurface { generation: Generation },

    /// Create the protocol session and arm the connect timeout
    OpenTransport {
        generation: Generation,
        factory: Arc<dyn SessionFactory>,
        target: RenderTarget,
        url: Url,
        options: SessionOptions,
    },

    /// Disconnect and drop the live protocol session, if any
    DisposeTransport,

    /// Abort every task still working on the current attempt
    CancelAttempt,

    Notify(Notification),

    /// Exit the runtime
    Stop,
}

/// Result of processing a message
#[derive(Debug, Default)]
pub struct UpdateResult {
    /// Optional follow-up message to process
    pub message: Option<Message>,
    /// Actions for the runtime, in execution order
    pub actions: Vec<UpdateAction>,
}

impl UpdateResult {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn message(msg: Message) -> Self {
        Self {
            message: Some(msg),
            actions: Vec::new(),
        }
    }

    pub fn action(action: UpdateAction) -> Self {
        Self {
            message: None,
            actions: vec![action],
        }
    }

    pub fn actions(actions: impl IntoIterator<Item = UpdateAction>) -> Self {
        Self {
            message: None,
            actions: actions.into_iter().collect(),
        }
    }

    pub fn with_message(mut self, msg: Message) -> Self {
        self.message = Some(msg);
        self
    }
}
