//! UI adapter: read-only view of a bridge plus the operator's controls.
//!
//! A front end renders [`ConsoleView`] and never touches session state
//! directly; the only way to change it is through [`ConsoleView::reconnect`].

use std::fmt;

use serde::Serialize;

use console_core::prelude::*;
use console_core::{FailureKind, Phase};

use crate::bridge::BridgeHandle;
use crate::config::UiSettings;
use crate::state::SessionState;

/// Three-state indicator shown next to the console
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusIndicator {
    Disconnected,
    Connecting,
    Connected,
}

impl StatusIndicator {
    pub fn from_phase(phase: Phase) -> Self {
        match phase {
            Phase::Idle | Phase::Disconnected { .. } => StatusIndicator::Disconnected,
            Phase::LoadingLibrary
            | Phase::AwaitingSurface
            | Phase::Connecting
            | Phase::Reconnecting => StatusIndicator::Connecting,
            Phase::Connected => StatusIndicator::Connected,
        }
    }
}

impl fmt::Display for StatusIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusIndicator::Disconnected => write!(f, "Disconnected"),
            StatusIndicator::Connecting => write!(f, "Connecting"),
            StatusIndicator::Connected => write!(f, "Connected"),
        }
    }
}

/// What the front end is allowed to offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UiCapabilities {
    pub fullscreen: bool,
    pub verbose_diagnostics: bool,
}

impl From<&UiSettings> for UiCapabilities {
    fn from(settings: &UiSettings) -> Self {
        Self {
            fullscreen: settings.fullscreen,
            verbose_diagnostics: settings.verbose_diagnostics,
        }
    }
}

/// Terminal error shown in place of the console
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPanel {
    pub kind: FailureKind,
    pub title: String,
    pub detail: String,
    /// Whether a reconnect button makes sense
    pub retryable: bool,
}

#[derive(Debug)]
pub struct ConsoleView {
    handle: BridgeHandle,
    capabilities: UiCapabilities,
    fullscreen: bool,
}

impl ConsoleView {
    pub fn new(handle: BridgeHandle, capabilities: UiCapabilities) -> Self {
        Self {
            handle,
            capabilities,
            fullscreen: false,
        }
    }

    pub fn capabilities(&self) -> UiCapabilities {
        self.capabilities
    }

    pub fn snapshot(&self) -> SessionState {
        self.handle.state()
    }

    pub fn status(&self) -> StatusIndicator {
        StatusIndicator::from_phase(self.snapshot().phase)
    }

    pub fn error_panel(&self) -> Option<ErrorPanel> {
        error_panel(&self.snapshot())
    }

    /// Phase name for diagnostics; only with `verbose_diagnostics`
    pub fn diagnostics(&self) -> Option<String> {
        if !self.capabilities.verbose_diagnostics {
            return None;
        }
        let state = self.snapshot();
        let mut line = format!("phase: {}", state.phase);
        if let Some(previous) = &state.previous_failure {
            line.push_str(&format!(", previous failure: {}", previous.detail));
        }
        Some(line)
    }

    pub fn reconnect(&self) -> Result<()> {
        self.handle.reconnect()
    }

    /// Flip fullscreen. `None` when the capability is off.
    pub fn toggle_fullscreen(&mut self) -> Option<bool> {
        if !self.capabilities.fullscreen {
            debug!("Fullscreen toggle ignored: capability disabled");
            return None;
        }
        self.fullscreen = !self.fullscreen;
        Some(self.fullscreen)
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn handle(&self) -> &BridgeHandle {
        &self.handle
    }
}

/// Error panel for a state, if it carries a failure
pub fn error_panel(state: &SessionState) -> Option<ErrorPanel> {
    state.failure.as_ref().map(|failure| ErrorPanel {
        kind: failure.kind,
        title: failure.kind.title().to_string(),
        detail: failure.detail.clone(),
        retryable: failure.kind.is_retryable(),
    })
}
