//! Bridge state (Model in TEA pattern)

use std::sync::Arc;

use serde::Serialize;

use console_core::{ConfigError, Failure, LaunchContext, Phase, SessionConfig};
use console_transport::{PageOrigin, SessionFactory, SessionOptions};

use crate::config::BridgeSettings;
use crate::message::Generation;

/// Snapshot of a console session as seen by the UI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub phase: Phase,

    /// Failure that ended the current attempt
    pub failure: Option<Failure>,

    /// Failure of the attempt a reconnect replaced. Display only.
    pub previous_failure: Option<Failure>,
}

impl SessionState {
    /// Human-readable detail of the current failure
    pub fn error_detail(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.detail.as_str())
    }
}

/// Complete state owned by one bridge runtime
#[derive(Debug)]
pub struct BridgeState {
    /// Parsed once at mount; never re-read
    pub config: Result<SessionConfig, ConfigError>,

    /// Origin of the page the console was opened from
    pub origin: PageOrigin,

    pub settings: BridgeSettings,

    /// Current connect/reconnect cycle
    pub generation: Generation,

    pub session: SessionState,

    /// Constructor obtained by the current cycle's library load
    pub factory: Option<Arc<dyn SessionFactory>>,
}

impl BridgeState {
    pub fn new(
        config: Result<SessionConfig, ConfigError>,
        origin: PageOrigin,
        settings: BridgeSettings,
    ) -> Self {
        Self {
            config,
            origin,
            settings,
            generation: 0,
            session: SessionState::default(),
            factory: None,
        }
    }

    /// Parse the launch context and build the initial state
    pub fn from_launch(
        context: &LaunchContext,
        origin: PageOrigin,
        settings: BridgeSettings,
    ) -> Self {
        Self::new(SessionConfig::parse(context), origin, settings)
    }

    pub fn phase(&self) -> Phase {
        self.session.phase
    }

    pub fn has_valid_config(&self) -> bool {
        self.config.is_ok()
    }

    /// Start a new cycle and return its generation
    pub fn next_generation(&mut self) -> Generation {
        self.generation += 1;
        self.generation
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        generation == self.generation
    }

    /// Options handed to the protocol session, if the config is valid
    pub fn session_options(&self) -> Option<SessionOptions> {
        let config = self.config.as_ref().ok()?;
        Some(SessionOptions {
            credentials: config.credential.clone(),
            shared: self.settings.session.shared,
            ws_protocols: self.settings.session.ws_protocols.clone(),
        })
    }
}
