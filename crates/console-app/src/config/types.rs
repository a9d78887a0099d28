//! Configuration types for the console bridge
//!
//! Defines:
//! - `BridgeSettings` - Settings file root
//! - One section struct per `[table]` in `config.toml`

use std::time::Duration;

use serde::{Deserialize, Serialize};

use console_transport::{
    DEFAULT_LOAD_TIMEOUT, DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL, DEFAULT_PROXY_PATH,
};

/// Lower bound for the surface poll interval
pub const MIN_INTERVAL_MS: u64 = 10;

/// Lower bound for the load and connect timeouts
pub const MIN_TIMEOUT_MS: u64 = 100;

/// Default upper bound on the transport handshake
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 15_000;

/// Settings file root (`config.toml`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeSettings {
    pub proxy: ProxySettings,
    pub session: SessionSettings,
    pub timeouts: TimeoutSettings,
    pub surface: SurfaceSettings,
    pub ui: UiSettings,
}

impl BridgeSettings {
    /// Raise out-of-range values to their minimums
    pub fn clamped(mut self) -> Self {
        self.timeouts.library_load_ms = self.timeouts.library_load_ms.max(MIN_TIMEOUT_MS);
        self.timeouts.connect_ms = self.timeouts.connect_ms.max(MIN_TIMEOUT_MS);
        self.surface.max_attempts = self.surface.max_attempts.max(1);
        self.surface.interval_ms = self.surface.interval_ms.max(MIN_INTERVAL_MS);
        self
    }

    pub fn library_load_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.library_load_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.connect_ms)
    }

    pub fn surface_interval(&self) -> Duration {
        Duration::from_millis(self.surface.interval_ms)
    }
}

/// `[proxy]` - the WebSocket-to-TCP proxy on the page origin
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Path of the proxy endpoint, without leading slash
    pub path: String,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            path: DEFAULT_PROXY_PATH.to_string(),
        }
    }
}

/// `[session]` - options handed to the protocol session
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Leave other viewers connected
    pub shared: bool,

    /// WebSocket subprotocols offered to the proxy
    pub ws_protocols: Vec<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            shared: true,
            ws_protocols: vec!["binary".to_string()],
        }
    }
}

/// `[timeouts]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub library_load_ms: u64,
    pub connect_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            library_load_ms: DEFAULT_LOAD_TIMEOUT.as_millis() as u64,
            connect_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

/// `[surface]` - display surface polling budget
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SurfaceSettings {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl Default for SurfaceSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

/// `[ui]` - front-end capabilities
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct UiSettings {
    /// Offer the fullscreen toggle
    pub fullscreen: bool,

    /// Show debug-level diagnostics
    pub verbose_diagnostics: bool,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            fullscreen: true,
            verbose_diagnostics: false,
        }
    }
}
