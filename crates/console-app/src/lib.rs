//! # console-app - Session State Machine and Bridge Runtime
//!
//! Drives one remote console from launch parameters to a live protocol
//! session using the TEA pattern: [`handler::update`] is the only place
//! session state changes, and [`bridge::SessionBridge`] executes the
//! resulting actions.
//!
//! ## Public API
//!
//! - [`SessionBridge`], [`BridgeHandle`] - Runtime and its control handle
//! - [`BridgeState`], [`SessionState`] - Model
//! - [`Message`], [`UpdateAction`], [`UpdateResult`] - TEA plumbing
//! - [`ConsoleView`], [`StatusIndicator`], [`UiCapabilities`] - UI adapter
//! - [`Notification`], [`NotificationSink`] - Operator toasts
//! - [`config`] - Settings file

pub mod bridge;
pub mod config;
pub mod handler;
pub mod message;
pub mod notify;
pub mod state;
pub mod ui;

pub use bridge::{BridgeHandle, SessionBridge};
pub use config::BridgeSettings;
pub use handler::{update, UpdateAction, UpdateResult};
pub use message::{Generation, Message};
pub use notify::{Notification, NotificationSink, NotificationVariant};
pub use state::{BridgeState, SessionState};
pub use ui::{error_panel, ConsoleView, ErrorPanel, StatusIndicator, UiCapabilities};
