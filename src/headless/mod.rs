//! Headless mode - NDJSON event output
//!
//! Runs one console session without a graphical front end. State changes,
//! notifications and command results are written to stdout as NDJSON
//! (newline-delimited JSON), one event per line, each tagged with an
//! `"event"` field.
//!
//! # Example Output
//!
//! ```json
//! {"event":"status","phase":"loading library","status":"connecting","detail":null,"failure":null,"retryable":null,"bytes_received":0,"timestamp":1704700001000}
//! {"event":"notification","title":"Console connected","description":"Connected to server 42","variant":"success","timestamp":1704700002000}
//! {"event":"fullscreen","enabled":true,"timestamp":1704700003000}
//! ```

pub mod runner;

use std::io::{self, Write};

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

use console_app::{
    error_panel, Notification, NotificationSink, NotificationVariant, SessionState,
    StatusIndicator,
};
use console_core::FailureKind;

/// Events emitted in headless mode
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    /// Session state changed or was requested
    Status {
        phase: String,
        status: StatusIndicator,
        detail: Option<String>,
        failure: Option<FailureKind>,
        retryable: Option<bool>,
        bytes_received: u64,
        timestamp: i64,
    },

    /// Operator notification
    Notification {
        title: String,
        description: String,
        variant: NotificationVariant,
        timestamp: i64,
    },

    /// Fullscreen toggled
    Fullscreen { enabled: bool, timestamp: i64 },

    /// Command could not be carried out
    Error { message: String, timestamp: i64 },
}

impl HeadlessEvent {
    /// Emit this event to stdout as JSON
    pub fn emit(&self) {
        let json = match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize headless event: {}", e);
                return;
            }
        };

        let mut stdout = io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", json) {
            error!("Failed to write headless event to stdout: {}", e);
            return;
        }

        if let Err(e) = stdout.flush() {
            error!("Failed to flush headless stdout: {}", e);
        }
    }

    /// Get current timestamp in milliseconds
    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }

    // ─────────────────────────────────────────────────────────
    // Convenience constructors
    // ─────────────────────────────────────────────────────────

    pub fn status(state: &SessionState, bytes_received: u64) -> Self {
        let panel = error_panel(state);
        HeadlessEvent::Status {
            phase: state.phase.to_string(),
            status: StatusIndicator::from_phase(state.phase),
            detail: panel.as_ref().map(|p| p.detail.clone()),
            failure: panel.as_ref().map(|p| p.kind),
            retryable: panel.as_ref().map(|p| p.retryable),
            bytes_received,
            timestamp: Self::now(),
        }
    }

    pub fn notification(notification: &Notification) -> Self {
        HeadlessEvent::Notification {
            title: notification.title.clone(),
            description: notification.description.clone(),
            variant: notification.variant,
            timestamp: Self::now(),
        }
    }

    pub fn fullscreen(enabled: bool) -> Self {
        HeadlessEvent::Fullscreen {
            enabled,
            timestamp: Self::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        HeadlessEvent::Error {
            message: message.into(),
            timestamp: Self::now(),
        }
    }
}

/// Notification sink that prints notifications as NDJSON
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessSink;

impl NotificationSink for HeadlessSink {
    fn notify(&self, notification: Notification) {
        info!(
            "Notification: {} - {}",
            notification.title, notification.description
        );
        HeadlessEvent::notification(&notification).emit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use console_core::{Failure, Phase};

    #[test]
    fn test_status_event_shape() {
        let state = SessionState {
            phase: Phase::Disconnected { clean: false },
            failure: Some(Failure::new(
                FailureKind::AuthenticationFailure,
                "authentication failed",
            )),
            previous_failure: None,
        };

        let json: serde_json::Value =
            serde_json::to_value(HeadlessEvent::status(&state, 12)).unwrap();

        assert_eq!(json["event"], "status");
        assert_eq!(json["status"], "disconnected");
        assert_eq!(json["detail"], "authentication failed");
        assert_eq!(json["failure"], "authentication_failure");
        assert_eq!(json["retryable"], true);
        assert_eq!(json["bytes_received"], 12);
        assert!(json["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_status_event_without_failure() {
        let state = SessionState {
            phase: Phase::Connected,
            ..Default::default()
        };

        let json = serde_json::to_value(HeadlessEvent::status(&state, 0)).unwrap();

        assert_eq!(json["status"], "connected");
        assert_eq!(json["phase"], "connected");
        assert!(json["detail"].is_null());
    }

    #[test]
    fn test_notification_event_shape() {
        let json = serde_json::to_value(HeadlessEvent::notification(&Notification::closed()))
            .unwrap();

        assert_eq!(json["event"], "notification");
        assert_eq!(json["variant"], "neutral");
        assert_eq!(json["title"], "Console closed");
    }

    #[test]
    fn test_fullscreen_and_error_events() {
        let json = serde_json::to_value(HeadlessEvent::fullscreen(true)).unwrap();
        assert_eq!(json["event"], "fullscreen");
        assert_eq!(json["enabled"], true);

        let json = serde_json::to_value(HeadlessEvent::error("nope")).unwrap();
        assert_eq!(json["event"], "error");
        assert_eq!(json["message"], "nope");
    }
}
