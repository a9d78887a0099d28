//! Operator notifications (toasts)

use serde::Serialize;

use console_core::Failure;

/// Visual treatment of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationVariant {
    Success,
    Failure,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub variant: NotificationVariant,
}

impl Notification {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        variant: NotificationVariant,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant,
        }
    }

    /// Console reached the connected phase
    pub fn connected(server_id: &str) -> Self {
        Self::new(
            "Console connected",
            format!("Connected to server {server_id}"),
            NotificationVariant::Success,
        )
    }

    /// Session closed without error
    pub fn closed() -> Self {
        Self::new(
            "Console closed",
            "The console session was closed",
            NotificationVariant::Neutral,
        )
    }

    pub fn failure(failure: &Failure) -> Self {
        Self::new(
            failure.kind.title(),
            failure.detail.clone(),
            NotificationVariant::Failure,
        )
    }
}

/// Destination for notifications. Fire-and-forget; must not block.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}
