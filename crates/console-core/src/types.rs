//! Session lifecycle types shared by every crate in the workspace

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection lifecycle phase of a console session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    /// Nothing running. Also the resting phase after unmount or a
    /// configuration error.
    #[default]
    Idle,
    /// Waiting for the protocol-client library to be available
    LoadingLibrary,
    /// Waiting for the render target to be mounted
    AwaitingSurface,
    /// Protocol session created, transport handshake in progress
    Connecting,
    /// Live console
    Connected,
    /// Session ended; `clean` is false for every error path
    Disconnected { clean: bool },
    /// Tearing the previous attempt down before a fresh one
    Reconnecting,
}

impl Phase {
    /// Phases in which a protocol session exists and may report events
    pub fn accepts_protocol_events(&self) -> bool {
        matches!(self, Phase::Connecting | Phase::Connected)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::LoadingLibrary => write!(f, "loading library"),
            Phase::AwaitingSurface => write!(f, "awaiting display surface"),
            Phase::Connecting => write!(f, "connecting"),
            Phase::Connected => write!(f, "connected"),
            Phase::Disconnected { clean: true } => write!(f, "disconnected"),
            Phase::Disconnected { clean: false } => write!(f, "disconnected (error)"),
            Phase::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Failure taxonomy surfaced to the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MissingParameters,
    LibraryLoadFailure,
    SurfaceTimeout,
    TransportFailure,
    AuthenticationFailure,
    SecurityFailure,
    UncleanDisconnect,
}

impl FailureKind {
    /// Only a configuration problem cannot be fixed by reconnecting
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FailureKind::MissingParameters)
    }

    /// Short operator-facing title for notifications and error panels
    pub fn title(&self) -> &'static str {
        match self {
            FailureKind::MissingParameters => "Invalid console link",
            FailureKind::LibraryLoadFailure => "Console library unavailable",
            FailureKind::SurfaceTimeout => "Display not ready",
            FailureKind::TransportFailure => "Connection failed",
            FailureKind::AuthenticationFailure => "Authentication failed",
            FailureKind::SecurityFailure => "Security negotiation failed",
            FailureKind::UncleanDisconnect => "Connection lost",
        }
    }
}

/// A terminal failure of one connection attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub detail: String,
}

impl Failure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Bounded attempt counter used by the display surface gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    attempts: u32,
    max_attempts: u32,
}

impl RetryBudget {
    /// A zero budget is raised to one so that at least one poll happens.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Take one attempt from the budget. Returns false once exhausted.
    pub fn consume(&mut self) -> bool {
        if self.is_exhausted() {
            return false;
        }
        self.attempts += 1;
        true
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_accepts_protocol_events() {
        assert!(Phase::Connecting.accepts_protocol_events());
        assert!(Phase::Connected.accepts_protocol_events());
        assert!(!Phase::AwaitingSurface.accepts_protocol_events());
        assert!(!Phase::Disconnected { clean: true }.accepts_protocol_events());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Connected.to_string(), "connected");
        assert_eq!(
            Phase::Disconnected { clean: false }.to_string(),
            "disconnected (error)"
        );
    }

    #[test]
    fn test_phase_serializes_tagged() {
        let json = serde_json::to_value(Phase::Disconnected { clean: true }).unwrap();
        assert_eq!(json["phase"], "disconnected");
        assert_eq!(json["clean"], true);
    }

    #[test]
    fn test_failure_kind_retryable() {
        assert!(!FailureKind::MissingParameters.is_retryable());
        assert!(FailureKind::AuthenticationFailure.is_retryable());
        assert!(FailureKind::UncleanDisconnect.is_retryable());
    }

    #[test]
    fn test_retry_budget_exhausts() {
        let mut budget = RetryBudget::new(3);
        assert!(budget.consume());
        assert!(budget.consume());
        assert!(budget.consume());
        assert!(budget.is_exhausted());
        assert!(!budget.consume());
        assert_eq!(budget.attempts(), 3);
    }

    #[test]
    fn test_retry_budget_zero_is_raised_to_one() {
        let mut budget = RetryBudget::new(0);
        assert_eq!(budget.max_attempts(), 1);
        assert!(budget.consume());
        assert!(!budget.consume());
    }
}
