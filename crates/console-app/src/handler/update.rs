//! Main update function - handles state transitions (TEA pattern)

use console_core::{Failure, FailureKind, Phase};
use console_transport::{build_transport_url, ProtocolEvent, RenderTarget};
use tracing::{debug, info, warn};

use super::{UpdateAction, UpdateResult};
use crate::message::{Generation, Message};
use crate::notify::Notification;
use crate::state::BridgeState;

pub const DETAIL_MISSING_PARAMETERS: &str = "missing connection parameters";
pub const DETAIL_LIBRARY_LOAD: &str = "library load failed";
pub const DETAIL_SURFACE_TIMEOUT: &str = "display surface not ready";
pub const DETAIL_CONNECTION_LOST: &str = "connection lost unexpectedly";
pub const DETAIL_AUTHENTICATION: &str = "authentication failed";
pub const DETAIL_CONNECT_TIMEOUT: &str = "connection timed out";
const DETAIL_SECURITY_FALLBACK: &str = "security negotiation failed";

/// Process a message and update state
pub fn update(state: &mut BridgeState, message: Message) -> UpdateResult {
    if let Some(generation) = message.generation() {
        if !state.is_current(generation) {
            debug!(
                "Ignoring stale message from generation {} (current {}): {:?}",
                generation, state.generation, message
            );
            return UpdateResult::none();
        }
    }

    match message {
        Message::Connect => handle_connect(state),
        Message::Reconnect => handle_reconnect(state),
        Message::Unmount => handle_unmount(state),

        Message::StartAttempt {
            generation,
            force_reload,
        } => {
            if state.phase() != Phase::Reconnecting {
                return ignored(state, "StartAttempt");
            }
            enter_loading(state, generation, force_reload)
        }

        Message::LibraryReady {
            generation,
            factory,
        } => {
            if state.phase() != Phase::LoadingLibrary {
                return ignored(state, "LibraryReady");
            }
            debug!("Protocol library ready (generation {})", generation);
            state.factory = Some(factory);
            state.session.phase = Phase::AwaitingSurface;
            UpdateResult::action(UpdateAction::AwaitSurface { generation })
        }

        Message::LibraryLoadFailed { reason, .. } => {
            if state.phase() != Phase::LoadingLibrary {
                return ignored(state, "LibraryLoadFailed");
            }
            warn!("Protocol library load failed: {}", reason);
            fail(state, FailureKind::LibraryLoadFailure, DETAIL_LIBRARY_LOAD)
        }

        Message::SurfaceReady { generation, target } => {
            if state.phase() != Phase::AwaitingSurface {
                return ignored(state, "SurfaceReady");
            }
            open_transport(state, generation, target)
        }

        Message::SurfaceTimedOut { attempts, .. } => {
            if state.phase() != Phase::AwaitingSurface {
                return ignored(state, "SurfaceTimedOut");
            }
            warn!("Display surface not mounted after {} polls", attempts);
            fail(state, FailureKind::SurfaceTimeout, DETAIL_SURFACE_TIMEOUT)
        }

        Message::TransportFailed { reason, .. } => {
            if state.phase() != Phase::Connecting {
                return ignored(state, "TransportFailed");
            }
            fail(state, FailureKind::TransportFailure, reason)
        }

        Message::ConnectTimedOut { .. } => {
            if state.phase() != Phase::Connecting {
                return UpdateResult::none();
            }
            fail(state, FailureKind::TransportFailure, DETAIL_CONNECT_TIMEOUT)
        }

        Message::Protocol { event, .. } => handle_protocol_event(state, event),
    }
}

fn handle_connect(state: &mut BridgeState) -> UpdateResult {
    if state.phase() != Phase::Idle {
        debug!("Connect ignored while {}", state.phase());
        return UpdateResult::none();
    }

    if let Err(e) = &state.config {
        warn!(
            "Cannot connect: {} (first invalid field: {})",
            e,
            e.missing_field()
        );
        let failure = Failure::new(FailureKind::MissingParameters, DETAIL_MISSING_PARAMETERS);
        let notification = Notification::failure(&failure);
        state.session.failure = Some(failure);
        return UpdateResult::action(UpdateAction::Notify(notification));
    }

    let generation = state.next_generation();
    state.session.failure = None;
    enter_loading(state, generation, false)
}

fn handle_reconnect(state: &mut BridgeState) -> UpdateResult {
    if !state.has_valid_config() {
        warn!("Reconnect refused: connection parameters are invalid");
        return UpdateResult::none();
    }

    info!("Reconnecting (was {})", state.phase());

    let generation = state.next_generation();
    if let Some(failure) = state.session.failure.take() {
        state.session.previous_failure = Some(failure);
    }
    state.session.phase = Phase::Reconnecting;
    state.factory = None;

    UpdateResult::actions([UpdateAction::CancelAttempt, UpdateAction::DisposeTransport])
        .with_message(Message::StartAttempt {
            generation,
            force_reload: true,
        })
}

fn handle_unmount(state: &mut BridgeState) -> UpdateResult {
    debug!("Unmounting console (was {})", state.phase());

    // Anything still in flight now belongs to a dead generation.
    state.next_generation();
    state.session.phase = Phase::Idle;
    state.factory = None;

    UpdateResult::actions([
        UpdateAction::CancelAttempt,
        UpdateAction::DisposeTransport,
        UpdateAction::Stop,
    ])
}

fn enter_loading(
    state: &mut BridgeState,
    generation: Generation,
    force_reload: bool,
) -> UpdateResult {
    state.session.phase = Phase::LoadingLibrary;
    UpdateResult::action(UpdateAction::LoadLibrary {
        generation,
        force_reload,
    })
}

fn open_transport(
    state: &mut BridgeState,
    generation: Generation,
    target: RenderTarget,
) -> UpdateResult {
    let (host, port, server_id) = match &state.config {
        Ok(config) => (config.host.clone(), config.port, config.server_id.clone()),
        Err(_) => return fail(state, FailureKind::TransportFailure, DETAIL_MISSING_PARAMETERS),
    };
    let Some(options) = state.session_options() else {
        return fail(state, FailureKind::TransportFailure, DETAIL_MISSING_PARAMETERS);
    };
    let Some(factory) = state.factory.clone() else {
        return fail(state, FailureKind::LibraryLoadFailure, DETAIL_LIBRARY_LOAD);
    };

    let url = match build_transport_url(&state.origin, &state.settings.proxy.path, &host, port) {
        Ok(url) => url,
        Err(e) => return fail(state, FailureKind::TransportFailure, e.to_string()),
    };

    info!("Connecting to server {} through {}", server_id, url.as_str());
    state.session.phase = Phase::Connecting;

    UpdateResult::action(UpdateAction::OpenTransport {
        generation,
        factory,
        target,
        url,
        options,
    })
}

fn handle_protocol_event(state: &mut BridgeState, event: ProtocolEvent) -> UpdateResult {
    let phase = state.phase();
    if !phase.accepts_protocol_events() {
        debug!("Ignoring '{}' event while {}", event.name(), phase);
        return UpdateResult::none();
    }

    match event {
        ProtocolEvent::Connect => {
            if phase != Phase::Connecting {
                return ignored(state, "connect");
            }
            state.session.phase = Phase::Connected;
            let server_id = state
                .config
                .as_ref()
                .map(|c| c.server_id.clone())
                .unwrap_or_default();
            info!("Console connected to server {}", server_id);
            UpdateResult::actions([
                UpdateAction::CancelAttempt,
                UpdateAction::Notify(Notification::connected(&server_id)),
            ])
        }

        ProtocolEvent::Disconnect { clean: true } => {
            info!("Console session closed");
            state.session.phase = Phase::Disconnected { clean: true };
            state.session.failure = None;
            UpdateResult::actions([
                UpdateAction::CancelAttempt,
                UpdateAction::DisposeTransport,
                UpdateAction::Notify(Notification::closed()),
            ])
        }

        ProtocolEvent::Disconnect { clean: false } => {
            fail(state, FailureKind::UncleanDisconnect, DETAIL_CONNECTION_LOST)
        }

        ProtocolEvent::CredentialsRequired => {
            if phase != Phase::Connecting {
                return ignored(state, "credentialsrequired");
            }
            fail(state, FailureKind::AuthenticationFailure, DETAIL_AUTHENTICATION)
        }

        ProtocolEvent::SecurityFailure { reason } => {
            let detail = if reason.trim().is_empty() {
                DETAIL_SECURITY_FALLBACK.to_string()
            } else {
                reason
            };
            fail(state, FailureKind::SecurityFailure, detail)
        }
    }
}

/// Terminal transition to `Disconnected { clean: false }`
fn fail(state: &mut BridgeState, kind: FailureKind, detail: impl Into<String>) -> UpdateResult {
    let failure = Failure::new(kind, detail);
    warn!(
        "Console attempt failed ({:?}): {}",
        failure.kind, failure.detail
    );

    let notification = Notification::failure(&failure);
    state.session.phase = Phase::Disconnected { clean: false };
    state.session.failure = Some(failure);

    UpdateResult::actions([
        UpdateAction::CancelAttempt,
        UpdateAction::DisposeTransport,
        UpdateAction::Notify(notification),
    ])
}

fn ignored(state: &BridgeState, what: &str) -> UpdateResult {
    debug!("Ignoring {} while {}", what, state.phase());
    UpdateResult::none()
}
