//! End-to-end scenarios for the bridge runtime using recording fakes

use std::sync::{Arc, Mutex};
use std::time::Duration;

use console_app::{
    BridgeHandle, BridgeSettings, BridgeState, ConsoleView, Notification, NotificationSink,
    NotificationVariant, SessionBridge, SessionState, StatusIndicator, UiCapabilities,
};
use console_core::{FailureKind, LaunchContext, Phase};
use console_transport::test_utils::{Call, FakeFactory, FakeRegistry, LoadBehaviour};
use console_transport::{
    PageOrigin, ProtocolEvent, ProtocolLibraryLoader, RenderTarget, SurfaceProbe, SurfaceSlot,
};

const WAIT: Duration = Duration::from_secs(5);
const VALID: &str = "host=10.0.0.5&port=5901&password=x&serverId=42";

#[derive(Default)]
struct RecordingSink(Mutex<Vec<Notification>>);

impl RecordingSink {
    fn all(&self) -> Vec<Notification> {
        self.0.lock().unwrap().clone()
    }

    fn count(&self, variant: NotificationVariant) -> usize {
        self.all().iter().filter(|n| n.variant == variant).count()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notification: Notification) {
        self.0.lock().unwrap().push(notification);
    }
}

struct Harness {
    handle: BridgeHandle,
    factory: Arc<FakeFactory>,
    registry: Arc<FakeRegistry>,
    slot: SurfaceSlot,
    sink: Arc<RecordingSink>,
}

fn fast_settings() -> BridgeSettings {
    let mut settings = BridgeSettings::default();
    settings.surface.max_attempts = 5;
    settings.surface.interval_ms = 10;
    settings
}

fn start(query: &str, settings: BridgeSettings) -> Harness {
    let factory = Arc::new(FakeFactory::new());
    let registry = Arc::new(FakeRegistry::new(Arc::clone(&factory)));
    let slot = SurfaceSlot::new();
    slot.mount(RenderTarget::new("screen"));
    let sink = Arc::new(RecordingSink::default());

    let handle = spawn_bridge(
        query,
        settings,
        &registry,
        Arc::new(slot.clone()),
        sink.clone(),
    );

    Harness {
        handle,
        factory,
        registry,
        slot,
        sink,
    }
}

fn spawn_bridge(
    query: &str,
    settings: BridgeSettings,
    registry: &Arc<FakeRegistry>,
    probe: Arc<dyn SurfaceProbe>,
    sink: Arc<RecordingSink>,
) -> BridgeHandle {
    let state = BridgeState::from_launch(
        &LaunchContext::from_query(query),
        PageOrigin::new(true, "portal.example.com"),
        settings,
    );
    SessionBridge::new(
        state,
        ProtocolLibraryLoader::new(Arc::clone(registry)),
        probe,
        sink,
    )
    .spawn()
}

async fn wait_until(
    handle: &BridgeHandle,
    predicate: impl FnMut(&SessionState) -> bool,
) -> SessionState {
    tokio::time::timeout(WAIT, handle.wait_for(predicate))
        .await
        .expect("timed out waiting for bridge state")
        .expect("bridge stopped")
}

async fn wait_phase(handle: &BridgeHandle, phase: Phase) -> SessionState {
    wait_until(handle, |s| s.phase == phase).await
}

/// Connect and answer the handshake
async fn connected(harness: &Harness) {
    harness.handle.connect().unwrap();
    wait_phase(&harness.handle, Phase::Connecting).await;
    harness
        .factory
        .latest()
        .unwrap()
        .emit(ProtocolEvent::Connect);
    wait_phase(&harness.handle, Phase::Connected).await;
}

#[tokio::test]
async fn test_valid_config_connects_with_one_success_notification() {
    let harness = start(VALID, fast_settings());

    connected(&harness).await;

    assert_eq!(harness.sink.count(NotificationVariant::Success), 1);
    assert_eq!(harness.sink.all().len(), 1);

    let session = harness.factory.latest().unwrap();
    assert_eq!(
        session.url.as_str(),
        "wss://portal.example.com/websockify?host=10.0.0.5&port=5901"
    );
    assert_eq!(session.target_id, "screen");
    assert_eq!(session.options.credentials.expose(), "x");
    assert!(session.options.shared);
    assert_eq!(harness.registry.load_count(), 1);
}

#[tokio::test]
async fn test_credentials_required_fails_authentication() {
    let harness = start(VALID, fast_settings());
    harness.handle.connect().unwrap();
    wait_phase(&harness.handle, Phase::Connecting).await;

    harness
        .factory
        .latest()
        .unwrap()
        .emit(ProtocolEvent::CredentialsRequired);
    let state = wait_phase(&harness.handle, Phase::Disconnected { clean: false }).await;

    assert_eq!(state.error_detail(), Some("authentication failed"));
    assert_eq!(
        state.failure.unwrap().kind,
        FailureKind::AuthenticationFailure
    );
    assert_eq!(harness.factory.live_sessions(), 0);
    assert_eq!(harness.sink.count(NotificationVariant::Failure), 1);
}

#[tokio::test]
async fn test_missing_port_starts_nothing() {
    let harness = start("host=10.0.0.5&password=x&serverId=42", fast_settings());

    harness.handle.connect().unwrap();
    let state = wait_until(&harness.handle, |s| s.failure.is_some()).await;

    assert_eq!(state.phase, Phase::Idle);
    assert_eq!(state.error_detail(), Some("missing connection parameters"));
    assert_eq!(state.failure.unwrap().kind, FailureKind::MissingParameters);
    assert_eq!(harness.registry.load_count(), 0);
    assert!(harness.factory.sessions().is_empty());
    assert_eq!(harness.sink.count(NotificationVariant::Failure), 1);
}

#[tokio::test]
async fn test_reconnect_disconnects_before_next_create() {
    let harness = start(VALID, fast_settings());
    connected(&harness).await;

    harness.handle.reconnect().unwrap();
    wait_phase(&harness.handle, Phase::Connecting).await;

    assert_eq!(
        harness.factory.log().calls(),
        vec![
            Call::Load,
            Call::Create { session: 0 },
            Call::Disconnect { session: 0 },
            Call::Clear,
            Call::Load,
            Call::Create { session: 1 },
        ]
    );
    assert_eq!(harness.factory.live_sessions(), 1);
}

#[tokio::test]
async fn test_reconnect_after_unclean_disconnect() {
    let harness = start(VALID, fast_settings());
    connected(&harness).await;

    harness
        .factory
        .latest()
        .unwrap()
        .emit(ProtocolEvent::Disconnect { clean: false });
    let state = wait_phase(&harness.handle, Phase::Disconnected { clean: false }).await;
    assert_eq!(state.error_detail(), Some("connection lost unexpectedly"));
    assert_eq!(harness.factory.live_sessions(), 0);

    harness.handle.reconnect().unwrap();
    let state = wait_phase(&harness.handle, Phase::Connecting).await;
    assert!(state.error_detail().is_none());
    assert_eq!(
        state.previous_failure.unwrap().detail,
        "connection lost unexpectedly"
    );

    harness
        .factory
        .latest()
        .unwrap()
        .emit(ProtocolEvent::Connect);
    wait_phase(&harness.handle, Phase::Connected).await;

    assert_eq!(harness.registry.load_count(), 2);
    assert_eq!(harness.factory.log().count(&Call::Clear), 1);
    assert_eq!(harness.sink.count(NotificationVariant::Success), 2);
}

#[tokio::test]
async fn test_clean_disconnect_is_neutral_without_detail() {
    let harness = start(VALID, fast_settings());
    connected(&harness).await;

    harness
        .factory
        .latest()
        .unwrap()
        .emit(ProtocolEvent::Disconnect { clean: true });
    let state = wait_phase(&harness.handle, Phase::Disconnected { clean: true }).await;

    assert!(state.error_detail().is_none());
    assert_eq!(harness.sink.count(NotificationVariant::Neutral), 1);
    assert_eq!(harness.sink.count(NotificationVariant::Failure), 0);
}

#[tokio::test]
async fn test_stale_events_are_ignored() {
    let harness = start(VALID, fast_settings());
    connected(&harness).await;
    let old = harness.factory.latest().unwrap();

    harness.handle.reconnect().unwrap();
    wait_phase(&harness.handle, Phase::Connecting).await;

    old.emit(ProtocolEvent::Disconnect { clean: false });
    old.emit(ProtocolEvent::SecurityFailure {
        reason: "late".to_string(),
    });
    harness
        .factory
        .latest()
        .unwrap()
        .emit(ProtocolEvent::Connect);
    let state = wait_phase(&harness.handle, Phase::Connected).await;

    assert!(state.failure.is_none());
    assert_eq!(harness.sink.count(NotificationVariant::Failure), 0);
}

#[tokio::test]
async fn test_surface_budget_exhaustion() {
    let harness = start(VALID, fast_settings());
    harness.slot.unmount();

    harness.handle.connect().unwrap();
    let state = wait_phase(&harness.handle, Phase::Disconnected { clean: false }).await;

    assert_eq!(state.error_detail(), Some("display surface not ready"));
    assert_eq!(state.failure.unwrap().kind, FailureKind::SurfaceTimeout);
    assert!(harness.factory.sessions().is_empty());
}

#[tokio::test]
async fn test_surface_mounted_late_still_connects() {
    let mut settings = fast_settings();
    settings.surface.max_attempts = 50;
    let harness = start(VALID, settings);
    harness.slot.unmount();

    harness.handle.connect().unwrap();
    wait_phase(&harness.handle, Phase::AwaitingSurface).await;
    harness.slot.mount(RenderTarget::new("late-canvas"));

    wait_phase(&harness.handle, Phase::Connecting).await;
    assert_eq!(harness.factory.latest().unwrap().target_id, "late-canvas");
}

#[tokio::test]
async fn test_library_load_failure() {
    let harness = start(VALID, fast_settings());
    harness
        .registry
        .set_behaviour(LoadBehaviour::Fail("script blocked".to_string()));

    harness.handle.connect().unwrap();
    let state = wait_phase(&harness.handle, Phase::Disconnected { clean: false }).await;

    assert_eq!(state.error_detail(), Some("library load failed"));
    assert_eq!(state.failure.unwrap().kind, FailureKind::LibraryLoadFailure);
    assert!(!harness.registry.has_factory());
}

#[tokio::test]
async fn test_library_without_constructor_is_load_failure() {
    let harness = start(VALID, fast_settings());
    harness
        .registry
        .set_behaviour(LoadBehaviour::SucceedWithoutFactory);

    harness.handle.connect().unwrap();
    let state = wait_phase(&harness.handle, Phase::Disconnected { clean: false }).await;

    assert_eq!(state.failure.unwrap().kind, FailureKind::LibraryLoadFailure);
}

#[tokio::test]
async fn test_session_construction_failure() {
    let harness = start(VALID, fast_settings());
    harness.factory.fail_create("constructor threw");

    harness.handle.connect().unwrap();
    let state = wait_phase(&harness.handle, Phase::Disconnected { clean: false }).await;

    assert_eq!(state.error_detail(), Some("constructor threw"));
    assert_eq!(state.failure.unwrap().kind, FailureKind::TransportFailure);
}

#[tokio::test]
async fn test_connect_timeout() {
    let mut settings = fast_settings();
    settings.timeouts.connect_ms = 100;
    let harness = start(VALID, settings);

    harness.handle.connect().unwrap();
    let state = wait_phase(&harness.handle, Phase::Disconnected { clean: false }).await;

    assert_eq!(state.error_detail(), Some("connection timed out"));
    assert_eq!(harness.factory.live_sessions(), 0);
}

#[tokio::test]
async fn test_event_during_create_is_not_missed() {
    let harness = start(VALID, fast_settings());
    harness.factory.auto_emit(Some(ProtocolEvent::Connect));

    harness.handle.connect().unwrap();

    wait_phase(&harness.handle, Phase::Connected).await;
}

#[tokio::test]
async fn test_reconnect_aborts_hanging_load() {
    let harness = start(VALID, fast_settings());
    harness.registry.set_behaviour(LoadBehaviour::Hang);
    harness.handle.connect().unwrap();
    wait_phase(&harness.handle, Phase::LoadingLibrary).await;

    harness.registry.set_behaviour(LoadBehaviour::Succeed);
    harness.handle.reconnect().unwrap();

    wait_phase(&harness.handle, Phase::Connecting).await;
    assert_eq!(harness.registry.load_count(), 2);
}

#[tokio::test]
async fn test_unmount_disposes_and_stops() {
    let harness = start(VALID, fast_settings());
    connected(&harness).await;

    harness.handle.unmount().unwrap();
    tokio::time::timeout(WAIT, harness.handle.stopped())
        .await
        .expect("bridge did not stop");

    assert!(!harness.handle.is_running());
    assert_eq!(harness.factory.live_sessions(), 0);
    assert_eq!(harness.handle.state().phase, Phase::Idle);
    assert!(harness.handle.connect().is_err());
}

#[tokio::test]
async fn test_dropping_handles_unmounts() {
    let harness = start(VALID, fast_settings());
    connected(&harness).await;
    let mut rx = harness.handle.subscribe();
    let factory = Arc::clone(&harness.factory);

    drop(harness);

    let closed = tokio::time::timeout(WAIT, async {
        while rx.changed().await.is_ok() {}
    })
    .await;
    assert!(closed.is_ok());
    assert_eq!(factory.live_sessions(), 0);
}

#[tokio::test]
async fn test_console_view_follows_bridge() {
    let harness = start(VALID, fast_settings());
    let mut view = ConsoleView::new(
        harness.handle.clone(),
        UiCapabilities {
            fullscreen: true,
            verbose_diagnostics: true,
        },
    );
    assert_eq!(view.status(), StatusIndicator::Disconnected);

    connected(&harness).await;
    assert_eq!(view.status(), StatusIndicator::Connected);
    assert!(view.error_panel().is_none());
    assert_eq!(view.toggle_fullscreen(), Some(true));
    assert!(view.diagnostics().unwrap().contains("connected"));

    harness
        .factory
        .latest()
        .unwrap()
        .emit(ProtocolEvent::SecurityFailure {
            reason: "unsupported security type".to_string(),
        });
    wait_phase(&harness.handle, Phase::Disconnected { clean: false }).await;

    let panel = view.error_panel().unwrap();
    assert_eq!(panel.kind, FailureKind::SecurityFailure);
    assert_eq!(panel.detail, "unsupported security type");
    assert!(panel.retryable);

    view.reconnect().unwrap();
    wait_phase(&harness.handle, Phase::Connecting).await;
    assert_eq!(view.status(), StatusIndicator::Connecting);
}

#[tokio::test]
async fn test_fullscreen_requires_capability() {
    let harness = start(VALID, fast_settings());
    let mut view = ConsoleView::new(harness.handle.clone(), UiCapabilities::default());

    assert_eq!(view.toggle_fullscreen(), None);
    assert!(!view.is_fullscreen());
    assert!(view.diagnostics().is_none());
}

#[tokio::test]
async fn test_bridges_sharing_a_registry_load_the_library_once() {
    let factory = Arc::new(FakeFactory::new());
    let registry = Arc::new(FakeRegistry::new(Arc::clone(&factory)));
    registry.set_load_delay(Duration::from_millis(50));
    let slot = SurfaceSlot::new();
    slot.mount(RenderTarget::new("screen"));

    let first = spawn_bridge(
        VALID,
        fast_settings(),
        &registry,
        Arc::new(slot.clone()),
        Arc::new(RecordingSink::default()),
    );
    let second = spawn_bridge(
        VALID,
        fast_settings(),
        &registry,
        Arc::new(slot.clone()),
        Arc::new(RecordingSink::default()),
    );

    first.connect().unwrap();
    second.connect().unwrap();
    wait_phase(&first, Phase::Connecting).await;
    wait_phase(&second, Phase::Connecting).await;

    assert_eq!(registry.load_count(), 1);
    assert_eq!(factory.sessions().len(), 2);
}

#[tokio::test]
async fn test_reload_on_one_bridge_does_not_race_anothers_load() {
    let factory = Arc::new(FakeFactory::new());
    let registry = Arc::new(FakeRegistry::new(Arc::clone(&factory)));
    let slot = SurfaceSlot::new();
    slot.mount(RenderTarget::new("screen"));

    let first = spawn_bridge(
        VALID,
        fast_settings(),
        &registry,
        Arc::new(slot.clone()),
        Arc::new(RecordingSink::default()),
    );
    first.connect().unwrap();
    wait_phase(&first, Phase::Connecting).await;
    factory.latest().unwrap().emit(ProtocolEvent::Connect);
    wait_phase(&first, Phase::Connected).await;

    registry.set_load_delay(Duration::from_millis(50));
    let second = spawn_bridge(
        VALID,
        fast_settings(),
        &registry,
        Arc::new(slot.clone()),
        Arc::new(RecordingSink::default()),
    );
    first.reconnect().unwrap();
    second.connect().unwrap();

    wait_phase(&first, Phase::Connecting).await;
    wait_phase(&second, Phase::Connecting).await;

    // Every clear is followed by its own load before anyone else touches
    // the registry.
    let calls: Vec<Call> = factory
        .log()
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::Load | Call::Clear))
        .collect();
    assert_eq!(calls, vec![Call::Load, Call::Clear, Call::Load]);
    assert!(registry.has_factory());
}

#[tokio::test]
async fn test_zero_surface_interval_does_not_hang_the_bridge() {
    let mut settings = fast_settings();
    settings.surface.interval_ms = 0;
    let harness = start(VALID, settings);

    harness.handle.connect().unwrap();

    wait_phase(&harness.handle, Phase::Connecting).await;
    assert_eq!(harness.factory.sessions().len(), 1);
}

struct PanickingSurface;

impl SurfaceProbe for PanickingSurface {
    fn lookup(&self) -> Option<RenderTarget> {
        panic!("render target lookup failed");
    }
}

#[tokio::test]
async fn test_panicking_surface_lookup_ends_the_attempt() {
    let factory = Arc::new(FakeFactory::new());
    let registry = Arc::new(FakeRegistry::new(Arc::clone(&factory)));
    let sink = Arc::new(RecordingSink::default());
    let handle = spawn_bridge(
        VALID,
        fast_settings(),
        &registry,
        Arc::new(PanickingSurface),
        sink.clone(),
    );

    handle.connect().unwrap();

    let state = wait_phase(&handle, Phase::Disconnected { clean: false }).await;
    assert_eq!(state.failure.unwrap().kind, FailureKind::SurfaceTimeout);
    assert_eq!(sink.count(NotificationVariant::Failure), 1);
    assert!(factory.sessions().is_empty());
}
