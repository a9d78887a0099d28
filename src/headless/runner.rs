//! Headless mode runner - drives one console from the command line
//!
//! Mounts a headless render target that counts received console bytes,
//! connects through the built-in tunnel library and relays operator
//! commands read from stdin. `send <text>` writes raw text to the console.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use url::Url;

use console_app::{BridgeSettings, BridgeState, ConsoleView, SessionBridge, SessionState, UiCapabilities};
use console_core::prelude::Result;
use console_core::LaunchContext;
use console_transport::{PageOrigin, ProtocolLibraryLoader, RenderTarget, SurfaceSlot, TunnelLibrary};

use super::{HeadlessEvent, HeadlessSink};

const RENDER_TARGET_ID: &str = "headless";
const FRAME_BUFFER: usize = 64;
const INPUT_BUFFER: usize = 16;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Operator command read from stdin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadlessCommand {
    Reconnect,
    Fullscreen,
    Status,
    /// Raw text for the console
    Input(String),
    Quit,
}

/// Parse one stdin line. Empty and unknown lines yield `None`.
pub fn parse_command(line: &str) -> Option<HeadlessCommand> {
    let line = line.trim();
    if let Some(text) = line.strip_prefix("send ") {
        return Some(HeadlessCommand::Input(text.to_string()));
    }
    match line {
        "r" | "reconnect" => Some(HeadlessCommand::Reconnect),
        "f" | "fullscreen" => Some(HeadlessCommand::Fullscreen),
        "s" | "status" => Some(HeadlessCommand::Status),
        "q" | "quit" => Some(HeadlessCommand::Quit),
        _ => None,
    }
}

/// Run one console session until the operator quits.
///
/// Returns the last session state; a configuration error ends the run
/// immediately.
pub async fn run_headless(page_url: &Url, settings: BridgeSettings) -> Result<SessionState> {
    info!("═══════════════════════════════════════════════════════");
    info!("Console bridge starting in HEADLESS mode");
    info!("Page origin: {}", page_url.origin().ascii_serialization());
    info!("═══════════════════════════════════════════════════════");

    let origin = PageOrigin::from_page_url(page_url)?;
    let context = LaunchContext::from_url(page_url);
    let capabilities = UiCapabilities::from(&settings.ui);
    let state = BridgeState::from_launch(&context, origin, settings);

    let slot = SurfaceSlot::new();
    let bytes_received = Arc::new(AtomicU64::new(0));
    let (frames_tx, frames_rx) = mpsc::channel(FRAME_BUFFER);
    let (input_tx, input_rx) = mpsc::channel(INPUT_BUFFER);
    slot.mount(
        RenderTarget::new(RENDER_TARGET_ID)
            .with_frame_output(frames_tx)
            .with_input(input_rx),
    );
    tokio::spawn(count_frames(frames_rx, Arc::clone(&bytes_received)));

    let library = Arc::new(TunnelLibrary::new());
    let loader = ProtocolLibraryLoader::new(Arc::clone(&library));
    let handle = SessionBridge::new(state, loader, Arc::new(slot.clone()), Arc::new(HeadlessSink))
        .spawn();
    let mut view = ConsoleView::new(handle.clone(), capabilities);

    let (cmd_tx, mut cmd_rx) = mpsc::channel(16);
    std::thread::spawn(move || spawn_stdin_reader_blocking(cmd_tx));

    let mut state_rx = handle.subscribe();
    handle.connect()?;

    loop {
        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    warn!("Bridge stopped unexpectedly");
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                HeadlessEvent::status(&state, bytes_received.load(Ordering::Relaxed)).emit();
                if is_configuration_error(&state) {
                    break;
                }
            }

            cmd = cmd_rx.recv() => match cmd {
                Some(HeadlessCommand::Reconnect) => {
                    if let Err(e) = view.reconnect() {
                        HeadlessEvent::error(e.to_string()).emit();
                    }
                }
                Some(HeadlessCommand::Fullscreen) => match view.toggle_fullscreen() {
                    Some(enabled) => HeadlessEvent::fullscreen(enabled).emit(),
                    None => HeadlessEvent::error("fullscreen is disabled").emit(),
                },
                Some(HeadlessCommand::Status) => {
                    HeadlessEvent::status(&view.snapshot(), bytes_received.load(Ordering::Relaxed)).emit();
                    if let Some(diagnostics) = view.diagnostics() {
                        debug!(
                            "Diagnostics: {}, library loads: {}",
                            diagnostics,
                            library.load_count()
                        );
                    }
                }
                Some(HeadlessCommand::Input(text)) => {
                    if input_tx.try_send(text.into_bytes()).is_err() {
                        HeadlessEvent::error("console input is not being read").emit();
                    }
                }
                Some(HeadlessCommand::Quit) | None => {
                    info!("Quit requested");
                    break;
                }
            },

            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    let final_state = handle.state();
    if handle.unmount().is_ok()
        && tokio::time::timeout(SHUTDOWN_GRACE, handle.stopped())
            .await
            .is_err()
    {
        warn!("Bridge did not stop within {:?}", SHUTDOWN_GRACE);
    }
    slot.unmount();

    info!("Console bridge headless mode exiting");
    Ok(final_state)
}

/// Whether the run ended on unusable launch parameters
pub fn is_configuration_error(state: &SessionState) -> bool {
    state
        .failure
        .as_ref()
        .is_some_and(|f| !f.kind.is_retryable())
}

async fn count_frames(mut frames: mpsc::Receiver<Vec<u8>>, total: Arc<AtomicU64>) {
    while let Some(frame) = frames.recv().await {
        total.fetch_add(frame.len() as u64, Ordering::Relaxed);
    }
}

/// Read operator commands from stdin (blocking; runs on its own thread)
fn spawn_stdin_reader_blocking(cmd_tx: mpsc::Sender<HeadlessCommand>) {
    use std::io::BufRead;

    let stdin = std::io::stdin();
    let reader = stdin.lock();

    for line in reader.lines() {
        match line {
            Ok(line) => match parse_command(&line) {
                Some(cmd) => {
                    debug!("Stdin: {:?}", cmd);
                    let quit = cmd == HeadlessCommand::Quit;
                    if cmd_tx.blocking_send(cmd).is_err() || quit {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => warn!("Unknown stdin command: {}", line.trim()),
            },
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        }
    }

    info!("Stdin reader exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use console_core::{Failure, FailureKind};

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("reconnect"), Some(HeadlessCommand::Reconnect));
        assert_eq!(parse_command(" r \n"), Some(HeadlessCommand::Reconnect));
        assert_eq!(parse_command("fullscreen"), Some(HeadlessCommand::Fullscreen));
        assert_eq!(parse_command("status"), Some(HeadlessCommand::Status));
        assert_eq!(parse_command("q"), Some(HeadlessCommand::Quit));
        assert_eq!(
            parse_command("send hello world\n"),
            Some(HeadlessCommand::Input("hello world".to_string()))
        );
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("reboot"), None);
    }

    #[test]
    fn test_configuration_error_detection() {
        let mut state = SessionState::default();
        assert!(!is_configuration_error(&state));

        state.failure = Some(Failure::new(FailureKind::UncleanDisconnect, "x"));
        assert!(!is_configuration_error(&state));

        state.failure = Some(Failure::new(
            FailureKind::MissingParameters,
            "missing connection parameters",
        ));
        assert!(is_configuration_error(&state));
    }
}
