//! Bridge runtime - executes [`UpdateAction`]s and feeds results back as
//! [`Message`]s.
//!
//! One [`SessionBridge`] task owns the [`BridgeState`] and the live protocol
//! session. Operator commands arrive through a [`BridgeHandle`]; library
//! loads, surface polling, connect timeouts and protocol events run in
//! spawned tasks that report back on an internal channel. Messages are
//! processed strictly one at a time.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use url::Url;

use console_core::prelude::*;
use console_transport::{
    DisplaySurfaceGate, LibraryRegistry, ProtocolLibraryLoader, ProtocolSession, RenderTarget,
    SessionFactory, SessionListener, SessionOptions, SurfaceProbe,
};

use crate::handler::{update, UpdateAction};
use crate::message::{Generation, Message};
use crate::notify::NotificationSink;
use crate::state::{BridgeState, SessionState};

/// The live protocol session and the cycle it belongs to
#[derive(Debug)]
struct TransportHandle {
    generation: Generation,
    session: Box<dyn ProtocolSession>,
}

/// Runtime for one mounted console
pub struct SessionBridge<R> {
    state: BridgeState,
    loader: ProtocolLibraryLoader<R>,
    gate: DisplaySurfaceGate,
    sink: Arc<dyn NotificationSink>,
    connect_timeout: Duration,

    transport: Option<TransportHandle>,
    attempt_tasks: Vec<JoinHandle<()>>,

    mounted_tx: watch::Sender<bool>,
    state_tx: watch::Sender<SessionState>,
    msg_tx: mpsc::UnboundedSender<Message>,
    msg_rx: mpsc::UnboundedReceiver<Message>,
}

impl<R> std::fmt::Debug for SessionBridge<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBridge")
            .field("phase", &self.state.phase())
            .field("generation", &self.state.generation)
            .field("transport", &self.transport)
            .field("attempt_tasks", &self.attempt_tasks.len())
            .finish_non_exhaustive()
    }
}

impl<R: LibraryRegistry + Sync + 'static> SessionBridge<R> {
    /// Build a runtime. Timeouts and the surface budget come from
    /// `state.settings`, clamped to their minimums.
    pub fn new(
        mut state: BridgeState,
        loader: ProtocolLibraryLoader<R>,
        probe: Arc<dyn SurfaceProbe>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        state.settings = state.settings.clone().clamped();
        let settings = &state.settings;
        let loader = loader.with_load_timeout(settings.library_load_timeout());
        let gate = DisplaySurfaceGate::new(probe)
            .with_budget(settings.surface.max_attempts, settings.surface_interval());
        let connect_timeout = settings.connect_timeout();

        let (mounted_tx, _) = watch::channel(true);
        let (state_tx, _) = watch::channel(state.session.clone());
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();

        Self {
            state,
            loader,
            gate,
            sink,
            connect_timeout,
            transport: None,
            attempt_tasks: Vec::new(),
            mounted_tx,
            state_tx,
            msg_tx,
            msg_rx,
        }
    }

    /// Spawn the runtime on the current tokio runtime
    pub fn spawn(self) -> BridgeHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let handle = BridgeHandle {
            cmd_tx,
            state_rx: self.state_tx.subscribe(),
        };
        tokio::spawn(self.run(cmd_rx));
        handle
    }

    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Message>) {
        debug!("Console bridge started");

        loop {
            let message = tokio::select! {
                biased;

                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => cmd,
                    None => {
                        debug!("All bridge handles dropped, unmounting");
                        Message::Unmount
                    }
                },

                Some(msg) = self.msg_rx.recv() => msg,
            };

            if self.process(message) {
                break;
            }
        }

        debug!("Console bridge stopped");
    }

    /// Run a message and its follow-ups through `update`. Returns true once
    /// the runtime should stop.
    fn process(&mut self, message: Message) -> bool {
        let mut stop = false;
        let mut next = Some(message);

        while let Some(message) = next.take() {
            let result = update(&mut self.state, message);
            for action in result.actions {
                stop |= self.execute(action);
            }
            self.publish();
            next = result.message;
        }

        stop
    }

    fn publish(&self) {
        let snapshot = &self.state.session;
        self.state_tx.send_if_modified(|current| {
            if current == snapshot {
                false
            } else {
                *current = snapshot.clone();
                true
            }
        });
    }

    fn execute(&mut self, action: UpdateAction) -> bool {
        match action {
            UpdateAction::LoadLibrary {
                generation,
                force_reload,
            } => self.spawn_library_load(generation, force_reload),

            UpdateAction::AwaitSurface { generation } => self.spawn_surface_wait(generation),

            UpdateAction::OpenTransport {
                generation,
                factory,
                target,
                url,
                options,
            } => self.open_transport(generation, factory, target, url, options),

            UpdateAction::DisposeTransport => self.dispose_transport(),

            UpdateAction::CancelAttempt => self.cancel_attempt(),

            UpdateAction::Notify(notification) => self.sink.notify(notification),

            UpdateAction::Stop => {
                self.mounted_tx.send_replace(false);
                return true;
            }
        }
        false
    }

    fn spawn_library_load(&mut self, generation: Generation, force_reload: bool) {
        let loader = self.loader.clone();

        self.spawn_attempt(
            async move {
                let result = if force_reload {
                    loader.reload().await
                } else {
                    loader.ensure_loaded().await
                };
                Some(match result {
                    Ok(factory) => Message::LibraryReady {
                        generation,
                        factory,
                    },
                    Err(e) => Message::LibraryLoadFailed {
                        generation,
                        reason: e.to_string(),
                    },
                })
            },
            Message::LibraryLoadFailed {
                generation,
                reason: "library load panicked".to_string(),
            },
        );
    }

    fn spawn_surface_wait(&mut self, generation: Generation) {
        let gate = self.gate.clone();
        let mounted = self.mounted_tx.subscribe();
        let max_attempts = gate.max_attempts();

        self.spawn_attempt(
            async move {
                match gate.await_ready(mounted).await {
                    Ok(target) => Some(Message::SurfaceReady { generation, target }),
                    Err(Error::Cancelled) => None,
                    Err(Error::SurfaceTimeout { attempts }) => Some(Message::SurfaceTimedOut {
                        generation,
                        attempts,
                    }),
                    Err(e) => {
                        warn!("Display surface wait failed: {}", e);
                        Some(Message::SurfaceTimedOut {
                            generation,
                            attempts: max_attempts,
                        })
                    }
                }
            },
            Message::SurfaceTimedOut {
                generation,
                attempts: max_attempts,
            },
        );
    }

    fn open_transport(
        &mut self,
        generation: Generation,
        factory: Arc<dyn SessionFactory>,
        target: RenderTarget,
        url: Url,
        options: SessionOptions,
    ) {
        // Never two live sessions.
        self.dispose_transport();

        let listener = {
            let tx = self.msg_tx.clone();
            SessionListener::new(move |event| {
                let _ = tx.send(Message::Protocol { generation, event });
            })
        };

        match factory.create(target, &url, options, listener) {
            Ok(session) => {
                debug!("Protocol session created (generation {})", generation);
                self.transport = Some(TransportHandle {
                    generation,
                    session,
                });
                self.spawn_connect_timer(generation);
            }
            Err(e) => {
                let reason = match e {
                    Error::Transport { message } => message,
                    other => other.to_string(),
                };
                let _ = self
                    .msg_tx
                    .send(Message::TransportFailed { generation, reason });
            }
        }
    }

    fn spawn_connect_timer(&mut self, generation: Generation) {
        let timeout = self.connect_timeout;
        let tx = self.msg_tx.clone();

        self.track(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(Message::ConnectTimedOut { generation });
        }));
    }

    /// Spawn one step of an attempt. Its message is reported back, and a
    /// panic reports `on_panic` instead so the attempt still terminates.
    fn spawn_attempt<F>(&mut self, step: F, on_panic: Message)
    where
        F: Future<Output = Option<Message>> + Send + 'static,
    {
        let tx = self.msg_tx.clone();

        self.track(tokio::spawn(async move {
            let message = match AssertUnwindSafe(step).catch_unwind().await {
                Ok(message) => message,
                Err(_) => {
                    error!("Attempt task panicked; ending the attempt");
                    Some(on_panic)
                }
            };
            if let Some(message) = message {
                let _ = tx.send(message);
            }
        }));
    }

    fn track(&mut self, task: JoinHandle<()>) {
        self.attempt_tasks.retain(|t| !t.is_finished());
        self.attempt_tasks.push(task);
    }
}

impl<R> SessionBridge<R> {
    fn dispose_transport(&mut self) {
        if let Some(mut handle) = self.transport.take() {
            debug!(
                "Disposing protocol session (generation {})",
                handle.generation
            );
            handle.session.disconnect();
        }
    }

    fn cancel_attempt(&mut self) {
        for task in self.attempt_tasks.drain(..) {
            task.abort();
        }
    }
}

impl<R> Drop for SessionBridge<R> {
    fn drop(&mut self) {
        self.mounted_tx.send_replace(false);
        self.cancel_attempt();
        self.dispose_transport();
    }
}

/// Cloneable control surface for a running [`SessionBridge`].
///
/// Dropping every handle unmounts the console.
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    cmd_tx: mpsc::UnboundedSender<Message>,
    state_rx: watch::Receiver<SessionState>,
}

impl BridgeHandle {
    pub fn connect(&self) -> Result<()> {
        self.send(Message::Connect)
    }

    pub fn reconnect(&self) -> Result<()> {
        self.send(Message::Reconnect)
    }

    pub fn unmount(&self) -> Result<()> {
        self.send(Message::Unmount)
    }

    /// Latest published state
    pub fn state(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Wait until the published state satisfies `predicate`
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&SessionState) -> bool,
    ) -> Result<SessionState> {
        let mut rx = self.state_rx.clone();
        let state = rx
            .wait_for(|state| predicate(state))
            .await
            .map_err(|_| Error::ChannelClosed)?;
        Ok(state.clone())
    }

    pub fn is_running(&self) -> bool {
        !self.cmd_tx.is_closed()
    }

    /// Resolves once the runtime has exited
    pub async fn stopped(&self) {
        self.cmd_tx.closed().await
    }

    fn send(&self, message: Message) -> Result<()> {
        self.cmd_tx
            .send(message)
            .map_err(|e| Error::channel_send(format!("bridge is not running: {:?}", e.0)))
    }
}
