//! Test utilities for transport types
//!
//! Provides an in-memory library registry and a session factory whose
//! sessions are driven by the test. Every create/disconnect/load/clear call
//! is appended to a shared [`CallLog`] so ordering can be asserted.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use url::Url;

use console_core::prelude::*;

use crate::library::LibraryRegistry;
use crate::session::{
    ProtocolEvent, ProtocolSession, RenderTarget, SessionFactory, SessionListener, SessionOptions,
};

/// One observable call made by the bridge on the fakes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Load,
    Clear,
    Create { session: usize },
    Disconnect { session: usize },
}

/// Ordered record of calls shared by the fakes
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn push(&self, call: Call) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }
}

/// How [`FakeRegistry::load`] behaves
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadBehaviour {
    /// Register the fake factory
    Succeed,
    /// Return a load error with this reason
    Fail(String),
    /// Report success without registering anything
    SucceedWithoutFactory,
    /// Never complete
    Hang,
}

/// In-memory [`LibraryRegistry`] installing a [`FakeFactory`]
#[derive(Debug)]
pub struct FakeRegistry {
    installed: RwLock<Option<Arc<dyn SessionFactory>>>,
    factory: Arc<FakeFactory>,
    behaviour: Mutex<LoadBehaviour>,
    load_delay: Mutex<Duration>,
    loads: AtomicUsize,
    load_guard: tokio::sync::Mutex<()>,
    log: CallLog,
}

impl FakeRegistry {
    pub fn new(factory: Arc<FakeFactory>) -> Self {
        let log = factory.log().clone();
        Self {
            installed: RwLock::new(None),
            factory,
            behaviour: Mutex::new(LoadBehaviour::Succeed),
            load_delay: Mutex::new(Duration::ZERO),
            loads: AtomicUsize::new(0),
            load_guard: tokio::sync::Mutex::new(()),
            log,
        }
    }

    pub fn set_behaviour(&self, behaviour: LoadBehaviour) {
        *self.behaviour.lock().unwrap_or_else(|e| e.into_inner()) = behaviour;
    }

    pub fn set_load_delay(&self, delay: Duration) {
        *self.load_delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn has_factory(&self) -> bool {
        self.installed().is_some()
    }

    fn installed(&self) -> Option<Arc<dyn SessionFactory>> {
        self.installed
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl LibraryRegistry for FakeRegistry {
    fn is_loaded(&self) -> bool {
        self.installed().is_some()
    }

    fn factory(&self) -> Option<Arc<dyn SessionFactory>> {
        self.installed()
    }

    async fn load(&self) -> Result<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.log.push(Call::Load);

        let delay = *self.load_delay.lock().unwrap_or_else(|e| e.into_inner());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let behaviour = self
            .behaviour
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match behaviour {
            LoadBehaviour::Succeed => {
                let factory: Arc<dyn SessionFactory> = self.factory.clone();
                *self.installed.write().unwrap_or_else(|e| e.into_inner()) = Some(factory);
                Ok(())
            }
            LoadBehaviour::Fail(reason) => Err(Error::library_load(reason)),
            LoadBehaviour::SucceedWithoutFactory => Ok(()),
            LoadBehaviour::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }

    fn clear(&self) {
        self.log.push(Call::Clear);
        *self.installed.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn load_guard(&self) -> &tokio::sync::Mutex<()> {
        &self.load_guard
    }
}

/// Handle to a session created by [`FakeFactory`]; the test drives it
#[derive(Debug, Clone)]
pub struct FakeSessionHandle {
    pub index: usize,
    pub url: Url,
    pub target_id: String,
    pub options: SessionOptions,
    listener: SessionListener,
    disconnected: Arc<AtomicBool>,
}

impl FakeSessionHandle {
    /// Deliver a protocol event as the library would
    pub fn emit(&self, event: ProtocolEvent) {
        self.listener.emit(event);
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

/// Session factory recording every session it creates
#[derive(Debug, Default)]
pub struct FakeFactory {
    sessions: Mutex<Vec<FakeSessionHandle>>,
    fail_create: Mutex<Option<String>>,
    auto_event: Mutex<Option<ProtocolEvent>>,
    log: CallLog,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }

    /// Make every following `create` fail with `reason`
    pub fn fail_create(&self, reason: impl Into<String>) {
        *self.fail_create.lock().unwrap_or_else(|e| e.into_inner()) = Some(reason.into());
    }

    /// Emit `event` from every following session right after creation
    pub fn auto_emit(&self, event: Option<ProtocolEvent>) {
        *self.auto_event.lock().unwrap_or_else(|e| e.into_inner()) = event;
    }

    pub fn sessions(&self) -> Vec<FakeSessionHandle> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn session(&self, index: usize) -> Option<FakeSessionHandle> {
        self.sessions().get(index).cloned()
    }

    pub fn latest(&self) -> Option<FakeSessionHandle> {
        self.sessions().last().cloned()
    }

    /// Sessions created and not yet disconnected
    pub fn live_sessions(&self) -> usize {
        self.sessions()
            .iter()
            .filter(|s| !s.is_disconnected())
            .count()
    }
}

impl SessionFactory for FakeFactory {
    fn create(
        &self,
        target: RenderTarget,
        url: &Url,
        options: SessionOptions,
        listener: SessionListener,
    ) -> Result<Box<dyn ProtocolSession>> {
        if let Some(reason) = self
            .fail_create
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
        {
            return Err(Error::transport(reason));
        }

        let disconnected = Arc::new(AtomicBool::new(false));
        let handle = {
            let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
            let handle = FakeSessionHandle {
                index: sessions.len(),
                url: url.clone(),
                target_id: target.id().to_string(),
                options,
                listener,
                disconnected: Arc::clone(&disconnected),
            };
            sessions.push(handle.clone());
            handle
        };
        self.log.push(Call::Create {
            session: handle.index,
        });

        let auto_event = self
            .auto_event
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(event) = auto_event {
            handle.emit(event);
        }

        Ok(Box::new(FakeSession {
            index: handle.index,
            disconnected,
            log: self.log.clone(),
        }))
    }
}

#[derive(Debug)]
struct FakeSession {
    index: usize,
    disconnected: Arc<AtomicBool>,
    log: CallLog,
}

impl ProtocolSession for FakeSession {
    fn disconnect(&mut self) {
        if !self.disconnected.swap(true, Ordering::SeqCst) {
            self.log.push(Call::Disconnect {
                session: self.index,
            });
        }
    }
}
