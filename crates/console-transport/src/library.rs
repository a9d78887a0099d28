//! Protocol-client library bootstrap.
//!
//! The library's constructor lives in a process-wide [`LibraryRegistry`]
//! shared by every console in the process. [`ProtocolLibraryLoader`] makes
//! sure it is present before a session is created:
//!
//! - if a factory is already registered the loader returns it immediately;
//! - otherwise it performs exactly one `load()`, serialised on the
//!   registry's own load guard so every loader over the same registry takes
//!   turns;
//! - [`ProtocolLibraryLoader::reload`] clears the registry first so a stale,
//!   half-initialised library can never satisfy the check.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;

use console_core::prelude::*;

use crate::session::SessionFactory;
use crate::tunnel::TunnelSessionFactory;

/// Upper bound on a single library load.
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Global binding point for the protocol-client library
#[trait_variant::make(LibraryRegistry: Send)]
pub trait LocalLibraryRegistry {
    /// Whether a session factory is currently registered
    fn is_loaded(&self) -> bool;

    /// The registered session factory, if any
    fn factory(&self) -> Option<Arc<dyn SessionFactory>>;

    /// Bring the library in and register its factory
    async fn load(&self) -> Result<()>;

    /// Remove the library and every binding it registered
    fn clear(&self);

    /// Held across every load and clear. Lives with the registry so that
    /// independent loaders sharing it cannot race each other.
    fn load_guard(&self) -> &Mutex<()>;
}

/// Loads the protocol-client library on demand.
///
/// Loads and reloads are serialised on [`LibraryRegistry::load_guard`].
pub struct ProtocolLibraryLoader<R> {
    registry: Arc<R>,
    load_timeout: Duration,
}

impl<R> Clone for ProtocolLibraryLoader<R> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            load_timeout: self.load_timeout,
        }
    }
}

impl<R> std::fmt::Debug for ProtocolLibraryLoader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolLibraryLoader")
            .field("load_timeout", &self.load_timeout)
            .finish_non_exhaustive()
    }
}

impl<R: LibraryRegistry + Sync + 'static> ProtocolLibraryLoader<R> {
    pub fn new(registry: Arc<R>) -> Self {
        Self {
            registry,
            load_timeout: DEFAULT_LOAD_TIMEOUT,
        }
    }

    pub fn with_load_timeout(mut self, load_timeout: Duration) -> Self {
        self.load_timeout = load_timeout;
        self
    }

    pub fn registry(&self) -> &Arc<R> {
        &self.registry
    }

    pub fn is_loaded(&self) -> bool {
        self.registry.is_loaded()
    }

    /// Return the registered session factory, loading the library first if
    /// needed.
    ///
    /// # Errors
    ///
    /// [`Error::LibraryLoad`] if the load fails, times out, or completes
    /// without registering a factory.
    pub async fn ensure_loaded(&self) -> Result<Arc<dyn SessionFactory>> {
        if let Some(factory) = self.registry.factory() {
            debug!("Protocol library already loaded");
            return Ok(factory);
        }

        let _guard = self.registry.load_guard().lock().await;

        // A concurrent caller may have finished loading while we waited.
        if let Some(factory) = self.registry.factory() {
            debug!("Protocol library loaded by a concurrent caller");
            return Ok(factory);
        }

        self.load_locked().await
    }

    /// Discard whatever is registered and load the library from scratch.
    pub async fn reload(&self) -> Result<Arc<dyn SessionFactory>> {
        let _guard = self.registry.load_guard().lock().await;
        debug!("Clearing protocol library before forced reload");
        self.registry.clear();
        self.load_locked().await
    }

    /// Caller must hold the registry's load guard.
    async fn load_locked(&self) -> Result<Arc<dyn SessionFactory>> {
        info!("Loading protocol library");
        let outcome = tokio::time::timeout(self.load_timeout, self.registry.load()).await;

        let error = match outcome {
            Ok(Ok(())) => {
                return self.registry.factory().ok_or_else(|| {
                    warn!("Protocol library finished loading but registered no factory");
                    Error::library_load("library loaded but registered no session factory")
                });
            }
            Ok(Err(err @ Error::LibraryLoad { .. })) => err,
            Ok(Err(err)) => Error::library_load(err.to_string()),
            Err(_) => Error::library_load(format!(
                "load timed out after {}ms",
                self.load_timeout.as_millis()
            )),
        };

        warn!("Protocol library load failed: {}", error);
        // Leave nothing half-registered behind for the next attempt.
        self.registry.clear();
        Err(error)
    }
}

/// Registry for the built-in WebSocket tunnel library
#[derive(Debug, Default)]
pub struct TunnelLibrary {
    installed: RwLock<Option<Arc<dyn SessionFactory>>>,
    loads: AtomicUsize,
    guard: Mutex<()>,
}

impl TunnelLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed loads since creation
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    fn installed(&self) -> Option<Arc<dyn SessionFactory>> {
        self.installed
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl LibraryRegistry for TunnelLibrary {
    fn is_loaded(&self) -> bool {
        self.installed().is_some()
    }

    fn factory(&self) -> Option<Arc<dyn SessionFactory>> {
        self.installed()
    }

    async fn load(&self) -> Result<()> {
        {
            let mut installed = self.installed.write().unwrap_or_else(|e| e.into_inner());
            *installed = Some(Arc::new(TunnelSessionFactory::new()));
        }
        let loads = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Tunnel library registered (load #{})", loads);
        Ok(())
    }

    fn clear(&self) {
        let mut installed = self.installed.write().unwrap_or_else(|e| e.into_inner());
        *installed = None;
    }

    fn load_guard(&self) -> &Mutex<()> {
        &self.guard
    }
}
