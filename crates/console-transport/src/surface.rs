//! Display surface readiness gate.
//!
//! The front end mounts its render target independently of the bridge, so a
//! session can be ready to bind before anything is on screen. The gate polls
//! a [`SurfaceProbe`] at a fixed interval until the target appears or the
//! [`RetryBudget`] runs out.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use console_core::prelude::*;
use console_core::RetryBudget;

use crate::session::RenderTarget;

/// Default number of polls before giving up on the display surface
pub const DEFAULT_MAX_ATTEMPTS: u32 = 50;

/// Default delay between polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shortest delay between polls
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Looks up the render target, if mounted
#[cfg_attr(test, mockall::automock)]
pub trait SurfaceProbe: Send + Sync {
    fn lookup(&self) -> Option<RenderTarget>;
}

/// Shared slot the front end mounts its render target into
#[derive(Debug, Clone, Default)]
pub struct SurfaceSlot {
    inner: Arc<RwLock<Option<RenderTarget>>>,
}

impl SurfaceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mount(&self, target: RenderTarget) {
        debug!("Display surface '{}' mounted", target.id());
        let mut slot = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(target);
    }

    pub fn unmount(&self) {
        let mut slot = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if let Some(target) = slot.take() {
            debug!("Display surface '{}' unmounted", target.id());
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

impl SurfaceProbe for SurfaceSlot {
    fn lookup(&self) -> Option<RenderTarget> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Waits, within a bounded budget, for the render target to exist
#[derive(Clone)]
pub struct DisplaySurfaceGate {
    probe: Arc<dyn SurfaceProbe>,
    max_attempts: u32,
    interval: Duration,
}

impl std::fmt::Debug for DisplaySurfaceGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplaySurfaceGate")
            .field("max_attempts", &self.max_attempts)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl DisplaySurfaceGate {
    pub fn new(probe: Arc<dyn SurfaceProbe>) -> Self {
        Self {
            probe,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// A zero interval is raised to [`MIN_POLL_INTERVAL`].
    pub fn with_budget(mut self, max_attempts: u32, interval: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Poll until the render target is mounted.
    ///
    /// The first poll happens immediately. Every poll first checks `mounted`
    /// and stops if the console has been unmounted meanwhile.
    ///
    /// # Errors
    ///
    /// - [`Error::SurfaceTimeout`] once the budget is exhausted.
    /// - [`Error::Cancelled`] if `mounted` turns false.
    pub async fn await_ready(&self, mounted: watch::Receiver<bool>) -> Result<RenderTarget> {
        let mut budget = RetryBudget::new(self.max_attempts);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while budget.consume() {
            ticker.tick().await;

            if !*mounted.borrow() {
                debug!("Console unmounted while waiting for display surface");
                return Err(Error::Cancelled);
            }

            if let Some(target) = self.probe.lookup() {
                debug!(
                    "Display surface '{}' ready after {} poll(s)",
                    target.id(),
                    budget.attempts()
                );
                return Ok(target);
            }

            trace!(
                "Display surface not mounted yet ({}/{})",
                budget.attempts(),
                budget.max_attempts()
            );
        }

        warn!(
            "Display surface still missing after {} polls",
            budget.attempts()
        );
        Err(Error::SurfaceTimeout {
            attempts: budget.attempts(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn mounted() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(true)
    }

    #[tokio::test]
    async fn test_ready_on_first_poll() {
        let mut probe = MockSurfaceProbe::new();
        probe
            .expect_lookup()
            .times(1)
            .returning(|| Some(RenderTarget::new("screen")));

        let gate = DisplaySurfaceGate::new(Arc::new(probe));
        let (_tx, rx) = mounted();
        let target = gate.await_ready(rx).await.unwrap();

        assert_eq!(target.id(), "screen");
    }

    #[tokio::test]
    async fn test_ready_after_several_polls() {
        let polls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&polls);
        let mut probe = MockSurfaceProbe::new();
        probe.expect_lookup().times(3).returning(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 2 {
                Some(RenderTarget::new("late"))
            } else {
                None
            }
        });

        let gate = DisplaySurfaceGate::new(Arc::new(probe)).with_budget(10, Duration::from_millis(5));
        let (_tx, rx) = mounted();

        assert_eq!(gate.await_ready(rx).await.unwrap().id(), "late");
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_is_timeout() {
        let mut probe = MockSurfaceProbe::new();
        probe.expect_lookup().times(4).returning(|| None);

        let gate = DisplaySurfaceGate::new(Arc::new(probe)).with_budget(4, Duration::from_millis(1));
        let (_tx, rx) = mounted();

        let err = gate.await_ready(rx).await.unwrap_err();
        assert!(matches!(err, Error::SurfaceTimeout { attempts: 4 }));
    }

    #[tokio::test]
    async fn test_unmounted_console_cancels_without_polling() {
        let mut probe = MockSurfaceProbe::new();
        probe.expect_lookup().never();

        let gate = DisplaySurfaceGate::new(Arc::new(probe));
        let (tx, rx) = mounted();
        tx.send(false).unwrap();

        let err = gate.await_ready(rx).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn test_zero_interval_is_raised_to_minimum() {
        let mut probe = MockSurfaceProbe::new();
        probe.expect_lookup().times(3).returning(|| None);

        let gate = DisplaySurfaceGate::new(Arc::new(probe)).with_budget(3, Duration::ZERO);
        assert_eq!(gate.interval(), MIN_POLL_INTERVAL);

        let (_tx, rx) = mounted();
        let err = gate.await_ready(rx).await.unwrap_err();
        assert!(matches!(err, Error::SurfaceTimeout { attempts: 3 }));
    }

    #[tokio::test]
    async fn test_each_call_gets_a_fresh_budget() {
        let mut probe = MockSurfaceProbe::new();
        probe.expect_lookup().times(6).returning(|| None);

        let gate = DisplaySurfaceGate::new(Arc::new(probe)).with_budget(3, Duration::from_millis(1));
        let (_tx, rx) = mounted();

        assert!(gate.await_ready(rx.clone()).await.is_err());
        let err = gate.await_ready(rx).await.unwrap_err();
        assert!(matches!(err, Error::SurfaceTimeout { attempts: 3 }));
    }

    #[test]
    fn test_surface_slot_mount_unmount() {
        let slot = SurfaceSlot::new();
        assert!(!slot.is_mounted());
        assert!(slot.lookup().is_none());

        slot.mount(RenderTarget::new("canvas"));
        assert!(slot.is_mounted());
        assert_eq!(slot.lookup().unwrap().id(), "canvas");

        slot.unmount();
        assert!(!slot.is_mounted());
    }

    #[tokio::test]
    async fn test_gate_sees_surface_mounted_later() {
        let slot = SurfaceSlot::new();
        let gate = DisplaySurfaceGate::new(Arc::new(slot.clone()))
            .with_budget(50, Duration::from_millis(5));
        let (_tx, rx) = mounted();

        let mounter = {
            let slot = slot.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                slot.mount(RenderTarget::new("canvas"));
            })
        };

        let target = gate.await_ready(rx).await.unwrap();
        assert_eq!(target.id(), "canvas");
        mounter.await.unwrap();
    }
}
