//! Coordination between the render loop and anything that mutates
//! application state.
//!
//! Rendering holds the read side of a single lock for the duration of a pass.
//! Event handlers and background tasks take the write side, mutate, and then
//! release either quietly or with a request for another render. Render
//! requests travel over a bounded channel; when it is full the request is
//! dropped since a pending signal already guarantees a future pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::{debug, warn};

use crate::error::EnvError;
use crate::result::EnvResult;

/// Default number of pending render requests held before new ones are dropped.
pub const DEFAULT_SIGNAL_CAPACITY: usize = 64;

/// Probe for whether the host environment is still usable.
pub trait Liveness {
    fn is_alive(&self) -> bool;
}

impl<F> Liveness for F
where
    F: Fn() -> bool,
{
    fn is_alive(&self) -> bool {
        self()
    }
}

struct Shared {
    state: RwLock<()>,
    signals: mpsc::Sender<bool>,
    exit_requested: AtomicBool,
}

/// Clonable handle given to components, event handlers and background tasks.
#[derive(Clone)]
pub struct EventEnv {
    shared: Arc<Shared>,
}

/// Receiving half owned by the render loop.
pub struct RenderSignals {
    rx: mpsc::Receiver<bool>,
    shared: Arc<Shared>,
}

/// Create a coordinator pair with room for `capacity` pending render requests.
pub fn event_env(capacity: usize) -> (EventEnv, RenderSignals) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let shared = Arc::new(Shared {
        state: RwLock::new(()),
        signals: tx,
        exit_requested: AtomicBool::new(false),
    });

    (
        EventEnv {
            shared: shared.clone(),
        },
        RenderSignals { rx, shared },
    )
}

/// Exclusive access to application state.
#[must_use = "release the lock with unlock_only or unlock_render"]
pub struct WriteGuard<'a> {
    guard: RwLockWriteGuard<'a, ()>,
    env: &'a EventEnv,
}

/// Shared access to application state, held while rendering.
pub struct ReadGuard<'a> {
    _guard: RwLockReadGuard<'a, ()>,
}

impl EventEnv {
    /// Acquire the write side. The guarded value is `()`, so a poisoned lock
    /// carries no broken data and is recovered.
    pub fn lock(&self) -> WriteGuard<'_> {
        let guard = self
            .shared
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        WriteGuard { guard, env: self }
    }

    /// Acquire the read side.
    pub fn read(&self) -> ReadGuard<'_> {
        let guard = self
            .shared
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        ReadGuard { _guard: guard }
    }

    /// Ask for another render pass without blocking.
    pub fn request_render(&self) {
        match self.shared.signals.try_send(true) {
            Ok(()) => debug!("Render requested"),
            Err(TrySendError::Full(_)) => {
                debug!("Render signal dropped, a pass is already pending")
            }
            Err(TrySendError::Closed(_)) => warn!("Render signal sent after loop shutdown"),
        }
    }

    /// Ask the render loop to stop. Unlike render requests this is never lost:
    /// the flag is checked by the waiter even when the channel is full.
    pub fn request_exit(&self) {
        self.shared.exit_requested.store(true, Ordering::SeqCst);
        if let Err(TrySendError::Closed(_)) = self.shared.signals.try_send(false) {
            warn!("Exit signal sent after loop shutdown");
        }
        debug!("Render loop exit requested");
    }

    pub fn is_exit_requested(&self) -> bool {
        self.shared.exit_requested.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for EventEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEnv")
            .field("exit_requested", &self.is_exit_requested())
            .finish()
    }
}

impl WriteGuard<'_> {
    /// Release without requesting a render.
    pub fn unlock_only(self) {
        drop(self.guard);
    }

    /// Release, then request a render.
    pub fn unlock_render(self) {
        let WriteGuard { guard, env } = self;
        drop(guard);
        env.request_render();
    }
}

impl RenderSignals {
    /// Block until the next render request. Returns false when the loop should
    /// terminate: the host went away, an exit was requested, or every sender
    /// is gone.
    pub async fn wait(&mut self, host: &dyn Liveness) -> bool {
        if self.check_running(host).is_err() {
            return false;
        }

        match self.rx.recv().await {
            Some(signal) => signal && self.check_running(host).is_ok(),
            None => false,
        }
    }

    /// Non-blocking variant of [`RenderSignals::wait`]. `None` means nothing
    /// is pending.
    pub fn try_wait(&mut self) -> Option<bool> {
        if self.shared.exit_requested.load(Ordering::SeqCst) {
            return Some(false);
        }
        match self.rx.try_recv() {
            Ok(signal) => Some(signal),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(false),
        }
    }

    /// Drain pending requests so several queued signals trigger one pass.
    pub fn drain(&mut self) -> usize {
        let mut count = 0;
        while let Ok(signal) = self.rx.try_recv() {
            if !signal {
                self.shared.exit_requested.store(true, Ordering::SeqCst);
            }
            count += 1;
        }
        count
    }

    fn check_running(&self, host: &dyn Liveness) -> EnvResult<()> {
        if self.shared.exit_requested.load(Ordering::SeqCst) {
            return Err(EnvError::ExitRequested);
        }
        if !host.is_alive() {
            return Err(EnvError::HostUnavailable);
        }
        Ok(())
    }
}
