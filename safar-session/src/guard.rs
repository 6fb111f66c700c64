use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Default)]
struct GuardState {
    busy: bool,
    entered_at: Option<Instant>,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// Single-flight lock for storage-chained navigations.
///
/// A holder that never releases is evicted by the safety timer (or, without a
/// runtime, by the next `try_enter` after the timeout).
#[derive(Clone)]
pub struct NavigationGuard {
    state: Arc<Mutex<GuardState>>,
    timeout: Duration,
}

impl NavigationGuard {
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(GuardState::default())),
            timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn try_enter(&self) -> bool {
        self.acquire().is_some()
    }

    fn acquire(&self) -> Option<u64> {
        let mut state = self.lock();

        if state.busy {
            let stale = state
                .entered_at
                .is_some_and(|at| at.elapsed() >= self.timeout);
            if !stale {
                debug!("Navigation already in flight");
                return None;
            }
            warn!("Navigation guard held past its timeout, taking over");
        }

        state.busy = true;
        state.entered_at = Some(Instant::now());
        state.generation += 1;
        let generation = state.generation;

        if let Some(old) = state.timer.take() {
            old.abort();
        }
        if let Ok(runtime) = Handle::try_current() {
            let shared = self.state.clone();
            let timeout = self.timeout;
            state.timer = Some(runtime.spawn(async move {
                tokio::time::sleep(timeout).await;
                let mut state = shared.lock().unwrap_or_else(PoisonError::into_inner);
                if state.busy && state.generation == generation {
                    warn!(?timeout, "Navigation guard released by safety timeout");
                    state.busy = false;
                    state.entered_at = None;
                    state.timer = None;
                }
            }));
        }

        Some(generation)
    }

    pub fn release(&self) {
        let mut state = self.lock();
        Self::release_locked(&mut state);
    }

    fn release_generation(&self, generation: u64) {
        let mut state = self.lock();
        if state.generation == generation {
            Self::release_locked(&mut state);
        }
    }

    fn release_locked(state: &mut GuardState) {
        state.busy = false;
        state.entered_at = None;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
    }

    pub fn is_busy(&self) -> bool {
        self.lock().busy
    }

    /// Enters the guard and returns a permit that releases it when dropped.
    pub fn enter(&self) -> Option<NavigationPermit> {
        self.acquire().map(|generation| NavigationPermit {
            guard: self.clone(),
            generation,
        })
    }

    /// Runs `body` inside the guard. `None` means another navigation is in
    /// flight and `body` was not started.
    pub async fn guarded<F, T>(&self, body: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        let _permit = self.enter()?;
        Some(body.await)
    }
}

/// Releases the guard on drop, including on early returns and panics. A
/// permit that outlived the safety timeout does not release a newer holder.
pub struct NavigationPermit {
    guard: NavigationGuard,
    generation: u64,
}

impl Drop for NavigationPermit {
    fn drop(&mut self) {
        self.guard.release_generation(self.generation);
    }
}
