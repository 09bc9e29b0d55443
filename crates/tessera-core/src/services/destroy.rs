//! Process-wide teardown hooks owned by a `CompilerSystem`.
//!
//! Subsystems that hold resources (watchers, worker pools, temp-file owners)
//! register a hook here. `destroy()` drains the registry exactly once:
//!
//! ```text
//! Active --destroy()--> Draining --all hooks settled--> Destroyed
//! ```
//!
//! Hooks run concurrently. A hook that returns `Err` or panics is logged and
//! does not stop the others. Adding a hook after draining has started is a
//! no-op because the owning system is no longer usable.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, join_all};
use tracing::{debug, error};

/// Future returned by a destroy hook.
pub type DestroyFuture = BoxFuture<'static, anyhow::Result<()>>;

/// A zero-argument teardown callback. Identity is the `Arc` allocation:
/// registering the same `Arc` twice keeps one entry.
pub type DestroyHook = Arc<dyn Fn() -> DestroyFuture + Send + Sync>;

/// Wrap an async closure as a `DestroyHook`.
pub fn destroy_hook<F, Fut>(f: F) -> DestroyHook
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()) as DestroyFuture)
}

/// Lifecycle phase of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyPhase {
    Active,
    Draining,
    Destroyed,
}

enum State {
    Active(Vec<DestroyHook>),
    Draining,
    Destroyed,
}

/// Outcome of a drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DestroySummary {
    /// Hooks invoked by this call.
    pub invoked: usize,
    /// Hooks that returned an error or panicked.
    pub failed: usize,
}

/// Lock-protected set of teardown hooks.
pub struct DestroyRegistry {
    state: Mutex<State>,
}

impl DestroyRegistry {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(State::Active(Vec::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a hook. Returns `false` if it was already registered or the
    /// registry is no longer active.
    pub fn add(&self, hook: DestroyHook) -> bool {
        let mut state = self.lock();
        match &mut *state {
            State::Active(hooks) => {
                if hooks.iter().any(|h| Arc::ptr_eq(h, &hook)) {
                    return false;
                }
                hooks.push(hook);
                true
            }
            State::Draining | State::Destroyed => {
                debug!("destroy hook added after shutdown started; ignoring");
                false
            }
        }
    }

    /// Unregister a hook. Returns `false` if it was not registered.
    pub fn remove(&self, hook: &DestroyHook) -> bool {
        let mut state = self.lock();
        if let State::Active(hooks) = &mut *state {
            let before = hooks.len();
            hooks.retain(|h| !Arc::ptr_eq(h, hook));
            return hooks.len() != before;
        }
        false
    }

    /// Number of registered hooks.
    pub fn len(&self) -> usize {
        match &*self.lock() {
            State::Active(hooks) => hooks.len(),
            State::Draining | State::Destroyed => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn phase(&self) -> DestroyPhase {
        match &*self.lock() {
            State::Active(_) => DestroyPhase::Active,
            State::Draining => DestroyPhase::Draining,
            State::Destroyed => DestroyPhase::Destroyed,
        }
    }

    /// Invoke every registered hook concurrently and wait for all of them.
    ///
    /// Only the first call drains; later (or concurrent) calls invoke nothing.
    pub async fn destroy(&self) -> DestroySummary {
        let hooks = {
            let mut state = self.lock();
            match std::mem::replace(&mut *state, State::Draining) {
                State::Active(hooks) => hooks,
                other => {
                    *state = other;
                    return DestroySummary::default();
                }
            }
        };

        let invoked = hooks.len();
        debug!(hooks = invoked, "draining destroy registry");

        let runs = hooks.into_iter().map(|hook| async move {
            let fut = match std::panic::catch_unwind(AssertUnwindSafe(|| hook())) {
                Ok(fut) => fut,
                Err(_) => {
                    error!("destroy hook panicked");
                    return false;
                }
            };
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    error!(error = %e, "destroy hook failed");
                    false
                }
                Err(_) => {
                    error!("destroy hook panicked");
                    false
                }
            }
        });

        let failed = join_all(runs).await.into_iter().filter(|ok| !ok).count();

        *self.lock() = State::Destroyed;
        DestroySummary { invoked, failed }
    }
}

impl Default for DestroyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
