//! Debounce and Throttle
//!
//! Timer-owning rate limiters for search input and re-fetch triggers.
//!
//! ```text
//! calls:      a  b   c                 d
//! debounce:   ───────────[W]── c       ────[W]── d
//! throttle:   a ─────[W]── c           d ──[W]──
//! ```
//!
//! Both cancel their pending timer when dropped.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::services::spawn_named;

type Action<A> = Arc<dyn Fn(A) + Send + Sync>;

/// Trailing-edge debouncer
///
/// Calls arriving within the window collapse into one invocation with the
/// arguments of the last call.
pub struct Debouncer<A: Send + 'static> {
    window: Duration,
    action: Action<A>,
    generation: Arc<AtomicU64>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl<A: Send + 'static> Debouncer<A> {
    pub fn new(window: Duration, action: impl Fn(A) + Send + Sync + 'static) -> Self {
        Self {
            window,
            action: Arc::new(action),
            generation: Arc::new(AtomicU64::new(0)),
            timer: Mutex::new(None),
        }
    }

    /// Schedule the action, replacing any pending invocation
    pub fn call(&self, args: A) {
        let mut timer = self.timer.lock();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(pending) = timer.take() {
            pending.abort();
        }

        let window = self.window;
        let action = self.action.clone();
        let current = self.generation.clone();
        *timer = spawn_named("debounce", async move {
            tokio::time::sleep(window).await;
            // an abort can race with the timer firing
            if current.load(Ordering::SeqCst) == generation {
                action(args);
            }
        });
    }

    /// Drop the pending invocation, if any
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(pending) = self.timer.lock().take() {
            pending.abort();
        }
    }

    /// Check if an invocation is waiting for its window to pass
    pub fn is_pending(&self) -> bool {
        self.timer
            .lock()
            .as_ref()
            .is_some_and(|pending| !pending.is_finished())
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl<A: Send + 'static> Drop for Debouncer<A> {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl<A: Send + 'static> fmt::Debug for Debouncer<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debouncer")
            .field("window", &self.window)
            .field("pending", &self.is_pending())
            .finish()
    }
}

struct ThrottleState<A> {
    cooling: bool,
    trailing: Option<A>,
    timer: Option<JoinHandle<()>>,
}

/// Leading + trailing edge throttle
///
/// The first call fires immediately; calls during the following window are
/// coalesced into one trailing invocation with the latest arguments, which
/// opens a new window. A zero window calls straight through.
pub struct Throttler<A: Send + 'static> {
    window: Duration,
    action: Action<A>,
    state: Arc<Mutex<ThrottleState<A>>>,
}

impl<A: Send + 'static> Throttler<A> {
    pub fn new(window: Duration, action: impl Fn(A) + Send + Sync + 'static) -> Self {
        Self {
            window,
            action: Arc::new(action),
            state: Arc::new(Mutex::new(ThrottleState {
                cooling: false,
                trailing: None,
                timer: None,
            })),
        }
    }

    /// Invoke now, or defer to the end of the current window
    ///
    /// Returns `true` if the action ran synchronously.
    pub fn call(&self, args: A) -> bool {
        if self.window.is_zero() {
            (self.action)(args);
            return true;
        }

        {
            let mut state = self.state.lock();
            if state.cooling {
                state.trailing = Some(args);
                return false;
            }
            state.cooling = true;
            state.timer = spawn_named("throttle", Self::cool_down(
                self.window,
                self.action.clone(),
                self.state.clone(),
            ));
        }

        (self.action)(args);
        true
    }

    async fn cool_down(window: Duration, action: Action<A>, state: Arc<Mutex<ThrottleState<A>>>) {
        loop {
            tokio::time::sleep(window).await;
            let trailing = {
                let mut state = state.lock();
                match state.trailing.take() {
                    Some(args) => args,
                    None => {
                        state.cooling = false;
                        state.timer = None;
                        return;
                    }
                }
            };
            action(trailing);
        }
    }

    /// Drop the trailing invocation and close the window
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        state.trailing = None;
        state.cooling = false;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
    }

    /// Check if the throttle window is open
    pub fn is_cooling(&self) -> bool {
        self.state.lock().cooling
    }
}

impl<A: Send + 'static> Drop for Throttler<A> {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl<A: Send + 'static> fmt::Debug for Throttler<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Throttler")
            .field("window", &self.window)
            .field("cooling", &self.is_cooling())
            .finish()
    }
}
