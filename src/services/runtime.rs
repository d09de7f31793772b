//! Tokio Runtime Bridge
//!
//! Queue drains and debounce timers are detached tokio tasks. Consumers that
//! already run inside tokio get their tasks spawned on the ambient runtime;
//! everyone else (synchronous UI threads, plain `#[test]`s) falls back to a
//! lazily created global runtime.
//!
//! ## Pattern
//!
//! ```text
//! set_task / filter / sync
//!       │
//!       ▼
//! spawn_named("queue", async { ... })
//!       │
//!       ├── Handle::try_current() ──► ambient runtime
//!       │
//!       └── no runtime ───────────► global fallback runtime
//! ```

use std::future::Future;
use std::sync::OnceLock;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

/// Global fallback runtime, `None` if it could not be built
static FALLBACK_RUNTIME: OnceLock<Option<Runtime>> = OnceLock::new();

fn fallback_runtime() -> Option<&'static Runtime> {
    FALLBACK_RUNTIME
        .get_or_init(|| {
            match Builder::new_multi_thread()
                .thread_name("pagekeeper-rt")
                .enable_all()
                .build()
            {
                Ok(rt) => Some(rt),
                Err(e) => {
                    tracing::error!("Failed to create fallback tokio runtime: {e}");
                    None
                }
            }
        })
        .as_ref()
}

/// Get a handle to the runtime tasks should be spawned on
pub fn runtime_handle() -> Option<Handle> {
    Handle::try_current()
        .ok()
        .or_else(|| fallback_runtime().map(|rt| rt.handle().clone()))
}

/// Spawn a detached task on the ambient or fallback runtime
///
/// Returns `None` only when no runtime is available at all, in which case
/// the future is dropped without running.
pub fn spawn<F>(future: F) -> Option<JoinHandle<()>>
where
    F: Future<Output = ()> + Send + 'static,
{
    runtime_handle().map(|handle| handle.spawn(future))
}

/// Spawn a detached task with a name (for debugging)
pub fn spawn_named<F>(name: &'static str, future: F) -> Option<JoinHandle<()>>
where
    F: Future<Output = ()> + Send + 'static,
{
    tracing::trace!("Spawning task: {}", name);
    let handle = spawn(async move {
        future.await;
        tracing::trace!("Task completed: {}", name);
    });
    if handle.is_none() {
        tracing::error!("No tokio runtime available, dropping task: {}", name);
    }
    handle
}
