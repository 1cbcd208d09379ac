use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

use super::{Engine, EngineInfo, EventHandler, EventKind};
use crate::foundation::error::Mp3ifyResult;

/// Owned, lazily initialized engine.
///
/// - `ensure_loaded` is single-flight: concurrent callers share one `Engine::load`.
/// - Subscriptions given to [`with_subscription`](Self::with_subscription) are installed on the
///   engine exactly once, even when a failed load is retried.
/// - `exec_lock` serializes commands so callers never race inside the engine.
pub struct EngineHandle {
    engine: Arc<dyn Engine>,
    info: OnceCell<EngineInfo>,
    pending: Mutex<Option<Vec<(EventKind, EventHandler)>>>,
    exec_lock: tokio::sync::Mutex<()>,
}

impl EngineHandle {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            info: OnceCell::new(),
            pending: Mutex::new(Some(Vec::new())),
            exec_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Queue a subscription to install on first load. Ignored once subscriptions were installed.
    pub fn with_subscription(self, kind: EventKind, handler: EventHandler) -> Self {
        if let Some(pending) = self.pending.lock().as_mut() {
            pending.push((kind, handler));
        }
        self
    }

    pub async fn ensure_loaded(&self) -> Mp3ifyResult<&EngineInfo> {
        self.info
            .get_or_try_init(|| async {
                let subs = self.pending.lock().take().unwrap_or_default();
                for (kind, handler) in subs {
                    self.engine.on(kind, handler);
                }
                self.engine.load().await
            })
            .await
    }

    pub fn is_loaded(&self) -> bool {
        self.info.initialized()
    }

    pub fn info(&self) -> Option<&EngineInfo> {
        self.info.get()
    }

    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    pub async fn lock_exec(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.exec_lock.lock().await
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("info", &self.info.get())
            .finish_non_exhaustive()
    }
}
