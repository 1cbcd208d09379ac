//! The media-processing engine seam.
//!
//! An [`Engine`] is an opaque transcoder with a private flat filesystem: callers write an input
//! file into it, run one command, and read the produced file back. [`EngineHandle`] owns one
//! engine for a session and guarantees it is initialized once.

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::foundation::error::Mp3ifyResult;

pub mod events;
/// `ffmpeg` subprocess engine.
pub mod ffmpeg;
pub mod ffmpeg_log;
pub mod handle;
pub mod vfs;

pub use events::{EngineEvent, EventHandler, EventHub, EventKind};
pub use handle::EngineHandle;

/// Facts about a loaded engine.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct EngineInfo {
    pub name: String,
    pub version: String,
}

#[async_trait]
pub trait Engine: Send + Sync {
    /// Prepare the engine for use. Called at most once per successful load by [`EngineHandle`].
    async fn load(&self) -> Mp3ifyResult<EngineInfo>;

    /// Subscription registry that receives `log` and `progress` events.
    fn events(&self) -> &EventHub;

    fn on(&self, kind: EventKind, handler: EventHandler) {
        self.events().on(kind, handler);
    }

    async fn write_file(&self, name: &str, data: Bytes) -> Mp3ifyResult<()>;

    /// Run one engine command. Must stop the engine promptly when `cancel` fires.
    async fn exec(&self, args: &[String], cancel: CancellationToken) -> Mp3ifyResult<()>;

    async fn read_file(&self, name: &str) -> Mp3ifyResult<Bytes>;

    async fn delete_file(&self, name: &str) -> Mp3ifyResult<()>;
}
