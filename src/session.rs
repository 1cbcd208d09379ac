//! One user's conversion session: selected input, engine, status, progress, and output.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::convert::Transcoder;
use crate::engine::{Engine, EngineEvent, EngineHandle, EngineInfo, EventKind};
use crate::foundation::error::{Mp3ifyError, Mp3ifyResult};
use crate::foundation::progress::ProgressTracker;
use crate::publish::{AudioRef, AudioStore};
use crate::source::{self, InputSource, MediaFetcher, MediaInput};

/// Session status.
///
/// `Idle -> LoadingEngine -> Ready -> Converting -> Complete`, with `Error` reachable from
/// `LoadingEngine` and `Converting`. Selecting a new input leaves `Error`/`Complete`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Idle,
    LoadingEngine,
    Ready,
    Converting,
    Complete,
    Error,
}

impl Status {
    /// User-facing status line.
    pub fn text(self) -> &'static str {
        match self {
            Self::Idle => "",
            Self::LoadingEngine => "Loading ffmpeg...",
            Self::Ready => "FFmpeg loaded",
            Self::Converting => "Converting...",
            Self::Complete => "Conversion complete",
            Self::Error => "Error",
        }
    }
}

#[derive(Debug, Default)]
pub struct SessionState {
    pub loaded: bool,
    pub status: Status,
    pub error_message: Option<String>,
    pub progress: ProgressTracker,
    pub selected_input: Option<MediaInput>,
    pub output: Option<AudioRef>,
    pub last_log: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct InputSummary {
    pub name: String,
    pub content_type: String,
    pub bytes: usize,
}

/// Serializable view of a session for the CLI and the HTTP API.
#[derive(Clone, Debug, serde::Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub loaded: bool,
    pub status: Status,
    pub status_text: &'static str,
    pub error: Option<String>,
    pub progress_percent: u8,
    pub input: Option<InputSummary>,
    pub output: Option<AudioRef>,
    pub last_log: Option<String>,
    pub engine: Option<EngineInfo>,
}

#[derive(Clone, Debug)]
pub struct SessionOpts {
    pub timeout: Option<Duration>,
    pub max_input_bytes: u64,
}

impl Default for SessionOpts {
    fn default() -> Self {
        Self {
            timeout: None,
            max_input_bytes: 2 * 1024 * 1024 * 1024,
        }
    }
}

pub struct Session {
    id: Uuid,
    state: Arc<Mutex<SessionState>>,
    transcoder: Transcoder,
    fetcher: Arc<dyn MediaFetcher>,
    store: Arc<AudioStore>,
    opts: SessionOpts,
    cancel: Mutex<Option<CancellationToken>>,
    last_active: Mutex<Instant>,
}

impl Session {
    pub fn new(
        engine: Arc<dyn Engine>,
        fetcher: Arc<dyn MediaFetcher>,
        store: Arc<AudioStore>,
        opts: SessionOpts,
    ) -> Self {
        let state = Arc::new(Mutex::new(SessionState::default()));

        let progress_state = state.clone();
        let log_state = state.clone();
        let handle = EngineHandle::new(engine)
            .with_subscription(
                EventKind::Progress,
                Arc::new(move |event| {
                    if let EngineEvent::Progress(fraction) = event {
                        let mut st = progress_state.lock();
                        if st.status == Status::Converting {
                            st.progress.observe(*fraction);
                        }
                    }
                }),
            )
            .with_subscription(
                EventKind::Log,
                Arc::new(move |event| {
                    if let EngineEvent::Log(line) = event {
                        debug!(target: "mp3ify::engine", "{line}");
                        log_state.lock().last_log = Some(line.clone());
                    }
                }),
            );

        Self {
            id: Uuid::new_v4(),
            state,
            transcoder: Transcoder::new(Arc::new(handle), opts.timeout),
            fetcher,
            store,
            opts,
            cancel: Mutex::new(None),
            last_active: Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_converting(&self) -> bool {
        self.transcoder.is_busy()
    }

    /// Record client activity.
    pub fn touch(&self) {
        *self.last_active.lock() = Instant::now();
    }

    /// Time since the last [`touch`](Self::touch) or finished conversion.
    pub fn idle_for(&self) -> Duration {
        self.last_active.lock().elapsed()
    }

    /// Load the engine once. Later calls return immediately.
    #[tracing::instrument(skip(self), fields(session = %self.id))]
    pub async fn initialize_engine(&self) -> Mp3ifyResult<()> {
        let handle = self.transcoder.engine();
        if handle.is_loaded() {
            return Ok(());
        }

        {
            let mut st = self.state.lock();
            st.status = Status::LoadingEngine;
            st.error_message = None;
        }

        match handle.ensure_loaded().await {
            Ok(engine) => {
                info!(engine = %engine.name, version = %engine.version, "engine ready");
                let mut st = self.state.lock();
                st.loaded = true;
                if st.status == Status::LoadingEngine {
                    st.status = Status::Ready;
                }
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "engine failed to load");
                let mut st = self.state.lock();
                st.status = Status::Error;
                st.error_message = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub async fn select(&self, source: &InputSource) -> Mp3ifyResult<()> {
        match source {
            InputSource::Local(path) => self.select_path(path).await,
            InputSource::Remote(url) => self.select_remote(url).await,
        }
    }

    /// Select an uploaded file.
    pub fn select_file(
        &self,
        name: &str,
        declared_type: Option<&str>,
        bytes: Bytes,
    ) -> Mp3ifyResult<()> {
        let result = source::validate_local(name, declared_type, bytes, self.opts.max_input_bytes);
        self.accept_input(result)
    }

    /// Select a file from the local filesystem.
    pub async fn select_path(&self, path: &Path) -> Mp3ifyResult<()> {
        let result = source::read_local(path, self.opts.max_input_bytes).await;
        self.accept_input(result)
    }

    /// Fetch and select the file behind a share link.
    #[tracing::instrument(skip(self), fields(session = %self.id))]
    pub async fn select_remote(&self, share_url: &str) -> Mp3ifyResult<()> {
        {
            let mut st = self.state.lock();
            st.selected_input = None;
            st.error_message = None;
            self.revoke_output(&mut st);
        }

        let result = match source::acquire_remote(self.fetcher.as_ref(), share_url).await {
            Ok(fetched) => source::validate_local(
                &fetched.name,
                Some(&fetched.content_type),
                fetched.bytes,
                self.opts.max_input_bytes,
            ),
            Err(e) => Err(e),
        };
        self.accept_input(result)
    }

    fn accept_input(&self, result: Mp3ifyResult<MediaInput>) -> Mp3ifyResult<()> {
        let mut st = self.state.lock();
        match result {
            Ok(input) => {
                info!(session = %self.id, name = %input.name, bytes = input.len(), "input selected");
                st.selected_input = Some(input);
                st.error_message = None;
                self.revoke_output(&mut st);
                if matches!(st.status, Status::Error | Status::Complete) {
                    st.status = if st.loaded {
                        Status::Ready
                    } else {
                        Status::Idle
                    };
                }
                Ok(())
            }
            Err(e) => {
                warn!(session = %self.id, error = %e, "input rejected");
                st.error_message = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Convert the selected input and publish the result.
    ///
    /// A previous output stays published when the conversion fails, and is revoked when it
    /// succeeds.
    #[tracing::instrument(skip(self), fields(session = %self.id))]
    pub async fn convert(&self) -> Mp3ifyResult<AudioRef> {
        let input = self.state.lock().selected_input.clone();
        let Some(input) = input else {
            let err = Mp3ifyError::NoInputSelected;
            self.state.lock().error_message = Some(err.to_string());
            return Err(err);
        };

        // A rejected second caller must not disturb the running conversion's state.
        let reservation = self.transcoder.reserve()?;

        if !self.transcoder.engine().is_loaded() {
            self.initialize_engine().await?;
        }

        let token = CancellationToken::new();
        *self.cancel.lock() = Some(token.clone());
        {
            let mut st = self.state.lock();
            st.status = Status::Converting;
            st.error_message = None;
            st.progress.reset();
        }

        let result = reservation.run(&input, token).await;
        *self.cancel.lock() = None;
        self.touch();

        let mut st = self.state.lock();
        match result {
            Ok(bytes) => {
                let audio = self.store.publish(bytes);
                self.revoke_output(&mut st);
                st.output = Some(audio.clone());
                st.status = Status::Complete;
                st.progress.complete();
                Ok(audio)
            }
            Err(e) => {
                st.status = Status::Error;
                st.error_message = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Cancel the running conversion. Returns `false` when nothing was running.
    pub fn cancel(&self) -> bool {
        match self.cancel.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel any running conversion and revoke the published output.
    pub fn close(&self) {
        self.cancel();
        let mut st = self.state.lock();
        self.revoke_output(&mut st);
    }

    /// Bytes of the currently published output, if any.
    pub fn output_bytes(&self) -> Option<Bytes> {
        let output = self.state.lock().output.clone()?;
        self.store.get(output.id).map(|a| a.bytes)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let st = self.state.lock();
        SessionSnapshot {
            id: self.id,
            loaded: st.loaded,
            status: st.status,
            status_text: st.status.text(),
            error: st.error_message.clone(),
            progress_percent: st.progress.percent(),
            input: st.selected_input.as_ref().map(|i| InputSummary {
                name: i.name.clone(),
                content_type: i.content_type.clone(),
                bytes: i.len(),
            }),
            output: st.output.clone(),
            last_log: st.last_log.clone(),
            engine: self.transcoder.engine().info().cloned(),
        }
    }

    fn revoke_output(&self, st: &mut SessionState) {
        if let Some(old) = st.output.take() {
            self.store.revoke(&old);
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}
