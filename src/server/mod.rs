//! HTTP service: the session API and the server-side proxy for remote fetches.
//!
//! The storage credential stays in the [`DriveFetcher`] held by [`AppState`]; clients only ever
//! send share links.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use parking_lot::RwLock;
use tokio::net::TcpListener;
use tokio::time::MissedTickBehavior;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use uuid::Uuid;

use crate::config::Settings;
use crate::engine::Engine;
use crate::engine::ffmpeg::{FfmpegEngine, FfmpegEngineOpts};
use crate::publish::AudioStore;
use crate::session::{Session, SessionOpts};
use crate::source::{DriveFetcher, DriveFetcherOpts, MediaFetcher};

pub mod error;
pub mod handlers;

pub type SessionMap = Arc<RwLock<HashMap<Uuid, Arc<Session>>>>;

/// Creates a fresh engine for each new session.
pub type EngineFactory = Arc<dyn Fn() -> Arc<dyn Engine> + Send + Sync>;

/// Multipart framing allowance on top of the input size limit.
const UPLOAD_OVERHEAD_BYTES: u64 = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionMap,
    pub store: Arc<AudioStore>,
    pub engines: EngineFactory,
    pub fetcher: Arc<dyn MediaFetcher>,
    pub session_opts: SessionOpts,
    /// Idle time after which a session is closed and dropped. `None` keeps sessions until deleted.
    pub session_idle: Option<Duration>,
}

impl AppState {
    pub fn new(
        engines: EngineFactory,
        fetcher: Arc<dyn MediaFetcher>,
        session_opts: SessionOpts,
    ) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            store: Arc::new(AudioStore::new()),
            engines,
            fetcher,
            session_opts,
            session_idle: None,
        }
    }

    pub fn with_session_idle(mut self, idle: Option<Duration>) -> Self {
        self.session_idle = idle;
        self
    }

    /// State backed by `ffmpeg` and the storage API described in `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        let engine_opts =
            FfmpegEngineOpts::new(settings.ffmpeg_path.clone(), settings.scratch_root.clone());
        let engines: EngineFactory =
            Arc::new(move || Arc::new(FfmpegEngine::new(engine_opts.clone())) as Arc<dyn Engine>);
        let fetcher = Arc::new(DriveFetcher::new(DriveFetcherOpts {
            api_base: settings.drive.api_base.clone(),
            api_key: settings.drive.api_key.clone(),
            max_bytes: settings.max_input_bytes,
        }));
        Self::new(
            engines,
            fetcher,
            SessionOpts {
                timeout: settings.convert_timeout(),
                max_input_bytes: settings.max_input_bytes,
            },
        )
        .with_session_idle(settings.session_idle())
    }

    /// Close and drop sessions idle for at least `idle`. Sessions mid-conversion are kept.
    pub fn expire_idle(&self, idle: Duration) -> usize {
        let expired: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write();
            let ids: Vec<Uuid> = sessions
                .iter()
                .filter(|(_, s)| !s.is_converting() && s.idle_for() >= idle)
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };
        for session in &expired {
            session.close();
            tracing::info!(session = %session.id(), "idle session expired");
        }
        expired.len()
    }

    pub fn new_session(&self) -> Session {
        Session::new(
            (self.engines)(),
            self.fetcher.clone(),
            self.store.clone(),
            self.session_opts.clone(),
        )
    }
}

pub fn create_router(state: AppState) -> Router {
    let upload_limit = state
        .session_opts
        .max_input_bytes
        .saturating_add(UPLOAD_OVERHEAD_BYTES)
        .min(usize::MAX as u64) as usize;

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/api/sessions", post(handlers::create_session_handler))
        .route(
            "/api/sessions/{id}",
            get(handlers::get_session_handler).delete(handlers::delete_session_handler),
        )
        .route(
            "/api/sessions/{id}/file",
            post(handlers::upload_handler).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/sessions/{id}/remote", post(handlers::remote_handler))
        .route("/api/sessions/{id}/convert", post(handlers::convert_handler))
        .route("/api/sessions/{id}/cancel", post(handlers::cancel_handler))
        .route("/audio/{id}", get(handlers::audio_handler))
        .layer(trace_layer)
        .with_state(state)
}

/// Serve until `shutdown` resolves, then close every session.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "listening");

    let sessions = state.sessions.clone();
    let sweeper = state.session_idle.map(|idle| {
        let state = state.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(sweep_period(idle));
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                state.expire_idle(idle);
            }
        })
    });

    let served = axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await;
    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    served?;

    let drained: Vec<Arc<Session>> = sessions.write().drain().map(|(_, s)| s).collect();
    for session in drained {
        session.close();
    }
    tracing::info!("server stopped");
    Ok(())
}

fn sweep_period(idle: Duration) -> Duration {
    (idle / 4).clamp(Duration::from_millis(10), Duration::from_secs(60))
}
