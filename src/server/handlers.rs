use std::sync::Arc;

use axum::Json;
use axum::extract::{Multipart, Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use super::error::ApiError;
use crate::publish::AUDIO_CONTENT_TYPE;
use crate::session::{Session, SessionSnapshot};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct RemoteRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "healthy" }))
}

fn lookup(app: &AppState, id: Uuid) -> Result<Arc<Session>, ApiError> {
    let session = app
        .sessions
        .read()
        .get(&id)
        .cloned()
        .ok_or(ApiError::NotFound("session"))?;
    session.touch();
    Ok(session)
}

/// Create a session and start loading its engine in the background.
pub async fn create_session_handler(State(app): State<AppState>) -> impl IntoResponse {
    let session = Arc::new(app.new_session());
    app.sessions.write().insert(session.id(), session.clone());
    tracing::info!(session = %session.id(), "session created");

    let loader = session.clone();
    tokio::spawn(async move {
        // Failures are recorded in the session state.
        let _ = loader.initialize_engine().await;
    });

    (StatusCode::CREATED, Json(session.snapshot()))
}

pub async fn get_session_handler(
    State(app): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    Ok(Json(lookup(&app, id)?.snapshot()))
}

pub async fn delete_session_handler(
    State(app): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let session = app
        .sessions
        .write()
        .remove(&id)
        .ok_or(ApiError::NotFound("session"))?;
    session.close();
    tracing::info!(session = %id, "session closed");
    Ok(StatusCode::NO_CONTENT)
}

/// Accept a single multipart field named `file`.
pub async fn upload_handler(
    State(app): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = lookup(&app, id)?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {e}")))?;

        session.select_file(&name, content_type.as_deref(), bytes)?;
        return Ok(Json(session.snapshot()));
    }

    Err(ApiError::BadRequest(
        "multipart body has no 'file' field".to_string(),
    ))
}

pub async fn remote_handler(
    State(app): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RemoteRequest>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = lookup(&app, id)?;
    session.select_remote(&req.url).await?;
    Ok(Json(session.snapshot()))
}

pub async fn convert_handler(
    State(app): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = lookup(&app, id)?;
    session.convert().await?;
    Ok(Json(session.snapshot()))
}

pub async fn cancel_handler(
    State(app): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelResponse>, ApiError> {
    let session = lookup(&app, id)?;
    Ok(Json(CancelResponse {
        cancelled: session.cancel(),
    }))
}

pub async fn audio_handler(
    State(app): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let audio = app.store.get(id).ok_or(ApiError::NotFound("audio"))?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, AUDIO_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-store"),
            (header::CONTENT_DISPOSITION, "inline; filename=\"output_audio.mp3\""),
        ],
        audio.bytes,
    )
        .into_response())
}
