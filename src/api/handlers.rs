//! HTTP request handlers

use super::types::{
    ApiResponse, ChatRequest, CreateSessionRequest, CreateSessionResponse, DeletedCountResponse,
    DeletedResponse, ModelRequest,
};
use super::AppState;
use crate::db::SessionInfo;
use crate::runtime::{NewSession, SessionError};
use crate::state_machine::SessionState;
use axum::{
    extract::{rejection::JsonRejection, Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use axum_extra::extract::WithRejection;

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Per-session chat
        .route("/api/chat/:session_id/messages", get(get_messages))
        .route("/api/chat/:session_id/chat", post(send_chat))
        .route("/api/chat/:session_id/clear", delete(clear_messages))
        .route("/api/chat/:session_id/model", post(update_model))
        // Session index
        .route(
            "/api/sessions",
            get(list_sessions)
                .post(create_session)
                .delete(delete_all_sessions),
        )
        .route("/api/sessions/:session_id", delete(delete_session))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), require_gateway))
        .with_state(state)
}

/// Refuse every request while gateway credentials are missing or placeholders
async fn require_gateway(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.config.is_configured() {
        tracing::error!("AI Gateway credentials missing or placeholder");
        return AppError::Internal("AI Gateway not configured.".to_string()).into_response();
    }
    next.run(request).await
}

async fn not_found() -> AppError {
    AppError::NotFound("Not Found".to_string())
}

// ============================================================
// Chat
// ============================================================

async fn get_messages(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionState> {
    let session = state.sessions.get_state(&session_id).await?;
    Ok(Json(ApiResponse::ok(session)))
}

async fn send_chat(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    WithRejection(Json(req), _): WithRejection<Json<ChatRequest>, AppError>,
) -> ApiResult<SessionState> {
    let session = state
        .sessions
        .handle_message(&session_id, &req.message, req.model)
        .await?;
    Ok(Json(ApiResponse::ok(session)))
}

async fn clear_messages(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionState> {
    let session = state.sessions.clear_messages(&session_id).await?;
    Ok(Json(ApiResponse::ok(session)))
}

async fn update_model(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    WithRejection(Json(req), _): WithRejection<Json<ModelRequest>, AppError>,
) -> ApiResult<SessionState> {
    let session = state.sessions.update_model(&session_id, &req.model).await?;
    Ok(Json(ApiResponse::ok(session)))
}

// ============================================================
// Session Index
// ============================================================

async fn list_sessions(State(state): State<AppState>) -> ApiResult<Vec<SessionInfo>> {
    let sessions = state.sessions.list_sessions().await?;
    Ok(Json(ApiResponse::ok(sessions)))
}

async fn create_session(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<CreateSessionRequest>, AppError>,
) -> ApiResult<CreateSessionResponse> {
    let info = state
        .sessions
        .create_session(NewSession {
            session_id: req.session_id,
            title: req.title,
            first_message: req.first_message,
        })
        .await?;

    Ok(Json(ApiResponse::ok(CreateSessionResponse {
        session_id: info.id,
        title: info.title,
    })))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<DeletedResponse> {
    let deleted = state.sessions.delete_session(&session_id).await?;
    Ok(Json(ApiResponse::ok(DeletedResponse { deleted })))
}

async fn delete_all_sessions(State(state): State<AppState>) -> ApiResult<DeletedCountResponse> {
    let deleted = state.sessions.delete_all_sessions().await?;
    Ok(Json(ApiResponse::ok(DeletedCountResponse { deleted })))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        let message = e.user_message();
        match &e {
            SessionError::EmptyMessage | SessionError::InvalidModel => AppError::BadRequest(message),
            SessionError::Busy => AppError::Conflict(message),
            SessionError::Turn(_) | SessionError::Store(_) | SessionError::Transition(_) => {
                tracing::error!(error = %e, "Request failed");
                AppError::Internal(message)
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(ApiResponse::error(message))).into_response()
    }
}
