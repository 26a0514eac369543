//! Axum routes for the furnace command surface.
//!
//! Every mutating handler follows the same shape: build a oneshot, send a
//! [`FurnaceRequest`] into the controller mailbox, await the reply. The
//! controller applies commands at the start of its next tick, so a reply
//! arrives within one tick period.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use tokio::sync::oneshot;

use crate::channel::{FurnaceHandle, FurnaceRequest, TestTarget};
use crate::program::CatalogError;
use crate::web::models::{SaveProgramRequest, StartRequest, StatusResponse, TunePidRequest};

pub struct AppStateInner {
    pub handle: FurnaceHandle,
    pub started: Instant,
}

pub type AppState = Arc<AppStateInner>;

/// JSON error body with a reason, in the given status.
fn json_error(reason: &str, status: StatusCode) -> axum::response::Response {
    (status, Json(serde_json::json!({ "error": reason }))).into_response()
}

fn internal_error() -> axum::response::Response {
    json_error("Internal error", StatusCode::INTERNAL_SERVER_ERROR)
}

pub fn create_router(handle: FurnaceHandle) -> Router {
    let state = Arc::new(AppStateInner {
        handle,
        started: Instant::now(),
    });
    Router::new()
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/programs", get(get_programs))
        .route("/api/v1/start", post(start_handler))
        .route("/api/v1/stop", post(stop_handler))
        .route("/api/v1/pause", post(pause_handler))
        .route("/api/v1/resume", post(resume_handler))
        .route("/api/v1/emergency", post(emergency_handler))
        .route("/api/v1/pid/tune", post(tune_pid_handler))
        .route("/api/v1/programs/save", post(save_program_handler))
        .route("/api/v1/programs/:id", delete(delete_program_handler))
        .route("/api/v1/errors/clear", post(clear_errors_handler))
        .route("/api/v1/test/:target", post(self_test_handler))
        .with_state(state)
}

/// Latest snapshot; answered from the watch channel without a controller
/// round-trip.
async fn get_status(State(state): State<AppState>) -> axum::response::Response {
    let snapshot = state.handle.latest();
    let now_ms = state.started.elapsed().as_millis() as u64;
    (StatusCode::OK, Json(StatusResponse { snapshot, now_ms })).into_response()
}

async fn get_programs(State(state): State<AppState>) -> axum::response::Response {
    let (resp_tx, resp_rx) = oneshot::channel();
    if state
        .handle
        .commands
        .send(FurnaceRequest::GetPrograms { respond_to: resp_tx })
        .await
        .is_err()
    {
        return internal_error();
    }
    match resp_rx.await {
        Ok(programs) => (StatusCode::OK, Json(programs)).into_response(),
        Err(_) => internal_error(),
    }
}

async fn start_handler(
    State(state): State<AppState>,
    Json(payload): Json<StartRequest>,
) -> axum::response::Response {
    let (resp_tx, resp_rx) = oneshot::channel();
    if state
        .handle
        .commands
        .send(FurnaceRequest::Start {
            program_id: payload.program_id,
            respond_to: resp_tx,
        })
        .await
        .is_err()
    {
        return internal_error();
    }
    match resp_rx.await {
        Ok(Ok(info)) => (StatusCode::OK, Json(info)).into_response(),
        Ok(Err(reason)) => json_error(&reason, StatusCode::BAD_REQUEST),
        Err(_) => internal_error(),
    }
}

async fn stop_handler(State(state): State<AppState>) -> axum::response::Response {
    let (resp_tx, resp_rx) = oneshot::channel();
    if state
        .handle
        .commands
        .send(FurnaceRequest::Stop { respond_to: resp_tx })
        .await
        .is_err()
    {
        return internal_error();
    }
    match resp_rx.await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "stopped": true }))).into_response(),
        Err(_) => internal_error(),
    }
}

async fn pause_handler(State(state): State<AppState>) -> axum::response::Response {
    let (resp_tx, resp_rx) = oneshot::channel();
    if state
        .handle
        .commands
        .send(FurnaceRequest::TogglePause { respond_to: resp_tx })
        .await
        .is_err()
    {
        return internal_error();
    }
    match resp_rx.await {
        Ok(Ok(new_state)) => {
            (StatusCode::OK, Json(serde_json::json!({ "state": new_state }))).into_response()
        }
        Ok(Err(reason)) => json_error(&reason, StatusCode::BAD_REQUEST),
        Err(_) => internal_error(),
    }
}

async fn resume_handler(State(state): State<AppState>) -> axum::response::Response {
    let (resp_tx, resp_rx) = oneshot::channel();
    if state
        .handle
        .commands
        .send(FurnaceRequest::Resume { respond_to: resp_tx })
        .await
        .is_err()
    {
        return internal_error();
    }
    match resp_rx.await {
        Ok(Ok(())) => {
            (StatusCode::OK, Json(serde_json::json!({ "state": "running" }))).into_response()
        }
        Ok(Err(reason)) => json_error(&reason, StatusCode::BAD_REQUEST),
        Err(_) => internal_error(),
    }
}

async fn emergency_handler(State(state): State<AppState>) -> axum::response::Response {
    let (resp_tx, resp_rx) = oneshot::channel();
    if state
        .handle
        .commands
        .send(FurnaceRequest::EmergencyStop { respond_to: resp_tx })
        .await
        .is_err()
    {
        return internal_error();
    }
    match resp_rx.await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "emergency_stopped": true })),
        )
            .into_response(),
        Err(_) => internal_error(),
    }
}

async fn tune_pid_handler(
    State(state): State<AppState>,
    Json(payload): Json<TunePidRequest>,
) -> axum::response::Response {
    let (resp_tx, resp_rx) = oneshot::channel();
    if state
        .handle
        .commands
        .send(FurnaceRequest::TunePid {
            kp: payload.kp,
            ki: payload.ki,
            kd: payload.kd,
            respond_to: resp_tx,
        })
        .await
        .is_err()
    {
        return internal_error();
    }
    match resp_rx.await {
        Ok(Ok(tuned)) => (StatusCode::OK, Json(tuned)).into_response(),
        Ok(Err(reason)) => json_error(&reason, StatusCode::BAD_REQUEST),
        Err(_) => internal_error(),
    }
}

async fn save_program_handler(
    State(state): State<AppState>,
    Json(payload): Json<SaveProgramRequest>,
) -> axum::response::Response {
    let (resp_tx, resp_rx) = oneshot::channel();
    if state
        .handle
        .commands
        .send(FurnaceRequest::SaveProgram {
            name: payload.name,
            steps: payload.steps,
            respond_to: resp_tx,
        })
        .await
        .is_err()
    {
        return internal_error();
    }
    match resp_rx.await {
        Ok(Ok(program)) => (
            StatusCode::OK,
            Json(serde_json::json!({ "id": program.id, "program": program })),
        )
            .into_response(),
        Ok(Err(e)) => json_error(&e.to_string(), StatusCode::BAD_REQUEST),
        Err(_) => internal_error(),
    }
}

async fn delete_program_handler(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> axum::response::Response {
    let (resp_tx, resp_rx) = oneshot::channel();
    if state
        .handle
        .commands
        .send(FurnaceRequest::DeleteProgram { id, respond_to: resp_tx })
        .await
        .is_err()
    {
        return internal_error();
    }
    match resp_rx.await {
        Ok(Ok(())) => (StatusCode::OK, Json(serde_json::json!({ "deleted": true }))).into_response(),
        Ok(Err(e @ CatalogError::NotFound(_))) => {
            json_error(&e.to_string(), StatusCode::NOT_FOUND)
        }
        Ok(Err(e @ CatalogError::NotDeletable(_))) => {
            json_error(&e.to_string(), StatusCode::BAD_REQUEST)
        }
        Ok(Err(e)) => json_error(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR),
        Err(_) => internal_error(),
    }
}

async fn clear_errors_handler(State(state): State<AppState>) -> axum::response::Response {
    let (resp_tx, resp_rx) = oneshot::channel();
    if state
        .handle
        .commands
        .send(FurnaceRequest::ClearErrors { respond_to: resp_tx })
        .await
        .is_err()
    {
        return internal_error();
    }
    match resp_rx.await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "ok": true }))).into_response(),
        Err(_) => internal_error(),
    }
}

async fn self_test_handler(
    State(state): State<AppState>,
    Path(target): Path<String>,
) -> axum::response::Response {
    let Some(target) = TestTarget::parse(&target) else {
        return json_error("unknown test target", StatusCode::NOT_FOUND);
    };
    let (resp_tx, resp_rx) = oneshot::channel();
    if state
        .handle
        .commands
        .send(FurnaceRequest::SelfTest {
            target,
            respond_to: resp_tx,
        })
        .await
        .is_err()
    {
        return internal_error();
    }
    match resp_rx.await {
        Ok(Ok(report)) => (StatusCode::OK, Json(report)).into_response(),
        Ok(Err(reason)) => json_error(&reason, StatusCode::BAD_REQUEST),
        Err(_) => internal_error(),
    }
}
