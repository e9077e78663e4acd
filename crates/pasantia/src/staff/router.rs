use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tracing::error;

use super::{NewStaffUser, StaffDirectory, StaffError, StaffUserId};

/// Staff account administration endpoints.
pub fn staff_router(directory: Arc<StaffDirectory>) -> Router {
    Router::new()
        .route("/api/Usuarios", get(list_handler).post(create_handler))
        .route("/api/Usuarios/:usuario_id", get(get_handler))
        .route("/api/Usuarios/:usuario_id/estado", put(set_active_handler))
        .route("/api/Usuarios/:usuario_id/acceso", post(access_handler))
        .with_state(directory)
}

async fn list_handler(State(directory): State<Arc<StaffDirectory>>) -> Response {
    match directory.list().await {
        Ok(users) => (StatusCode::OK, Json(users)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn get_handler(
    State(directory): State<Arc<StaffDirectory>>,
    Path(id): Path<i64>,
) -> Response {
    match directory.get(StaffUserId(id)).await {
        Ok(user) => (StatusCode::OK, Json(user)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn create_handler(
    State(directory): State<Arc<StaffDirectory>>,
    Json(payload): Json<NewStaffUser>,
) -> Response {
    let user = match payload.validate() {
        Ok(user) => user,
        Err(errors) => return error_response(errors.into()),
    };
    match directory.create(user).await {
        Ok(user) => (StatusCode::CREATED, Json(user)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn set_active_handler(
    State(directory): State<Arc<StaffDirectory>>,
    Path(id): Path<i64>,
    Json(active): Json<bool>,
) -> Response {
    match directory.set_active(StaffUserId(id), active).await {
        Ok(user) => (StatusCode::OK, Json(user)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn access_handler(
    State(directory): State<Arc<StaffDirectory>>,
    Path(id): Path<i64>,
) -> Response {
    match directory.record_access(StaffUserId(id), Utc::now()).await {
        Ok(user) => (StatusCode::OK, Json(user)).into_response(),
        Err(err) => error_response(err),
    }
}

fn error_response(err: StaffError) -> Response {
    let (status, payload) = match &err {
        StaffError::Validation(errors) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({
                "error": "El usuario contiene datos inválidos",
                "errors": errors.fields(),
            }),
        ),
        StaffError::NotFound(_) => (StatusCode::NOT_FOUND, json!({ "error": err.to_string() })),
        StaffError::DuplicateEmail(_) => {
            (StatusCode::CONFLICT, json!({ "error": err.to_string() }))
        }
        StaffError::CorruptRole(_) | StaffError::Database(_) => {
            error!(error = %err, "staff request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": err.to_string() }),
            )
        }
    };
    (status, Json(payload)).into_response()
}
