use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;

use quotecraft_core::domain::service::{Service, ServiceId, ServiceInput};

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ServiceQuery {
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct ActiveRequest {
    pub active: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/services", get(list_services).post(create_service))
        .route("/services/{id}", get(get_service).put(update_service).delete(delete_service))
        .route("/services/{id}/active", put(set_active))
        .route("/services/{id}/active/toggle", post(toggle_active))
        .route("/services/{id}/visibility", post(toggle_visibility))
}

async fn list_services(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Query(query): Query<ServiceQuery>,
) -> Result<Json<Vec<Service>>, ApiError> {
    Ok(Json(state.services.list(&actor, query.active_only).await?))
}

async fn create_service(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Json(input): Json<ServiceInput>,
) -> Result<(StatusCode, Json<Service>), ApiError> {
    let service = state.services.create(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(service)))
}

async fn get_service(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Service>, ApiError> {
    Ok(Json(state.services.get(&actor, ServiceId(id)).await?))
}

async fn update_service(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<ServiceInput>,
) -> Result<Json<Service>, ApiError> {
    Ok(Json(state.services.update(&actor, ServiceId(id), input).await?))
}

/// Hard delete; historical quote items block it.
async fn delete_service(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.services.delete(&actor, ServiceId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_active(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(request): Json<ActiveRequest>,
) -> Result<Json<Service>, ApiError> {
    Ok(Json(state.services.set_active(&actor, ServiceId(id), request.active).await?))
}

async fn toggle_active(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Service>, ApiError> {
    Ok(Json(state.services.toggle_active(&actor, ServiceId(id)).await?))
}

async fn toggle_visibility(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Service>, ApiError> {
    Ok(Json(state.services.toggle_visibility(&actor, ServiceId(id)).await?))
}
