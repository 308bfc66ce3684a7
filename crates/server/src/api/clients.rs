use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use quotecraft_core::domain::client::{Client, ClientId, ClientInput};

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ClientQuery {
    #[serde(default)]
    pub search: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/clients", get(list_clients).post(create_client))
        .route("/clients/{id}", get(get_client).put(update_client).delete(delete_client))
        .route("/clients/{id}/visibility", post(toggle_visibility))
}

async fn list_clients(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Query(query): Query<ClientQuery>,
) -> Result<Json<Vec<Client>>, ApiError> {
    let clients = match query.search.as_deref() {
        Some(term) => state.clients.search(&actor, term).await?,
        None => state.clients.list(&actor).await?,
    };
    Ok(Json(clients))
}

async fn create_client(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Json(input): Json<ClientInput>,
) -> Result<(StatusCode, Json<Client>), ApiError> {
    let client = state.clients.create(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

async fn get_client(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Client>, ApiError> {
    Ok(Json(state.clients.get(&actor, ClientId(id)).await?))
}

async fn update_client(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<ClientInput>,
) -> Result<Json<Client>, ApiError> {
    Ok(Json(state.clients.update(&actor, ClientId(id), input).await?))
}

async fn delete_client(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.clients.delete(&actor, ClientId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_visibility(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Client>, ApiError> {
    Ok(Json(state.clients.toggle_visibility(&actor, ClientId(id)).await?))
}
