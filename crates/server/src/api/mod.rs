//! Authenticated JSON API mounted under `/api/v1`.

use axum::Router;

use crate::state::AppState;

pub mod clients;
pub mod quotes;
pub mod services;
pub mod users;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(clients::router())
        .merge(services::router())
        .merge(quotes::router())
        .merge(users::router())
}
