use axum::Router;

use crate::state::AppState;
use crate::{api, health, viewer};

pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(viewer::router())
        .nest("/api/v1", api::router())
        .with_state(state)
}
