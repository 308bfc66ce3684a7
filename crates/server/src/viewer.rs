//! Unauthenticated read-only access through share links.

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use quotecraft_core::clock::Clock;
use quotecraft_core::domain::quote::{QuoteDetails, SharedQuoteView};
use quotecraft_core::errors::{ApplicationError, EntityKind};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ViewQuery {
    #[serde(default)]
    pub token: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/view", get(view_quote))
        .route("/view/document", get(view_document))
}

async fn view_quote(
    State(state): State<AppState>,
    Query(query): Query<ViewQuery>,
) -> Result<Json<SharedQuoteView>, ApiError> {
    let details = shared_details(&state, query).await?;
    Ok(Json(SharedQuoteView::at(&details, state.clock.today())))
}

async fn view_document(
    State(state): State<AppState>,
    Query(query): Query<ViewQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let details = shared_details(&state, query).await?;
    let document = state.renderer.render(&details).map_err(ApplicationError::from)?;
    let html = String::from_utf8_lossy(&document.bytes).into_owned();

    Ok(([(header::CACHE_CONTROL, "no-store")], Html(html)))
}

/// Missing, malformed, expired and revoked tokens share one response.
async fn shared_details(state: &AppState, query: ViewQuery) -> Result<QuoteDetails, ApiError> {
    let token = query.token.unwrap_or_default();
    if token.is_empty() {
        return Err(ApplicationError::NotFound(EntityKind::Quote).into());
    }
    Ok(state.quotes.get_shared_details(&token).await?)
}
