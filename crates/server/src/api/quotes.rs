use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use quotecraft_core::delivery::DeliveryReceipt;
use quotecraft_core::domain::client::ClientId;
use quotecraft_core::domain::quote::{
    Quote, QuoteDetails, QuoteDraft, QuoteFilter, QuoteId, QuoteStatus, QuoteSummary, QuoteUpdate,
};
use quotecraft_core::errors::ApplicationError;
use quotecraft_core::numbering::QuoteNumber;
use quotecraft_core::sharing::share_link;

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Flat query form of [`QuoteFilter`]; `status` arrives as its label.
#[derive(Debug, Default, Deserialize)]
pub struct QuoteQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub client_id: Option<i64>,
    #[serde(default)]
    pub search: Option<String>,
}

impl QuoteQuery {
    fn into_filter(self) -> Result<QuoteFilter, ApiError> {
        let status = self
            .status
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .map(str::parse::<QuoteStatus>)
            .transpose()?;
        Ok(QuoteFilter { status, client_id: self.client_id.map(ClientId), search: self.search })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct NextNumberQuery {
    #[serde(default)]
    pub year: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct NextNumberResponse {
    pub quote_number: QuoteNumber,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: QuoteStatus,
}

#[derive(Debug, Serialize)]
pub struct ShareResponse {
    pub link: String,
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct SendQuery {
    #[serde(default = "attach_by_default")]
    pub attach_document: bool,
}

fn attach_by_default() -> bool {
    true
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/quotes", get(list_quotes).post(create_quote))
        .route("/quotes/next-number", get(next_number))
        .route("/quotes/{id}", get(get_quote).put(update_quote).delete(delete_quote))
        .route("/quotes/{id}/status", put(set_status))
        .route("/quotes/{id}/visibility", post(toggle_visibility))
        .route("/quotes/{id}/share", post(share_quote).delete(revoke_share))
        .route("/quotes/{id}/send", post(send_quote))
        .route("/quotes/{id}/document", get(quote_document))
}

async fn list_quotes(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Query(query): Query<QuoteQuery>,
) -> Result<Json<Vec<QuoteSummary>>, ApiError> {
    let filter = query.into_filter()?;
    Ok(Json(state.quotes.list(&actor, &filter).await?))
}

async fn create_quote(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Json(draft): Json<QuoteDraft>,
) -> Result<(StatusCode, Json<QuoteDetails>), ApiError> {
    let quote = state.quotes.create(&actor, draft).await?;
    let details = state.quotes.get_details(&actor, quote.id).await?;
    Ok((StatusCode::CREATED, Json(details)))
}

async fn next_number(
    State(state): State<AppState>,
    AuthenticatedUser(_actor): AuthenticatedUser,
    Query(query): Query<NextNumberQuery>,
) -> Result<Json<NextNumberResponse>, ApiError> {
    let year = query.year.unwrap_or_else(|| state.clock.today().year());
    let quote_number = state.quotes.preview_next_number(year).await?;
    Ok(Json(NextNumberResponse { quote_number }))
}

async fn get_quote(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<QuoteDetails>, ApiError> {
    Ok(Json(state.quotes.get_details(&actor, QuoteId(id)).await?))
}

async fn update_quote(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(update): Json<QuoteUpdate>,
) -> Result<Json<QuoteDetails>, ApiError> {
    Ok(Json(state.quotes.update(&actor, QuoteId(id), update).await?))
}

async fn delete_quote(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.quotes.delete(&actor, QuoteId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_status(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<Quote>, ApiError> {
    Ok(Json(state.quotes.set_status(&actor, QuoteId(id), request.status).await?))
}

async fn toggle_visibility(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Quote>, ApiError> {
    Ok(Json(state.quotes.toggle_visibility(&actor, QuoteId(id)).await?))
}

async fn share_quote(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<ShareResponse>, ApiError> {
    let grant = state.quotes.ensure_token(&actor, QuoteId(id)).await?;
    Ok(Json(ShareResponse {
        link: share_link(&state.share_base_url, &grant.token),
        token: grant.token.as_str().to_string(),
        expires_at: grant.expires_at,
    }))
}

async fn revoke_share(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.quotes.revoke_token(&actor, QuoteId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn send_quote(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i64>,
    Query(query): Query<SendQuery>,
) -> Result<Json<DeliveryReceipt>, ApiError> {
    Ok(Json(state.delivery.send(&actor, QuoteId(id), query.attach_document).await?))
}

async fn quote_document(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Html<String>, ApiError> {
    let details = state.quotes.get_details(&actor, QuoteId(id)).await?;
    let document = state.renderer.render(&details).map_err(ApplicationError::from)?;
    Ok(Html(String::from_utf8_lossy(&document.bytes).into_owned()))
}
