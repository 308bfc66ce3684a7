use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use quotecraft_core::errors::ApplicationError;
use quotecraft_core::visibility::Principal;

use crate::error::ApiError;
use crate::state::AppState;

/// Principal resolved from HTTP Basic credentials against the users table.
#[derive(Clone, Copy, Debug)]
pub struct AuthenticatedUser(pub Principal);

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let (username, password) = basic_credentials(&parts.headers)
            .ok_or_else(|| ApiError::from(ApplicationError::Unauthenticated))?;

        let user = state.users.authenticate(&username, &password).await?;
        Ok(Self(Principal::user(user.id, user.role)))
    }
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}
