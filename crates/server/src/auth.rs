//! Bearer-token identity extraction.
//!
//! Token issuance belongs to the external auth collaborator; this layer
//! only resolves a presented token to a stored user and trusts that
//! identity for the rest of the request.

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};

use oppflow_core::domain::user::User;

use crate::api::{ApiError, AppState};

pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::validation("missing Authorization header"))?;

        let token = header_value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ApiError::validation("Authorization header must carry a bearer token"))?;

        let user = state
            .users
            .find_by_token(token)
            .await
            .map_err(ApiError::from)?
            .ok_or_else(|| ApiError::forbidden("unknown or revoked token"))?;

        Ok(CurrentUser(user))
    }
}
