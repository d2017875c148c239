// crates/backend-lib/src/middleware/auth.rs

//! Bearer-token session check.
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::auth::{AccountContext, AuthGateway};
use crate::error::AppError;

/// Token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Reject the request unless it carries a live full-scope session.
///
/// On success the caller's [`AccountContext`] is inserted into the request
/// extensions, where handlers can pick it up as an extractor.
pub async fn require_session(
    State(gateway): State<Arc<AuthGateway>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers()).ok_or(AppError::SessionNotFound)?;
    let context = gateway.authenticate(token).await?;
    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for AccountContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AccountContext>()
            .cloned()
            .ok_or(AppError::SessionNotFound)
    }
}
