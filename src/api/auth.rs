//! Request authentication extractors.
//!
//! The token is read from `Authorization: Bearer <token>` or, for browser
//! WebSockets which cannot set headers, from the `token` query parameter.

use axum::extract::{FromRequestParts, Query};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use serde::Deserialize;

use crate::app_state::AppState;
use crate::domain::Principal;
use crate::error::ChatError;

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Extracts the raw credential of a request, if any.
#[must_use]
pub fn request_token(parts: &Parts) -> Option<String> {
    let from_header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string());

    from_header
        .or_else(|| {
            Query::<TokenQuery>::try_from_uri(&parts.uri)
                .ok()
                .and_then(|Query(q)| q.token)
        })
        .filter(|t| !t.is_empty())
}

impl FromRequestParts<AppState> for Principal {
    type Rejection = ChatError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = request_token(parts).ok_or(ChatError::Unauthorized)?;
        state.authenticate(&token).await
    }
}

/// Extractor admitting support staff only.
#[derive(Debug, Clone, Copy)]
pub struct AdminPrincipal;

impl FromRequestParts<AppState> for AdminPrincipal {
    type Rejection = ChatError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match Principal::from_request_parts(parts, state).await? {
            Principal::Admin => Ok(Self),
            Principal::User(_) => Err(ChatError::Forbidden),
        }
    }
}

/// Extractor admitting end users only, yielding their user ID.
#[derive(Debug, Clone, Copy)]
pub struct UserPrincipal(pub i64);

impl FromRequestParts<AppState> for UserPrincipal {
    type Rejection = ChatError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match Principal::from_request_parts(parts, state).await? {
            Principal::User(user_id) => Ok(Self(user_id)),
            Principal::Admin => Err(ChatError::Forbidden),
        }
    }
}
