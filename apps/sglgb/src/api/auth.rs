//! # Authentication Module
//!
//! Two independent checks:
//!
//! 1. An optional API key (`SGLGB_API_KEY`) guards every endpoint except
//!    `/health`. Send it as `Authorization: Bearer <key>`.
//! 2. The caller's identity comes from `x-user-id` and `x-user-role`,
//!    set by the identity gateway in front of the portal. Handlers that
//!    act on behalf of a user extract a [`Caller`].

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{HeaderMap, Request, StatusCode, header, request::Parts},
    middleware::Next,
    response::Response,
};
use sglgb_core::{Actor, Role, UserId};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use super::types::ApiError;

/// Header carrying the numeric user id.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the role, e.g. `assessor`.
pub const USER_ROLE_HEADER: &str = "x-user-role";

// =============================================================================
// API KEY AUTHENTICATION
// =============================================================================

/// Compare keys in constant time. Both sides are padded to the same length
/// so the comparison never leaks the expected key's length.
#[must_use]
pub fn keys_match(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();

    let max_len = provided.len().max(expected.len());
    let mut padded_provided = vec![0u8; max_len];
    let mut padded_expected = vec![0u8; max_len];
    padded_provided[..provided.len()].copy_from_slice(provided);
    padded_expected[..expected.len()].copy_from_slice(expected);

    let bytes_match: bool = padded_provided.ct_eq(&padded_expected).into();
    bytes_match && provided.len() == expected.len()
}

/// API key authentication middleware. Installed only when a key is
/// configured; `/health` is always allowed for load balancer checks.
pub async fn api_key_auth_middleware(
    State(expected): State<Arc<str>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match auth_header {
        Some(value) => {
            // Accept both "Bearer <key>" and the raw key
            let provided = value.strip_prefix("Bearer ").unwrap_or(value);
            if keys_match(provided, &expected) {
                Ok(next.run(request).await)
            } else {
                tracing::warn!(
                    event = "auth_failure",
                    reason = "invalid_api_key",
                    "Authentication failed: invalid API key"
                );
                Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
            }
        }
        None => {
            tracing::warn!(
                event = "auth_failure",
                reason = "missing_authorization_header",
                "Missing Authorization header"
            );
            Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
    }
}

// =============================================================================
// CALLER IDENTITY
// =============================================================================

/// The authenticated user behind a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub Actor);

impl Caller {
    /// Read the identity headers.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let header_str = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ApiError::Unauthenticated(format!("Missing {} header", name)))
        };

        let user_id = header_str(USER_ID_HEADER)?
            .parse::<u64>()
            .map_err(|_| ApiError::Unauthenticated(format!("Invalid {} header", USER_ID_HEADER)))?;
        let role_raw = header_str(USER_ROLE_HEADER)?;
        let role = Role::parse(role_raw)
            .ok_or_else(|| ApiError::Unauthenticated(format!("Unknown role '{}'", role_raw)))?;

        Ok(Caller(Actor::new(UserId(user_id), role)))
    }
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers).inspect_err(|e| {
            tracing::warn!(event = "auth_failure", reason = "identity", error = ?e, "Rejected caller identity");
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
