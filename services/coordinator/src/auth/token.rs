//! Request credential extraction and resolution.
//!
//! # Key invariants
//! - The `Authorization: Bearer` header wins over the `token` cookie.
//! - A request without a credential resolves to no principal; the engine
//!   reports that as unauthenticated. A credential that is present but
//!   unknown, unverified, or expired is rejected here with 401.
//!
//! # Security considerations
//! - Only the digest of the presented token is used for lookups.
use crate::api::error::{ApiError, api_unauthorized};
use crate::app::AppState;
use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, COOKIE};
use chrono::Utc;
use loop_authz::{Principal, digest};

pub const TOKEN_COOKIE: &str = "token";

/// `Set-Cookie` value carrying `token`, sent over HTTPS only; an empty token
/// with age 0 clears it.
pub fn session_cookie(token: &str, max_age_secs: i64) -> String {
    format!("{TOKEN_COOKIE}={token}; Path=/; HttpOnly; Secure; SameSite=Lax; Max-Age={max_age_secs}")
}

/// Returns the presented token, if any.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(bearer) = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        return Some(bearer.to_string());
    }
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == TOKEN_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

pub async fn resolve_principal(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<Principal>, ApiError> {
    let Some(token) = extract_token(headers) else {
        return Ok(None);
    };
    let result = resolve_token(state, &token).await;
    record_resolution(&result);
    result.map(Some)
}

async fn resolve_token(state: &AppState, token: &str) -> Result<Principal, ApiError> {
    let credential = state
        .store
        .credential_by_digest(&digest(token))
        .await?
        .ok_or_else(|| api_unauthorized("invalid credential"))?;
    credential.check_session(Utc::now())?;
    state
        .store
        .principal_by_uid(&credential.user_uid)
        .await?
        .ok_or_else(|| api_unauthorized("invalid credential"))
}

fn record_resolution(result: &Result<Principal, ApiError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(err) if err.status.is_server_error() => "error",
        Err(_) => "rejected",
    };
    metrics::counter!(crate::observability::CREDENTIALS, "op" => "resolve", "outcome" => outcome)
        .increment(1);
}
