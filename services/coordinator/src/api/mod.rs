//! Coordinator HTTP API module.
//!
//! # Purpose
//! Exposes route handler modules plus the shared steps every handler runs:
//! uid validation, credential resolution followed by an authorization
//! decision, and transition metrics.
pub mod chains;
pub mod error;
pub mod login;
pub mod openapi;
pub mod system;
pub mod types;
pub mod users;

use crate::api::error::{ApiError, api_validation_error};
use crate::app::AppState;
use crate::auth::token::resolve_principal;
use crate::store::StoreResult;
use axum::http::HeaderMap;
use loop_authz::{
    ActingOnUser, AuthLevel, Authorized, GroupUid, UserUid, authorize, authorize_acting_on_user,
};

pub(crate) fn parse_group_uid(value: &str) -> Result<GroupUid, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(api_validation_error("chain_uid is required"));
    }
    Ok(GroupUid::new(value))
}

pub(crate) fn parse_user_uid(value: &str) -> Result<UserUid, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(api_validation_error("user_uid is required"));
    }
    Ok(UserUid::new(value))
}

pub(crate) fn parse_optional_group_uid(value: Option<&str>) -> Result<Option<GroupUid>, ApiError> {
    value.map(parse_group_uid).transpose()
}

pub(crate) fn parse_optional_user_uid(value: Option<&str>) -> Result<Option<UserUid>, ApiError> {
    value.map(parse_user_uid).transpose()
}

/// Resolves the caller and evaluates `level` against `group_uid`.
pub(crate) async fn authorize_request(
    state: &AppState,
    headers: &HeaderMap,
    level: AuthLevel,
    group_uid: Option<&GroupUid>,
) -> Result<Authorized, ApiError> {
    let principal = resolve_principal(state, headers).await?;
    Ok(authorize(&*state.store, principal, level, group_uid).await?)
}

/// Resolves the caller and decides whether it may act on `target_uid`.
pub(crate) async fn authorize_acting(
    state: &AppState,
    headers: &HeaderMap,
    target_uid: Option<&UserUid>,
    group_uid: Option<&GroupUid>,
) -> Result<ActingOnUser, ApiError> {
    let principal = resolve_principal(state, headers).await?;
    Ok(authorize_acting_on_user(&*state.store, principal, target_uid, group_uid).await?)
}

/// Like [`authorize_acting`], but an absent target means the caller itself.
pub(crate) async fn authorize_acting_or_self(
    state: &AppState,
    headers: &HeaderMap,
    target_uid: Option<UserUid>,
    group_uid: Option<&GroupUid>,
) -> Result<ActingOnUser, ApiError> {
    let principal = resolve_principal(state, headers).await?;
    let target_uid = target_uid.or_else(|| principal.as_ref().map(|p| p.uid.clone()));
    Ok(
        authorize_acting_on_user(&*state.store, principal, target_uid.as_ref(), group_uid)
            .await?,
    )
}

pub(crate) fn record_transition<T>(op: &'static str, result: &StoreResult<T>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(err) => err.kind(),
    };
    metrics::counter!(
        crate::observability::MEMBERSHIP_TRANSITIONS,
        "op" => op,
        "outcome" => outcome
    )
    .increment(1);
}
