//! Registration, login and logout handlers.
//!
//! # Purpose
//! Drives the one-time code handshake: register or request a code by email,
//! then exchange the emailed code for a session token returned both in the
//! body and as the `token` cookie.
//!
//! # Security considerations
//! - Codes and session tokens are never logged.
//! - Requesting a code for an unknown email is a 401, matching a bad code.
use crate::api::error::{ApiError, api_not_found, api_unauthorized, api_validation_error};
use crate::api::types::{
    LoginEmailRequest, LoginValidateQuery, LoginValidateResponse, RegisterBasicUserRequest,
    UserView,
};
use crate::api::{authorize_request, parse_optional_group_uid, record_transition};
use crate::app::AppState;
use crate::auth::session;
use crate::auth::token::{extract_token, session_cookie};
use axum::Json;
use axum::extract::{Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use loop_authz::{AuthLevel, Principal, UserUid};
use uuid::Uuid;

fn normalize_email(email: &str) -> Result<String, ApiError> {
    let email = email.trim().to_ascii_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(api_validation_error("a valid email address is required"));
    }
    Ok(email)
}

#[utoipa::path(
    post,
    path = "/v2/register/basic-user",
    tag = "login",
    request_body = RegisterBasicUserRequest,
    responses(
        (status = 201, description = "User registered; a one-time code was sent", body = UserView),
        (status = 404, description = "Chain not found", body = crate::api::types::ErrorResponse),
        (status = 409, description = "Email taken or chain closed", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn register_basic_user(
    State(state): State<AppState>,
    Json(body): Json<RegisterBasicUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(api_validation_error("name is required"));
    }
    let email = normalize_email(&body.email)?;
    let join = parse_optional_group_uid(body.chain_uid.as_deref())?;

    let mut principal = Principal::new(UserUid::new(Uuid::new_v4().to_string()), name);
    principal.email = Some(email);
    let result = state
        .store
        .register_principal(principal.clone(), join.as_ref(), Utc::now())
        .await;
    record_transition("register", &result);
    let membership = result?;

    session::send_one_time_code(&state, &principal).await?;
    tracing::info!(user = %principal.uid, joined = membership.is_some(), "user registered");
    Ok((
        StatusCode::CREATED,
        Json(UserView::new(&principal, membership.iter())),
    ))
}

#[utoipa::path(
    post,
    path = "/v2/login/email",
    tag = "login",
    request_body = LoginEmailRequest,
    responses(
        (status = 200, description = "One-time code sent"),
        (status = 401, description = "Email not registered", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn login_email(
    State(state): State<AppState>,
    Json(body): Json<LoginEmailRequest>,
) -> Result<StatusCode, ApiError> {
    let email = normalize_email(&body.email)?;
    let principal = state
        .store
        .principal_by_email(&email)
        .await?
        .ok_or_else(|| api_unauthorized("email is not yet registered"))?;
    session::send_one_time_code(&state, &principal).await?;
    Ok(StatusCode::OK)
}

#[utoipa::path(
    get,
    path = "/v2/login/validate",
    tag = "login",
    params(LoginValidateQuery),
    responses(
        (status = 200, description = "Session issued", body = LoginValidateResponse),
        (status = 400, description = "Malformed link", body = crate::api::types::ErrorResponse),
        (status = 401, description = "Invalid or used code", body = crate::api::types::ErrorResponse),
        (status = 404, description = "Chain not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn login_validate(
    State(state): State<AppState>,
    Query(query): Query<LoginValidateQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let decoded = STANDARD
        .decode(query.u.trim())
        .map_err(|_| api_validation_error("malformed url: email required"))?;
    let email = String::from_utf8(decoded)
        .map_err(|_| api_validation_error("malformed url: email required"))
        .and_then(|email| normalize_email(&email))?;
    let join = parse_optional_group_uid(query.c.as_deref())?;
    if let Some(group_uid) = &join
        && state.store.group_by_uid(group_uid).await?.is_none()
    {
        return Err(api_not_found("chain not found"));
    }

    let redemption = session::redeem_one_time_code(&state, &email, &query.api_key).await?;
    let principal = redemption.principal;
    let mut memberships = redemption.memberships;

    if let Some(group_uid) = join
        && !redemption.first_verification
        && !memberships.iter().any(|m| m.group_uid == group_uid)
    {
        let result = state
            .store
            .join_group(&principal.uid, &group_uid, Utc::now())
            .await;
        record_transition("join", &result);
        match result {
            Ok(membership) => {
                session::notify_participant_joined(&state, &group_uid, &principal.uid).await;
                memberships.push(membership);
            }
            // The session is already issued; a refused join must not undo the login.
            Err(err) => {
                tracing::warn!(error = %err, group = %group_uid, "join after login refused");
            }
        }
    }

    let cookie = session_cookie(
        &redemption.session_token,
        state.credentials.session_ttl.num_seconds(),
    );
    Ok((
        [(SET_COOKIE, cookie)],
        Json(LoginValidateResponse {
            user: UserView::new(&principal, &memberships),
            token: redemption.session_token,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/v2/logout",
    tag = "login",
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "No valid session", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let authorized = authorize_request(&state, &headers, AuthLevel::AnyUser, None).await?;
    if let Some(token) = extract_token(&headers) {
        session::revoke(&state, &token).await?;
    }
    tracing::info!(user = %authorized.principal.uid, "logged out");
    Ok((
        StatusCode::NO_CONTENT,
        [(SET_COOKIE, session_cookie("", 0))],
    ))
}
