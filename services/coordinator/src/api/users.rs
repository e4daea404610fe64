//! User API handlers.
//!
//! # Purpose
//! Reads and edits user records on behalf of the user itself, an admin of a
//! chain the user belongs to, or root; lists chain members; moves memberships
//! between chains; deletes accounts.
//!
//! # Key invariants and assumptions
//! - Listing applies the approval rule: admins and root see every membership,
//!   other members must be approved and see approved members only, without
//!   anyone else's email address.
//! - Account deletion is self-service or root only; chain admins cannot purge.
use crate::api::error::{ApiError, api_forbidden, api_not_found, api_validation_error};
use crate::api::types::{PurgeQuery, TransferChainRequest, UserQuery, UserUpdateRequest, UserView};
use crate::api::{
    authorize_acting_or_self, authorize_request, parse_group_uid, parse_optional_group_uid,
    parse_optional_user_uid, parse_user_uid, record_transition,
};
use crate::app::AppState;
use crate::auth::token::session_cookie;
use crate::notify::Notification;
use axum::Json;
use axum::extract::{Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use loop_authz::{AuthLevel, TransferMode};

#[utoipa::path(
    get,
    path = "/v2/user",
    tag = "users",
    params(UserQuery),
    responses(
        (status = 200, description = "User with memberships", body = UserView),
        (status = 403, description = "Not allowed to see this user", body = crate::api::types::ErrorResponse),
        (status = 404, description = "User or chain not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn get_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<UserQuery>,
) -> Result<Json<UserView>, ApiError> {
    let target_uid = parse_optional_user_uid(query.user_uid.as_deref())?;
    let group_uid = parse_optional_group_uid(query.chain_uid.as_deref())?;
    let acting = authorize_acting_or_self(&state, &headers, target_uid, group_uid.as_ref()).await?;
    Ok(Json(UserView::new(
        &acting.target,
        acting.target_memberships.iter(),
    )))
}

#[utoipa::path(
    get,
    path = "/v2/user/all-chain",
    tag = "users",
    params(crate::api::types::ChainQuery),
    responses(
        (status = 200, description = "Members of the chain", body = [UserView]),
        (status = 403, description = "Not an approved member", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn list_chain_members(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<crate::api::types::ChainQuery>,
) -> Result<Json<Vec<UserView>>, ApiError> {
    let group_uid = parse_group_uid(&query.chain_uid)?;
    let authorized =
        authorize_request(&state, &headers, AuthLevel::GroupMember, Some(&group_uid)).await?;
    let full_view = authorized.administers(&group_uid);
    if !full_view && !authorized.memberships.is_approved_member(&group_uid) {
        return Err(api_forbidden("membership of this chain is not yet approved"));
    }

    let members = state.store.group_members(&group_uid).await?;
    let caller = &authorized.principal.uid;
    let views = members
        .iter()
        .filter(|member| full_view || member.membership.is_approved())
        .map(|member| {
            let view = UserView::from_member(member);
            if full_view || &member.principal.uid == caller {
                view
            } else {
                view.redacted()
            }
        })
        .collect();
    Ok(Json(views))
}

#[utoipa::path(
    patch,
    path = "/v2/user",
    tag = "users",
    request_body = UserUpdateRequest,
    responses(
        (status = 200, description = "Updated user", body = UserView),
        (status = 400, description = "chain_paused without chain_uid", body = crate::api::types::ErrorResponse),
        (status = 403, description = "Not allowed to edit this user", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn update_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UserUpdateRequest>,
) -> Result<Json<UserView>, ApiError> {
    let target_uid = parse_optional_user_uid(body.user_uid.as_deref())?;
    let group_uid = parse_optional_group_uid(body.chain_uid.as_deref())?;
    let acting = authorize_acting_or_self(&state, &headers, target_uid, group_uid.as_ref()).await?;
    let user_uid = acting.target.uid.clone();
    let result = state
        .store
        .update_principal(
            &user_uid,
            &body.patch(),
            group_uid.as_ref(),
            acting.is_self(),
            Utc::now(),
        )
        .await;
    record_transition("update_user", &result);
    let update = result?;
    if !update.revocation.is_empty() {
        tracing::info!(
            user = %user_uid,
            demoted = update.revocation.demoted.len(),
            closed = update.revocation.closed.len(),
            "legal acceptance withdrawn"
        );
    }
    let memberships = state.store.memberships_of(&user_uid).await?;
    Ok(Json(UserView::new(&update.principal, &memberships)))
}

#[utoipa::path(
    post,
    path = "/v2/user/transfer-chain",
    tag = "users",
    request_body = TransferChainRequest,
    responses(
        (status = 204, description = "Membership transferred or copied"),
        (status = 400, description = "Source and destination chain are the same", body = crate::api::types::ErrorResponse),
        (status = 403, description = "Not an admin of both chains", body = crate::api::types::ErrorResponse),
        (status = 409, description = "Last admin of an open chain", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn transfer_chain(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<TransferChainRequest>,
) -> Result<StatusCode, ApiError> {
    let user_uid = parse_user_uid(&body.user_uid)?;
    let from = parse_group_uid(&body.from_chain_uid)?;
    let to = parse_group_uid(&body.to_chain_uid)?;
    if from == to {
        return Err(api_validation_error("source and destination chain are the same"));
    }
    let authorized = authorize_request(&state, &headers, AuthLevel::GroupAdmin, Some(&from)).await?;
    if !authorized.administers(&to) {
        return Err(api_forbidden("must be an admin of the destination chain"));
    }
    let (op, mode) = if body.is_copy {
        ("copy", TransferMode::Copy)
    } else {
        ("transfer", TransferMode::Transfer)
    };
    let result = state
        .store
        .transfer_membership(&user_uid, &from, &to, mode, Utc::now())
        .await;
    record_transition(op, &result);
    let plan = result?;
    tracing::info!(user = %user_uid, from = %from, to = %to, plan = ?plan, "membership {}", op);
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/v2/user/purge",
    tag = "users",
    params(PurgeQuery),
    responses(
        (status = 204, description = "Account deleted"),
        (status = 403, description = "Only the user itself or root may purge", body = crate::api::types::ErrorResponse),
        (status = 409, description = "User still holds bags or is sole admin of an active chain", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn purge_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PurgeQuery>,
) -> Result<Response, ApiError> {
    let authorized = authorize_request(&state, &headers, AuthLevel::AnyUser, None).await?;
    let target_uid = parse_optional_user_uid(query.user_uid.as_deref())?
        .unwrap_or_else(|| authorized.principal.uid.clone());
    let is_self = target_uid == authorized.principal.uid;
    if !is_self && !authorized.is_root() {
        return Err(api_forbidden("only the user itself or root may delete an account"));
    }
    let target = state
        .store
        .principal_by_uid(&target_uid)
        .await?
        .ok_or_else(|| api_not_found("user not found"))?;

    let result = state.store.purge_principal(&target_uid).await;
    record_transition("purge", &result);
    let plan = result?;
    tracing::info!(
        user = %target_uid,
        memberships = plan.memberships.len(),
        dissolved = plan.dissolved.len(),
        "account purged"
    );
    state
        .notifier
        .notify(Notification::AccountDeleted {
            user_uid: target_uid,
            email: target.email,
        })
        .await;

    if is_self {
        let cleared = session_cookie("", 0);
        return Ok((StatusCode::NO_CONTENT, [(SET_COOKIE, cleared)]).into_response());
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}
