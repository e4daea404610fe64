//! Chain (group) API handlers.
//!
//! # Purpose
//! Creates and edits chains and drives every membership transition that is
//! scoped to one chain: join, approve, deny, promote/demote, remove.
//!
//! # Key invariants and assumptions
//! - Every handler decides authorization before touching the store; the store
//!   re-checks transition guards inside its own atomic unit.
//! - Notifications fire only after the store call returned successfully.
use crate::api::error::{ApiError, api_forbidden, api_not_found, api_validation_error};
use crate::api::types::{
    ChainAddUserRequest, ChainCreateRequest, ChainJoinRequest, ChainQuery, ChainUpdateRequest,
    ChainUserRequest, ChainView, MembershipView, UnapprovedUserQuery,
};
use crate::api::{
    authorize_acting, authorize_request, parse_group_uid, parse_user_uid, record_transition,
};
use crate::app::AppState;
use crate::auth::session;
use crate::notify::{DenyReason, Notification};
use axum::Json;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use chrono::Utc;
use loop_authz::{ActingOnUser, AuthLevel, Group, GroupUid};
use uuid::Uuid;

/// Approve and deny are admin decisions: a pending member acting on itself
/// does not qualify.
fn require_group_authority(acting: &ActingOnUser, group_uid: &GroupUid) -> Result<(), ApiError> {
    if acting.actor.administers(group_uid) {
        Ok(())
    } else {
        Err(api_forbidden("must be a chain admin to decide join requests"))
    }
}

#[utoipa::path(
    post,
    path = "/v2/chain",
    tag = "chains",
    request_body = ChainCreateRequest,
    responses(
        (status = 201, description = "Chain created; caller is its admin", body = ChainView),
        (status = 401, description = "Not logged in", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn create_chain(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ChainCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let authorized = authorize_request(&state, &headers, AuthLevel::AnyUser, None).await?;
    let name = body.name.trim();
    if name.is_empty() {
        return Err(api_validation_error("name is required"));
    }
    let group = Group {
        uid: GroupUid::new(Uuid::new_v4().to_string()),
        name: name.to_string(),
        description: body.description,
        open_to_new_members: true,
        published: true,
    };
    let result = state
        .store
        .create_group(group.clone(), &authorized.principal.uid, Utc::now())
        .await;
    record_transition("create_group", &result);
    result?;
    tracing::info!(group = %group.uid, founder = %authorized.principal.uid, "chain created");
    Ok((StatusCode::CREATED, Json(ChainView::from(&group))))
}

#[utoipa::path(
    get,
    path = "/v2/chain",
    tag = "chains",
    params(ChainQuery),
    responses(
        (status = 200, description = "Chain details", body = ChainView),
        (status = 404, description = "Chain not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn get_chain(
    State(state): State<AppState>,
    Query(query): Query<ChainQuery>,
) -> Result<Json<ChainView>, ApiError> {
    let group_uid = parse_group_uid(&query.chain_uid)?;
    let group = state
        .store
        .group_by_uid(&group_uid)
        .await?
        .ok_or_else(|| api_not_found("chain not found"))?;
    Ok(Json(ChainView::from(&group)))
}

#[utoipa::path(
    patch,
    path = "/v2/chain",
    tag = "chains",
    request_body = ChainUpdateRequest,
    responses(
        (status = 200, description = "Chain updated", body = ChainView),
        (status = 403, description = "Not a chain admin", body = crate::api::types::ErrorResponse),
        (status = 409, description = "Chain has no admin to publish or open it", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn update_chain(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ChainUpdateRequest>,
) -> Result<Json<ChainView>, ApiError> {
    let group_uid = parse_group_uid(&body.chain_uid)?;
    authorize_request(&state, &headers, AuthLevel::GroupAdmin, Some(&group_uid)).await?;
    let result = state.store.update_group(&group_uid, &body.patch()).await;
    record_transition("update_group", &result);
    Ok(Json(ChainView::from(&result?)))
}

#[utoipa::path(
    post,
    path = "/v2/chain/join",
    tag = "chains",
    request_body = ChainJoinRequest,
    responses(
        (status = 201, description = "Join request created", body = MembershipView),
        (status = 409, description = "Already a member or chain closed", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn join_chain(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ChainJoinRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let group_uid = parse_group_uid(&body.chain_uid)?;
    let authorized = authorize_request(&state, &headers, AuthLevel::AnyUser, None).await?;
    let user_uid = authorized.principal.uid;
    let result = state
        .store
        .join_group(&user_uid, &group_uid, Utc::now())
        .await;
    record_transition("join", &result);
    let membership = result?;
    session::notify_participant_joined(&state, &group_uid, &user_uid).await;
    Ok((StatusCode::CREATED, Json(MembershipView::from(&membership))))
}

#[utoipa::path(
    post,
    path = "/v2/chain/add-user",
    tag = "chains",
    request_body = ChainAddUserRequest,
    responses(
        (status = 200, description = "Admin flag set", body = MembershipView),
        (status = 404, description = "Membership not found", body = crate::api::types::ErrorResponse),
        (status = 409, description = "Pending member or last admin", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn add_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ChainAddUserRequest>,
) -> Result<Json<MembershipView>, ApiError> {
    let group_uid = parse_group_uid(&body.chain_uid)?;
    let user_uid = parse_user_uid(&body.user_uid)?;
    // Promotion needs an admin of the chain; stepping down is a delegated action.
    if body.is_chain_admin {
        authorize_request(&state, &headers, AuthLevel::GroupAdmin, Some(&group_uid)).await?;
    } else {
        authorize_acting(&state, &headers, Some(&user_uid), Some(&group_uid)).await?;
    }
    let result = state
        .store
        .set_admin(&user_uid, &group_uid, body.is_chain_admin)
        .await;
    record_transition("set_admin", &result);
    Ok(Json(MembershipView::from(&result?)))
}

#[utoipa::path(
    post,
    path = "/v2/chain/remove-user",
    tag = "chains",
    request_body = ChainUserRequest,
    responses(
        (status = 204, description = "Member removed"),
        (status = 403, description = "Not allowed to act on this user", body = crate::api::types::ErrorResponse),
        (status = 409, description = "Last admin of an open chain", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn remove_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ChainUserRequest>,
) -> Result<StatusCode, ApiError> {
    let group_uid = parse_group_uid(&body.chain_uid)?;
    let user_uid = parse_user_uid(&body.user_uid)?;
    let acting = authorize_acting(&state, &headers, Some(&user_uid), Some(&group_uid)).await?;
    let result = state.store.remove_membership(&user_uid, &group_uid).await;
    record_transition("remove", &result);
    result?;
    tracing::info!(
        user = %user_uid,
        group = %group_uid,
        relation = acting.relation.as_str(),
        "member removed"
    );
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    patch,
    path = "/v2/chain/approve-user",
    tag = "chains",
    request_body = ChainUserRequest,
    responses(
        (status = 200, description = "Join request approved", body = MembershipView),
        (status = 403, description = "Not a chain admin", body = crate::api::types::ErrorResponse),
        (status = 409, description = "Already approved", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn approve_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ChainUserRequest>,
) -> Result<Json<MembershipView>, ApiError> {
    let group_uid = parse_group_uid(&body.chain_uid)?;
    let user_uid = parse_user_uid(&body.user_uid)?;
    let acting = authorize_acting(&state, &headers, Some(&user_uid), Some(&group_uid)).await?;
    require_group_authority(&acting, &group_uid)?;
    let result = state
        .store
        .approve_membership(&user_uid, &group_uid, Utc::now())
        .await;
    record_transition("approve", &result);
    let membership = result?;
    state
        .notifier
        .notify(Notification::JoinApproved {
            group_uid,
            user_uid,
        })
        .await;
    Ok(Json(MembershipView::from(&membership)))
}

#[utoipa::path(
    delete,
    path = "/v2/chain/unapproved-user",
    tag = "chains",
    params(UnapprovedUserQuery),
    responses(
        (status = 204, description = "Join request denied"),
        (status = 403, description = "Not a chain admin", body = crate::api::types::ErrorResponse),
        (status = 409, description = "Membership already approved", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn deny_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<UnapprovedUserQuery>,
) -> Result<StatusCode, ApiError> {
    let group_uid = parse_group_uid(&query.chain_uid)?;
    let user_uid = parse_user_uid(&query.user_uid)?;
    let acting = authorize_acting(&state, &headers, Some(&user_uid), Some(&group_uid)).await?;
    require_group_authority(&acting, &group_uid)?;
    let result = state.store.deny_membership(&user_uid, &group_uid).await;
    record_transition("deny", &result);
    result?;
    state
        .notifier
        .notify(Notification::JoinDenied {
            group_uid,
            user_uid,
            reason: query.reason.unwrap_or(DenyReason::Other),
        })
        .await;
    Ok(StatusCode::NO_CONTENT)
}
