//! HTTP API request/response types.
//!
//! # Purpose
//! Payload shapes for the `/v2` REST API and its OpenAPI schema. Partial
//! updates carry [`Patch`] fields: an absent key leaves the stored value alone,
//! a present key (even `null`) overwrites it.
use crate::notify::DenyReason;
use crate::store::Member;
use chrono::{DateTime, Utc};
use loop_authz::{Group, GroupPatch, Membership, Patch, Principal, UserPatch};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct HealthStatus {
    pub status: String,
    pub backend: String,
    /// False for the in-memory backend: state is lost on restart.
    pub durable: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct MembershipView {
    pub id: i64,
    pub chain_uid: String,
    pub is_chain_admin: bool,
    pub is_approved: bool,
    /// Tenure start: request time while pending, approval time afterwards.
    pub created_at: DateTime<Utc>,
    pub is_paused: bool,
}

impl From<&Membership> for MembershipView {
    fn from(membership: &Membership) -> Self {
        Self {
            id: membership.id,
            chain_uid: membership.group_uid.as_str().to_string(),
            is_chain_admin: membership.is_admin,
            is_approved: membership.is_approved(),
            created_at: membership.joined_at,
            is_paused: membership.is_paused,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct UserView {
    pub uid: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub is_root_admin: bool,
    pub is_email_verified: bool,
    pub accepted_legal: bool,
    pub paused_until: Option<DateTime<Utc>>,
    pub chains: Vec<MembershipView>,
}

impl UserView {
    pub fn new<'a>(
        principal: &Principal,
        memberships: impl IntoIterator<Item = &'a Membership>,
    ) -> Self {
        Self {
            uid: principal.uid.as_str().to_string(),
            name: principal.name.clone(),
            email: principal.email.clone(),
            is_root_admin: principal.is_root_admin,
            is_email_verified: principal.is_email_verified,
            accepted_legal: principal.accepted_legal,
            paused_until: principal.paused_until,
            chains: memberships.into_iter().map(MembershipView::from).collect(),
        }
    }

    pub fn from_member(member: &Member) -> Self {
        Self::new(&member.principal, [&member.membership])
    }

    /// Drops contact details.
    pub fn redacted(mut self) -> Self {
        self.email = None;
        self
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct ChainView {
    pub uid: String,
    pub name: String,
    pub description: String,
    pub open_to_new_members: bool,
    pub published: bool,
}

impl From<&Group> for ChainView {
    fn from(group: &Group) -> Self {
        Self {
            uid: group.uid.as_str().to_string(),
            name: group.name.clone(),
            description: group.description.clone(),
            open_to_new_members: group.open_to_new_members,
            published: group.published,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct RegisterBasicUserRequest {
    pub name: String,
    pub email: String,
    /// Chain to request membership of right away.
    pub chain_uid: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct LoginEmailRequest {
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize, IntoParams, Clone)]
#[into_params(parameter_in = Query)]
pub struct LoginValidateQuery {
    /// One-time code.
    #[serde(rename = "apiKey")]
    pub api_key: String,
    /// Standard base64 encoding of the email address.
    pub u: String,
    /// Chain to request membership of after login.
    pub c: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct LoginValidateResponse {
    pub user: UserView,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ChainCreateRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize, IntoParams, Clone)]
#[into_params(parameter_in = Query)]
pub struct ChainQuery {
    pub chain_uid: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ChainUpdateRequest {
    pub chain_uid: String,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    #[schema(value_type = Option<String>)]
    pub name: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    #[schema(value_type = Option<String>)]
    pub description: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    #[schema(value_type = Option<bool>)]
    pub open_to_new_members: Patch<bool>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    #[schema(value_type = Option<bool>)]
    pub published: Patch<bool>,
}

impl ChainUpdateRequest {
    pub fn patch(&self) -> GroupPatch {
        GroupPatch {
            name: self.name.clone(),
            description: self.description.clone(),
            open_to_new_members: self.open_to_new_members.clone(),
            published: self.published.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ChainJoinRequest {
    pub chain_uid: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ChainAddUserRequest {
    pub user_uid: String,
    pub chain_uid: String,
    pub is_chain_admin: bool,
}

/// Names one member of one chain.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ChainUserRequest {
    pub user_uid: String,
    pub chain_uid: String,
}

#[derive(Debug, Serialize, Deserialize, IntoParams, Clone)]
#[into_params(parameter_in = Query)]
pub struct UnapprovedUserQuery {
    pub user_uid: String,
    pub chain_uid: String,
    pub reason: Option<DenyReason>,
}

#[derive(Debug, Serialize, Deserialize, IntoParams, Clone, Default)]
#[into_params(parameter_in = Query)]
pub struct UserQuery {
    /// Defaults to the caller.
    pub user_uid: Option<String>,
    pub chain_uid: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Default)]
pub struct UserUpdateRequest {
    /// Defaults to the caller.
    pub user_uid: Option<String>,
    pub chain_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    #[schema(value_type = Option<String>)]
    pub name: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    #[schema(value_type = Option<DateTime<Utc>>)]
    pub paused_until: Patch<Option<DateTime<Utc>>>,
    /// Pause for `chain_uid` only.
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    #[schema(value_type = Option<bool>)]
    pub chain_paused: Patch<bool>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    #[schema(value_type = Option<bool>)]
    pub accepted_legal: Patch<bool>,
}

impl UserUpdateRequest {
    pub fn patch(&self) -> UserPatch {
        UserPatch {
            name: self.name.clone(),
            paused_until: self.paused_until.clone(),
            group_paused: self.chain_paused.clone(),
            accepted_legal: self.accepted_legal.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct TransferChainRequest {
    pub user_uid: String,
    pub from_chain_uid: String,
    pub to_chain_uid: String,
    /// Keep the source membership in place.
    #[serde(default)]
    pub is_copy: bool,
}

#[derive(Debug, Serialize, Deserialize, IntoParams, Clone, Default)]
#[into_params(parameter_in = Query)]
pub struct PurgeQuery {
    /// Defaults to the caller.
    pub user_uid: Option<String>,
}
