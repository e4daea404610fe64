//! "Who may act on user X in group G" resolution.
//!
//! Layered on [`authorize`]: the requester is resolved at
//! [`AuthLevel::AnyUser`] (scoped to the group when one is given), then one of
//! three relations must hold.
//!
//! 1. Self-service: the target is the requester, or a root requester named no
//!    target.
//! 2. Root override: a root requester may act on any existing user.
//! 3. Admin over member: the requester administers `group` and the target
//!    holds a membership row (any approval state) in that same group.
use serde::Serialize;

use crate::directory::Directory;
use crate::engine::{Authorized, authorize};
use crate::errors::{AuthzError, AuthzResult};
use crate::level::AuthLevel;
use crate::memberships::MembershipSet;
use crate::model::{Group, Principal};
use crate::types::{GroupUid, UserUid};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActingRelation {
    SelfService,
    RootOverride,
    AdminOverMember,
}

impl ActingRelation {
    pub fn as_str(self) -> &'static str {
        match self {
            ActingRelation::SelfService => "self_service",
            ActingRelation::RootOverride => "root_override",
            ActingRelation::AdminOverMember => "admin_over_member",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActingOnUser {
    pub actor: Authorized,
    pub target: Principal,
    pub target_memberships: MembershipSet,
    pub relation: ActingRelation,
}

impl ActingOnUser {
    pub fn group(&self) -> Option<&Group> {
        self.actor.group.as_ref()
    }

    pub fn is_self(&self) -> bool {
        self.relation == ActingRelation::SelfService
    }
}

pub async fn authorize_acting_on_user<D>(
    directory: &D,
    principal: Option<Principal>,
    target_uid: Option<&UserUid>,
    group_uid: Option<&GroupUid>,
) -> AuthzResult<ActingOnUser>
where
    D: Directory + ?Sized,
{
    if group_uid.is_some() && target_uid.is_none() {
        return Err(AuthzError::invalid_input(
            "user uid must be set when group uid is set",
        ));
    }

    let actor = authorize(directory, principal, AuthLevel::AnyUser, group_uid).await?;

    let self_service = match target_uid {
        Some(uid) => *uid == actor.principal.uid,
        None => actor.is_root(),
    };
    if self_service {
        return Ok(ActingOnUser {
            target: actor.principal.clone(),
            target_memberships: actor.memberships.clone(),
            actor,
            relation: ActingRelation::SelfService,
        });
    }

    let target_uid = target_uid.ok_or_else(|| AuthzError::invalid_input("user uid is required"))?;
    let target = directory
        .principal_by_uid(target_uid)
        .await?
        .ok_or_else(|| AuthzError::not_found(format!("user {target_uid}")))?;
    let target_memberships = MembershipSet::new(directory.memberships_of(target_uid).await?);

    let relation = resolve_relation(&actor, &target_memberships, group_uid).ok_or_else(|| {
        AuthzError::insufficient_role("must be a group admin or higher to alter a different user")
    })?;

    Ok(ActingOnUser {
        actor,
        target,
        target_memberships,
        relation,
    })
}

/// Relation between an actor and a different target user, if any grants access.
pub fn resolve_relation(
    actor: &Authorized,
    target_memberships: &MembershipSet,
    group_uid: Option<&GroupUid>,
) -> Option<ActingRelation> {
    if actor.is_root() {
        return Some(ActingRelation::RootOverride);
    }
    let group_uid = group_uid?;
    (actor.memberships.is_admin(group_uid) && target_memberships.is_member(group_uid))
        .then_some(ActingRelation::AdminOverMember)
}
