//! Authorization ladder evaluation.
//!
//! # Purpose
//! Decides whether a resolved principal may act at a required [`AuthLevel`],
//! optionally scoped to one group, and returns the records the caller needs to
//! continue (principal, membership set, group).
//!
//! # Key invariants
//! - Membership loading is the mandatory first step after principal
//!   resolution; every role predicate is answered from that one snapshot.
//! - Group absence is reported as [`AuthzError::NotFound`], never as a denial.
//! - No writes happen here.
//!
//! # Common pitfalls
//! - Passing [`AuthLevel::Guest`] or a group-scoped level without a group is a
//!   contract violation and yields [`AuthzError::Internal`].
use tracing::debug;

use crate::directory::Directory;
use crate::errors::{AuthzError, AuthzResult};
use crate::level::AuthLevel;
use crate::memberships::MembershipSet;
use crate::model::{Group, Principal};
use crate::types::GroupUid;

/// Outcome of a successful authorization decision.
#[derive(Debug, Clone)]
pub struct Authorized {
    pub principal: Principal,
    pub memberships: MembershipSet,
    pub group: Option<Group>,
}

impl Authorized {
    pub fn is_root(&self) -> bool {
        self.principal.is_root_admin
    }

    /// Root, or admin of the given group.
    pub fn administers(&self, group_uid: &GroupUid) -> bool {
        self.is_root() || self.memberships.is_admin(group_uid)
    }
}

/// Evaluate `level` for `principal`, scoped to `group_uid` when given.
///
/// `principal` is `None` when the request carried no usable credential.
pub async fn authorize<D>(
    directory: &D,
    principal: Option<Principal>,
    level: AuthLevel,
    group_uid: Option<&GroupUid>,
) -> AuthzResult<Authorized>
where
    D: Directory + ?Sized,
{
    let result = decide(directory, principal, level, group_uid).await;
    let outcome = match &result {
        Ok(_) => "allowed",
        Err(err) => err.kind(),
    };
    metrics::counter!(
        "loop_authz_decisions_total",
        "level" => level.as_str(),
        "outcome" => outcome
    )
    .increment(1);
    result
}

async fn decide<D>(
    directory: &D,
    principal: Option<Principal>,
    level: AuthLevel,
    group_uid: Option<&GroupUid>,
) -> AuthzResult<Authorized>
where
    D: Directory + ?Sized,
{
    if level == AuthLevel::Guest {
        return Err(AuthzError::contract_violation(
            "guest level must not reach the authorization engine",
        ));
    }
    let principal =
        principal.ok_or_else(|| AuthzError::unauthenticated("credential not received"))?;
    if level.requires_group() && group_uid.is_none() {
        return Err(AuthzError::contract_violation(
            "group-scoped level requires a group uid",
        ));
    }

    let memberships = MembershipSet::new(directory.memberships_of(&principal.uid).await?);

    let group = match group_uid {
        Some(uid) => Some(
            directory
                .group_by_uid(uid)
                .await?
                .ok_or_else(|| AuthzError::not_found(format!("group {uid}")))?,
        ),
        None => None,
    };

    if !evaluate(&principal, &memberships, level, group.as_ref()) {
        debug!(
            user = %principal.uid,
            level = %level,
            group = group_uid.map(GroupUid::as_str).unwrap_or(""),
            "authorization denied"
        );
        return Err(AuthzError::insufficient_role(format!(
            "{level} required"
        )));
    }

    Ok(Authorized {
        principal,
        memberships,
        group,
    })
}

/// Pure decision table behind [`authorize`].
pub fn evaluate(
    principal: &Principal,
    memberships: &MembershipSet,
    level: AuthLevel,
    group: Option<&Group>,
) -> bool {
    if principal.is_root_admin {
        return true;
    }
    match (level, group) {
        (AuthLevel::AnyUser, _) => true,
        (AuthLevel::GroupMember, Some(group)) => memberships.is_member(&group.uid),
        (AuthLevel::GroupAdmin, Some(group)) => memberships.is_admin(&group.uid),
        _ => false,
    }
}
