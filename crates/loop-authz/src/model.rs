//! Domain records read by the engine and written by the coordinator store.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{GroupUid, UserUid};

/// Store-assigned identifier of a membership row.
pub type MembershipId = i64;

/// An authenticated user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub uid: UserUid,
    pub name: String,
    pub email: Option<String>,
    pub is_root_admin: bool,
    pub is_email_verified: bool,
    pub accepted_legal: bool,
    pub paused_until: Option<DateTime<Utc>>,
}

impl Principal {
    /// A fresh, unverified account with no privileges.
    pub fn new(uid: UserUid, name: impl Into<String>) -> Self {
        Self {
            uid,
            name: name.into(),
            email: None,
            is_root_admin: false,
            is_email_verified: false,
            accepted_legal: false,
            paused_until: None,
        }
    }
}

/// A loop: the unit of membership and administration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub uid: GroupUid,
    pub name: String,
    pub description: String,
    pub open_to_new_members: bool,
    pub published: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    Pending,
    Approved,
}

/// Relationship between one principal and one group.
///
/// At most one membership exists per (user, group) pair. `is_admin` is only
/// ever true on an approved membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub id: MembershipId,
    pub user_uid: UserUid,
    pub group_uid: GroupUid,
    pub is_admin: bool,
    pub approval: ApprovalState,
    pub joined_at: DateTime<Utc>,
    pub is_paused: bool,
}

impl Membership {
    /// A join request awaiting an admin decision.
    pub fn pending(
        id: MembershipId,
        user_uid: UserUid,
        group_uid: GroupUid,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_uid,
            group_uid,
            is_admin: false,
            approval: ApprovalState::Pending,
            joined_at: now,
            is_paused: false,
        }
    }

    /// The membership a group creator receives.
    pub fn founder(
        id: MembershipId,
        user_uid: UserUid,
        group_uid: GroupUid,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            is_admin: true,
            approval: ApprovalState::Approved,
            ..Self::pending(id, user_uid, group_uid, now)
        }
    }

    pub fn is_approved(&self) -> bool {
        self.approval == ApprovalState::Approved
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependentKind {
    Bag,
    BulkyItem,
}

/// A record that references a membership by id and must follow it when the
/// membership moves between groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependentRecord {
    pub id: i64,
    pub membership_id: MembershipId,
    pub kind: DependentKind,
}
