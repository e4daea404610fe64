use serde::Serialize;

use crate::model::Membership;
use crate::types::GroupUid;

/// All memberships of one principal, with per-group lookups.
///
/// Pending rows are included: a pending membership counts as "member" for the
/// ladder, but never as admin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MembershipSet {
    items: Vec<Membership>,
}

impl MembershipSet {
    pub fn new(items: Vec<Membership>) -> Self {
        Self { items }
    }

    pub fn get(&self, group_uid: &GroupUid) -> Option<&Membership> {
        self.items.iter().find(|m| &m.group_uid == group_uid)
    }

    pub fn is_member(&self, group_uid: &GroupUid) -> bool {
        self.get(group_uid).is_some()
    }

    pub fn is_approved_member(&self, group_uid: &GroupUid) -> bool {
        self.get(group_uid).is_some_and(Membership::is_approved)
    }

    pub fn is_admin(&self, group_uid: &GroupUid) -> bool {
        self.get(group_uid)
            .is_some_and(|m| m.is_admin && m.is_approved())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Membership> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
