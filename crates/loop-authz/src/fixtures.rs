//! In-memory directory used by unit tests.
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;

use crate::directory::Directory;
use crate::errors::AuthzResult;
use crate::model::{Group, Membership, Principal};
use crate::types::{GroupUid, UserUid};

#[derive(Default)]
pub(crate) struct StaticDirectory {
    pub principals: HashMap<UserUid, Principal>,
    pub groups: HashMap<GroupUid, Group>,
    pub memberships: Vec<Membership>,
}

impl StaticDirectory {
    pub fn with_user(mut self, uid: &str, root: bool) -> Self {
        let mut principal = Principal::new(UserUid::new(uid), uid);
        principal.is_root_admin = root;
        principal.is_email_verified = true;
        self.principals.insert(principal.uid.clone(), principal);
        self
    }

    pub fn with_group(mut self, uid: &str) -> Self {
        self.groups.insert(
            GroupUid::new(uid),
            Group {
                uid: GroupUid::new(uid),
                name: uid.to_string(),
                description: String::new(),
                open_to_new_members: true,
                published: true,
            },
        );
        self
    }

    pub fn with_admin(mut self, user: &str, group: &str) -> Self {
        let id = self.memberships.len() as i64 + 1;
        self.memberships.push(Membership::founder(
            id,
            UserUid::new(user),
            GroupUid::new(group),
            Utc::now(),
        ));
        self
    }

    pub fn with_member(mut self, user: &str, group: &str) -> Self {
        let id = self.memberships.len() as i64 + 1;
        let mut m = Membership::founder(id, UserUid::new(user), GroupUid::new(group), Utc::now());
        m.is_admin = false;
        self.memberships.push(m);
        self
    }

    pub fn with_pending(mut self, user: &str, group: &str) -> Self {
        let id = self.memberships.len() as i64 + 1;
        self.memberships.push(Membership::pending(
            id,
            UserUid::new(user),
            GroupUid::new(group),
            Utc::now(),
        ));
        self
    }

    pub fn principal(&self, uid: &str) -> Principal {
        self.principals[&UserUid::new(uid)].clone()
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn group_by_uid(&self, group_uid: &GroupUid) -> AuthzResult<Option<Group>> {
        Ok(self.groups.get(group_uid).cloned())
    }

    async fn principal_by_uid(&self, user_uid: &UserUid) -> AuthzResult<Option<Principal>> {
        Ok(self.principals.get(user_uid).cloned())
    }

    async fn memberships_of(&self, user_uid: &UserUid) -> AuthzResult<Vec<Membership>> {
        Ok(self
            .memberships
            .iter()
            .filter(|m| &m.user_uid == user_uid)
            .cloned()
            .collect())
    }
}
