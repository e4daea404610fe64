//! In-memory implementation of the coordinator store.
//!
//! # Durability and consistency
//! - Not durable: state is lost on restart.
//! - All state sits behind one `tokio::sync::RwLock`. Every mutation holds the
//!   write guard from its first read to its last write, so guards are always
//!   evaluated against the state they mutate and a refused transition leaves
//!   nothing behind.
//!
//! Used for local development and the HTTP integration tests.
use super::{CoordinatorStore, Member, Redemption, StoreError, StoreResult, UserUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loop_authz::transitions::{self, GroupRoster};
use loop_authz::{
    AuthzError, AuthzResult, Credential, CredentialPolicy, DependentKind,
    DependentRecord, Directory, Group, GroupPatch, GroupUid, Membership, MembershipId, Patch,
    Principal, PurgePlan, TransferMode, TransferPlan, UserPatch, UserUid,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct State {
    principals: HashMap<UserUid, Principal>,
    groups: HashMap<GroupUid, Group>,
    memberships: BTreeMap<MembershipId, Membership>,
    dependents: BTreeMap<i64, DependentRecord>,
    credentials: HashMap<String, Credential>,
    next_membership_id: MembershipId,
    next_dependent_id: i64,
}

impl State {
    fn group(&self, group_uid: &GroupUid) -> StoreResult<&Group> {
        self.groups
            .get(group_uid)
            .ok_or_else(|| StoreError::NotFound(format!("group {group_uid}")))
    }

    fn principal(&self, user_uid: &UserUid) -> StoreResult<&Principal> {
        self.principals
            .get(user_uid)
            .ok_or_else(|| StoreError::NotFound(format!("user {user_uid}")))
    }

    fn membership(&self, user_uid: &UserUid, group_uid: &GroupUid) -> Option<&Membership> {
        self.memberships
            .values()
            .find(|m| &m.user_uid == user_uid && &m.group_uid == group_uid)
    }

    fn require_membership(
        &self,
        user_uid: &UserUid,
        group_uid: &GroupUid,
    ) -> StoreResult<Membership> {
        self.membership(user_uid, group_uid)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("membership of {user_uid} in {group_uid}")))
    }

    fn roster(&self, group: &Group) -> GroupRoster {
        GroupRoster {
            group: group.clone(),
            memberships: self
                .memberships
                .values()
                .filter(|m| m.group_uid == group.uid)
                .cloned()
                .collect(),
        }
    }

    fn rosters_of(&self, user_uid: &UserUid) -> Vec<GroupRoster> {
        self.memberships
            .values()
            .filter(|m| &m.user_uid == user_uid)
            .filter_map(|m| self.groups.get(&m.group_uid))
            .map(|group| self.roster(group))
            .collect()
    }

    fn memberships_of(&self, user_uid: &UserUid) -> Vec<Membership> {
        self.memberships
            .values()
            .filter(|m| &m.user_uid == user_uid)
            .cloned()
            .collect()
    }

    fn insert_membership(&mut self, build: impl FnOnce(MembershipId) -> Membership) -> Membership {
        self.next_membership_id += 1;
        let membership = build(self.next_membership_id);
        self.memberships.insert(membership.id, membership.clone());
        membership
    }

    fn delete_membership(&mut self, id: MembershipId) -> Option<Membership> {
        self.dependents.retain(|_, d| d.membership_id != id);
        self.memberships.remove(&id)
    }

    fn email_taken(&self, email: &str) -> bool {
        self.principals
            .values()
            .any(|p| p.email.as_deref() == Some(email))
    }
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a principal as-is. Used to seed root operators and fixtures.
    pub async fn seed_principal(&self, principal: Principal) {
        let mut state = self.state.write().await;
        state.principals.insert(principal.uid.clone(), principal);
    }
}

#[async_trait]
impl Directory for InMemoryStore {
    async fn group_by_uid(&self, group_uid: &GroupUid) -> AuthzResult<Option<Group>> {
        Ok(self.state.read().await.groups.get(group_uid).cloned())
    }

    async fn principal_by_uid(&self, user_uid: &UserUid) -> AuthzResult<Option<Principal>> {
        Ok(self.state.read().await.principals.get(user_uid).cloned())
    }

    async fn memberships_of(&self, user_uid: &UserUid) -> AuthzResult<Vec<Membership>> {
        Ok(self.state.read().await.memberships_of(user_uid))
    }
}

#[async_trait]
impl CoordinatorStore for InMemoryStore {
    async fn principal_by_email(&self, email: &str) -> StoreResult<Option<Principal>> {
        let state = self.state.read().await;
        Ok(state
            .principals
            .values()
            .find(|p| p.email.as_deref() == Some(email))
            .cloned())
    }

    async fn register_principal(
        &self,
        principal: Principal,
        join: Option<&GroupUid>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Membership>> {
        let mut state = self.state.write().await;
        if state.principals.contains_key(&principal.uid) {
            return Err(StoreError::Conflict("user exists".into()));
        }
        if let Some(email) = principal.email.as_deref()
            && state.email_taken(email)
        {
            return Err(StoreError::Conflict("email already registered".into()));
        }
        if let Some(group_uid) = join {
            transitions::check_join(state.group(group_uid)?, None)?;
        }
        let user_uid = principal.uid.clone();
        state.principals.insert(user_uid.clone(), principal);
        Ok(join.map(|group_uid| {
            state.insert_membership(|id| Membership::pending(id, user_uid, group_uid.clone(), now))
        }))
    }

    async fn insert_credential(&self, credential: Credential) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.principal(&credential.user_uid)?;
        state
            .credentials
            .insert(credential.digest.clone(), credential);
        Ok(())
    }

    async fn credential_by_digest(&self, digest: &str) -> StoreResult<Option<Credential>> {
        Ok(self.state.read().await.credentials.get(digest).cloned())
    }

    async fn revoke_credential(&self, digest: &str) -> StoreResult<()> {
        self.state.write().await.credentials.remove(digest);
        Ok(())
    }

    async fn redeem_one_time_code(
        &self,
        email: &str,
        code_digest: &str,
        policy: &CredentialPolicy,
        now: DateTime<Utc>,
    ) -> StoreResult<Redemption> {
        let mut state = self.state.write().await;
        let mut principal = state
            .principals
            .values()
            .find(|p| p.email.as_deref() == Some(email))
            .cloned()
            .ok_or_else(|| AuthzError::unauthenticated("unknown email"))?;
        let code = state
            .credentials
            .get(code_digest)
            .ok_or_else(|| AuthzError::unauthenticated("invalid one-time code"))?;
        code.check_redeemable(&principal.uid, now)?;

        state.credentials.remove(code_digest);
        let session = policy.issue_session(principal.uid.clone(), now);
        state
            .credentials
            .insert(session.credential.digest.clone(), session.credential);

        let first_verification = !principal.is_email_verified;
        if first_verification {
            principal.is_email_verified = true;
            let admin_groups: Vec<GroupUid> = state
                .memberships
                .values_mut()
                .filter(|m| m.user_uid == principal.uid)
                .map(|m| {
                    m.joined_at = now;
                    m
                })
                .filter(|m| m.is_admin)
                .map(|m| m.group_uid.clone())
                .collect();
            for group_uid in admin_groups {
                if let Some(group) = state.groups.get_mut(&group_uid) {
                    group.published = true;
                }
            }
            state
                .principals
                .insert(principal.uid.clone(), principal.clone());
        }
        let memberships = state.memberships_of(&principal.uid);
        Ok(Redemption {
            principal,
            session_token: session.token,
            first_verification,
            memberships,
        })
    }

    async fn create_group(
        &self,
        group: Group,
        founder: &UserUid,
        now: DateTime<Utc>,
    ) -> StoreResult<Membership> {
        let mut state = self.state.write().await;
        state.principal(founder)?;
        if state.groups.contains_key(&group.uid) {
            return Err(StoreError::Conflict("group exists".into()));
        }
        let group_uid = group.uid.clone();
        state.groups.insert(group_uid.clone(), group);
        Ok(state.insert_membership(|id| Membership::founder(id, founder.clone(), group_uid, now)))
    }

    async fn update_group(&self, group_uid: &GroupUid, patch: &GroupPatch) -> StoreResult<Group> {
        let mut state = self.state.write().await;
        let before = state.group(group_uid)?.clone();
        let after = patch.applied(&before);
        let admin_count = state.roster(&before).admin_count();
        transitions::check_group_update(&before, &after, admin_count)?;
        state.groups.insert(group_uid.clone(), after.clone());
        Ok(after)
    }

    async fn group_members(&self, group_uid: &GroupUid) -> StoreResult<Vec<Member>> {
        let state = self.state.read().await;
        state.group(group_uid)?;
        Ok(state
            .memberships
            .values()
            .filter(|m| &m.group_uid == group_uid)
            .filter_map(|m| {
                state.principals.get(&m.user_uid).map(|p| Member {
                    principal: p.clone(),
                    membership: m.clone(),
                })
            })
            .collect())
    }

    async fn add_dependent(
        &self,
        membership_id: MembershipId,
        kind: DependentKind,
    ) -> StoreResult<DependentRecord> {
        let mut state = self.state.write().await;
        if !state.memberships.contains_key(&membership_id) {
            return Err(StoreError::NotFound(format!("membership {membership_id}")));
        }
        state.next_dependent_id += 1;
        let record = DependentRecord {
            id: state.next_dependent_id,
            membership_id,
            kind,
        };
        state.dependents.insert(record.id, record.clone());
        Ok(record)
    }

    async fn dependents_of(&self, user_uid: &UserUid) -> StoreResult<Vec<DependentRecord>> {
        let state = self.state.read().await;
        Ok(state
            .dependents
            .values()
            .filter(|d| {
                state
                    .memberships
                    .get(&d.membership_id)
                    .is_some_and(|m| &m.user_uid == user_uid)
            })
            .cloned()
            .collect())
    }

    async fn join_group(
        &self,
        user_uid: &UserUid,
        group_uid: &GroupUid,
        now: DateTime<Utc>,
    ) -> StoreResult<Membership> {
        let mut state = self.state.write().await;
        state.principal(user_uid)?;
        let group = state.group(group_uid)?;
        transitions::check_join(group, state.membership(user_uid, group_uid))?;
        Ok(state.insert_membership(|id| {
            Membership::pending(id, user_uid.clone(), group_uid.clone(), now)
        }))
    }

    async fn approve_membership(
        &self,
        user_uid: &UserUid,
        group_uid: &GroupUid,
        now: DateTime<Utc>,
    ) -> StoreResult<Membership> {
        let mut state = self.state.write().await;
        state.group(group_uid)?;
        let current = state.require_membership(user_uid, group_uid)?;
        let approved = transitions::approve(&current, now)?;
        state.memberships.insert(approved.id, approved.clone());
        Ok(approved)
    }

    async fn deny_membership(
        &self,
        user_uid: &UserUid,
        group_uid: &GroupUid,
    ) -> StoreResult<Membership> {
        let mut state = self.state.write().await;
        let current = state.require_membership(user_uid, group_uid)?;
        transitions::check_deny(&current)?;
        state.delete_membership(current.id);
        Ok(current)
    }

    async fn set_admin(
        &self,
        user_uid: &UserUid,
        group_uid: &GroupUid,
        is_admin: bool,
    ) -> StoreResult<Membership> {
        let mut state = self.state.write().await;
        let group = state.group(group_uid)?.clone();
        let current = state.require_membership(user_uid, group_uid)?;
        let admin_count = state.roster(&group).admin_count();
        if !transitions::check_set_admin(&group, &current, is_admin, admin_count)? {
            return Ok(current);
        }
        let updated = Membership {
            is_admin,
            ..current
        };
        state.memberships.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn remove_membership(
        &self,
        user_uid: &UserUid,
        group_uid: &GroupUid,
    ) -> StoreResult<Membership> {
        let mut state = self.state.write().await;
        let group = state.group(group_uid)?.clone();
        let current = state.require_membership(user_uid, group_uid)?;
        let admin_count = state.roster(&group).admin_count();
        transitions::check_remove(&group, &current, admin_count)?;
        state.delete_membership(current.id);
        Ok(current)
    }

    async fn transfer_membership(
        &self,
        user_uid: &UserUid,
        from: &GroupUid,
        to: &GroupUid,
        mode: TransferMode,
        now: DateTime<Utc>,
    ) -> StoreResult<TransferPlan> {
        let mut state = self.state.write().await;
        let source_group = state.group(from)?.clone();
        state.group(to)?;
        let source = state.require_membership(user_uid, from)?;
        let admin_count = state.roster(&source_group).admin_count();
        let destination = state.membership(user_uid, to).cloned();
        let plan = transitions::plan_transfer(
            &source_group,
            &source,
            admin_count,
            to,
            destination.as_ref(),
            mode,
        )?;

        match &plan {
            TransferPlan::Noop => {}
            TransferPlan::RepointAndDelete {
                source,
                destination,
            } => {
                for dependent in state.dependents.values_mut() {
                    if dependent.membership_id == *source {
                        dependent.membership_id = *destination;
                    }
                }
                state.memberships.remove(source);
            }
            TransferPlan::Move { source } => {
                if let Some(membership) = state.memberships.get_mut(source) {
                    membership.group_uid = to.clone();
                }
            }
            TransferPlan::Duplicate { is_admin, approval } => {
                let (is_admin, approval) = (*is_admin, *approval);
                state.insert_membership(|id| Membership {
                    id,
                    user_uid: user_uid.clone(),
                    group_uid: to.clone(),
                    is_admin,
                    approval,
                    joined_at: now,
                    is_paused: false,
                });
            }
        }
        Ok(plan)
    }

    async fn update_principal(
        &self,
        user_uid: &UserUid,
        patch: &UserPatch,
        group_uid: Option<&GroupUid>,
        acting_on_self: bool,
        now: DateTime<Utc>,
    ) -> StoreResult<UserUpdate> {
        let mut state = self.state.write().await;
        let mut principal = state.principal(user_uid)?.clone();
        let paused_membership = match (&patch.group_paused, group_uid) {
            (Patch::Unset, _) => None,
            (Patch::Set(_), None) => {
                return Err(AuthzError::invalid_input("group_paused requires a chain uid").into());
            }
            (Patch::Set(paused), Some(group_uid)) => {
                Some((state.require_membership(user_uid, group_uid)?.id, *paused))
            }
        };

        let effects = patch.apply(&mut principal, acting_on_self, now);
        let revocation = if effects.revoke_legal {
            transitions::plan_legal_revocation(user_uid, &state.rosters_of(user_uid))
        } else {
            Default::default()
        };

        if let Some((id, paused)) = paused_membership
            && let Some(membership) = state.memberships.get_mut(&id)
        {
            membership.is_paused = paused;
        }
        if effects.unpause_memberships {
            for membership in state.memberships.values_mut() {
                if &membership.user_uid == user_uid {
                    membership.is_paused = false;
                }
            }
        }
        for id in &revocation.demoted {
            if let Some(membership) = state.memberships.get_mut(id) {
                membership.is_admin = false;
            }
        }
        for group_uid in &revocation.closed {
            if let Some(group) = state.groups.get_mut(group_uid) {
                group.published = false;
                group.open_to_new_members = false;
            }
        }
        state
            .principals
            .insert(user_uid.clone(), principal.clone());
        Ok(UserUpdate {
            principal,
            revocation,
        })
    }

    async fn purge_principal(&self, user_uid: &UserUid) -> StoreResult<PurgePlan> {
        let mut state = self.state.write().await;
        state.principal(user_uid)?;
        let rosters = state.rosters_of(user_uid);
        let owned: Vec<DependentRecord> = state
            .dependents
            .values()
            .filter(|d| {
                state
                    .memberships
                    .get(&d.membership_id)
                    .is_some_and(|m| &m.user_uid == user_uid)
            })
            .cloned()
            .collect();
        let plan = transitions::plan_purge(user_uid, &rosters, &owned)?;

        for id in &plan.memberships {
            state.delete_membership(*id);
        }
        for group_uid in &plan.dissolved {
            let ids: Vec<MembershipId> = state
                .memberships
                .values()
                .filter(|m| &m.group_uid == group_uid)
                .map(|m| m.id)
                .collect();
            for id in ids {
                state.delete_membership(id);
            }
            state.groups.remove(group_uid);
        }
        state.credentials.retain(|_, c| &c.user_uid != user_uid);
        state.principals.remove(user_uid);
        Ok(plan)
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
