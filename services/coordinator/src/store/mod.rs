//! Membership store.
//!
//! [`CoordinatorStore`] extends the read-only [`Directory`] the authorization
//! engine consumes with every mutating operation of the coordinator. Each
//! mutation is one atomic unit: it loads the records its guard needs, runs the
//! pure guard from `loop_authz::transitions`, and only then writes.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loop_authz::{
    AuthzError, CredentialPolicy, DependentKind, DependentRecord, Directory, Group, GroupPatch,
    GroupUid, Membership, MembershipId, Credential, Principal, PurgePlan, RevocationPlan,
    TransferMode, TransferPlan, UserPatch, UserUid,
};
use thiserror::Error;

pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    /// A rule from `loop_authz` refused the operation.
    #[error(transparent)]
    Rejected(AuthzError),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Metric label, aligned with [`AuthzError::kind`].
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "not_found",
            StoreError::Conflict(_) => "conflict",
            StoreError::Rejected(err) => err.kind(),
            StoreError::Unexpected(_) => "internal",
        }
    }
}

impl From<AuthzError> for StoreError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::NotFound(message) => StoreError::NotFound(message),
            AuthzError::Conflict(message) => StoreError::Conflict(message),
            AuthzError::Internal(err) => StoreError::Unexpected(err),
            other => StoreError::Rejected(other),
        }
    }
}

impl From<StoreError> for AuthzError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(message) => AuthzError::NotFound(message),
            StoreError::Conflict(message) => AuthzError::Conflict(message),
            StoreError::Rejected(err) => err,
            StoreError::Unexpected(err) => AuthzError::Internal(err),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row".into()),
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                StoreError::Conflict(db.message().to_string())
            }
            other => StoreError::Unexpected(other.into()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Unexpected(err.into())
    }
}

/// Outcome of exchanging a one-time code for a session.
#[derive(Debug, Clone)]
pub struct Redemption {
    pub principal: Principal,
    pub session_token: String,
    /// True when this exchange verified the principal's email.
    pub first_verification: bool,
    pub memberships: Vec<Membership>,
}

#[derive(Debug, Clone)]
pub struct UserUpdate {
    pub principal: Principal,
    pub revocation: RevocationPlan,
}

/// A principal together with its membership in one group.
#[derive(Debug, Clone)]
pub struct Member {
    pub principal: Principal,
    pub membership: Membership,
}

#[async_trait]
pub trait CoordinatorStore: Directory {
    async fn principal_by_email(&self, email: &str) -> StoreResult<Option<Principal>>;

    /// Creates an unverified principal, plus a pending membership in `join`
    /// when given.
    async fn register_principal(
        &self,
        principal: Principal,
        join: Option<&GroupUid>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Membership>>;

    async fn insert_credential(&self, credential: Credential) -> StoreResult<()>;

    async fn credential_by_digest(&self, digest: &str) -> StoreResult<Option<Credential>>;

    /// Idempotent.
    async fn revoke_credential(&self, digest: &str) -> StoreResult<()>;

    /// Consumes the one-time code and stores a fresh session in one step.
    async fn redeem_one_time_code(
        &self,
        email: &str,
        code_digest: &str,
        policy: &CredentialPolicy,
        now: DateTime<Utc>,
    ) -> StoreResult<Redemption>;

    /// Inserts `group` with `founder` as its approved admin.
    async fn create_group(
        &self,
        group: Group,
        founder: &UserUid,
        now: DateTime<Utc>,
    ) -> StoreResult<Membership>;

    async fn update_group(&self, group_uid: &GroupUid, patch: &GroupPatch) -> StoreResult<Group>;

    async fn group_members(&self, group_uid: &GroupUid) -> StoreResult<Vec<Member>>;

    async fn add_dependent(
        &self,
        membership_id: MembershipId,
        kind: DependentKind,
    ) -> StoreResult<DependentRecord>;

    async fn dependents_of(&self, user_uid: &UserUid) -> StoreResult<Vec<DependentRecord>>;

    async fn join_group(
        &self,
        user_uid: &UserUid,
        group_uid: &GroupUid,
        now: DateTime<Utc>,
    ) -> StoreResult<Membership>;

    async fn approve_membership(
        &self,
        user_uid: &UserUid,
        group_uid: &GroupUid,
        now: DateTime<Utc>,
    ) -> StoreResult<Membership>;

    /// Deletes a pending membership and returns it.
    async fn deny_membership(
        &self,
        user_uid: &UserUid,
        group_uid: &GroupUid,
    ) -> StoreResult<Membership>;

    async fn set_admin(
        &self,
        user_uid: &UserUid,
        group_uid: &GroupUid,
        is_admin: bool,
    ) -> StoreResult<Membership>;

    /// Deletes a membership (and its dependents) and returns it.
    async fn remove_membership(
        &self,
        user_uid: &UserUid,
        group_uid: &GroupUid,
    ) -> StoreResult<Membership>;

    async fn transfer_membership(
        &self,
        user_uid: &UserUid,
        from: &GroupUid,
        to: &GroupUid,
        mode: TransferMode,
        now: DateTime<Utc>,
    ) -> StoreResult<TransferPlan>;

    async fn update_principal(
        &self,
        user_uid: &UserUid,
        patch: &UserPatch,
        group_uid: Option<&GroupUid>,
        acting_on_self: bool,
        now: DateTime<Utc>,
    ) -> StoreResult<UserUpdate>;

    async fn purge_principal(&self, user_uid: &UserUid) -> StoreResult<PurgePlan>;

    async fn health_check(&self) -> StoreResult<()>;
    fn is_durable(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}
