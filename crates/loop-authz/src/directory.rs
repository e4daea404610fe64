use async_trait::async_trait;

use crate::errors::AuthzResult;
use crate::model::{Group, Membership, Principal};
use crate::types::{GroupUid, UserUid};

/// Read-only view of the records the engine consults.
///
/// The coordinator store implements this; tests use an in-memory fixture.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn group_by_uid(&self, group_uid: &GroupUid) -> AuthzResult<Option<Group>>;

    async fn principal_by_uid(&self, user_uid: &UserUid) -> AuthzResult<Option<Principal>>;

    /// Every membership of the principal, pending ones included.
    async fn memberships_of(&self, user_uid: &UserUid) -> AuthzResult<Vec<Membership>>;
}
