//! Postgres-backed implementation of the coordinator store.
//!
//! # Key invariants
//! - Every mutation runs in one transaction from `pool.begin()` to `commit()`.
//!   Returning early with an error drops the transaction, which rolls it back.
//! - The group rows a guard depends on are locked with `SELECT ... FOR UPDATE`
//!   before the guard runs, so admin counts are re-validated against the state
//!   that is committed. Multiple groups are locked in uid order.
//! - Dependent rows are re-pointed before the membership they referenced is
//!   deleted.
//!
//! # Operational notes
//! - Migrations run at connect time via `sqlx::migrate!("./migrations")`.
//! - The connection URL may contain credentials; it is never logged.
use super::{CoordinatorStore, Member, Redemption, StoreError, StoreResult, UserUpdate};
use crate::config::PostgresConfig;
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loop_authz::transitions::{self, GroupRoster};
use loop_authz::{
    ApprovalState, AuthzError, AuthzResult, Credential, CredentialPolicy, DependentKind,
    DependentRecord, Directory, Group, GroupPatch, GroupUid, Membership, MembershipId, Patch,
    Principal, PurgePlan, TransferMode, TransferPlan, UserPatch, UserUid,
};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgConnection, PgPool};
use std::str::FromStr;
use std::time::Duration;

pub struct PostgresStore {
    pool: PgPool,
}

#[derive(Debug, Clone, FromRow)]
struct DbPrincipal {
    uid: String,
    name: String,
    email: Option<String>,
    is_root_admin: bool,
    is_email_verified: bool,
    accepted_legal: bool,
    paused_until: Option<DateTime<Utc>>,
}

impl From<DbPrincipal> for Principal {
    fn from(row: DbPrincipal) -> Self {
        Principal {
            uid: UserUid::new(row.uid),
            name: row.name,
            email: row.email,
            is_root_admin: row.is_root_admin,
            is_email_verified: row.is_email_verified,
            accepted_legal: row.accepted_legal,
            paused_until: row.paused_until,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct DbGroup {
    uid: String,
    name: String,
    description: String,
    open_to_new_members: bool,
    published: bool,
}

impl From<DbGroup> for Group {
    fn from(row: DbGroup) -> Self {
        Group {
            uid: GroupUid::new(row.uid),
            name: row.name,
            description: row.description,
            open_to_new_members: row.open_to_new_members,
            published: row.published,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct DbMembership {
    id: i64,
    user_uid: String,
    group_uid: String,
    is_admin: bool,
    is_approved: bool,
    joined_at: DateTime<Utc>,
    is_paused: bool,
}

impl From<DbMembership> for Membership {
    fn from(row: DbMembership) -> Self {
        Membership {
            id: row.id,
            user_uid: UserUid::new(row.user_uid),
            group_uid: GroupUid::new(row.group_uid),
            is_admin: row.is_admin,
            approval: if row.is_approved {
                ApprovalState::Approved
            } else {
                ApprovalState::Pending
            },
            joined_at: row.joined_at,
            is_paused: row.is_paused,
        }
    }
}

/// One row of the principals/memberships join used for member listings.
#[derive(Debug, Clone, FromRow)]
struct DbMember {
    uid: String,
    name: String,
    email: Option<String>,
    is_root_admin: bool,
    is_email_verified: bool,
    accepted_legal: bool,
    paused_until: Option<DateTime<Utc>>,
    id: i64,
    group_uid: String,
    is_admin: bool,
    is_approved: bool,
    joined_at: DateTime<Utc>,
    is_paused: bool,
}

impl From<DbMember> for Member {
    fn from(row: DbMember) -> Self {
        let membership = Membership::from(DbMembership {
            id: row.id,
            user_uid: row.uid.clone(),
            group_uid: row.group_uid,
            is_admin: row.is_admin,
            is_approved: row.is_approved,
            joined_at: row.joined_at,
            is_paused: row.is_paused,
        });
        Member {
            principal: Principal::from(DbPrincipal {
                uid: row.uid,
                name: row.name,
                email: row.email,
                is_root_admin: row.is_root_admin,
                is_email_verified: row.is_email_verified,
                accepted_legal: row.accepted_legal,
                paused_until: row.paused_until,
            }),
            membership,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct DbDependent {
    id: i64,
    membership_id: i64,
    kind: String,
}

impl TryFrom<DbDependent> for DependentRecord {
    type Error = StoreError;

    fn try_from(row: DbDependent) -> StoreResult<Self> {
        Ok(DependentRecord {
            id: row.id,
            membership_id: row.membership_id,
            kind: parse_dependent_kind(&row.kind)?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
struct DbCredential {
    digest: String,
    user_uid: String,
    verified: bool,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<DbCredential> for Credential {
    fn from(row: DbCredential) -> Self {
        Credential {
            digest: row.digest,
            user_uid: UserUid::new(row.user_uid),
            verified: row.verified,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
        }
    }
}

impl PostgresStore {
    pub async fn connect(pg: &PostgresConfig) -> StoreResult<Self> {
        let connect_options = PgConnectOptions::from_str(&pg.url)?;
        let pool = PgPoolOptions::new()
            .max_connections(pg.max_connections)
            .acquire_timeout(Duration::from_millis(pg.acquire_timeout_ms))
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().map(|code| code == "23505").unwrap_or(false);
    }
    false
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().map(|code| code == "23503").unwrap_or(false);
    }
    false
}

fn dependent_kind_str(kind: DependentKind) -> &'static str {
    match kind {
        DependentKind::Bag => "bag",
        DependentKind::BulkyItem => "bulky_item",
    }
}

fn parse_dependent_kind(value: &str) -> StoreResult<DependentKind> {
    match value {
        "bag" => Ok(DependentKind::Bag),
        "bulky_item" => Ok(DependentKind::BulkyItem),
        other => Err(StoreError::Unexpected(anyhow!("unknown dependent kind {other}"))),
    }
}

async fn lock_group(conn: &mut PgConnection, group_uid: &GroupUid) -> StoreResult<Group> {
    sqlx::query_as::<_, DbGroup>(
        r#"SELECT uid, name, description, open_to_new_members, published
           FROM loop_groups WHERE uid = $1 FOR UPDATE"#,
    )
    .bind(group_uid.as_str())
    .fetch_optional(&mut *conn)
    .await?
    .map(Group::from)
    .ok_or_else(|| StoreError::NotFound(format!("group {group_uid}")))
}

async fn lock_principal(conn: &mut PgConnection, user_uid: &UserUid) -> StoreResult<Principal> {
    sqlx::query_as::<_, DbPrincipal>(
        r#"SELECT uid, name, email, is_root_admin, is_email_verified, accepted_legal, paused_until
           FROM principals WHERE uid = $1 FOR UPDATE"#,
    )
    .bind(user_uid.as_str())
    .fetch_optional(&mut *conn)
    .await?
    .map(Principal::from)
    .ok_or_else(|| StoreError::NotFound(format!("user {user_uid}")))
}

async fn membership_in(
    conn: &mut PgConnection,
    user_uid: &UserUid,
    group_uid: &GroupUid,
) -> StoreResult<Option<Membership>> {
    Ok(sqlx::query_as::<_, DbMembership>(
        r#"SELECT id, user_uid, group_uid, is_admin, is_approved, joined_at, is_paused
           FROM memberships WHERE user_uid = $1 AND group_uid = $2"#,
    )
    .bind(user_uid.as_str())
    .bind(group_uid.as_str())
    .fetch_optional(&mut *conn)
    .await?
    .map(Membership::from))
}

async fn require_membership(
    conn: &mut PgConnection,
    user_uid: &UserUid,
    group_uid: &GroupUid,
) -> StoreResult<Membership> {
    membership_in(conn, user_uid, group_uid)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("membership of {user_uid} in {group_uid}")))
}

async fn roster(conn: &mut PgConnection, group: Group) -> StoreResult<GroupRoster> {
    let memberships = sqlx::query_as::<_, DbMembership>(
        r#"SELECT id, user_uid, group_uid, is_admin, is_approved, joined_at, is_paused
           FROM memberships WHERE group_uid = $1 ORDER BY id"#,
    )
    .bind(group.uid.as_str())
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(Membership::from)
    .collect();
    Ok(GroupRoster { group, memberships })
}

/// Locks and loads every group `user_uid` belongs to.
async fn rosters_of(conn: &mut PgConnection, user_uid: &UserUid) -> StoreResult<Vec<GroupRoster>> {
    let groups = sqlx::query_as::<_, DbGroup>(
        r#"SELECT g.uid, g.name, g.description, g.open_to_new_members, g.published
           FROM loop_groups g
           JOIN memberships m ON m.group_uid = g.uid
           WHERE m.user_uid = $1
           ORDER BY g.uid
           FOR UPDATE OF g"#,
    )
    .bind(user_uid.as_str())
    .fetch_all(&mut *conn)
    .await?;
    let mut rosters = Vec::with_capacity(groups.len());
    for group in groups {
        rosters.push(roster(conn, Group::from(group)).await?);
    }
    Ok(rosters)
}

async fn memberships_of_user(
    conn: &mut PgConnection,
    user_uid: &UserUid,
) -> StoreResult<Vec<Membership>> {
    Ok(sqlx::query_as::<_, DbMembership>(
        r#"SELECT id, user_uid, group_uid, is_admin, is_approved, joined_at, is_paused
           FROM memberships WHERE user_uid = $1 ORDER BY id"#,
    )
    .bind(user_uid.as_str())
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(Membership::from)
    .collect())
}

async fn dependents_of_user(
    conn: &mut PgConnection,
    user_uid: &UserUid,
) -> StoreResult<Vec<DependentRecord>> {
    sqlx::query_as::<_, DbDependent>(
        r#"SELECT d.id, d.membership_id, d.kind
           FROM dependents d
           JOIN memberships m ON m.id = d.membership_id
           WHERE m.user_uid = $1
           ORDER BY d.id"#,
    )
    .bind(user_uid.as_str())
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(DependentRecord::try_from)
    .collect()
}

async fn insert_membership(
    conn: &mut PgConnection,
    user_uid: &UserUid,
    group_uid: &GroupUid,
    is_admin: bool,
    approval: ApprovalState,
    joined_at: DateTime<Utc>,
) -> StoreResult<Membership> {
    let row = sqlx::query_as::<_, DbMembership>(
        r#"INSERT INTO memberships (user_uid, group_uid, is_admin, is_approved, joined_at)
           VALUES ($1, $2, $3, $4, $5)
           RETURNING id, user_uid, group_uid, is_admin, is_approved, joined_at, is_paused"#,
    )
    .bind(user_uid.as_str())
    .bind(group_uid.as_str())
    .bind(is_admin)
    .bind(approval == ApprovalState::Approved)
    .bind(joined_at)
    .fetch_one(&mut *conn)
    .await;
    match row {
        Ok(row) => Ok(row.into()),
        Err(err) if is_unique_violation(&err) => {
            Err(StoreError::Conflict("membership already exists".into()))
        }
        Err(err) => Err(err.into()),
    }
}

async fn insert_credential_row(conn: &mut PgConnection, credential: &Credential) -> StoreResult<()> {
    let result = sqlx::query(
        r#"INSERT INTO credentials (digest, user_uid, verified, issued_at, expires_at)
           VALUES ($1, $2, $3, $4, $5)"#,
    )
    .bind(&credential.digest)
    .bind(credential.user_uid.as_str())
    .bind(credential.verified)
    .bind(credential.issued_at)
    .bind(credential.expires_at)
    .execute(&mut *conn)
    .await;
    match result {
        Ok(_) => Ok(()),
        Err(err) if is_foreign_key_violation(&err) => Err(StoreError::NotFound(format!(
            "user {}",
            credential.user_uid
        ))),
        Err(err) => Err(err.into()),
    }
}

#[async_trait]
impl Directory for PostgresStore {
    async fn group_by_uid(&self, group_uid: &GroupUid) -> AuthzResult<Option<Group>> {
        let row = sqlx::query_as::<_, DbGroup>(
            r#"SELECT uid, name, description, open_to_new_members, published
               FROM loop_groups WHERE uid = $1"#,
        )
        .bind(group_uid.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(row.map(Group::from))
    }

    async fn principal_by_uid(&self, user_uid: &UserUid) -> AuthzResult<Option<Principal>> {
        let row = sqlx::query_as::<_, DbPrincipal>(
            r#"SELECT uid, name, email, is_root_admin, is_email_verified, accepted_legal, paused_until
               FROM principals WHERE uid = $1"#,
        )
        .bind(user_uid.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(row.map(Principal::from))
    }

    async fn memberships_of(&self, user_uid: &UserUid) -> AuthzResult<Vec<Membership>> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        Ok(memberships_of_user(&mut conn, user_uid).await?)
    }
}

#[async_trait]
impl CoordinatorStore for PostgresStore {
    async fn principal_by_email(&self, email: &str) -> StoreResult<Option<Principal>> {
        let row = sqlx::query_as::<_, DbPrincipal>(
            r#"SELECT uid, name, email, is_root_admin, is_email_verified, accepted_legal, paused_until
               FROM principals WHERE email = $1"#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Principal::from))
    }

    async fn register_principal(
        &self,
        principal: Principal,
        join: Option<&GroupUid>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Membership>> {
        let mut tx = self.pool.begin().await?;
        if let Some(group_uid) = join {
            let group = lock_group(&mut tx, group_uid).await?;
            transitions::check_join(&group, None)?;
        }
        let insert = sqlx::query(
            r#"INSERT INTO principals
               (uid, name, email, is_root_admin, is_email_verified, accepted_legal, paused_until)
               VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(principal.uid.as_str())
        .bind(&principal.name)
        .bind(principal.email.as_deref())
        .bind(principal.is_root_admin)
        .bind(principal.is_email_verified)
        .bind(principal.accepted_legal)
        .bind(principal.paused_until)
        .execute(&mut *tx)
        .await;
        if let Err(err) = insert {
            if is_unique_violation(&err) {
                return Err(StoreError::Conflict("email already registered".into()));
            }
            return Err(err.into());
        }
        let membership = match join {
            Some(group_uid) => Some(
                insert_membership(
                    &mut tx,
                    &principal.uid,
                    group_uid,
                    false,
                    ApprovalState::Pending,
                    now,
                )
                .await?,
            ),
            None => None,
        };
        tx.commit().await?;
        Ok(membership)
    }

    async fn insert_credential(&self, credential: Credential) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_credential_row(&mut conn, &credential).await
    }

    async fn credential_by_digest(&self, digest: &str) -> StoreResult<Option<Credential>> {
        let row = sqlx::query_as::<_, DbCredential>(
            r#"SELECT digest, user_uid, verified, issued_at, expires_at
               FROM credentials WHERE digest = $1"#,
        )
        .bind(digest)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Credential::from))
    }

    async fn revoke_credential(&self, digest: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM credentials WHERE digest = $1")
            .bind(digest)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn redeem_one_time_code(
        &self,
        email: &str,
        code_digest: &str,
        policy: &CredentialPolicy,
        now: DateTime<Utc>,
    ) -> StoreResult<Redemption> {
        let mut tx = self.pool.begin().await?;
        let mut principal: Principal = sqlx::query_as::<_, DbPrincipal>(
            r#"SELECT uid, name, email, is_root_admin, is_email_verified, accepted_legal, paused_until
               FROM principals WHERE email = $1 FOR UPDATE"#,
        )
        .bind(email)
        .fetch_optional(&mut *tx)
        .await?
        .map(Principal::from)
        .ok_or_else(|| AuthzError::unauthenticated("unknown email"))?;

        // Concurrent redemptions serialize on this row lock; the loser sees
        // the row gone.
        let code: Credential = sqlx::query_as::<_, DbCredential>(
            r#"SELECT digest, user_uid, verified, issued_at, expires_at
               FROM credentials WHERE digest = $1 FOR UPDATE"#,
        )
        .bind(code_digest)
        .fetch_optional(&mut *tx)
        .await?
        .map(Credential::from)
        .ok_or_else(|| AuthzError::unauthenticated("invalid one-time code"))?;
        code.check_redeemable(&principal.uid, now)?;

        sqlx::query("DELETE FROM credentials WHERE digest = $1")
            .bind(code_digest)
            .execute(&mut *tx)
            .await?;
        let session = policy.issue_session(principal.uid.clone(), now);
        insert_credential_row(&mut tx, &session.credential).await?;

        let first_verification = !principal.is_email_verified;
        if first_verification {
            principal.is_email_verified = true;
            sqlx::query("UPDATE principals SET is_email_verified = TRUE WHERE uid = $1")
                .bind(principal.uid.as_str())
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                r#"UPDATE loop_groups SET published = TRUE
                   WHERE uid IN (
                       SELECT group_uid FROM memberships WHERE user_uid = $1 AND is_admin = TRUE
                   )"#,
            )
            .bind(principal.uid.as_str())
            .execute(&mut *tx)
            .await?;
            sqlx::query("UPDATE memberships SET joined_at = $2 WHERE user_uid = $1")
                .bind(principal.uid.as_str())
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }
        let memberships = memberships_of_user(&mut tx, &principal.uid).await?;
        tx.commit().await?;
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
        let mut tx = self.pool.begin().await?;
        lock_principal(&mut tx, founder).await?;
        let insert = sqlx::query(
            r#"INSERT INTO loop_groups (uid, name, description, open_to_new_members, published)
               VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(group.uid.as_str())
        .bind(&group.name)
        .bind(&group.description)
        .bind(group.open_to_new_members)
        .bind(group.published)
        .execute(&mut *tx)
        .await;
        if let Err(err) = insert {
            if is_unique_violation(&err) {
                return Err(StoreError::Conflict("group exists".into()));
            }
            return Err(err.into());
        }
        let membership = insert_membership(
            &mut tx,
            founder,
            &group.uid,
            true,
            ApprovalState::Approved,
            now,
        )
        .await?;
        tx.commit().await?;
        Ok(membership)
    }

    async fn update_group(&self, group_uid: &GroupUid, patch: &GroupPatch) -> StoreResult<Group> {
        let mut tx = self.pool.begin().await?;
        let before = lock_group(&mut tx, group_uid).await?;
        let after = patch.applied(&before);
        let admin_count = roster(&mut tx, before.clone()).await?.admin_count();
        transitions::check_group_update(&before, &after, admin_count)?;
        sqlx::query(
            r#"UPDATE loop_groups
               SET name = $2, description = $3, open_to_new_members = $4, published = $5
               WHERE uid = $1"#,
        )
        .bind(after.uid.as_str())
        .bind(&after.name)
        .bind(&after.description)
        .bind(after.open_to_new_members)
        .bind(after.published)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(after)
    }

    async fn group_members(&self, group_uid: &GroupUid) -> StoreResult<Vec<Member>> {
        if self.group_by_uid(group_uid).await?.is_none() {
            return Err(StoreError::NotFound(format!("group {group_uid}")));
        }
        let rows = sqlx::query_as::<_, DbMember>(
            r#"SELECT p.uid, p.name, p.email, p.is_root_admin, p.is_email_verified,
                      p.accepted_legal, p.paused_until,
                      m.id, m.group_uid, m.is_admin, m.is_approved, m.joined_at, m.is_paused
               FROM memberships m
               JOIN principals p ON p.uid = m.user_uid
               WHERE m.group_uid = $1
               ORDER BY m.id"#,
        )
        .bind(group_uid.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Member::from).collect())
    }

    async fn add_dependent(
        &self,
        membership_id: MembershipId,
        kind: DependentKind,
    ) -> StoreResult<DependentRecord> {
        let row = sqlx::query_as::<_, DbDependent>(
            r#"INSERT INTO dependents (membership_id, kind) VALUES ($1, $2)
               RETURNING id, membership_id, kind"#,
        )
        .bind(membership_id)
        .bind(dependent_kind_str(kind))
        .fetch_one(&self.pool)
        .await;
        match row {
            Ok(row) => DependentRecord::try_from(row),
            Err(err) if is_foreign_key_violation(&err) => {
                Err(StoreError::NotFound(format!("membership {membership_id}")))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn dependents_of(&self, user_uid: &UserUid) -> StoreResult<Vec<DependentRecord>> {
        let mut conn = self.pool.acquire().await?;
        dependents_of_user(&mut conn, user_uid).await
    }

    async fn join_group(
        &self,
        user_uid: &UserUid,
        group_uid: &GroupUid,
        now: DateTime<Utc>,
    ) -> StoreResult<Membership> {
        let mut tx = self.pool.begin().await?;
        lock_principal(&mut tx, user_uid).await?;
        let group = lock_group(&mut tx, group_uid).await?;
        let existing = membership_in(&mut tx, user_uid, group_uid).await?;
        transitions::check_join(&group, existing.as_ref())?;
        let membership = insert_membership(
            &mut tx,
            user_uid,
            group_uid,
            false,
            ApprovalState::Pending,
            now,
        )
        .await?;
        tx.commit().await?;
        Ok(membership)
    }

    async fn approve_membership(
        &self,
        user_uid: &UserUid,
        group_uid: &GroupUid,
        now: DateTime<Utc>,
    ) -> StoreResult<Membership> {
        let mut tx = self.pool.begin().await?;
        lock_group(&mut tx, group_uid).await?;
        let current = require_membership(&mut tx, user_uid, group_uid).await?;
        let approved = transitions::approve(&current, now)?;
        sqlx::query("UPDATE memberships SET is_approved = TRUE, joined_at = $2 WHERE id = $1")
            .bind(approved.id)
            .bind(approved.joined_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(approved)
    }

    async fn deny_membership(
        &self,
        user_uid: &UserUid,
        group_uid: &GroupUid,
    ) -> StoreResult<Membership> {
        let mut tx = self.pool.begin().await?;
        lock_group(&mut tx, group_uid).await?;
        let current = require_membership(&mut tx, user_uid, group_uid).await?;
        transitions::check_deny(&current)?;
        sqlx::query("DELETE FROM memberships WHERE id = $1")
            .bind(current.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(current)
    }

    async fn set_admin(
        &self,
        user_uid: &UserUid,
        group_uid: &GroupUid,
        is_admin: bool,
    ) -> StoreResult<Membership> {
        let mut tx = self.pool.begin().await?;
        let group = lock_group(&mut tx, group_uid).await?;
        let current = require_membership(&mut tx, user_uid, group_uid).await?;
        let admin_count = roster(&mut tx, group.clone()).await?.admin_count();
        if !transitions::check_set_admin(&group, &current, is_admin, admin_count)? {
            return Ok(current);
        }
        sqlx::query("UPDATE memberships SET is_admin = $2 WHERE id = $1")
            .bind(current.id)
            .bind(is_admin)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Membership {
            is_admin,
            ..current
        })
    }

    async fn remove_membership(
        &self,
        user_uid: &UserUid,
        group_uid: &GroupUid,
    ) -> StoreResult<Membership> {
        let mut tx = self.pool.begin().await?;
        let group = lock_group(&mut tx, group_uid).await?;
        let current = require_membership(&mut tx, user_uid, group_uid).await?;
        let admin_count = roster(&mut tx, group.clone()).await?.admin_count();
        transitions::check_remove(&group, &current, admin_count)?;
        sqlx::query("DELETE FROM memberships WHERE id = $1")
            .bind(current.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
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
        let mut tx = self.pool.begin().await?;
        let (source_group, _) = if from <= to {
            let source = lock_group(&mut tx, from).await?;
            let destination = lock_group(&mut tx, to).await?;
            (source, destination)
        } else {
            let destination = lock_group(&mut tx, to).await?;
            let source = lock_group(&mut tx, from).await?;
            (source, destination)
        };
        let source = require_membership(&mut tx, user_uid, from).await?;
        let admin_count = roster(&mut tx, source_group.clone()).await?.admin_count();
        let destination = membership_in(&mut tx, user_uid, to).await?;
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
                sqlx::query("UPDATE dependents SET membership_id = $2 WHERE membership_id = $1")
                    .bind(*source)
                    .bind(*destination)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("DELETE FROM memberships WHERE id = $1")
                    .bind(*source)
                    .execute(&mut *tx)
                    .await?;
            }
            TransferPlan::Move { source } => {
                sqlx::query("UPDATE memberships SET group_uid = $2 WHERE id = $1")
                    .bind(*source)
                    .bind(to.as_str())
                    .execute(&mut *tx)
                    .await?;
            }
            TransferPlan::Duplicate { is_admin, approval } => {
                insert_membership(&mut tx, user_uid, to, *is_admin, *approval, now).await?;
            }
        }
        tx.commit().await?;
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
        let mut tx = self.pool.begin().await?;
        let mut principal = lock_principal(&mut tx, user_uid).await?;
        let paused_membership = match (&patch.group_paused, group_uid) {
            (Patch::Unset, _) => None,
            (Patch::Set(_), None) => {
                return Err(AuthzError::invalid_input("group_paused requires a chain uid").into());
            }
            (Patch::Set(paused), Some(group_uid)) => Some((
                require_membership(&mut tx, user_uid, group_uid).await?.id,
                *paused,
            )),
        };

        let effects = patch.apply(&mut principal, acting_on_self, now);
        let revocation = if effects.revoke_legal {
            transitions::plan_legal_revocation(user_uid, &rosters_of(&mut tx, user_uid).await?)
        } else {
            Default::default()
        };

        sqlx::query(
            r#"UPDATE principals SET name = $2, paused_until = $3, accepted_legal = $4
               WHERE uid = $1"#,
        )
        .bind(user_uid.as_str())
        .bind(&principal.name)
        .bind(principal.paused_until)
        .bind(principal.accepted_legal)
        .execute(&mut *tx)
        .await?;
        if let Some((id, paused)) = paused_membership {
            sqlx::query("UPDATE memberships SET is_paused = $2 WHERE id = $1")
                .bind(id)
                .bind(paused)
                .execute(&mut *tx)
                .await?;
        }
        if effects.unpause_memberships {
            sqlx::query("UPDATE memberships SET is_paused = FALSE WHERE user_uid = $1")
                .bind(user_uid.as_str())
                .execute(&mut *tx)
                .await?;
        }
        if !revocation.demoted.is_empty() {
            sqlx::query("UPDATE memberships SET is_admin = FALSE WHERE id = ANY($1)")
                .bind(&revocation.demoted)
                .execute(&mut *tx)
                .await?;
        }
        if !revocation.closed.is_empty() {
            let closed: Vec<String> = revocation
                .closed
                .iter()
                .map(|uid| uid.as_str().to_string())
                .collect();
            sqlx::query(
                r#"UPDATE loop_groups SET published = FALSE, open_to_new_members = FALSE
                   WHERE uid = ANY($1)"#,
            )
            .bind(&closed)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(UserUpdate {
            principal,
            revocation,
        })
    }

    async fn purge_principal(&self, user_uid: &UserUid) -> StoreResult<PurgePlan> {
        let mut tx = self.pool.begin().await?;
        lock_principal(&mut tx, user_uid).await?;
        let rosters = rosters_of(&mut tx, user_uid).await?;
        let dependents = dependents_of_user(&mut tx, user_uid).await?;
        let plan = transitions::plan_purge(user_uid, &rosters, &dependents)?;

        sqlx::query("DELETE FROM dependents WHERE membership_id = ANY($1)")
            .bind(&plan.memberships)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM memberships WHERE id = ANY($1)")
            .bind(&plan.memberships)
            .execute(&mut *tx)
            .await?;
        if !plan.dissolved.is_empty() {
            let dissolved: Vec<String> = plan
                .dissolved
                .iter()
                .map(|uid| uid.as_str().to_string())
                .collect();
            // Memberships and their dependents cascade.
            sqlx::query("DELETE FROM loop_groups WHERE uid = ANY($1)")
                .bind(&dissolved)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM credentials WHERE user_uid = $1")
            .bind(user_uid.as_str())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM principals WHERE uid = $1")
            .bind(user_uid.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(plan)
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
