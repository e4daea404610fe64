//! Membership state rules.
//!
//! # Purpose
//! Every guard of the membership state machine lives here as a pure function
//! over already-loaded records, so the coordinator store can run it inside the
//! transaction that performs the write and tests can run it without storage.
//!
//! # State machine
//! `absent -> pending -> participant <-> admin`, with any state able to return
//! to `absent` through deny, remove, leave, transfer, or purge.
//!
//! # Key invariants
//! - A group that is open to new members never loses its last admin through
//!   remove, demote, or transfer.
//! - Guard failures are [`AuthzError::Conflict`] and are raised before any
//!   write.
//! - A transfer or copy names two distinct groups.
//! - Revocation of legal acceptance is a cleanup sweep, not a gate: it never
//!   fails on admin counts and instead closes the groups it leaves headless.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{AuthzError, AuthzResult};
use crate::model::{ApprovalState, DependentKind, DependentRecord, Group, Membership, MembershipId};
use crate::types::{GroupUid, UserUid};

/// A group together with every membership row it currently has.
#[derive(Debug, Clone)]
pub struct GroupRoster {
    pub group: Group,
    pub memberships: Vec<Membership>,
}

impl GroupRoster {
    pub fn admin_count(&self) -> usize {
        self.memberships
            .iter()
            .filter(|m| m.is_admin && m.is_approved())
            .count()
    }

    pub fn membership_of(&self, user_uid: &UserUid) -> Option<&Membership> {
        self.memberships.iter().find(|m| &m.user_uid == user_uid)
    }

    fn admins_other_than(&self, user_uid: &UserUid) -> usize {
        self.memberships
            .iter()
            .filter(|m| m.is_admin && m.is_approved() && &m.user_uid != user_uid)
            .count()
    }

    fn approved_participants_other_than(&self, user_uid: &UserUid) -> usize {
        self.memberships
            .iter()
            .filter(|m| !m.is_admin && m.is_approved() && &m.user_uid != user_uid)
            .count()
    }
}

/// absent -> pending
pub fn check_join(group: &Group, existing: Option<&Membership>) -> AuthzResult<()> {
    if existing.is_some() {
        return Err(AuthzError::conflict("membership already exists"));
    }
    if !group.open_to_new_members {
        return Err(AuthzError::conflict("group is not open to new members"));
    }
    Ok(())
}

/// pending -> participant. The tenure clock restarts at `now`; the admin flag
/// is carried over untouched.
pub fn approve(membership: &Membership, now: DateTime<Utc>) -> AuthzResult<Membership> {
    if membership.is_approved() {
        return Err(AuthzError::conflict("membership is already approved"));
    }
    Ok(Membership {
        approval: ApprovalState::Approved,
        joined_at: now,
        ..membership.clone()
    })
}

/// pending -> absent
pub fn check_deny(membership: &Membership) -> AuthzResult<()> {
    if membership.is_approved() {
        return Err(AuthzError::conflict(
            "membership is approved; remove the member instead",
        ));
    }
    Ok(())
}

/// participant <-> admin. Returns whether the flag actually changes.
pub fn check_set_admin(
    group: &Group,
    membership: &Membership,
    is_admin: bool,
    admin_count: usize,
) -> AuthzResult<bool> {
    if is_admin && !membership.is_approved() {
        return Err(AuthzError::conflict(
            "a pending membership cannot be made admin",
        ));
    }
    if membership.is_admin && !is_admin {
        ensure_admin_remains(group, membership, admin_count)?;
    }
    Ok(membership.is_admin != is_admin)
}

/// approved -> absent
pub fn check_remove(group: &Group, membership: &Membership, admin_count: usize) -> AuthzResult<()> {
    ensure_admin_remains(group, membership, admin_count)
}

fn ensure_admin_remains(
    group: &Group,
    membership: &Membership,
    admin_count: usize,
) -> AuthzResult<()> {
    if membership.is_admin && admin_count <= 1 && group.open_to_new_members {
        return Err(AuthzError::conflict(
            "unable to remove the last admin of a group open to new members",
        ));
    }
    Ok(())
}

/// Rejects a group update that would publish or open a group with no admin.
pub fn check_group_update(before: &Group, after: &Group, admin_count: usize) -> AuthzResult<()> {
    let publishing = after.published && !before.published;
    let opening = after.open_to_new_members && !before.open_to_new_members;
    if admin_count == 0 && (publishing || opening) {
        return Err(AuthzError::conflict(
            "a group without admins cannot be published or opened",
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    Transfer,
    Copy,
}

/// Write plan for moving or duplicating a membership into another group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferPlan {
    /// Copy onto an existing destination row: nothing changes.
    Noop,
    /// Re-point dependents from `source` to `destination`, then delete `source`.
    /// The destination row keeps its own flags.
    RepointAndDelete {
        source: MembershipId,
        destination: MembershipId,
    },
    /// Re-home the source row itself; its id, and therefore its dependents,
    /// stay valid.
    Move { source: MembershipId },
    /// Insert a destination row with the source's flags.
    Duplicate {
        is_admin: bool,
        approval: ApprovalState,
    },
}

/// Plans moving or copying `source` into `destination_group`. `destination`
/// is the principal's existing row there, if any.
pub fn plan_transfer(
    source_group: &Group,
    source: &Membership,
    source_admin_count: usize,
    destination_group: &GroupUid,
    destination: Option<&Membership>,
    mode: TransferMode,
) -> AuthzResult<TransferPlan> {
    if *destination_group == source_group.uid || destination.is_some_and(|d| d.id == source.id) {
        return Err(AuthzError::invalid_input(
            "source and destination group are the same",
        ));
    }
    if mode == TransferMode::Transfer {
        ensure_admin_remains(source_group, source, source_admin_count)?;
    }
    Ok(match (mode, destination) {
        (TransferMode::Copy, Some(_)) => TransferPlan::Noop,
        (TransferMode::Transfer, Some(existing)) => TransferPlan::RepointAndDelete {
            source: source.id,
            destination: existing.id,
        },
        (TransferMode::Copy, None) => TransferPlan::Duplicate {
            is_admin: source.is_admin,
            approval: source.approval,
        },
        (TransferMode::Transfer, None) => TransferPlan::Move { source: source.id },
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RevocationPlan {
    /// Memberships whose admin flag is cleared.
    pub demoted: Vec<MembershipId>,
    /// Published groups left without an admin; unpublished and closed.
    pub closed: Vec<GroupUid>,
}

impl RevocationPlan {
    pub fn is_empty(&self) -> bool {
        self.demoted.is_empty() && self.closed.is_empty()
    }
}

/// Sweep for a principal withdrawing legal acceptance. `rosters` are the
/// groups the principal belongs to.
pub fn plan_legal_revocation(user_uid: &UserUid, rosters: &[GroupRoster]) -> RevocationPlan {
    let mut plan = RevocationPlan::default();
    for roster in rosters {
        let Some(own) = roster.membership_of(user_uid) else {
            continue;
        };
        if own.is_admin {
            plan.demoted.push(own.id);
        }
        if roster.group.published && roster.admins_other_than(user_uid) == 0 {
            plan.closed.push(roster.group.uid.clone());
        }
    }
    plan
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgePlan {
    pub memberships: Vec<MembershipId>,
    /// Groups the principal solely administers with nobody else approved in
    /// them; deleted together with the account.
    pub dissolved: Vec<GroupUid>,
}

/// Account deletion guard.
pub fn plan_purge(
    user_uid: &UserUid,
    rosters: &[GroupRoster],
    dependents: &[DependentRecord],
) -> AuthzResult<PurgePlan> {
    if dependents.iter().any(|d| d.kind == DependentKind::Bag) {
        return Err(AuthzError::conflict(
            "bags are still held by this user; hand them over first",
        ));
    }
    let mut plan = PurgePlan::default();
    for roster in rosters {
        let Some(own) = roster.membership_of(user_uid) else {
            continue;
        };
        let sole_admin = own.is_admin && roster.admins_other_than(user_uid) == 0;
        if sole_admin {
            if roster.approved_participants_other_than(user_uid) > 0 {
                return Err(AuthzError::conflict(format!(
                    "sole admin of group {}; set another admin or delete the group first",
                    roster.group.uid
                )));
            }
            plan.dissolved.push(roster.group.uid.clone());
        }
        plan.memberships.push(own.id);
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn group(uid: &str, open: bool, published: bool) -> Group {
        Group {
            uid: GroupUid::new(uid),
            name: uid.to_string(),
            description: String::new(),
            open_to_new_members: open,
            published,
        }
    }

    fn admin(id: MembershipId, user: &str, group: &str) -> Membership {
        Membership::founder(id, UserUid::new(user), GroupUid::new(group), Utc::now())
    }

    fn participant(id: MembershipId, user: &str, group: &str) -> Membership {
        Membership {
            is_admin: false,
            ..admin(id, user, group)
        }
    }

    fn pending(id: MembershipId, user: &str, group: &str) -> Membership {
        Membership::pending(id, UserUid::new(user), GroupUid::new(group), Utc::now())
    }

    #[test]
    fn join_requires_open_group_and_no_existing_row() {
        let open = group("g", true, true);
        let closed = group("g", false, true);
        check_join(&open, None).expect("join open group");
        assert!(matches!(check_join(&closed, None), Err(AuthzError::Conflict(_))));
        let existing = pending(1, "u", "g");
        assert!(matches!(
            check_join(&open, Some(&existing)),
            Err(AuthzError::Conflict(_))
        ));
    }

    #[test]
    fn approve_resets_tenure_and_keeps_admin_flag() {
        let mut request = pending(7, "u", "g");
        request.joined_at = Utc::now() - Duration::days(10);
        let now = Utc::now();
        let approved = approve(&request, now).expect("approve");
        assert_eq!(approved.joined_at, now);
        assert!(approved.is_approved());
        assert_eq!(approved.is_admin, request.is_admin);
        assert_eq!(approved.id, request.id);
        assert!(matches!(approve(&approved, now), Err(AuthzError::Conflict(_))));
    }

    #[test]
    fn deny_only_applies_to_pending() {
        check_deny(&pending(1, "u", "g")).expect("deny pending");
        assert!(check_deny(&participant(2, "u", "g")).is_err());
    }

    #[test]
    fn last_admin_of_open_group_cannot_be_removed() {
        let open = group("g", true, true);
        let only = admin(1, "a", "g");
        assert!(matches!(
            check_remove(&open, &only, 1),
            Err(AuthzError::Conflict(_))
        ));
        check_remove(&open, &only, 2).expect("co-admin remains");
        check_remove(&group("g", false, true), &only, 1).expect("closed group");
        check_remove(&open, &participant(2, "p", "g"), 1).expect("participant");
    }

    #[test]
    fn set_admin_guards() {
        let open = group("g", true, true);
        assert!(check_set_admin(&open, &pending(1, "u", "g"), true, 1).is_err());
        assert!(check_set_admin(&open, &participant(2, "u", "g"), true, 1).expect("promote"));
        assert!(!check_set_admin(&open, &admin(3, "u", "g"), true, 1).expect("already admin"));
        assert!(check_set_admin(&open, &admin(3, "u", "g"), false, 1).is_err());
        assert!(check_set_admin(&open, &admin(3, "u", "g"), false, 2).expect("demote"));
    }

    #[test]
    fn group_update_cannot_publish_headless_group() {
        let before = group("g", false, false);
        let after = group("g", false, true);
        assert!(check_group_update(&before, &after, 0).is_err());
        check_group_update(&before, &after, 1).expect("has admin");
        check_group_update(&before, &before, 0).expect("no flag turned on");
    }

    #[test]
    fn transfer_onto_existing_row_repoints_and_deletes() {
        let source_group = group("a", true, true);
        let source = participant(1, "u", "a");
        let destination = admin(2, "u", "b");
        let plan = plan_transfer(
            &source_group,
            &source,
            1,
            &GroupUid::new("b"),
            Some(&destination),
            TransferMode::Transfer,
        )
        .expect("plan");
        assert_eq!(
            plan,
            TransferPlan::RepointAndDelete {
                source: 1,
                destination: 2
            }
        );
    }

    #[test]
    fn copy_onto_existing_row_is_noop() {
        let plan = plan_transfer(
            &group("a", true, true),
            &admin(1, "u", "a"),
            1,
            &GroupUid::new("b"),
            Some(&participant(2, "u", "b")),
            TransferMode::Copy,
        )
        .expect("plan");
        assert_eq!(plan, TransferPlan::Noop);
    }

    #[test]
    fn copy_and_move_into_empty_destination() {
        let source = admin(1, "u", "a");
        let to = GroupUid::new("b");
        let copy = plan_transfer(&group("a", true, true), &source, 2, &to, None, TransferMode::Copy)
            .expect("copy");
        assert_eq!(
            copy,
            TransferPlan::Duplicate {
                is_admin: true,
                approval: ApprovalState::Approved
            }
        );
        let moved = plan_transfer(
            &group("a", true, true),
            &source,
            2,
            &to,
            None,
            TransferMode::Transfer,
        )
        .expect("move");
        assert_eq!(moved, TransferPlan::Move { source: 1 });
    }

    #[test]
    fn transfer_of_last_admin_is_conflict() {
        let err = plan_transfer(
            &group("a", true, true),
            &admin(1, "u", "a"),
            1,
            &GroupUid::new("b"),
            None,
            TransferMode::Transfer,
        )
        .expect_err("last admin");
        assert!(matches!(err, AuthzError::Conflict(_)));
    }

    #[test]
    fn transfer_within_one_group_is_invalid_input() {
        let source_group = group("a", true, true);
        let source = participant(1, "u", "a");
        let same = GroupUid::new("a");
        for mode in [TransferMode::Transfer, TransferMode::Copy] {
            let err = plan_transfer(&source_group, &source, 2, &same, Some(&source), mode)
                .expect_err("same group");
            assert!(matches!(err, AuthzError::InvalidInput(_)));
            let err = plan_transfer(&source_group, &source, 2, &same, None, mode)
                .expect_err("same group without row");
            assert!(matches!(err, AuthzError::InvalidInput(_)));
        }
    }

    #[test]
    fn revocation_closes_headless_groups_only() {
        let user = UserUid::new("u");
        let rosters = vec![
            GroupRoster {
                group: group("g", true, true),
                memberships: vec![admin(1, "u", "g"), participant(2, "p", "g")],
            },
            GroupRoster {
                group: group("h", true, true),
                memberships: vec![admin(3, "u", "h"), admin(4, "other", "h")],
            },
        ];
        let plan = plan_legal_revocation(&user, &rosters);
        assert_eq!(plan.demoted, vec![1, 3]);
        assert_eq!(plan.closed, vec![GroupUid::new("g")]);
    }

    #[test]
    fn purge_blocks_on_bags_and_orphaned_participants() {
        let user = UserUid::new("u");
        let bag = DependentRecord {
            id: 1,
            membership_id: 1,
            kind: DependentKind::Bag,
        };
        let solo = vec![GroupRoster {
            group: group("g", true, true),
            memberships: vec![admin(1, "u", "g"), pending(2, "p", "g")],
        }];
        assert!(plan_purge(&user, &solo, &[bag]).is_err());

        let plan = plan_purge(&user, &solo, &[]).expect("only pending left behind");
        assert_eq!(plan.memberships, vec![1]);
        assert_eq!(plan.dissolved, vec![GroupUid::new("g")]);

        let busy = vec![GroupRoster {
            group: group("g", true, true),
            memberships: vec![admin(1, "u", "g"), participant(2, "p", "g")],
        }];
        assert!(matches!(
            plan_purge(&user, &busy, &[]),
            Err(AuthzError::Conflict(_))
        ));
    }
}
