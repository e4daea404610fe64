//! Loop authorization primitives shared by the coordinator service.
//!
//! # Purpose
//! Centralizes the authorization ladder, the acting-on-user resolution, the
//! membership state rules, and the credential model used by every protected
//! operation of the coordinator.
//!
//! # How it fits
//! The coordinator resolves a bearer token to a [`Principal`], then calls
//! [`authorize`] or [`authorize_acting_on_user`] before touching any state.
//! Mutations are decided by the pure guards in [`transitions`] and applied by
//! the coordinator store inside a single transaction.
//!
//! # Key invariants
//! - The engine never mutates state; it only reads through a [`Directory`].
//! - A root administrator passes every level for every group.
//! - Every group that is open to new members keeps at least one admin.
//!
//! # Examples
//! ```rust
//! use loop_authz::AuthLevel;
//!
//! assert!(AuthLevel::GroupAdmin > AuthLevel::GroupMember);
//! assert!(AuthLevel::GroupMember.requires_group());
//! ```
//!
//! # Common pitfalls
//! - Calling the engine for guest routes is a programming error and surfaces
//!   as [`AuthzError::Internal`].
//! - A one-time code is not a session; only verified credentials authenticate.

mod acting;
mod credential;
mod directory;
mod engine;
mod errors;
mod level;
mod memberships;
mod model;
mod patch;
pub mod transitions;
mod types;

#[cfg(test)]
pub(crate) mod fixtures;

pub use acting::{ActingOnUser, ActingRelation, authorize_acting_on_user, resolve_relation};
pub use credential::{
    Credential, CredentialPolicy, IssuedToken, ONE_TIME_CODE_DIGITS, digest,
    generate_one_time_code, generate_session_token,
};
pub use directory::Directory;
pub use engine::{Authorized, authorize, evaluate};
pub use errors::{AuthzError, AuthzResult};
pub use level::AuthLevel;
pub use memberships::MembershipSet;
pub use model::{
    ApprovalState, DependentKind, DependentRecord, Group, Membership, MembershipId, Principal,
};
pub use patch::{GroupPatch, Patch, UserPatch, UserPatchEffects};
pub use transitions::{GroupRoster, PurgePlan, RevocationPlan, TransferMode, TransferPlan};
pub use types::{GroupUid, UserUid};
