//! Partial-update payloads.
//!
//! Each field is [`Patch::Unset`] when absent from the request body and
//! [`Patch::Set`] when present, so "leave alone" and "set to null" stay
//! distinguishable for nullable fields such as `paused_until`.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::model::{Group, Principal};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    Unset,
    Set(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Unset
    }
}

impl<T> Patch<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, Patch::Set(_))
    }

    pub fn is_unset(&self) -> bool {
        !self.is_set()
    }

    /// Writes the value into `target` when set. Returns whether it did.
    pub fn apply_to(&self, target: &mut T) -> bool
    where
        T: Clone,
    {
        match self {
            Patch::Set(value) => {
                *target = value.clone();
                true
            }
            Patch::Unset => false,
        }
    }
}

impl<'de, T> Deserialize<'de> for Patch<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Patch::Set)
    }
}

impl<T> Serialize for Patch<T>
where
    T: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Patch::Set(value) => value.serialize(serializer),
            Patch::Unset => serializer.serialize_none(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPatch {
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub name: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub description: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub open_to_new_members: Patch<bool>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub published: Patch<bool>,
}

impl GroupPatch {
    /// Returns the patched copy of `group`.
    pub fn applied(&self, group: &Group) -> Group {
        let mut next = group.clone();
        self.name.apply_to(&mut next.name);
        self.description.apply_to(&mut next.description);
        self.open_to_new_members
            .apply_to(&mut next.open_to_new_members);
        self.published.apply_to(&mut next.published);
        next
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPatch {
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub name: Patch<String>,
    /// `null` or a past instant resumes the account.
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub paused_until: Patch<Option<DateTime<Utc>>>,
    /// Per-group pause; requires a group uid on the request.
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub group_paused: Patch<bool>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub accepted_legal: Patch<bool>,
}

/// Membership-level follow-ups a [`UserPatch`] requires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserPatchEffects {
    pub unpause_memberships: bool,
    pub revoke_legal: bool,
}

impl UserPatch {
    /// Applies the principal-level fields and reports the membership writes
    /// the store still has to make.
    pub fn apply(
        &self,
        principal: &mut Principal,
        acting_on_self: bool,
        now: DateTime<Utc>,
    ) -> UserPatchEffects {
        let mut effects = UserPatchEffects::default();
        self.name.apply_to(&mut principal.name);
        if let Patch::Set(until) = &self.paused_until {
            match until {
                Some(until) if *until > now => principal.paused_until = Some(*until),
                _ => {
                    principal.paused_until = None;
                    effects.unpause_memberships = acting_on_self;
                }
            }
        }
        if let Patch::Set(accepted) = self.accepted_legal {
            principal.accepted_legal = accepted;
            effects.revoke_legal = !accepted;
        }
        effects
    }
}
