use serde::{Deserialize, Serialize};
use std::fmt;

/// Privilege ladder, ordered from least to most privileged.
///
/// `Guest` exists so route tables can describe public endpoints; the engine
/// rejects it as a contract violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthLevel {
    Guest,
    AnyUser,
    GroupMember,
    GroupAdmin,
    Root,
}

impl AuthLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthLevel::Guest => "guest",
            AuthLevel::AnyUser => "any_user",
            AuthLevel::GroupMember => "group_member",
            AuthLevel::GroupAdmin => "group_admin",
            AuthLevel::Root => "root",
        }
    }

    /// Levels that can only be evaluated against a concrete group.
    pub fn requires_group(self) -> bool {
        matches!(self, AuthLevel::GroupMember | AuthLevel::GroupAdmin)
    }
}

impl fmt::Display for AuthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
