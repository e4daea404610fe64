//! Strongly typed identifiers for principals and groups.
//!
//! # Purpose
//! Wraps the opaque string uids so a user uid can never be passed where a
//! group uid is expected.
//!
//! # Key invariants
//! - Display and `as_str` return the original value unchanged.
//! - Serialization is transparent; on the wire both are plain strings.
//!
//! # Common pitfalls
//! - Empty uids are not rejected here; handlers validate at the API boundary.
use serde::{Deserialize, Serialize};

/// Opaque identifier of a principal (a user account).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserUid(String);

impl UserUid {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for UserUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserUid {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Opaque identifier of a group (a loop).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupUid(String);

impl GroupUid {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for GroupUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupUid {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
