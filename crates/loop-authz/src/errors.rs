use thiserror::Error;

/// Failure kinds surfaced by authorization and membership rules.
///
/// The coordinator maps each variant onto one HTTP status; see
/// [`AuthzError::kind`] for the stable label used in metrics and error codes.
#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("insufficient role: {0}")]
    InsufficientRole(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type AuthzResult<T> = Result<T, AuthzError>;

impl AuthzError {
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn insufficient_role(message: impl Into<String>) -> Self {
        Self::InsufficientRole(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// A caller broke a contract of this crate (for example a group-scoped
    /// level without a group).
    pub fn contract_violation(message: &'static str) -> Self {
        Self::Internal(anyhow::anyhow!(message))
    }

    /// Stable snake_case label for the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "unauthenticated",
            Self::NotFound(_) => "not_found",
            Self::InsufficientRole(_) => "insufficient_role",
            Self::Conflict(_) => "conflict",
            Self::InvalidInput(_) => "invalid_input",
            Self::Internal(_) => "internal",
        }
    }
}
