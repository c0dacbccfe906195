//! Error model for credential handling and authorization.

use thiserror::Error;

use gatekeep_core::PrincipalId;

use crate::authorize::ResolvedRequirement;

/// Result type used across the engine.
pub type AuthResult<T> = Result<T, AuthError>;

/// Storage failure inside a [`crate::RevocationCounter`] backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CounterError {
    #[error("counter lock poisoned")]
    Poisoned,

    #[error("counter backend error: {0}")]
    Backend(String),
}

/// Every failure the engine reports.
///
/// Nothing here is retried automatically; callers map each kind to a
/// user-facing status.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("token signature does not verify")]
    InvalidSignature,

    #[error("credential has expired")]
    ExpiredCredential,

    #[error("refresh credential has been superseded or revoked")]
    StaleCredential,

    #[error("malformed permission: {0}")]
    MalformedPermission(String),

    #[error("no binding for scope placeholder '{{{placeholder}}}'")]
    UnboundScope { placeholder: String },

    #[error("path parameter '{name}' is not a valid instance id: {value:?}")]
    InvalidBinding { name: String, value: String },

    #[error("forbidden: missing {}", render_missing(.missing))]
    InsufficientPermission { missing: Vec<ResolvedRequirement> },

    #[error("principal {0} not found")]
    PrincipalNotFound(PrincipalId),

    #[error("principal {0} still exists; remove it from the directory first")]
    PrincipalStillExists(PrincipalId),

    #[error(transparent)]
    Counter(#[from] CounterError),

    #[error("principal directory error: {0}")]
    Directory(String),
}

/// Field-less discriminant of [`AuthError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorKind {
    MalformedToken,
    InvalidSignature,
    ExpiredCredential,
    StaleCredential,
    MalformedPermission,
    UnboundScope,
    InvalidBinding,
    InsufficientPermission,
    PrincipalNotFound,
    PrincipalStillExists,
    Counter,
    Directory,
}

impl AuthError {
    pub fn malformed_token(msg: impl Into<String>) -> Self {
        Self::MalformedToken(msg.into())
    }

    pub fn malformed_permission(msg: impl Into<String>) -> Self {
        Self::MalformedPermission(msg.into())
    }

    pub fn directory(msg: impl Into<String>) -> Self {
        Self::Directory(msg.into())
    }

    pub fn kind(&self) -> AuthErrorKind {
        match self {
            Self::MalformedToken(_) => AuthErrorKind::MalformedToken,
            Self::InvalidSignature => AuthErrorKind::InvalidSignature,
            Self::ExpiredCredential => AuthErrorKind::ExpiredCredential,
            Self::StaleCredential => AuthErrorKind::StaleCredential,
            Self::MalformedPermission(_) => AuthErrorKind::MalformedPermission,
            Self::UnboundScope { .. } => AuthErrorKind::UnboundScope,
            Self::InvalidBinding { .. } => AuthErrorKind::InvalidBinding,
            Self::InsufficientPermission { .. } => AuthErrorKind::InsufficientPermission,
            Self::PrincipalNotFound(_) => AuthErrorKind::PrincipalNotFound,
            Self::PrincipalStillExists(_) => AuthErrorKind::PrincipalStillExists,
            Self::Counter(_) => AuthErrorKind::Counter,
            Self::Directory(_) => AuthErrorKind::Directory,
        }
    }

    /// Errors caused by a broken route table rather than by the client.
    pub fn is_caller_bug(&self) -> bool {
        matches!(
            self.kind(),
            AuthErrorKind::MalformedPermission | AuthErrorKind::UnboundScope
        )
    }

    /// Errors that mean "present a different credential".
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self.kind(),
            AuthErrorKind::MalformedToken
                | AuthErrorKind::InvalidSignature
                | AuthErrorKind::ExpiredCredential
                | AuthErrorKind::StaleCredential
        )
    }
}

fn render_missing(missing: &[ResolvedRequirement]) -> String {
    missing
        .iter()
        .map(|r| format!("'{r}'"))
        .collect::<Vec<_>>()
        .join(", ")
}
