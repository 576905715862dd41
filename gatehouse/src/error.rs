use gatehouse_core::{StoreError, Transient};
use thiserror::Error;

/// Engine error taxonomy.
///
/// Policy and identity failures are final decisions for the caller to map
/// (deny, conflict, re-authenticate); only [`AuthError::Configuration`] at
/// startup is fatal, and only [`AuthError::Store`] may ever be transient.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Bad credentials. Deliberately generic: never distinguishes unknown
    /// identifier, wrong password, or deactivated account.
    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("token expired")]
    ExpiredToken,

    #[error("malformed token")]
    MalformedToken,

    #[error("token revoked")]
    RevokedToken,

    #[error("insufficient role: {reason}")]
    InsufficientRole { reason: &'static str },

    #[error("operation would leave the organization without an owner")]
    LastOwnerViolation,

    #[error("user already has a membership in this organization")]
    DuplicateMembership,

    #[error("organization name already taken")]
    DuplicateOrganization,

    #[error("email already registered")]
    EmailAlreadyRegistered,

    #[error("user not found")]
    UserNotFound,

    #[error("organization not found")]
    OrganizationNotFound,

    #[error("membership not found")]
    MembershipNotFound,

    #[error("invalid email: {0}")]
    InvalidEmail(&'static str),

    #[error("invalid password: {0}")]
    InvalidPassword(&'static str),

    #[error("invalid organization name: {0}")]
    InvalidOrganizationName(&'static str),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub(crate) fn insufficient(reason: &'static str) -> Self {
        AuthError::InsufficientRole { reason }
    }

    /// Token-state failures the caller should answer with "re-authenticate".
    pub fn requires_reauth(&self) -> bool {
        matches!(
            self,
            AuthError::ExpiredToken | AuthError::MalformedToken | AuthError::RevokedToken
        )
    }

    /// Policy denials, surfaced as "forbidden" with the specific reason.
    pub fn is_forbidden(&self) -> bool {
        matches!(
            self,
            AuthError::InsufficientRole { .. } | AuthError::LastOwnerViolation
        )
    }

    /// State conflicts on create/update operations.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            AuthError::DuplicateMembership
                | AuthError::DuplicateOrganization
                | AuthError::EmailAlreadyRegistered
        )
    }

    /// Absent records on management calls.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AuthError::UserNotFound
                | AuthError::OrganizationNotFound
                | AuthError::MembershipNotFound
        )
    }

    /// Whether a retry has any chance of succeeding. Only storage-layer
    /// failures can be transient; every policy outcome is final.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Store(err) => err.is_transient(),
            _ => false,
        }
    }
}

impl Transient for AuthError {
    fn is_transient(&self) -> bool {
        AuthError::is_transient(self)
    }
}
