//! Storage backends for users, organizations, memberships, and the
//! revocation ledger.
//!
//! The traits here are the engine's persistence seam. Policy lives in the
//! pure check functions of [`crate::models::membership`]; implementations
//! must call those checks against state read inside the same transactional
//! boundary that performs the write, so that two concurrent mutations of one
//! organization can never both pass the last-owner check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AuthError;
use crate::models::{Membership, OrgMember, OrgMembership, Organization, Role, User, UserCredentials};
use crate::utils::PasswordHashString;

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// User records and credential hashes.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Persist a new user together with their credential hash. Fails with
    /// [`AuthError::EmailAlreadyRegistered`] when the email is already taken
    /// (case-insensitive).
    async fn create_user(
        &self,
        user: &User,
        password_hash: &PasswordHashString,
    ) -> Result<(), AuthError>;

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AuthError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AuthError>;

    /// Fetch the credential record for a login attempt, keyed by email
    /// (case-insensitive).
    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, AuthError>;

    async fn find_credentials_by_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<UserCredentials>, AuthError>;

    /// Replace the stored credential hash. Fails with
    /// [`AuthError::UserNotFound`] when no such user exists.
    async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &PasswordHashString,
    ) -> Result<(), AuthError>;

    /// Clear the user's active flag. Deactivating an already-inactive user
    /// is a no-op success.
    async fn deactivate_user(&self, user_id: Uuid) -> Result<(), AuthError>;
}

/// Organizations and the membership relation.
#[async_trait]
pub trait OrgStore: Send + Sync {
    /// Create an organization and its creator's owner membership in one
    /// atomic step. Fails with [`AuthError::DuplicateOrganization`] when the
    /// name is taken.
    async fn create_org(&self, org: &Organization) -> Result<(), AuthError>;

    async fn find_org_by_id(&self, org_id: Uuid) -> Result<Option<Organization>, AuthError>;

    /// Remove the organization and every membership in it. Requires the
    /// actor to hold the owner role.
    async fn delete_org(&self, org_id: Uuid, actor_id: Uuid) -> Result<(), AuthError>;

    /// Role the user currently holds in the organization, if any.
    async fn membership_role(&self, org_id: Uuid, user_id: Uuid)
        -> Result<Option<Role>, AuthError>;

    async fn add_member(
        &self,
        org_id: Uuid,
        actor_id: Uuid,
        target_user_id: Uuid,
        role: Role,
    ) -> Result<Membership, AuthError>;

    async fn change_role(
        &self,
        org_id: Uuid,
        actor_id: Uuid,
        target_user_id: Uuid,
        new_role: Role,
    ) -> Result<Membership, AuthError>;

    async fn remove_member(
        &self,
        org_id: Uuid,
        actor_id: Uuid,
        target_user_id: Uuid,
    ) -> Result<(), AuthError>;

    /// Members of an organization with their roles, visible only to members.
    async fn list_members(&self, org_id: Uuid, actor_id: Uuid)
        -> Result<Vec<OrgMember>, AuthError>;

    /// Organizations the user belongs to. Self-scoped, so no privilege check.
    async fn list_memberships_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OrgMembership>, AuthError>;
}

/// Revoked refresh-token identifiers plus a per-user watermark.
#[async_trait]
pub trait RevocationLedger: Send + Sync {
    /// Claim a token identifier. Returns `true` when this call inserted it,
    /// `false` when it was already present. The claim must be atomic: under
    /// concurrent callers, exactly one observes `true`.
    async fn revoke_token(
        &self,
        token_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, AuthError>;

    async fn is_revoked(&self, token_id: Uuid) -> Result<bool, AuthError>;

    /// Raise the user's watermark: refresh tokens issued at or before the
    /// cutoff are rejected from then on. The watermark never moves backwards.
    async fn revoke_all_before(
        &self,
        user_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<(), AuthError>;

    async fn watermark(&self, user_id: Uuid) -> Result<Option<DateTime<Utc>>, AuthError>;

    /// Drop ledger entries whose token expiry is older than the cutoff.
    /// Returns the number removed.
    async fn prune_expired(&self, cutoff: DateTime<Utc>) -> Result<u64, AuthError>;
}

/// Everything the engine needs from one backend.
pub trait GatehouseStore: UserStore + OrgStore + RevocationLedger {}

impl<T: UserStore + OrgStore + RevocationLedger> GatehouseStore for T {}
