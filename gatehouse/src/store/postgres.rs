//! PostgreSQL backend.
//!
//! Membership mutations run inside a transaction that first takes a row lock
//! on the organization, so the policy checks and the write they guard are
//! serialized per organization even across service instances.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatehouse_core::{with_retries, RetryConfig, StoreError};
use sqlx::postgres::PgPool;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::error::AuthError;
use crate::models::{
    membership, Membership, OrgMember, OrgMembership, Organization, Role, User, UserCredentials,
};
use crate::utils::PasswordHashString;

use super::{OrgStore, RevocationLedger, UserStore};

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    retry: RetryConfig,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            retry: RetryConfig::default(),
        }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Ping the database.
    pub async fn health_check(&self) -> Result<(), AuthError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    // ==================== Transaction Helpers ====================

    /// Lock the organization row. Membership mutations for one organization
    /// serialize on this lock for the rest of the transaction.
    async fn lock_org(tx: &mut Transaction<'_, Postgres>, org_id: Uuid) -> Result<(), AuthError> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT org_id FROM organizations WHERE org_id = $1 FOR UPDATE")
                .bind(org_id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(store_err)?;

        row.map(|_| ()).ok_or(AuthError::OrganizationNotFound)
    }

    async fn role_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        org_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Role>, AuthError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT role FROM memberships WHERE org_id = $1 AND user_id = $2")
                .bind(org_id)
                .bind(user_id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(store_err)?;

        row.map(|(label,)| parse_role(&label)).transpose()
    }

    async fn owner_count_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        org_id: Uuid,
    ) -> Result<u32, AuthError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM memberships WHERE org_id = $1 AND role = $2")
                .bind(org_id)
                .bind(Role::Owner.as_str())
                .fetch_one(&mut **tx)
                .await
                .map_err(store_err)?;

        Ok(count as u32)
    }

    async fn user_exists_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
    ) -> Result<bool, AuthError> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE user_id = $1)")
                .bind(user_id)
                .fetch_one(&mut **tx)
                .await
                .map_err(store_err)?;

        Ok(exists)
    }

    // ==================== Transactional Bodies ====================

    async fn try_create_user(
        &self,
        user: &User,
        password_hash: &PasswordHashString,
    ) -> Result<(), AuthError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        sqlx::query(
            r#"
            INSERT INTO users (user_id, email, is_active, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user.user_id)
        .bind(&user.email)
        .bind(user.is_active)
        .bind(user.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if unique_violation(&e) {
                AuthError::EmailAlreadyRegistered
            } else {
                store_err(e)
            }
        })?;

        sqlx::query("INSERT INTO user_credentials (user_id, password_hash) VALUES ($1, $2)")
            .bind(user.user_id)
            .bind(password_hash.as_str())
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;
        Ok(())
    }

    async fn try_create_org(&self, org: &Organization) -> Result<(), AuthError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        sqlx::query(
            r#"
            INSERT INTO organizations (org_id, name, created_by, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(org.org_id)
        .bind(&org.name)
        .bind(org.created_by)
        .bind(org.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if unique_violation(&e) {
                AuthError::DuplicateOrganization
            } else {
                store_err(e)
            }
        })?;

        // The creator's owner membership lands in the same transaction, so
        // no observer ever sees an ownerless organization.
        let owner = Membership::new(org.created_by, org.org_id, Role::Owner);
        sqlx::query(
            r#"
            INSERT INTO memberships (user_id, org_id, role, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(owner.user_id)
        .bind(owner.org_id)
        .bind(owner.role.as_str())
        .bind(owner.created_at)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;
        Ok(())
    }

    async fn try_delete_org(&self, org_id: Uuid, actor_id: Uuid) -> Result<(), AuthError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        Self::lock_org(&mut tx, org_id).await?;
        let actor_role = Self::role_in_tx(&mut tx, org_id, actor_id).await?;
        membership::check_delete_org(actor_role)?;

        // Memberships cascade with the organization row.
        sqlx::query("DELETE FROM organizations WHERE org_id = $1")
            .bind(org_id)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;
        Ok(())
    }

    async fn try_add_member(
        &self,
        org_id: Uuid,
        actor_id: Uuid,
        target_user_id: Uuid,
        role: Role,
    ) -> Result<Membership, AuthError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        Self::lock_org(&mut tx, org_id).await?;
        let actor_role = Self::role_in_tx(&mut tx, org_id, actor_id).await?;
        let target_role = Self::role_in_tx(&mut tx, org_id, target_user_id).await?;
        membership::check_add_member(actor_role, target_role, role)?;

        if !Self::user_exists_in_tx(&mut tx, target_user_id).await? {
            return Err(AuthError::UserNotFound);
        }

        let created = Membership::new(target_user_id, org_id, role);
        sqlx::query(
            r#"
            INSERT INTO memberships (user_id, org_id, role, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(created.user_id)
        .bind(created.org_id)
        .bind(created.role.as_str())
        .bind(created.created_at)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;
        Ok(created)
    }

    async fn try_change_role(
        &self,
        org_id: Uuid,
        actor_id: Uuid,
        target_user_id: Uuid,
        new_role: Role,
    ) -> Result<Membership, AuthError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        Self::lock_org(&mut tx, org_id).await?;
        let actor_role = Self::role_in_tx(&mut tx, org_id, actor_id).await?;
        let target_role = Self::role_in_tx(&mut tx, org_id, target_user_id).await?;
        let owner_count = Self::owner_count_in_tx(&mut tx, org_id).await?;
        membership::check_change_role(actor_role, target_role, new_role, owner_count)?;

        let row: MembershipRow = sqlx::query_as(
            r#"
            UPDATE memberships SET role = $3
            WHERE org_id = $1 AND user_id = $2
            RETURNING user_id, org_id, role, created_at
            "#,
        )
        .bind(org_id)
        .bind(target_user_id)
        .bind(new_role.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;
        row.into_membership()
    }

    async fn try_remove_member(
        &self,
        org_id: Uuid,
        actor_id: Uuid,
        target_user_id: Uuid,
    ) -> Result<(), AuthError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        Self::lock_org(&mut tx, org_id).await?;
        let actor_role = Self::role_in_tx(&mut tx, org_id, actor_id).await?;
        let target_role = Self::role_in_tx(&mut tx, org_id, target_user_id).await?;
        let owner_count = Self::owner_count_in_tx(&mut tx, org_id).await?;
        let self_removal = actor_id == target_user_id;
        membership::check_remove_member(actor_role, target_role, owner_count, self_removal)?;

        sqlx::query("DELETE FROM memberships WHERE org_id = $1 AND user_id = $2")
            .bind(org_id)
            .bind(target_user_id)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;
        Ok(())
    }
}

// ==================== User Operations ====================

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(
        &self,
        user: &User,
        password_hash: &PasswordHashString,
    ) -> Result<(), AuthError> {
        with_retries(&self.retry, "create_user", || {
            self.try_create_user(user, password_hash)
        })
        .await
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AuthError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)
    }

    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, AuthError> {
        sqlx::query_as::<_, UserCredentials>(
            r#"
            SELECT u.user_id, c.password_hash, u.is_active
            FROM users u
            JOIN user_credentials c ON c.user_id = u.user_id
            WHERE LOWER(u.email) = LOWER($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)
    }

    async fn find_credentials_by_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<UserCredentials>, AuthError> {
        sqlx::query_as::<_, UserCredentials>(
            r#"
            SELECT u.user_id, c.password_hash, u.is_active
            FROM users u
            JOIN user_credentials c ON c.user_id = u.user_id
            WHERE u.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)
    }

    async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &PasswordHashString,
    ) -> Result<(), AuthError> {
        let result = sqlx::query("UPDATE user_credentials SET password_hash = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(password_hash.as_str())
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(AuthError::UserNotFound);
        }
        Ok(())
    }

    async fn deactivate_user(&self, user_id: Uuid) -> Result<(), AuthError> {
        let result = sqlx::query("UPDATE users SET is_active = FALSE WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(AuthError::UserNotFound);
        }
        Ok(())
    }
}

// ==================== Organization Operations ====================

#[async_trait]
impl OrgStore for PgStore {
    async fn create_org(&self, org: &Organization) -> Result<(), AuthError> {
        with_retries(&self.retry, "create_org", || self.try_create_org(org)).await
    }

    async fn find_org_by_id(&self, org_id: Uuid) -> Result<Option<Organization>, AuthError> {
        sqlx::query_as::<_, Organization>("SELECT * FROM organizations WHERE org_id = $1")
            .bind(org_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)
    }

    async fn delete_org(&self, org_id: Uuid, actor_id: Uuid) -> Result<(), AuthError> {
        with_retries(&self.retry, "delete_org", || {
            self.try_delete_org(org_id, actor_id)
        })
        .await
    }

    async fn membership_role(
        &self,
        org_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Role>, AuthError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT role FROM memberships WHERE org_id = $1 AND user_id = $2")
                .bind(org_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_err)?;

        row.map(|(label,)| parse_role(&label)).transpose()
    }

    async fn add_member(
        &self,
        org_id: Uuid,
        actor_id: Uuid,
        target_user_id: Uuid,
        role: Role,
    ) -> Result<Membership, AuthError> {
        with_retries(&self.retry, "add_member", || {
            self.try_add_member(org_id, actor_id, target_user_id, role)
        })
        .await
    }

    async fn change_role(
        &self,
        org_id: Uuid,
        actor_id: Uuid,
        target_user_id: Uuid,
        new_role: Role,
    ) -> Result<Membership, AuthError> {
        with_retries(&self.retry, "change_role", || {
            self.try_change_role(org_id, actor_id, target_user_id, new_role)
        })
        .await
    }

    async fn remove_member(
        &self,
        org_id: Uuid,
        actor_id: Uuid,
        target_user_id: Uuid,
    ) -> Result<(), AuthError> {
        with_retries(&self.retry, "remove_member", || {
            self.try_remove_member(org_id, actor_id, target_user_id)
        })
        .await
    }

    async fn list_members(
        &self,
        org_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Vec<OrgMember>, AuthError> {
        if self.find_org_by_id(org_id).await?.is_none() {
            return Err(AuthError::OrganizationNotFound);
        }
        let actor_role = self.membership_role(org_id, actor_id).await?;
        membership::check_list_members(actor_role)?;

        let rows: Vec<OrgMemberRow> = sqlx::query_as(
            r#"
            SELECT u.user_id, u.email, u.is_active, u.created_at, m.role
            FROM memberships m
            JOIN users u ON u.user_id = m.user_id
            WHERE m.org_id = $1
            ORDER BY m.created_at
            "#,
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.into_iter().map(OrgMemberRow::into_member).collect()
    }

    async fn list_memberships_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OrgMembership>, AuthError> {
        let rows: Vec<OrgMembershipRow> = sqlx::query_as(
            r#"
            SELECT o.org_id, o.name, o.created_by, o.created_at, m.role
            FROM memberships m
            JOIN organizations o ON o.org_id = m.org_id
            WHERE m.user_id = $1
            ORDER BY m.created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.into_iter()
            .map(OrgMembershipRow::into_org_membership)
            .collect()
    }
}

// ==================== Revocation Ledger Operations ====================

#[async_trait]
impl RevocationLedger for PgStore {
    async fn revoke_token(
        &self,
        token_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let result = sqlx::query(
            r#"
            INSERT INTO revoked_tokens (token_id, expires_at)
            VALUES ($1, $2)
            ON CONFLICT (token_id) DO NOTHING
            "#,
        )
        .bind(token_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn is_revoked(&self, token_id: Uuid) -> Result<bool, AuthError> {
        let (revoked,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM revoked_tokens WHERE token_id = $1)")
                .bind(token_id)
                .fetch_one(&self.pool)
                .await
                .map_err(store_err)?;

        Ok(revoked)
    }

    async fn revoke_all_before(
        &self,
        user_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO revocation_watermarks (user_id, cutoff_at)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE
            SET cutoff_at = GREATEST(revocation_watermarks.cutoff_at, EXCLUDED.cutoff_at)
            "#,
        )
        .bind(user_id)
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }

    async fn watermark(&self, user_id: Uuid) -> Result<Option<DateTime<Utc>>, AuthError> {
        let row: Option<(DateTime<Utc>,)> =
            sqlx::query_as("SELECT cutoff_at FROM revocation_watermarks WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_err)?;

        Ok(row.map(|(cutoff,)| cutoff))
    }

    async fn prune_expired(&self, cutoff: DateTime<Utc>) -> Result<u64, AuthError> {
        let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        Ok(result.rows_affected())
    }
}

// ==================== Row Mapping ====================

#[derive(sqlx::FromRow)]
struct MembershipRow {
    user_id: Uuid,
    org_id: Uuid,
    role: String,
    created_at: DateTime<Utc>,
}

impl MembershipRow {
    fn into_membership(self) -> Result<Membership, AuthError> {
        Ok(Membership {
            user_id: self.user_id,
            org_id: self.org_id,
            role: parse_role(&self.role)?,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrgMemberRow {
    user_id: Uuid,
    email: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    role: String,
}

impl OrgMemberRow {
    fn into_member(self) -> Result<OrgMember, AuthError> {
        Ok(OrgMember {
            user: User {
                user_id: self.user_id,
                email: self.email,
                is_active: self.is_active,
                created_at: self.created_at,
            },
            role: parse_role(&self.role)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrgMembershipRow {
    org_id: Uuid,
    name: String,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    role: String,
}

impl OrgMembershipRow {
    fn into_org_membership(self) -> Result<OrgMembership, AuthError> {
        Ok(OrgMembership {
            organization: Organization {
                org_id: self.org_id,
                name: self.name,
                created_by: self.created_by,
                created_at: self.created_at,
            },
            role: parse_role(&self.role)?,
        })
    }
}

/// Role labels are written exclusively through [`Role::as_str`], so anything
/// unparseable here means the table was edited out-of-band.
fn parse_role(label: &str) -> Result<Role, AuthError> {
    label
        .parse::<Role>()
        .map_err(|e| AuthError::Store(StoreError::corrupt(e)))
}

fn unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn store_err(e: sqlx::Error) -> AuthError {
    let mapped = match e {
        sqlx::Error::PoolTimedOut => StoreError::timeout("pool acquire"),
        sqlx::Error::PoolClosed => StoreError::unavailable(anyhow::anyhow!("connection pool closed")),
        sqlx::Error::Io(io) => StoreError::unavailable(anyhow::anyhow!(io)),
        // 40001 serialization_failure, 40P01 deadlock_detected: the
        // transaction was rolled back and is safe to re-run from the top.
        sqlx::Error::Database(db)
            if matches!(db.code().as_deref(), Some("40001") | Some("40P01")) =>
        {
            StoreError::conflict("transaction")
        }
        other => StoreError::Internal(anyhow::anyhow!(other)),
    };
    AuthError::Store(mapped)
}
