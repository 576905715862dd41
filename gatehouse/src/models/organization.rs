//! Organization model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Organization entity. `created_by` is set at creation and immutable; the
/// creator's OWNER membership is written in the same transaction as this row.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Organization {
    pub org_id: Uuid,
    pub name: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Organization {
    /// Create a new organization.
    pub fn new(name: String, created_by: Uuid) -> Self {
        Self {
            org_id: Uuid::new_v4(),
            name,
            created_by,
            created_at: Utc::now(),
        }
    }
}
