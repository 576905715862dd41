//! One-shot revocation-ledger maintenance.
//!
//! Deletes revoked-token entries whose retention window has passed. Intended
//! to run from cron or a scheduler sidecar; the engine never schedules it.

use std::sync::Arc;

use gatehouse::config::GatehouseConfig;
use gatehouse::db;
use gatehouse::services::AuthService;
use gatehouse::store::PgStore;
use gatehouse_core::observability::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatehouseConfig::from_env()?;
    init_tracing(&config.service_name, &config.log_level);

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;

    let store = PgStore::new(pool);
    let auth = AuthService::new(Arc::new(store), &config.token);

    let removed = auth.prune_expired_tokens().await?;
    tracing::info!(removed, "ledger maintenance complete");

    Ok(())
}
