//! Embedded schema migrations

use sqlx::PgPool;
use trellis_core::{Result, TrellisError};

/// Run all pending migrations from `migrations/`
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    tracing::info!("Running database migrations");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| TrellisError::database_error(format!("Migration failed: {}", e)))?;

    tracing::info!("Migrations completed successfully");
    Ok(())
}
