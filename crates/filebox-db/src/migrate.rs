use sqlx::migrate::{MigrateError, Migrator};
use sqlx::PgPool;
use tracing::info;

/// Migrations embedded from `migrations/` at build time
pub static MIGRATOR: Migrator = sqlx::migrate!();

/// Bring the `files` schema up to the newest embedded migration.
/// Applied versions are tracked in `_sqlx_migrations`.
pub async fn migrate(pool: &PgPool) -> Result<(), MigrateError> {
    let latest = MIGRATOR.iter().map(|m| m.version).max().unwrap_or_default();
    info!(
        embedded = MIGRATOR.iter().count(),
        latest, "Applying file schema migrations"
    );
    MIGRATOR.run(pool).await?;
    info!(version = latest, "File schema up to date");
    Ok(())
}
