//! Schema migrations for the PostgreSQL store.
//!
//! The `credentials`, `roles` and `sessions` tables live in
//! `warden_core/migrations/` and are embedded at compile time.

use sqlx::PgPool;

/// Apply every pending migration to `pool`.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
