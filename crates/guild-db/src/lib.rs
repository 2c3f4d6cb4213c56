//! guild-db - PostgreSQL storage for cached characters
//!
//! Implements `CharacterStore` on top of a `sqlx` connection pool. Upserts
//! are single `INSERT .. ON CONFLICT (name, realm) DO UPDATE` statements, so
//! the uniqueness constraint on the pair is what makes them atomic per key.

mod repo;

pub use repo::PgCharacterStore;

use sqlx::postgres::PgPoolOptions;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Apply the embedded schema migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Verify the pool can reach the database.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
