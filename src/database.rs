use std::time::Duration;

use sqlx::{migrate::{MigrateError, Migrator}, postgres::PgPoolOptions, Pool, Postgres};

pub type Database = Pool<Postgres>;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub async fn create_database_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<Database, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await?;

    // Test the connection
    sqlx::query("SELECT 1")
        .fetch_one(&pool)
        .await?;

    log::info!("Connected to database (max {} connections)", max_connections);
    Ok(pool)
}

pub async fn run_migrations(pool: &Database) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}
