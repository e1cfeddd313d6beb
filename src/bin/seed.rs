//! Loads the demo dataset into the configured database.

use dotenvy::dotenv;
use thiserror::Error;

use reimburse::{
    config::{Config, ConfigError},
    database::{create_database_pool, run_migrations},
    repository::PgRepository,
    seed::{seed_demo_data, SeedError},
};

#[derive(Debug, Error)]
enum SeedCommandError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to connect to database: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to run migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("failed to seed: {0}")]
    Seed(#[from] SeedError),
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run().await {
        log::error!("{}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), SeedCommandError> {
    let database_url = Config::database_url_from_env()?;
    let pool = create_database_pool(&database_url, 1).await?;
    run_migrations(&pool).await?;

    let repo = PgRepository::new(pool.clone());
    if seed_demo_data(&repo).await? {
        log::info!("demo data loaded");
    }

    pool.close().await;
    Ok(())
}
