use std::{net::SocketAddr, sync::Arc};

use dotenvy::dotenv;
use thiserror::Error;

use reimburse::{
    config::{Config, ConfigError},
    create_router,
    database::{create_database_pool, run_migrations},
    repository::PgRepository,
    seed::{ensure_admin_account, SeedError},
    utils::TokenKeys,
    AppState,
};

#[derive(Debug, Error)]
enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to connect to database: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to run migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("failed to create admin account: {0}")]
    Seed(#[from] SeedError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    env_logger::init();

    if let Err(err) = run().await {
        log::error!("{}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    let config = Config::from_env()?;

    let pool = create_database_pool(&config.database_url, config.max_connections).await?;
    run_migrations(&pool).await?;
    log::info!("Database migrations applied");

    tokio::fs::create_dir_all(&config.upload_dir).await?;

    let repo = Arc::new(PgRepository::new(pool.clone()));
    if let Some(admin) = &config.admin {
        ensure_admin_account(repo.as_ref(), &admin.email, &admin.password).await?;
    }

    let state = AppState::new(
        repo,
        TokenKeys::new(&config.jwt_secret),
        config.upload_dir.clone(),
    );
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::error!("failed to listen for ctrl-c: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                log::error!("failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::info!("Shutdown signal received, draining connections");
}
