use anyhow::Result;
use director_api::{create_app, start_executor_task, Config, Executor};
use director_core::db::{backup_database, create_pool, run_migrations};
use director_logging::{init_subscriber, LogSettings};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Held until exit so buffered file logs are flushed
    let _log_guard = init_subscriber(&LogSettings::from_env());

    info!("Starting director-api service...");

    // Load configuration
    let config = Config::from_env();
    info!(
        "Configuration loaded: bind_addr={}, db_path={}, director_url={}",
        config.bind_addr,
        config.db_path.display(),
        config.director_url()
    );

    // Database setup
    let db_path = &config.db_path;

    // Backup before migrations
    if db_path.exists() {
        let backup_path = backup_database(db_path)?;
        info!("Database backed up to: {}", backup_path.display());
    }

    // Create pool and run migrations
    let pool = create_pool(db_path).await?;
    info!("Running database migrations...");
    run_migrations(&pool).await?;
    info!("Migrations complete");

    if config.disable_async_mode {
        warn!("Asynchronous mode is disabled; ASYNC mutations will be rejected");
    } else {
        let executor = Executor::new(pool.clone(), &config)?;
        tokio::spawn(start_executor_task(executor, config.executor_interval_secs));
        info!(
            "Executor task started (interval: {}s)",
            config.executor_interval_secs
        );
    }

    let bind_addr = config.bind_addr.clone();
    let app = create_app(pool, config).await?;

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
