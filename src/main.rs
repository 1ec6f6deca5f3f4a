//! Library catalog server

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

use library_catalog::{
    api::{self, AuthStrategy, JwtStrategy},
    config::{AppConfig, LogFormat, LoggingConfig, RunMode, StorageConfig},
    models::renewal::SystemClock,
    repository::Repository,
    services::{storage, Services},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    // Must live as long as the process for the file log to be flushed
    let _log_guard = init_tracing(&config.logging)?;

    tracing::info!(
        "Starting library catalog v{} ({})",
        env!("CARGO_PKG_VERSION"),
        config.environment.as_str()
    );

    if config.environment == RunMode::Production
        && config.auth.jwt_secret == library_catalog::config::AuthConfig::default().jwt_secret
    {
        tracing::warn!("Running in production with the default JWT secret; set JWT_SECRET");
    }

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!("Database migrations completed");

    if let StorageConfig::Filesystem { root, .. } = &config.storage {
        tokio::fs::create_dir_all(root)
            .await
            .with_context(|| format!("Cannot create media directory {}", root.display()))?;
    }
    let store = storage::from_config(&config.storage).context("Failed to set up media storage")?;

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );

    let repository = Repository::new(pool);
    let services = Services::new(
        repository,
        config.auth.clone(),
        config.email.clone(),
        store,
        Arc::new(SystemClock),
    );
    let auth: Arc<dyn AuthStrategy> = Arc::new(JwtStrategy::new(
        config.auth.jwt_secret.clone(),
        services.accounts.clone(),
    ));

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
        auth,
    };

    let app = api::router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Console output in the configured format, plus warnings to a file when asked
fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("library_catalog={},tower_http=debug", logging.level).into()
    });

    let console = match logging.format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().boxed(),
    };

    let (file, guard) = match &logging.file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("Log file {} has no file name", path.display()))?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(LevelFilter::WARN);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();

    Ok(guard)
}
