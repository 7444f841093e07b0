use medichat::core::{AppState, Config};
use medichat::create_router;
use medichat::ws::dispatch::LogOnlyNotifier;
use medichat::ws::presence::LocalPresence;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    config.print_info();
    medichat::core::error::expose_error_details(!config.is_production());

    let connect_options =
        SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(connect_options)
        .await?;

    sqlx::migrate!().run(&pool).await?;
    info!("Database migrated");

    let state = Arc::new(AppState::with_collaborators(
        pool,
        config.jwt_secret.clone(),
        Arc::new(LocalPresence::new()),
        Arc::new(LogOnlyNotifier),
        Duration::from_secs(config.presence_grace_secs),
    ));

    let app = create_router(state);

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
