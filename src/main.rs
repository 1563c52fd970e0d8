use anyhow::Context;
use tracing_subscriber::EnvFilter;

use social_backend::{app, database, AppState, Config, Services};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("social_backend=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env().context("failed to load configuration")?;

    let services = match config.database_url.as_deref() {
        Some(database_url) => {
            let pool = database::create_connection_pool(database_url, &config)
                .await
                .context("failed to connect to the database")?;
            database::run_migrations(&pool)
                .await
                .context("failed to run database migrations")?;
            Services::postgres(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL is not set, using the in-memory store");
            Services::in_memory()
        }
    };

    let addr = config.bind_addr;
    let router = app(AppState::new(config, services));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!(%addr, "social backend listening");

    axum::serve(listener, router).await?;

    Ok(())
}
