//! Server: settings from the environment, schema from SCHEMA_PATH or the bundled blog schema,
//! Postgres storage when DATABASE_URL is set and in-memory storage otherwise.

use fieldnotes::schema::{blog, load_registry, SchemaDocument};
use fieldnotes::{app, AppState, MemoryStorage, PgStorage, SchemaRegistry, Session, Settings, Storage};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("fieldnotes=info")),
        )
        .init();

    let settings = Settings::from_env()?;

    let registry: SchemaRegistry = match &settings.schema_path {
        Some(path) => load_registry(&SchemaDocument::from_path(path).await?)?,
        None => blog::registry()?,
    };
    let registry = registry.freeze()?;

    let storage: Arc<dyn Storage> = match &settings.database_url {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(settings.storage_timeout)
                .connect(url)
                .await?;
            let pg = match &settings.database_schema {
                Some(schema) => PgStorage::new(pool).with_schema(schema.as_str()),
                None => PgStorage::new(pool),
            };
            tracing::info!(schema = %pg.schema(), "using postgres storage");
            Arc::new(pg)
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory storage");
            Arc::new(MemoryStorage::new())
        }
    };

    let state = AppState::new(Session::new(registry, storage, settings.storage_timeout));
    let listener = TcpListener::bind(settings.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app(state)).await?;
    Ok(())
}
