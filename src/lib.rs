pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod store;

pub use error::{CoercionError, SchemaError};

// Export logic types
pub use logic::{
    FieldChanges, ImpactAnalyzer, MigrationGenerator, MigrationScript, RiskLevel, RollbackOutcome,
    SchemaManager, SchemaVersionControl, ValidationEngine, ValidationReport, ValueError,
};

// Export all model types
pub use model::*;

// Export store types
pub use store::{MemoryStore, PostgresStore, SchemaCatalog, Store};

/// Connect to PostgreSQL, run migrations, and hand back a ready schema
/// manager. Intended for embedding callers and integration tests.
pub async fn bootstrap() -> anyhow::Result<SchemaManager<PostgresStore>> {
    use std::sync::Arc;
    use std::time::Duration;

    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Initialize logging with INFO level only (suppress DEBUG logs)
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    // Load configuration
    let config = crate::config::AppConfig::load()?;

    // Connect to PostgreSQL
    let database_url = config.database_url()?;
    let postgres_store = crate::store::PostgresStore::new(&database_url).await?;

    // Run migrations
    postgres_store.migrate().await?;

    let catalog = SchemaCatalog::with_ttls(
        Duration::from_secs(config.cache.metadata_ttl_secs),
        Duration::from_secs(config.cache.stats_ttl_secs),
    );

    Ok(SchemaManager::new(
        Arc::new(postgres_store),
        Arc::new(catalog),
    ))
}
