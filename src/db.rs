pub mod query_builder;
pub mod transaction;

use crate::config::AppConfig;
use crate::entities::{item, laboratory, movement, section, storage, user};
use metrics::{counter, gauge};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityName, EntityTrait,
    Schema,
};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

pub use query_builder::{Page, PageLimits, PageRequest};
pub use transaction::with_transaction;

pub type DbPool = DatabaseConnection;

/// Pool sizing and timeouts, usually derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    /// How long an unused connection stays open
    pub idle_timeout: Duration,
    /// How long a caller waits for a free connection
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, DbErr> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    gauge!("labstock_db.max_connections", config.max_connections as f64);

    let pool = match Database::connect(options).await {
        Ok(pool) => pool,
        Err(err) => {
            counter!("labstock_db.connection_failures", 1);
            error!(error = %err, "cannot open store");
            return Err(err);
        }
    };

    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "store opened"
    );
    Ok(pool)
}

pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, DbErr> {
    establish_connection_with_config(&DbConfig::from(cfg)).await
}

async fn create_table<E>(db: &DbPool, schema: &Schema, entity: E) -> Result<(), DbErr>
where
    E: EntityTrait,
{
    let backend = db.get_database_backend();

    let mut table = schema.create_table_from_entity(entity);
    table.if_not_exists();
    db.execute(backend.build(&table)).await?;

    for mut index in schema.create_index_from_entity(entity) {
        index.if_not_exists();
        db.execute(backend.build(&index)).await?;
    }

    debug!(table = entity.table_name(), "table ensured");
    Ok(())
}

/// Creates every table that does not exist yet, parents before children.
pub async fn create_schema(db: &DbPool) -> Result<(), DbErr> {
    let schema = Schema::new(db.get_database_backend());

    create_table(db, &schema, laboratory::Entity).await?;
    create_table(db, &schema, storage::Entity).await?;
    create_table(db, &schema, section::Entity).await?;
    create_table(db, &schema, item::Entity).await?;
    create_table(db, &schema, movement::Entity).await?;
    create_table(db, &schema, user::Entity).await?;

    info!("schema ready");
    Ok(())
}

/// Round-trips a ping through the pool.
pub async fn check_connection(pool: &DbPool) -> Result<(), DbErr> {
    let started = Instant::now();
    pool.ping().await.map_err(|err| {
        counter!("labstock_db.connection_failures", 1);
        error!(error = %err, "store ping failed");
        err
    })?;
    debug!(elapsed = ?started.elapsed(), "store ping ok");
    Ok(())
}
