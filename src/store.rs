//! Vault - main entry point of the collection engine
//!
//! Opens the SQLite pool described by a [`StoreConfig`], wires the registry,
//! migration engine, repository and services together, and bootstraps the
//! system collections.

use std::str::FromStr;
use std::sync::Arc;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use tokio::sync::broadcast;
use tracing::info;

use crate::config::StoreConfig;
use crate::error::{Result, VaultError};
use crate::hooks::HookRegistry;
use crate::migration::MigrationEngine;
use crate::realtime::{Broadcaster, Hub, Message};
use crate::registry::SchemaRegistry;
use crate::repository::Repository;
use crate::service::{CollectionService, RecordService};

/// Collection engine over one SQLite database
///
/// Collection definitions live in the metadata table (default:
/// `_collections`); record data lives in one table per collection.
pub struct Vault {
    pool: SqlitePool,
    config: StoreConfig,
    registry: Arc<SchemaRegistry>,
    migration: Arc<MigrationEngine>,
    repository: Arc<Repository>,
    collections: CollectionService,
    records: RecordService,
    hub: Arc<Hub>,
}

impl Vault {
    /// Open the database and bootstrap with no hooks
    pub async fn open(config: StoreConfig) -> Result<Self> {
        Self::open_with_hooks(config, HookRegistry::new()).await
    }

    /// Open the database and bootstrap with the given hooks
    ///
    /// This will:
    /// 1. Connect to the database (WAL, busy timeout, foreign keys on)
    /// 2. Create and register the system collections
    /// 3. Load every stored collection definition
    pub async fn open_with_hooks(config: StoreConfig, hooks: HookRegistry) -> Result<Self> {
        let pool = connect(&config).await?;
        Self::from_pool(pool, config, hooks).await
    }

    /// Build a vault on an existing pool
    pub async fn from_pool(pool: SqlitePool, config: StoreConfig, hooks: HookRegistry) -> Result<Self> {
        let registry = Arc::new(SchemaRegistry::new(pool.clone(), &config.metadata_table));
        let migration = Arc::new(MigrationEngine::new(pool.clone(), &config.metadata_table));
        let repository = Arc::new(
            Repository::new(Arc::clone(&registry)).with_default_per_page(config.default_per_page),
        );
        let hub = Arc::new(Hub::default());

        let collections = CollectionService::new(Arc::clone(&registry), Arc::clone(&migration));
        let records = RecordService::new(
            Arc::clone(&repository),
            hooks,
            Some(Arc::clone(&hub) as Arc<dyn Broadcaster>),
        );

        collections.init_system().await?;
        let loaded = registry.load_from_db().await?;
        info!(loaded, metadata_table = %config.metadata_table, "vault ready");

        Ok(Self {
            pool,
            config,
            registry,
            migration,
            repository,
            collections,
            records,
            hub,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn migration(&self) -> &Arc<MigrationEngine> {
        &self.migration
    }

    pub fn repository(&self) -> &Arc<Repository> {
        &self.repository
    }

    pub fn collections(&self) -> &CollectionService {
        &self.collections
    }

    pub fn records(&self) -> &RecordService {
        &self.records
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Receive every record change made through [`Vault::records`]
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.hub.subscribe()
    }

    /// Drop cached statements and close the pool
    pub async fn close(&self) {
        self.records.close().await;
        self.pool.close().await;
    }
}

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// Open a pool with the pragmas the engine relies on
pub async fn connect(config: &StoreConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.database_url)
        .map_err(|e| VaultError::Connection(format!("Invalid database URL: {}", e)))?
        .create_if_missing(config.create_if_missing)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(config.busy_timeout)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true);

    let mut pool_options = SqlitePoolOptions::new().max_connections(config.max_connections);
    if is_in_memory(&config.database_url) {
        // An in-memory database lives only as long as its connection
        pool_options = pool_options.idle_timeout(None).max_lifetime(None);
    }

    pool_options
        .connect_with(options)
        .await
        .map_err(|e| VaultError::Connection(format!("Database connection failed: {}", e)))
}
