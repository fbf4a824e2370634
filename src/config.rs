//! Configuration for the collection engine
//!
//! Provides a builder pattern for configuring the SQLite-backed vault.

use std::time::Duration;

/// Default name of the table that stores collection definitions
pub const DEFAULT_METADATA_TABLE: &str = "_collections";

/// Default page size for list operations
pub const DEFAULT_PER_PAGE: i64 = 30;

/// Configuration for the vault
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// SQLite database URL or file path (e.g. `sqlite://data.db`, `sqlite::memory:`)
    pub database_url: String,
    /// Name of the metadata table (default: "_collections")
    pub metadata_table: String,
    /// Maximum pool size (default: 1, single writer)
    pub max_connections: u32,
    /// How long a connection waits on a locked database (default: 5s)
    pub busy_timeout: Duration,
    /// Whether to create the database file when absent (default: true)
    pub create_if_missing: bool,
    /// Page size used when a list request asks for `per_page <= 0` (default: 30)
    pub default_per_page: i64,
}

impl StoreConfig {
    /// Create a new configuration builder
    pub fn builder(database_url: impl Into<String>) -> StoreConfigBuilder {
        StoreConfigBuilder::new(database_url)
    }

    /// Build configuration from `VAULT_DB_*` environment variables
    ///
    /// - `VAULT_DB_PATH` (default: `sqlite://vault.db`)
    /// - `VAULT_DB_MAX_CONNECTIONS`
    /// - `VAULT_DB_BUSY_TIMEOUT_MS`
    ///
    /// Unparseable numeric values fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let path = lookup("VAULT_DB_PATH").unwrap_or_else(|| "vault.db".to_string());
        let mut builder = StoreConfigBuilder::new(normalize_url(&path));

        if let Some(n) = lookup("VAULT_DB_MAX_CONNECTIONS").and_then(|v| v.parse::<u32>().ok()) {
            builder = builder.max_connections(n);
        }
        if let Some(ms) = lookup("VAULT_DB_BUSY_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok()) {
            builder = builder.busy_timeout(Duration::from_millis(ms));
        }

        builder.build()
    }
}

/// Accept bare file paths as well as `sqlite:` URLs
fn normalize_url(path: &str) -> String {
    if path.starts_with("sqlite:") {
        path.to_string()
    } else {
        format!("sqlite://{}", path)
    }
}

/// Builder for StoreConfig
#[derive(Debug)]
pub struct StoreConfigBuilder {
    database_url: String,
    metadata_table: String,
    max_connections: u32,
    busy_timeout: Duration,
    create_if_missing: bool,
    default_per_page: i64,
}

impl StoreConfigBuilder {
    /// Create a new builder with the database URL
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            metadata_table: DEFAULT_METADATA_TABLE.to_string(),
            max_connections: 1,
            busy_timeout: Duration::from_secs(5),
            create_if_missing: true,
            default_per_page: DEFAULT_PER_PAGE,
        }
    }

    /// Set the metadata table name (default: "_collections")
    pub fn metadata_table(mut self, name: impl Into<String>) -> Self {
        self.metadata_table = name.into();
        self
    }

    /// Set the maximum number of pooled connections (minimum 1)
    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n.max(1);
        self
    }

    /// Set the SQLite busy timeout
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Create the database file if it does not exist (default: true)
    pub fn create_if_missing(mut self, enabled: bool) -> Self {
        self.create_if_missing = enabled;
        self
    }

    /// Set the fallback page size for list operations
    pub fn default_per_page(mut self, per_page: i64) -> Self {
        if per_page > 0 {
            self.default_per_page = per_page;
        }
        self
    }

    /// Build the configuration
    pub fn build(self) -> StoreConfig {
        StoreConfig {
            database_url: self.database_url,
            metadata_table: self.metadata_table,
            max_connections: self.max_connections,
            busy_timeout: self.busy_timeout,
            create_if_missing: self.create_if_missing,
            default_per_page: self.default_per_page,
        }
    }
}
