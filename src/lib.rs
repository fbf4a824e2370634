//! # vault-collections
//!
//! A dynamic collection engine on SQLite.
//!
//! Collections are declared at runtime; the engine creates and evolves their
//! tables, exposes generic CRUD over them and guards every record operation
//! with a per-collection access rule.
//!
//! ## Features
//!
//! - **Schema Registry**: In-memory catalog of collections persisted to a metadata table
//! - **Additive Migrations**: Tables and columns are created, never dropped or retyped
//! - **Generic Repository**: Pagination, single-comparison filters, sorting and batched relation expansion
//! - **Rule Language**: Expressions such as `@request.auth.id != '' && owner = @request.auth.id`
//! - **Hooks and Realtime**: Before/after hooks per collection and a non-blocking change feed
//! - **SQL Injection Prevention**: Identifiers are validated and quoted, values are always bound
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vault_collections::{Collection, EvaluationContext, Field, FieldType, ListParams, StoreConfig, Vault};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let vault = Vault::open(StoreConfig::builder("sqlite://vault.db").build()).await?;
//!
//!     vault
//!         .collections()
//!         .create_collection(
//!             Collection::new("tasks")
//!                 .with_field(Field::new("title", FieldType::Text).required())
//!                 .with_field(Field::new("done", FieldType::Bool)),
//!         )
//!         .await?;
//!
//!     let admin = EvaluationContext::admin();
//!     let mut data = serde_json::Map::new();
//!     data.insert("title".into(), "write docs".into());
//!     let task = vault.records().create_record("tasks", data, &admin).await?;
//!
//!     let page = vault
//!         .records()
//!         .list_records("tasks", &ListParams::new().filter("done = false"), &admin)
//!         .await?;
//!     println!("{} open tasks, newest {}", page.total_items, task.id);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use std::time::Duration;
//! use vault_collections::StoreConfig;
//!
//! let config = StoreConfig::builder("sqlite://vault.db")
//!     .metadata_table("_collections")          // Default metadata table name
//!     .max_connections(1)                      // Single writer (default)
//!     .busy_timeout(Duration::from_secs(5))    // Wait on a locked database
//!     .default_per_page(30)                    // Page size when none is given
//!     .build();
//! ```
//!
//! `StoreConfig::from_env()` reads `VAULT_DB_PATH`, `VAULT_DB_MAX_CONNECTIONS`
//! and `VAULT_DB_BUSY_TIMEOUT_MS`.
//!
//! ## Logging
//!
//! The crate emits `tracing` events and never installs a subscriber.

pub mod config;
pub mod error;
pub mod hooks;
pub mod migration;
pub mod realtime;
pub mod record;
pub mod registry;
pub mod repository;
pub mod rules;
pub mod schema;
pub mod service;
pub mod sql;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use config::{StoreConfig, StoreConfigBuilder};
pub use error::{Result, VaultError};
pub use hooks::{HookFn, HookPhase, HookRegistry};
pub use migration::{MigrationEngine, SyncReport};
pub use realtime::{Broadcaster, ChangeAction, Hub, Message};
pub use record::{ListParams, Record, RecordList};
pub use registry::SchemaRegistry;
pub use repository::Repository;
pub use rules::{EvaluationContext, authorize, evaluate};
pub use schema::{Collection, RuleAction};
pub use service::{CollectionService, RecordService};
pub use store::Vault;
pub use types::{CollectionType, Field, FieldType};

// Re-export SQL utilities for advanced users
pub use sql::ddl::DdlGenerator;
pub use sql::sanitize::{quote_identifier, validate_identifier};
