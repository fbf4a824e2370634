//! Collection service
//!
//! Orchestrates the migration engine and the schema registry: the table is
//! migrated first, then the definition is persisted and cached.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::error::{Result, VaultError};
use crate::migration::{MigrationEngine, SyncReport};
use crate::registry::SchemaRegistry;
use crate::schema::Collection;
use crate::types::CollectionType;

pub struct CollectionService {
    registry: Arc<SchemaRegistry>,
    migration: Arc<MigrationEngine>,
}

impl CollectionService {
    pub fn new(registry: Arc<SchemaRegistry>, migration: Arc<MigrationEngine>) -> Self {
        Self {
            registry,
            migration,
        }
    }

    /// Bootstrap, migrate and persist the system collections
    ///
    /// The metadata collection is migrated but never stored in itself.
    #[instrument(skip(self))]
    pub async fn init_system(&self) -> Result<()> {
        let metadata_table = self.registry.metadata_table().to_string();

        for collection in self.registry.bootstrap_system_collections() {
            self.migration.sync_collection(&collection).await?;
            if collection.name != metadata_table {
                self.registry
                    .save_collection(Collection::clone(&collection))
                    .await?;
            }
        }

        info!(collections = self.registry.len(), "system collections ready");
        Ok(())
    }

    pub fn list_collections(&self) -> Vec<Arc<Collection>> {
        self.registry.get_collections()
    }

    pub fn get_collection(&self, name: &str) -> Result<Arc<Collection>> {
        self.registry
            .get_collection(name)
            .ok_or_else(|| VaultError::collection_not_found(name))
    }

    /// Create or evolve a collection: migrate its table, then save it
    #[instrument(skip(self, collection), fields(collection = %collection.name))]
    pub async fn create_collection(
        &self,
        collection: Collection,
    ) -> Result<(Arc<Collection>, SyncReport)> {
        let report = self.migration.sync_collection(&collection).await?;
        let saved = self.registry.save_collection(collection).await?;
        info!(
            created_table = report.created_table,
            added_columns = ?report.added_columns,
            "collection saved"
        );
        Ok((saved, report))
    }

    /// Drop a collection's table and metadata; system collections are refused
    #[instrument(skip(self))]
    pub async fn delete_collection(&self, name: &str) -> Result<()> {
        let collection = self.get_collection(name)?;
        if collection.collection_type == CollectionType::System {
            return Err(VaultError::forbidden(format!(
                "System collection '{}' cannot be deleted",
                name
            )));
        }

        self.migration.drop_collection(name).await?;
        self.registry.remove_collection(name);
        info!(collection = name, "collection deleted");
        Ok(())
    }
}
