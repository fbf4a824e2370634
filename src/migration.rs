//! Schema migration engine
//!
//! Reconciles a declared [`Collection`] with the table that stores it. Each
//! sync runs in one transaction: the table is created when missing, missing
//! columns are added, and indexes are created. Columns are never dropped or
//! retyped. Dropping the transaction on any error rolls back every step.

use std::collections::HashSet;

use sqlx::SqlitePool;
use tracing::{debug, instrument};

use crate::error::{Result, VaultError};
use crate::schema::Collection;
use crate::sql::ddl::DdlGenerator;
use crate::sql::sanitize::{quote_identifier, validate_identifier};

/// System timestamp columns and the legacy columns they are back-filled from
const TIMESTAMP_COLUMNS: [(&str, &str); 2] = [("created", "created_at"), ("updated", "updated_at")];

/// What a sync changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// The table did not exist and was created
    pub created_table: bool,
    /// Columns added to an existing table, in order
    pub added_columns: Vec<String>,
}

impl SyncReport {
    /// True when the database already matched the collection
    pub fn is_noop(&self) -> bool {
        !self.created_table && self.added_columns.is_empty()
    }
}

/// Applies collection definitions to the database
pub struct MigrationEngine {
    pool: SqlitePool,
    metadata_table: String,
}

impl MigrationEngine {
    pub fn new(pool: SqlitePool, metadata_table: impl Into<String>) -> Self {
        Self {
            pool,
            metadata_table: metadata_table.into(),
        }
    }

    /// Make the table for `collection` match its declaration
    #[instrument(skip(self, collection), fields(collection = %collection.name))]
    pub async fn sync_collection(&self, collection: &Collection) -> Result<SyncReport> {
        collection.validate()?;

        let table = collection.name.as_str();
        let ddl = DdlGenerator::for_collection(collection);
        let mut report = SyncReport::default();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| VaultError::migration("begin transaction", table, e))?;

        let existing: Option<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ? COLLATE NOCASE",
        )
        .bind(table)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| VaultError::migration("inspect table", table, e))?;

        if existing.is_none() {
            let sql = ddl.generate_create_table(&collection.fields);
            debug!(%sql, "creating table");
            sqlx::query(&sql)
                .execute(&mut *tx)
                .await
                .map_err(|e| VaultError::migration("create table", table, e))?;
            report.created_table = true;
        } else {
            let columns: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info(?)")
                .bind(table)
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| VaultError::migration("inspect columns", table, e))?;
            // SQLite column names are case-insensitive
            let columns: HashSet<String> =
                columns.into_iter().map(|c| c.to_ascii_lowercase()).collect();

            for field in &collection.fields {
                if columns.contains(&field.name.to_ascii_lowercase()) {
                    continue;
                }
                let sql = ddl.generate_add_column(field);
                debug!(%sql, column = %field.name, "adding column");
                sqlx::query(&sql).execute(&mut *tx).await.map_err(|e| {
                    VaultError::migration("add column", format!("{}.{}", table, field.name), e)
                })?;
                report.added_columns.push(field.name.clone());
            }

            for (column, legacy) in TIMESTAMP_COLUMNS {
                if columns.contains(column) {
                    continue;
                }
                let target = format!("{}.{}", table, column);

                let add = ddl.generate_add_raw_column(column, "TEXT");
                sqlx::query(&add)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| VaultError::migration("add column", target.clone(), e))?;

                if columns.contains(legacy) {
                    debug!(column, legacy, "back-filling timestamps from legacy column");
                    let backfill = ddl.generate_backfill_from(column, legacy);
                    sqlx::query(&backfill)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| VaultError::migration("backfill column", target.clone(), e))?;
                }

                let fill = ddl.generate_fill_now(column);
                sqlx::query(&fill)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| VaultError::migration("backfill column", target, e))?;
                report.added_columns.push(column.to_string());
            }
        }

        for columns in collection.index_columns() {
            let index = ddl.index_name(&columns);
            let owner: Option<String> = sqlx::query_scalar(
                "SELECT tbl_name FROM sqlite_master WHERE type = 'index' AND name = ? COLLATE NOCASE",
            )
            .bind(&index)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| VaultError::migration("inspect index", index.clone(), e))?;
            // The index name must not belong to another table
            if let Some(owner) = owner.filter(|t| !t.eq_ignore_ascii_case(table)) {
                return Err(VaultError::invalid_identifier(format!(
                    "Index name '{}' for '{}' is already used by table '{}'",
                    index, table, owner
                )));
            }

            let sql = ddl.generate_create_index(&columns);
            sqlx::query(&sql)
                .execute(&mut *tx)
                .await
                .map_err(|e| VaultError::migration("create index", ddl.index_name(&columns), e))?;
        }

        tx.commit()
            .await
            .map_err(|e| VaultError::migration("commit", table, e))?;

        debug!(
            created_table = report.created_table,
            added_columns = report.added_columns.len(),
            "collection synced"
        );
        Ok(report)
    }

    /// Drop the table for `name` and delete its metadata row
    #[instrument(skip(self))]
    pub async fn drop_collection(&self, name: &str) -> Result<()> {
        validate_identifier(name, &[]).map_err(VaultError::InvalidIdentifier)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| VaultError::migration("begin transaction", name, e))?;

        let drop = DdlGenerator::new(name).generate_drop_table();
        sqlx::query(&drop)
            .execute(&mut *tx)
            .await
            .map_err(|e| VaultError::migration("drop table", name, e))?;

        let delete = format!(
            "DELETE FROM {} WHERE \"name\" = ?",
            quote_identifier(&self.metadata_table)
        );
        sqlx::query(&delete)
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(|e| VaultError::migration("delete metadata", name, e))?;

        tx.commit()
            .await
            .map_err(|e| VaultError::migration("commit", name, e))?;
        Ok(())
    }
}
