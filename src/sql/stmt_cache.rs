//! Prepared statement cache keyed by SQL text

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqlitePool, SqliteRow, SqliteStatement};
use sqlx::{Executor, Statement};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::sql::builder::SqlValue;

/// Shared cache of prepared statements plus an execution counter
pub struct StatementCache {
    pool: SqlitePool,
    statements: RwLock<HashMap<String, Arc<SqliteStatement<'static>>>>,
    executed: AtomicU64,
}

impl StatementCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            statements: RwLock::new(HashMap::new()),
            executed: AtomicU64::new(0),
        }
    }

    /// Return the cached statement for `sql`, preparing it on first use
    pub async fn prepare(&self, sql: &str) -> Result<Arc<SqliteStatement<'static>>> {
        if let Some(stmt) = self.statements.read().await.get(sql) {
            return Ok(Arc::clone(stmt));
        }

        let mut statements = self.statements.write().await;
        if let Some(stmt) = statements.get(sql) {
            return Ok(Arc::clone(stmt));
        }

        tracing::debug!(sql, "preparing statement");
        let prepared = (&self.pool).prepare(sql).await?;
        let stmt = Arc::new(Statement::to_owned(&prepared));
        statements.insert(sql.to_string(), Arc::clone(&stmt));
        Ok(stmt)
    }

    pub async fn fetch_all(&self, sql: &str, args: &[SqlValue]) -> Result<Vec<SqliteRow>> {
        let stmt = self.prepare(sql).await?;
        self.executed.fetch_add(1, Ordering::Relaxed);
        Ok(bind_all(stmt.query(), args).fetch_all(&self.pool).await?)
    }

    pub async fn fetch_optional(&self, sql: &str, args: &[SqlValue]) -> Result<Option<SqliteRow>> {
        let stmt = self.prepare(sql).await?;
        self.executed.fetch_add(1, Ordering::Relaxed);
        Ok(bind_all(stmt.query(), args)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Execute and return the number of affected rows
    pub async fn execute(&self, sql: &str, args: &[SqlValue]) -> Result<u64> {
        let stmt = self.prepare(sql).await?;
        self.executed.fetch_add(1, Ordering::Relaxed);
        let result = bind_all(stmt.query(), args).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Number of statements executed through this cache
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    pub async fn len(&self) -> usize {
        self.statements.read().await.len()
    }

    /// Release every cached statement
    pub async fn close(&self) {
        self.statements.write().await.clear();
    }
}

/// Bind each value in order
pub fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    args: &[SqlValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for arg in args {
        query = match arg {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Integer(i) => query.bind(*i),
            SqlValue::Real(f) => query.bind(*f),
            SqlValue::Text(s) => query.bind(s.clone()),
            SqlValue::Bool(b) => query.bind(*b),
        };
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .expect("Should open in-memory database")
    }

    #[tokio::test]
    async fn test_prepare_is_cached_by_text() {
        let cache = StatementCache::new(memory_pool().await);

        let a = cache.prepare("SELECT 1").await.unwrap();
        let b = cache.prepare("SELECT 1").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len().await, 1);

        cache.prepare("SELECT 2").await.unwrap();
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_close_clears() {
        let cache = StatementCache::new(memory_pool().await);
        cache.prepare("SELECT 1").await.unwrap();
        cache.close().await;
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_sql_is_not_cached() {
        let cache = StatementCache::new(memory_pool().await);
        assert!(cache.prepare("SELEC nonsense").await.is_err());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_binds_and_counts() {
        let cache = StatementCache::new(memory_pool().await);
        cache
            .execute("CREATE TABLE t (a TEXT, b INTEGER, c REAL)", &[])
            .await
            .unwrap();
        let affected = cache
            .execute(
                "INSERT INTO t (a, b, c) VALUES (?, ?, ?)",
                &[SqlValue::from("x"), SqlValue::Bool(true), SqlValue::Real(1.5)],
            )
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let rows = cache
            .fetch_all("SELECT a, b, c FROM t WHERE b = ?", &[SqlValue::Integer(1)])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get::<String, _>("a"), "x");
        assert_eq!(rows[0].get::<f64, _>("c"), 1.5);
        assert_eq!(cache.executed(), 3);
    }
}
