use arrow::util::display::{ArrayFormatter, FormatOptions};
use async_trait::async_trait;
use duckdb::Connection;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::db::db_pool::DuckDbPools;
use crate::db::{DbError, QueryExecutor};
use crate::grid::write_grid;
use crate::schema::Dialect;

/// Runs `sql` on an open connection and renders at most `max_rows` rows as a
/// result grid.
pub fn query_to_grid(conn: &Connection, sql: &str, max_rows: usize) -> Result<String, DbError> {
    let mut stmt = conn.prepare(sql)?;
    let arrow_batch = stmt.query_arrow([])?;

    let schema = arrow_batch.get_schema();
    let columns = schema
        .fields()
        .iter()
        .map(|field| field.name().clone())
        .collect::<Vec<String>>();

    let options = FormatOptions::default().with_null("NULL");
    let mut rows: Vec<Vec<String>> = Vec::new();

    'batches: for batch in arrow_batch {
        let formatters = batch
            .columns()
            .iter()
            .map(|array| ArrayFormatter::try_new(array.as_ref(), &options))
            .collect::<Result<Vec<_>, _>>()?;

        for row in 0..batch.num_rows() {
            if rows.len() >= max_rows {
                break 'batches;
            }
            rows.push(formatters.iter().map(|f| f.value(row).to_string()).collect());
        }
    }

    Ok(write_grid(&columns, &rows)?)
}

/// Executes queries against DuckDB database files.
pub struct DuckDbExecutor {
    pools: Arc<DuckDbPools>,
}

impl DuckDbExecutor {
    pub fn new(pools: Arc<DuckDbPools>) -> Self {
        Self { pools }
    }
}

#[async_trait]
impl QueryExecutor for DuckDbExecutor {
    async fn execute_query(
        &self,
        connection_string: &str,
        sql: &str,
        _dialect: Dialect,
        max_rows: usize,
    ) -> Result<String, DbError> {
        let pool = self.pools.get(connection_string)?;
        let sql_to_execute = sql.to_string();

        debug!("Executing on {}: {}", connection_string, sql);

        // DuckDB calls block, keep them off the async workers. The crate has
        // no interrupt handle, so a cancelled caller leaves the query to run
        // to completion here and the grid is dropped.
        tokio::task::spawn_blocking(move || -> Result<String, DbError> {
            let start_time = Instant::now();
            let conn = pool.get()?;
            let grid = query_to_grid(&conn, &sql_to_execute, max_rows)?;
            info!(
                "DuckDB query finished in {}ms",
                start_time.elapsed().as_millis()
            );
            Ok(grid)
        })
        .await
        .map_err(|e| DbError::Task(e.to_string()))?
    }
}

/// Routes queries to the executor registered for their dialect.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<Dialect, Arc<dyn QueryExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_duckdb(pools: Arc<DuckDbPools>) -> Self {
        let mut registry = Self::new();
        registry.register(Dialect::DuckDb, Arc::new(DuckDbExecutor::new(pools)));
        registry
    }

    pub fn register(&mut self, dialect: Dialect, executor: Arc<dyn QueryExecutor>) {
        self.executors.insert(dialect, executor);
    }
}

#[async_trait]
impl QueryExecutor for ExecutorRegistry {
    async fn execute_query(
        &self,
        connection_string: &str,
        sql: &str,
        dialect: Dialect,
        max_rows: usize,
    ) -> Result<String, DbError> {
        let executor = self
            .executors
            .get(&dialect)
            .ok_or(DbError::UnsupportedDialect(dialect))?;
        executor
            .execute_query(connection_string, sql, dialect, max_rows)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_db(dir: &tempfile::TempDir) -> String {
        let path = dir.path().join("shop.duckdb");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE Customers (CustomerID INTEGER, Name VARCHAR, Notes VARCHAR);
             INSERT INTO Customers VALUES (1, 'Alice', NULL), (2, 'Bob', 'tab\there'), (3, 'Cy', 'x');",
        )
        .unwrap();
        path.to_string_lossy().to_string()
    }

    #[tokio::test]
    async fn renders_grid_with_row_cap() {
        let dir = tempfile::tempdir().unwrap();
        let path = seeded_db(&dir);
        let executor = DuckDbExecutor::new(Arc::new(DuckDbPools::default()));

        let grid = executor
            .execute_query(
                &path,
                "SELECT CustomerID, Name, Notes FROM Customers ORDER BY CustomerID",
                Dialect::DuckDb,
                2,
            )
            .await
            .unwrap();

        assert_eq!(
            grid,
            "CustomerID\tName\tNotes\n1\tAlice\tNULL\n2\tBob\ttab here\nRows extracted: 2"
        );
    }

    #[tokio::test]
    async fn surfaces_sql_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = seeded_db(&dir);
        let executor = DuckDbExecutor::new(Arc::new(DuckDbPools::default()));

        let err = executor
            .execute_query(&path, "SELECT Missing FROM Customers", Dialect::DuckDb, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::DuckDb(_)));
    }

    #[tokio::test]
    async fn registry_rejects_dialects_without_executor() {
        let registry = ExecutorRegistry::with_duckdb(Arc::new(DuckDbPools::default()));
        let err = registry
            .execute_query("Server=x", "SELECT 1", Dialect::SqlServer, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UnsupportedDialect(Dialect::SqlServer)));
    }
}
