pub mod db_pool;
pub mod executor;
pub mod multi_db_pool;
pub mod schema_manager;

use crate::schema::Dialect;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    DuckDb(#[from] duckdb::Error),
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Arrow conversion error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("Result formatting error: {0}")]
    Grid(#[from] csv::Error),
    #[error("No query executor registered for dialect {0}")]
    UnsupportedDialect(Dialect),
    #[error("Database task failed: {0}")]
    Task(String),
}

/// Where and how to run queries for one database.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    pub connection_string: String,
    pub dialect: Dialect,
    /// Zero means "use the coordinator default".
    pub max_rows_per_query: usize,
}

#[async_trait]
pub trait ConnectionManager: Send + Sync {
    async fn get_connection(&self, database_id: &str) -> Option<ConnectionInfo>;
}

/// Runs one statement and returns the tab-delimited grid (see [`crate::grid`]).
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute_query(
        &self,
        connection_string: &str,
        sql: &str,
        dialect: Dialect,
        max_rows: usize,
    ) -> Result<String, DbError>;
}
