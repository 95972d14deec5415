use async_trait::async_trait;
use duckdb::Connection;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::db::db_pool::DuckDbPools;
use crate::db::executor::query_to_grid;
use crate::db::multi_db_pool::{MultiDbConnectionManager, RegisteredDatabase};
use crate::db::DbError;
use crate::schema::{ColumnSchema, Dialect, ForeignKeyRef, SchemaCatalog, SchemaSnapshot, TableSchema};

const SAMPLE_ROWS: usize = 3;

static FOREIGN_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)FOREIGN\s+KEY\s*\(\s*"?([^")]+?)"?\s*\)\s*REFERENCES\s+"?([^"(\s]+)"?\s*\(\s*"?([^")]+?)"?\s*\)"#)
        .expect("foreign key pattern is valid")
});

/// Caches schema snapshots of every registered database.
pub struct SchemaManager {
    conn_manager: Arc<MultiDbConnectionManager>,
    pools: Arc<DuckDbPools>,
    schema_cache: RwLock<Vec<SchemaSnapshot>>,
    last_refresh: RwLock<Option<chrono::DateTime<chrono::Utc>>>,
}

impl SchemaManager {
    pub fn new(conn_manager: Arc<MultiDbConnectionManager>, pools: Arc<DuckDbPools>) -> Self {
        Self {
            conn_manager,
            pools,
            schema_cache: RwLock::new(Vec::new()),
            last_refresh: RwLock::new(None),
        }
    }

    pub async fn last_refresh(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        *self.last_refresh.read().await
    }

    /// Re-reads every database. A database that cannot be introspected is
    /// logged and left out of the catalog.
    pub async fn refresh_cache(&self) -> Result<usize, DbError> {
        info!("Refreshing schema cache");
        self.conn_manager.discover_subject_dbs();

        let mut snapshots = Vec::new();
        for database in self.conn_manager.databases() {
            if database.dialect != Dialect::DuckDb {
                warn!(
                    "Skipping schema introspection for {} ({} is not introspectable here)",
                    database.id, database.dialect
                );
                continue;
            }

            let pool = self.pools.get(&database.connection_string)?;
            let db = database.clone();
            let result = tokio::task::spawn_blocking(move || -> Result<SchemaSnapshot, DbError> {
                let conn = pool.get()?;
                introspect_duckdb(&conn, &db)
            })
            .await
            .map_err(|e| DbError::Task(e.to_string()))?;

            match result {
                Ok(snapshot) => {
                    info!(
                        "Found {} tables in database {}",
                        snapshot.tables.len(),
                        snapshot.database_id
                    );
                    snapshots.push(snapshot);
                }
                Err(e) => error!("Failed to introspect database {}: {}", database.id, e),
            }
        }

        let count = snapshots.len();
        *self.schema_cache.write().await = snapshots;
        *self.last_refresh.write().await = Some(chrono::Utc::now());

        info!("Schema cache refreshed successfully");
        Ok(count)
    }
}

#[async_trait]
impl SchemaCatalog for SchemaManager {
    async fn get_all_schemas(&self) -> Vec<SchemaSnapshot> {
        self.schema_cache.read().await.clone()
    }

    async fn get_schema(&self, database_id: &str) -> Option<SchemaSnapshot> {
        let cache = self.schema_cache.read().await;
        crate::schema::find_snapshot(&cache, database_id).cloned()
    }
}

fn introspect_duckdb(conn: &Connection, database: &RegisteredDatabase) -> Result<SchemaSnapshot, DbError> {
    let mut tables_stmt = conn.prepare(
        "SELECT table_name FROM information_schema.tables \
         WHERE table_schema = 'main' AND table_type = 'BASE TABLE' ORDER BY table_name",
    )?;
    let table_names: Vec<String> = tables_stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .filter_map(Result::ok)
        .collect();

    let mut tables = Vec::with_capacity(table_names.len());
    for table_name in table_names {
        debug!("Describing {}.{}", database.id, table_name);

        let mut columns_stmt = conn.prepare(
            "SELECT column_name, data_type FROM information_schema.columns \
             WHERE table_schema = 'main' AND table_name = ? ORDER BY ordinal_position",
        )?;
        let columns: Vec<ColumnSchema> = columns_stmt
            .query_map([&table_name], |row| {
                Ok(ColumnSchema::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .filter_map(Result::ok)
            .collect();

        let row_count_estimate = conn
            .query_row(
                "SELECT estimated_size FROM duckdb_tables() WHERE schema_name = 'main' AND table_name = ?",
                [&table_name],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n.max(0) as u64)
            .unwrap_or(0);

        let mut fk_stmt = conn.prepare(
            "SELECT constraint_text FROM duckdb_constraints() \
             WHERE table_name = ? AND constraint_type = 'FOREIGN KEY'",
        )?;
        let foreign_keys: Vec<ForeignKeyRef> = fk_stmt
            .query_map([&table_name], |row| row.get::<_, String>(0))?
            .filter_map(Result::ok)
            .filter_map(|text| parse_foreign_key(&text))
            .collect();

        let sample_sql = format!("SELECT * FROM \"{}\" LIMIT {}", table_name, SAMPLE_ROWS);
        let sample_rows = query_to_grid(conn, &sample_sql, SAMPLE_ROWS).unwrap_or_else(|e| {
            debug!("Could not sample {}: {}", table_name, e);
            String::new()
        });

        tables.push(TableSchema {
            table_name,
            row_count_estimate,
            columns,
            foreign_keys,
            sample_rows,
        });
    }

    Ok(SchemaSnapshot {
        database_id: database.id.clone(),
        database_name: database.name.clone(),
        dialect: database.dialect,
        tables,
    })
}

/// Parses DuckDB's `FOREIGN KEY (col) REFERENCES other(col)` constraint text.
fn parse_foreign_key(text: &str) -> Option<ForeignKeyRef> {
    let caps = FOREIGN_KEY_RE.captures(text)?;
    Some(ForeignKeyRef {
        column_name: caps[1].trim().to_string(),
        referenced_table: caps[2].trim().to_string(),
        referenced_column: caps[3].trim().to_string(),
    })
}
