use duckdb::Connection;
use r2d2::{ManageConnection, Pool};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use crate::db::DbError;

/// Hands out clones of a single DuckDB instance per file; opening the same
/// file twice in one process is not supported by DuckDB.
pub struct DuckDBConnectionManager {
    connection_string: String,
    base: Mutex<Option<Connection>>,
}

impl DuckDBConnectionManager {
    pub fn new(connection_string: String) -> Self {
        Self {
            connection_string,
            base: Mutex::new(None),
        }
    }
}

impl ManageConnection for DuckDBConnectionManager {
    type Connection = Connection;
    type Error = duckdb::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let mut base = self
            .base
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(conn) = base.as_ref() {
            return conn.try_clone();
        }
        let conn = Connection::open(&self.connection_string)?;
        let clone = conn.try_clone()?;
        *base = Some(conn);
        Ok(clone)
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.execute("SELECT 1", [])?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// One lazily built pool per database file.
pub struct DuckDbPools {
    pool_size: u32,
    pools: Mutex<HashMap<String, Pool<DuckDBConnectionManager>>>,
}

impl DuckDbPools {
    pub fn new(pool_size: u32) -> Self {
        Self {
            pool_size: pool_size.max(1),
            pools: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, connection_string: &str) -> Result<Pool<DuckDBConnectionManager>, DbError> {
        let mut pools = self
            .pools
            .lock()
            .map_err(|_| DbError::Task("DuckDB pool registry poisoned".to_string()))?;

        if let Some(pool) = pools.get(connection_string) {
            return Ok(pool.clone());
        }

        debug!("Creating DuckDB pool for {}", connection_string);
        // Connections are opened on first use, not at pool creation
        let pool = Pool::builder()
            .max_size(self.pool_size)
            .min_idle(Some(0))
            .build_unchecked(DuckDBConnectionManager::new(connection_string.to_string()));
        pools.insert(connection_string.to_string(), pool.clone());
        Ok(pool)
    }
}

impl Default for DuckDbPools {
    fn default() -> Self {
        Self::new(4)
    }
}
