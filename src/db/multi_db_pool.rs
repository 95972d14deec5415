use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::db::{ConnectionInfo, ConnectionManager};
use crate::schema::Dialect;

/// A database the coordinator may query.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredDatabase {
    pub id: String,
    pub name: String,
    pub connection_string: String,
    pub dialect: Dialect,
    pub max_rows_per_query: usize,
}

/// Registry of configured and discovered databases.
pub struct MultiDbConnectionManager {
    data_dir: PathBuf,
    databases: RwLock<BTreeMap<String, RegisteredDatabase>>,
}

impl MultiDbConnectionManager {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            databases: RwLock::new(BTreeMap::new()),
        }
    }

    /// Builds the registry from `[[databases]]` entries, then scans the data
    /// directory for `<name>/<name>.duckdb` files not already configured.
    pub fn from_config(data_dir: PathBuf, configured: &[DatabaseConfig]) -> Self {
        let manager = Self::new(data_dir);

        for db in configured {
            let dialect = match db.dialect.parse::<Dialect>() {
                Ok(dialect) => dialect,
                Err(e) => {
                    warn!("Skipping database {}: {}", db.id, e);
                    continue;
                }
            };
            manager.register(RegisteredDatabase {
                id: db.id.clone(),
                name: db.name.clone(),
                connection_string: db.path.clone(),
                dialect,
                max_rows_per_query: db.max_rows_per_query.unwrap_or(0),
            });
        }

        let discovered = manager.discover_subject_dbs();
        info!(
            "Registered {} configured and {} discovered databases",
            configured.len(),
            discovered
        );
        manager
    }

    pub fn register(&self, database: RegisteredDatabase) {
        let mut dbs = self
            .databases
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        debug!(
            "Registered database: {} ({}) at {}",
            database.id, database.dialect, database.connection_string
        );
        dbs.insert(database.id.to_lowercase(), database);
    }

    pub fn databases(&self) -> Vec<RegisteredDatabase> {
        let dbs = self
            .databases
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        dbs.values().cloned().collect()
    }

    pub fn get(&self, database_id: &str) -> Option<RegisteredDatabase> {
        let dbs = self
            .databases
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        dbs.get(&database_id.to_lowercase()).cloned()
    }

    /// Path of a subject database inside the data directory.
    pub fn get_subject_db_path(&self, subject: &str) -> PathBuf {
        self.data_dir.join(subject).join(format!("{}.duckdb", subject))
    }

    /// Registers every `<data_dir>/<name>/<name>.duckdb`; returns how many
    /// new databases were found.
    pub fn discover_subject_dbs(&self) -> usize {
        let entries = match std::fs::read_dir(&self.data_dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Data directory {} not readable: {}", self.data_dir.display(), e);
                return 0;
            }
        };

        let mut found = 0;
        for entry in entries.filter_map(Result::ok) {
            if !entry.path().is_dir() {
                continue;
            }
            let Some(subject) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let db_path = self.get_subject_db_path(&subject);
            if !db_path.exists() || self.get(&subject).is_some() {
                continue;
            }
            self.register(RegisteredDatabase {
                id: subject.clone(),
                name: subject,
                connection_string: path_string(&db_path),
                dialect: Dialect::DuckDb,
                max_rows_per_query: 0,
            });
            found += 1;
        }
        found
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

#[async_trait]
impl ConnectionManager for MultiDbConnectionManager {
    async fn get_connection(&self, database_id: &str) -> Option<ConnectionInfo> {
        self.get(database_id).map(|db| ConnectionInfo {
            connection_string: db.connection_string,
            dialect: db.dialect,
            max_rows_per_query: db.max_rows_per_query,
        })
    }
}
