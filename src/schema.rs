use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// SQL dialect family of a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    SqlServer,
    PostgreSql,
    MySql,
    Sqlite,
    DuckDb,
}

impl Dialect {
    /// SQL Server pages with `SELECT TOP n`, everything else with `LIMIT n`.
    pub fn uses_top(&self) -> bool {
        matches!(self, Dialect::SqlServer)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Dialect::SqlServer => "SQL Server",
            Dialect::PostgreSql => "PostgreSQL",
            Dialect::MySql => "MySQL",
            Dialect::Sqlite => "SQLite",
            Dialect::DuckDb => "DuckDB",
        }
    }

    pub fn row_limited_select(&self, table: &str, rows: usize) -> String {
        if self.uses_top() {
            format!("SELECT TOP {} * FROM {}", rows, table)
        } else {
            format!("SELECT * FROM {} LIMIT {}", table, rows)
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlserver" | "sql_server" | "mssql" => Ok(Dialect::SqlServer),
            "postgres" | "postgresql" => Ok(Dialect::PostgreSql),
            "mysql" => Ok(Dialect::MySql),
            "sqlite" => Ok(Dialect::Sqlite),
            "duckdb" => Ok(Dialect::DuckDb),
            other => Err(format!("Unknown SQL dialect: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub column_name: String,
    pub data_type: String,
}

impl ColumnSchema {
    pub fn new(column_name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A declared foreign key, used as a hint for intent resolution only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    pub column_name: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_name: String,
    pub row_count_estimate: u64,
    pub columns: Vec<ColumnSchema>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyRef>,
    #[serde(default)]
    pub sample_rows: String,
}

impl TableSchema {
    pub fn new(table_name: impl Into<String>, columns: Vec<ColumnSchema>) -> Self {
        Self {
            table_name: table_name.into(),
            row_count_estimate: 0,
            columns,
            foreign_keys: Vec::new(),
            sample_rows: String::new(),
        }
    }

    /// Case-insensitive column lookup returning the schema's casing.
    pub fn find_column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns
            .iter()
            .find(|c| c.column_name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.find_column(name).is_some()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.column_name.as_str())
    }
}

/// Read-only description of one database at query time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub database_id: String,
    pub database_name: String,
    pub dialect: Dialect,
    pub tables: Vec<TableSchema>,
}

impl SchemaSnapshot {
    pub fn find_table(&self, name: &str) -> Option<&TableSchema> {
        self.tables
            .iter()
            .find(|t| t.table_name.eq_ignore_ascii_case(name))
    }

    /// True when `name` is this database's id or display name.
    pub fn is_named(&self, name: &str) -> bool {
        self.database_id.eq_ignore_ascii_case(name) || self.database_name.eq_ignore_ascii_case(name)
    }
}

/// Finds the snapshot for a database id, accepting the display name as well.
pub fn find_snapshot<'a>(schemas: &'a [SchemaSnapshot], database: &str) -> Option<&'a SchemaSnapshot> {
    schemas
        .iter()
        .find(|s| s.database_id.eq_ignore_ascii_case(database))
        .or_else(|| schemas.iter().find(|s| s.database_name.eq_ignore_ascii_case(database)))
}

/// Supplier of schema snapshots.
#[async_trait]
pub trait SchemaCatalog: Send + Sync {
    async fn get_all_schemas(&self) -> Vec<SchemaSnapshot>;

    async fn get_schema(&self, database_id: &str) -> Option<SchemaSnapshot>;
}

/// Fixed set of snapshots, handy for embedding and tests.
pub struct StaticCatalog {
    schemas: Vec<SchemaSnapshot>,
}

impl StaticCatalog {
    pub fn new(schemas: Vec<SchemaSnapshot>) -> Self {
        Self { schemas }
    }
}

#[async_trait]
impl SchemaCatalog for StaticCatalog {
    async fn get_all_schemas(&self) -> Vec<SchemaSnapshot> {
        self.schemas.clone()
    }

    async fn get_schema(&self, database_id: &str) -> Option<SchemaSnapshot> {
        find_snapshot(&self.schemas, database_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> SchemaSnapshot {
        SchemaSnapshot {
            database_id: "sales".to_string(),
            database_name: "SalesDB".to_string(),
            dialect: Dialect::SqlServer,
            tables: vec![TableSchema::new(
                "Orders",
                vec![
                    ColumnSchema::new("OrderID", "int"),
                    ColumnSchema::new("CustomerID", "int"),
                ],
            )],
        }
    }

    #[test]
    fn lookups_are_case_insensitive_and_keep_schema_casing() {
        let snap = snapshot();
        let table = snap.find_table("orders").unwrap();
        assert_eq!(table.table_name, "Orders");
        assert_eq!(table.find_column("customerid").unwrap().column_name, "CustomerID");
        assert!(!table.has_column("Total"));
    }

    #[test]
    fn parses_dialect_aliases() {
        assert_eq!("MSSQL".parse::<Dialect>().unwrap(), Dialect::SqlServer);
        assert_eq!("postgres".parse::<Dialect>().unwrap(), Dialect::PostgreSql);
        assert!("oracle".parse::<Dialect>().is_err());
    }

    #[test]
    fn row_limited_select_follows_dialect_family() {
        assert_eq!(
            Dialect::SqlServer.row_limited_select("Orders", 100),
            "SELECT TOP 100 * FROM Orders"
        );
        assert_eq!(
            Dialect::MySql.row_limited_select("Orders", 100),
            "SELECT * FROM Orders LIMIT 100"
        );
    }

    #[tokio::test]
    async fn static_catalog_resolves_by_id_or_name() {
        let catalog = StaticCatalog::new(vec![snapshot()]);
        assert!(catalog.get_schema("SALES").await.is_some());
        assert!(catalog.get_schema("salesdb").await.is_some());
        assert!(catalog.get_schema("hr").await.is_none());
    }
}
