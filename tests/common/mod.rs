//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use polyquery::db::{ConnectionInfo, ConnectionManager, DbError, QueryExecutor};
use polyquery::llm::{LlmError, TextGenerator};
use polyquery::schema::{ColumnSchema, Dialect, SchemaSnapshot, TableSchema};
use std::collections::HashMap;
use std::sync::Mutex;

type Reply = Box<dyn Fn(&str) -> Result<String, LlmError> + Send + Sync>;

/// Answers each prompt with the first rule whose marker the prompt contains.
/// Prompts matching no rule fail with a connection error.
#[derive(Default)]
pub struct RoutingOracle {
    rules: Vec<(String, Reply)>,
    pub prompts: Mutex<Vec<String>>,
}

impl RoutingOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(
        mut self,
        marker: &str,
        reply: impl Fn(&str) -> Result<String, LlmError> + Send + Sync + 'static,
    ) -> Self {
        self.rules.push((marker.to_string(), Box::new(reply)));
        self
    }

    pub fn reply(self, marker: &str, text: &'static str) -> Self {
        self.on(marker, move |_| Ok(text.to_string()))
    }

    pub fn prompts_containing(&self, marker: &str) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains(marker))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TextGenerator for RoutingOracle {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.rules
            .iter()
            .find(|(marker, _)| prompt.contains(marker.as_str()))
            .map(|(_, reply)| reply(prompt))
            .unwrap_or_else(|| Err(LlmError::ConnectionError("no route for prompt".to_string())))
    }
}

pub const INTENT_PROMPT: &str = "You are routing a question";
pub const ANSWER_PROMPT: &str = "Answer the question using only the data below.";

pub fn draft_prompt(database_name: &str) -> String {
    format!("database \"{}\"", database_name)
}

/// Every database id maps to a DuckDB connection string equal to the id.
pub struct EchoConnections;

#[async_trait]
impl ConnectionManager for EchoConnections {
    async fn get_connection(&self, database_id: &str) -> Option<ConnectionInfo> {
        Some(ConnectionInfo {
            connection_string: database_id.to_string(),
            dialect: Dialect::DuckDb,
            max_rows_per_query: 0,
        })
    }
}

/// Returns a fixed grid per connection string; unknown ones fail.
#[derive(Default)]
pub struct CannedExecutor {
    grids: HashMap<String, String>,
    pub executed: Mutex<Vec<(String, String)>>,
}

impl CannedExecutor {
    pub fn with(mut self, connection: &str, grid: &str) -> Self {
        self.grids.insert(connection.to_string(), grid.to_string());
        self
    }
}

#[async_trait]
impl QueryExecutor for CannedExecutor {
    async fn execute_query(
        &self,
        connection_string: &str,
        sql: &str,
        _dialect: Dialect,
        _max_rows: usize,
    ) -> Result<String, DbError> {
        self.executed
            .lock()
            .unwrap()
            .push((connection_string.to_string(), sql.to_string()));
        self.grids
            .get(connection_string)
            .cloned()
            .ok_or_else(|| DbError::Task(format!("{} is offline", connection_string)))
    }
}

pub fn table(name: &str, columns: &[&str]) -> TableSchema {
    TableSchema::new(
        name,
        columns
            .iter()
            .map(|c| ColumnSchema::new(*c, "INTEGER"))
            .collect(),
    )
}

/// `sales` holds Orders and `crm` holds Customers; both are DuckDB.
pub fn shop_schemas() -> Vec<SchemaSnapshot> {
    vec![
        SchemaSnapshot {
            database_id: "sales".to_string(),
            database_name: "SalesDB".to_string(),
            dialect: Dialect::DuckDb,
            tables: vec![table("Orders", &["OrderID", "CustomerID", "Total"])],
        },
        SchemaSnapshot {
            database_id: "crm".to_string(),
            database_name: "CrmDB".to_string(),
            dialect: Dialect::DuckDb,
            tables: vec![table("Customers", &["CustomerID", "Name"])],
        },
    ]
}
