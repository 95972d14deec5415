use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::coordinator::intent::{DatabaseBranch, QueryIntent};
use crate::coordinator::CoordinatorError;
use crate::db::{ConnectionManager, QueryExecutor};
use crate::grid;

pub const NO_QUERY_GENERATED: &str = "No query generated";

/// Outcome of one branch's query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub database_id: String,
    pub database_name: String,
    pub executed_query: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub raw_result_grid: String,
    pub row_count: usize,
    pub elapsed_ms: u64,
}

impl ExecutionResult {
    fn failed(branch: &DatabaseBranch, message: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            database_id: branch.database_id.clone(),
            database_name: branch.database_name.clone(),
            executed_query: branch.generated_query.clone().unwrap_or_default(),
            success: false,
            error_message: Some(message.into()),
            raw_result_grid: String::new(),
            row_count: 0,
            elapsed_ms,
        }
    }
}

/// All branch outcomes of one question, in branch order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateResult {
    pub success: bool,
    pub branch_results: Vec<ExecutionResult>,
    pub errors: Vec<String>,
    pub elapsed_ms: u64,
}

impl AggregateResult {
    pub fn result(&self, database_id: &str) -> Option<&ExecutionResult> {
        self.branch_results
            .iter()
            .find(|r| r.database_id.eq_ignore_ascii_case(database_id))
    }

    pub fn successful(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.branch_results.iter().filter(|r| r.success)
    }
}

/// Runs every drafted branch concurrently. Failures stay inside their
/// branch's result; only cancellation aborts the whole run.
pub struct ExecutionEngine {
    connections: Arc<dyn ConnectionManager>,
    executor: Arc<dyn QueryExecutor>,
    default_max_rows: usize,
}

impl ExecutionEngine {
    pub fn new(
        connections: Arc<dyn ConnectionManager>,
        executor: Arc<dyn QueryExecutor>,
        default_max_rows: usize,
    ) -> Self {
        Self {
            connections,
            executor,
            default_max_rows,
        }
    }

    #[instrument(skip_all, fields(branches = intent.branches.len()))]
    pub async fn execute(
        &self,
        intent: &QueryIntent,
        cancel: &CancellationToken,
    ) -> Result<AggregateResult, CoordinatorError> {
        if cancel.is_cancelled() {
            return Err(CoordinatorError::Cancelled);
        }
        let start_time = Instant::now();

        let mut handles = Vec::with_capacity(intent.branches.len());
        for branch in &intent.branches {
            let Some(sql) = branch.generated_query.clone() else {
                debug!("Branch {} has no query, not executing", branch.database_id);
                handles.push((branch, None));
                continue;
            };

            let connections = Arc::clone(&self.connections);
            let executor = Arc::clone(&self.executor);
            let default_max_rows = self.default_max_rows;
            let task_branch = branch.clone();
            let task_cancel = cancel.clone();

            let handle = tokio::spawn(async move {
                run_branch(
                    connections,
                    executor,
                    task_branch,
                    sql,
                    default_max_rows,
                    task_cancel,
                )
                .await
            });
            handles.push((branch, Some(handle)));
        }

        let mut branch_results = Vec::with_capacity(handles.len());
        for (branch, handle) in handles {
            let result = match handle {
                None => ExecutionResult::failed(branch, NO_QUERY_GENERATED, 0),
                Some(handle) => match handle.await {
                    Ok(result) => result,
                    Err(e) => ExecutionResult::failed(
                        branch,
                        format!("Execution task failed: {}", e),
                        start_time.elapsed().as_millis() as u64,
                    ),
                },
            };
            branch_results.push(result);
        }

        if cancel.is_cancelled() {
            return Err(CoordinatorError::Cancelled);
        }

        let errors: Vec<String> = branch_results
            .iter()
            .filter(|r| !r.success)
            .map(|r| {
                format!(
                    "Database {}: {}",
                    r.database_id,
                    r.error_message.as_deref().unwrap_or("Unknown error")
                )
            })
            .collect();

        let aggregate = AggregateResult {
            success: branch_results.iter().all(|r| r.success),
            branch_results,
            errors,
            elapsed_ms: start_time.elapsed().as_millis() as u64,
        };
        info!(
            "Executed {} branches ({} failed) in {}ms",
            aggregate.branch_results.len(),
            aggregate.errors.len(),
            aggregate.elapsed_ms
        );
        Ok(aggregate)
    }
}

async fn run_branch(
    connections: Arc<dyn ConnectionManager>,
    executor: Arc<dyn QueryExecutor>,
    branch: DatabaseBranch,
    sql: String,
    default_max_rows: usize,
    cancel: CancellationToken,
) -> ExecutionResult {
    let start_time = Instant::now();
    let elapsed = |start: Instant| start.elapsed().as_millis() as u64;

    let Some(connection) = connections.get_connection(&branch.database_id).await else {
        warn!("No connection available for database {}", branch.database_id);
        return ExecutionResult::failed(
            &branch,
            format!("No connection available for database {}", branch.database_id),
            elapsed(start_time),
        );
    };

    let max_rows = if connection.max_rows_per_query > 0 {
        connection.max_rows_per_query
    } else {
        default_max_rows
    };

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return ExecutionResult::failed(&branch, "Query cancelled", elapsed(start_time));
        }
        outcome = executor.execute_query(&connection.connection_string, &sql, connection.dialect, max_rows) => outcome,
    };

    match outcome {
        Ok(raw_result_grid) => {
            let row_count = grid::row_count(&raw_result_grid);
            debug!("{} returned {} rows", branch.database_id, row_count);
            ExecutionResult {
                database_id: branch.database_id,
                database_name: branch.database_name,
                executed_query: sql,
                success: true,
                error_message: None,
                raw_result_grid,
                row_count,
                elapsed_ms: elapsed(start_time),
            }
        }
        Err(e) => {
            warn!("Query on {} failed: {}", branch.database_id, e);
            ExecutionResult::failed(&branch, e.to_string(), elapsed(start_time))
        }
    }
}
