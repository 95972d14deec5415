use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;
use crate::coordinator::intent::{DatabaseBranch, QueryIntent};
use crate::coordinator::sql_extract::{check_completeness, extract_sql};
use crate::coordinator::sql_validator::SqlValidator;
use crate::coordinator::{generate, CoordinatorError};
use crate::llm::TextGenerator;
use crate::prompt::{PromptLibrary, RetryRequest};
use crate::schema::{find_snapshot, SchemaSnapshot, TableSchema};

/// How hard an attempt's prompt constrains the model. Each failed attempt
/// moves one step down the list; a failure in `Simplified` ends drafting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftPhase {
    /// The full drafting prompt.
    Initial,
    /// Restates the errors of the previous attempt.
    Stricter,
    /// Restates every error so far plus a numbered column list.
    UltraStrict,
    /// Asks for a plain row-limited `SELECT *` of the first table.
    Simplified,
}

impl DraftPhase {
    pub fn next(self) -> Option<Self> {
        match self {
            DraftPhase::Initial => Some(DraftPhase::Stricter),
            DraftPhase::Stricter => Some(DraftPhase::UltraStrict),
            DraftPhase::UltraStrict => Some(DraftPhase::Simplified),
            DraftPhase::Simplified => None,
        }
    }
}

/// Drafts and validates SQL for each branch of an intent.
pub struct SqlDrafter {
    oracle: Arc<dyn TextGenerator>,
    prompts: Arc<PromptLibrary>,
    config: CoordinatorConfig,
}

impl SqlDrafter {
    pub fn new(
        oracle: Arc<dyn TextGenerator>,
        prompts: Arc<PromptLibrary>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            oracle,
            prompts,
            config,
        }
    }

    /// Drafts every branch concurrently; branch order is preserved.
    pub async fn draft_all(
        &self,
        question: &str,
        intent: QueryIntent,
        schemas: &[SchemaSnapshot],
        cancel: &CancellationToken,
    ) -> Result<QueryIntent, CoordinatorError> {
        let drafts = join_all(intent.branches.iter().cloned().map(|branch| async move {
            match find_snapshot(schemas, &branch.database_id) {
                Some(schema) => self.draft(question, branch, schema, schemas, cancel).await,
                None => Ok(DatabaseBranch {
                    generated_query: None,
                    ..branch
                }),
            }
        }))
        .await;

        let branches = drafts.into_iter().collect::<Result<Vec<_>, _>>()?;
        Ok(QueryIntent { branches, ..intent })
    }

    /// Runs the four-attempt loop for one branch. The returned branch has
    /// `generated_query` set only if some attempt passed validation.
    pub async fn draft(
        &self,
        question: &str,
        branch: DatabaseBranch,
        schema: &SchemaSnapshot,
        all_schemas: &[SchemaSnapshot],
        cancel: &CancellationToken,
    ) -> Result<DatabaseBranch, CoordinatorError> {
        let tables: Vec<&TableSchema> = branch
            .required_tables
            .iter()
            .filter_map(|t| schema.find_table(t))
            .collect();
        let Some(first_table) = tables.first() else {
            warn!("Branch {} has no known tables to query", branch.database_id);
            return Ok(DatabaseBranch {
                generated_query: None,
                ..branch
            });
        };

        let validator = SqlValidator::new(schema, all_schemas);
        let simplified_sql = schema
            .dialect
            .row_limited_select(&first_table.table_name, self.config.simplified_row_limit);

        let mut all_errors: Vec<String> = Vec::new();
        let mut fresh_errors: Vec<String> = Vec::new();
        let mut previous_sql = String::new();
        let mut phase = Some(DraftPhase::Initial);

        while let Some(current) = phase {
            phase = current.next();

            // Until some draft comes back there is nothing to correct
            let nothing_drafted = previous_sql.is_empty() && current != DraftPhase::Simplified;
            let rendered = match current {
                DraftPhase::Initial => {
                    self.prompts
                        .sql_draft(question, &branch, &tables, schema.dialect)
                }
                _ if nothing_drafted => {
                    debug!("No draft to correct yet, resending the initial prompt in {:?} phase", current);
                    self.prompts
                        .sql_draft(question, &branch, &tables, schema.dialect)
                }
                _ => {
                    let errors = match current {
                        DraftPhase::Stricter => &fresh_errors,
                        _ => &all_errors,
                    };
                    self.prompts.sql_retry(&RetryRequest {
                        question,
                        branch: &branch,
                        tables: &tables,
                        dialect: schema.dialect,
                        phase: current,
                        previous_sql: &previous_sql,
                        errors,
                        simplified_sql: &simplified_sql,
                    })
                }
            };
            let prompt = match rendered {
                Ok(prompt) => prompt,
                Err(e) => {
                    warn!("Failed to render {:?} prompt: {}", current, e);
                    continue;
                }
            };

            let response = match generate(self.oracle.as_ref(), &prompt, cancel).await? {
                Ok(response) => response,
                Err(e) => {
                    warn!(
                        "Drafting for {} failed in {:?} phase ({:?}): {}",
                        branch.database_id,
                        current,
                        e.kind(),
                        e
                    );
                    continue;
                }
            };

            let sql = extract_sql(&response, schema.dialect);
            debug!("{:?} draft for {}: {}", current, branch.database_id, sql);

            let errors = match check_completeness(&sql, schema.dialect) {
                Err(incomplete) => vec![incomplete],
                Ok(()) => match validator.validate(&sql) {
                    Ok(()) => {
                        info!("Validated SQL for {} in {:?} phase", branch.database_id, current);
                        return Ok(DatabaseBranch {
                            generated_query: Some(sql),
                            ..branch
                        });
                    }
                    Err(errors) => errors,
                },
            };

            warn!(
                "Rejected {:?} draft for {}: {}",
                current,
                branch.database_id,
                errors.join("; ")
            );
            for error in &errors {
                if !all_errors.contains(error) {
                    all_errors.push(error.clone());
                }
            }
            fresh_errors = errors;
            previous_sql = sql;
        }

        warn!(
            "No valid SQL for {} after every attempt, excluding it from execution",
            branch.database_id
        );
        Ok(DatabaseBranch {
            generated_query: None,
            ..branch
        })
    }
}
