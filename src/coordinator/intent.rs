use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;
use crate::coordinator::{generate, CoordinatorError};
use crate::llm::TextGenerator;
use crate::prompt::PromptLibrary;
use crate::schema::SchemaSnapshot;

/// One database's share of a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseBranch {
    pub database_id: String,
    pub database_name: String,
    pub required_tables: Vec<String>,
    pub purpose: String,
    pub priority: u32,
    /// Set once a draft passes validation; `None` keeps the branch out of
    /// execution.
    pub generated_query: Option<String>,
}

impl DatabaseBranch {
    pub fn new(
        database_id: impl Into<String>,
        database_name: impl Into<String>,
        required_tables: Vec<String>,
        purpose: impl Into<String>,
        priority: u32,
    ) -> Self {
        Self {
            database_id: database_id.into(),
            database_name: database_name.into(),
            required_tables,
            purpose: purpose.into(),
            priority,
            generated_query: None,
        }
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.required_tables
            .iter()
            .any(|t| t.eq_ignore_ascii_case(table))
    }
}

/// What the question needs, and from which databases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryIntent {
    pub original_query: String,
    pub understanding: String,
    pub confidence: f64,
    pub requires_cross_database_join: bool,
    pub reasoning: String,
    pub branches: Vec<DatabaseBranch>,
}

pub const FALLBACK_CONFIDENCE: f64 = 0.3;

impl QueryIntent {
    /// Intent used when nothing is known: no databases, zero confidence.
    pub fn empty(query: &str) -> Self {
        Self {
            original_query: query.to_string(),
            understanding: String::new(),
            confidence: 0.0,
            requires_cross_database_join: false,
            reasoning: "No database schemas are available".to_string(),
            branches: Vec::new(),
        }
    }

    /// Broad scan over every known database, used when intent analysis fails.
    pub fn fallback(query: &str, schemas: &[SchemaSnapshot], max_tables: usize) -> Self {
        let branches: Vec<DatabaseBranch> = schemas
            .iter()
            .filter(|s| !s.tables.is_empty())
            .map(|s| {
                DatabaseBranch::new(
                    &s.database_id,
                    &s.database_name,
                    s.tables
                        .iter()
                        .take(max_tables)
                        .map(|t| t.table_name.clone())
                        .collect(),
                    format!("Broad scan of {}", s.database_name),
                    1,
                )
            })
            .collect();

        Self {
            original_query: query.to_string(),
            understanding: query.to_string(),
            confidence: FALLBACK_CONFIDENCE,
            requires_cross_database_join: branches.len() > 1,
            reasoning: "Intent analysis unavailable; querying all databases".to_string(),
            branches,
        }
    }

    pub fn branch(&self, database_id: &str) -> Option<&DatabaseBranch> {
        self.branches
            .iter()
            .find(|b| b.database_id.eq_ignore_ascii_case(database_id))
    }
}

/// The JSON object the intent prompt asks the model for.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntentResponse {
    #[serde(default)]
    understanding: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    requires_cross_database_join: bool,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    databases: Vec<BranchResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BranchResponse {
    #[serde(default)]
    database_id: String,
    #[serde(default)]
    database_name: String,
    #[serde(default)]
    required_tables: Vec<String>,
    #[serde(default)]
    purpose: String,
    #[serde(default = "default_priority")]
    priority: u32,
}

fn default_priority() -> u32 {
    1
}

/// Parses the object between the first `{` and the last `}` of a response.
fn parse_intent_response(query: &str, response: &str) -> Option<QueryIntent> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end < start {
        return None;
    }

    let parsed: IntentResponse = match serde_json::from_str(&response[start..=end]) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!("Intent response is not valid JSON: {}", e);
            return None;
        }
    };

    Some(QueryIntent {
        original_query: query.to_string(),
        understanding: parsed.understanding,
        confidence: parsed.confidence.clamp(0.0, 1.0),
        requires_cross_database_join: parsed.requires_cross_database_join,
        reasoning: parsed.reasoning,
        branches: parsed
            .databases
            .into_iter()
            .map(|b| {
                DatabaseBranch::new(
                    b.database_id,
                    b.database_name,
                    b.required_tables,
                    b.purpose,
                    b.priority,
                )
            })
            .collect(),
    })
}

/// Asks the oracle which databases and tables a question needs.
pub struct IntentResolver {
    oracle: Arc<dyn TextGenerator>,
    prompts: Arc<PromptLibrary>,
    config: CoordinatorConfig,
}

impl IntentResolver {
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

    /// Never fails on a bad model answer: anything unusable becomes the
    /// broad-scan fallback. Only cancellation is returned as an error.
    pub async fn resolve(
        &self,
        query: &str,
        schemas: &[SchemaSnapshot],
        cancel: &CancellationToken,
    ) -> Result<QueryIntent, CoordinatorError> {
        if schemas.is_empty() {
            return Ok(QueryIntent::empty(query));
        }

        let prompt = match self
            .prompts
            .intent(query, schemas, self.config.column_preview_limit)
        {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!("Failed to render intent prompt: {}", e);
                return Ok(self.fallback(query, schemas));
            }
        };

        let response = match generate(self.oracle.as_ref(), &prompt, cancel).await? {
            Ok(response) => response,
            Err(e) => {
                warn!("Intent analysis failed ({:?}): {}", e.kind(), e);
                return Ok(self.fallback(query, schemas));
            }
        };

        match parse_intent_response(query, &response) {
            Some(intent) => {
                info!(
                    "Resolved intent with {} branches (confidence {:.2})",
                    intent.branches.len(),
                    intent.confidence
                );
                Ok(intent)
            }
            None => {
                warn!("Could not parse intent response, falling back to a broad scan");
                Ok(self.fallback(query, schemas))
            }
        }
    }

    pub fn fallback(&self, query: &str, schemas: &[SchemaSnapshot]) -> QueryIntent {
        QueryIntent::fallback(query, schemas, self.config.fallback_max_tables)
    }
}
