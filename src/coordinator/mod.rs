//! The multi-database query coordinator.
//!
//! A question flows through a fixed pipeline, each stage taking the previous
//! stage's output by value: resolve intent, validate it against the catalog,
//! draft SQL per database, execute branches in parallel, merge the grids and
//! write an answer. Failures inside a stage shrink the result instead of
//! ending the request; only an empty catalog or cancellation escape.

pub mod drafter;
pub mod execution;
pub mod intent;
pub mod intent_validator;
pub mod merger;
pub mod sql_extract;
pub mod sql_lexer;
pub mod sql_validator;
pub mod synthesizer;

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::CoordinatorConfig;
use crate::db::{ConnectionManager, QueryExecutor};
use crate::llm::{LlmError, TextGenerator};
use crate::prompt::PromptLibrary;
use crate::schema::SchemaCatalog;

use drafter::SqlDrafter;
use execution::{AggregateResult, ExecutionEngine};
use intent::{IntentResolver, QueryIntent};
use intent_validator::validate_intent;
use merger::merge_results;
use synthesizer::AnswerSynthesizer;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("No database schemas are available")]
    NoSchemas,
    #[error("Request was cancelled")]
    Cancelled,
}

/// Everything known about one answered question.
#[derive(Debug, Clone, Serialize)]
pub struct QueryAnswer {
    pub question: String,
    pub answer: String,
    pub sources: Vec<String>,
    pub intent: QueryIntent,
    pub execution: AggregateResult,
    pub merged_data: String,
    pub elapsed_ms: u64,
}

/// Races an oracle call against cancellation. The outer error is
/// cancellation; the inner one is the oracle's own failure.
pub(crate) async fn generate(
    oracle: &dyn TextGenerator,
    prompt: &str,
    cancel: &CancellationToken,
) -> Result<Result<String, LlmError>, CoordinatorError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CoordinatorError::Cancelled),
        result = oracle.generate(prompt) => Ok(result),
    }
}

pub struct Coordinator {
    catalog: Arc<dyn SchemaCatalog>,
    resolver: IntentResolver,
    drafter: SqlDrafter,
    engine: ExecutionEngine,
    synthesizer: AnswerSynthesizer,
}

impl Coordinator {
    pub fn new(
        catalog: Arc<dyn SchemaCatalog>,
        oracle: Arc<dyn TextGenerator>,
        connections: Arc<dyn ConnectionManager>,
        executor: Arc<dyn QueryExecutor>,
        config: CoordinatorConfig,
    ) -> Result<Self, minijinja::Error> {
        let prompts = Arc::new(PromptLibrary::new()?);

        Ok(Self {
            catalog,
            resolver: IntentResolver::new(Arc::clone(&oracle), Arc::clone(&prompts), config.clone()),
            drafter: SqlDrafter::new(Arc::clone(&oracle), Arc::clone(&prompts), config.clone()),
            engine: ExecutionEngine::new(connections, executor, config.default_max_rows),
            synthesizer: AnswerSynthesizer::new(oracle, prompts),
        })
    }

    #[instrument(skip(self, cancel))]
    pub async fn ask(
        &self,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<QueryAnswer, CoordinatorError> {
        let start_time = Instant::now();

        let schemas = self.catalog.get_all_schemas().await;
        if schemas.is_empty() {
            warn!("No schemas available, cannot answer");
            return Err(CoordinatorError::NoSchemas);
        }

        let resolved = self.resolver.resolve(question, &schemas, cancel).await?;
        let mut intent = validate_intent(resolved, &schemas);
        if intent.branches.is_empty() {
            warn!("No usable branches after validation, falling back to a broad scan");
            intent = validate_intent(self.resolver.fallback(question, &schemas), &schemas);
        }
        info!(
            "Querying {} databases: {}",
            intent.branches.len(),
            intent
                .branches
                .iter()
                .map(|b| b.database_id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let intent = self.drafter.draft_all(question, intent, &schemas, cancel).await?;
        let execution = self.engine.execute(&intent, cancel).await?;
        let merged = merge_results(&execution);
        let synthesis = self
            .synthesizer
            .synthesize(question, &merged.text, &execution, cancel)
            .await?;

        let elapsed_ms = start_time.elapsed().as_millis() as u64;
        info!("Answered in {}ms", elapsed_ms);

        Ok(QueryAnswer {
            question: question.to_string(),
            answer: synthesis.answer,
            sources: synthesis.sources,
            intent,
            execution,
            merged_data: merged.text,
            elapsed_ms,
        })
    }
}
