use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::coordinator::execution::AggregateResult;
use crate::coordinator::{generate, CoordinatorError};
use crate::llm::TextGenerator;
use crate::prompt::PromptLibrary;

pub const RAW_DATA_SOURCE: &str = "Raw data (AI generation failed)";

#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub answer: String,
    pub sources: Vec<String>,
}

/// Turns merged data into prose. Without a usable model reply the merged
/// text itself becomes the answer.
pub struct AnswerSynthesizer {
    oracle: Arc<dyn TextGenerator>,
    prompts: Arc<PromptLibrary>,
}

impl AnswerSynthesizer {
    pub fn new(oracle: Arc<dyn TextGenerator>, prompts: Arc<PromptLibrary>) -> Self {
        Self { oracle, prompts }
    }

    pub async fn synthesize(
        &self,
        question: &str,
        merged_data: &str,
        aggregate: &AggregateResult,
        cancel: &CancellationToken,
    ) -> Result<Synthesis, CoordinatorError> {
        let sources: Vec<String> = aggregate
            .successful()
            .map(|r| format!("{} ({})", r.database_name, r.database_id))
            .collect();

        if sources.is_empty() {
            let mut answer = "No data could be retrieved for this question.".to_string();
            for error in &aggregate.errors {
                answer.push_str(&format!("\n{}", error));
            }
            return Ok(Synthesis {
                answer,
                sources,
            });
        }

        let raw = |sources: Vec<String>| Synthesis {
            answer: merged_data.to_string(),
            sources: std::iter::once(RAW_DATA_SOURCE.to_string())
                .chain(sources)
                .collect(),
        };

        let prompt = match self.prompts.answer(question, merged_data) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!("Failed to render answer prompt: {}", e);
                return Ok(raw(sources));
            }
        };

        match generate(self.oracle.as_ref(), &prompt, cancel).await? {
            Ok(answer) if !answer.trim().is_empty() => Ok(Synthesis {
                answer: answer.trim().to_string(),
                sources,
            }),
            Ok(_) => {
                warn!("Answer synthesis returned nothing, answering with raw data");
                Ok(raw(sources))
            }
            Err(e) => {
                warn!("Answer synthesis failed ({:?}): {}", e.kind(), e);
                Ok(raw(sources))
            }
        }
    }
}
