pub mod rules;
pub mod safety;

use serde::Serialize;
use tracing::{info, warn};

use crate::ingest::schema::TableSchema;
use crate::llm::prompt::build_prompt;
use crate::llm::LlmManager;

/// Where the SQL for a request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QuerySource {
    #[serde(rename = "llm")]
    Llm,
    #[serde(rename = "rule-based")]
    RuleBased,
}

/// SQL ready for execution. Either validated model output or rule-engine
/// output; `fallback_reason` is set when the model path was abandoned.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedQuery {
    pub sql: String,
    pub source: QuerySource,
    pub fallback_reason: Option<String>,
}

impl ResolvedQuery {
    pub fn rule_based(question: &str, schema: &TableSchema) -> Self {
        Self {
            sql: rules::resolve(question, schema),
            source: QuerySource::RuleBased,
            fallback_reason: None,
        }
    }

    pub fn confidence(&self) -> f64 {
        match self.source {
            QuerySource::Llm => 0.95,
            QuerySource::RuleBased => 0.90,
        }
    }
}

/// Model-first resolver with the rule engine as the guaranteed fallback.
pub struct QueryResolver {
    llm: LlmManager,
}

impl QueryResolver {
    pub fn new(llm: LlmManager) -> Self {
        Self { llm }
    }

    /// Never fails: any provider error or unsafe output turns into a
    /// rule-based answer carrying the reason.
    pub async fn resolve(&self, question: &str, schema: &TableSchema) -> ResolvedQuery {
        let columns = schema.column_names();
        let prompt = build_prompt(question, schema);

        let reason = match self.llm.generate(&prompt).await {
            Ok(generation) => match safety::validate(&generation.text, &columns) {
                Ok(()) => {
                    info!("Using SQL from provider '{}': {}", generation.provider, generation.text);
                    return ResolvedQuery {
                        sql: generation.text,
                        source: QuerySource::Llm,
                        fallback_reason: None,
                    };
                }
                Err(rejection) => {
                    warn!(
                        "Rejected SQL from provider '{}' ({}): {}",
                        generation.provider, rejection, generation.text
                    );
                    format!("unsafe SQL from {}: {}", generation.provider, rejection)
                }
            },
            Err(e) => e.to_string(),
        };

        info!("Falling back to rule-based resolution: {}", reason);
        ResolvedQuery {
            fallback_reason: Some(reason),
            ..ResolvedQuery::rule_based(question, schema)
        }
    }
}
