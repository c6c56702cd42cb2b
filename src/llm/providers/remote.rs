use crate::config::ProviderConfig;
use crate::llm::prompt::extract_sql;
use crate::llm::{LlmError, TextGenerator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// OpenAI-compatible chat completions endpoint.
pub struct RemoteLlmProvider {
    name: String,
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct PromptRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct PromptResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl RemoteLlmProvider {
    pub fn new(config: &ProviderConfig, api_key: String) -> Result<Self, LlmError> {
        if config.api_url.trim().is_empty() {
            return Err(LlmError::ConfigError(format!(
                "API URL is required for provider '{}'",
                config.name
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::ConfigError(e.to_string()))?;

        Ok(Self {
            name: config.name.clone(),
            client,
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl TextGenerator for RemoteLlmProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let request = PromptRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: "You translate questions into a single DuckDB SELECT statement.".to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: 0.1,
            max_tokens: 500,
        };

        debug!("Sending chat request to {} ({})", self.name, self.api_url);

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LlmError::ResponseError(format!(
                "API responded with status code: {}",
                response.status()
            )));
        }

        let prompt_response: PromptResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ResponseError(e.to_string()))?;

        let content = prompt_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::ResponseError("No choices in response".to_string()))?;

        debug!("Raw response from {}: {}", self.name, content);
        Ok(extract_sql(&content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;
    use crate::ingest::schema::{ColumnSchema, DataType, TableSchema};
    use crate::llm::LlmManager;
    use crate::resolve::{QueryResolver, QuerySource};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{}/v1/chat/completions", addr)
    }

    fn provider(api_url: String) -> RemoteLlmProvider {
        provider_with_timeout(api_url, 5)
    }

    fn provider_with_timeout(api_url: String, timeout_secs: u64) -> RemoteLlmProvider {
        let config = ProviderConfig {
            name: "primary".to_string(),
            kind: ProviderKind::Chat,
            api_url,
            model: "test-model".to_string(),
            api_key: None,
            api_key_env: None,
            timeout_secs,
        };
        RemoteLlmProvider::new(&config, "sk-test".to_string()).unwrap()
    }

    #[tokio::test]
    async fn test_chat_reply_is_reduced_to_sql() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers["authorization"], "Bearer sk-test");
                assert_eq!(body["model"], "test-model");
                assert_eq!(body["messages"][1]["content"], "question");
                Json(json!({
                    "choices": [{"message": {"content": "Here you go:\n```sql\nSELECT 1;\n```"}}]
                }))
            }),
        );

        let sql = provider(serve(router).await).generate("question").await.unwrap();
        assert_eq!(sql, "SELECT 1;");
    }

    #[tokio::test]
    async fn test_error_status_is_a_response_error() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::UNAUTHORIZED, "bad key") }),
        );

        let err = provider(serve(router).await).generate("question").await.unwrap_err();
        assert!(matches!(err, LlmError::ResponseError(_)), "{err}");
    }

    #[tokio::test]
    async fn test_empty_choices_is_a_response_error() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { Json(json!({"choices": []})) }),
        );

        let err = provider(serve(router).await).generate("question").await.unwrap_err();
        assert!(matches!(err, LlmError::ResponseError(_)));
    }

    fn slow_router() -> Router {
        Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Json(json!({"choices": [{"message": {"content": "SELECT 1"}}]}))
            }),
        )
    }

    #[tokio::test]
    async fn test_slow_reply_is_a_timeout() {
        let err = provider_with_timeout(serve(slow_router()).await, 1)
            .generate("question")
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Timeout(_)), "{err}");
    }

    #[tokio::test]
    async fn test_timeout_falls_back_to_rules() {
        let generator = provider_with_timeout(serve(slow_router()).await, 1);
        let resolver = QueryResolver::new(LlmManager::from_generators(vec![Box::new(generator)]));
        let schema = TableSchema {
            name: "iris".to_string(),
            columns: vec![ColumnSchema {
                name: "species".to_string(),
                data_type: DataType::String,
                nullable: true,
            }],
        };

        let resolved = resolver.resolve("how many species", &schema).await;
        assert_eq!(resolved.source, QuerySource::RuleBased);
        assert_eq!(resolved.sql, "SELECT species, COUNT(*) as count FROM iris GROUP BY species");
        let reason = resolved.fallback_reason.unwrap();
        assert!(reason.starts_with("primary: LLM request timed out"), "{reason}");
    }

    #[test]
    fn test_blank_url_is_rejected() {
        let config = ProviderConfig {
            name: "primary".to_string(),
            kind: ProviderKind::Chat,
            api_url: " ".to_string(),
            model: "m".to_string(),
            api_key: None,
            api_key_env: None,
            timeout_secs: 5,
        };
        assert!(matches!(
            RemoteLlmProvider::new(&config, "k".to_string()),
            Err(LlmError::ConfigError(_))
        ));
    }
}
