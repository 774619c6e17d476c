//! OpenAI-compatible service client
//!
//! Uses the async-openai client in bring-your-own-types mode so requests and
//! responses go through the crate's own serde types.

use super::{ChatCompletion, ChatCompletionRequest, CompletionService, LlmError, ModerationService};
use async_openai::{config::OpenAIConfig, error::OpenAIError, Client};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ModerationResult {
    flagged: bool,
}

#[derive(Debug, Deserialize)]
struct ModerationResponse {
    #[serde(default)]
    results: Vec<ModerationResult>,
}

/// Completion and moderation client for OpenAI or a compatible endpoint
pub struct OpenAiService {
    client: Client<OpenAIConfig>,
    timeout_secs: u64,
}

impl OpenAiService {
    /// Create a new client
    ///
    /// `api_base` overrides the default `https://api.openai.com/v1`.
    #[must_use]
    pub fn new(api_key: &str, api_base: Option<&str>, timeout_secs: u64) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = api_base {
            config = config.with_api_base(base);
        }
        Self {
            client: Client::with_config(config),
            timeout_secs,
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, OpenAIError>>,
    ) -> Result<T, LlmError> {
        match tokio::time::timeout(Duration::from_secs(self.timeout_secs), call).await {
            Ok(result) => result.map_err(map_openai_error),
            Err(_) => Err(LlmError::Timeout(self.timeout_secs)),
        }
    }
}

fn map_openai_error(error: OpenAIError) -> LlmError {
    match error {
        OpenAIError::Reqwest(e) => LlmError::NetworkError(e.to_string()),
        e @ OpenAIError::JSONDeserialize(..) => LlmError::JsonError(e.to_string()),
        OpenAIError::ApiError(e) => LlmError::ApiError(e.to_string()),
        e => LlmError::Unknown(e.to_string()),
    }
}

#[async_trait]
impl CompletionService for OpenAiService {
    async fn complete(&self, request: ChatCompletionRequest) -> Result<ChatCompletion, LlmError> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending chat completion request"
        );
        let completion: ChatCompletion = self
            .bounded(self.client.chat().create_byot(request))
            .await?;
        Ok(completion)
    }
}

#[async_trait]
impl ModerationService for OpenAiService {
    async fn is_flagged(&self, input: &str) -> Result<bool, LlmError> {
        let response: ModerationResponse = self
            .bounded(self.client.moderations().create_byot(json!({ "input": input })))
            .await?;

        response
            .results
            .first()
            .map(|r| r.flagged)
            .ok_or_else(|| LlmError::ApiError("Empty moderation response".to_string()))
    }
}
