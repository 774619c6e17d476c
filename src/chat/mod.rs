//! Completion engine
//!
//! Drives one request-response cycle:
//!
//! 1. reject empty input locally,
//! 2. moderate the rendered prompt (a flagged prompt is censored, not dropped),
//! 3. first completion call with tools advertised and `tool_choice = auto`,
//! 4. if the model asks for tools, run each one and append its result,
//! 5. second completion call with `tool_choice = none`,
//! 6. return the final text.
//!
//! Every failure past step 1 collapses into the profile's fallback message.
//! At most one tool round-trip happens per cycle.

pub mod moderation;

pub use moderation::ModerationGate;

use crate::config::{BotProfile, CENSORED_PLACEHOLDER, MAX_IMAGES, USER_NAME_LABEL};
use crate::llm::{
    ChatCompletion, ChatCompletionRequest, ChatMessage, CompletionService, ContentPart, LlmError,
    ModerationService, ToolChoice, ToolSpec,
};
use crate::tools::ToolRegistry;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Base64 JPEG payload ready to be sent to the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage(String);

impl EncodedImage {
    /// Wrap an already base64-encoded JPEG
    #[must_use]
    pub fn from_base64(payload: String) -> Self {
        Self(payload)
    }

    /// Raw base64 payload
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.0
    }

    /// `data:image/jpeg;base64,...` form used in image parts
    #[must_use]
    pub fn data_uri(&self) -> String {
        format!("data:image/jpeg;base64,{}", self.0)
    }
}

/// User input for one cycle; never persisted
#[derive(Debug, Clone)]
pub struct Prompt {
    user_name: String,
    text: String,
    images: Vec<EncodedImage>,
}

impl Prompt {
    /// Build a prompt; images beyond [`MAX_IMAGES`] are dropped
    #[must_use]
    pub fn new(user_name: &str, text: &str, mut images: Vec<EncodedImage>) -> Self {
        images.truncate(MAX_IMAGES);
        Self {
            user_name: user_name.to_string(),
            text: text.to_string(),
            images,
        }
    }

    /// No text and no images
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.images.is_empty()
    }

    /// Images attached to this prompt
    #[must_use]
    pub fn images(&self) -> &[EncodedImage] {
        &self.images
    }

    /// Text sent to moderation and, unless flagged, to the model
    #[must_use]
    pub fn render(&self) -> String {
        format!("{USER_NAME_LABEL}:[{}]\n{}", self.user_name, self.text)
    }

    /// Replacement text for a flagged prompt
    #[must_use]
    pub fn render_censored(&self) -> String {
        format!(
            "{USER_NAME_LABEL}:[{}]\n{CENSORED_PLACEHOLDER}",
            self.user_name
        )
    }

    fn user_message(&self, text: String) -> ChatMessage {
        let mut content = vec![ContentPart::text(text)];
        content.extend(self.images.iter().map(|i| ContentPart::image(i.data_uri())));
        ChatMessage::User { content }
    }
}

/// Why a cycle ended without a usable answer
#[derive(Debug, Error)]
pub enum FailureReason {
    /// The moderation service could not classify the prompt
    #[error("moderation failed: {0}")]
    Moderation(#[source] LlmError),
    /// A completion call failed
    #[error("completion call failed: {0}")]
    Transport(#[source] LlmError),
    /// The final response carried no text
    #[error("completion returned no text")]
    EmptyResponse,
}

/// Result of the completion state machine
#[derive(Debug)]
pub enum CompletionOutcome {
    /// Final prose answer
    Success {
        /// Reply text, never blank
        text: String,
    },
    /// The cycle failed; the user gets the fallback message
    Failure {
        /// Cause, for logs only
        reason: FailureReason,
    },
}

impl CompletionOutcome {
    fn failure(reason: FailureReason) -> Self {
        Self::Failure { reason }
    }
}

/// Orchestrates moderation, completion calls and the optional tool round-trip
pub struct ChatEngine {
    completions: Arc<dyn CompletionService>,
    moderation: ModerationGate,
    tools: Arc<ToolRegistry>,
    profile: Arc<BotProfile>,
}

impl ChatEngine {
    /// Create an engine from its collaborators
    #[must_use]
    pub fn new(
        completions: Arc<dyn CompletionService>,
        moderation: Arc<dyn ModerationService>,
        tools: Arc<ToolRegistry>,
        profile: Arc<BotProfile>,
    ) -> Self {
        Self {
            completions,
            moderation: ModerationGate::new(moderation),
            tools,
            profile,
        }
    }

    /// Reply text for a prompt.
    ///
    /// Always returns something: the model's answer, the "no prompt" message
    /// for empty input, or the fallback message on any failure.
    pub async fn chat(&self, prompt: &Prompt, restricted: bool) -> String {
        if prompt.is_empty() {
            debug!("Empty prompt, skipping completion");
            return self.profile.msg.no_prompt.clone();
        }

        match self.complete(prompt, restricted).await {
            CompletionOutcome::Success { text } => {
                info!(chars = text.chars().count(), "Completion succeeded");
                text
            }
            CompletionOutcome::Failure { reason } => {
                warn!(%reason, "Completion failed, sending fallback");
                self.profile.msg.timeout.clone()
            }
        }
    }

    /// Run the state machine for a non-empty prompt
    pub async fn complete(&self, prompt: &Prompt, restricted: bool) -> CompletionOutcome {
        let rendered = prompt.render();
        let text = match self.moderation.classify(&rendered).await {
            Ok(false) => rendered,
            Ok(true) => {
                warn!("Prompt flagged by moderation, censoring");
                prompt.render_censored()
            }
            Err(e) => return CompletionOutcome::failure(FailureReason::Moderation(e)),
        };

        let mut transcript = vec![
            ChatMessage::system(self.profile.persona(restricted)),
            prompt.user_message(text),
        ];

        let first = match self.call(&transcript, ToolChoice::Auto).await {
            Ok(completion) => completion,
            Err(e) => return CompletionOutcome::failure(FailureReason::Transport(e)),
        };

        let last = if first.wants_tools() {
            self.run_tools(&first, &mut transcript).await;
            match self.call(&transcript, ToolChoice::Disabled).await {
                Ok(completion) => completion,
                Err(e) => return CompletionOutcome::failure(FailureReason::Transport(e)),
            }
        } else {
            first
        };

        match last.text() {
            Some(text) => CompletionOutcome::Success {
                text: text.to_string(),
            },
            None => CompletionOutcome::failure(FailureReason::EmptyResponse),
        }
    }

    /// Append the assistant's tool-call turn and one result per call
    async fn run_tools(&self, completion: &ChatCompletion, transcript: &mut Vec<ChatMessage>) {
        let message = completion
            .first()
            .map(|choice| choice.message.clone())
            .unwrap_or_default();
        let calls = message.tool_calls.unwrap_or_default();
        info!(count = calls.len(), "Model requested tool calls");

        transcript.push(ChatMessage::Assistant {
            content: message.content,
            tool_calls: calls.clone(),
        });

        for call in &calls {
            let content = self
                .tools
                .invoke(&call.function.name, &call.function.arguments)
                .await;
            debug!(tool = %call.function.name, id = %call.id, "Tool result appended");
            transcript.push(ChatMessage::tool(&call.id, &content));
        }
    }

    async fn call(
        &self,
        transcript: &[ChatMessage],
        tool_choice: ToolChoice,
    ) -> Result<ChatCompletion, LlmError> {
        let tools: Vec<ToolSpec> = self
            .tools
            .definitions()
            .iter()
            .cloned()
            .map(ToolSpec::from)
            .collect();
        let tool_choice = (!tools.is_empty()).then_some(tool_choice);

        let request = ChatCompletionRequest {
            model: self.profile.model.clone(),
            messages: transcript.to_vec(),
            temperature: self.profile.temperature,
            frequency_penalty: self.profile.frequency_penalty,
            presence_penalty: self.profile.presence_penalty,
            max_tokens: self.profile.max_tokens,
            tools,
            tool_choice,
        };
        self.completions.complete(request).await
    }
}
