//! Moderation gate in front of the completion service

use crate::llm::{LlmError, ModerationService};
use std::sync::Arc;
use tracing::debug;

/// Classifies prompts before they reach the model
#[derive(Clone)]
pub struct ModerationGate {
    service: Arc<dyn ModerationService>,
}

impl ModerationGate {
    /// Wrap a moderation service
    #[must_use]
    pub fn new(service: Arc<dyn ModerationService>) -> Self {
        Self { service }
    }

    /// Whether `text` is flagged.
    ///
    /// Blank text is never flagged and never reaches the service.
    ///
    /// # Errors
    ///
    /// Propagates the service error; the caller decides the policy.
    pub async fn classify(&self, text: &str) -> Result<bool, LlmError> {
        if text.trim().is_empty() {
            return Ok(false);
        }
        let flagged = self.service.is_flagged(text).await?;
        debug!(flagged, "Moderation verdict");
        Ok(flagged)
    }
}
