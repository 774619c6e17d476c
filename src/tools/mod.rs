//! Tool registry - server-side tools the model may call
//!
//! Providers are registered once at startup; every tool name they advertise
//! maps to that provider. Lookups never fail: an unknown name or a provider
//! error resolves to an empty result.

pub mod theme;

use crate::llm::ToolDefinition;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use theme::ThemeProvider;

/// Unified interface for tool providers
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;

    /// Returns the list of tools this provider offers
    fn tools(&self) -> Vec<ToolDefinition>;

    /// Execute a tool and return its result content
    async fn execute(&self, tool_name: &str, arguments: &str) -> Result<String>;
}

/// Registry mapping tool names to their providers
#[derive(Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolProvider>>,
    definitions: Vec<ToolDefinition>,
}

impl ToolRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under every tool name it advertises
    pub fn register(&mut self, provider: Arc<dyn ToolProvider>) {
        for definition in provider.tools() {
            info!(
                provider = provider.name(),
                tool = %definition.name,
                "Registered tool"
            );
            if self
                .handlers
                .insert(definition.name.clone(), Arc::clone(&provider))
                .is_some()
            {
                warn!(tool = %definition.name, "Tool name registered twice, last one wins");
                self.definitions.retain(|d| d.name != definition.name);
            }
            self.definitions.push(definition);
        }
    }

    /// Definitions of all registered tools, in registration order
    #[must_use]
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    /// Whether no tools are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Run a tool by name.
    ///
    /// Unknown tools and failing providers yield an empty string.
    pub async fn invoke(&self, tool_name: &str, arguments: &str) -> String {
        let Some(provider) = self.handlers.get(tool_name) else {
            warn!(tool = tool_name, "No provider found for tool");
            return String::new();
        };

        debug!(tool = tool_name, provider = provider.name(), "Executing tool");
        match provider.execute(tool_name, arguments).await {
            Ok(content) => content,
            Err(e) => {
                warn!(tool = tool_name, error = %e, "Tool execution failed");
                String::new()
            }
        }
    }
}
