//! "Theme of the day" tool
//!
//! Fetches today's theme from an external daily feed. The tool never fails:
//! any network, status or parse problem degrades to `{"theme": null}`.

use super::ToolProvider;
use crate::config::THEME_CACHE_TTL_SECS;
use crate::llm::ToolDefinition;
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use moka::future::Cache;
use reqwest::{Client as HttpClient, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// Name the model uses to call this tool
pub const TOOL_NAME: &str = "get_today_theme";

/// Provider for the daily theme feed
pub struct ThemeProvider {
    http: HttpClient,
    url_template: String,
    json_pointer: String,
    timezone: Tz,
    /// date -> theme; only successful lookups are cached
    cache: Cache<String, Value>,
}

impl ThemeProvider {
    /// Create a provider for `url_template`, where `{date}` is replaced by
    /// today's date (`YYYY-MM-DD`) in `timezone`.
    #[must_use]
    pub fn new(http: HttpClient, url_template: &str, json_pointer: &str, timezone: Tz) -> Self {
        Self {
            http,
            url_template: url_template.to_string(),
            json_pointer: json_pointer.to_string(),
            timezone,
            cache: Cache::builder()
                .max_capacity(16)
                .time_to_live(Duration::from_secs(THEME_CACHE_TTL_SECS))
                .build(),
        }
    }

    /// Calendar date of `now` in the feed's timezone
    #[must_use]
    pub fn date_key(&self, now: DateTime<Utc>) -> String {
        now.with_timezone(&self.timezone)
            .format("%Y-%m-%d")
            .to_string()
    }

    /// Theme for a date, or `None` if the feed has nothing usable
    pub async fn theme_for(&self, date: &str) -> Option<Value> {
        if let Some(theme) = self.cache.get(date).await {
            debug!(date, "Theme served from cache");
            return Some(theme);
        }

        match self.fetch(date).await {
            Ok(Some(theme)) => {
                self.cache.insert(date.to_string(), theme.clone()).await;
                Some(theme)
            }
            Ok(None) => {
                warn!(date, pointer = %self.json_pointer, "Theme field missing in feed");
                None
            }
            Err(e) => {
                warn!(date, error = %e, "Failed to fetch theme feed");
                None
            }
        }
    }

    async fn fetch(&self, date: &str) -> Result<Option<Value>> {
        let url = self.url_template.replace("{date}", date);
        let response = self.http.get(&url).send().await?;
        if response.status() != StatusCode::OK {
            bail!("theme feed returned {}", response.status());
        }
        let body: Value = response.json().await?;
        Ok(extract_theme(&body, &self.json_pointer))
    }
}

/// Value at `pointer` inside a feed body, ignoring JSON `null`
#[must_use]
pub fn extract_theme(body: &Value, pointer: &str) -> Option<Value> {
    body.pointer(pointer).filter(|v| !v.is_null()).cloned()
}

/// Tool result payload: `{"theme": value}` or `{"theme": null}`
#[must_use]
pub fn render_theme(theme: Option<Value>) -> String {
    json!({ "theme": theme }).to_string()
}

#[async_trait]
impl ToolProvider for ThemeProvider {
    fn name(&self) -> &'static str {
        "theme"
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: TOOL_NAME.to_string(),
            description: "Get today's theme of the day. Call this when the user asks about \
                          today's theme or topic."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }]
    }

    async fn execute(&self, _tool_name: &str, _arguments: &str) -> Result<String> {
        let date = self.date_key(Utc::now());
        Ok(render_theme(self.theme_for(&date).await))
    }
}
