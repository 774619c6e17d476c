//! Configuration and settings management
//!
//! Process settings come from config files and environment variables; the
//! model-behaviour bundle (personas, sampling, fallback strings) comes from a
//! YAML profile.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Application settings loaded from config files and environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Discord bot token
    pub discord_token: String,

    /// API key for the completion and moderation service
    pub openai_api_key: String,
    /// Optional base URL for an OpenAI-compatible endpoint
    pub openai_api_base: Option<String>,

    /// Comma-separated channel name substrings the bot listens in (empty = all)
    #[serde(rename = "target_channel_names")]
    pub target_channel_names_str: Option<String>,

    /// Comma-separated user IDs that get the restricted persona
    #[serde(rename = "denied_users")]
    pub denied_users_str: Option<String>,

    /// Reaction added to a message that mentions the bot
    #[serde(default = "default_reaction_emoji")]
    pub reaction_emoji: String,

    /// Path to the YAML bot profile
    #[serde(default = "default_profile_path")]
    pub profile_path: String,

    /// Consecutive identical stickers needed before the bot joins in (0 disables)
    #[serde(default = "default_sticker_streak_threshold")]
    pub sticker_streak_threshold: usize,

    /// Theme feed URL template; `{date}` is replaced with today's date
    pub theme_feed_url: Option<String>,
    /// JSON pointer to the theme value inside the feed response
    #[serde(default = "default_theme_json_pointer")]
    pub theme_json_pointer: String,
    /// IANA timezone used to decide what "today" is for the theme feed
    #[serde(default = "default_theme_timezone")]
    pub theme_timezone: String,

    /// Upper bound for a single completion or moderation call
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,
    /// Timeout for plain HTTP fetches (images, theme feed)
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_reaction_emoji() -> String {
    "✔".to_string()
}

fn default_profile_path() -> String {
    "sizu_setting.yaml".to_string()
}

const fn default_sticker_streak_threshold() -> usize {
    3
}

fn default_theme_json_pointer() -> String {
    "/data/theme".to_string()
}

fn default_theme_timezone() -> String {
    "Asia/Tokyo".to_string()
}

const fn default_llm_timeout_secs() -> u64 {
    60
}

const fn default_http_timeout_secs() -> u64 {
    30
}

fn split_list(raw: Option<&str>) -> impl Iterator<Item = &str> {
    raw.unwrap_or_default()
        .split([',', ';'])
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or a required key is missing.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Not checked into git
            .add_source(File::with_name("config/local").required(false))
            // Eg.. `APP__REACTION_EMOJI=👀 ./target/sizu-bot`
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Environment::default() maps UPPER_SNAKE_CASE to snake_case
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        s.try_deserialize()
    }

    /// Channel name substrings the bot is restricted to
    #[must_use]
    pub fn target_channel_names(&self) -> Vec<String> {
        split_list(self.target_channel_names_str.as_deref())
            .map(str::to_string)
            .collect()
    }

    /// Discord user IDs that receive the restricted persona
    #[must_use]
    pub fn denied_users(&self) -> HashSet<u64> {
        split_list(self.denied_users_str.as_deref())
            .filter_map(|id| id.parse::<u64>().ok())
            .collect()
    }

    /// Whether a channel with the given name is in scope
    ///
    /// An empty target list means every channel is in scope.
    #[must_use]
    pub fn is_target_channel(&self, channel_name: &str) -> bool {
        let targets = self.target_channel_names();
        targets.is_empty()
            || targets
                .iter()
                .any(|needle| channel_name.contains(needle.as_str()))
    }
}

/// Errors raised while loading the bot profile
#[derive(Debug, Error)]
pub enum ProfileError {
    /// The profile file could not be read
    #[error("failed to read profile {path}: {source}")]
    Io {
        /// Path that was read
        path: String,
        /// Underlying IO error
        source: std::io::Error,
    },
    /// The profile file is not valid YAML for [`BotProfile`]
    #[error("failed to parse profile: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Fixed user-facing strings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProfileMessages {
    /// Reply when a mention carries neither text nor images
    pub no_prompt: String,
    /// Reply whenever moderation or a completion call fails
    pub timeout: String,
}

/// Model-behaviour bundle: personas, sampling parameters and fallback messages
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BotProfile {
    /// Model identifier sent to the completion service
    pub model: String,
    /// Normal persona
    pub system_prompt: String,
    /// Persona for users on the denylist; falls back to `system_prompt`
    #[serde(default)]
    pub restricted_system_prompt: Option<String>,
    /// Sampling temperature
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Frequency penalty
    #[serde(default)]
    pub frequency_penalty: Option<f32>,
    /// Presence penalty
    #[serde(default)]
    pub presence_penalty: Option<f32>,
    /// Maximum completion tokens
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Fallback strings
    pub msg: ProfileMessages,
}

impl BotProfile {
    /// Parse a profile from YAML text
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::Parse` if the YAML is malformed or incomplete.
    pub fn from_yaml(raw: &str) -> Result<Self, ProfileError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Load a profile from a YAML file
    ///
    /// # Errors
    ///
    /// Returns `ProfileError` if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    /// System prompt for the given denylist flag
    #[must_use]
    pub fn persona(&self, restricted: bool) -> &str {
        match (&self.restricted_system_prompt, restricted) {
            (Some(prompt), true) => prompt,
            _ => &self.system_prompt,
        }
    }
}

/// Label prefixed to every user prompt
pub const USER_NAME_LABEL: &str = "ユーザー名";
/// Text substituted for a prompt that moderation flagged
pub const CENSORED_PLACEHOLDER: &str = "<<検閲されたメッセージ>>";
/// Maximum number of images forwarded with a single request
pub const MAX_IMAGES: usize = 2;
/// Longest side of a normalized image, in pixels
pub const IMAGE_MAX_SIDE: u32 = 512;
/// Discord's hard limit for a single message
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;
/// How long observed user messages stay quotable
pub const TURN_RETENTION_SECS: i64 = 60 * 60;
/// Time-to-live of cached theme feed lookups
pub const THEME_CACHE_TTL_SECS: u64 = 60 * 60;

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn settings() -> Settings {
        Settings {
            discord_token: "dummy".to_string(),
            openai_api_key: "dummy".to_string(),
            openai_api_base: None,
            target_channel_names_str: None,
            denied_users_str: None,
            reaction_emoji: default_reaction_emoji(),
            profile_path: default_profile_path(),
            sticker_streak_threshold: default_sticker_streak_threshold(),
            theme_feed_url: None,
            theme_json_pointer: default_theme_json_pointer(),
            theme_timezone: default_theme_timezone(),
            llm_timeout_secs: default_llm_timeout_secs(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }

    #[test]
    fn test_config_env_loading() -> Result<(), Box<dyn std::error::Error>> {
        env::set_var("DISCORD_TOKEN", "dummy_token");
        env::set_var("OPENAI_API_KEY", "sk-dummy");
        env::set_var("TARGET_CHANNEL_NAMES", "bot,sizu");

        let settings = Settings::new()?;
        assert_eq!(settings.discord_token, "dummy_token");
        assert_eq!(settings.reaction_emoji, "✔");
        assert_eq!(settings.target_channel_names(), vec!["bot", "sizu"]);
        assert_eq!(settings.sticker_streak_threshold, 3);

        env::remove_var("DISCORD_TOKEN");
        env::remove_var("OPENAI_API_KEY");
        env::remove_var("TARGET_CHANNEL_NAMES");
        Ok(())
    }

    #[test]
    fn test_denied_users_parsing() {
        let mut settings = settings();

        settings.denied_users_str = Some("123,456".to_string());
        let denied = settings.denied_users();
        assert!(denied.contains(&123));
        assert!(denied.contains(&456));
        assert_eq!(denied.len(), 2);

        settings.denied_users_str = Some("333; 444, abc".to_string());
        let denied = settings.denied_users();
        assert!(denied.contains(&333));
        assert!(denied.contains(&444));
        assert_eq!(denied.len(), 2);

        settings.denied_users_str = None;
        assert!(settings.denied_users().is_empty());
    }

    #[test]
    fn test_channel_scope() {
        let mut settings = settings();
        assert!(settings.is_target_channel("general"));

        settings.target_channel_names_str = Some("sizu, bot-".to_string());
        assert!(settings.is_target_channel("sizu-room"));
        assert!(settings.is_target_channel("bot-test"));
        assert!(!settings.is_target_channel("general"));
    }

    #[test]
    fn test_profile_from_yaml() -> Result<(), ProfileError> {
        let profile = BotProfile::from_yaml(
            r"
model: gpt-4o-mini
system_prompt: normal
temperature: 0.7
max_tokens: 500
msg:
  no_prompt: empty
  timeout: later
",
        )?;
        assert_eq!(profile.model, "gpt-4o-mini");
        assert_eq!(profile.max_tokens, Some(500));
        assert_eq!(profile.frequency_penalty, None);
        assert_eq!(profile.persona(false), "normal");
        // No restricted persona configured
        assert_eq!(profile.persona(true), "normal");
        assert_eq!(profile.msg.timeout, "later");
        Ok(())
    }

    #[test]
    fn test_profile_restricted_persona() -> Result<(), ProfileError> {
        let profile = BotProfile::from_yaml(
            r"
model: m
system_prompt: normal
restricted_system_prompt: strict
msg: { no_prompt: a, timeout: b }
",
        )?;
        assert_eq!(profile.persona(true), "strict");
        assert_eq!(profile.persona(false), "normal");
        Ok(())
    }

    #[test]
    fn test_profile_missing_messages_is_error() {
        assert!(BotProfile::from_yaml("model: m\nsystem_prompt: s\n").is_err());
    }
}
