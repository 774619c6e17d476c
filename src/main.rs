use chrono_tz::Tz;
use dotenvy::dotenv;
use regex::Regex;
use serenity::all::GatewayIntents;
use serenity::Client;
use sizu_bot::bot::{ConversationCache, Handler, ImageNormalizer};
use sizu_bot::chat::ChatEngine;
use sizu_bot::config::{BotProfile, Settings};
use sizu_bot::llm::{create_http_client, OpenAiService};
use sizu_bot::tools::{ThemeProvider, ToolRegistry};
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting secrets from log output
struct RedactionPatterns {
    discord_token: Regex,
    auth_header: Regex,
    openai_key: Regex,
}

impl RedactionPatterns {
    /// Compile all patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            // <base64 user id>.<timestamp>.<hmac>
            discord_token: Regex::new(r"[MNO][A-Za-z\d_-]{23,27}\.[A-Za-z\d_-]{6}\.[A-Za-z\d_-]{27,40}")?,
            auth_header: Regex::new(r"(?i)(authorization:?\s*(?:bot|bearer)\s+)[^\s'\x22]+")?,
            openai_key: Regex::new(r"sk-[A-Za-z0-9_-]{16,}")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let mut output = input.to_string();
        output = self
            .auth_header
            .replace_all(&output, "$1[MASKED]")
            .to_string();
        output = self
            .discord_token
            .replace_all(&output, "[DISCORD_TOKEN]")
            .to_string();
        output = self
            .openai_key
            .replace_all(&output, "sk-[MASKED]")
            .to_string();
        output
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        self.inner
            .write_all(self.patterns.redact(&s).as_bytes())?;
        // Report the caller's length; the redacted text may differ in size
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);
    init_logging(patterns);

    info!("Starting Sizu bot...");

    let settings = init_settings();
    let profile = init_profile(&settings);

    let llm = Arc::new(OpenAiService::new(
        &settings.openai_api_key,
        settings.openai_api_base.as_deref(),
        settings.llm_timeout_secs,
    ));
    let http = create_http_client(settings.http_timeout_secs);
    let tools = Arc::new(init_tools(&settings, &http));

    let engine = Arc::new(ChatEngine::new(llm.clone(), llm, tools, profile));
    let handler = Handler::new(
        engine,
        Arc::new(ConversationCache::new()),
        ImageNormalizer::new(http),
        settings.clone(),
    );

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;
    let mut client = Client::builder(&settings.discord_token, intents)
        .event_handler(handler)
        .await
        .map_err(|e| {
            error!("Failed to create Discord client: {e}");
            e
        })?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
            return;
        }
        info!("Shutting down...");
        shard_manager.shutdown_all().await;
    });

    info!("Bot is running...");
    client.start().await.map_err(|e| {
        error!("Discord client error: {e}");
        e
    })?;

    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter {
        make_inner: io::stderr,
        patterns,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,serenity=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Arc<Settings> {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_profile(settings: &Settings) -> Arc<BotProfile> {
    match BotProfile::load(&settings.profile_path) {
        Ok(profile) => {
            info!(model = %profile.model, path = %settings.profile_path, "Bot profile loaded.");
            Arc::new(profile)
        }
        Err(e) => {
            error!("Failed to load bot profile: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_tools(settings: &Settings, http: &reqwest::Client) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    if let Some(url) = settings.theme_feed_url.as_deref() {
        let timezone = settings.theme_timezone.parse::<Tz>().unwrap_or_else(|_| {
            warn!(
                timezone = %settings.theme_timezone,
                "Unknown theme timezone, using Asia/Tokyo"
            );
            chrono_tz::Asia::Tokyo
        });
        registry.register(Arc::new(ThemeProvider::new(
            http.clone(),
            url,
            &settings.theme_json_pointer,
            timezone,
        )));
        info!(url, "Theme tool enabled.");
    }

    if registry.is_empty() {
        info!("No theme feed configured, running without tools.");
    } else {
        info!(tools = registry.definitions().len(), "Tool registry ready.");
    }
    registry
}
