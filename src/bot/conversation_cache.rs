//! Short-lived memory of recent messages for the "quote the deleted original"
//! feature.
//!
//! Two maps live behind one lock: observed user messages (turns) and links
//! from bot replies to the message they answered. Every operation first runs
//! the cleanup pass (expire old turns, then drop links whose turn is gone)
//! inside the same critical section, so a link never points at a missing turn.

use crate::config::TURN_RETENTION_SECS;
use chrono::{DateTime, Duration, Utc};
use lazy_regex::regex_replace_all;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

const ZERO_WIDTH_SPACE: char = '\u{200B}';

/// One observed user message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    /// Raw message content
    pub content: String,
    /// Display name of the author at the time of posting
    pub author_name: String,
    /// When the message was observed
    pub timestamp: DateTime<Utc>,
}

/// Instructions for splicing a quote of a deleted message into a bot reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRewrite {
    /// Bot reply to edit
    pub bot_message_id: u64,
    /// The deleted user message
    pub original_message_id: u64,
    /// Rendered block quote, mentions neutralized
    pub quote: String,
}

impl QuoteRewrite {
    /// New content for the bot reply: the quote followed by its current text
    #[must_use]
    pub fn apply(&self, existing: &str) -> String {
        format!("{}\n{existing}", self.quote)
    }
}

#[derive(Default)]
struct CacheState {
    turns: HashMap<u64, ConversationTurn>,
    /// bot reply id -> original message id
    reply_links: HashMap<u64, u64>,
}

impl CacheState {
    fn cleanup(&mut self, now: DateTime<Utc>) {
        let retention = Duration::seconds(TURN_RETENTION_SECS);
        let before = (self.turns.len(), self.reply_links.len());

        self.turns
            .retain(|_, turn| now.signed_duration_since(turn.timestamp) <= retention);
        let turns = &self.turns;
        self.reply_links
            .retain(|_, original| turns.contains_key(original));

        let after = (self.turns.len(), self.reply_links.len());
        if before != after {
            debug!(
                turns_dropped = before.0 - after.0,
                links_dropped = before.1 - after.1,
                "Conversation cache cleaned up"
            );
        }
    }
}

/// Bounded, time-windowed store of recent turns and reply links
#[derive(Default)]
pub struct ConversationCache {
    state: Mutex<CacheState>,
}

impl ConversationCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a user message
    pub async fn record_turn(
        &self,
        message_id: u64,
        content: &str,
        author_name: &str,
        now: DateTime<Utc>,
    ) {
        let mut state = self.state.lock().await;
        state.cleanup(now);
        state.turns.insert(
            message_id,
            ConversationTurn {
                content: content.to_string(),
                author_name: author_name.to_string(),
                timestamp: now,
            },
        );
    }

    /// Link a bot reply to the user message it answered.
    ///
    /// Ignored when the original turn is unknown or already expired.
    pub async fn record_reply_link(
        &self,
        bot_message_id: u64,
        original_message_id: u64,
        now: DateTime<Utc>,
    ) {
        let mut state = self.state.lock().await;
        state.cleanup(now);
        if state.turns.contains_key(&original_message_id) {
            state
                .reply_links
                .insert(bot_message_id, original_message_id);
        } else {
            debug!(original_message_id, "Reply link skipped, original turn not cached");
        }
    }

    /// Rewrite to apply after `message_id` was deleted, if a bot reply answered it.
    ///
    /// The link stays in place until [`Self::consume`] is called, so a failed
    /// edit leaves the cache unchanged.
    pub async fn on_delete(&self, message_id: u64, now: DateTime<Utc>) -> Option<QuoteRewrite> {
        let mut state = self.state.lock().await;
        state.cleanup(now);

        let turn = state.turns.get(&message_id)?;
        // Lowest id = earliest reply; only one reply is rewritten
        let bot_message_id = state
            .reply_links
            .iter()
            .filter(|(_, original)| **original == message_id)
            .map(|(bot, _)| *bot)
            .min()?;

        Some(QuoteRewrite {
            bot_message_id,
            original_message_id: message_id,
            quote: render_quote(&turn.author_name, &turn.content),
        })
    }

    /// Drop a link once its rewrite was applied, forgetting the deleted turn too
    pub async fn consume(&self, rewrite: &QuoteRewrite, now: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        state.reply_links.remove(&rewrite.bot_message_id);
        state.turns.remove(&rewrite.original_message_id);
        state.cleanup(now);
    }

    /// Number of cached turns and reply links, after cleanup
    pub async fn counts(&self, now: DateTime<Utc>) -> (usize, usize) {
        let mut state = self.state.lock().await;
        state.cleanup(now);
        (state.turns.len(), state.reply_links.len())
    }
}

/// Make user, role, channel and `@everyone`/`@here` mentions inert by
/// inserting a zero-width space after the trigger character
#[must_use]
pub fn neutralize_mentions(text: &str) -> String {
    let text = text.replace('@', &format!("@{ZERO_WIDTH_SPACE}"));
    regex_replace_all!(r"<#(\d+)>", &text, |_, id: &str| format!(
        "<#{ZERO_WIDTH_SPACE}{id}>"
    ))
    .into_owned()
}

/// Markdown block quote of `[author]\ncontent` with mentions neutralized
#[must_use]
pub fn render_quote(author_name: &str, content: &str) -> String {
    let body = neutralize_mentions(&format!("[{author_name}]\n{content}"));
    body.lines()
        .map(|line| format!("> {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
