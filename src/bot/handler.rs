//! Discord event routing.
//!
//! Every in-scope user message is remembered for quote edits. Mentions go to
//! the chat engine, sticker streaks get echoed, and deleting a message the
//! bot answered splices a quote of it into the bot's reply.

use super::conversation_cache::ConversationCache;
use super::images::{select_image_sources, ImageNormalizer};
use super::messaging::{apply_quote_rewrite, send_long_message, send_long_reply};
use super::sticker_streak::StickerStreaks;
use crate::chat::{ChatEngine, Prompt};
use crate::config::Settings;
use crate::utils::strip_user_mentions;
use async_trait::async_trait;
use chrono::Utc;
use serenity::all::{
    ChannelId, Context, CreateMessage, EventHandler, GuildId, Message, MessageId, ReactionType,
    Ready, StickerId,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Serenity event handler holding the bot's shared state
pub struct Handler {
    engine: Arc<ChatEngine>,
    cache: Arc<ConversationCache>,
    images: ImageNormalizer,
    streaks: StickerStreaks,
    settings: Arc<Settings>,
    denied_users: HashSet<u64>,
}

impl Handler {
    /// Build a handler; the denylist and streak threshold are read from `settings`
    #[must_use]
    pub fn new(
        engine: Arc<ChatEngine>,
        cache: Arc<ConversationCache>,
        images: ImageNormalizer,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            engine,
            cache,
            images,
            streaks: StickerStreaks::new(settings.sticker_streak_threshold),
            denied_users: settings.denied_users(),
            settings,
        }
    }

    /// Whether replies to `user_id` use the restricted persona
    #[must_use]
    pub fn is_restricted(&self, user_id: u64) -> bool {
        self.denied_users.contains(&user_id)
    }

    async fn in_scope(&self, ctx: &Context, msg: &Message) -> bool {
        if self.settings.target_channel_names().is_empty() {
            return true;
        }
        match msg.channel_id.name(ctx).await {
            Ok(name) => self.settings.is_target_channel(&name),
            Err(e) => {
                debug!(channel_id = %msg.channel_id, error = %e, "Channel name unavailable, ignoring message");
                false
            }
        }
    }

    /// Server nickname from the event payload, else the global display name
    fn author_name(msg: &Message) -> String {
        resolve_author_name(
            msg.member.as_ref().and_then(|m| m.nick.as_deref()),
            msg.author.display_name(),
        )
    }

    async fn handle_mention(&self, ctx: &Context, msg: &Message, author_name: &str) {
        let reaction = ReactionType::Unicode(self.settings.reaction_emoji.clone());
        if let Err(e) = msg.react(ctx, reaction).await {
            warn!(message_id = %msg.id, error = %e, "Failed to add reaction");
        }

        let typing = msg.channel_id.start_typing(&ctx.http);

        let text = strip_user_mentions(&msg.content);
        let sticker_urls = sticker_image_urls(msg, None);
        let sources = select_image_sources(
            msg.attachments
                .iter()
                .map(|a| (a.filename.as_str(), a.url.as_str())),
            sticker_urls.iter().map(String::as_str),
        );
        let images = self.images.load(&sources).await;
        let prompt = Prompt::new(author_name, &text, images);
        let restricted = self.is_restricted(msg.author.id.get());

        info!(
            user = %author_name,
            user_id = %msg.author.id,
            restricted,
            images = prompt.images().len(),
            "Mention received"
        );
        let reply = self.engine.chat(&prompt, restricted).await;
        typing.stop();

        match send_long_reply(ctx, msg, &reply).await {
            Ok(Some(first_reply)) => {
                self.cache
                    .record_reply_link(first_reply.get(), msg.id.get(), Utc::now())
                    .await;
            }
            Ok(None) => debug!("Empty reply, nothing sent"),
            Err(e) => error!(message_id = %msg.id, error = %e, "Failed to send reply"),
        }
    }

    async fn handle_sticker_streak(
        &self,
        ctx: &Context,
        msg: &Message,
        author_name: &str,
        sticker_id: u64,
    ) {
        info!(channel_id = %msg.channel_id, sticker_id, "Sticker streak, joining in");
        let echo = CreateMessage::new().add_sticker_id(StickerId::new(sticker_id));
        if let Err(e) = msg.channel_id.send_message(ctx, echo).await {
            warn!(sticker_id, error = %e, "Failed to echo sticker");
            return;
        }

        let sticker_urls = sticker_image_urls(msg, Some(sticker_id));
        let sources = select_image_sources([], sticker_urls.iter().map(String::as_str));
        let images = self.images.load(&sources).await;
        if images.is_empty() {
            debug!(sticker_id, "Sticker image unavailable, skipping comment");
            return;
        }

        let typing = msg.channel_id.start_typing(&ctx.http);
        let prompt = Prompt::new(author_name, "", images);
        let comment = self
            .engine
            .chat(&prompt, self.is_restricted(msg.author.id.get()))
            .await;
        typing.stop();

        if let Err(e) = send_long_message(ctx, msg.channel_id, &comment).await {
            error!(channel_id = %msg.channel_id, error = %e, "Failed to post sticker comment");
        }
    }
}

/// Name shown in prompts and quotes: a non-blank nickname wins
#[must_use]
pub fn resolve_author_name(nick: Option<&str>, display_name: &str) -> String {
    nick.map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(display_name)
        .to_string()
}

/// Whether a message addresses the bot: a direct mention, or `@everyone`/`@here`
#[must_use]
pub fn addresses_bot(
    mention_everyone: bool,
    mentioned_ids: impl IntoIterator<Item = u64>,
    bot_id: u64,
) -> bool {
    mention_everyone || mentioned_ids.into_iter().any(|id| id == bot_id)
}

/// Image URLs of the message's stickers, optionally only the given one
fn sticker_image_urls(msg: &Message, only: Option<u64>) -> Vec<String> {
    msg.sticker_items
        .iter()
        .filter(|s| only.is_none_or(|id| s.id.get() == id))
        .filter_map(|s| s.image_url())
        .collect()
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, ctx: Context, msg: Message) {
        // Ignore bots, including ourselves
        if msg.author.bot {
            return;
        }
        if !self.in_scope(&ctx, &msg).await {
            return;
        }

        let author_name = Self::author_name(&msg);
        self.cache
            .record_turn(msg.id.get(), &msg.content, &author_name, Utc::now())
            .await;

        let sticker_id = msg.sticker_items.first().map(|s| s.id.get());
        if let Some(sticker_id) = self.streaks.observe(msg.channel_id.get(), sticker_id).await {
            self.handle_sticker_streak(&ctx, &msg, &author_name, sticker_id)
                .await;
        }

        let bot_id = ctx.cache.current_user().id.get();
        if addresses_bot(
            msg.mention_everyone,
            msg.mentions.iter().map(|u| u.id.get()),
            bot_id,
        ) {
            self.handle_mention(&ctx, &msg, &author_name).await;
        }
    }

    async fn message_delete(
        &self,
        ctx: Context,
        channel_id: ChannelId,
        deleted_message_id: MessageId,
        _guild_id: Option<GuildId>,
    ) {
        let Some(rewrite) = self
            .cache
            .on_delete(deleted_message_id.get(), Utc::now())
            .await
        else {
            return;
        };

        match apply_quote_rewrite(&ctx, channel_id, &rewrite).await {
            Ok(edited) => {
                if edited {
                    info!(
                        deleted = %deleted_message_id,
                        bot_message_id = rewrite.bot_message_id,
                        "Quoted deleted message into reply"
                    );
                }
                let now = Utc::now();
                self.cache.consume(&rewrite, now).await;
                let (turns, links) = self.cache.counts(now).await;
                debug!(turns, links, "Conversation cache after quote edit");
            }
            Err(e) => warn!(
                bot_message_id = rewrite.bot_message_id,
                error = %e,
                "Quote edit failed, keeping link"
            ),
        }
    }

    async fn ready(&self, _: Context, ready: Ready) {
        info!("Connected as {}", ready.user.name);
    }
}
