//! Discord send/edit helpers.
//!
//! Long replies are split to fit Discord's per-message limit; quote edits are
//! truncated to the same limit.

use super::conversation_cache::QuoteRewrite;
use crate::config::DISCORD_MESSAGE_LIMIT;
use crate::utils;
use anyhow::Result;
use serenity::all::{ChannelId, Context, EditMessage, Message, MessageId};
use tracing::debug;

/// Replies to `msg` with `text`, split into as many messages as needed.
///
/// Returns the id of the first reply, which is the one linked to `msg` for
/// later quote edits. Nothing is sent for empty text.
///
/// # Errors
///
/// Returns an error if any part fails to send. Parts already sent stay sent.
pub async fn send_long_reply(ctx: &Context, msg: &Message, text: &str) -> Result<Option<MessageId>> {
    let parts = utils::split_long_message(text, DISCORD_MESSAGE_LIMIT);
    let mut first = None;

    for part in parts {
        let sent = msg.reply(ctx, part).await?;
        first.get_or_insert(sent.id);
    }

    Ok(first)
}

/// Posts `text` to a channel as fresh messages, split like [`send_long_reply`].
///
/// # Errors
///
/// Returns an error if any part fails to send.
pub async fn send_long_message(ctx: &Context, channel_id: ChannelId, text: &str) -> Result<()> {
    for part in utils::split_long_message(text, DISCORD_MESSAGE_LIMIT) {
        channel_id.say(ctx, part).await?;
    }
    Ok(())
}

/// New content for a bot reply after the message it answered was deleted
#[must_use]
pub fn quote_edit_content(rewrite: &QuoteRewrite, existing: &str) -> String {
    utils::truncate_str(rewrite.apply(existing), DISCORD_MESSAGE_LIMIT)
}

/// Splice the quote into the bot reply in place.
///
/// Returns `Ok(false)` when the bot reply no longer exists; there is nothing
/// to edit and the link may be consumed.
///
/// # Errors
///
/// Returns an error if the edit itself fails.
pub async fn apply_quote_rewrite(
    ctx: &Context,
    channel_id: ChannelId,
    rewrite: &QuoteRewrite,
) -> Result<bool> {
    let bot_message_id = MessageId::new(rewrite.bot_message_id);
    let reply = match channel_id.message(ctx, bot_message_id).await {
        Ok(reply) => reply,
        Err(e) => {
            debug!(bot_message_id = rewrite.bot_message_id, error = %e, "Bot reply gone, skipping quote edit");
            return Ok(false);
        }
    };

    let content = quote_edit_content(rewrite, &reply.content);
    channel_id
        .edit_message(ctx, bot_message_id, EditMessage::new().content(content))
        .await?;
    Ok(true)
}
