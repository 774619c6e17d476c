use chrono::{DateTime, Duration, TimeZone, Utc};
use sizu_bot::bot::messaging::quote_edit_content;
use sizu_bot::bot::ConversationCache;
use sizu_bot::config::DISCORD_MESSAGE_LIMIT;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0)
        .single()
        .unwrap_or_default()
}

#[tokio::test]
async fn test_deleted_mention_is_quoted_into_reply() {
    let cache = ConversationCache::new();
    cache
        .record_turn(10, "<@42> ねえ @everyone 見て <#7>", "Alice", t0())
        .await;
    cache.record_turn(11, "unrelated", "Bob", t0()).await;
    cache.record_reply_link(500, 10, t0()).await;

    let later = t0() + Duration::minutes(30);
    let Some(rewrite) = cache.on_delete(10, later).await else {
        panic!("expected a rewrite for the answered message");
    };
    assert_eq!(rewrite.bot_message_id, 500);

    let edited = quote_edit_content(&rewrite, "こんにちは、Alice");
    assert_eq!(
        edited,
        "> [Alice]\n> <@\u{200B}42> ねえ @\u{200B}everyone 見て <#\u{200B}7>\nこんにちは、Alice"
    );

    cache.consume(&rewrite, later).await;
    assert_eq!(cache.on_delete(10, later).await, None);
    // Bob's turn is untouched
    assert_eq!(cache.counts(later).await, (1, 0));
}

#[tokio::test]
async fn test_delete_after_retention_does_nothing() {
    let cache = ConversationCache::new();
    cache.record_turn(10, "hello", "Alice", t0()).await;
    cache.record_reply_link(500, 10, t0()).await;

    let too_late = t0() + Duration::hours(1) + Duration::seconds(1);
    assert_eq!(cache.on_delete(10, too_late).await, None);
}

#[tokio::test]
async fn test_long_reply_edit_stays_within_limit() {
    let cache = ConversationCache::new();
    cache.record_turn(10, &"長".repeat(300), "Alice", t0()).await;
    cache.record_reply_link(500, 10, t0()).await;

    let Some(rewrite) = cache.on_delete(10, t0()).await else {
        panic!("expected a rewrite");
    };
    let edited = quote_edit_content(&rewrite, &"返".repeat(DISCORD_MESSAGE_LIMIT));
    assert_eq!(edited.chars().count(), DISCORD_MESSAGE_LIMIT);
    assert!(edited.starts_with("> [Alice]\n> 長"));
}
