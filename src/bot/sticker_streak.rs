//! Per-channel detection of the same sticker being posted repeatedly

use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy)]
struct Streak {
    sticker_id: u64,
    count: usize,
}

/// Counts consecutive identical stickers per channel
pub struct StickerStreaks {
    threshold: usize,
    channels: Mutex<HashMap<u64, Streak>>,
}

impl StickerStreaks {
    /// Fire once `threshold` consecutive messages carry the same sticker; 0 disables
    #[must_use]
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Record a message in `channel_id`.
    ///
    /// Returns the sticker to echo when this message completes a streak. A
    /// streak fires once; it has to be broken before it can fire again.
    pub async fn observe(&self, channel_id: u64, sticker_id: Option<u64>) -> Option<u64> {
        if self.threshold == 0 {
            return None;
        }

        let mut channels = self.channels.lock().await;
        let Some(sticker_id) = sticker_id else {
            channels.remove(&channel_id);
            return None;
        };

        let streak = channels
            .entry(channel_id)
            .and_modify(|s| {
                if s.sticker_id == sticker_id {
                    s.count += 1;
                } else {
                    *s = Streak {
                        sticker_id,
                        count: 1,
                    };
                }
            })
            .or_insert(Streak {
                sticker_id,
                count: 1,
            });

        (streak.count == self.threshold).then_some(sticker_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fires_on_threshold_once() {
        let streaks = StickerStreaks::new(3);
        assert_eq!(streaks.observe(1, Some(7)).await, None);
        assert_eq!(streaks.observe(1, Some(7)).await, None);
        assert_eq!(streaks.observe(1, Some(7)).await, Some(7));
        assert_eq!(streaks.observe(1, Some(7)).await, None);
    }

    #[tokio::test]
    async fn test_different_sticker_resets() {
        let streaks = StickerStreaks::new(2);
        assert_eq!(streaks.observe(1, Some(7)).await, None);
        assert_eq!(streaks.observe(1, Some(8)).await, None);
        assert_eq!(streaks.observe(1, Some(8)).await, Some(8));
    }

    #[tokio::test]
    async fn test_plain_message_breaks_streak() {
        let streaks = StickerStreaks::new(2);
        assert_eq!(streaks.observe(1, Some(7)).await, None);
        assert_eq!(streaks.observe(1, None).await, None);
        assert_eq!(streaks.observe(1, Some(7)).await, None);
        assert_eq!(streaks.observe(1, Some(7)).await, Some(7));
    }

    #[tokio::test]
    async fn test_channels_are_independent() {
        let streaks = StickerStreaks::new(2);
        assert_eq!(streaks.observe(1, Some(7)).await, None);
        assert_eq!(streaks.observe(2, Some(7)).await, None);
        assert_eq!(streaks.observe(1, Some(7)).await, Some(7));
    }

    #[tokio::test]
    async fn test_zero_threshold_disables() {
        let streaks = StickerStreaks::new(0);
        assert_eq!(streaks.observe(1, Some(7)).await, None);
        assert_eq!(streaks.observe(1, Some(7)).await, None);
    }
}
