/// Recent turns and reply links for quoting deleted messages
pub mod conversation_cache;
/// Discord event routing
pub mod handler;
/// Attachment and sticker image normalization
pub mod images;
/// Reply splitting and quote edits
pub mod messaging;
/// Repeated-sticker detection
pub mod sticker_streak;

pub use conversation_cache::{ConversationCache, QuoteRewrite};
pub use handler::Handler;
pub use images::ImageNormalizer;
pub use sticker_streak::StickerStreaks;
