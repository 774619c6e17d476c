//! Text helpers for Discord message limits and mention handling.
//!
//! Discord counts message length in characters, so every limit here is a
//! character count, never a byte count.

// lazy_regex! keeps its statics in once_cell
#![allow(clippy::non_std_lazy_statics)]

use lazy_regex::lazy_regex;
use unicode_segmentation::UnicodeSegmentation;

/// Match user mention tokens: `<@123>` and the nickname form `<@!123>`
static RE_USER_MENTION: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"<@!?\d+>");

const CODE_FENCE: &str = "```";

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Remove every user mention token from `text` and trim the result.
///
/// ```
/// use sizu_bot::utils::strip_user_mentions;
/// assert_eq!(strip_user_mentions("<@1> hi <@!2>"), "hi");
/// ```
#[must_use]
pub fn strip_user_mentions(text: &str) -> String {
    RE_USER_MENTION.replace_all(text, "").trim().to_string()
}

/// Split a message into parts of at most `max_chars` characters.
///
/// Lines are kept whole where possible. A code block cut by a split is closed
/// at the end of one part and reopened at the start of the next. Lines longer
/// than the limit are cut on grapheme boundaries.
///
/// ```
/// use sizu_bot::utils::split_long_message;
/// let long_msg = "とても長いメッセージ\n".repeat(300);
/// let parts = split_long_message(&long_msg, 2000);
/// assert!(parts.len() > 1);
/// ```
#[must_use]
pub fn split_long_message(message: &str, max_chars: usize) -> Vec<String> {
    if message.is_empty() {
        return Vec::new();
    }
    if char_len(message) <= max_chars {
        return vec![message.to_string()];
    }

    let fence_overhead = char_len(CODE_FENCE) + 1;
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    let mut code_block = false;

    let mut flush = |current: &mut String, current_len: &mut usize, code_block: bool| {
        if code_block {
            current.push_str(CODE_FENCE);
        }
        let part = current.trim_end();
        if !part.is_empty() {
            parts.push(part.to_string());
        }
        current.clear();
        *current_len = 0;
        if code_block {
            current.push_str(CODE_FENCE);
            current.push('\n');
            *current_len = fence_overhead;
        }
    };

    for line in message.lines() {
        let line_len = char_len(line);

        if line_len + fence_overhead * 2 > max_chars {
            if current_len > 0 {
                flush(&mut current, &mut current_len, code_block);
            }
            for grapheme in line.graphemes(true) {
                let grapheme_len = char_len(grapheme);
                let reserve = if code_block { fence_overhead } else { 0 };
                if current_len + grapheme_len + reserve > max_chars {
                    flush(&mut current, &mut current_len, code_block);
                }
                current.push_str(grapheme);
                current_len += grapheme_len;
            }
            current.push('\n');
            current_len += 1;
            continue;
        }

        let opens_or_closes = line.starts_with(CODE_FENCE);
        // Room for the closing fence if we are (still) inside a block
        let inside_after = code_block != opens_or_closes;
        let reserve = if inside_after { fence_overhead } else { 0 };

        if current_len + line_len + 1 + reserve > max_chars && current_len > 0 {
            flush(&mut current, &mut current_len, code_block);
            if code_block && opens_or_closes {
                // Block ends right at the split; drop the reopened fence
                current.clear();
                current_len = 0;
                code_block = false;
                continue;
            }
        }

        if opens_or_closes {
            code_block = !code_block;
        }
        current.push_str(line);
        current.push('\n');
        current_len += line_len + 1;
    }

    if current_len > 0 {
        if code_block {
            current.push_str(CODE_FENCE);
        }
        let part = current.trim_end();
        if !part.is_empty() {
            parts.push(part.to_string());
        }
    }

    parts
}

/// Truncate a string to at most `max_chars` characters (not bytes).
///
/// ```
/// use sizu_bot::utils::truncate_str;
/// assert_eq!(truncate_str("こんにちは世界", 5), "こんにちは");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}
