#![warn(missing_docs)]
//! Sizu - Discord chat relay bot
//!
//! Listens for mentions on Discord, builds a multimodal prompt (text plus up to
//! two images), forwards it to an OpenAI-compatible completion service with an
//! optional single tool round-trip, and replies in the originating channel.

/// Discord event routing, image normalization and the conversation cache
pub mod bot;
/// Completion engine (moderation, tool round-trip, fallback handling)
pub mod chat;
/// Configuration management
pub mod config;
/// Completion and moderation service clients
pub mod llm;
/// Server-side tools the model may call
pub mod tools;
pub mod utils;
