//! HTTP utilities shared by the feed and image fetchers

use reqwest::Client as HttpClient;
use std::time::Duration;

/// Creates an HTTP client bounded by `timeout_secs`.
///
/// Falls back to an unbounded default client if the builder fails, so callers
/// never have to handle a construction error.
#[must_use]
pub fn create_http_client(timeout_secs: u64) -> HttpClient {
    HttpClient::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("sizu-bot/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| HttpClient::new())
}
