//! HTTP helpers shared by store clients.

use crate::error::{Error, Result};
use reqwest::Client;
use std::time::Duration;

/// Default HTTP timeout for store calls.
///
/// Long enough for a full bulk request; a scroll that outlives its TTL
/// fails on the store side first.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Creates a configured HTTP client with timeout.
#[must_use]
pub fn create_http_client() -> Client {
    Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Validates a store URL.
pub fn validate_url(url: &str) -> Result<()> {
    let valid_schemes = ["http://", "https://"];
    if !valid_schemes.iter().any(|s| url.starts_with(s)) {
        return Err(Error::Config(format!(
            "Invalid URL scheme in '{}'. Allowed: http, https",
            url
        )));
    }

    if url.len() < 10 {
        return Err(Error::Config(format!("Invalid URL format: {}", url)));
    }

    Ok(())
}

/// Maps a non-success HTTP response to an error.
pub fn handle_http_error(status_code: u16, body: &str, operation: &str) -> Error {
    match status_code {
        401 | 403 => Error::Authentication(format!("{} refused: {}", operation, body)),
        _ => Error::Request {
            status: status_code,
            message: format!("{}: {}", operation, body),
        },
    }
}

/// Maps a transport failure to an error.
pub fn connection_error(err: &reqwest::Error, operation: &str) -> Error {
    Error::Connection(format!("{} request failed: {}", operation, err))
}
