//! Validation of broker URLs and destination names.

use lazy_static::lazy_static;
use regex::Regex;

use crate::{Error, Result};

lazy_static! {
    static ref BROKER_URL: Regex =
        Regex::new(r"^(?i)(ws|wss|http|https)://[^\s/?#]+([/?#]\S*)?$").expect("valid regex");
}

/// Check that `url` names a reachable broker endpoint.
///
/// Accepts `ws`, `wss`, `http` and `https` (the latter two for transports
/// that negotiate a fallback) with a non-empty authority.
pub fn validate_url(url: &str) -> Result<()> {
    if url.trim().is_empty() {
        return Err(Error::InvalidUrl("URL is empty".to_string()));
    }
    if !BROKER_URL.is_match(url) {
        return Err(Error::InvalidUrl(url.to_string()));
    }
    Ok(())
}

/// Check that `destination` can be used as a subscription key.
pub fn validate_destination(destination: &str) -> Result<()> {
    if destination.trim().is_empty() {
        return Err(Error::InvalidDestination(
            "destination is empty".to_string(),
        ));
    }
    if destination.chars().any(|c| c == '\n' || c == '\r' || c == '\0') {
        return Err(Error::InvalidDestination(destination.escape_debug().to_string()));
    }
    Ok(())
}
