//! Raw input classification.
//!
//! Decides whether a request input is a URL, a local file path, or literal
//! text. Classification never fails: anything that is neither a URL nor an
//! existing path is text.

use std::path::Path;

use url::Url;

use crate::models::InputType;

/// Classify a raw input string.
///
/// Order: `http`/`https` URL with a non-empty host, then a scheme-less
/// `domain.tld[/path]` string, then an existing filesystem path, then text.
/// The only I/O performed is the path existence check.
pub fn classify(input: &str) -> InputType {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return InputType::Text;
    }
    if is_network_url(trimmed) || looks_like_bare_domain(trimmed) {
        return InputType::Url;
    }
    if !trimmed.contains('\n') && Path::new(trimmed).exists() {
        return InputType::File;
    }
    InputType::Text
}

/// True for `http(s)://host/...` with a non-empty host.
pub fn is_network_url(s: &str) -> bool {
    match Url::parse(s) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().map(|h| !h.is_empty()).unwrap_or(false)
        }
        Err(_) => false,
    }
}

/// `example.com/path` style input: no whitespace, a dotted host whose last
/// label is alphabetic and at least two chars long.
fn looks_like_bare_domain(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) || s.contains("://") {
        return false;
    }
    let host = s.split(['/', '?', '#']).next().unwrap_or("");
    let host = host.split(':').next().unwrap_or("");
    if host.starts_with('.') || host.ends_with('.') || !host.contains('.') {
        return false;
    }
    if !host
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
    {
        return false;
    }
    let tld = host.rsplit('.').next().unwrap_or("");
    if tld.len() < 2 || !tld.chars().all(|c| c.is_ascii_alphabetic()) {
        return false;
    }
    // A relative file like `notes.txt` that exists locally wins over a domain guess.
    !Path::new(s).exists()
}
