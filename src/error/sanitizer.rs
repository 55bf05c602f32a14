//! Credential redaction for log and error messages.
//!
//! The access token travels as the last path segment of the channel URL, so
//! any URL that reaches a log line has to go through here first. It redacts:
//!
//! - The token segment of `ws://` / `wss://` URLs
//! - Bare token-looking query parameters (`token=`, `access_token=`)

use once_cell::sync::Lazy;
use regex::Regex;

const REDACTED: &str = "[REDACTED]";

static PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        // WebSocket URLs: keep scheme, host and leading path, mask the final segment
        (
            Regex::new(r"(?i)(wss?://[^\s/]+(?:/[^\s/]+)*/)[^\s/?#]+").unwrap(),
            "${1}[REDACTED]",
        ),
        // Token query parameters
        (
            Regex::new(r"(?i)((?:access_)?token=)[^\s&]+").unwrap(),
            "${1}[REDACTED]",
        ),
    ]
});

/// Sanitize a message by masking every credential-bearing fragment.
///
/// # Examples
///
/// ```
/// use flagbook::error::sanitizer::sanitize_message;
///
/// let message = "handshake with wss://socket.flagbook.sh/ws/abc123 failed";
/// let sanitized = sanitize_message(message);
/// assert!(!sanitized.contains("abc123"));
/// assert!(sanitized.contains("wss://socket.flagbook.sh/ws/"));
/// ```
pub fn sanitize_message(message: &str) -> String {
    let mut result = message.to_string();

    for (pattern, replacement) in PATTERNS.iter() {
        result = pattern.replace_all(&result, *replacement).to_string();
    }

    result
}

/// Mask the credential segment of a channel endpoint.
///
/// Endpoints are always `base_url + token`; everything after the last `/`
/// is treated as the token.
pub fn redact_endpoint(endpoint: &str) -> String {
    match endpoint.rfind('/') {
        Some(idx) if idx + 1 < endpoint.len() => {
            format!("{}{}", &endpoint[..=idx], REDACTED)
        }
        _ => endpoint.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_endpoint() {
        assert_eq!(
            redact_endpoint("wss://socket.flagbook.sh/ws/abc"),
            "wss://socket.flagbook.sh/ws/[REDACTED]"
        );
    }

    #[test]
    fn test_redact_endpoint_without_token() {
        assert_eq!(
            redact_endpoint("wss://socket.flagbook.sh/ws/"),
            "wss://socket.flagbook.sh/ws/"
        );
    }

    #[test]
    fn test_sanitize_ws_url_in_message() {
        let sanitized =
            sanitize_message("URL error: ws://127.0.0.1:9000/ws/secret-token refused");
        assert_eq!(
            sanitized,
            "URL error: ws://127.0.0.1:9000/ws/[REDACTED] refused"
        );
    }

    #[test]
    fn test_sanitize_token_query() {
        let sanitized = sanitize_message("GET /connect?access_token=xyz&v=1");
        assert_eq!(sanitized, "GET /connect?access_token=[REDACTED]&v=1");
    }

    #[test]
    fn test_sanitize_leaves_plain_messages() {
        let message = "connection reset by peer";
        assert_eq!(sanitize_message(message), message);
    }
}
