//! Credential scrubbing for error text that reaches logs.
//!
//! Google API errors and transport failures can echo request headers or
//! pieces of a service account key. Everything written to the running log
//! or the console on a failure path goes through [`scrub_credentials`].

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Patterns applied in order; earlier ones remove whole blocks
    static ref CREDENTIAL_PATTERNS: Vec<(Regex, &'static str)> = vec![
        // PEM private keys, raw or JSON-escaped
        (Regex::new(r"-----BEGIN [A-Z ]*PRIVATE KEY-----[\s\S]*?-----END [A-Z ]*PRIVATE KEY-----").unwrap(),
         "<REDACTED_PRIVATE_KEY>"),

        // Authorization headers
        (Regex::new(r"(?i)(authorization)\s*[:=]\s*(bearer\s+)?([A-Za-z0-9\-._~+/]+=*)").unwrap(),
         "$1=<REDACTED_TOKEN>"),

        // Bare OAuth 2.0 access tokens
        (Regex::new(r"ya29\.[A-Za-z0-9\-_.]+").unwrap(),
         "<REDACTED_OAUTH_TOKEN>"),

        // Token and secret fields, as query pairs or JSON members
        (Regex::new(r#"(?i)("?(?:access_token|refresh_token|id_token|client_secret|private_key_id)"?\s*[:=]\s*"?)[^"\s,&}]+"#).unwrap(),
         "${1}<REDACTED>"),

        // Basic auth in URLs
        (Regex::new(r"(https?://)([^:/\s]+):([^@/\s]+)@").unwrap(),
         "$1<REDACTED_USER>:<REDACTED_PASS>@"),
    ];
}

/// Scrub credentials from a string.
///
/// # Example
///
/// ```
/// use cirrus_collector::security::credential_scrubber::scrub_credentials;
///
/// let scrubbed = scrub_credentials("401 for token ya29.a0AfH6SMBx");
/// assert_eq!(scrubbed, "401 for token <REDACTED_OAUTH_TOKEN>");
/// ```
pub fn scrub_credentials(input: &str) -> String {
    let mut result = input.to_string();

    for (pattern, replacement) in CREDENTIAL_PATTERNS.iter() {
        result = pattern.replace_all(&result, *replacement).to_string();
    }

    result
}

/// Format `context: error` with credentials scrubbed.
pub fn safe_error_message(context: &str, error: &impl std::fmt::Display) -> String {
    let raw_message = format!("{}: {}", context, error);
    scrub_credentials(&raw_message)
}
