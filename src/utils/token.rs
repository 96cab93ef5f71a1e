// src/utils/token.rs

use rand::Rng;

/// Length of the random portion of a center access token (24 bytes = 48 hex chars).
pub const ACCESS_TOKEN_HEX_LEN: usize = 48;

/// Generates a center access token: the center code followed by 48 hex chars.
///
/// The center code prefix is cosmetic (operators read it over the phone);
/// all entropy lives in the hex portion.
pub fn generate_access_token(center_code: &str) -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 24] = rng.random();
    format!("{}-{}", center_code, hex::encode(bytes))
}

/// Generates a candidate session token.
pub fn generate_session_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    format!("sess-{}", hex::encode(bytes))
}

/// Generates an offline package code.
pub fn generate_package_code() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 6] = rng.random();
    format!("pkg-{}", hex::encode(bytes))
}

/// Returns a token prefix safe for logs. Not enough entropy survives to
/// reconstruct the full token.
pub fn redact(token: &str) -> String {
    let cut = token
        .char_indices()
        .nth(12)
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    format!("{}...", &token[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_format() {
        let token = generate_access_token("DL-091");
        assert!(token.starts_with("DL-091-"));
        let hex_part = &token["DL-091-".len()..];
        assert_eq!(hex_part.len(), ACCESS_TOKEN_HEX_LEN);
        assert!(hex_part.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_access_tokens_are_unique() {
        let a = generate_access_token("DL-091");
        let b = generate_access_token("DL-091");
        assert_ne!(a, b);
    }

    #[test]
    fn test_session_token_format() {
        let token = generate_session_token();
        assert!(token.starts_with("sess-"));
        assert_eq!(token.len(), "sess-".len() + 32);
    }

    #[test]
    fn test_package_code_format() {
        let code = generate_package_code();
        assert!(code.starts_with("pkg-"));
        assert_eq!(code.len(), "pkg-".len() + 12);
    }

    #[test]
    fn test_redact_truncates() {
        let token = generate_access_token("DL-091");
        let redacted = redact(&token);
        assert!(redacted.ends_with("..."));
        assert!(redacted.len() < token.len());
        assert!(token.starts_with(&redacted[..redacted.len() - 3]));
    }

    #[test]
    fn test_redact_short_input() {
        assert_eq!(redact("abc"), "abc...");
    }
}
