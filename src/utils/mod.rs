pub mod logging;

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Generates a unique ID for entities
pub fn generate_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4())
}

/// Hash of the wallet's secret material, used as a stable key for email recovery.
/// The secret itself is never stored.
pub fn wallet_fingerprint(secret_material: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret_material);
    hex::encode(hasher.finalize())
}

/// Masks an email for display: `abcdef@example.com` -> `abc***@example.com`
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let visible: String = local.chars().take(3).collect();
            format!("{}***@{}", visible, domain)
        }
        None => "***".to_string(),
    }
}

/// Shortens an address for display: first 8 and last 6 characters
pub fn shorten_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 16 {
        return address.to_string();
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 6..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Minimal structural email check
pub fn is_valid_email(email: &str) -> bool {
    if email.len() > 254 || email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

/// Sanitizes a string for use in logs (removes verification codes)
const REDACTED: &str = "[REDACTED]";

pub fn sanitize_for_log(input: &str) -> String {
    let mut output = input.to_string();

    for key in ["\"code\":\"", "\"code\": \""] {
        let mut from = 0;
        while let Some(found) = output[from..].find(key) {
            let value_start = from + found + key.len();
            let value_end = output[value_start..]
                .find('"')
                .map(|i| value_start + i)
                .unwrap_or(output.len());
            output.replace_range(value_start..value_end, REDACTED);
            from = value_start + REDACTED.len();
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id() {
        let id = generate_id("verify");
        assert!(id.starts_with("verify_"));
        assert_eq!(id.len(), 43); // "verify_" + 36 chars for UUID
    }

    #[test]
    fn test_wallet_fingerprint_is_stable_hex() {
        let a = wallet_fingerprint(b"abandon abandon about");
        let b = wallet_fingerprint(b"abandon abandon about");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, wallet_fingerprint(b"other words"));
    }

    #[test]
    fn test_mask_email() {
        assert_eq!(mask_email("alice@example.com"), "ali***@example.com");
        assert_eq!(mask_email("al@example.com"), "al***@example.com");
        assert_eq!(mask_email("broken"), "***");
    }

    #[test]
    fn test_shorten_address() {
        assert_eq!(
            shorten_address("0x1234567890abcdef1234567890abcdef12345678"),
            "0x123456...345678"
        );
        assert_eq!(shorten_address("short"), "short");
    }

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("owner@example.com"));
        assert!(!is_valid_email("owner@example"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("own er@example.com"));
        assert!(!is_valid_email("owner@@example.com"));
    }

    #[test]
    fn test_sanitize_for_log() {
        let input = r#"{"token_id": "verify_1", "code":"482913"}"#;
        let sanitized = sanitize_for_log(input);
        assert!(sanitized.contains("[REDACTED]"));
        assert!(!sanitized.contains("482913"));
        assert!(sanitized.contains("verify_1"));
    }

    #[test]
    fn test_sanitize_redacts_every_code() {
        let sanitized = sanitize_for_log(r#"{"code":"111111","x":{"code":"222222"}}"#);
        assert_eq!(sanitized, r#"{"code":"[REDACTED]","x":{"code":"[REDACTED]"}}"#);

        let spaced = sanitize_for_log(r#"{"code": "1", "code": "2", "code":"3"}"#);
        assert!(!spaced.contains('1') && !spaced.contains('2') && !spaced.contains('3'));
        assert_eq!(sanitize_for_log(r#"{"code":""}"#), r#"{"code":"[REDACTED]"}"#);
    }
}
