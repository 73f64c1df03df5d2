use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Generate a new opaque refresh token.
///
/// Returns a tuple of (raw_token, token_hash) where:
/// - raw_token is handed to the client once
/// - token_hash is the SHA-256 hash to persist
pub fn generate_refresh_token() -> (String, String) {
    // 32 random bytes (256 bits of entropy)
    let mut rng = rand::thread_rng();
    let mut random_bytes = [0u8; 32];
    rng.fill(&mut random_bytes);

    let raw_token = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes);
    let token_hash = hash_refresh_token(&raw_token);

    (raw_token, token_hash)
}

/// Hex-encoded SHA-256 of a raw refresh token.
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_refresh_token() {
        let (raw, hash) = generate_refresh_token();

        // 32 bytes in base64 without padding is 43 characters
        assert_eq!(raw.len(), 43);
        assert_eq!(hash, hash_refresh_token(&raw));
    }

    #[test]
    fn test_generate_unique_tokens() {
        let (a, hash_a) = generate_refresh_token();
        let (b, hash_b) = generate_refresh_token();
        assert_ne!(a, b);
        assert_ne!(hash_a, hash_b);
    }

    #[test]
    fn test_hash_refresh_token() {
        let hash = hash_refresh_token("some-token");
        assert_eq!(hash, hash_refresh_token("some-token"));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(hash, hash_refresh_token("some-token2"));
    }
}
