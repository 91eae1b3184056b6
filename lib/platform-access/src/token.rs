//! Random correlation tokens for the authorization round trip.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::error::EntropyError;

/// Number of random bytes behind each state and nonce value.
pub const TOKEN_BYTES: usize = 16;

/// Number of random bytes behind a PKCE code verifier (43 encoded chars).
pub const VERIFIER_BYTES: usize = 32;

/// Generates a URL-safe, unpadded base64 token from `byte_len` bytes of OS randomness.
///
/// # Errors
///
/// Returns `EntropyError` if the operating system's secure random source
/// cannot be read. There is no fallback source.
pub fn generate(byte_len: usize) -> Result<String, EntropyError> {
    let mut bytes = vec![0u8; byte_len];
    getrandom::fill(&mut bytes).map_err(|e| EntropyError {
        details: e.to_string(),
    })?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixteen_bytes_encode_to_22_chars() {
        let token = generate(TOKEN_BYTES).expect("entropy");
        assert_eq!(token.len(), 22);
    }

    #[test]
    fn token_is_url_safe() {
        let token = generate(32).expect("entropy");
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "token should be URL-safe: {token}"
        );
    }

    #[test]
    fn verifier_length_is_within_pkce_bounds() {
        let verifier = generate(VERIFIER_BYTES).expect("entropy");
        assert_eq!(verifier.len(), 43);
    }

    #[test]
    fn tokens_differ() {
        let a = generate(TOKEN_BYTES).expect("entropy");
        let b = generate(TOKEN_BYTES).expect("entropy");
        assert_ne!(a, b);
    }

    #[test]
    fn token_decodes_back_to_requested_length() {
        let token = generate(TOKEN_BYTES).expect("entropy");
        let bytes = URL_SAFE_NO_PAD.decode(token).expect("valid base64url");
        assert_eq!(bytes.len(), TOKEN_BYTES);
    }
}
