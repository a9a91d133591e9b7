//! HMAC access tokens for the chat service.
//!
//! The web front end issues a token at login; this service only verifies it
//! and extracts the embedded user identity. Binary layout:
//! `[8-byte BE expiry][user id utf-8][32-byte HMAC-SHA256]`, hex-encoded
//! for transport.

use crate::error::{ChatError, ChatResult};
use ring::hmac;

const EXPIRY_LEN: usize = 8;
const TAG_LEN: usize = 32;

/// Issue a token embedding `user_id`, valid for `ttl_secs`.
pub fn issue_token(secret: &[u8], user_id: &str, ttl_secs: u64) -> String {
    sign_at(secret, user_id, unix_now() + ttl_secs)
}

/// Verify a token and return the embedded user identity.
///
/// The signature is checked before the expiry so that a tampered expiry
/// fails as `InvalidSignature`, not `TokenExpired`.
pub fn verify_token(secret: &[u8], token: &str) -> ChatResult<String> {
    let raw = hex::decode(token).map_err(|e| ChatError::MalformedToken(e.to_string()))?;
    if raw.len() <= EXPIRY_LEN + TAG_LEN {
        return Err(ChatError::MalformedToken(format!(
            "token too short: {} bytes",
            raw.len()
        )));
    }

    let (signed, tag) = raw.split_at(raw.len() - TAG_LEN);
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    hmac::verify(&key, signed, tag).map_err(|_| ChatError::InvalidSignature)?;

    let expiry_bytes: [u8; 8] = signed[..EXPIRY_LEN].try_into().unwrap();
    let expiry = u64::from_be_bytes(expiry_bytes);
    if unix_now() > expiry {
        return Err(ChatError::TokenExpired);
    }

    let user_id = std::str::from_utf8(&signed[EXPIRY_LEN..])
        .map_err(|_| ChatError::MalformedToken("user id is not utf-8".into()))?;
    Ok(user_id.to_string())
}

/// Generate a random signing secret (32 bytes).
pub fn generate_secret() -> Vec<u8> {
    use ring::rand::{SecureRandom, SystemRandom};
    let rng = SystemRandom::new();
    let mut secret = vec![0u8; 32];
    rng.fill(&mut secret).expect("RNG failure");
    secret
}

fn sign_at(secret: &[u8], user_id: &str, expiry: u64) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    let mut data = Vec::with_capacity(EXPIRY_LEN + user_id.len() + TAG_LEN);
    data.extend_from_slice(&expiry.to_be_bytes());
    data.extend_from_slice(user_id.as_bytes());

    let tag = hmac::sign(&key, &data);
    data.extend_from_slice(tag.as_ref());
    hex::encode(data)
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_and_verify() {
        let secret = generate_secret();
        let token = issue_token(&secret, "user-1", 3600);
        assert_eq!(verify_token(&secret, &token).unwrap(), "user-1");
    }

    #[test]
    fn wrong_secret() {
        let secret1 = generate_secret();
        let secret2 = generate_secret();
        let token = issue_token(&secret1, "user-1", 3600);
        assert!(matches!(
            verify_token(&secret2, &token),
            Err(ChatError::InvalidSignature)
        ));
    }

    #[test]
    fn tampered_payload() {
        let secret = generate_secret();
        let token = issue_token(&secret, "user-1", 3600);
        // Flip a nibble inside the signed region.
        let mut chars: Vec<char> = token.chars().collect();
        chars[18] = if chars[18] == '0' { '1' } else { '0' };
        let tampered: String = chars.into_iter().collect();
        assert!(matches!(
            verify_token(&secret, &tampered),
            Err(ChatError::InvalidSignature)
        ));
    }

    #[test]
    fn expired_token() {
        let secret = generate_secret();
        let token = sign_at(&secret, "user-1", unix_now() - 10);
        assert!(matches!(
            verify_token(&secret, &token),
            Err(ChatError::TokenExpired)
        ));
    }

    #[test]
    fn malformed_tokens() {
        let secret = generate_secret();
        assert!(matches!(
            verify_token(&secret, "not hex!"),
            Err(ChatError::MalformedToken(_))
        ));
        assert!(matches!(
            verify_token(&secret, "deadbeef"),
            Err(ChatError::MalformedToken(_))
        ));
    }
}
