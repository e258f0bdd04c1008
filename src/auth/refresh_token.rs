/// Refresh Token Helpers
///
/// Refresh tokens are signed JWTs; the store only ever sees their SHA-256
/// digest, indexed by the token's `jti`.

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};

/// 32 base62 characters, ~190 bits of entropy
const JTI_LENGTH: usize = 32;

/// Generate a collision-resistant token identifier
pub fn generate_jti() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(JTI_LENGTH)
        .map(char::from)
        .collect()
}

/// One-way digest of a raw token for storage.
///
/// Deterministic so the digest computed at redemption time matches the one
/// persisted at issuance. Never store plaintext tokens in the database.
pub fn digest_for_storage(raw_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_jti() {
        let jti = generate_jti();

        assert_eq!(jti.len(), JTI_LENGTH);
        assert!(jti.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_jtis_do_not_repeat() {
        let jtis: std::collections::HashSet<String> = (0..1000).map(|_| generate_jti()).collect();
        assert_eq!(jtis.len(), 1000);
    }

    #[test]
    fn test_digest_is_stable() {
        let token = "header.payload.signature";
        let first = digest_for_storage(token);

        assert_eq!(first, digest_for_storage(token));
        assert_ne!(first, token);
        // SHA-256 hex
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn test_digest_changes_with_any_character() {
        let token = "header.payload.signature";
        let original = digest_for_storage(token);

        for i in 0..token.len() {
            let mut altered = token.as_bytes().to_vec();
            altered[i] = if altered[i] == b'x' { b'y' } else { b'x' };
            let altered = String::from_utf8(altered).unwrap();

            assert_ne!(digest_for_storage(&altered), original, "position {}", i);
        }
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            digest_for_storage("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
