/// Password Hashing and Verification
///
/// bcrypt with a configurable cost. Hashes are salted, so hashing the same
/// password twice yields different strings that both verify.

use bcrypt::{hash, verify};

use crate::error::{AppError, AuthError};

/// Lowest cost bcrypt accepts. Test suites hash at this cost.
pub const MIN_COST: u32 = 4;
const MAX_COST: u32 = 31;

#[derive(Debug, Clone, PartialEq)]
pub enum PasswordError {
    Hashing(String),
    Mismatch,
}

impl std::fmt::Display for PasswordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PasswordError::Hashing(msg) => write!(f, "Password hashing failed: {}", msg),
            PasswordError::Mismatch => write!(f, "Password does not match"),
        }
    }
}

impl std::error::Error for PasswordError {}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::Mismatch => AppError::Auth(AuthError::InvalidCredentials),
            PasswordError::Hashing(msg) => AppError::Internal(msg),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PasswordHasher {
    cost: u32,
    /// Verified against when the account does not exist, so unknown emails
    /// take as long as wrong passwords.
    dummy_hash: String,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Result<Self, PasswordError> {
        if !(MIN_COST..=MAX_COST).contains(&cost) {
            return Err(PasswordError::Hashing(format!(
                "bcrypt cost must be between {} and {}, got {}",
                MIN_COST, MAX_COST, cost
            )));
        }

        let dummy_hash = hash("dummy-password-for-timing", cost)
            .map_err(|e| PasswordError::Hashing(e.to_string()))?;

        Ok(Self { cost, dummy_hash })
    }

    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        hash(password, self.cost).map_err(|e| PasswordError::Hashing(e.to_string()))
    }

    /// `Ok(())` if `password` matches `hash`, `Err(Mismatch)` otherwise
    pub fn verify(&self, hash: &str, password: &str) -> Result<(), PasswordError> {
        match verify(password, hash) {
            Ok(true) => Ok(()),
            Ok(false) => Err(PasswordError::Mismatch),
            Err(e) => Err(PasswordError::Hashing(e.to_string())),
        }
    }

    /// Burn one verification's worth of work. Always a mismatch.
    pub fn verify_dummy(&self, password: &str) -> PasswordError {
        let _ = verify(password, &self.dummy_hash);
        PasswordError::Mismatch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(MIN_COST).expect("Failed to build hasher")
    }

    #[test]
    fn test_cost_out_of_range_is_rejected() {
        assert!(matches!(PasswordHasher::new(3), Err(PasswordError::Hashing(_))));
        assert!(matches!(PasswordHasher::new(32), Err(PasswordError::Hashing(_))));
    }

    #[test]
    fn test_hash_password() {
        let password = "ValidPassword123";
        let hash = hasher().hash(password).expect("Failed to hash password");

        assert_ne!(password, hash);
        assert!(hash.starts_with("$2"));
    }

    #[test]
    fn test_hash_is_salted() {
        let hasher = hasher();
        let first = hasher.hash("ValidPassword123").unwrap();
        let second = hasher.hash("ValidPassword123").unwrap();

        assert_ne!(first, second);
        assert!(hasher.verify(&first, "ValidPassword123").is_ok());
        assert!(hasher.verify(&second, "ValidPassword123").is_ok());
    }

    #[test]
    fn test_verify_password() {
        let hasher = hasher();
        let hash = hasher.hash("ValidPassword123").unwrap();

        assert_eq!(hasher.verify(&hash, "ValidPassword123"), Ok(()));
    }

    #[test]
    fn test_verify_wrong_password() {
        let hasher = hasher();
        let hash = hasher.hash("ValidPassword123").unwrap();

        assert_eq!(
            hasher.verify(&hash, "ValidPassword123x"),
            Err(PasswordError::Mismatch)
        );
    }

    #[test]
    fn test_verify_against_corrupt_hash() {
        assert!(matches!(
            hasher().verify("not-a-bcrypt-hash", "ValidPassword123"),
            Err(PasswordError::Hashing(_))
        ));
    }

    #[test]
    fn test_dummy_verification_never_matches() {
        let hasher = hasher();

        assert_eq!(hasher.verify_dummy("dummy-password-for-timing"), PasswordError::Mismatch);
    }

    #[test]
    fn test_mismatch_maps_to_invalid_credentials() {
        assert!(matches!(
            AppError::from(PasswordError::Mismatch),
            AppError::Auth(AuthError::InvalidCredentials)
        ));
    }
}
