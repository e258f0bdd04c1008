/// Authentication module
///
/// Token codec, password hashing, refresh-token digests and the
/// authentication flows built on top of them.

mod claims;
mod jwt;
mod password;
mod refresh_token;
mod service;

pub use claims::{AccessClaims, RefreshClaims, TokenClaims, TokenKind};
pub use jwt::{IssuedRefreshToken, TokenCodec, TokenError};
pub use password::{PasswordError, PasswordHasher, MIN_COST};
pub use refresh_token::{digest_for_storage, generate_jti};
pub use service::{AuthService, LoginOutcome, TokenPair};
