/// JWT Claims structures
///
/// Each token kind has its own typed payload. On the wire the kind is the
/// `type` field of the JSON claims; decoding goes through [`TokenClaims`],
/// so a foreign or malformed payload fails deserialization instead of
/// panicking on a missing field.

use serde::{Deserialize, Serialize};

use crate::auth::jwt::TokenError;

/// Discriminates short-lived access tokens from long-lived refresh tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Access => write!(f, "access"),
            TokenKind::Refresh => write!(f, "refresh"),
        }
    }
}

/// Claims of an access token. Validity rests on signature and expiry alone.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AccessClaims {
    /// Subject (numeric user ID as string)
    pub sub: String,
    /// User email
    pub email: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Issuer
    pub iss: String,
}

/// Claims of a refresh token.
///
/// These are a capability only: redemption also needs a live store record
/// under the same `jti`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RefreshClaims {
    pub sub: String,
    /// Unique token id, the store lookup key
    pub jti: String,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
}

/// Wire envelope for both kinds, tagged by `type`
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TokenClaims {
    Access(AccessClaims),
    Refresh(RefreshClaims),
}

impl TokenClaims {
    pub fn kind(&self) -> TokenKind {
        match self {
            TokenClaims::Access(_) => TokenKind::Access,
            TokenClaims::Refresh(_) => TokenKind::Refresh,
        }
    }
}

fn parse_subject(sub: &str) -> Result<i64, TokenError> {
    sub.parse::<i64>().map_err(|_| TokenError::Malformed)
}

impl AccessClaims {
    /// Extract the numeric user ID from `sub`
    pub fn user_id(&self) -> Result<i64, TokenError> {
        parse_subject(&self.sub)
    }
}

impl RefreshClaims {
    pub fn user_id(&self) -> Result<i64, TokenError> {
        parse_subject(&self.sub)
    }
}
