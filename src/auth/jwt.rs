/// JWT Token Codec
///
/// Issues and verifies HS256-signed access and refresh tokens. The signing
/// secret is symmetric and shared by issuer and verifier.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::auth::claims::{AccessClaims, RefreshClaims, TokenClaims, TokenKind};
use crate::auth::refresh_token::generate_jti;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError, ConfigError};

const MIN_SECRET_LENGTH: usize = 32;

/// Why a token was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    InvalidSignature,
    Expired,
    WrongKind { expected: TokenKind, found: TokenKind },
    Malformed,
    Encoding(String),
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::InvalidSignature => write!(f, "invalid token signature"),
            TokenError::Expired => write!(f, "token has expired"),
            TokenError::WrongKind { expected, found } => {
                write!(f, "expected {} token, found {} token", expected, found)
            }
            TokenError::Malformed => write!(f, "malformed token"),
            TokenError::Encoding(msg) => write!(f, "token encoding failed: {}", msg),
        }
    }
}

impl std::error::Error for TokenError {}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AppError::Auth(AuthError::TokenExpired),
            TokenError::Encoding(msg) => AppError::Internal(msg),
            _ => AppError::Auth(AuthError::TokenInvalid),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                TokenError::InvalidSignature
            }
            _ => TokenError::Malformed,
        }
    }
}

/// A freshly minted refresh token plus what the store needs to index it
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

/// Signs and verifies both token kinds with one deployment secret
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenCodec {
    /// Build a codec from settings. Secrets shorter than 32 bytes are refused.
    pub fn from_settings(config: &JwtSettings) -> Result<Self, AppError> {
        if config.secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::InvalidValue(format!(
                "jwt.secret must be at least {} bytes",
                MIN_SECRET_LENGTH
            ))
            .into());
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&config.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.leeway = 0;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
            access_ttl: Duration::seconds(config.access_token_expiry),
            refresh_ttl: Duration::seconds(config.refresh_token_expiry),
        })
    }

    /// Access token lifetime in seconds
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    pub fn issue_access(&self, user_id: i64, email: &str) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: user_id.to_string(),
            email: email.to_string(),
            exp: (now + self.access_ttl).timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
        };

        self.sign(&TokenClaims::Access(claims))
    }

    /// Mint a refresh token with a fresh `jti`
    pub fn issue_refresh(&self, user_id: i64) -> Result<IssuedRefreshToken, TokenError> {
        let now = Utc::now();
        let expires_at = now + self.refresh_ttl;
        let jti = generate_jti();
        let claims = RefreshClaims {
            sub: user_id.to_string(),
            jti: jti.clone(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
        };

        let token = self.sign(&TokenClaims::Refresh(claims))?;
        Ok(IssuedRefreshToken {
            token,
            jti,
            expires_at,
        })
    }

    /// Check signature, expiry, issuer and that the token is of `expected` kind
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<TokenClaims, TokenError> {
        let claims = decode::<TokenClaims>(token, &self.decoding_key, &self.validation)?.claims;

        if claims.kind() != expected {
            return Err(TokenError::WrongKind {
                expected,
                found: claims.kind(),
            });
        }

        Ok(claims)
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        match self.verify(token, TokenKind::Access)? {
            TokenClaims::Access(claims) => Ok(claims),
            TokenClaims::Refresh(_) => Err(TokenError::WrongKind {
                expected: TokenKind::Access,
                found: TokenKind::Refresh,
            }),
        }
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        match self.verify(token, TokenKind::Refresh)? {
            TokenClaims::Refresh(claims) => Ok(claims),
            TokenClaims::Access(_) => Err(TokenError::WrongKind {
                expected: TokenKind::Refresh,
                found: TokenKind::Access,
            }),
        }
    }

    fn sign(&self, claims: &TokenClaims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }
}
