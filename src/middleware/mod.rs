/// Middleware module
///
/// Request gate for routes that require an access token.

mod jwt_middleware;

pub use jwt_middleware::{authenticate, Identity, JwtMiddleware};
