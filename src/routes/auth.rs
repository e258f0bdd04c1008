/// Authentication Routes
///
/// Registration, login, token refresh, logout and profile.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::AuthService;
use crate::error::{AppError, ErrorContext};
use crate::middleware::Identity;
use crate::store::User;

/// Registration / login request
#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

/// Body of refresh and logout requests; refresh tokens never travel in headers
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Public view of a user. Has no password hash field to leak.
#[derive(Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserResponse,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// POST /register
///
/// # Errors
/// - 400: invalid email or weak password
/// - 409: email already registered
pub async fn register(
    form: web::Json<CredentialsRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_registration");

    let user = service
        .register(&form.email, &form.password)
        .await
        .map_err(|e| {
            context.log_error(&e);
            e
        })?;

    Ok(HttpResponse::Created().json(UserResponse::from(user)))
}

/// POST /login
///
/// Same 401 for unknown email and wrong password.
pub async fn login(
    form: web::Json<CredentialsRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let outcome = service.login(&form.email, &form.password).await?;

    Ok(HttpResponse::Ok().json(LoginResponse {
        access_token: outcome.tokens.access_token,
        refresh_token: outcome.tokens.refresh_token,
        token_type: outcome.tokens.token_type,
        expires_in: outcome.tokens.expires_in,
        user: outcome.user.into(),
    }))
}

/// POST /refresh
///
/// Token rotation: the presented refresh token is consumed and a new pair is
/// returned. Replaying a consumed token revokes every session of its owner.
pub async fn refresh(
    form: web::Json<RefreshRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let tokens = service.refresh(&form.refresh_token).await?;

    Ok(HttpResponse::Ok().json(tokens))
}

/// POST /logout
///
/// **Requires** `Authorization: Bearer <access_token>`.
pub async fn logout(
    identity: web::ReqData<Identity>,
    form: web::Json<RefreshRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("logout").with_user_id(identity.user_id.to_string());

    service
        .logout(&identity, &form.refresh_token)
        .await
        .map_err(|e| {
            context.log_error(&e);
            e
        })?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Logged out successfully".to_string(),
    }))
}

/// POST /logout-all
///
/// **Requires** `Authorization: Bearer <access_token>`.
pub async fn logout_all(
    identity: web::ReqData<Identity>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    service.logout_all(identity.user_id).await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Logged out from all devices".to_string(),
    }))
}

/// GET /profile
///
/// **Requires** `Authorization: Bearer <access_token>`.
///
/// # Errors
/// - 401: missing or invalid token (handled by middleware)
/// - 404: account no longer exists
pub async fn profile(
    identity: web::ReqData<Identity>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let user = service.profile(identity.user_id).await?;

    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}
