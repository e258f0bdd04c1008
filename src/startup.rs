use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use sqlx::PgPool;
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::{AuthService, PasswordHasher, TokenCodec};
use crate::configuration::Settings;
use crate::error::AppError;
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{health_check, login, logout, logout_all, profile, refresh, register};
use crate::store::{PgTokenStore, PgUserStore};

/// Wire the Postgres-backed service from settings.
pub fn build_service(configuration: &Settings, pool: PgPool) -> Result<AuthService, AppError> {
    let codec = TokenCodec::from_settings(&configuration.jwt)?;
    let hasher = PasswordHasher::new(configuration.password.cost)?;

    Ok(AuthService::new(
        Arc::new(PgUserStore::new(pool.clone())),
        Arc::new(PgTokenStore::new(pool)),
        Arc::new(codec),
        Arc::new(hasher),
        configuration.database.timeout(),
    ))
}

pub fn run(listener: TcpListener, service: AuthService) -> Result<Server, std::io::Error> {
    let codec = service.codec();
    let service = web::Data::new(service);

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(Logger::default())
            .wrap(LoggerMiddleware)

            .app_data(service.clone())

            // Public routes
            .route("/health_check", web::get().to(health_check))
            .route("/register", web::post().to(register))
            .route("/login", web::post().to(login))
            .route("/refresh", web::post().to(refresh))

            // Protected routes (require an access token)
            .service(
                web::resource("/logout")
                    .wrap(JwtMiddleware::new(codec.clone()))
                    .route(web::post().to(logout)),
            )
            .service(
                web::resource("/logout-all")
                    .wrap(JwtMiddleware::new(codec.clone()))
                    .route(web::post().to(logout_all)),
            )
            .service(
                web::resource("/profile")
                    .wrap(JwtMiddleware::new(codec.clone()))
                    .route(web::get().to(profile)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
