//! Integration tests for the liveness endpoint

use auth_service::auth::{AuthService, PasswordHasher, TokenCodec, MIN_COST};
use auth_service::configuration::JwtSettings;
use auth_service::startup::run;
use auth_service::store::{MemoryTokenStore, MemoryUserStore};
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

fn spawn_app() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let codec = TokenCodec::from_settings(&JwtSettings {
        secret: "health-check-secret-with-enough-bytes".to_string(),
        access_token_expiry: 900,
        refresh_token_expiry: 604800,
        issuer: "auth_service".to_string(),
    })
    .unwrap();
    let service = AuthService::new(
        Arc::new(MemoryUserStore::new()),
        Arc::new(MemoryTokenStore::new()),
        Arc::new(codec),
        Arc::new(PasswordHasher::new(MIN_COST).unwrap()),
        Duration::from_secs(2),
    );

    let server = run(listener, service).expect("Failed to create server");

    let _ = tokio::spawn(async move {
        let _ = server.await;
    });

    format!("http://127.0.0.1:{}", port)
}

#[tokio::test]
async fn health_check_works() {
    let addr = spawn_app();

    let response = reqwest::Client::new()
        .get(&format!("{}/health_check", addr))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn health_check_needs_no_token() {
    let addr = spawn_app();

    let response = reqwest::Client::new()
        .get(&format!("{}/health_check", addr))
        .header("Authorization", "Bearer garbage")
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(200, response.status().as_u16());
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let addr = spawn_app();

    let response = reqwest::Client::new()
        .get(&format!("{}/does-not-exist", addr))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(404, response.status().as_u16());
}
