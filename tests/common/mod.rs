//! Common test utilities for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use moodhug_identity::auth::{
    AuthService, InMemoryRefreshTokenRepository, InMemorySocialAuthRepository,
    InMemoryUserRepository, InMemoryVerificationTokenRepository, SocialProvider,
    SocialProviderConfig, StubProviderGateway,
};
use moodhug_identity::config::AuthConfig;
use moodhug_identity::http_server::{app_router, AppState};
use tower::ServiceExt;

pub use moodhug_identity::auth::email::testing::CapturingEmailSender;

/// Config with test secrets, reference lifetimes, and Google configured
pub fn test_config() -> AuthConfig {
    let mut config = AuthConfig::new("access-secret-for-tests", "refresh-secret-for-tests")
        .expect("test config is valid");
    config.providers.push(SocialProviderConfig::new(
        SocialProvider::Google,
        "google-client-id".to_string(),
        "https://app.moodhug.example/callback".to_string(),
    ));
    config
}

/// Service wired with in-memory repositories and stub collaborators
pub fn test_service() -> (AuthService, Arc<CapturingEmailSender>) {
    let email = Arc::new(CapturingEmailSender::new());
    let service = AuthService::new(
        &test_config(),
        Arc::new(InMemoryUserRepository::new()),
        Arc::new(InMemoryRefreshTokenRepository::new()),
        Arc::new(InMemoryVerificationTokenRepository::new()),
        Arc::new(InMemorySocialAuthRepository::new()),
        Arc::new(StubProviderGateway),
        email.clone(),
    );
    (service, email)
}

/// Full application router over a fresh test service
pub fn test_app() -> (Router, Arc<CapturingEmailSender>) {
    let (service, email) = test_service();
    let router = app_router(Arc::new(AppState { service }));
    (router, email)
}

/// Send a JSON POST and return status plus parsed body
pub async fn post_json(
    router: &Router,
    path: &str,
    body: serde_json::Value,
    bearer: Option<&str>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = builder.body(Body::from(body.to_string())).unwrap();
    send(router, request).await
}

/// Send a GET and return status plus parsed body
pub async fn get_json(
    router: &Router,
    path: &str,
    bearer: Option<&str>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method("GET").uri(path);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = builder.body(Body::empty()).unwrap();
    send(router, request).await
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}
