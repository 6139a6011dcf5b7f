//! HTTP server runner for the MoodHug identity service.
//! Binds on port 8087 (or `MOODHUG_LISTEN_ADDR`).

use std::sync::Arc;

use moodhug_identity::auth::{
    AuthService, InMemoryRefreshTokenRepository, InMemorySocialAuthRepository,
    InMemoryUserRepository, InMemoryVerificationTokenRepository, LogEmailSender,
    StubProviderGateway,
};
use moodhug_identity::config::AuthConfig;
use moodhug_identity::http_server::HttpServer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match AuthConfig::from_env() {
        Ok(config) => config,
        Err(errors) => {
            for error in &errors {
                eprintln!("{}", error);
            }
            std::process::exit(1);
        }
    };

    let service = AuthService::new(
        &config,
        Arc::new(InMemoryUserRepository::new()),
        Arc::new(InMemoryRefreshTokenRepository::new()),
        Arc::new(InMemoryVerificationTokenRepository::new()),
        Arc::new(InMemorySocialAuthRepository::new()),
        Arc::new(StubProviderGateway),
        Arc::new(LogEmailSender),
    );

    let addr = std::env::var("MOODHUG_LISTEN_ADDR").unwrap_or_else(|_| "127.0.0.1:8087".to_string());
    let addr = match addr.parse() {
        Ok(addr) => addr,
        Err(_) => {
            eprintln!("MOODHUG_LISTEN_ADDR must be host:port, got '{}'", addr);
            std::process::exit(1);
        }
    };

    if let Err(e) = HttpServer::new(service, addr).start().await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
