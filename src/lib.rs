//! moodhug-identity - Identity and token lifecycle service for MoodHug
//!
//! Establishes caller identity, issues and rotates credentials, and
//! reconciles password, anonymous, and social identities into one
//! durable user record.

pub mod auth;
pub mod config;
pub mod http_server;
