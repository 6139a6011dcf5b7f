//! # Identity Routes
//!
//! One route per service-boundary operation. Payload shapes are the
//! external contract: token-bearing responses always carry
//! `{accessToken, refreshToken, user}` as a single payload.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::service::{
    AuthPayload, ConvertAnonymousInput, LoginInput, RegisterInput, TokenVerification,
};
use crate::auth::{AuthContext, AuthError, SocialProvider, User};

use super::AppState;

// ==================
// Error Mapping
// ==================

/// Wire shape for failed requests
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

/// Response-side wrapper for [`AuthError`]
pub struct ApiError(pub AuthError);

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let error = if self.0.is_public() {
            self.0.to_string()
        } else {
            // Infrastructure details stay in the logs
            tracing::error!(error = %self.0, "request failed");
            "Internal server error".to_string()
        };
        (
            status,
            Json(ErrorResponse {
                error,
                code: self.0.code(),
            }),
        )
            .into_response()
    }
}

// ==================
// Auth Context Extractor
// ==================

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthContext {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        Ok(AuthContext::resolve(state.service.jwt(), header))
    }
}

// ==================
// Request/Response Shapes
// ==================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResetPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnonymousLoginRequest {
    pub nickname: Option<String>,
    pub avatar_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialLoginRequest {
    pub provider: String,
    pub code: String,
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialUrlQuery {
    pub provider: String,
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyTokenRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    fn ok() -> Json<Self> {
        Json(Self { success: true })
    }
}

#[derive(Debug, Serialize)]
pub struct SocialUrlResponse {
    pub url: String,
}

// ==================
// Handlers
// ==================

async fn register(
    State(state): State<Arc<AppState>>,
    Json(input): Json<RegisterInput>,
) -> Result<Json<AuthPayload>, ApiError> {
    Ok(Json(state.service.register(input)?))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(input): Json<LoginInput>,
) -> Result<Json<AuthPayload>, ApiError> {
    Ok(Json(state.service.login(input)?))
}

async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<AuthPayload>, ApiError> {
    Ok(Json(state.service.refresh(&request.refresh_token)?))
}

async fn logout(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.service.logout(&ctx)?;
    Ok(SuccessResponse::ok())
}

async fn request_reset_password(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RequestResetPasswordRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.service.request_password_reset(&request.email)?;
    Ok(SuccessResponse::ok())
}

async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state
        .service
        .reset_password(&request.token, &request.new_password)?;
    Ok(SuccessResponse::ok())
}

async fn change_password(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state
        .service
        .change_password(&ctx, &request.current_password, &request.new_password)?;
    Ok(SuccessResponse::ok())
}

async fn verify_email(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerifyEmailRequest>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.service.verify_email(&request.token)?))
}

async fn anonymous_login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnonymousLoginRequest>,
) -> Result<Json<AuthPayload>, ApiError> {
    Ok(Json(
        state
            .service
            .anonymous_login(request.nickname, request.avatar_id)?,
    ))
}

async fn convert_anonymous(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(input): Json<ConvertAnonymousInput>,
) -> Result<Json<AuthPayload>, ApiError> {
    Ok(Json(state.service.convert_anonymous(&ctx, input)?))
}

async fn social_login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SocialLoginRequest>,
) -> Result<Json<AuthPayload>, ApiError> {
    let provider: SocialProvider = request.provider.parse()?;
    Ok(Json(state.service.social_login(
        provider,
        &request.code,
        request.redirect_uri.as_deref(),
    )?))
}

async fn social_auth_url(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SocialUrlQuery>,
) -> Result<Json<SocialUrlResponse>, ApiError> {
    let provider: SocialProvider = query.provider.parse()?;
    let url = state
        .service
        .social_auth_url(provider, query.redirect_uri.as_deref())?;
    Ok(Json(SocialUrlResponse { url }))
}

async fn verify_token(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerifyTokenRequest>,
) -> Json<TokenVerification> {
    Json(state.service.verify_token(&request.token))
}

async fn me(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.service.me(&ctx)?))
}

async fn user_by_id(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.service.user_by_id(id)?))
}

async fn user_by_email(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.service.user_by_email(&email)?))
}

async fn user_by_username(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.service.user_by_username(&username)?))
}

// ==================
// Router
// ==================

/// Identity service routes
pub fn auth_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/request-reset-password", post(request_reset_password))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/change-password", post(change_password))
        .route("/auth/verify-email", post(verify_email))
        .route("/auth/anonymous", post(anonymous_login))
        .route("/auth/convert", post(convert_anonymous))
        .route("/auth/social/login", post(social_login))
        .route("/auth/social/url", get(social_auth_url))
        .route("/auth/verify-token", post(verify_token))
        .route("/auth/me", get(me))
        .route("/users/:id", get(user_by_id))
        .route("/users/by-email/:email", get(user_by_email))
        .route("/users/by-username/:username", get(user_by_username))
        .with_state(state)
}
