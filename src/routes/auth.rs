use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, header},
    routing::{get, post},
};

use crate::{
    dto::auth::{
        OtpIssuedResponse, OtpLoginRequest, PasswordLoginRequest, RefreshRequest,
        RegisterOtpRequest, RegisterRequest, RegisteredUserResponse, TokenResponse,
    },
    dto::users::CreateUserRequest,
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::User,
    response::ApiResponse,
    services::{auth_service, user_service},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register/request-otp", post(register_request_otp))
        .route("/register", post(register))
        .route("/register/admin", post(register_admin))
        .route("/request-otp", post(request_otp))
        .route("/login", post(login))
        .route("/login/password", post(login_password))
        .route("/refresh", post(refresh))
        .route("/logout", get(logout))
        .route("/me", get(me))
}

#[utoipa::path(
    post,
    path = "/api/auth/register/request-otp",
    request_body = RegisterOtpRequest,
    responses(
        (status = 200, description = "Registration OTP issued", body = ApiResponse<OtpIssuedResponse>),
        (status = 409, description = "Phone number already registered"),
    ),
    tag = "Auth"
)]
pub async fn register_request_otp(
    State(state): State<AppState>,
    Json(payload): Json<RegisterOtpRequest>,
) -> AppResult<Json<ApiResponse<OtpIssuedResponse>>> {
    let resp = auth_service::request_register_otp(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Registration completed", body = ApiResponse<RegisteredUserResponse>),
        (status = 400, description = "Invalid registration OTP"),
    ),
    tag = "Auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<Json<ApiResponse<RegisteredUserResponse>>> {
    let resp = auth_service::register_with_otp(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/auth/register/admin",
    request_body = CreateUserRequest,
    responses(
        (status = 200, description = "User created", body = ApiResponse<User>),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Username taken"),
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn register_admin(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    let resp = user_service::create_user(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/auth/request-otp",
    request_body = RegisterOtpRequest,
    responses(
        (status = 200, description = "Login OTP issued", body = ApiResponse<OtpIssuedResponse>),
        (status = 404, description = "No active user for this phone number"),
    ),
    tag = "Auth"
)]
pub async fn request_otp(
    State(state): State<AppState>,
    Json(payload): Json<RegisterOtpRequest>,
) -> AppResult<Json<ApiResponse<OtpIssuedResponse>>> {
    let resp = auth_service::request_login_otp(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = OtpLoginRequest,
    responses(
        (status = 200, description = "Logged in with OTP", body = ApiResponse<TokenResponse>),
        (status = 400, description = "Invalid login OTP"),
    ),
    tag = "Auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<OtpLoginRequest>,
) -> AppResult<Json<ApiResponse<TokenResponse>>> {
    let resp = auth_service::login_with_otp(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/auth/login/password",
    request_body = PasswordLoginRequest,
    responses(
        (status = 200, description = "Logged in", body = ApiResponse<TokenResponse>),
        (status = 401, description = "Incorrect username or password"),
        (status = 403, description = "Inactive user"),
    ),
    tag = "Auth"
)]
pub async fn login_password(
    State(state): State<AppState>,
    Json(payload): Json<PasswordLoginRequest>,
) -> AppResult<Json<ApiResponse<TokenResponse>>> {
    let resp = auth_service::password_login(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = ApiResponse<TokenResponse>),
        (status = 400, description = "Refresh token revoked or unknown"),
    ),
    tag = "Auth"
)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Json<ApiResponse<TokenResponse>>> {
    let resp = auth_service::refresh_tokens(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Access token revoked", body = ApiResponse<serde_json::Value>),
        (status = 401, description = "Invalid or expired token"),
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".into()))?;

    let resp = auth_service::logout(&state, auth_header).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current user", body = ApiResponse<User>),
        (status = 401, description = "Not authenticated"),
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<User>>> {
    let resp = auth_service::me(&state, &user).await?;
    Ok(Json(resp))
}
