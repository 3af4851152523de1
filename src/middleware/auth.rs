use axum::{extract::FromRequestParts, http::header};
use uuid::Uuid;

use crate::{
    cache::blacklist_key,
    error::AppError,
    models::UserRole,
    security::{self, SUB_ACCESS},
    state::AppState,
};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub roles: Vec<UserRole>,
}

/// Caller identity when the request may be anonymous (cart and checkout).
#[derive(Debug, Clone)]
pub struct OptionalAuthUser(pub Option<AuthUser>);

pub fn ensure_admin(user: &AuthUser) -> Result<(), AppError> {
    if user.roles.iter().any(UserRole::is_admin) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

pub fn bearer_token(auth_str: &str) -> Result<&str, AppError> {
    if !auth_str.starts_with("Bearer ") {
        return Err(AppError::Unauthorized(
            "Invalid Authorization scheme".into(),
        ));
    }
    Ok(auth_str.trim_start_matches("Bearer ").trim())
}

async fn authenticate(state: &AppState, auth_str: &str) -> Result<AuthUser, AppError> {
    let token = bearer_token(auth_str)?;

    let claims = security::decode_token(&state.config.jwt_secret, token)?;
    if claims.sub != SUB_ACCESS {
        return Err(AppError::Unauthorized("Invalid token".into()));
    }

    let revoked = state
        .cache
        .get(&blacklist_key(token))
        .await
        .map_err(AppError::Internal)?;
    if revoked.is_some() {
        return Err(AppError::Unauthorized("Expired token".into()));
    }

    let user_id = security::user_id_from_claims(&claims)?;
    Ok(AuthUser {
        user_id,
        roles: claims.roles,
    })
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;

        let auth_str = auth_header
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid Authorization header".into()))?;

        authenticate(state, auth_str).await
    }
}

impl FromRequestParts<AppState> for OptionalAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(auth_header) = parts.headers.get(header::AUTHORIZATION) else {
            return Ok(OptionalAuthUser(None));
        };

        let auth_str = auth_header
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid Authorization header".into()))?;

        let user = authenticate(state, auth_str).await?;
        Ok(OptionalAuthUser(Some(user)))
    }
}
