use chrono::Utc;
use rand::Rng;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    cache::blacklist_key,
    dto::auth::{
        OtpIssuedResponse, OtpLoginRequest, PasswordLoginRequest, RefreshRequest,
        RegisterOtpRequest, RegisterRequest, RegisteredUserResponse, TokenResponse,
    },
    entity::{
        AuthTokens, SoftDeleteEntity, Users,
        auth_tokens::{self, Column as TokenCol, TokenType},
        users::{self, Column as UserCol},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, bearer_token},
    models::{User, UserRole},
    response::{ApiResponse, Meta},
    security::{self, SUB_ACCESS, SUB_REFRESH},
    services::user_service::{roles_from_json, user_from_entity},
    state::AppState,
};

/// Placeholder hash carried by accounts created through the OTP registration
/// flow; they have no usable password until one is set explicitly.
const OTP_REGISTER_PASSWORD: &str = "otp-register";

fn generate_otp_code() -> String {
    rand::thread_rng().gen_range(100_000u32..=999_999).to_string()
}

fn register_token(phone_number: &str, otp_code: &str) -> String {
    format!("register:{phone_number}:{otp_code}")
}

fn login_token(phone_number: &str, otp_code: &str) -> String {
    format!("login:{phone_number}:{otp_code}")
}

fn validate_phone(phone_number: &str) -> AppResult<()> {
    let len = phone_number.trim().len();
    if !(8..=20).contains(&len) {
        return Err(AppError::Validation(
            "phone_number must be between 8 and 20 characters".into(),
        ));
    }
    Ok(())
}

async fn find_user_by_phone<C: ConnectionTrait>(
    conn: &C,
    phone_number: &str,
) -> AppResult<Option<users::Model>> {
    let user = Users::find_active()
        .filter(UserCol::PhoneNumber.eq(phone_number))
        .one(conn)
        .await?;
    Ok(user)
}

async fn insert_auth_token<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    token: String,
    token_type: TokenType,
) -> AppResult<auth_tokens::Model> {
    let row = auth_tokens::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        token: Set(token),
        token_type: Set(token_type),
        is_used: Set(false),
        is_deleted: Set(None),
        created: NotSet,
        modified: NotSet,
    }
    .insert(conn)
    .await?;
    Ok(row)
}

/// OTP validation always picks the most recently issued unused token for the
/// phone/code pair; a token is consumed at most once.
async fn consume_token<C: ConnectionTrait>(
    conn: &C,
    token: &str,
    token_type: TokenType,
) -> AppResult<Option<auth_tokens::Model>> {
    let row = AuthTokens::find_active()
        .filter(TokenCol::Token.eq(token))
        .filter(TokenCol::TokenType.eq(token_type))
        .filter(TokenCol::IsUsed.eq(false))
        .order_by_desc(TokenCol::Created)
        .one(conn)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut active: auth_tokens::ActiveModel = row.into();
    active.is_used = Set(true);
    active.modified = Set(Utc::now().into());
    let consumed = active.update(conn).await?;
    Ok(Some(consumed))
}

pub async fn request_register_otp(
    state: &AppState,
    payload: RegisterOtpRequest,
) -> AppResult<ApiResponse<OtpIssuedResponse>> {
    let phone_number = payload.phone_number.trim().to_string();
    validate_phone(&phone_number)?;

    let txn = state.orm.begin().await?;

    let existing = find_user_by_phone(&txn, &phone_number).await?;
    if let Some(user) = &existing {
        if user.is_active {
            return Err(AppError::AlreadyExists(
                "Phone number is already registered".into(),
            ));
        }
    }

    // An inactive placeholder row reserves the phone number until the OTP
    // round-trip completes.
    let user = match existing {
        Some(user) => user,
        None => {
            users::ActiveModel {
                id: Set(Uuid::new_v4()),
                username: Set(phone_number.clone()),
                full_name: Set(None),
                email: Set(None),
                phone_number: Set(phone_number.clone()),
                password_hash: Set(OTP_REGISTER_PASSWORD.into()),
                is_active: Set(false),
                roles: Set(serde_json::json!([UserRole::Consumer])),
                is_deleted: Set(None),
                created: NotSet,
                modified: NotSet,
            }
            .insert(&txn)
            .await?
        }
    };

    let otp_code = generate_otp_code();
    insert_auth_token(
        &txn,
        user.id,
        register_token(&phone_number, &otp_code),
        TokenType::RegisterOtp,
    )
    .await?;

    txn.commit().await?;

    Ok(ApiResponse::success(
        "OTP issued",
        OtpIssuedResponse {
            sent: true,
            otp_code,
        },
        Some(Meta::empty()),
    ))
}

pub async fn register_with_otp(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<RegisteredUserResponse>> {
    let phone_number = payload.phone_number.trim().to_string();
    validate_phone(&phone_number)?;

    let txn = state.orm.begin().await?;

    let token = consume_token(
        &txn,
        &register_token(&phone_number, &payload.otp_code),
        TokenType::RegisterOtp,
    )
    .await?
    .ok_or_else(|| AppError::Validation("Invalid registration OTP".into()))?;

    let user = Users::find_by_id(token.user_id).one(&txn).await?;
    let user = match user {
        Some(u) if u.phone_number == phone_number => u,
        _ => {
            return Err(AppError::Validation(
                "Phone number mismatch for registration".into(),
            ));
        }
    };

    let user_id = user.id;
    let mut active: users::ActiveModel = user.into();
    active.full_name = Set(payload.full_name);
    active.email = Set(payload.email);
    active.is_active = Set(true);
    active.modified = Set(Utc::now().into());
    active.update(&txn).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user_id),
        "user_register",
        Some("users"),
        Some(serde_json::json!({ "user_id": user_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Registered",
        RegisteredUserResponse {
            user_id,
            phone_number,
        },
        Some(Meta::empty()),
    ))
}

pub async fn request_login_otp(
    state: &AppState,
    payload: RegisterOtpRequest,
) -> AppResult<ApiResponse<OtpIssuedResponse>> {
    let phone_number = payload.phone_number.trim().to_string();
    validate_phone(&phone_number)?;

    let user = find_user_by_phone(&state.orm, &phone_number).await?;
    let user = match user {
        Some(u) if u.is_active => u,
        _ => return Err(AppError::NotFound),
    };

    let otp_code = generate_otp_code();
    insert_auth_token(
        &state.orm,
        user.id,
        login_token(&phone_number, &otp_code),
        TokenType::LoginOtp,
    )
    .await?;

    Ok(ApiResponse::success(
        "OTP issued",
        OtpIssuedResponse {
            sent: true,
            otp_code,
        },
        Some(Meta::empty()),
    ))
}

pub async fn login_with_otp(
    state: &AppState,
    payload: OtpLoginRequest,
) -> AppResult<ApiResponse<TokenResponse>> {
    let phone_number = payload.phone_number.trim().to_string();

    let txn = state.orm.begin().await?;

    let token = consume_token(
        &txn,
        &login_token(&phone_number, &payload.otp_code),
        TokenType::LoginOtp,
    )
    .await?
    .ok_or_else(|| AppError::Validation("Invalid login OTP".into()))?;

    let user = Users::find_by_id(token.user_id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let roles = roles_from_json(&user.roles);
    let access = security::issue_token(
        &state.config.jwt_secret,
        SUB_ACCESS,
        user.id,
        &roles,
        state.config.access_token_minutes,
    )?;
    let refresh = security::issue_token(
        &state.config.jwt_secret,
        SUB_REFRESH,
        user.id,
        &roles,
        state.config.refresh_token_minutes,
    )?;
    insert_auth_token(&txn, user.id, refresh.clone(), TokenType::Refresh).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.id),
        "user_login",
        Some("users"),
        Some(serde_json::json!({ "user_id": user.id, "method": "otp" })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Logged in",
        TokenResponse {
            access_token: access,
            refresh_token: Some(refresh),
            token_type: "bearer".into(),
        },
        Some(Meta::empty()),
    ))
}

/// A refresh token is good for exactly one rotation; replaying a consumed or
/// unknown value fails.
pub async fn refresh_tokens(
    state: &AppState,
    payload: RefreshRequest,
) -> AppResult<ApiResponse<TokenResponse>> {
    let claims = security::decode_token(&state.config.jwt_secret, &payload.refresh_token)
        .map_err(|_| AppError::Validation("Invalid refresh token".into()))?;
    if claims.sub != SUB_REFRESH {
        return Err(AppError::Validation("Invalid refresh token".into()));
    }

    let txn = state.orm.begin().await?;

    let token = consume_token(&txn, &payload.refresh_token, TokenType::Refresh)
        .await?
        .ok_or_else(|| AppError::Validation("Refresh token is revoked or unknown".into()))?;

    let user = Users::find_by_id(token.user_id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let roles = roles_from_json(&user.roles);
    let access = security::issue_token(
        &state.config.jwt_secret,
        SUB_ACCESS,
        user.id,
        &roles,
        state.config.access_token_minutes,
    )?;
    let refresh = security::issue_token(
        &state.config.jwt_secret,
        SUB_REFRESH,
        user.id,
        &roles,
        state.config.refresh_token_minutes,
    )?;
    insert_auth_token(&txn, user.id, refresh.clone(), TokenType::Refresh).await?;

    txn.commit().await?;

    Ok(ApiResponse::success(
        "Refreshed",
        TokenResponse {
            access_token: access,
            refresh_token: Some(refresh),
            token_type: "bearer".into(),
        },
        Some(Meta::empty()),
    ))
}

pub async fn password_login(
    state: &AppState,
    payload: PasswordLoginRequest,
) -> AppResult<ApiResponse<TokenResponse>> {
    let user = Users::find_active()
        .filter(UserCol::Username.eq(payload.username.clone()))
        .one(&state.orm)
        .await?;

    let user = match user {
        Some(u) if security::verify_password(&payload.password, &u.password_hash) => u,
        _ => {
            return Err(AppError::Unauthorized(
                "Incorrect username or password".into(),
            ));
        }
    };

    if !user.is_active {
        return Err(AppError::Forbidden);
    }

    let roles = roles_from_json(&user.roles);
    let access = security::issue_token(
        &state.config.jwt_secret,
        SUB_ACCESS,
        user.id,
        &roles,
        state.config.access_token_minutes,
    )?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.id),
        "user_login",
        Some("users"),
        Some(serde_json::json!({ "user_id": user.id, "method": "password" })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Logged in",
        TokenResponse {
            access_token: access,
            refresh_token: None,
            token_type: "bearer".into(),
        },
        Some(Meta::empty()),
    ))
}

/// Revocation record lives exactly as long as the token itself would have.
pub async fn logout(
    state: &AppState,
    authorization_header: &str,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let token = bearer_token(authorization_header)?;
    let claims = security::decode_token(&state.config.jwt_secret, token)?;

    let ttl = security::remaining_seconds(&claims);
    if ttl > 0 {
        state
            .cache
            .set_ex(
                &blacklist_key(token),
                &Utc::now().timestamp().to_string(),
                ttl as u64,
            )
            .await
            .map_err(AppError::Internal)?;
    }

    Ok(ApiResponse::success(
        "You have successfully logged out",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn me(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<User>> {
    let row = Users::find_active()
        .filter(UserCol::Id.eq(user.user_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(ApiResponse::success(
        "OK",
        user_from_entity(row),
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_codes_are_six_digits() {
        for _ in 0..256 {
            let code = generate_otp_code();
            assert_eq!(code.len(), 6);
            let value: u32 = code.parse().unwrap();
            assert!((100_000..=999_999).contains(&value));
        }
    }

    #[test]
    fn token_strings_embed_flow_phone_and_code() {
        assert_eq!(
            register_token("+15550000001", "123456"),
            "register:+15550000001:123456"
        );
        assert_eq!(
            login_token("+15550000001", "654321"),
            "login:+15550000001:654321"
        );
    }
}
