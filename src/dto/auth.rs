use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct PasswordLoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterOtpRequest {
    pub phone_number: String,
}

/// The sandbox hands the code straight back to the caller instead of
/// dispatching it over SMS.
#[derive(Debug, Serialize, ToSchema)]
pub struct OtpIssuedResponse {
    pub sent: bool,
    pub otp_code: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub phone_number: String,
    pub otp_code: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegisteredUserResponse {
    pub user_id: Uuid,
    pub phone_number: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OtpLoginRequest {
    pub phone_number: String,
    pub otp_code: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}
