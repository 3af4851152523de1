mod common;

use axum_storefront_api::{
    cache::blacklist_key,
    dto::auth::{
        OtpLoginRequest, PasswordLoginRequest, RefreshRequest, RegisterOtpRequest, RegisterRequest,
    },
    dto::users::CreateUserRequest,
    error::AppError,
    models::UserRole,
    services::{auth_service, user_service},
};
use serial_test::serial;

fn otp_request(phone_number: &str) -> RegisterOtpRequest {
    RegisterOtpRequest {
        phone_number: phone_number.to_string(),
    }
}

#[tokio::test]
#[serial]
async fn otp_registration_is_single_use() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let phone = "+15550000030";

    let issued = auth_service::request_register_otp(&state, otp_request(phone)).await?;
    let otp_code = issued.data.expect("otp issued").otp_code;
    assert_eq!(otp_code.len(), 6);

    let registered = auth_service::register_with_otp(
        &state,
        RegisterRequest {
            phone_number: phone.to_string(),
            otp_code: otp_code.clone(),
            full_name: Some("Customer".to_string()),
            email: None,
        },
    )
    .await?;
    assert_eq!(registered.data.expect("registered").phone_number, phone);

    // Replaying the consumed code fails even with the correct phone.
    let err = auth_service::register_with_otp(
        &state,
        RegisterRequest {
            phone_number: phone.to_string(),
            otp_code,
            full_name: None,
            email: None,
        },
    )
    .await
    .expect_err("consumed OTP must not validate again");
    assert!(matches!(err, AppError::Validation(_)));

    // Re-registering an active phone number is rejected up front.
    let err = auth_service::request_register_otp(&state, otp_request(phone))
        .await
        .expect_err("active phone cannot re-register");
    assert!(matches!(err, AppError::AlreadyExists(_)));

    Ok(())
}

#[tokio::test]
#[serial]
async fn otp_login_and_refresh_rotate_single_use_tokens() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let phone = "+15550000031";
    common::create_user(&state, "otp-user", phone, &[UserRole::Consumer]).await?;

    // Unknown phone numbers cannot request login codes.
    let err = auth_service::request_login_otp(&state, otp_request("+15559999999"))
        .await
        .expect_err("unknown phone has no login OTP");
    assert!(matches!(err, AppError::NotFound));

    let issued = auth_service::request_login_otp(&state, otp_request(phone)).await?;
    let otp_code = issued.data.expect("otp issued").otp_code;

    let tokens = auth_service::login_with_otp(
        &state,
        OtpLoginRequest {
            phone_number: phone.to_string(),
            otp_code: otp_code.clone(),
        },
    )
    .await?;
    let tokens = tokens.data.expect("token pair");
    let refresh = tokens.refresh_token.expect("refresh token");
    assert!(!tokens.access_token.is_empty());

    // The login code is spent.
    let err = auth_service::login_with_otp(
        &state,
        OtpLoginRequest {
            phone_number: phone.to_string(),
            otp_code,
        },
    )
    .await
    .expect_err("consumed login OTP must fail");
    assert!(matches!(err, AppError::Validation(_)));

    // Refresh rotates the pair and burns the old refresh token.
    let rotated = auth_service::refresh_tokens(
        &state,
        RefreshRequest {
            refresh_token: refresh.clone(),
        },
    )
    .await?;
    let rotated = rotated.data.expect("rotated pair");
    assert!(rotated.refresh_token.is_some());

    let err = auth_service::refresh_tokens(&state, RefreshRequest {
        refresh_token: refresh,
    })
    .await
    .expect_err("a refresh token is good for one rotation only");
    assert!(matches!(err, AppError::Validation(_)));

    Ok(())
}

#[tokio::test]
#[serial]
async fn password_login_checks_credentials_and_activation() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let admin_id =
        common::create_user(&state, "root", "+15550000032", &[UserRole::SuperAdmin]).await?;
    let admin = common::auth_user(admin_id, &[UserRole::SuperAdmin]);

    let created = user_service::create_user(
        &state,
        &admin,
        CreateUserRequest {
            username: "clerk".to_string(),
            password: "clerk-pass".to_string(),
            phone_number: "+15550000033".to_string(),
            full_name: None,
            email: None,
            roles: None,
        },
    )
    .await?;
    let clerk = created.data.expect("created user");
    assert_eq!(clerk.roles, vec![UserRole::Consumer]);

    let tokens = auth_service::password_login(
        &state,
        PasswordLoginRequest {
            username: "clerk".to_string(),
            password: "clerk-pass".to_string(),
        },
    )
    .await?;
    assert!(!tokens.data.expect("tokens").access_token.is_empty());

    let err = auth_service::password_login(
        &state,
        PasswordLoginRequest {
            username: "clerk".to_string(),
            password: "wrong".to_string(),
        },
    )
    .await
    .expect_err("wrong password is rejected");
    assert!(matches!(err, AppError::Unauthorized(_)));

    user_service::set_user_activation(&state, &admin, clerk.id, false).await?;
    let err = auth_service::password_login(
        &state,
        PasswordLoginRequest {
            username: "clerk".to_string(),
            password: "clerk-pass".to_string(),
        },
    )
    .await
    .expect_err("inactive user cannot log in");
    assert!(matches!(err, AppError::Forbidden));

    Ok(())
}

// Requires a reachable redis; skipped unless REDIS_URL is set.
#[tokio::test]
#[serial]
async fn logout_blacklists_token_until_expiry() -> anyhow::Result<()> {
    if std::env::var("REDIS_URL").is_err() {
        eprintln!("Skipping test: set REDIS_URL to run revocation tests.");
        return Ok(());
    }
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let phone = "+15550000034";
    common::create_user(&state, "logout-user", phone, &[UserRole::Consumer]).await?;

    let issued = auth_service::request_login_otp(&state, otp_request(phone)).await?;
    let otp_code = issued.data.expect("otp issued").otp_code;
    let tokens = auth_service::login_with_otp(
        &state,
        OtpLoginRequest {
            phone_number: phone.to_string(),
            otp_code,
        },
    )
    .await?;
    let access = tokens.data.expect("tokens").access_token;

    auth_service::logout(&state, &format!("Bearer {access}")).await?;

    let revoked = state.cache.get(&blacklist_key(&access)).await?;
    assert!(revoked.is_some(), "revocation record must exist until expiry");

    Ok(())
}
