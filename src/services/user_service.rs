use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::users::{CreateUserRequest, UpdateUserRequest, UserList},
    entity::{
        SoftDeleteEntity, Users,
        users::{self, Column as UserCol},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{User, UserRole},
    response::{ApiResponse, Meta},
    security,
    state::AppState,
};

pub(crate) fn roles_from_json(value: &serde_json::Value) -> Vec<UserRole> {
    serde_json::from_value(value.clone()).unwrap_or_else(|_| vec![UserRole::Consumer])
}

pub(crate) fn user_from_entity(model: users::Model) -> User {
    let roles = roles_from_json(&model.roles);
    User {
        id: model.id,
        username: model.username,
        full_name: model.full_name,
        email: model.email,
        phone_number: model.phone_number,
        is_active: model.is_active,
        roles,
        created: model.created.with_timezone(&Utc),
        modified: model.modified.with_timezone(&Utc),
    }
}

pub async fn create_user(
    state: &AppState,
    user: &AuthUser,
    payload: CreateUserRequest,
) -> AppResult<ApiResponse<User>> {
    ensure_admin(user)?;

    let exists = Users::find_active()
        .filter(UserCol::Username.eq(payload.username.clone()))
        .one(&state.orm)
        .await?;
    if exists.is_some() {
        return Err(AppError::AlreadyExists(
            "The user with this username already exists".into(),
        ));
    }

    let roles = payload.roles.unwrap_or_else(|| vec![UserRole::Consumer]);
    if roles.is_empty() {
        return Err(AppError::Validation("at least one role is required".into()));
    }

    let password_hash = security::hash_password(&payload.password)?;

    let created = users::ActiveModel {
        id: Set(Uuid::new_v4()),
        username: Set(payload.username),
        full_name: Set(payload.full_name),
        email: Set(payload.email),
        phone_number: Set(payload.phone_number),
        password_hash: Set(password_hash),
        is_active: Set(true),
        roles: Set(serde_json::json!(roles)),
        is_deleted: Set(None),
        created: NotSet,
        modified: NotSet,
    }
    .insert(&state.orm)
    .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "user_create",
        Some("users"),
        Some(serde_json::json!({ "user_id": created.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "User created",
        user_from_entity(created),
        Some(Meta::empty()),
    ))
}

pub async fn list_users(
    state: &AppState,
    user: &AuthUser,
    pagination: crate::routes::params::Pagination,
) -> AppResult<ApiResponse<UserList>> {
    ensure_admin(user)?;
    let (page, size, offset) = pagination.normalize();

    let finder = Users::find_active().order_by_asc(UserCol::Created);
    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(size as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(user_from_entity)
        .collect();

    let meta = Meta::new(page, size, total);
    Ok(ApiResponse::success("Users", UserList { items }, Some(meta)))
}

pub async fn get_user(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<ApiResponse<User>> {
    ensure_admin(user)?;

    let row = Users::find_active()
        .filter(UserCol::Id.eq(id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(ApiResponse::success(
        "OK",
        user_from_entity(row),
        Some(Meta::empty()),
    ))
}

pub async fn update_user(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateUserRequest,
) -> AppResult<ApiResponse<User>> {
    ensure_admin(user)?;

    let existing = Users::find_active()
        .filter(UserCol::Id.eq(id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: users::ActiveModel = existing.into();
    if let Some(full_name) = payload.full_name {
        active.full_name = Set(Some(full_name));
    }
    if let Some(email) = payload.email {
        active.email = Set(Some(email));
    }
    if let Some(phone_number) = payload.phone_number {
        active.phone_number = Set(phone_number);
    }
    if let Some(password) = payload.password.filter(|p| !p.is_empty()) {
        active.password_hash = Set(security::hash_password(&password)?);
    }
    if let Some(roles) = payload.roles {
        if roles.is_empty() {
            return Err(AppError::Validation("at least one role is required".into()));
        }
        active.roles = Set(serde_json::json!(roles));
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    active.modified = Set(Utc::now().into());

    let updated = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "user_update",
        Some("users"),
        Some(serde_json::json!({ "user_id": updated.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Updated",
        user_from_entity(updated),
        Some(Meta::empty()),
    ))
}

pub async fn set_user_activation(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    is_active: bool,
) -> AppResult<ApiResponse<User>> {
    ensure_admin(user)?;

    let existing = Users::find_active()
        .filter(UserCol::Id.eq(id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: users::ActiveModel = existing.into();
    active.is_active = Set(is_active);
    active.modified = Set(Utc::now().into());
    let updated = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "user_activation",
        Some("users"),
        Some(serde_json::json!({ "user_id": updated.id, "is_active": is_active })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Updated",
        user_from_entity(updated),
        Some(Meta::empty()),
    ))
}
