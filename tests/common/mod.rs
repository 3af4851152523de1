#![allow(dead_code)]

use axum_storefront_api::{
    cache::RedisPool,
    config::AppConfig,
    db::{create_orm_conn, create_pool},
    entity::{product_variants, products, users},
    middleware::auth::AuthUser,
    models::UserRole,
    state::AppState,
};
use rust_decimal::Decimal;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, Set};
use uuid::Uuid;

/// Build an `AppState` against the configured test database, or `None` when
/// no database is configured so the caller can skip.
pub async fn setup_state() -> anyhow::Result<Option<AppState>> {
    let database_url =
        match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
            Ok(url) => url,
            Err(_) => {
                eprintln!(
                    "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration tests."
                );
                return Ok(None);
            }
        };
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

    let pool = create_pool(&database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    let orm = create_orm_conn(&database_url).await?;

    // Clean tables between runs
    sqlx::query(
        "TRUNCATE TABLE order_items, payments, orders, cart_items, carts, auth_tokens, \
         audit_logs, product_variants, products, brands, categories, users CASCADE",
    )
    .execute(&pool)
    .await?;

    let config = AppConfig {
        database_url,
        redis_url: redis_url.clone(),
        host: "127.0.0.1".to_string(),
        port: 0,
        jwt_secret: "test-secret".to_string(),
        access_token_minutes: 60,
        refresh_token_minutes: 60 * 24,
        debug: true,
    };
    let cache = RedisPool::new(&redis_url)?;

    Ok(Some(AppState {
        pool,
        orm,
        cache,
        config,
    }))
}

pub async fn create_user(
    state: &AppState,
    username: &str,
    phone_number: &str,
    roles: &[UserRole],
) -> anyhow::Result<Uuid> {
    let user = users::ActiveModel {
        id: Set(Uuid::new_v4()),
        username: Set(username.to_string()),
        full_name: Set(None),
        email: Set(None),
        phone_number: Set(phone_number.to_string()),
        password_hash: Set("seeded".to_string()),
        is_active: Set(true),
        roles: Set(serde_json::json!(roles)),
        is_deleted: Set(None),
        created: NotSet,
        modified: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(user.id)
}

pub async fn create_product_with_variant(
    state: &AppState,
    title: &str,
    slug: &str,
    sku: &str,
    price: Decimal,
    stock: i32,
) -> anyhow::Result<(Uuid, Uuid)> {
    let product = products::ActiveModel {
        id: Set(Uuid::new_v4()),
        title: Set(title.to_string()),
        slug: Set(slug.to_string()),
        description: Set(None),
        brand_id: Set(None),
        category_id: Set(None),
        is_active: Set(true),
        is_deleted: Set(None),
        created: NotSet,
        modified: NotSet,
    }
    .insert(&state.orm)
    .await?;

    let variant = product_variants::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product.id),
        sku: Set(sku.to_string()),
        color: Set(None),
        size: Set(None),
        price: Set(price),
        stock: Set(stock),
        is_deleted: Set(None),
        created: NotSet,
        modified: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok((product.id, variant.id))
}

pub fn auth_user(user_id: Uuid, roles: &[UserRole]) -> AuthUser {
    AuthUser {
        user_id,
        roles: roles.to_vec(),
    }
}
