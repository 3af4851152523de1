use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    db::DbPool,
    dto::cart::{AddToCartRequest, CartDto, CartItemDto},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    response::{ApiResponse, Meta},
    state::AppState,
};

/// Who a cart belongs to: an authenticated user or an anonymous session.
#[derive(Debug, Clone)]
pub enum CartOwnerKey {
    User(Uuid),
    Session(String),
}

impl CartOwnerKey {
    /// Authenticated callers get a user cart; anonymous callers must supply a
    /// session token. A cart is never ownerless.
    pub fn resolve(user: Option<&AuthUser>, session_token: Option<&str>) -> AppResult<Self> {
        if let Some(user) = user {
            return Ok(CartOwnerKey::User(user.user_id));
        }
        match session_token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => Ok(CartOwnerKey::Session(token.to_string())),
            None => Err(AppError::Validation(
                "session_token is required for anonymous carts".into(),
            )),
        }
    }
}

async fn find_cart_id(pool: &DbPool, owner: &CartOwnerKey) -> AppResult<Option<Uuid>> {
    let row: Option<(Uuid,)> = match owner {
        CartOwnerKey::User(user_id) => {
            sqlx::query_as("SELECT id FROM carts WHERE user_id = $1 AND is_deleted IS NULL")
                .bind(user_id)
                .fetch_optional(pool)
                .await?
        }
        CartOwnerKey::Session(token) => {
            sqlx::query_as("SELECT id FROM carts WHERE session_token = $1 AND is_deleted IS NULL")
                .bind(token)
                .fetch_optional(pool)
                .await?
        }
    };
    Ok(row.map(|(id,)| id))
}

async fn find_or_create_cart(pool: &DbPool, owner: &CartOwnerKey) -> AppResult<Uuid> {
    if let Some(id) = find_cart_id(pool, owner).await? {
        return Ok(id);
    }

    let (user_id, session_token) = match owner {
        CartOwnerKey::User(user_id) => (Some(*user_id), None),
        CartOwnerKey::Session(token) => (None, Some(token.as_str())),
    };

    let (id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO carts (id, user_id, session_token) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(session_token)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

pub async fn add_to_cart(
    state: &AppState,
    owner: &CartOwnerKey,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    if payload.quantity <= 0 {
        return Err(AppError::Validation(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let variant_exists: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM product_variants WHERE id = $1 AND is_deleted IS NULL")
            .bind(payload.variant_id)
            .fetch_optional(&state.pool)
            .await?;
    if variant_exists.is_none() {
        return Err(AppError::Validation("variant not found".to_string()));
    }

    let cart_id = find_or_create_cart(&state.pool, owner).await?;

    // Repeated adds of the same variant accumulate instead of replacing.
    let existing: Option<(Uuid,)> = sqlx::query_as(
        "SELECT id FROM cart_items WHERE cart_id = $1 AND variant_id = $2 AND is_deleted IS NULL",
    )
    .bind(cart_id)
    .bind(payload.variant_id)
    .fetch_optional(&state.pool)
    .await?;

    match existing {
        Some((item_id,)) => {
            sqlx::query(
                "UPDATE cart_items SET quantity = quantity + $2, modified = now() WHERE id = $1",
            )
            .bind(item_id)
            .bind(payload.quantity)
            .execute(&state.pool)
            .await?;
        }
        None => {
            sqlx::query(
                "INSERT INTO cart_items (id, cart_id, variant_id, quantity) VALUES ($1, $2, $3, $4)",
            )
            .bind(Uuid::new_v4())
            .bind(cart_id)
            .bind(payload.variant_id)
            .bind(payload.quantity)
            .execute(&state.pool)
            .await?;
        }
    }

    let audit_user = match owner {
        CartOwnerKey::User(id) => Some(*id),
        CartOwnerKey::Session(_) => None,
    };
    if let Err(err) = log_audit(
        &state.pool,
        audit_user,
        "cart_add",
        Some("cart_items"),
        Some(serde_json::json!({ "variant_id": payload.variant_id, "quantity": payload.quantity })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Added to cart",
        serde_json::json!({ "added": true }),
        Some(Meta::empty()),
    ))
}

#[derive(FromRow)]
struct CartLineRow {
    variant_id: Uuid,
    sku: String,
    quantity: i32,
    price: Decimal,
    stock: i32,
}

/// Cart contents priced at the variants' *current* prices. The total here is
/// not the total a later checkout will freeze if prices move in between.
pub async fn get_cart(state: &AppState, owner: &CartOwnerKey) -> AppResult<ApiResponse<CartDto>> {
    let cart_id = find_cart_id(&state.pool, owner).await?;

    let Some(cart_id) = cart_id else {
        return Ok(ApiResponse::success(
            "OK",
            CartDto {
                items: Vec::new(),
                total_amount: Decimal::ZERO,
            },
            Some(Meta::empty()),
        ));
    };

    let rows = sqlx::query_as::<_, CartLineRow>(
        r#"
        SELECT ci.variant_id, pv.sku, ci.quantity, pv.price, pv.stock
        FROM cart_items ci
        JOIN product_variants pv ON pv.id = ci.variant_id
        WHERE ci.cart_id = $1 AND ci.is_deleted IS NULL
        ORDER BY ci.created
        "#,
    )
    .bind(cart_id)
    .fetch_all(&state.pool)
    .await?;

    let mut total = Decimal::ZERO;
    let items = rows
        .into_iter()
        .map(|row| {
            total += row.price * Decimal::from(row.quantity);
            CartItemDto {
                variant_id: row.variant_id,
                sku: row.sku,
                quantity: row.quantity,
                unit_price: row.price,
                stock: row.stock,
            }
        })
        .collect();

    Ok(ApiResponse::success(
        "OK",
        CartDto {
            items,
            total_amount: total,
        },
        Some(Meta::empty()),
    ))
}
