use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::{CheckoutRequest, CheckoutResponse, OrderList, PaymentWebhookRequest},
    entity::{
        CartItems, Carts, OrderItems, Orders, Payments, ProductVariants, SoftDeleteEntity, Users,
        cart_items,
        carts::Column as CartCol,
        order_items,
        orders::{self, Column as OrderCol},
        payments::{self, Column as PaymentCol},
        product_variants,
        users::Column as UserCol,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderItem, OrderStatus, PaymentStatus},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::cart_service::CartOwnerKey,
    state::AppState,
};

/// Buyer for an unauthenticated checkout: the earliest-created user, i.e. the
/// seeded bootstrap account. Mirrors the sandbox behavior of defaulting the
/// order owner instead of rejecting the request.
pub async fn resolve_buyer(state: &AppState, user: Option<&AuthUser>) -> AppResult<Uuid> {
    if let Some(user) = user {
        return Ok(user.user_id);
    }

    let fallback = Users::find_active()
        .order_by_asc(UserCol::Created)
        .one(&state.orm)
        .await?;
    match fallback {
        Some(u) => Ok(u.id),
        None => Err(AppError::Validation(
            "no buyer account available for anonymous checkout".into(),
        )),
    }
}

/// Converts a cart into an immutable order plus a pending payment, atomically
/// reserving stock.
///
/// Each variant row is locked (`SELECT ... FOR UPDATE`) before its stock is
/// checked and decremented, so concurrent checkouts against the same variant
/// serialize on that row while disjoint variants proceed in parallel. Any
/// failure before commit rolls the whole transaction back: no partial order,
/// no lost stock.
///
/// The cart used for reservation need not belong to the order owner: a
/// session-token cart can be checked out under an authenticated identity.
/// A missing cart yields a zero-amount order, and the cart itself is left
/// untouched as pre-checkout history.
pub async fn checkout(
    state: &AppState,
    buyer: Uuid,
    owner: &CartOwnerKey,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<CheckoutResponse>> {
    let shipping_address = payload.shipping_address.trim().to_string();
    if shipping_address.len() < 5 || shipping_address.len() > 500 {
        return Err(AppError::Validation(
            "shipping_address must be between 5 and 500 characters".into(),
        ));
    }
    let postal_code = payload.postal_code.trim().to_string();
    if postal_code.len() < 3 || postal_code.len() > 20 {
        return Err(AppError::Validation(
            "postal_code must be between 3 and 20 characters".into(),
        ));
    }

    let txn = state.orm.begin().await?;

    let cart = match owner {
        CartOwnerKey::User(user_id) => {
            Carts::find_active()
                .filter(CartCol::UserId.eq(*user_id))
                .one(&txn)
                .await?
        }
        CartOwnerKey::Session(token) => {
            Carts::find_active()
                .filter(CartCol::SessionToken.eq(token.clone()))
                .one(&txn)
                .await?
        }
    };

    let mut lines: Vec<(cart_items::Model, product_variants::Model)> = Vec::new();
    if let Some(cart) = &cart {
        let rows = CartItems::find_active()
            .filter(cart_items::Column::CartId.eq(cart.id))
            .find_also_related(ProductVariants)
            .all(&txn)
            .await?;
        for (item, variant) in rows {
            let variant = variant.ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!("cart line without variant"))
            })?;
            lines.push((item, variant));
        }
    }

    // Unit prices are frozen here; later catalog price changes never touch
    // placed orders.
    let total: Decimal = lines
        .iter()
        .map(|(item, variant)| variant.price * Decimal::from(item.quantity))
        .sum();

    // The order row is created first so line snapshots can reference it.
    let order = orders::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(buyer),
        status: Set(OrderStatus::Pending),
        total_amount: Set(total),
        tracking_code: Set(None),
        shipping_address: Set(shipping_address),
        postal_code: Set(postal_code),
        is_deleted: Set(None),
        created: NotSet,
        modified: NotSet,
    }
    .insert(&txn)
    .await?;

    for (item, variant) in &lines {
        // Row lock held until commit or rollback; the stock check below is
        // only valid against the locked row, never the earlier read.
        let locked = ProductVariants::find_by_id(variant.id)
            .lock(LockType::Update)
            .one(&txn)
            .await?
            .filter(|v| v.is_deleted.is_none());

        let locked = match locked {
            Some(v) if v.stock >= item.quantity => v,
            _ => {
                return Err(AppError::Validation(format!(
                    "Insufficient stock for {}",
                    variant.sku
                )));
            }
        };

        let new_stock = locked.stock - item.quantity;
        let mut variant_active: product_variants::ActiveModel = locked.into();
        variant_active.stock = Set(new_stock);
        variant_active.modified = Set(Utc::now().into());
        variant_active.update(&txn).await?;

        order_items::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            variant_id: Set(variant.id),
            quantity: Set(item.quantity),
            unit_price: Set(variant.price),
            is_deleted: Set(None),
            created: NotSet,
            modified: NotSet,
        }
        .insert(&txn)
        .await?;
    }

    let payment = payments::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order.id),
        provider: Set("sandbox".into()),
        provider_ref: Set(build_provider_ref()),
        status: Set(PaymentStatus::Pending),
        amount: Set(total),
        is_deleted: Set(None),
        created: NotSet,
        modified: NotSet,
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(buyer),
        "checkout",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "total_amount": total })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Checkout success",
        CheckoutResponse {
            order_id: order.id,
            payment_url: format!("/sandbox/pay/{}", payment.provider_ref),
        },
        Some(Meta::empty()),
    ))
}

/// Provider notification: overwrite the payment status, and on success move
/// the order to paid. Re-delivery of the same status is a no-op status-wise;
/// unknown references are acknowledged without effect.
pub async fn payment_webhook(
    state: &AppState,
    payload: PaymentWebhookRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let txn = state.orm.begin().await?;

    let payment = Payments::find_active()
        .filter(PaymentCol::ProviderRef.eq(payload.provider_ref.clone()))
        .one(&txn)
        .await?;

    if let Some(payment) = payment {
        let order_id = payment.order_id;
        let payment_id = payment.id;

        let mut payment_active: payments::ActiveModel = payment.into();
        payment_active.status = Set(payload.status);
        payment_active.modified = Set(Utc::now().into());
        payment_active.update(&txn).await?;

        if payload.status == PaymentStatus::Succeeded {
            if let Some(order) = Orders::find_by_id(order_id).one(&txn).await? {
                let mut order_active: orders::ActiveModel = order.into();
                order_active.status = Set(OrderStatus::Paid);
                order_active.modified = Set(Utc::now().into());
                order_active.update(&txn).await?;
            }
        }

        txn.commit().await?;

        if let Err(err) = log_audit(
            &state.pool,
            None,
            "payment_webhook",
            Some("payments"),
            Some(serde_json::json!({ "payment_id": payment_id, "status": payload.status })),
        )
        .await
        {
            tracing::warn!(error = %err, "audit log failed");
        }
    }

    Ok(ApiResponse::success(
        "Ok",
        serde_json::json!({ "ok": true }),
        Some(Meta::empty()),
    ))
}

pub async fn my_orders(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, size, offset) = pagination.normalize();

    let finder = Orders::find_active()
        .filter(OrderCol::UserId.eq(user.user_id))
        .order_by_desc(OrderCol::Created);

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(size as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect();

    let meta = Meta::new(page, size, total);
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<crate::dto::orders::OrderWithItems>> {
    let order = Orders::find_active()
        .filter(OrderCol::UserId.eq(user.user_id))
        .filter(OrderCol::Id.eq(id))
        .one(&state.orm)
        .await?
        .map(order_from_entity)
        .ok_or(AppError::NotFound)?;

    let items = OrderItems::find()
        .filter(order_items::Column::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        crate::dto::orders::OrderWithItems { order, items },
        Some(Meta::empty()),
    ))
}

fn build_provider_ref() -> String {
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub(crate) fn order_from_entity(model: orders::Model) -> Order {
    Order {
        id: model.id,
        user_id: model.user_id,
        status: model.status,
        total_amount: model.total_amount,
        tracking_code: model.tracking_code,
        shipping_address: model.shipping_address,
        postal_code: model.postal_code,
        created: model.created.with_timezone(&Utc),
        modified: model.modified.with_timezone(&Utc),
    }
}

pub(crate) fn order_item_from_entity(model: order_items::Model) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        variant_id: model.variant_id,
        quantity: model.quantity,
        unit_price: model.unit_price,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_ref_is_24_hex_chars() {
        let r = build_provider_ref();
        assert_eq!(r.len(), 24);
        assert!(r.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
