use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::{OrderList, OrderWithItems},
    entity::{
        OrderItems, Orders, SoftDeleteEntity,
        order_items::Column as OrderItemCol,
        orders::{self, Column as OrderCol},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Order, OrderStatus},
    response::{ApiResponse, Meta},
    routes::admin::CompleteOrderRequest,
    routes::params::{OrderListQuery, SortOrder},
    services::order_service::{order_from_entity, order_item_from_entity},
    state::AppState,
};

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    let (page, size, offset) = query.pagination().normalize();

    let mut condition = Condition::all();
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status));
    }

    let mut finder = Orders::find_active().filter(condition);
    finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(OrderCol::Created),
        SortOrder::Desc => finder.order_by_desc(OrderCol::Created),
    };

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
        "Orders",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn get_order_admin(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;

    let order = Orders::find_active()
        .filter(OrderCol::Id.eq(id))
        .one(&state.orm)
        .await?
        .map(order_from_entity)
        .ok_or(AppError::NotFound)?;

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Order found",
        OrderWithItems { order, items },
        Some(Meta::empty()),
    ))
}

/// Completion is the only admin-driven order transition: it records the
/// tracking code and stamps the terminal `completed` status.
pub async fn complete_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: CompleteOrderRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;

    let tracking_code = payload.tracking_code.trim().to_string();
    if tracking_code.len() < 3 || tracking_code.len() > 120 {
        return Err(AppError::Validation(
            "tracking_code must be between 3 and 120 characters".into(),
        ));
    }

    let existing = Orders::find_active()
        .filter(OrderCol::Id.eq(id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: orders::ActiveModel = existing.into();
    active.status = Set(OrderStatus::Completed);
    active.tracking_code = Set(Some(tracking_code.clone()));
    active.modified = Set(Utc::now().into());
    let order = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_complete",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "tracking_code": tracking_code })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order completed",
        order_from_entity(order),
        Some(Meta::empty()),
    ))
}
