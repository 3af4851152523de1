mod common;

use axum_storefront_api::{
    dto::cart::AddToCartRequest,
    dto::orders::{CheckoutRequest, PaymentWebhookRequest},
    entity::{OrderItems, Orders, Payments, ProductVariants, order_items, payments,
        product_variants},
    error::AppError,
    models::{OrderStatus, PaymentStatus, UserRole},
    routes::admin::CompleteOrderRequest,
    services::{admin_service, cart_service, cart_service::CartOwnerKey, order_service},
};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use serial_test::serial;

fn checkout_payload() -> CheckoutRequest {
    CheckoutRequest {
        session_token: None,
        shipping_address: "221B Baker Street".into(),
        postal_code: "123456".into(),
    }
}

fn provider_ref_from_url(payment_url: &str) -> String {
    payment_url
        .rsplit('/')
        .next()
        .expect("payment url has a reference")
        .to_string()
}

// Cart of 3 x $10.00 + 1 x $5.00 freezes a $35.00 order and reserves stock.
#[tokio::test]
#[serial]
async fn checkout_reserves_stock_and_snapshots_prices() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let buyer = common::create_user(&state, "buyer", "+15550000010", &[UserRole::Consumer]).await?;
    let (_, variant_a) =
        common::create_product_with_variant(&state, "Widget A", "widget-a", "WID-A", dec!(10.00), 10)
            .await?;
    let (_, variant_b) =
        common::create_product_with_variant(&state, "Widget B", "widget-b", "WID-B", dec!(5.00), 5)
            .await?;

    let owner = CartOwnerKey::User(buyer);
    cart_service::add_to_cart(
        &state,
        &owner,
        AddToCartRequest {
            variant_id: variant_a,
            quantity: 3,
            session_token: None,
        },
    )
    .await?;
    cart_service::add_to_cart(
        &state,
        &owner,
        AddToCartRequest {
            variant_id: variant_b,
            quantity: 1,
            session_token: None,
        },
    )
    .await?;

    let resp = order_service::checkout(&state, buyer, &owner, checkout_payload()).await?;
    let checkout = resp.data.expect("checkout response");

    let order = Orders::find_by_id(checkout.order_id)
        .one(&state.orm)
        .await?
        .expect("order persisted");
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total_amount, dec!(35.00));
    assert_eq!(order.shipping_address, "221B Baker Street");

    let mut items = OrderItems::find()
        .filter(order_items::Column::OrderId.eq(order.id))
        .all(&state.orm)
        .await?;
    items.sort_by(|a, b| b.unit_price.cmp(&a.unit_price));
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].unit_price, dec!(10.00));
    assert_eq!(items[0].quantity, 3);
    assert_eq!(items[1].unit_price, dec!(5.00));
    assert_eq!(items[1].quantity, 1);

    let stock_a = ProductVariants::find_by_id(variant_a)
        .one(&state.orm)
        .await?
        .expect("variant a")
        .stock;
    let stock_b = ProductVariants::find_by_id(variant_b)
        .one(&state.orm)
        .await?
        .expect("variant b")
        .stock;
    assert_eq!(stock_a, 7);
    assert_eq!(stock_b, 4);

    let payment = Payments::find()
        .filter(payments::Column::OrderId.eq(order.id))
        .one(&state.orm)
        .await?
        .expect("payment persisted");
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.amount, dec!(35.00));
    assert_eq!(payment.provider, "sandbox");
    assert_eq!(
        payment.provider_ref,
        provider_ref_from_url(&checkout.payment_url)
    );

    // Cart survives checkout as history.
    let cart = cart_service::get_cart(&state, &owner).await?;
    assert_eq!(cart.data.expect("cart").items.len(), 2);

    // Later price changes never touch the placed order.
    let variant = ProductVariants::find_by_id(variant_a)
        .one(&state.orm)
        .await?
        .expect("variant a");
    let mut active: product_variants::ActiveModel = variant.into();
    active.price = Set(dec!(99.00));
    active.update(&state.orm).await?;

    let order_after = Orders::find_by_id(order.id)
        .one(&state.orm)
        .await?
        .expect("order");
    assert_eq!(order_after.total_amount, dec!(35.00));
    let item_after = OrderItems::find()
        .filter(order_items::Column::OrderId.eq(order.id))
        .filter(order_items::Column::VariantId.eq(variant_a))
        .one(&state.orm)
        .await?
        .expect("order item");
    assert_eq!(item_after.unit_price, dec!(10.00));

    Ok(())
}

// One bad line aborts the whole checkout: no order, no payment, stock intact.
#[tokio::test]
#[serial]
async fn insufficient_stock_rolls_back_everything() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let buyer = common::create_user(&state, "buyer", "+15550000011", &[UserRole::Consumer]).await?;
    let (_, plentiful) = common::create_product_with_variant(
        &state,
        "Plentiful",
        "plentiful",
        "PLT-1",
        dec!(10.00),
        10,
    )
    .await?;
    let (_, scarce) =
        common::create_product_with_variant(&state, "Scarce", "scarce", "SCR-1", dec!(2.50), 2)
            .await?;

    let owner = CartOwnerKey::User(buyer);
    cart_service::add_to_cart(
        &state,
        &owner,
        AddToCartRequest {
            variant_id: plentiful,
            quantity: 1,
            session_token: None,
        },
    )
    .await?;
    cart_service::add_to_cart(
        &state,
        &owner,
        AddToCartRequest {
            variant_id: scarce,
            quantity: 3,
            session_token: None,
        },
    )
    .await?;

    let err = order_service::checkout(&state, buyer, &owner, checkout_payload())
        .await
        .expect_err("stock shortfall must fail the checkout");
    match err {
        AppError::Validation(message) => assert!(message.contains("SCR-1")),
        other => panic!("expected validation error, got {other:?}"),
    }

    assert_eq!(Orders::find().count(&state.orm).await?, 0);
    assert_eq!(OrderItems::find().count(&state.orm).await?, 0);
    assert_eq!(Payments::find().count(&state.orm).await?, 0);

    let stock = ProductVariants::find_by_id(plentiful)
        .one(&state.orm)
        .await?
        .expect("variant")
        .stock;
    assert_eq!(stock, 10);
    let stock = ProductVariants::find_by_id(scarce)
        .one(&state.orm)
        .await?
        .expect("variant")
        .stock;
    assert_eq!(stock, 2);

    Ok(())
}

// A missing cart still produces an order, with a zero amount.
#[tokio::test]
#[serial]
async fn missing_cart_creates_zero_amount_order() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let buyer = common::create_user(&state, "buyer", "+15550000012", &[UserRole::Consumer]).await?;
    let owner = CartOwnerKey::Session("guest-empty".to_string());

    let resp = order_service::checkout(&state, buyer, &owner, checkout_payload()).await?;
    let checkout = resp.data.expect("checkout response");

    let order = Orders::find_by_id(checkout.order_id)
        .one(&state.orm)
        .await?
        .expect("order persisted");
    assert_eq!(order.total_amount, dec!(0.00));
    assert_eq!(order.user_id, buyer);
    assert_eq!(OrderItems::find().count(&state.orm).await?, 0);

    Ok(())
}

#[tokio::test]
#[serial]
async fn webhook_succeeded_moves_order_to_paid_idempotently() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let buyer = common::create_user(&state, "buyer", "+15550000013", &[UserRole::Consumer]).await?;
    let (_, variant) =
        common::create_product_with_variant(&state, "Widget", "widget", "WID-1", dec!(12.00), 4)
            .await?;

    let owner = CartOwnerKey::User(buyer);
    cart_service::add_to_cart(
        &state,
        &owner,
        AddToCartRequest {
            variant_id: variant,
            quantity: 2,
            session_token: None,
        },
    )
    .await?;

    let resp = order_service::checkout(&state, buyer, &owner, checkout_payload()).await?;
    let checkout = resp.data.expect("checkout response");
    let provider_ref = provider_ref_from_url(&checkout.payment_url);

    order_service::payment_webhook(
        &state,
        PaymentWebhookRequest {
            provider_ref: provider_ref.clone(),
            status: PaymentStatus::Succeeded,
        },
    )
    .await?;

    let order = Orders::find_by_id(checkout.order_id)
        .one(&state.orm)
        .await?
        .expect("order");
    assert_eq!(order.status, OrderStatus::Paid);

    // Re-delivery is a no-op status-wise.
    order_service::payment_webhook(
        &state,
        PaymentWebhookRequest {
            provider_ref: provider_ref.clone(),
            status: PaymentStatus::Succeeded,
        },
    )
    .await?;
    let order = Orders::find_by_id(checkout.order_id)
        .one(&state.orm)
        .await?
        .expect("order");
    assert_eq!(order.status, OrderStatus::Paid);

    let payment = Payments::find()
        .filter(payments::Column::ProviderRef.eq(provider_ref))
        .one(&state.orm)
        .await?
        .expect("payment");
    assert_eq!(payment.status, PaymentStatus::Succeeded);

    // Unknown references are acknowledged without effect.
    order_service::payment_webhook(
        &state,
        PaymentWebhookRequest {
            provider_ref: "does-not-exist".into(),
            status: PaymentStatus::Failed,
        },
    )
    .await?;

    Ok(())
}

#[tokio::test]
#[serial]
async fn admin_completes_order_with_tracking_code() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let admin_id =
        common::create_user(&state, "admin", "+15550000014", &[UserRole::Admin]).await?;
    let buyer = common::create_user(&state, "buyer", "+15550000015", &[UserRole::Consumer]).await?;
    let admin = common::auth_user(admin_id, &[UserRole::Admin]);
    let consumer = common::auth_user(buyer, &[UserRole::Consumer]);

    let owner = CartOwnerKey::User(buyer);
    let resp = order_service::checkout(&state, buyer, &owner, checkout_payload()).await?;
    let order_id = resp.data.expect("checkout").order_id;

    let err = admin_service::complete_order(
        &state,
        &consumer,
        order_id,
        CompleteOrderRequest {
            tracking_code: "TRACK123456".into(),
        },
    )
    .await
    .expect_err("consumer must not complete orders");
    assert!(matches!(err, AppError::Forbidden));

    let err = admin_service::complete_order(
        &state,
        &admin,
        order_id,
        CompleteOrderRequest {
            tracking_code: "xy".into(),
        },
    )
    .await
    .expect_err("short tracking codes are rejected");
    assert!(matches!(err, AppError::Validation(_)));

    let completed = admin_service::complete_order(
        &state,
        &admin,
        order_id,
        CompleteOrderRequest {
            tracking_code: "TRACK123456".into(),
        },
    )
    .await?;
    let order = completed.data.expect("order");
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.tracking_code.as_deref(), Some("TRACK123456"));

    let row = Orders::find_by_id(order_id)
        .one(&state.orm)
        .await?
        .expect("order");
    assert_eq!(row.status, OrderStatus::Completed);

    Ok(())
}

// Adding the same variant twice accumulates quantity, and the cart total
// follows live prices.
#[tokio::test]
#[serial]
async fn cart_accumulates_and_prices_live() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let buyer = common::create_user(&state, "buyer", "+15550000016", &[UserRole::Consumer]).await?;
    let (_, variant) =
        common::create_product_with_variant(&state, "Widget", "widget", "WID-1", dec!(4.00), 50)
            .await?;

    let owner = CartOwnerKey::User(buyer);
    for _ in 0..2 {
        cart_service::add_to_cart(
            &state,
            &owner,
            AddToCartRequest {
                variant_id: variant,
                quantity: 2,
                session_token: None,
            },
        )
        .await?;
    }

    let cart = cart_service::get_cart(&state, &owner).await?.data.expect("cart");
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 4);
    assert_eq!(cart.total_amount, dec!(16.00));

    // Live pricing: a price change is reflected on the next read.
    let row = ProductVariants::find_by_id(variant)
        .one(&state.orm)
        .await?
        .expect("variant");
    let mut active: product_variants::ActiveModel = row.into();
    active.price = Set(dec!(5.00));
    active.update(&state.orm).await?;

    let cart = cart_service::get_cart(&state, &owner).await?.data.expect("cart");
    assert_eq!(cart.total_amount, dec!(20.00));

    Ok(())
}
