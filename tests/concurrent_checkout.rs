mod common;

use axum_storefront_api::{
    dto::cart::AddToCartRequest,
    dto::orders::CheckoutRequest,
    entity::{Orders, ProductVariants},
    models::UserRole,
    services::{cart_service, cart_service::CartOwnerKey, order_service},
};
use rust_decimal_macros::dec;
use sea_orm::{EntityTrait, PaginatorTrait};
use serial_test::serial;

// Four buyers race for a variant with stock 2, one unit each. The row lock
// serializes them: exactly two orders commit, stock ends at zero, and the
// losers leave nothing behind.
#[tokio::test]
#[serial]
async fn concurrent_checkouts_never_oversell() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let (_, variant) =
        common::create_product_with_variant(&state, "Hot Item", "hot-item", "HOT-1", dec!(9.99), 2)
            .await?;

    let mut buyers = Vec::new();
    for i in 0..4 {
        let buyer = common::create_user(
            &state,
            &format!("buyer-{i}"),
            &format!("+1555000020{i}"),
            &[UserRole::Consumer],
        )
        .await?;
        let owner = CartOwnerKey::User(buyer);
        cart_service::add_to_cart(
            &state,
            &owner,
            AddToCartRequest {
                variant_id: variant,
                quantity: 1,
                session_token: None,
            },
        )
        .await?;
        buyers.push(buyer);
    }

    let mut handles = Vec::new();
    for buyer in buyers {
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            let owner = CartOwnerKey::User(buyer);
            order_service::checkout(
                &state,
                buyer,
                &owner,
                CheckoutRequest {
                    session_token: None,
                    shipping_address: "221B Baker Street".into(),
                    postal_code: "123456".into(),
                },
            )
            .await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await?.is_ok() {
            successes += 1;
        }
    }

    assert_eq!(successes, 2, "stock of 2 admits exactly two checkouts");

    let stock = ProductVariants::find_by_id(variant)
        .one(&state.orm)
        .await?
        .expect("variant")
        .stock;
    assert_eq!(stock, 0);
    assert!(stock >= 0, "stock must never go negative");

    // Failed checkouts rolled back completely.
    assert_eq!(Orders::find().count(&state.orm).await?, successes as u64);

    Ok(())
}
