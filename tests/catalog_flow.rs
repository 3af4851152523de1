mod common;

use axum_storefront_api::{
    error::AppError,
    models::UserRole,
    routes::admin::{CreateBrandRequest, CreateCategoryRequest, CreateProductRequest},
    routes::params::ProductQuery,
    services::catalog_service,
};
use rust_decimal_macros::dec;
use serial_test::serial;

fn product_query(search: Option<&str>) -> ProductQuery {
    ProductQuery {
        page: None,
        size: None,
        search: search.map(str::to_string),
        category_id: None,
        brand_id: None,
    }
}

#[tokio::test]
#[serial]
async fn admin_builds_catalog_and_listing_filters_it() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let admin_id =
        common::create_user(&state, "admin", "+15550000040", &[UserRole::Admin]).await?;
    let admin = common::auth_user(admin_id, &[UserRole::Admin]);

    let category = catalog_service::create_category(
        &state,
        &admin,
        CreateCategoryRequest {
            name: "Phones".to_string(),
            slug: "phones".to_string(),
            parent_id: None,
        },
    )
    .await?
    .data
    .expect("category");

    // Child category hangs off the parent id; a bogus parent is rejected.
    catalog_service::create_category(
        &state,
        &admin,
        CreateCategoryRequest {
            name: "Smartphones".to_string(),
            slug: "smartphones".to_string(),
            parent_id: Some(category.id),
        },
    )
    .await?;
    let err = catalog_service::create_category(
        &state,
        &admin,
        CreateCategoryRequest {
            name: "Orphans".to_string(),
            slug: "orphans".to_string(),
            parent_id: Some(uuid::Uuid::new_v4()),
        },
    )
    .await
    .expect_err("unknown parent category");
    assert!(matches!(err, AppError::Validation(_)));

    let brand = catalog_service::create_brand(
        &state,
        &admin,
        CreateBrandRequest {
            name: "Acme".to_string(),
            slug: "acme".to_string(),
        },
    )
    .await?
    .data
    .expect("brand");

    let product = catalog_service::create_product(
        &state,
        &admin,
        CreateProductRequest {
            title: "Acme Phone".to_string(),
            slug: "acme-phone".to_string(),
            description: Some("A phone".to_string()),
            brand_id: Some(brand.id),
            category_id: Some(category.id),
            price: dec!(99.50),
            sku: "ACM-001".to_string(),
            color: None,
            size: None,
            stock: 12,
        },
    )
    .await?
    .data
    .expect("product");
    assert_eq!(product.variants.len(), 1);
    assert_eq!(product.variants[0].price, dec!(99.50));
    assert_eq!(product.variants[0].stock, 12);

    let listed = catalog_service::list_products(&state, product_query(Some("acme")))
        .await?
        .data
        .expect("listing");
    assert_eq!(listed.items.len(), 1);
    assert_eq!(listed.items[0].slug, "acme-phone");

    let missed = catalog_service::list_products(&state, product_query(Some("nonexistent")))
        .await?
        .data
        .expect("listing");
    assert!(missed.items.is_empty());

    // Duplicate slug is a conflict, not a storage error.
    let err = catalog_service::create_product(
        &state,
        &admin,
        CreateProductRequest {
            title: "Acme Phone Again".to_string(),
            slug: "acme-phone".to_string(),
            description: None,
            brand_id: None,
            category_id: None,
            price: dec!(10.00),
            sku: "ACM-002".to_string(),
            color: None,
            size: None,
            stock: 1,
        },
    )
    .await
    .expect_err("duplicate slug");
    assert!(matches!(err, AppError::AlreadyExists(_)));

    Ok(())
}

#[tokio::test]
#[serial]
async fn deactivated_and_deleted_products_leave_the_catalog() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let admin_id =
        common::create_user(&state, "admin", "+15550000041", &[UserRole::Admin]).await?;
    let admin = common::auth_user(admin_id, &[UserRole::Admin]);

    let (hidden_id, _) = common::create_product_with_variant(
        &state,
        "Hidden",
        "hidden",
        "HID-1",
        dec!(5.00),
        3,
    )
    .await?;
    let (gone_id, _) =
        common::create_product_with_variant(&state, "Gone", "gone", "GON-1", dec!(5.00), 3)
            .await?;

    catalog_service::set_product_activation(&state, &admin, hidden_id, false).await?;
    catalog_service::delete_product(&state, &admin, gone_id).await?;

    let listed = catalog_service::list_products(&state, product_query(None))
        .await?
        .data
        .expect("listing");
    assert!(listed.items.iter().all(|p| p.id != hidden_id && p.id != gone_id));

    let err = catalog_service::get_product(&state, hidden_id)
        .await
        .expect_err("inactive product is not exposed");
    assert!(matches!(err, AppError::NotFound));

    let err = catalog_service::get_product(&state, gone_id)
        .await
        .expect_err("deleted product is not exposed");
    assert!(matches!(err, AppError::NotFound));

    // Soft delete is repeatable-safe: the second call finds nothing.
    let err = catalog_service::delete_product(&state, &admin, gone_id)
        .await
        .expect_err("already deleted");
    assert!(matches!(err, AppError::NotFound));

    Ok(())
}
