use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::catalog::ProductList,
    entity::{
        Brands, Categories, ProductVariants, Products, SoftDeleteEntity,
        brands::{self, Column as BrandCol},
        categories::{self, Column as CategoryCol},
        product_variants::{self, Column as VariantCol},
        products::{self, Column as ProductCol},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Brand, Category, Product, ProductVariant},
    response::{ApiResponse, Meta},
    routes::admin::{CreateBrandRequest, CreateCategoryRequest, CreateProductRequest},
    routes::params::ProductQuery,
    state::AppState,
};

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, size, offset) = query.pagination().normalize();

    let mut condition = Condition::all().add(ProductCol::IsActive.eq(true));
    if let Some(search) = query.search.as_ref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(Expr::col(ProductCol::Title).ilike(pattern));
    }
    if let Some(category_id) = query.category_id {
        condition = condition.add(ProductCol::CategoryId.eq(category_id));
    }
    if let Some(brand_id) = query.brand_id {
        condition = condition.add(ProductCol::BrandId.eq(brand_id));
    }

    let finder = Products::find_active()
        .filter(condition)
        .order_by_desc(ProductCol::Created);

    let total = finder.clone().count(&state.orm).await? as i64;

    let rows = finder
        .limit(size as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    let items = attach_variants(state, rows).await?;

    let meta = Meta::new(page, size, total);
    Ok(ApiResponse::success(
        "Products",
        ProductList { items },
        Some(meta),
    ))
}

pub async fn get_product(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Product>> {
    let row = Products::find_active()
        .filter(ProductCol::Id.eq(id))
        .filter(ProductCol::IsActive.eq(true))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut items = attach_variants(state, vec![row]).await?;
    let product = items
        .pop()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("product vanished during mapping")))?;

    Ok(ApiResponse::success("Product", product, None))
}

async fn attach_variants(
    state: &AppState,
    rows: Vec<products::Model>,
) -> AppResult<Vec<Product>> {
    let ids: Vec<Uuid> = rows.iter().map(|p| p.id).collect();

    let mut by_product: HashMap<Uuid, Vec<ProductVariant>> = HashMap::new();
    if !ids.is_empty() {
        let variants = ProductVariants::find_active()
            .filter(VariantCol::ProductId.is_in(ids))
            .order_by_asc(VariantCol::Created)
            .all(&state.orm)
            .await?;
        for variant in variants {
            by_product
                .entry(variant.product_id)
                .or_default()
                .push(variant_from_entity(variant));
        }
    }

    Ok(rows
        .into_iter()
        .map(|model| {
            let variants = by_product.remove(&model.id).unwrap_or_default();
            product_from_entity(model, variants)
        })
        .collect())
}

pub async fn create_category(
    state: &AppState,
    user: &AuthUser,
    payload: CreateCategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    ensure_admin(user)?;

    let exists = Categories::find_active()
        .filter(CategoryCol::Slug.eq(payload.slug.clone()))
        .one(&state.orm)
        .await?;
    if exists.is_some() {
        return Err(AppError::AlreadyExists("Category slug already exists".into()));
    }

    if let Some(parent_id) = payload.parent_id {
        let parent = Categories::find_active()
            .filter(CategoryCol::Id.eq(parent_id))
            .one(&state.orm)
            .await?;
        if parent.is_none() {
            return Err(AppError::Validation("parent category not found".into()));
        }
    }

    let created = categories::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name),
        slug: Set(payload.slug),
        parent_id: Set(payload.parent_id),
        is_deleted: Set(None),
        created: NotSet,
        modified: NotSet,
    }
    .insert(&state.orm)
    .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "category_create",
        Some("categories"),
        Some(serde_json::json!({ "category_id": created.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Category created",
        category_from_entity(created),
        Some(Meta::empty()),
    ))
}

pub async fn create_brand(
    state: &AppState,
    user: &AuthUser,
    payload: CreateBrandRequest,
) -> AppResult<ApiResponse<Brand>> {
    ensure_admin(user)?;

    let exists = Brands::find_active()
        .filter(
            Condition::any()
                .add(BrandCol::Slug.eq(payload.slug.clone()))
                .add(BrandCol::Name.eq(payload.name.clone())),
        )
        .one(&state.orm)
        .await?;
    if exists.is_some() {
        return Err(AppError::AlreadyExists("Brand already exists".into()));
    }

    let created = brands::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name),
        slug: Set(payload.slug),
        is_deleted: Set(None),
        created: NotSet,
        modified: NotSet,
    }
    .insert(&state.orm)
    .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "brand_create",
        Some("brands"),
        Some(serde_json::json!({ "brand_id": created.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Brand created",
        brand_from_entity(created),
        Some(Meta::empty()),
    ))
}

/// Creates a product together with its initial variant, so every listed
/// product is purchasable from the start.
pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;

    if payload.price <= Decimal::ZERO {
        return Err(AppError::Validation("price must be greater than 0".into()));
    }
    if payload.stock < 0 {
        return Err(AppError::Validation("stock must not be negative".into()));
    }
    if payload.sku.trim().is_empty() {
        return Err(AppError::Validation("sku is required".into()));
    }

    let exists = Products::find_active()
        .filter(ProductCol::Slug.eq(payload.slug.clone()))
        .one(&state.orm)
        .await?;
    if exists.is_some() {
        return Err(AppError::AlreadyExists("Product slug already exists".into()));
    }

    let txn = state.orm.begin().await?;

    let product = products::ActiveModel {
        id: Set(Uuid::new_v4()),
        title: Set(payload.title),
        slug: Set(payload.slug),
        description: Set(payload.description),
        brand_id: Set(payload.brand_id),
        category_id: Set(payload.category_id),
        is_active: Set(true),
        is_deleted: Set(None),
        created: NotSet,
        modified: NotSet,
    }
    .insert(&txn)
    .await?;

    let variant = product_variants::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product.id),
        sku: Set(payload.sku),
        color: Set(payload.color),
        size: Set(payload.size),
        price: Set(payload.price),
        stock: Set(payload.stock),
        is_deleted: Set(None),
        created: NotSet,
        modified: NotSet,
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "product_create",
        Some("products"),
        Some(serde_json::json!({ "product_id": product.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let variants = vec![variant_from_entity(variant)];
    Ok(ApiResponse::success(
        "Product created",
        product_from_entity(product, variants),
        Some(Meta::empty()),
    ))
}

pub async fn set_product_activation(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    is_active: bool,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;

    let existing = Products::find_active()
        .filter(ProductCol::Id.eq(id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: products::ActiveModel = existing.into();
    active.is_active = Set(is_active);
    active.modified = Set(Utc::now().into());
    let updated = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "product_activation",
        Some("products"),
        Some(serde_json::json!({ "product_id": updated.id, "is_active": is_active })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let mut items = attach_variants(state, vec![updated]).await?;
    let product = items
        .pop()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("product vanished during mapping")))?;

    Ok(ApiResponse::success("Updated", product, Some(Meta::empty())))
}

/// Soft delete: stamps `is_deleted` so the row drops out of every read path
/// while the history stays in place.
pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;

    let existing = Products::find_active()
        .filter(ProductCol::Id.eq(id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: products::ActiveModel = existing.into();
    active.is_deleted = Set(Some(Utc::now().into()));
    active.modified = Set(Utc::now().into());
    active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "product_delete",
        Some("products"),
        Some(serde_json::json!({ "product_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

fn category_from_entity(model: categories::Model) -> Category {
    Category {
        id: model.id,
        name: model.name,
        slug: model.slug,
        parent_id: model.parent_id,
    }
}

fn brand_from_entity(model: brands::Model) -> Brand {
    Brand {
        id: model.id,
        name: model.name,
        slug: model.slug,
    }
}

fn variant_from_entity(model: product_variants::Model) -> ProductVariant {
    ProductVariant {
        id: model.id,
        sku: model.sku,
        color: model.color,
        size: model.size,
        price: model.price,
        stock: model.stock,
    }
}

fn product_from_entity(model: products::Model, variants: Vec<ProductVariant>) -> Product {
    Product {
        id: model.id,
        title: model.title,
        slug: model.slug,
        description: model.description,
        brand_id: model.brand_id,
        category_id: model.category_id,
        is_active: model.is_active,
        variants,
        created: model.created.with_timezone(&Utc),
    }
}
