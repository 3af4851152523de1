use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddToCartRequest {
    pub variant_id: Uuid,
    pub quantity: i32,
    pub session_token: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartItemDto {
    pub variant_id: Uuid,
    pub sku: String,
    pub quantity: i32,
    /// Live variant price; diverges from any previously frozen order total
    /// after a price change.
    pub unit_price: Decimal,
    pub stock: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartDto {
    pub items: Vec<CartItemDto>,
    pub total_amount: Decimal,
}
