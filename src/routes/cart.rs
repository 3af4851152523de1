use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    dto::cart::{AddToCartRequest, CartDto},
    error::AppResult,
    middleware::auth::OptionalAuthUser,
    response::ApiResponse,
    services::cart_service::{self, CartOwnerKey},
    state::AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CartQuery {
    pub session_token: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart))
        .route("/add", post(add_to_cart))
}

#[utoipa::path(
    post,
    path = "/api/cart/add",
    request_body = AddToCartRequest,
    responses(
        (status = 200, description = "Item added or accumulated", body = ApiResponse<serde_json::Value>),
        (status = 400, description = "Bad request"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    OptionalAuthUser(user): OptionalAuthUser,
    Json(payload): Json<AddToCartRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let owner = CartOwnerKey::resolve(user.as_ref(), payload.session_token.as_deref())?;
    let resp = cart_service::add_to_cart(&state, &owner, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/cart",
    params(
        ("session_token" = Option<String>, Query, description = "Anonymous cart session token")
    ),
    responses(
        (status = 200, description = "Cart lines priced at current prices", body = ApiResponse<CartDto>),
        (status = 400, description = "No owner key"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    OptionalAuthUser(user): OptionalAuthUser,
    Query(query): Query<CartQuery>,
) -> AppResult<Json<ApiResponse<CartDto>>> {
    let owner = CartOwnerKey::resolve(user.as_ref(), query.session_token.as_deref())?;
    let resp = cart_service::get_cart(&state, &owner).await?;
    Ok(Json(resp))
}
