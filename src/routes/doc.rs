use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{
            OtpIssuedResponse, OtpLoginRequest, PasswordLoginRequest, RefreshRequest,
            RegisterOtpRequest, RegisterRequest, RegisteredUserResponse, TokenResponse,
        },
        cart::{AddToCartRequest, CartDto, CartItemDto},
        catalog::ProductList,
        orders::{
            CheckoutRequest, CheckoutResponse, OrderList, OrderWithItems, PaymentWebhookRequest,
        },
        users::{CreateUserRequest, UpdateUserRequest, UserList},
    },
    models::{
        Brand, Category, Order, OrderItem, OrderStatus, PaymentStatus, Product, ProductVariant,
        User, UserRole,
    },
    response::{ApiResponse, Meta},
    routes::{admin, auth, cart, health, orders, params, products, users},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register_request_otp,
        auth::register,
        auth::register_admin,
        auth::request_otp,
        auth::login,
        auth::login_password,
        auth::refresh,
        auth::logout,
        auth::me,
        products::list_products,
        products::get_product,
        cart::add_to_cart,
        cart::get_cart,
        orders::checkout,
        orders::payment_webhook,
        orders::my_orders,
        orders::get_order,
        users::list_users,
        users::get_user,
        users::update_user,
        admin::create_category,
        admin::create_brand,
        admin::create_product,
        admin::set_product_activation,
        admin::delete_product,
        admin::set_user_activation,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::complete_order,
    ),
    components(
        schemas(
            User,
            UserRole,
            Category,
            Brand,
            Product,
            ProductVariant,
            Order,
            OrderItem,
            OrderStatus,
            PaymentStatus,
            PasswordLoginRequest,
            TokenResponse,
            RegisterOtpRequest,
            OtpIssuedResponse,
            RegisterRequest,
            RegisteredUserResponse,
            OtpLoginRequest,
            RefreshRequest,
            CreateUserRequest,
            UpdateUserRequest,
            UserList,
            AddToCartRequest,
            CartItemDto,
            CartDto,
            ProductList,
            CheckoutRequest,
            CheckoutResponse,
            PaymentWebhookRequest,
            OrderList,
            OrderWithItems,
            admin::CreateCategoryRequest,
            admin::CreateBrandRequest,
            admin::CreateProductRequest,
            admin::ActivationRequest,
            admin::CompleteOrderRequest,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            Meta,
            ApiResponse<User>,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<CartDto>,
            ApiResponse<TokenResponse>,
            ApiResponse<CheckoutResponse>,
            ApiResponse<OrderList>,
            ApiResponse<OrderWithItems>,
            ApiResponse<UserList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Password, OTP and token endpoints"),
        (name = "Products", description = "Public catalog endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Orders", description = "Checkout and order endpoints"),
        (name = "Payments", description = "Payment provider webhook"),
        (name = "Users", description = "User administration"),
        (name = "Admin", description = "Admin endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
