use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, Select};

pub mod auth_tokens;
pub mod brands;
pub mod cart_items;
pub mod carts;
pub mod categories;
pub mod order_items;
pub mod orders;
pub mod payments;
pub mod product_variants;
pub mod products;
pub mod users;

pub use auth_tokens::Entity as AuthTokens;
pub use brands::Entity as Brands;
pub use cart_items::Entity as CartItems;
pub use carts::Entity as Carts;
pub use categories::Entity as Categories;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use payments::Entity as Payments;
pub use product_variants::Entity as ProductVariants;
pub use products::Entity as Products;
pub use users::Entity as Users;

/// Soft deletion is a nullable timestamp on every domain table. Reads go
/// through `find_active` so the "not deleted" predicate lives in one place.
pub trait SoftDeleteEntity: EntityTrait {
    fn deleted_at_column() -> Self::Column;

    fn find_active() -> Select<Self> {
        Self::find().filter(Self::deleted_at_column().is_null())
    }
}

macro_rules! impl_soft_delete {
    ($module:ident) => {
        impl SoftDeleteEntity for $module::Entity {
            fn deleted_at_column() -> Self::Column {
                $module::Column::IsDeleted
            }
        }
    };
}

impl_soft_delete!(auth_tokens);
impl_soft_delete!(brands);
impl_soft_delete!(cart_items);
impl_soft_delete!(carts);
impl_soft_delete!(categories);
impl_soft_delete!(order_items);
impl_soft_delete!(orders);
impl_soft_delete!(payments);
impl_soft_delete!(product_variants);
impl_soft_delete!(products);
impl_soft_delete!(users);
