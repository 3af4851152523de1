use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum_storefront_api::{config::AppConfig, db::create_pool};
use rust_decimal::Decimal;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    sqlx::migrate!("./migrations").run(&pool).await?;

    let admin_id = ensure_user(
        &pool,
        "admin",
        "+15550000000",
        "admin123",
        &["SuperAdmin"],
    )
    .await?;
    let user_id = ensure_user(&pool, "user", "+15550000001", "user123", &["Consumer"]).await?;
    seed_catalog(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    username: &str,
    phone_number: &str,
    password: &str,
    roles: &[&str],
) -> anyhow::Result<Uuid> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO users (id, username, phone_number, password_hash, roles)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (username) DO UPDATE SET roles = EXCLUDED.roles
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(username)
    .bind(phone_number)
    .bind(password_hash)
    .bind(serde_json::json!(roles))
    .fetch_optional(pool)
    .await?;

    let user_id = match row {
        Some((id,)) => id,
        None => {
            let existing: (Uuid,) = sqlx::query_as("SELECT id FROM users WHERE username = $1")
                .bind(username)
                .fetch_one(pool)
                .await?;
            existing.0
        }
    };

    println!("Ensured user {username} (roles={roles:?})");
    Ok(user_id)
}

async fn seed_catalog(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let products: Vec<(&str, &str, &str, &str, Decimal, i32)> = vec![
        (
            "Axum Hoodie",
            "axum-hoodie",
            "Warm hoodie for Rustaceans",
            "HOOD-001",
            Decimal::new(5500, 2),
            50,
        ),
        (
            "Ferris Mug",
            "ferris-mug",
            "Coffee tastes better with Ferris",
            "MUG-001",
            Decimal::new(1200, 2),
            100,
        ),
        (
            "Rust Sticker Pack",
            "rust-sticker-pack",
            "Decorate your laptop",
            "STCK-001",
            Decimal::new(500, 2),
            200,
        ),
    ];

    for (title, slug, description, sku, price, stock) in products {
        let product_id: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO products (id, title, slug, description)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (slug) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(title)
        .bind(slug)
        .bind(description)
        .fetch_optional(pool)
        .await?;

        if let Some((product_id,)) = product_id {
            sqlx::query(
                r#"
                INSERT INTO product_variants (id, product_id, sku, price, stock)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (product_id, sku) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(product_id)
            .bind(sku)
            .bind(price)
            .bind(stock)
            .execute(pool)
            .await?;
        }
    }

    println!("Seeded catalog");
    Ok(())
}
