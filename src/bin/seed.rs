use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum_sportshop_api::{config::AppConfig, db::create_pool};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    sqlx::migrate!("./migrations").run(&pool).await?;

    let admin_id = ensure_user(&pool, "admin@example.com", "admin123", "admin").await?;
    let user_id = ensure_user(&pool, "user@example.com", "user123", "user").await?;
    seed_products(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    let (user_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, password_hash, role)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .fetch_one(pool)
    .await?;

    Ok(user_id)
}

async fn seed_products(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let products: [(&str, &str, i64, Option<i64>, &[(&str, &str, i32)]); 3] = [
        (
            "Club Home Jersey",
            "jerseys",
            450_000,
            Some(380_000),
            &[("M", "Red", 12), ("L", "Red", 8), ("M", "Blue", 5)],
        ),
        (
            "Training Shorts",
            "shorts",
            220_000,
            None,
            &[("M", "Black", 20), ("L", "Black", 14)],
        ),
        // Flat-stock product, no variants.
        ("Water Bottle 750ml", "accessories", 90_000, None, &[]),
    ];

    for (name, category, price, sale_price, variants) in products {
        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM products WHERE name = $1")
            .bind(name)
            .fetch_optional(pool)
            .await?;
        if exists.is_some() {
            continue;
        }

        let product_id = Uuid::new_v4();
        let flat_stock = if variants.is_empty() { 30 } else { 0 };
        sqlx::query(
            r#"
            INSERT INTO products (id, name, category, original_price, sale_price, stock)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(product_id)
        .bind(name)
        .bind(category)
        .bind(price)
        .bind(sale_price)
        .bind(flat_stock)
        .execute(pool)
        .await?;

        for (size, color, quantity) in variants {
            sqlx::query(
                r#"
                INSERT INTO product_variants (id, product_id, size, color, quantity)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(product_id)
            .bind(size)
            .bind(color)
            .bind(quantity)
            .execute(pool)
            .await?;
        }
    }

    Ok(())
}
