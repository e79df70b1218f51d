#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use axum_sportshop_api::{
    config::ZaloPayConfig,
    db::{create_orm_conn, create_pool},
    middleware::auth::AuthUser,
    payment::{
        GatewayError, PaymentGateway, SessionHandle, SessionRequest, TransactionStatus,
    },
    state::AppState,
};

/// Scripted in-process gateway; no network involved.
pub struct StubGateway {
    pub fail_create: bool,
    pub query_result: TransactionStatus,
}

impl StubGateway {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self {
            fail_create: false,
            query_result: TransactionStatus::Processing,
        })
    }

    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            fail_create: true,
            query_result: TransactionStatus::Processing,
        })
    }

    pub fn with_query(query_result: TransactionStatus) -> Arc<Self> {
        Arc::new(Self {
            fail_create: false,
            query_result,
        })
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_session(&self, req: &SessionRequest) -> Result<SessionHandle, GatewayError> {
        if self.fail_create {
            return Err(GatewayError::Rejected {
                code: 2,
                message: "scripted rejection".into(),
            });
        }
        Ok(SessionHandle {
            pay_url: format!("https://gateway.test/pay/{}", req.app_trans_id),
            token: Some("test-token".into()),
        })
    }

    async fn query_transaction(
        &self,
        _app_trans_id: &str,
    ) -> Result<TransactionStatus, GatewayError> {
        Ok(self.query_result.clone())
    }
}

pub fn test_zalopay_config() -> ZaloPayConfig {
    ZaloPayConfig {
        app_id: 2553,
        key1: "test-key1".into(),
        key2: "test-key2".into(),
        create_url: String::new(),
        query_url: String::new(),
        callback_url: String::new(),
        redirect_url: String::new(),
        min_amount: 1000,
        timeout_secs: 5,
    }
}

/// Build an AppState against the configured test database, or None to skip
/// when no database is available. Fixtures are unique per test, so suites
/// can run concurrently without cleaning tables.
pub async fn setup_state(gateway: Arc<dyn PaymentGateway>) -> anyhow::Result<Option<AppState>> {
    let database_url =
        match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
            Ok(url) => url,
            Err(_) => {
                eprintln!(
                    "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
                );
                return Ok(None);
            }
        };

    let pool = create_pool(&database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    let orm = create_orm_conn(&database_url).await?;

    Ok(Some(AppState {
        pool,
        orm,
        gateway,
        zalopay: test_zalopay_config(),
    }))
}

pub async fn create_user(state: &AppState, role: &str) -> anyhow::Result<AuthUser> {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, email, password_hash, role) VALUES ($1, $2, $3, $4)")
        .bind(id)
        .bind(format!("{id}@example.com"))
        .bind("dummy")
        .bind(role)
        .execute(&state.pool)
        .await?;
    Ok(AuthUser {
        user_id: id,
        role: role.into(),
    })
}

pub async fn create_variant_product(
    state: &AppState,
    price: i64,
    sale_price: Option<i64>,
    variants: &[(&str, &str, i32)],
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO products (id, name, original_price, sale_price, stock) VALUES ($1, $2, $3, $4, 0)",
    )
    .bind(id)
    .bind(format!("product-{id}"))
    .bind(price)
    .bind(sale_price)
    .execute(&state.pool)
    .await?;

    for (size, color, quantity) in variants {
        sqlx::query(
            "INSERT INTO product_variants (id, product_id, size, color, quantity) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(id)
        .bind(size)
        .bind(color)
        .bind(quantity)
        .execute(&state.pool)
        .await?;
    }

    Ok(id)
}

pub async fn create_flat_product(state: &AppState, price: i64, stock: i32) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO products (id, name, original_price, stock) VALUES ($1, $2, $3, $4)",
    )
    .bind(id)
    .bind(format!("product-{id}"))
    .bind(price)
    .bind(stock)
    .execute(&state.pool)
    .await?;
    Ok(id)
}

pub async fn variant_quantity(
    state: &AppState,
    product_id: Uuid,
    size: &str,
    color: &str,
) -> anyhow::Result<i32> {
    let (quantity,): (i32,) = sqlx::query_as(
        "SELECT quantity FROM product_variants WHERE product_id = $1 AND size = $2 AND color = $3",
    )
    .bind(product_id)
    .bind(size)
    .bind(color)
    .fetch_one(&state.pool)
    .await?;
    Ok(quantity)
}

pub async fn flat_stock(state: &AppState, product_id: Uuid) -> anyhow::Result<i32> {
    let (stock,): (i32,) = sqlx::query_as("SELECT stock FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_one(&state.pool)
        .await?;
    Ok(stock)
}

pub async fn order_status(state: &AppState, order_id: Uuid) -> anyhow::Result<String> {
    let (status,): (String,) = sqlx::query_as("SELECT status FROM orders WHERE id = $1")
        .bind(order_id)
        .fetch_one(&state.pool)
        .await?;
    Ok(status)
}

pub async fn order_count(state: &AppState, user_id: Uuid) -> anyhow::Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&state.pool)
        .await?;
    Ok(count)
}
