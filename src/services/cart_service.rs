use uuid::Uuid;

use crate::{
    audit::log_audit,
    db::DbPool,
    dto::cart::{AddToCartRequest, CartList, UpdateCartItemRequest},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::CartItem,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::stock::unit_price,
};

pub async fn list_cart(
    pool: &DbPool,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<CartList>> {
    let (page, limit, offset) = pagination.normalize();
    let items = sqlx::query_as::<_, CartItem>(
        "SELECT * FROM cart_items WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(user.user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cart_items WHERE user_id = $1")
        .bind(user.user_id)
        .fetch_one(pool)
        .await?;

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success("OK", CartList { items }, Some(meta)))
}

/// Add a line to the cart. Lines are keyed by (product, size, color):
/// adding to an existing key increments its quantity instead of duplicating
/// the line. Display fields are denormalized from the catalog at add time.
pub async fn add_to_cart(
    pool: &DbPool,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartItem>> {
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let product: Option<(String, Option<String>, i64, Option<i64>)> = sqlx::query_as(
        "SELECT name, image, original_price, sale_price FROM products WHERE id = $1",
    )
    .bind(payload.product_id)
    .fetch_optional(pool)
    .await?;
    let Some((name, image, original_price, sale_price)) = product else {
        return Err(AppError::BadRequest("product not found".to_string()));
    };

    let variant_exists: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM product_variants WHERE product_id = $1 AND size = $2 AND color = $3",
    )
    .bind(payload.product_id)
    .bind(payload.size.as_str())
    .bind(payload.color.as_str())
    .fetch_one(pool)
    .await?;
    if variant_exists.0 == 0 {
        let variant_count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM product_variants WHERE product_id = $1")
                .bind(payload.product_id)
                .fetch_one(pool)
                .await?;
        if variant_count.0 > 0 {
            return Err(AppError::BadRequest(format!(
                "product {} has no {}/{} variant",
                name, payload.size, payload.color
            )));
        }
    }

    let price = unit_price(original_price, sale_price);

    let cart_item: CartItem = sqlx::query_as(
        r#"
        INSERT INTO cart_items (id, user_id, product_id, name, image, price, size, color, quantity)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (user_id, product_id, size, color)
        DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user.user_id)
    .bind(payload.product_id)
    .bind(name)
    .bind(image)
    .bind(price)
    .bind(payload.size.as_str())
    .bind(payload.color.as_str())
    .bind(payload.quantity)
    .fetch_one(pool)
    .await?;

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "cart_add",
        Some("cart_items"),
        Some(serde_json::json!({
            "product_id": payload.product_id,
            "size": payload.size,
            "color": payload.color,
            "quantity": payload.quantity,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("OK", cart_item, None))
}

pub async fn update_cart_item(
    pool: &DbPool,
    user: &AuthUser,
    item_id: Uuid,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<CartItem>> {
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let cart_item: Option<CartItem> = sqlx::query_as(
        r#"
        UPDATE cart_items
        SET quantity = $3
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(item_id)
    .bind(user.user_id)
    .bind(payload.quantity)
    .fetch_optional(pool)
    .await?;

    let cart_item = cart_item.ok_or(AppError::NotFound)?;

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "cart_update",
        Some("cart_items"),
        Some(serde_json::json!({ "item_id": item_id, "quantity": payload.quantity })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("OK", cart_item, None))
}

pub async fn remove_from_cart(
    pool: &DbPool,
    user: &AuthUser,
    item_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND user_id = $2")
        .bind(item_id)
        .bind(user.user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "cart_remove",
        Some("cart_items"),
        Some(serde_json::json!({ "item_id": item_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Removed from cart",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}
