use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::{OrderDetail, OrderList, UpdateOrderStatusRequest},
    dto::products::{LowStockList, LowStockProduct},
    entity::{
        orders::{Column as OrderCol, Entity as Orders},
        product_variants::{
            ActiveModel as VariantActive, Column as VariantCol, Entity as ProductVariants,
        },
        products::{ActiveModel as ProductActive, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::OrderStatus,
    response::{ApiResponse, Meta},
    routes::admin::{InventoryAdjustRequest, LowStockQuery},
    routes::params::{OrderListQuery, SortOrder},
    services::order_service::{self, build_detail, order_from_entity},
    state::AppState,
};

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination.normalize();

    let mut condition = Condition::all();
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        let status = OrderStatus::parse(status)
            .ok_or_else(|| AppError::BadRequest(format!("unknown order status '{status}'")))?;
        condition = condition.add(OrderCol::Status.eq(status.as_str()));
    }

    let mut finder = Orders::find().filter(condition);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Orders",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn get_order_admin(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderDetail>> {
    ensure_admin(user)?;
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let detail = build_detail(&state.orm, order).await?;
    Ok(ApiResponse::success(
        "Order found",
        detail,
        Some(Meta::empty()),
    ))
}

/// Admin status changes go through the same state machine and compensating
/// cancel procedure as every other entry point.
pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<OrderDetail>> {
    ensure_admin(user)?;
    order_service::update_status(state, user, id, payload).await
}

pub async fn list_low_stock(
    state: &AppState,
    user: &AuthUser,
    query: LowStockQuery,
) -> AppResult<ApiResponse<LowStockList>> {
    ensure_admin(user)?;
    let threshold = i64::from(query.threshold.unwrap_or(5));
    let (page, limit, offset) = query.pagination.normalize();

    let items = sqlx::query_as::<_, LowStockProduct>(
        r#"
        SELECT p.id, p.name, p.category, p.status,
               COALESCE(SUM(v.quantity), p.stock)::BIGINT AS available
        FROM products p
        LEFT JOIN product_variants v ON v.product_id = p.id
        GROUP BY p.id
        HAVING COALESCE(SUM(v.quantity), p.stock) <= $1
        ORDER BY available ASC, p.created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(threshold)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM (
            SELECT p.id
            FROM products p
            LEFT JOIN product_variants v ON v.product_id = p.id
            GROUP BY p.id
            HAVING COALESCE(SUM(v.quantity), p.stock) <= $1
        ) low
        "#,
    )
    .bind(threshold)
    .fetch_one(&state.pool)
    .await?;

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success(
        "Low stock",
        LowStockList { items },
        Some(meta),
    ))
}

/// Manual stock correction for one variant or a variant-less product's flat
/// counter. Rejects adjustments that would take the counter negative.
pub async fn adjust_inventory(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: InventoryAdjustRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    if payload.delta == 0 {
        return Err(AppError::BadRequest("delta must not be 0".into()));
    }

    let txn = state.orm.begin().await?;
    let product = Products::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let size = payload.size.as_deref().unwrap_or("");
    let color = payload.color.as_deref().unwrap_or("");

    let variant = ProductVariants::find()
        .filter(VariantCol::ProductId.eq(id))
        .filter(VariantCol::Size.eq(size))
        .filter(VariantCol::Color.eq(color))
        .lock(LockType::Update)
        .one(&txn)
        .await?;

    let remaining = match variant {
        Some(variant) => {
            let new_quantity = variant.quantity + payload.delta;
            if new_quantity < 0 {
                return Err(AppError::BadRequest("stock cannot be negative".into()));
            }
            let mut active: VariantActive = variant.into();
            active.quantity = Set(new_quantity);
            active.update(&txn).await?;
            new_quantity
        }
        None => {
            let has_variants = ProductVariants::find()
                .filter(VariantCol::ProductId.eq(id))
                .count(&txn)
                .await?
                > 0;
            if has_variants {
                return Err(AppError::BadRequest(format!(
                    "product {} has no {size}/{color} variant",
                    product.name
                )));
            }
            let new_stock = product.stock + payload.delta;
            if new_stock < 0 {
                return Err(AppError::BadRequest("stock cannot be negative".into()));
            }
            let mut active: ProductActive = product.into();
            active.stock = Set(new_stock);
            active.update(&txn).await?;
            new_stock
        }
    };

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "inventory_adjust",
        Some("products"),
        Some(serde_json::json!({
            "product_id": id,
            "size": size,
            "color": color,
            "delta": payload.delta,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Inventory updated",
        serde_json::json!({ "product_id": id, "size": size, "color": color, "quantity": remaining }),
        Some(Meta::empty()),
    ))
}
