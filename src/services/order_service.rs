use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::{
        CancelOrderRequest, OrderDetail, OrderList, PlaceOrderRequest, UpdateOrderStatusRequest,
    },
    entity::{
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        order_notes::{
            ActiveModel as OrderNoteActive, Column as OrderNoteCol, Entity as OrderNotes,
            Model as OrderNoteModel,
        },
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel,
        },
        products::Entity as Products,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{NoteKind, Order, OrderItem, OrderNote, OrderStatus},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::stock,
    state::AppState,
};

/// Turn a list of requested lines into a durable order. Stock checks, the
/// order write and the cart prune share one transaction: either every line
/// is reserved and the order exists, or nothing changed.
pub async fn place_order(
    state: &AppState,
    user: &AuthUser,
    payload: PlaceOrderRequest,
) -> AppResult<ApiResponse<OrderDetail>> {
    validate_lines(&payload.items)?;
    let payment_method = payload.payment_method.trim();
    if payment_method.is_empty() {
        return Err(AppError::BadRequest("payment_method is required".into()));
    }
    if payload.customer_name.trim().is_empty()
        || payload.customer_phone.trim().is_empty()
        || payload.customer_address.trim().is_empty()
    {
        return Err(AppError::BadRequest(
            "customer name, phone and address are required".into(),
        ));
    }

    let txn = state.orm.begin().await?;

    let order_id = Uuid::new_v4();
    let mut total: i64 = 0;
    let mut item_actives = Vec::with_capacity(payload.items.len());

    for line in &payload.items {
        let product = Products::find_by_id(line.product_id)
            .lock(LockType::Update)
            .one(&txn)
            .await?
            .ok_or(AppError::NotFound)?;

        // Unit price comes from the catalog row, never from the caller.
        let price = stock::unit_price(product.original_price, product.sale_price);
        stock::reserve_line(&txn, &product, &line.size, &line.color, line.quantity).await?;

        let subtotal = price * i64::from(line.quantity);
        total += subtotal;

        item_actives.push(OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            product_id: Set(product.id),
            name: Set(product.name.clone()),
            image: Set(product.image.clone()),
            price: Set(price),
            quantity: Set(line.quantity),
            size: Set(line.size.clone()),
            color: Set(line.color.clone()),
            subtotal: Set(subtotal),
            created_at: NotSet,
        });
    }

    let order = OrderActive {
        id: Set(order_id),
        user_id: Set(user.user_id),
        total: Set(total),
        customer_name: Set(payload.customer_name.trim().to_string()),
        customer_phone: Set(payload.customer_phone.trim().to_string()),
        customer_address: Set(payload.customer_address.trim().to_string()),
        payment_method: Set(payment_method.to_string()),
        status: Set(OrderStatus::AwaitingConfirmation.as_str().to_string()),
        app_trans_id: Set(None),
        gateway_trans_id: Set(None),
        paid_amount: Set(0),
        confirmed_at: Set(None),
        cancelled_at: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    for active in item_actives {
        active.insert(&txn).await?;
    }

    if let Some(note) = payload.note.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        append_note(&txn, order.id, NoteKind::Customer, note).await?;
    }

    for line in &payload.items {
        stock::prune_cart_line(&txn, user.user_id, line.product_id, &line.size, &line.color)
            .await?;
    }

    let detail = build_detail(&txn, order).await?;
    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_place",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order_id, "total": total })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order placed",
        detail,
        Some(Meta::empty()),
    ))
}

/// Cancel an order, returning its stock and cart lines. Calling this on an
/// already-cancelled order reports the existing cancellation instead of
/// failing, and restocks nothing.
pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: CancelOrderRequest,
) -> AppResult<ApiResponse<OrderDetail>> {
    let txn = state.orm.begin().await?;

    let mut condition = Condition::all().add(OrderCol::Id.eq(id));
    if user.role != "admin" {
        condition = condition.add(OrderCol::UserId.eq(user.user_id));
    }
    let order = Orders::find()
        .filter(condition)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if parse_status(&order.status)? == OrderStatus::Cancelled {
        let detail = build_detail(&txn, order).await?;
        txn.commit().await?;
        return Ok(ApiResponse::success(
            "Order already cancelled",
            detail,
            Some(Meta::empty()),
        ));
    }

    let updated = cancel_in_txn(&txn, order, payload.reason).await?;
    let detail = build_detail(&txn, updated).await?;
    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_cancel",
        Some("orders"),
        Some(serde_json::json!({ "order_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order cancelled",
        detail,
        Some(Meta::empty()),
    ))
}

/// Move an order along the status state machine. A request for `cancelled`
/// runs the full compensating procedure; there is no side door that merely
/// flips the field.
pub async fn update_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<OrderDetail>> {
    let next = OrderStatus::parse(payload.status.trim()).ok_or_else(|| {
        AppError::BadRequest(format!("unknown order status '{}'", payload.status))
    })?;

    let txn = state.orm.begin().await?;
    let order = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    let current = parse_status(&order.status)?;

    let updated = if next == OrderStatus::Cancelled {
        if current == OrderStatus::Cancelled {
            let detail = build_detail(&txn, order).await?;
            txn.commit().await?;
            return Ok(ApiResponse::success(
                "Order already cancelled",
                detail,
                Some(Meta::empty()),
            ));
        }
        cancel_in_txn(&txn, order, None).await?
    } else {
        if !current.can_transition_to(next) {
            return Err(AppError::InvalidTransition {
                from: current,
                to: next,
            });
        }
        append_note(
            &txn,
            order.id,
            NoteKind::Status,
            format!("Status changed from {current} to {next}"),
        )
        .await?;

        let now = Utc::now();
        let mut active: OrderActive = order.into();
        active.status = Set(next.as_str().to_string());
        if next == OrderStatus::Confirmed {
            active.confirmed_at = Set(Some(now.into()));
        }
        active.updated_at = Set(now.into());
        active.update(&txn).await?
    };

    let detail = build_detail(&txn, updated).await?;
    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_status_update",
        Some("orders"),
        Some(serde_json::json!({ "order_id": id, "status": next.as_str() })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order updated",
        detail,
        Some(Meta::empty()),
    ))
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();

    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        let status = OrderStatus::parse(status)
            .ok_or_else(|| AppError::BadRequest(format!("unknown order status '{status}'")))?;
        condition = condition.add(OrderCol::Status.eq(status.as_str()));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let mut finder = Orders::find().filter(condition);
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

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderDetail>> {
    let mut condition = Condition::all().add(OrderCol::Id.eq(id));
    if user.role != "admin" {
        condition = condition.add(OrderCol::UserId.eq(user.user_id));
    }
    let order = Orders::find()
        .filter(condition)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let detail = build_detail(&state.orm, order).await?;
    Ok(ApiResponse::success("Order", detail, Some(Meta::empty())))
}

/// Shared cancellation body: restock and cart restore (only while stock is
/// actually held), cancel note, status flip. Runs inside the caller's
/// transaction so a failure rolls everything back together.
pub(crate) async fn cancel_in_txn(
    txn: &DatabaseTransaction,
    order: OrderModel,
    reason: Option<String>,
) -> AppResult<OrderModel> {
    let current = parse_status(&order.status)?;
    if current == OrderStatus::Cancelled {
        return Err(AppError::AlreadyTerminal(OrderStatus::Cancelled));
    }
    if current == OrderStatus::Delivered {
        return Err(AppError::InvalidTransition {
            from: current,
            to: OrderStatus::Cancelled,
        });
    }

    if current.holds_stock() {
        let items = OrderItems::find()
            .filter(OrderItemCol::OrderId.eq(order.id))
            .all(txn)
            .await?;
        for item in &items {
            stock::release_line(txn, item).await?;
            stock::restore_cart_line(txn, order.user_id, item).await?;
        }
    }

    let message = reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or("Order cancelled")
        .to_string();
    append_note(txn, order.id, NoteKind::Cancel, message).await?;

    let now = Utc::now();
    let mut active: OrderActive = order.into();
    active.status = Set(OrderStatus::Cancelled.as_str().to_string());
    active.cancelled_at = Set(Some(now.into()));
    active.updated_at = Set(now.into());
    Ok(active.update(txn).await?)
}

pub(crate) async fn append_note(
    txn: &DatabaseTransaction,
    order_id: Uuid,
    kind: NoteKind,
    message: impl Into<String>,
) -> AppResult<()> {
    OrderNoteActive {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        kind: Set(kind.as_str().to_string()),
        message: Set(message.into()),
        created_at: NotSet,
    }
    .insert(txn)
    .await?;
    Ok(())
}

pub(crate) fn validate_lines(lines: &[crate::dto::orders::OrderLineInput]) -> AppResult<()> {
    if lines.is_empty() {
        return Err(AppError::BadRequest(
            "order must contain at least one item".into(),
        ));
    }
    for line in lines {
        if line.quantity < 1 {
            return Err(AppError::BadRequest("quantity must be at least 1".into()));
        }
    }
    Ok(())
}

pub(crate) async fn build_detail<C: ConnectionTrait>(
    conn: &C,
    order: OrderModel,
) -> AppResult<OrderDetail> {
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(conn)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    let notes = OrderNotes::find()
        .filter(OrderNoteCol::OrderId.eq(order.id))
        .order_by_asc(OrderNoteCol::CreatedAt)
        .all(conn)
        .await?
        .into_iter()
        .map(note_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    Ok(OrderDetail {
        order: order_from_entity(order)?,
        items,
        notes,
    })
}

pub(crate) fn parse_status(raw: &str) -> AppResult<OrderStatus> {
    OrderStatus::parse(raw).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!("unknown order status '{raw}' in store"))
    })
}

pub(crate) fn order_from_entity(model: OrderModel) -> AppResult<Order> {
    Ok(Order {
        id: model.id,
        user_id: model.user_id,
        total: model.total,
        customer_name: model.customer_name,
        customer_phone: model.customer_phone,
        customer_address: model.customer_address,
        payment_method: model.payment_method,
        status: parse_status(&model.status)?,
        app_trans_id: model.app_trans_id,
        gateway_trans_id: model.gateway_trans_id,
        paid_amount: model.paid_amount,
        confirmed_at: model.confirmed_at.map(|dt| dt.with_timezone(&Utc)),
        cancelled_at: model.cancelled_at.map(|dt| dt.with_timezone(&Utc)),
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

pub(crate) fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        name: model.name,
        image: model.image,
        price: model.price,
        quantity: model.quantity,
        size: model.size,
        color: model.color,
        subtotal: model.subtotal,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

fn note_from_entity(model: OrderNoteModel) -> AppResult<OrderNote> {
    let kind = NoteKind::parse(&model.kind).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!("unknown note kind '{}' in store", model.kind))
    })?;
    Ok(OrderNote {
        id: model.id,
        order_id: model.order_id,
        kind,
        message: model.message,
        created_at: model.created_at.with_timezone(&Utc),
    })
}
