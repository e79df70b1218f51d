use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QuerySelect, Set,
    TransactionTrait,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::payments::{
        CallbackAck, CallbackRequest, InitiatePaymentRequest, InitiatePaymentResponse,
        QueryStatusRequest, QueryStatusResponse,
    },
    entity::{
        order_items::{ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders},
        product_variants::{Column as VariantCol, Entity as ProductVariants},
        products::Entity as Products,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{NoteKind, OrderStatus},
    payment::{SessionItem, SessionRequest, TransactionStatus, zalopay},
    response::{ApiResponse, Meta},
    services::{
        order_service::{append_note, cancel_in_txn, parse_status, validate_lines},
        stock::{self, LineOutcome},
    },
    state::AppState,
};

/// Payload the gateway signs into the callback's `data` string.
#[derive(Debug, Deserialize)]
struct CallbackData {
    app_trans_id: String,
    #[serde(default)]
    zp_trans_id: Option<i64>,
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    status: i64,
}

/// Open a payment session with the gateway and persist a pending order for
/// the eventual confirmation to land on. No stock is reserved here: an
/// abandoned session must never hold inventory.
pub async fn initiate_payment(
    state: &AppState,
    user: &AuthUser,
    payload: InitiatePaymentRequest,
) -> AppResult<ApiResponse<InitiatePaymentResponse>> {
    validate_lines(&payload.items)?;

    let mut total: i64 = 0;
    let mut priced = Vec::with_capacity(payload.items.len());
    let mut session_items = Vec::with_capacity(payload.items.len());

    for line in &payload.items {
        let product = Products::find_by_id(line.product_id)
            .one(&state.orm)
            .await?
            .ok_or(AppError::NotFound)?;

        let variant = ProductVariants::find()
            .filter(VariantCol::ProductId.eq(product.id))
            .filter(VariantCol::Size.eq(line.size.as_str()))
            .filter(VariantCol::Color.eq(line.color.as_str()))
            .one(&state.orm)
            .await?;
        if variant.is_none() {
            let variant_count = ProductVariants::find()
                .filter(VariantCol::ProductId.eq(product.id))
                .count(&state.orm)
                .await?;
            if variant_count > 0 {
                return Err(AppError::BadRequest(format!(
                    "product {} has no {}/{} variant",
                    product.name, line.size, line.color
                )));
            }
        }

        let price = stock::unit_price(product.original_price, product.sale_price);
        let subtotal = price * i64::from(line.quantity);
        total += subtotal;

        session_items.push(SessionItem {
            name: product.name.clone(),
            quantity: line.quantity,
            price,
        });
        priced.push((line.clone(), product, price, subtotal));
    }

    // The gateway refuses amounts below its minimum; what we persist must
    // match what we send.
    let amount = total.max(state.zalopay.min_amount);
    let app_trans_id = zalopay::build_app_trans_id();
    let description = payload
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or("Order payment")
        .to_string();

    // Session creation comes first: if the gateway refuses, no order row
    // may exist.
    let session = state
        .gateway
        .create_session(&SessionRequest {
            app_trans_id: app_trans_id.clone(),
            app_user: user.user_id.to_string(),
            amount,
            description,
            items: session_items,
        })
        .await?;

    let txn = state.orm.begin().await?;

    let order_id = Uuid::new_v4();
    let order = OrderActive {
        id: Set(order_id),
        user_id: Set(user.user_id),
        total: Set(amount),
        customer_name: Set(payload.customer_name.trim().to_string()),
        customer_phone: Set(payload.customer_phone.trim().to_string()),
        customer_address: Set(payload.customer_address.trim().to_string()),
        payment_method: Set("zalopay".to_string()),
        status: Set(OrderStatus::PendingPayment.as_str().to_string()),
        app_trans_id: Set(Some(app_trans_id.clone())),
        gateway_trans_id: Set(None),
        paid_amount: Set(0),
        confirmed_at: Set(None),
        cancelled_at: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    for (line, product, price, subtotal) in &priced {
        OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(product.id),
            name: Set(product.name.clone()),
            image: Set(product.image.clone()),
            price: Set(*price),
            quantity: Set(line.quantity),
            size: Set(line.size.clone()),
            color: Set(line.color.clone()),
            subtotal: Set(*subtotal),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
    }

    append_note(
        &txn,
        order.id,
        NoteKind::System,
        format!("Payment session {app_trans_id} opened"),
    )
    .await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "payment_initiate",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "app_trans_id": app_trans_id, "amount": amount })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Payment session created",
        InitiatePaymentResponse {
            order_id: order.id,
            app_trans_id,
            amount,
            pay_url: session.pay_url,
            token: session.token,
        },
        Some(Meta::empty()),
    ))
}

/// Gateway callback entry point. Deliveries are at-least-once, possibly
/// duplicated, possibly for sessions this ledger never saw; every path
/// answers with a structured ack rather than an HTTP error.
pub async fn handle_callback(state: &AppState, payload: CallbackRequest) -> CallbackAck {
    // MAC first; nothing in `data` is trusted before this passes.
    if !zalopay::verify_callback_mac(&payload.data, &payload.mac, &state.zalopay.key2) {
        tracing::warn!("payment callback rejected: MAC mismatch");
        return CallbackAck::new(-1, "mac verification failed");
    }

    let data: CallbackData = match serde_json::from_str(&payload.data) {
        Ok(data) => data,
        Err(err) => {
            tracing::warn!(error = %err, "payment callback carried unparseable data");
            return CallbackAck::new(0, "malformed payload");
        }
    };

    match process_callback(state, &data).await {
        Ok(ack) => ack,
        Err(err) => {
            tracing::error!(
                error = %err,
                app_trans_id = %data.app_trans_id,
                "payment callback processing failed"
            );
            CallbackAck::new(0, "internal error")
        }
    }
}

async fn process_callback(state: &AppState, data: &CallbackData) -> AppResult<CallbackAck> {
    let order = Orders::find()
        .filter(OrderCol::AppTransId.eq(data.app_trans_id.as_str()))
        .one(&state.orm)
        .await?;
    let Some(order) = order else {
        // Late or duplicate delivery for a session this ledger never saw.
        return Ok(CallbackAck::new(2, "transaction not recognized"));
    };

    if parse_status(&order.status)? != OrderStatus::PendingPayment {
        return Ok(CallbackAck::new(1, "already processed"));
    }

    if data.status != 1 {
        apply_payment_failure(state, order.id, "Payment failed at the gateway".to_string())
            .await?;
        return Ok(CallbackAck::new(1, "ok"));
    }

    apply_payment_success(
        state,
        order.id,
        data.zp_trans_id.map(|id| id.to_string()),
        data.amount,
    )
    .await?;
    Ok(CallbackAck::new(1, "ok"))
}

/// Pull-based fallback for lost or delayed callbacks. Resolved orders are
/// answered locally; only a still-pending order triggers a gateway query,
/// and both outcomes converge on the same idempotent procedures the
/// callback uses.
pub async fn query_status(
    state: &AppState,
    payload: QueryStatusRequest,
) -> AppResult<ApiResponse<QueryStatusResponse>> {
    let order = Orders::find()
        .filter(OrderCol::AppTransId.eq(payload.app_trans_id.as_str()))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    if parse_status(&order.status)? == OrderStatus::PendingPayment {
        match state.gateway.query_transaction(&payload.app_trans_id).await? {
            TransactionStatus::Succeeded {
                gateway_trans_id,
                amount,
            } => {
                apply_payment_success(state, order.id, gateway_trans_id, Some(amount)).await?;
            }
            TransactionStatus::Failed { code, message } => {
                apply_payment_failure(
                    state,
                    order.id,
                    format!("Gateway reported failure (code {code}): {message}"),
                )
                .await?;
            }
            TransactionStatus::Processing => {}
        }
    }

    let order = Orders::find_by_id(order.id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(ApiResponse::success(
        "Payment status",
        QueryStatusResponse {
            order_id: order.id,
            app_trans_id: payload.app_trans_id,
            status: parse_status(&order.status)?,
            paid_amount: order.paid_amount,
        },
        Some(Meta::empty()),
    ))
}

/// Confirmation procedure shared by the callback and the status query.
/// Returns false when another delivery already applied it. Stock is
/// reserved here, at confirmation time, exactly once: the pending-status
/// gate under the row lock makes redelivery a no-op.
async fn apply_payment_success(
    state: &AppState,
    order_id: Uuid,
    gateway_trans_id: Option<String>,
    amount: Option<i64>,
) -> AppResult<bool> {
    let txn = state.orm.begin().await?;

    let order = Orders::find_by_id(order_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    if parse_status(&order.status)? != OrderStatus::PendingPayment {
        txn.commit().await?;
        return Ok(false);
    }

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&txn)
        .await?;

    let mut shortages = Vec::new();
    for item in &items {
        match stock::reserve_line_lenient(&txn, item).await? {
            LineOutcome::Reserved => {}
            LineOutcome::Short { available } => shortages.push(format!(
                "{} {}/{} ({} available, {} paid for)",
                item.name, item.size, item.color, available, item.quantity
            )),
            LineOutcome::Gone => shortages.push(format!(
                "{} {}/{} (no longer in catalog)",
                item.name, item.size, item.color
            )),
        }
    }

    for item in &items {
        stock::prune_cart_line(&txn, order.user_id, item.product_id, &item.size, &item.color)
            .await?;
    }

    if !shortages.is_empty() {
        append_note(
            &txn,
            order.id,
            NoteKind::System,
            format!("Stock short at payment confirmation: {}", shortages.join("; ")),
        )
        .await?;
    }

    let gateway_ref = gateway_trans_id.as_deref().unwrap_or("-").to_string();
    append_note(
        &txn,
        order.id,
        NoteKind::System,
        format!("Payment confirmed (gateway transaction {gateway_ref})"),
    )
    .await?;

    let now = Utc::now();
    let paid = amount.unwrap_or(order.total);
    let mut active: OrderActive = order.into();
    active.status = Set(OrderStatus::AwaitingConfirmation.as_str().to_string());
    active.gateway_trans_id = Set(gateway_trans_id);
    active.paid_amount = Set(paid);
    active.confirmed_at = Set(Some(now.into()));
    active.updated_at = Set(now.into());
    active.update(&txn).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        None,
        "payment_confirm",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order_id, "paid_amount": paid })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(true)
}

/// Failure counterpart: a pending order that never held stock moves to
/// cancelled without any restock. No-op unless still pending.
async fn apply_payment_failure(state: &AppState, order_id: Uuid, reason: String) -> AppResult<bool> {
    let txn = state.orm.begin().await?;

    let order = Orders::find_by_id(order_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    if parse_status(&order.status)? != OrderStatus::PendingPayment {
        txn.commit().await?;
        return Ok(false);
    }

    cancel_in_txn(&txn, order, Some(reason)).await?;
    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        None,
        "payment_cancel",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(true)
}

/// Redirect landing endpoint: resolves the user-facing result from the
/// local ledger, never from redirect query parameters alone.
pub async fn payment_return(
    state: &AppState,
    app_trans_id: Option<String>,
    claimed_success: bool,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let resolved = match app_trans_id.as_deref() {
        Some(id) => {
            let order = Orders::find()
                .filter(OrderCol::AppTransId.eq(id))
                .one(&state.orm)
                .await?;
            match order {
                Some(order) => parse_status(&order.status)?.holds_stock(),
                None => claimed_success,
            }
        }
        None => claimed_success,
    };

    let status = if resolved { "success" } else { "failed" };
    Ok(ApiResponse::success(
        "Payment result",
        serde_json::json!({
            "status": status,
            "app_trans_id": app_trans_id,
        }),
        Some(Meta::empty()),
    ))
}
