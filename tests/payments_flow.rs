mod common;

use axum_sportshop_api::{
    dto::cart::AddToCartRequest,
    dto::orders::OrderLineInput,
    dto::payments::{CallbackRequest, InitiatePaymentRequest, QueryStatusRequest},
    error::AppError,
    models::OrderStatus,
    payment::{TransactionStatus, zalopay},
    services::{cart_service, payment_service},
};

use common::*;

fn line(product_id: uuid::Uuid, size: &str, color: &str, quantity: i32) -> OrderLineInput {
    OrderLineInput {
        product_id,
        size: size.into(),
        color: color.into(),
        quantity,
    }
}

fn initiate_request(items: Vec<OrderLineInput>) -> InitiatePaymentRequest {
    InitiatePaymentRequest {
        items,
        customer_name: "Test Customer".into(),
        customer_phone: "0900000000".into(),
        customer_address: "1 Test Street".into(),
        description: None,
    }
}

fn signed_callback(data: String, key: &str) -> CallbackRequest {
    let mac = zalopay::sign(&data, key);
    CallbackRequest {
        data,
        mac,
        kind: Some(1),
    }
}

fn success_data(app_trans_id: &str, amount: i64) -> String {
    serde_json::json!({
        "app_trans_id": app_trans_id,
        "zp_trans_id": 999_001_i64,
        "amount": amount,
        "status": 1,
    })
    .to_string()
}

// Spec scenario: a 500-unit basket is clamped to the 1000-unit gateway
// minimum, and session creation reserves nothing.
#[tokio::test]
async fn initiate_clamps_to_minimum_and_holds_no_stock() -> anyhow::Result<()> {
    let Some(state) = setup_state(StubGateway::ok()).await? else {
        return Ok(());
    };
    let user = create_user(&state, "user").await?;
    let product = create_flat_product(&state, 500, 10).await?;

    let resp = payment_service::initiate_payment(
        &state,
        &user,
        initiate_request(vec![line(product, "", "", 1)]),
    )
    .await?;
    let data = resp.data.expect("payment response");

    assert_eq!(data.amount, 1000);
    assert!(data.pay_url.contains(&data.app_trans_id));
    assert_eq!(order_status(&state, data.order_id).await?, "pending_payment");
    // Stock reservation happens only at confirmation.
    assert_eq!(flat_stock(&state, product).await?, 10);

    let (total,): (i64,) = sqlx::query_as("SELECT total FROM orders WHERE id = $1")
        .bind(data.order_id)
        .fetch_one(&state.pool)
        .await?;
    assert_eq!(total, 1000);

    Ok(())
}

#[tokio::test]
async fn gateway_rejection_persists_no_order() -> anyhow::Result<()> {
    let Some(state) = setup_state(StubGateway::rejecting()).await? else {
        return Ok(());
    };
    let user = create_user(&state, "user").await?;
    let product = create_flat_product(&state, 50_000, 10).await?;

    let err = payment_service::initiate_payment(
        &state,
        &user,
        initiate_request(vec![line(product, "", "", 1)]),
    )
    .await
    .expect_err("gateway rejects");
    assert!(matches!(err, AppError::GatewayRejected { .. }));
    assert_eq!(order_count(&state, user.user_id).await?, 0);

    Ok(())
}

// A valid success callback reserves stock, prunes the cart and moves the
// order forward; a duplicate delivery changes nothing further.
#[tokio::test]
async fn success_callback_applies_side_effects_exactly_once() -> anyhow::Result<()> {
    let Some(state) = setup_state(StubGateway::ok()).await? else {
        return Ok(());
    };
    let user = create_user(&state, "user").await?;
    let product = create_variant_product(&state, 250_000, None, &[("M", "Red", 10)]).await?;

    cart_service::add_to_cart(
        &state.pool,
        &user,
        AddToCartRequest {
            product_id: product,
            size: "M".into(),
            color: "Red".into(),
            quantity: 2,
        },
    )
    .await?;

    let resp = payment_service::initiate_payment(
        &state,
        &user,
        initiate_request(vec![line(product, "M", "Red", 2)]),
    )
    .await?;
    let payment = resp.data.expect("payment response");
    assert_eq!(variant_quantity(&state, product, "M", "Red").await?, 10);

    let callback = signed_callback(
        success_data(&payment.app_trans_id, payment.amount),
        "test-key2",
    );
    let ack = payment_service::handle_callback(&state, callback).await;
    assert_eq!(ack.return_code, 1);

    assert_eq!(order_status(&state, payment.order_id).await?, "awaiting_confirmation");
    assert_eq!(variant_quantity(&state, product, "M", "Red").await?, 8);

    let (gateway_trans_id, paid_amount): (Option<String>, i64) =
        sqlx::query_as("SELECT gateway_trans_id, paid_amount FROM orders WHERE id = $1")
            .bind(payment.order_id)
            .fetch_one(&state.pool)
            .await?;
    assert_eq!(gateway_trans_id.as_deref(), Some("999001"));
    assert_eq!(paid_amount, payment.amount);

    let cart = cart_service::list_cart(
        &state.pool,
        &user,
        axum_sportshop_api::routes::params::Pagination {
            page: None,
            per_page: None,
        },
    )
    .await?;
    assert!(cart.data.expect("cart").items.is_empty());

    // At-least-once delivery: the duplicate acknowledges without reapplying.
    let duplicate = signed_callback(
        success_data(&payment.app_trans_id, payment.amount),
        "test-key2",
    );
    let ack = payment_service::handle_callback(&state, duplicate).await;
    assert_eq!(ack.return_code, 1);
    assert_eq!(variant_quantity(&state, product, "M", "Red").await?, 8);

    Ok(())
}

#[tokio::test]
async fn invalid_mac_mutates_nothing() -> anyhow::Result<()> {
    let Some(state) = setup_state(StubGateway::ok()).await? else {
        return Ok(());
    };
    let user = create_user(&state, "user").await?;
    let product = create_variant_product(&state, 250_000, None, &[("M", "Red", 10)]).await?;

    let resp = payment_service::initiate_payment(
        &state,
        &user,
        initiate_request(vec![line(product, "M", "Red", 2)]),
    )
    .await?;
    let payment = resp.data.expect("payment response");

    let callback = signed_callback(
        success_data(&payment.app_trans_id, payment.amount),
        "wrong-key",
    );
    let ack = payment_service::handle_callback(&state, callback).await;
    assert_eq!(ack.return_code, -1);

    assert_eq!(order_status(&state, payment.order_id).await?, "pending_payment");
    assert_eq!(variant_quantity(&state, product, "M", "Red").await?, 10);

    Ok(())
}

#[tokio::test]
async fn failure_callback_cancels_without_restock() -> anyhow::Result<()> {
    let Some(state) = setup_state(StubGateway::ok()).await? else {
        return Ok(());
    };
    let user = create_user(&state, "user").await?;
    let product = create_variant_product(&state, 250_000, None, &[("M", "Red", 10)]).await?;

    let resp = payment_service::initiate_payment(
        &state,
        &user,
        initiate_request(vec![line(product, "M", "Red", 2)]),
    )
    .await?;
    let payment = resp.data.expect("payment response");

    let data = serde_json::json!({
        "app_trans_id": payment.app_trans_id,
        "status": 0,
    })
    .to_string();
    let ack = payment_service::handle_callback(&state, signed_callback(data, "test-key2")).await;
    assert_eq!(ack.return_code, 1);

    assert_eq!(order_status(&state, payment.order_id).await?, "cancelled");
    // No stock was held by the pending order, so none comes back.
    assert_eq!(variant_quantity(&state, product, "M", "Red").await?, 10);

    Ok(())
}

#[tokio::test]
async fn unknown_transaction_gets_distinct_ack() -> anyhow::Result<()> {
    let Some(state) = setup_state(StubGateway::ok()).await? else {
        return Ok(());
    };

    let data = success_data("990101_000000", 1000);
    let ack = payment_service::handle_callback(&state, signed_callback(data, "test-key2")).await;
    assert_eq!(ack.return_code, 2);

    Ok(())
}

#[tokio::test]
async fn query_fallback_confirms_pending_order() -> anyhow::Result<()> {
    let gateway = StubGateway::with_query(TransactionStatus::Succeeded {
        gateway_trans_id: Some("424242".into()),
        amount: 500_000,
    });
    let Some(state) = setup_state(gateway).await? else {
        return Ok(());
    };
    let user = create_user(&state, "user").await?;
    let product = create_variant_product(&state, 250_000, None, &[("M", "Red", 10)]).await?;

    let resp = payment_service::initiate_payment(
        &state,
        &user,
        initiate_request(vec![line(product, "M", "Red", 2)]),
    )
    .await?;
    let payment = resp.data.expect("payment response");

    let result = payment_service::query_status(
        &state,
        QueryStatusRequest {
            app_trans_id: payment.app_trans_id.clone(),
        },
    )
    .await?;
    let status = result.data.expect("status");
    assert_eq!(status.status, OrderStatus::AwaitingConfirmation);
    assert_eq!(status.paid_amount, 500_000);
    assert_eq!(variant_quantity(&state, product, "M", "Red").await?, 8);

    // Safe to call repeatedly.
    payment_service::query_status(
        &state,
        QueryStatusRequest {
            app_trans_id: payment.app_trans_id.clone(),
        },
    )
    .await?;
    assert_eq!(variant_quantity(&state, product, "M", "Red").await?, 8);

    Ok(())
}

#[tokio::test]
async fn query_fallback_cancels_failed_payment() -> anyhow::Result<()> {
    let gateway = StubGateway::with_query(TransactionStatus::Failed {
        code: 2,
        message: "user abandoned".into(),
    });
    let Some(state) = setup_state(gateway).await? else {
        return Ok(());
    };
    let user = create_user(&state, "user").await?;
    let product = create_variant_product(&state, 250_000, None, &[("M", "Red", 10)]).await?;

    let resp = payment_service::initiate_payment(
        &state,
        &user,
        initiate_request(vec![line(product, "M", "Red", 2)]),
    )
    .await?;
    let payment = resp.data.expect("payment response");

    let result = payment_service::query_status(
        &state,
        QueryStatusRequest {
            app_trans_id: payment.app_trans_id,
        },
    )
    .await?;
    assert_eq!(result.data.expect("status").status, OrderStatus::Cancelled);
    assert_eq!(variant_quantity(&state, product, "M", "Red").await?, 10);

    Ok(())
}

#[tokio::test]
async fn query_leaves_processing_payment_pending() -> anyhow::Result<()> {
    let Some(state) = setup_state(StubGateway::ok()).await? else {
        return Ok(());
    };
    let user = create_user(&state, "user").await?;
    let product = create_flat_product(&state, 250_000, 10).await?;

    let resp = payment_service::initiate_payment(
        &state,
        &user,
        initiate_request(vec![line(product, "", "", 1)]),
    )
    .await?;
    let payment = resp.data.expect("payment response");

    let result = payment_service::query_status(
        &state,
        QueryStatusRequest {
            app_trans_id: payment.app_trans_id,
        },
    )
    .await?;
    assert_eq!(
        result.data.expect("status").status,
        OrderStatus::PendingPayment
    );
    assert_eq!(flat_stock(&state, product).await?, 10);

    Ok(())
}
