mod common;

use axum_sportshop_api::{
    dto::cart::AddToCartRequest,
    dto::orders::{
        CancelOrderRequest, OrderLineInput, PlaceOrderRequest, UpdateOrderStatusRequest,
    },
    error::AppError,
    models::{NoteKind, OrderStatus},
    services::{admin_service, cart_service, order_service},
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

fn place_request(items: Vec<OrderLineInput>) -> PlaceOrderRequest {
    PlaceOrderRequest {
        items,
        payment_method: "cod".into(),
        customer_name: "Test Customer".into(),
        customer_phone: "0900000000".into(),
        customer_address: "1 Test Street".into(),
        note: None,
    }
}

// Spec scenario: ordering one cart line leaves the other untouched, and the
// price comes from the catalog (sale price), not the cart snapshot.
#[tokio::test]
async fn place_order_prunes_only_purchased_cart_lines() -> anyhow::Result<()> {
    let Some(state) = setup_state(StubGateway::ok()).await? else {
        return Ok(());
    };
    let user = create_user(&state, "user").await?;

    let product_a =
        create_variant_product(&state, 450_000, Some(380_000), &[("M", "Red", 10)]).await?;
    let product_b = create_variant_product(&state, 200_000, None, &[("L", "Blue", 5)]).await?;

    cart_service::add_to_cart(
        &state.pool,
        &user,
        AddToCartRequest {
            product_id: product_a,
            size: "M".into(),
            color: "Red".into(),
            quantity: 2,
        },
    )
    .await?;
    cart_service::add_to_cart(
        &state.pool,
        &user,
        AddToCartRequest {
            product_id: product_b,
            size: "L".into(),
            color: "Blue".into(),
            quantity: 1,
        },
    )
    .await?;

    let resp =
        order_service::place_order(&state, &user, place_request(vec![line(product_a, "M", "Red", 2)]))
            .await?;
    let detail = resp.data.expect("order detail");

    // Re-priced from the catalog: sale price 380k wins over list price 450k.
    assert_eq!(detail.order.total, 760_000);
    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.items[0].subtotal, 760_000);
    assert_eq!(detail.order.status, OrderStatus::AwaitingConfirmation);

    assert_eq!(variant_quantity(&state, product_a, "M", "Red").await?, 8);
    assert_eq!(variant_quantity(&state, product_b, "L", "Blue").await?, 5);

    let cart = cart_service::list_cart(
        &state.pool,
        &user,
        axum_sportshop_api::routes::params::Pagination {
            page: None,
            per_page: None,
        },
    )
    .await?;
    let items = cart.data.expect("cart").items;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].product_id, product_b);

    Ok(())
}

#[tokio::test]
async fn grand_total_equals_sum_of_subtotals() -> anyhow::Result<()> {
    let Some(state) = setup_state(StubGateway::ok()).await? else {
        return Ok(());
    };
    let user = create_user(&state, "user").await?;

    let product_a = create_variant_product(&state, 120_000, None, &[("M", "Red", 10)]).await?;
    let product_b = create_flat_product(&state, 90_000, 10).await?;

    let resp = order_service::place_order(
        &state,
        &user,
        place_request(vec![
            line(product_a, "M", "Red", 3),
            line(product_b, "", "", 2),
        ]),
    )
    .await?;
    let detail = resp.data.expect("order detail");

    let sum: i64 = detail.items.iter().map(|item| item.subtotal).sum();
    assert_eq!(detail.order.total, sum);
    assert_eq!(detail.order.total, 3 * 120_000 + 2 * 90_000);
    assert_eq!(flat_stock(&state, product_b).await?, 8);

    Ok(())
}

// An order failing on its second line must not keep the first line's
// decrement.
#[tokio::test]
async fn insufficient_stock_rolls_back_the_whole_order() -> anyhow::Result<()> {
    let Some(state) = setup_state(StubGateway::ok()).await? else {
        return Ok(());
    };
    let user = create_user(&state, "user").await?;

    let plentiful = create_variant_product(&state, 100_000, None, &[("M", "Red", 5)]).await?;
    let scarce = create_variant_product(&state, 100_000, None, &[("L", "Blue", 1)]).await?;

    let err = order_service::place_order(
        &state,
        &user,
        place_request(vec![
            line(plentiful, "M", "Red", 2),
            line(scarce, "L", "Blue", 2),
        ]),
    )
    .await
    .expect_err("second line is short");

    match err {
        AppError::InsufficientStock { available, .. } => assert_eq!(available, 1),
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    assert_eq!(variant_quantity(&state, plentiful, "M", "Red").await?, 5);
    assert_eq!(variant_quantity(&state, scarce, "L", "Blue").await?, 1);
    assert_eq!(order_count(&state, user.user_id).await?, 0);

    Ok(())
}

#[tokio::test]
async fn unknown_variant_is_rejected() -> anyhow::Result<()> {
    let Some(state) = setup_state(StubGateway::ok()).await? else {
        return Ok(());
    };
    let user = create_user(&state, "user").await?;
    let product = create_variant_product(&state, 100_000, None, &[("M", "Red", 5)]).await?;

    let err = order_service::place_order(
        &state,
        &user,
        place_request(vec![line(product, "XL", "Green", 1)]),
    )
    .await
    .expect_err("no such variant");
    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(variant_quantity(&state, product, "M", "Red").await?, 5);

    Ok(())
}

// Place-then-cancel restores every counter to its pre-order value and puts
// the lines back into the cart.
#[tokio::test]
async fn cancel_restores_stock_and_cart() -> anyhow::Result<()> {
    let Some(state) = setup_state(StubGateway::ok()).await? else {
        return Ok(());
    };
    let user = create_user(&state, "user").await?;
    let product = create_variant_product(&state, 150_000, None, &[("M", "Red", 10)]).await?;

    let resp =
        order_service::place_order(&state, &user, place_request(vec![line(product, "M", "Red", 2)]))
            .await?;
    let order = resp.data.expect("order detail").order;
    assert_eq!(variant_quantity(&state, product, "M", "Red").await?, 8);

    let resp = order_service::cancel_order(
        &state,
        &user,
        order.id,
        CancelOrderRequest {
            reason: Some("changed my mind".into()),
        },
    )
    .await?;
    let detail = resp.data.expect("order detail");

    assert_eq!(detail.order.status, OrderStatus::Cancelled);
    assert!(detail.order.cancelled_at.is_some());
    assert!(
        detail
            .notes
            .iter()
            .any(|note| note.kind == NoteKind::Cancel && note.message == "changed my mind")
    );
    assert_eq!(variant_quantity(&state, product, "M", "Red").await?, 10);

    let cart = cart_service::list_cart(
        &state.pool,
        &user,
        axum_sportshop_api::routes::params::Pagination {
            page: None,
            per_page: None,
        },
    )
    .await?;
    let items = cart.data.expect("cart").items;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].product_id, product);
    assert_eq!(items[0].quantity, 2);

    Ok(())
}

#[tokio::test]
async fn cancelling_twice_does_not_restock_twice() -> anyhow::Result<()> {
    let Some(state) = setup_state(StubGateway::ok()).await? else {
        return Ok(());
    };
    let user = create_user(&state, "user").await?;
    let product = create_variant_product(&state, 150_000, None, &[("M", "Red", 10)]).await?;

    let resp =
        order_service::place_order(&state, &user, place_request(vec![line(product, "M", "Red", 2)]))
            .await?;
    let order = resp.data.expect("order detail").order;

    order_service::cancel_order(&state, &user, order.id, CancelOrderRequest { reason: None })
        .await?;
    let second = order_service::cancel_order(
        &state,
        &user,
        order.id,
        CancelOrderRequest { reason: None },
    )
    .await?;

    assert_eq!(second.message, "Order already cancelled");
    assert_eq!(variant_quantity(&state, product, "M", "Red").await?, 10);

    Ok(())
}

// Spec scenario: Shipping -> AwaitingConfirmation is a backward move and
// must leave the order untouched.
#[tokio::test]
async fn backward_status_transition_is_rejected() -> anyhow::Result<()> {
    let Some(state) = setup_state(StubGateway::ok()).await? else {
        return Ok(());
    };
    let user = create_user(&state, "user").await?;
    let admin = create_user(&state, "admin").await?;
    let product = create_variant_product(&state, 150_000, None, &[("M", "Red", 10)]).await?;

    let resp =
        order_service::place_order(&state, &user, place_request(vec![line(product, "M", "Red", 1)]))
            .await?;
    let order = resp.data.expect("order detail").order;

    for status in ["confirmed", "shipping"] {
        admin_service::update_order_status(
            &state,
            &admin,
            order.id,
            UpdateOrderStatusRequest {
                status: status.into(),
            },
        )
        .await?;
    }

    let err = admin_service::update_order_status(
        &state,
        &admin,
        order.id,
        UpdateOrderStatusRequest {
            status: "awaiting_confirmation".into(),
        },
    )
    .await
    .expect_err("backward transition");
    assert!(matches!(
        err,
        AppError::InvalidTransition {
            from: OrderStatus::Shipping,
            to: OrderStatus::AwaitingConfirmation,
        }
    ));
    assert_eq!(order_status(&state, order.id).await?, "shipping");

    Ok(())
}

// Cancelling through the status endpoint must run the same compensating
// procedure as the cancel endpoint.
#[tokio::test]
async fn status_patch_to_cancelled_restocks() -> anyhow::Result<()> {
    let Some(state) = setup_state(StubGateway::ok()).await? else {
        return Ok(());
    };
    let user = create_user(&state, "user").await?;
    let admin = create_user(&state, "admin").await?;
    let product = create_variant_product(&state, 150_000, None, &[("M", "Red", 6)]).await?;

    let resp =
        order_service::place_order(&state, &user, place_request(vec![line(product, "M", "Red", 4)]))
            .await?;
    let order = resp.data.expect("order detail").order;
    assert_eq!(variant_quantity(&state, product, "M", "Red").await?, 2);

    admin_service::update_order_status(
        &state,
        &admin,
        order.id,
        UpdateOrderStatusRequest {
            status: "cancelled".into(),
        },
    )
    .await?;

    assert_eq!(order_status(&state, order.id).await?, "cancelled");
    assert_eq!(variant_quantity(&state, product, "M", "Red").await?, 6);

    Ok(())
}

// Two buyers racing for the last units: the row lock serializes them, the
// loser gets a typed rejection and stock never goes negative.
#[tokio::test]
async fn concurrent_orders_cannot_oversell() -> anyhow::Result<()> {
    let Some(state) = setup_state(StubGateway::ok()).await? else {
        return Ok(());
    };
    let user_a = create_user(&state, "user").await?;
    let user_b = create_user(&state, "user").await?;
    let product = create_variant_product(&state, 100_000, None, &[("M", "Red", 2)]).await?;

    let (a, b) = tokio::join!(
        order_service::place_order(
            &state,
            &user_a,
            place_request(vec![line(product, "M", "Red", 2)]),
        ),
        order_service::place_order(
            &state,
            &user_b,
            place_request(vec![line(product, "M", "Red", 2)]),
        ),
    );

    let successes = [a.is_ok(), b.is_ok()].into_iter().filter(|ok| *ok).count();
    assert_eq!(successes, 1, "exactly one of the two orders may win");
    let loser = if a.is_ok() { b } else { a };
    assert!(matches!(
        loser.expect_err("loser"),
        AppError::InsufficientStock { .. }
    ));
    assert_eq!(variant_quantity(&state, product, "M", "Red").await?, 0);

    Ok(())
}

#[tokio::test]
async fn delivered_orders_cannot_be_cancelled() -> anyhow::Result<()> {
    let Some(state) = setup_state(StubGateway::ok()).await? else {
        return Ok(());
    };
    let user = create_user(&state, "user").await?;
    let admin = create_user(&state, "admin").await?;
    let product = create_variant_product(&state, 150_000, None, &[("M", "Red", 10)]).await?;

    let resp =
        order_service::place_order(&state, &user, place_request(vec![line(product, "M", "Red", 1)]))
            .await?;
    let order = resp.data.expect("order detail").order;

    for status in ["confirmed", "shipping", "delivered"] {
        admin_service::update_order_status(
            &state,
            &admin,
            order.id,
            UpdateOrderStatusRequest {
                status: status.into(),
            },
        )
        .await?;
    }

    let err = order_service::cancel_order(
        &state,
        &user,
        order.id,
        CancelOrderRequest { reason: None },
    )
    .await
    .expect_err("delivered is terminal");
    assert!(matches!(err, AppError::InvalidTransition { .. }));
    assert_eq!(order_status(&state, order.id).await?, "delivered");
    assert_eq!(variant_quantity(&state, product, "M", "Red").await?, 9);

    Ok(())
}
