use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch},
};
use uuid::Uuid;

use crate::{
    dto::orders::{CancelOrderRequest, OrderDetail, OrderList, PlaceOrderRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    routes::params::OrderListQuery,
    services::order_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders).post(place_order))
        .route("/{id}", get(get_order))
        .route("/{id}/cancel", patch(cancel_order))
}

#[utoipa::path(get, path = "/api/orders", tag = "Orders")]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<OrderListQuery>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let resp = order_service::list_orders(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/orders",
    request_body = PlaceOrderRequest,
    responses(
        (status = 200, description = "Place an order from the given lines", body = ApiResponse<OrderDetail>),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "Insufficient stock"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn place_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<PlaceOrderRequest>,
) -> AppResult<Json<ApiResponse<OrderDetail>>> {
    let resp = order_service::place_order(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(get, path = "/api/orders/{id}", tag = "Orders")]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<OrderDetail>>> {
    let resp = order_service::get_order(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/api/orders/{id}/cancel",
    request_body = CancelOrderRequest,
    responses(
        (status = 200, description = "Cancel an order, restoring stock and cart", body = ApiResponse<OrderDetail>),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Order already delivered"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelOrderRequest>,
) -> AppResult<Json<ApiResponse<OrderDetail>>> {
    let resp = order_service::cancel_order(&state, &user, id, payload).await?;
    Ok(Json(resp))
}
