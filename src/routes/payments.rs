use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    dto::payments::{
        CallbackAck, CallbackRequest, InitiatePaymentRequest, InitiatePaymentResponse,
        QueryStatusRequest, QueryStatusResponse,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::payment_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/zalopay/create", post(create_payment))
        .route("/zalopay/callback", post(callback))
        .route("/zalopay/query", post(query_status))
        .route("/zalopay/return", get(payment_return))
}

#[utoipa::path(
    post,
    path = "/api/payments/zalopay/create",
    request_body = InitiatePaymentRequest,
    responses(
        (status = 200, description = "Open a payment session and persist a pending order", body = ApiResponse<InitiatePaymentResponse>),
        (status = 400, description = "Invalid request"),
        (status = 502, description = "Gateway rejected or unavailable"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn create_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<InitiatePaymentRequest>,
) -> AppResult<Json<ApiResponse<InitiatePaymentResponse>>> {
    let resp = payment_service::initiate_payment(&state, &user, payload).await?;
    Ok(Json(resp))
}

// The gateway retries on anything but a structured ack, so this handler is
// infallible at the HTTP level: every outcome is a 200 with a return_code.
#[utoipa::path(
    post,
    path = "/api/payments/zalopay/callback",
    request_body = CallbackRequest,
    responses(
        (status = 200, description = "Structured acknowledgment", body = CallbackAck),
    ),
    tag = "Payments"
)]
pub async fn callback(
    State(state): State<AppState>,
    Json(payload): Json<CallbackRequest>,
) -> Json<CallbackAck> {
    Json(payment_service::handle_callback(&state, payload).await)
}

#[utoipa::path(
    post,
    path = "/api/payments/zalopay/query",
    request_body = QueryStatusRequest,
    responses(
        (status = 200, description = "Local or freshly reconciled payment status", body = ApiResponse<QueryStatusResponse>),
        (status = 404, description = "Unknown transaction"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn query_status(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(payload): Json<QueryStatusRequest>,
) -> AppResult<Json<ApiResponse<QueryStatusResponse>>> {
    let resp = payment_service::query_status(&state, payload).await?;
    Ok(Json(resp))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReturnParams {
    pub apptransid: Option<String>,
    pub status: Option<String>,
    pub return_code: Option<String>,
}

#[utoipa::path(get, path = "/api/payments/zalopay/return", tag = "Payments")]
pub async fn payment_return(
    State(state): State<AppState>,
    Query(params): Query<ReturnParams>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let claimed_success = params.status.as_deref() == Some("1")
        || params.return_code.as_deref() == Some("1");
    let resp = payment_service::payment_return(&state, params.apptransid, claimed_success).await?;
    Ok(Json(resp))
}
