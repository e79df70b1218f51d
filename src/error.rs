use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::models::OrderStatus;
use crate::payment::GatewayError;
use crate::response::{ApiResponse, Meta};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Insufficient stock for {product} ({size}/{color}): {available} available")]
    InsufficientStock {
        product: String,
        size: String,
        color: String,
        available: i32,
    },

    #[error("Order status cannot change from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order is already {0}")]
    AlreadyTerminal(OrderStatus),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Payment gateway rejected the request (code {code}): {message}")]
    GatewayRejected { code: i64, message: String },

    #[error("Payment gateway unavailable")]
    GatewayUnavailable(String),

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Rejected { code, message } => AppError::GatewayRejected { code, message },
            GatewayError::Unavailable(reason) => AppError::GatewayUnavailable(reason),
        }
    }
}

#[derive(Serialize)]
struct ErrorData {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::InsufficientStock { .. } => StatusCode::CONFLICT,
            AppError::InvalidTransition { .. } => StatusCode::CONFLICT,
            AppError::AlreadyTerminal(_) => StatusCode::CONFLICT,
            AppError::InvalidSignature => StatusCode::UNAUTHORIZED,
            AppError::GatewayRejected { .. } => StatusCode::BAD_GATEWAY,
            AppError::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::DbError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::OrmError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Upstream and internal details stay out of the response body.
        let message = match &self {
            AppError::DbError(_) | AppError::OrmError(_) | AppError::Internal(_) => {
                "Internal Server Error".to_string()
            }
            AppError::GatewayUnavailable(_) => "Payment gateway unavailable".to_string(),
            other => other.to_string(),
        };

        let body = ApiResponse {
            message: message.clone(),
            data: Some(ErrorData { error: message }),
            meta: Some(Meta::empty()),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
