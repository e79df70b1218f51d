use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::orders::OrderLineInput;
use crate::models::OrderStatus;

#[derive(Debug, Deserialize, ToSchema)]
pub struct InitiatePaymentRequest {
    pub items: Vec<OrderLineInput>,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_address: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InitiatePaymentResponse {
    pub order_id: Uuid,
    pub app_trans_id: String,
    /// Amount actually sent to the gateway (clamped to its minimum).
    pub amount: i64,
    pub pay_url: String,
    pub token: Option<String>,
}

/// Raw callback envelope as posted by the gateway: an opaque `data` string
/// plus its MAC. `data` is only parsed after the MAC verifies.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CallbackRequest {
    pub data: String,
    pub mac: String,
    #[serde(rename = "type", default)]
    pub kind: Option<i64>,
}

/// Structured acknowledgment the gateway expects on every callback,
/// including failures; HTTP status is always 200.
#[derive(Debug, Serialize, ToSchema)]
pub struct CallbackAck {
    pub return_code: i64,
    pub return_message: String,
}

impl CallbackAck {
    pub fn new(return_code: i64, return_message: impl Into<String>) -> Self {
        Self {
            return_code,
            return_message: return_message.into(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct QueryStatusRequest {
    pub app_trans_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QueryStatusResponse {
    pub order_id: Uuid,
    pub app_trans_id: String,
    pub status: OrderStatus,
    pub paid_amount: i64,
}
