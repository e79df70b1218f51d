use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Order, OrderItem, OrderNote};

/// One requested line. Prices are never accepted from the client; the
/// catalog is re-read at order time.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct OrderLineInput {
    pub product_id: Uuid,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub color: String,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PlaceOrderRequest {
    pub items: Vec<OrderLineInput>,
    pub payment_method: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_address: String,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CancelOrderRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderDetail {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub notes: Vec<OrderNote>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}
