use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub original_price: i64,
    pub sale_price: Option<i64>,
    pub description: Option<String>,
    pub status: String,
    pub image: Option<String>,
    pub extra_images: serde_json::Value,
    /// Flat counter, authoritative only for products without variants.
    pub stock: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductVariant {
    pub id: Uuid,
    pub product_id: Uuid,
    pub size: String,
    pub color: String,
    pub quantity: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, FromRow)]
pub struct CartItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub image: Option<String>,
    pub price: i64,
    pub size: String,
    pub color: String,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub total: i64,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_address: String,
    pub payment_method: String,
    pub status: OrderStatus,
    pub app_trans_id: Option<String>,
    pub gateway_trans_id: Option<String>,
    pub paid_amount: i64,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub image: Option<String>,
    pub price: i64,
    pub quantity: i32,
    pub size: String,
    pub color: String,
    pub subtotal: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderNote {
    pub id: Uuid,
    pub order_id: Uuid,
    pub kind: NoteKind,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, FromRow)]
pub struct WishlistItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Order lifecycle.
///
/// ```text
/// PendingPayment ──► AwaitingConfirmation ──► Confirmed ──► Shipping ──► Delivered
///        │                    │                   │             │
///        └────────────────────┴───────────────────┴─────────────┴──► Cancelled
/// ```
///
/// Gateway orders start at `PendingPayment` and reach `AwaitingConfirmation`
/// once payment is confirmed; pay-on-delivery orders start at
/// `AwaitingConfirmation`. `Delivered` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingPayment,
    AwaitingConfirmation,
    Confirmed,
    Shipping,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "pending_payment",
            OrderStatus::AwaitingConfirmation => "awaiting_confirmation",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipping => "shipping",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_payment" => Some(OrderStatus::PendingPayment),
            "awaiting_confirmation" => Some(OrderStatus::AwaitingConfirmation),
            "confirmed" => Some(OrderStatus::Confirmed),
            "shipping" => Some(OrderStatus::Shipping),
            "delivered" => Some(OrderStatus::Delivered),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Whether an order in this state has inventory reserved against it.
    /// `PendingPayment` never holds stock; confirmation reserves it.
    pub fn holds_stock(&self) -> bool {
        matches!(
            self,
            OrderStatus::AwaitingConfirmation
                | OrderStatus::Confirmed
                | OrderStatus::Shipping
                | OrderStatus::Delivered
        )
    }

    fn rank(&self) -> u8 {
        match self {
            OrderStatus::PendingPayment => 0,
            OrderStatus::AwaitingConfirmation => 1,
            OrderStatus::Confirmed => 2,
            OrderStatus::Shipping => 3,
            OrderStatus::Delivered => 4,
            OrderStatus::Cancelled => 5,
        }
    }

    /// Forward-only along the fulfilment chain; any non-terminal state may
    /// move to `Cancelled`. No transitions leave a terminal state.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if self.is_terminal() || *self == next {
            return false;
        }
        if next == OrderStatus::Cancelled {
            return true;
        }
        next.rank() > self.rank()
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of an entry in an order's append-only note trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    System,
    Status,
    Cancel,
    Customer,
}

impl NoteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteKind::System => "system",
            NoteKind::Status => "status",
            NoteKind::Cancel => "cancel",
            NoteKind::Customer => "customer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(NoteKind::System),
            "status" => Some(NoteKind::Status),
            "cancel" => Some(NoteKind::Cancel),
            "customer" => Some(NoteKind::Customer),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::OrderStatus::*;
    use super::*;

    const ALL: [OrderStatus; 6] = [
        PendingPayment,
        AwaitingConfirmation,
        Confirmed,
        Shipping,
        Delivered,
        Cancelled,
    ];

    #[test]
    fn forward_transitions_are_allowed() {
        assert!(PendingPayment.can_transition_to(AwaitingConfirmation));
        assert!(AwaitingConfirmation.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Shipping));
        assert!(Shipping.can_transition_to(Delivered));
        assert!(AwaitingConfirmation.can_transition_to(Shipping));
    }

    #[test]
    fn backward_transitions_are_rejected() {
        assert!(!Shipping.can_transition_to(AwaitingConfirmation));
        assert!(!Confirmed.can_transition_to(PendingPayment));
        assert!(!Delivered.can_transition_to(Shipping));
    }

    #[test]
    fn terminal_states_admit_nothing() {
        for next in ALL {
            assert!(!Delivered.can_transition_to(next), "delivered -> {next}");
            assert!(!Cancelled.can_transition_to(next), "cancelled -> {next}");
        }
    }

    #[test]
    fn any_non_terminal_state_can_cancel() {
        for from in [PendingPayment, AwaitingConfirmation, Confirmed, Shipping] {
            assert!(from.can_transition_to(Cancelled), "{from} -> cancelled");
        }
    }

    #[test]
    fn self_transitions_are_rejected() {
        for status in ALL {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in ALL {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("paid"), None);
    }

    #[test]
    fn pending_payment_holds_no_stock() {
        assert!(!PendingPayment.holds_stock());
        assert!(!Cancelled.holds_stock());
        assert!(AwaitingConfirmation.holds_stock());
        assert!(Shipping.holds_stock());
    }
}
