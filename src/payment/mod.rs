use async_trait::async_trait;
use thiserror::Error;

pub mod zalopay;

pub use zalopay::ZaloPayClient;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway rejected the request (code {code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("gateway unreachable: {0}")]
    Unavailable(String),
}

/// One line of a payment session, as shown on the provider's payment page.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionItem {
    pub name: String,
    pub quantity: i32,
    pub price: i64,
}

#[derive(Debug, Clone)]
pub struct SessionRequest {
    /// Locally generated attempt id, unique per payment attempt.
    pub app_trans_id: String,
    pub app_user: String,
    pub amount: i64,
    pub description: String,
    pub items: Vec<SessionItem>,
}

/// Handle returned by the provider for a freshly created payment session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub pay_url: String,
    pub token: Option<String>,
}

/// Outcome of a pull-based transaction status query.
#[derive(Debug, Clone)]
pub enum TransactionStatus {
    Succeeded {
        gateway_trans_id: Option<String>,
        amount: i64,
    },
    Failed {
        code: i64,
        message: String,
    },
    /// The provider has not finalized the transaction yet; the local order
    /// stays pending.
    Processing,
}

/// External payment provider boundary. Implementations own request signing
/// and transport; callers never see provider wire formats.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(&self, req: &SessionRequest) -> Result<SessionHandle, GatewayError>;

    async fn query_transaction(&self, app_trans_id: &str)
    -> Result<TransactionStatus, GatewayError>;
}
