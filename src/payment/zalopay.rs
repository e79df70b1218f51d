use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::ZaloPayConfig;

use super::{GatewayError, PaymentGateway, SessionHandle, SessionRequest, TransactionStatus};

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 over `data`, hex-encoded, per the ZaloPay v2 signing scheme.
pub fn sign(data: &str, key: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC can take key of any size");
    mac.update(data.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time verification of a callback MAC against the raw `data`
/// string. Must run before the payload is parsed at all.
pub fn verify_callback_mac(data: &str, mac_hex: &str, key: &str) -> bool {
    let Ok(expected) = hex::decode(mac_hex) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC can take key of any size");
    mac.update(data.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Attempt id in the provider's required `yymmdd_NNNNNN` format. The date
/// prefix is mandated by ZaloPay; the suffix makes the id unique per attempt.
pub fn build_app_trans_id() -> String {
    let prefix = Utc::now().format("%y%m%d");
    let suffix: u32 = rand::thread_rng().gen_range(100_000..1_000_000);
    format!("{prefix}_{suffix}")
}

pub struct ZaloPayClient {
    http: Client,
    config: ZaloPayConfig,
}

impl ZaloPayClient {
    pub fn new(config: ZaloPayConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }
}

#[derive(Serialize)]
struct CreateOrderPayload<'a> {
    app_id: i64,
    app_user: &'a str,
    app_time: i64,
    amount: i64,
    app_trans_id: &'a str,
    embed_data: &'a str,
    item: &'a str,
    description: &'a str,
    callback_url: &'a str,
    redirect_url: &'a str,
    mac: String,
}

#[derive(Deserialize)]
struct CreateOrderResponse {
    return_code: i64,
    #[serde(default)]
    return_message: String,
    #[serde(default)]
    order_url: Option<String>,
    #[serde(default)]
    zp_trans_token: Option<String>,
    #[serde(default)]
    order_token: Option<String>,
}

#[derive(Serialize)]
struct QueryPayload<'a> {
    app_id: i64,
    app_trans_id: &'a str,
    mac: String,
}

#[derive(Deserialize)]
struct QueryResponse {
    return_code: i64,
    #[serde(default)]
    return_message: String,
    #[serde(default)]
    amount: i64,
    #[serde(default)]
    zp_trans_id: Option<i64>,
}

#[async_trait]
impl PaymentGateway for ZaloPayClient {
    async fn create_session(&self, req: &SessionRequest) -> Result<SessionHandle, GatewayError> {
        let app_time = Utc::now().timestamp_millis();
        let embed_data =
            serde_json::json!({ "redirecturl": self.config.redirect_url }).to_string();
        let item = serde_json::to_string(&req.items)
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        // MAC input field order is fixed by the provider.
        let raw = format!(
            "{}|{}|{}|{}|{}|{}|{}",
            self.config.app_id, req.app_trans_id, req.app_user, req.amount, app_time, embed_data,
            item
        );
        let mac = sign(&raw, &self.config.key1);

        let payload = CreateOrderPayload {
            app_id: self.config.app_id,
            app_user: &req.app_user,
            app_time,
            amount: req.amount,
            app_trans_id: &req.app_trans_id,
            embed_data: &embed_data,
            item: &item,
            description: &req.description,
            callback_url: &self.config.callback_url,
            redirect_url: &self.config.redirect_url,
            mac,
        };

        let response = self
            .http
            .post(&self.config.create_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let body: CreateOrderResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        if body.return_code != 1 {
            return Err(GatewayError::Rejected {
                code: body.return_code,
                message: body.return_message,
            });
        }

        let token = body.zp_trans_token.or(body.order_token);
        let pay_url = match body.order_url {
            Some(url) => url,
            None => {
                let token = token.as_deref().ok_or_else(|| GatewayError::Rejected {
                    code: body.return_code,
                    message: "response carried neither order_url nor token".to_string(),
                })?;
                format!("https://sb-openapi.zalopay.vn/checkout?token={token}")
            }
        };

        Ok(SessionHandle { pay_url, token })
    }

    async fn query_transaction(
        &self,
        app_trans_id: &str,
    ) -> Result<TransactionStatus, GatewayError> {
        let raw = format!("{}|{}|{}", self.config.app_id, app_trans_id, self.config.key1);
        let mac = sign(&raw, &self.config.key1);

        let payload = QueryPayload {
            app_id: self.config.app_id,
            app_trans_id,
            mac,
        };

        let response = self
            .http
            .post(&self.config.query_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        // return_code 1 = paid, 3 = not finalized yet, anything else = failed.
        match body.return_code {
            1 => Ok(TransactionStatus::Succeeded {
                gateway_trans_id: body.zp_trans_id.map(|id| id.to_string()),
                amount: body.amount,
            }),
            3 => Ok(TransactionStatus::Processing),
            code => Ok(TransactionStatus::Failed {
                code,
                message: body.return_message,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 4231 test case 2.
    #[test]
    fn sign_matches_known_hmac_sha256_vector() {
        let mac = sign("what do ya want for nothing?", "Jefe");
        assert_eq!(
            mac,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn callback_mac_round_trips() {
        let data = r#"{"app_trans_id":"250101_123456","amount":50000,"status":1}"#;
        let mac = sign(data, "callback-key");
        assert!(verify_callback_mac(data, &mac, "callback-key"));
    }

    #[test]
    fn tampered_data_fails_verification() {
        let data = r#"{"app_trans_id":"250101_123456","amount":50000,"status":1}"#;
        let mac = sign(data, "callback-key");
        let tampered = data.replace("50000", "1");
        assert!(!verify_callback_mac(&tampered, &mac, "callback-key"));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let data = "payload";
        let mac = sign(data, "key-a");
        assert!(!verify_callback_mac(data, &mac, "key-b"));
    }

    #[test]
    fn malformed_mac_hex_is_rejected() {
        assert!(!verify_callback_mac("payload", "not-hex!", "key"));
    }

    #[test]
    fn app_trans_id_has_provider_format() {
        let id = build_app_trans_id();
        let (date, suffix) = id.split_once('_').expect("separator");
        assert_eq!(date.len(), 6);
        assert!(date.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(suffix.len(), 6);
        assert!(suffix.chars().all(|c| c.is_ascii_digit()));
    }
}
