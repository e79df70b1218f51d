use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub zalopay: ZaloPayConfig,
}

/// ZaloPay v2 deployment settings. `key1` signs outbound requests,
/// `key2` verifies inbound callbacks; the two must never be swapped.
#[derive(Debug, Clone)]
pub struct ZaloPayConfig {
    pub app_id: i64,
    pub key1: String,
    pub key2: String,
    pub create_url: String,
    pub query_url: String,
    pub callback_url: String,
    pub redirect_url: String,
    pub min_amount: i64,
    pub timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        Ok(Self {
            port,
            database_url,
            host,
            zalopay: ZaloPayConfig::from_env(),
        })
    }
}

impl ZaloPayConfig {
    pub fn from_env() -> Self {
        let app_id = env::var("ZLP_APP_ID")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        let key1 = env::var("ZLP_KEY1").unwrap_or_default();
        let key2 = env::var("ZLP_KEY2").unwrap_or_default();
        let create_url = env::var("ZLP_CREATE_URL")
            .unwrap_or_else(|_| "https://sb-openapi.zalopay.vn/v2/create".to_string());
        let query_url = env::var("ZLP_QUERY_URL")
            .unwrap_or_else(|_| "https://sb-openapi.zalopay.vn/v2/query".to_string());
        let callback_url = env::var("ZLP_CALLBACK_URL").unwrap_or_default();
        let redirect_url = env::var("ZLP_REDIRECT_URL").unwrap_or_default();
        let min_amount = env::var("ZLP_MIN_AMOUNT")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(1000);
        let timeout_secs = env::var("ZLP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(15);
        Self {
            app_id,
            key1,
            key2,
            create_url,
            query_url,
            callback_url,
            redirect_url,
            min_amount,
            timeout_secs,
        }
    }
}
