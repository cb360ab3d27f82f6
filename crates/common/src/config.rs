use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string (status store)
    pub database_url: String,

    /// Redis connection string (queue broker + dedup store)
    pub redis_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Seconds a message-body fingerprint stays in the dedup window (default: 3600)
    pub dedup_ttl_secs: u64,

    /// Maximum business-level delivery retries per message (default: 3)
    pub max_retries: u32,

    /// First retry backoff in milliseconds; doubles per retry (default: 1000)
    pub initial_backoff_ms: u64,

    /// Per-attempt delivery adapter timeout in milliseconds (default: 10000)
    pub delivery_timeout_ms: u64,

    /// Port the ingestion/status API listens on (default: 3000)
    pub api_port: u16,

    /// Webhook endpoint of the email provider
    pub email_provider_url: Option<String>,

    /// Webhook endpoint of the SMS provider
    pub sms_provider_url: Option<String>,

    /// Webhook endpoint of the WhatsApp provider
    pub whatsapp_provider_url: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            dedup_ttl_secs: std::env::var("DEDUP_TTL_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DEDUP_TTL_SECS must be a valid u64"))?,
            max_retries: std::env::var("MAX_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("MAX_RETRIES must be a valid u32"))?,
            initial_backoff_ms: std::env::var("INITIAL_BACKOFF_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("INITIAL_BACKOFF_MS must be a valid u64"))?,
            delivery_timeout_ms: std::env::var("DELIVERY_TIMEOUT_MS")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DELIVERY_TIMEOUT_MS must be a valid u64"))?,
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("API_PORT must be a valid u16"))?,
            email_provider_url: std::env::var("EMAIL_PROVIDER_URL").ok(),
            sms_provider_url: std::env::var("SMS_PROVIDER_URL").ok(),
            whatsapp_provider_url: std::env::var("WHATSAPP_PROVIDER_URL").ok(),
        })
    }
}
