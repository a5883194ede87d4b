//! Service configuration.

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// PostgreSQL connection string.
    pub database_url: String,

    /// Maximum database connections in the pool.
    pub db_max_connections: u32,

    /// API key for service-to-service auth. When unset, requests are
    /// accepted without authentication (development mode).
    pub service_api_key: Option<String>,

    /// Shared secret for verifying the payment processor's webhook
    /// signatures. When unset, signatures are not checked.
    pub webhook_secret: Option<String>,

    /// Payment processor API base URL (optional; enables outbound
    /// subscription fetches during plan changes).
    pub processor_api_url: Option<String>,

    /// Payment processor API key.
    pub processor_api_key: Option<String>,

    /// Membership directory base URL (live member counts).
    pub directory_url: Option<String>,

    /// Video store base URL (live video counts).
    pub media_url: Option<String>,

    /// Notification dispatcher base URL (best-effort sends).
    pub notify_url: Option<String>,

    /// Trial length granted at organization creation, in days.
    pub trial_days: i64,

    /// Plan id used for provisioned trials.
    pub trial_plan_id: String,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/metering".into()),
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            service_api_key: std::env::var("SERVICE_API_KEY").ok(),
            webhook_secret: std::env::var("BILLING_WEBHOOK_SECRET").ok(),
            processor_api_url: std::env::var("PROCESSOR_API_URL").ok(),
            processor_api_key: std::env::var("PROCESSOR_API_KEY").ok(),
            directory_url: std::env::var("DIRECTORY_URL").ok(),
            media_url: std::env::var("MEDIA_URL").ok(),
            notify_url: std::env::var("NOTIFY_URL").ok(),
            trial_days: std::env::var("TRIAL_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(14),
            trial_plan_id: std::env::var("TRIAL_PLAN_ID").unwrap_or_else(|_| "creator".into()),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: std::env::var("MAX_BODY_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024 * 1024), // 1MB
            request_timeout_seconds: std::env::var("REQUEST_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            database_url: "postgres://localhost/metering".into(),
            db_max_connections: 10,
            service_api_key: None,
            webhook_secret: None,
            processor_api_url: None,
            processor_api_key: None,
            directory_url: None,
            media_url: None,
            notify_url: None,
            trial_days: 14,
            trial_plan_id: "creator".into(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
        }
    }
}
