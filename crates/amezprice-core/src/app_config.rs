use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Credentials for the Amazon Product Advertising API 5.0.
#[derive(Clone)]
pub struct AmazonCredentials {
    pub access_key: String,
    pub secret_key: String,
    pub associate_tag: String,
    /// PA-API host, e.g. `webservices.amazon.in`.
    pub host: String,
    /// AWS signing region for the host, e.g. `eu-west-1` for India.
    pub region: String,
    /// Marketplace domain sent in the request body, e.g. `www.amazon.in`.
    pub marketplace: String,
}

/// Credentials for the Flipkart Affiliate API.
#[derive(Clone)]
pub struct FlipkartCredentials {
    pub affiliate_id: String,
    pub affiliate_token: String,
}

#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
}

/// VAPID key pair, base64url-encoded as produced by common Web Push tooling.
#[derive(Clone)]
pub struct VapidConfig {
    pub public_key: String,
    pub private_key: String,
    /// `mailto:` or `https:` contact sent in the VAPID `sub` claim.
    pub subject: String,
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub public_url: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub http_timeout_secs: u64,
    pub http_user_agent: String,
    pub http_max_retries: u32,
    pub http_retry_backoff_base_secs: u64,
    pub product_stale_after_secs: u64,
    pub refresh_cron: String,
    pub refresh_batch_size: i64,
    pub refresh_inter_request_delay_ms: u64,
    pub session_ttl_secs: u64,
    pub session_rotate_secs: u64,
    pub notify_max_retries: u32,
    pub notify_retry_delay_ms: u64,
    pub amazon: Option<AmazonCredentials>,
    pub flipkart: Option<FlipkartCredentials>,
    pub smtp: Option<SmtpConfig>,
    pub vapid: Option<VapidConfig>,
}

impl AppConfig {
    #[must_use]
    pub fn is_development(&self) -> bool {
        self.env == Environment::Development
    }
}

impl std::fmt::Debug for AmazonCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmazonCredentials")
            .field("access_key", &"[redacted]")
            .field("secret_key", &"[redacted]")
            .field("associate_tag", &self.associate_tag)
            .field("host", &self.host)
            .field("region", &self.region)
            .field("marketplace", &self.marketplace)
            .finish()
    }
}

impl std::fmt::Debug for FlipkartCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlipkartCredentials")
            .field("affiliate_id", &self.affiliate_id)
            .field("affiliate_token", &"[redacted]")
            .finish()
    }
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .field("from_email", &self.from_email)
            .field("from_name", &self.from_name)
            .finish()
    }
}

impl std::fmt::Debug for VapidConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapidConfig")
            .field("public_key", &self.public_key)
            .field("private_key", &"[redacted]")
            .field("subject", &self.subject)
            .finish()
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("public_url", &self.public_url)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("http_user_agent", &self.http_user_agent)
            .field("http_max_retries", &self.http_max_retries)
            .field(
                "http_retry_backoff_base_secs",
                &self.http_retry_backoff_base_secs,
            )
            .field("product_stale_after_secs", &self.product_stale_after_secs)
            .field("refresh_cron", &self.refresh_cron)
            .field("refresh_batch_size", &self.refresh_batch_size)
            .field(
                "refresh_inter_request_delay_ms",
                &self.refresh_inter_request_delay_ms,
            )
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("session_rotate_secs", &self.session_rotate_secs)
            .field("notify_max_retries", &self.notify_max_retries)
            .field("notify_retry_delay_ms", &self.notify_retry_delay_ms)
            .field("amazon", &self.amazon)
            .field("flipkart", &self.flipkart)
            .field("smtp", &self.smtp)
            .field("vapid", &self.vapid)
            .finish()
    }
}
