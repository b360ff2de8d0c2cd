use crate::app_config::{
    AmazonCredentials, AppConfig, Environment, FlipkartCredentials, SmtpConfig, VapidConfig,
};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// This is the core parsing/validation logic, decoupled from the actual environment
/// so it can be tested with a pure `HashMap` lookup.
///
/// # Errors
///
/// Returns `ConfigError` if required vars are missing or values are invalid.
pub fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_num = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let narrow = |var: &str, value: u64| -> Result<u32, ConfigError> {
        u32::try_from(value).map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    // A group of variables that must be set together or not at all.
    let group = |vars: &[&str]| -> Result<Option<Vec<String>>, ConfigError> {
        let values: Vec<Option<String>> = vars
            .iter()
            .map(|v| lookup(v).ok().filter(|s| !s.trim().is_empty()))
            .collect();
        if values.iter().all(Option::is_none) {
            return Ok(None);
        }
        if let Some(missing) = vars.iter().zip(&values).find(|(_, v)| v.is_none()) {
            return Err(ConfigError::InvalidEnvVar {
                var: (*missing.0).to_string(),
                reason: format!("must be set together with {}", vars.join(", ")),
            });
        }
        Ok(Some(values.into_iter().flatten().collect()))
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("AMEZPRICE_ENV", "development"))?;

    let bind_addr = parse_addr("AMEZPRICE_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("AMEZPRICE_LOG_LEVEL", "info");
    let public_url = or_default("AMEZPRICE_PUBLIC_URL", "http://localhost:3000")
        .trim_end_matches('/')
        .to_string();

    let db_max_connections = narrow(
        "AMEZPRICE_DB_MAX_CONNECTIONS",
        parse_num("AMEZPRICE_DB_MAX_CONNECTIONS", "10")?,
    )?;
    let db_min_connections = narrow(
        "AMEZPRICE_DB_MIN_CONNECTIONS",
        parse_num("AMEZPRICE_DB_MIN_CONNECTIONS", "1")?,
    )?;
    let db_acquire_timeout_secs = parse_num("AMEZPRICE_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let http_timeout_secs = parse_num("AMEZPRICE_HTTP_TIMEOUT_SECS", "30")?;
    let http_user_agent = or_default("AMEZPRICE_HTTP_USER_AGENT", "amezprice/0.1 (price-tracker)");
    let http_max_retries = narrow(
        "AMEZPRICE_HTTP_MAX_RETRIES",
        parse_num("AMEZPRICE_HTTP_MAX_RETRIES", "3")?,
    )?;
    let http_retry_backoff_base_secs = parse_num("AMEZPRICE_HTTP_RETRY_BACKOFF_BASE_SECS", "2")?;

    let product_stale_after_secs = parse_num("AMEZPRICE_PRODUCT_STALE_AFTER_SECS", "3600")?;
    let refresh_cron = or_default("AMEZPRICE_REFRESH_CRON", "0 0 */4 * * *");
    let refresh_batch_size = i64::try_from(parse_num("AMEZPRICE_REFRESH_BATCH_SIZE", "200")?)
        .map_err(|e| ConfigError::InvalidEnvVar {
            var: "AMEZPRICE_REFRESH_BATCH_SIZE".to_string(),
            reason: e.to_string(),
        })?;
    let refresh_inter_request_delay_ms =
        parse_num("AMEZPRICE_REFRESH_INTER_REQUEST_DELAY_MS", "1000")?;

    let session_ttl_secs = parse_num("AMEZPRICE_SESSION_TTL_SECS", "604800")?;
    let session_rotate_secs = parse_num("AMEZPRICE_SESSION_ROTATE_SECS", "900")?;
    if session_ttl_secs == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "AMEZPRICE_SESSION_TTL_SECS".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }

    let notify_max_retries = narrow(
        "AMEZPRICE_NOTIFY_MAX_RETRIES",
        parse_num("AMEZPRICE_NOTIFY_MAX_RETRIES", "3")?,
    )?;
    let notify_retry_delay_ms = parse_num("AMEZPRICE_NOTIFY_RETRY_DELAY_MS", "2000")?;

    let amazon = group(&["AMAZON_ACCESS_KEY", "AMAZON_SECRET_KEY", "AMAZON_ASSOCIATE_TAG"])?.map(
        |v| AmazonCredentials {
            access_key: v[0].clone(),
            secret_key: v[1].clone(),
            associate_tag: v[2].clone(),
            host: or_default("AMAZON_PAAPI_HOST", "webservices.amazon.in"),
            region: or_default("AMAZON_PAAPI_REGION", "eu-west-1"),
            marketplace: or_default("AMAZON_MARKETPLACE", "www.amazon.in"),
        },
    );

    let flipkart = group(&["FLIPKART_AFFILIATE_ID", "FLIPKART_AFFILIATE_TOKEN"])?.map(|v| {
        FlipkartCredentials {
            affiliate_id: v[0].clone(),
            affiliate_token: v[1].clone(),
        }
    });

    let smtp = match group(&[
        "SMTP_HOST",
        "SMTP_USERNAME",
        "SMTP_PASSWORD",
        "SMTP_FROM_EMAIL",
    ])? {
        Some(v) => {
            let port = u16::try_from(parse_num("SMTP_PORT", "587")?).map_err(|e| {
                ConfigError::InvalidEnvVar {
                    var: "SMTP_PORT".to_string(),
                    reason: e.to_string(),
                }
            })?;
            Some(SmtpConfig {
                host: v[0].clone(),
                port,
                username: v[1].clone(),
                password: v[2].clone(),
                from_email: v[3].clone(),
                from_name: or_default("SMTP_FROM_NAME", "AmezPrice"),
            })
        }
        None => None,
    };

    let vapid = group(&["VAPID_PUBLIC_KEY", "VAPID_PRIVATE_KEY", "VAPID_SUBJECT"])?.map(|v| {
        VapidConfig {
            public_key: v[0].clone(),
            private_key: v[1].clone(),
            subject: v[2].clone(),
        }
    });

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        public_url,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        http_timeout_secs,
        http_user_agent,
        http_max_retries,
        http_retry_backoff_base_secs,
        product_stale_after_secs,
        refresh_cron,
        refresh_batch_size,
        refresh_inter_request_delay_ms,
        session_ttl_secs,
        session_rotate_secs,
        notify_max_retries,
        notify_retry_delay_ms,
        amazon,
        flipkart,
        smtp,
        vapid,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` for anything other than
/// `development`, `test`, or `production`.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "AMEZPRICE_ENV".to_string(),
            reason: format!("expected development, test, or production; got '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
