use std::env;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use url::Url;

use crate::db::{DEFAULT_MAX_POOL_SIZE, DEFAULT_MIN_IDLE};

pub const DEFAULT_LEAVE_SERVICE_PATH: &str =
    "/sap/opu/odata/sap/ZCXP_LEAVE_REQUEST_SRV/LEAVE_REQUESTSet";

/// Backing implementation for the ingress rate limiter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimiterMode {
    Local,
    RedisFixedWindow,
    RedisSlidingWindow,
}

impl FromStr for RateLimiterMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "redis" | "redis-fixed" => Ok(Self::RedisFixedWindow),
            "redis-sliding" => Ok(Self::RedisSlidingWindow),
            other => Err(anyhow!("unknown rate limiter mode: {other}")),
        }
    }
}

/// How a leave request is written to the ERP.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaveSubmitMethod {
    /// POST against the entity collection.
    Post,
    /// PUT against the per-request entity URL.
    Put,
}

impl FromStr for LeaveSubmitMethod {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "post" => Ok(Self::Post),
            "put" => Ok(Self::Put),
            other => Err(anyhow!("unknown leave submit method: {other}")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RateLimitSettings {
    pub mode: RateLimiterMode,
    pub per_second: f64,
    pub burst: u32,
    pub max_requests: u64,
    pub window_secs: u64,
    pub idle_secs: u64,
    pub redis_addr: String,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            mode: RateLimiterMode::Local,
            per_second: 5.0,
            burst: 10,
            max_requests: 100,
            window_secs: 60,
            idle_secs: 600,
            redis_addr: "localhost:6379".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub database_min_idle: u32,
    pub server_host: String,
    pub server_port: u16,
    pub nlp_service_url: String,
    pub sap_base_url: String,
    pub sap_client_id: String,
    pub sap_client_secret: String,
    pub sap_leave_service_path: String,
    pub sap_leave_submit_method: LeaveSubmitMethod,
    pub sap_verify_tls: bool,
    pub outbound_timeout_secs: u64,
    pub allowed_origin: String,
    pub encryption_key: String,
    pub enable_test_login: bool,
    pub rate_limit: RateLimitSettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = match env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => build_database_url(
                &env_or("DB_HOST", "localhost"),
                parse_env("DB_PORT", 5432u16, "DB_PORT must be a valid u16")?,
                &env_or("DB_USER", ""),
                &env_or("DB_PASSWORD", ""),
                &env_or("DB_NAME", ""),
            )?,
        };
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let database_min_idle = env::var("DATABASE_MIN_IDLE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MIN_IDLE);
        let server_host = env_or("SERVER_HOST", "0.0.0.0");
        let server_port = parse_env("SERVER_PORT", 8080u16, "SERVER_PORT must be a valid u16")?;
        let nlp_service_url = env_or("NLP_SERVICE_URL", "http://localhost:5000");
        let sap_base_url = env_or("SAP_BASE_URL", "");
        let sap_client_id = env_or("SAP_CLIENT_ID", "");
        let sap_client_secret = env_or("SAP_CLIENT_SECRET", "");
        let sap_leave_service_path = env_or("SAP_LEAVE_SERVICE_PATH", DEFAULT_LEAVE_SERVICE_PATH);
        let sap_leave_submit_method = env_or("SAP_LEAVE_SUBMIT_METHOD", "post")
            .parse()
            .context("SAP_LEAVE_SUBMIT_METHOD must be post or put")?;
        let sap_verify_tls = env_flag("SAP_VERIFY_TLS", true);
        let outbound_timeout_secs = parse_env(
            "OUTBOUND_TIMEOUT_SECS",
            30u64,
            "OUTBOUND_TIMEOUT_SECS must be an integer",
        )?;
        let allowed_origin = env_or("ALLOWED_ORIGIN", "http://localhost:5173");
        let encryption_key = env::var("ENCRYPTION_KEY").context("ENCRYPTION_KEY must be set")?;
        let enable_test_login = env_flag("ENABLE_TEST_LOGIN", false);

        let rate_limit = RateLimitSettings {
            mode: env_or("RATE_LIMITER", "local")
                .parse()
                .context("RATE_LIMITER must be local, redis or redis-sliding")?,
            per_second: parse_env(
                "RATE_LIMIT_PER_SECOND",
                5.0f64,
                "RATE_LIMIT_PER_SECOND must be a number",
            )?,
            burst: parse_env("RATE_LIMIT_BURST", 10u32, "RATE_LIMIT_BURST must be an integer")?,
            max_requests: parse_env(
                "RATE_LIMIT_MAX_REQUESTS",
                100u64,
                "RATE_LIMIT_MAX_REQUESTS must be an integer",
            )?,
            window_secs: parse_env(
                "RATE_LIMIT_WINDOW_SECS",
                60u64,
                "RATE_LIMIT_WINDOW_SECS must be an integer",
            )?,
            idle_secs: parse_env(
                "RATE_LIMIT_IDLE_SECS",
                600u64,
                "RATE_LIMIT_IDLE_SECS must be an integer",
            )?,
            redis_addr: env_or("REDIS_ADDR", "localhost:6379"),
        };

        Ok(Self {
            database_url,
            database_max_pool_size,
            database_min_idle,
            server_host,
            server_port,
            nlp_service_url,
            sap_base_url,
            sap_client_id,
            sap_client_secret,
            sap_leave_service_path,
            sap_leave_submit_method,
            sap_verify_tls,
            outbound_timeout_secs,
            allowed_origin,
            encryption_key,
            enable_test_login,
            rate_limit,
        })
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }
}

fn env_or(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|value| parse_flag(&value, default))
        .unwrap_or(default)
}

fn parse_flag(value: &str, default: bool) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_env<T: FromStr>(key: &str, default: T, message: &'static str) -> Result<T> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| anyhow!("{message} (got {raw:?})")),
        _ => Ok(default),
    }
}

fn build_database_url(
    host: &str,
    port: u16,
    user: &str,
    password: &str,
    name: &str,
) -> Result<String> {
    let mut url = Url::parse(&format!("postgres://{host}:{port}/{name}"))
        .with_context(|| format!("DB_HOST {host:?} or DB_NAME {name:?} is not valid"))?;
    if !user.is_empty() {
        url.set_username(user)
            .map_err(|_| anyhow!("DB_USER cannot be applied to the database url"))?;
    }
    if !password.is_empty() {
        url.set_password(Some(password))
            .map_err(|_| anyhow!("DB_PASSWORD cannot be applied to the database url"))?;
    }
    Ok(url.to_string())
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("*****"));
            }
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}
