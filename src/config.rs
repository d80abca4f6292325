//! Service configuration, read from the environment (and `.env` via dotenvy).

use std::time::Duration;

pub const NAVER_API_BASE: &str = "https://api.commerce.naver.com";
pub const NAVER_AUTH_BASE: &str = "https://nid.naver.com";
pub const COUPANG_API_BASE: &str = "https://api-gateway.coupang.com";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub nats_url: Option<String>,
    /// Where Naver redirects after the seller grants access.
    pub naver_redirect_uri: String,
    pub endpoints: Endpoints,
    pub timeouts: Timeouts,
}

/// Marketplace base URLs. Overridable so tests and staging can point elsewhere.
#[derive(Clone, Debug)]
pub struct Endpoints {
    pub naver_api: String,
    pub naver_auth: String,
    pub coupang_api: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            naver_api: NAVER_API_BASE.to_string(),
            naver_auth: NAVER_AUTH_BASE.to_string(),
            coupang_api: COUPANG_API_BASE.to_string(),
        }
    }
}

impl Endpoints {
    /// Every marketplace served from one base URL, e.g. a mock server.
    pub fn all(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self { naver_api: base.clone(), naver_auth: base.clone(), coupang_api: base }
    }
}

/// Per-call timeouts by operation class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    /// Connection tests, token exchanges, single lookups.
    pub read: Duration,
    /// Inventory and price updates.
    pub write: Duration,
    /// Product and order list pulls.
    pub sync: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { read: Duration::from_secs(10), write: Duration::from_secs(10), sync: Duration::from_secs(30) }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Timeouts::default();
        let port = env_parse("PORT").unwrap_or(8084);
        Self {
            port,
            database_url: env_opt("DATABASE_URL"),
            nats_url: env_opt("NATS_URL"),
            naver_redirect_uri: env_opt("NAVER_REDIRECT_URI")
                .unwrap_or_else(|| format!("http://localhost:{port}/api/v1/oauth/naver/callback")),
            endpoints: Endpoints {
                naver_api: env_opt("NAVER_API_BASE").unwrap_or_else(|| NAVER_API_BASE.to_string()),
                naver_auth: env_opt("NAVER_AUTH_BASE").unwrap_or_else(|| NAVER_AUTH_BASE.to_string()),
                coupang_api: env_opt("COUPANG_API_BASE").unwrap_or_else(|| COUPANG_API_BASE.to_string()),
            },
            timeouts: Timeouts {
                read: env_timeout("CHANNEL_READ_TIMEOUT_SECS").unwrap_or(defaults.read),
                write: env_timeout("CHANNEL_WRITE_TIMEOUT_SECS").unwrap_or(defaults.write),
                sync: env_timeout("CHANNEL_SYNC_TIMEOUT_SECS").unwrap_or(defaults.sync),
            },
        }
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env_opt(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment value");
            None
        }
    }
}

fn env_timeout(key: &str) -> Option<Duration> {
    parse_timeout(key, &env_opt(key)?)
}

/// Whole seconds, at least one.
fn parse_timeout(key: &str, raw: &str) -> Option<Duration> {
    match raw.trim().parse::<u64>() {
        Ok(0) => {
            tracing::warn!(key, "ignoring zero timeout");
            None
        }
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment value");
            None
        }
    }
}
