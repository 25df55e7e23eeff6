//! Typed configuration, loaded once at startup from the environment (no
//! `envy`-style derive, matching `life_simulation::main`'s direct
//! `std::env::var` reads with hardcoded defaults).

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_conns: u32,
    pub database_min_conns: u32,
    pub redis_url: Option<String>,
    pub http_port: u16,
    pub http_read_timeout: Duration,
    pub http_write_timeout: Duration,
    pub http_idle_timeout: Duration,
    pub http_shutdown_timeout: Duration,
    pub idempotency_ttl: Duration,
    pub log_level: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            database_url: env_var("DATABASE_URL", "postgres://localhost/ledger"),
            database_max_conns: env_parse("DATABASE_MAX_CONNS", 25),
            database_min_conns: env_parse("DATABASE_MIN_CONNS", 5),
            redis_url: std::env::var("REDIS_URL").ok(),
            http_port: env_parse("HTTP_PORT", 8080),
            http_read_timeout: Duration::from_secs(env_parse("HTTP_READ_TIMEOUT_SECS", 10)),
            http_write_timeout: Duration::from_secs(env_parse("HTTP_WRITE_TIMEOUT_SECS", 10)),
            http_idle_timeout: Duration::from_secs(env_parse("HTTP_IDLE_TIMEOUT_SECS", 60)),
            http_shutdown_timeout: Duration::from_secs(env_parse("HTTP_SHUTDOWN_TIMEOUT_SECS", 10)),
            idempotency_ttl: Duration::from_secs(env_parse::<u64>("IDEMPOTENCY_TTL_SECS", 24 * 60 * 60)),
            log_level: env_var("LOG_LEVEL", "info"),
            log_format: match env_var("LOG_FORMAT", "text").as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Text,
            },
        }
    }
}

fn env_var(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        for key in [
            "DATABASE_URL",
            "DATABASE_MAX_CONNS",
            "DATABASE_MIN_CONNS",
            "REDIS_URL",
            "HTTP_PORT",
            "LOG_LEVEL",
            "LOG_FORMAT",
        ] {
            std::env::remove_var(key);
        }
        let config = Config::from_env();
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.database_max_conns, 25);
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.redis_url.is_none());
    }
}
