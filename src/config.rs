use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use dotenvy::dotenv;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub run_migrations: bool,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_register_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,

    pub log_dir: String,
    pub log_level: tracing::Level,

    // Payslip / report rendering
    pub pdf_font_dir: String,
    pub pdf_font_name: String,
    pub company_name: String,

    /// Upper bound for spreadsheet uploads, in bytes.
    pub import_max_bytes: usize,
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn or_default<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse::<T>()
        .map_err(|e| anyhow::anyhow!("{key}={raw:?} is invalid: {e}"))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            db_max_connections: or_default("DB_MAX_CONNECTIONS", "10")?,
            run_migrations: or_default("RUN_MIGRATIONS", "true")?,
            jwt_secret: required("JWT_SECRET")?,
            access_token_ttl: or_default("ACCESS_TOKEN_TTL", "900")?, // 15 min
            refresh_token_ttl: or_default("REFRESH_TOKEN_TTL", "604800")?, // 7 days

            rate_login_per_min: or_default("RATE_LOGIN_PER_MIN", "60")?,
            rate_register_per_min: or_default("RATE_REGISTER_PER_MIN", "30")?,
            rate_refresh_per_min: or_default("RATE_REFRESH_PER_MIN", "30")?,
            rate_protected_per_min: or_default("RATE_PROTECTED_PER_MIN", "1000")?,

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api/v1".to_string()),

            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),
            log_level: or_default("LOG_LEVEL", "debug")?,

            pdf_font_dir: env::var("PDF_FONT_DIR").unwrap_or_else(|_| "./fonts".to_string()),
            pdf_font_name: env::var("PDF_FONT_NAME").unwrap_or_else(|_| "LiberationSans".to_string()),
            company_name: env::var("COMPANY_NAME").unwrap_or_else(|_| "Company".to_string()),

            import_max_bytes: or_default("IMPORT_MAX_BYTES", "5242880")?, // 5 MiB
        })
    }
}

#[cfg(test)]
impl Config {
    /// Fixed configuration for handler and middleware tests.
    pub fn for_tests() -> Self {
        Self {
            database_url: "mysql://localhost/test".into(),
            db_max_connections: 1,
            run_migrations: false,
            jwt_secret: "test-secret".into(),
            server_addr: "127.0.0.1:0".into(),
            access_token_ttl: 900,
            refresh_token_ttl: 3600,
            rate_login_per_min: 60,
            rate_register_per_min: 30,
            rate_refresh_per_min: 30,
            rate_protected_per_min: 1000,
            api_prefix: "/api/v1".into(),
            log_dir: "logs".into(),
            log_level: tracing::Level::DEBUG,
            pdf_font_dir: "./fonts".into(),
            pdf_font_name: "LiberationSans".into(),
            company_name: "Acme".into(),
            import_max_bytes: 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let ttl: usize = or_default("PAYROLL_HR_TEST_UNSET_TTL", "900").unwrap();
        assert_eq!(ttl, 900);
        let level: tracing::Level = or_default("PAYROLL_HR_TEST_UNSET_LEVEL", "warn").unwrap();
        assert_eq!(level, tracing::Level::WARN);
    }

    #[test]
    fn invalid_default_is_reported_with_key() {
        let err = or_default::<u32>("PAYROLL_HR_TEST_UNSET_NUM", "many").unwrap_err();
        assert!(err.to_string().contains("PAYROLL_HR_TEST_UNSET_NUM"));
    }
}
