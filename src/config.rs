//! Environment configuration. A `.env` file is honoured when present.

use std::env;
use std::str::FromStr;

use chrono::{Duration, FixedOffset};
use thiserror::Error;

use crate::models::email_queue::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn optional(name: &'static str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

/// Settings of the HTTP server process.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub bind_addr: String,
    pub sweep_interval_secs: u64,
    pub notification_ttl_days: i64,
    pub timezone_offset_hours: i32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let config = AppConfig {
            database_url: required("DATABASE_URL")?,
            max_connections: parsed("DATABASE_MAX_CONNECTIONS", 5)?,
            bind_addr: optional("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8080".to_string()),
            sweep_interval_secs: parsed("SWEEP_INTERVAL_SECS", 300)?,
            notification_ttl_days: parsed("NOTIFICATION_TTL_DAYS", 30)?,
            timezone_offset_hours: parsed("APP_TIMEZONE_OFFSET_HOURS", 8)?,
        };
        if config.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "SWEEP_INTERVAL_SECS",
                value: "0".into(),
            });
        }
        config.timezone_offset()?;
        Ok(config)
    }

    pub fn timezone_offset(&self) -> Result<FixedOffset, ConfigError> {
        offset_from_hours(self.timezone_offset_hours)
    }

    pub fn notification_ttl(&self) -> Duration {
        Duration::days(self.notification_ttl_days)
    }
}

pub fn offset_from_hours(hours: i32) -> Result<FixedOffset, ConfigError> {
    FixedOffset::east_opt(hours * 3600).ok_or(ConfigError::Invalid {
        name: "APP_TIMEZONE_OFFSET_HOURS",
        value: hours.to_string(),
    })
}

/// Settings of the email drainer process.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub database_url: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub mail_from: String,
    pub batch_size: usize,
    pub retry: RetryPolicy,
}

impl MailConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Ok(MailConfig {
            database_url: required("DATABASE_URL")?,
            smtp_host: required("SMTP_HOST")?,
            smtp_port: parsed("SMTP_PORT", 587)?,
            smtp_username: optional("SMTP_USERNAME"),
            smtp_password: optional("SMTP_PASSWORD"),
            mail_from: required("MAIL_FROM")?,
            batch_size: parsed("EMAIL_BATCH_SIZE", 10)?,
            retry: RetryPolicy {
                max_retries: parsed("EMAIL_MAX_RETRIES", 3)?,
                base_delay_secs: parsed("EMAIL_RETRY_BASE_SECS", 300)?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_bounds() {
        assert_eq!(offset_from_hours(8).unwrap().local_minus_utc(), 8 * 3600);
        assert!(offset_from_hours(-11).is_ok());
        assert!(offset_from_hours(30).is_err());
    }
}
