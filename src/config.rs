// src/config.rs

use std::env;
use dotenvy::dotenv;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
    pub rust_log: String,
    /// ACTIVE sessions whose last heartbeat is older than this are flagged
    /// by the monitor, never closed automatically.
    pub heartbeat_alert_secs: i64,
    pub janitor_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let jwt_expiration_secs = env::var("JWT_EXPIRATION_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(28800);

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let heartbeat_alert_secs = env::var("HEARTBEAT_ALERT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(120);

        let janitor_interval_secs = env::var("JANITOR_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(300);

        Self {
            database_url,
            jwt_secret,
            jwt_expiration_secs,
            rust_log,
            heartbeat_alert_secs,
            janitor_interval_secs,
        }
    }
}
