// src/janitor.rs

//! Background housekeeping: suspend links whose token window has closed
//! and flag sessions that went quiet. The janitor never closes a session;
//! that call always belongs to a human.

use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::time;

use crate::config::Config;
use crate::error::AppError;
use crate::models::center_link::LinkStatus;
use crate::models::exam_session::SessionStatus;
use crate::utils::token;

pub fn spawn_janitor(pool: SqlitePool, config: Config) {
    tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_secs(config.janitor_interval_secs));
        loop {
            interval.tick().await;
            if let Err(e) = sweep(&pool, &config).await {
                tracing::error!("Janitor sweep failed: {}", e);
            }
        }
    });
}

async fn sweep(pool: &SqlitePool, config: &Config) -> Result<(), AppError> {
    let now = Utc::now();

    // Links past their expiry keep rejecting requests either way (the
    // validation path checks the timestamp); flipping the status makes the
    // admin list tell the truth at a glance.
    let suspended = sqlx::query(
        r#"
        UPDATE center_links
        SET status = ?, updated_at = ?
        WHERE status = ? AND token_expires_at IS NOT NULL AND token_expires_at < ?
        "#,
    )
    .bind(LinkStatus::Suspended)
    .bind(now)
    .bind(LinkStatus::Active)
    .bind(now)
    .execute(pool)
    .await?
    .rows_affected();

    if suspended > 0 {
        tracing::info!("Janitor suspended {} expired center links", suspended);
    }

    let stale: Vec<(String, chrono::DateTime<Utc>)> = sqlx::query_as(
        "SELECT session_token, last_heartbeat FROM exam_sessions WHERE status = ?",
    )
    .bind(SessionStatus::Active)
    .fetch_all(pool)
    .await?;

    for (session_token, last_heartbeat) in stale {
        let age = (now - last_heartbeat).num_seconds();
        if age > config.heartbeat_alert_secs {
            tracing::warn!(
                "Session {} has not sent a heartbeat for {}s",
                token::redact(&session_token),
                age
            );
        }
    }

    tracing::debug!("Janitor sweep completed");
    Ok(())
}
