// src/registry.rs

//! Center link issuance, validation and rotation.
//!
//! A center link is the only credential an examination center holds. All
//! checks here are deliberately boring: the interesting guarantees (usage
//! cap under concurrency, one live link per center) live in the database
//! schema and in guarded UPDATE statements.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::AppError;
use crate::models::center_link::{CenterLink, IssueLinkRequest, LinkStatus};
use crate::utils::{hash, token};

/// Issues a fresh link plus its bundled operator account, atomically.
/// The raw access token is only readable off the returned struct; it is
/// never serialized again.
pub async fn issue_link(pool: &SqlitePool, req: &IssueLinkRequest) -> Result<CenterLink, AppError> {
    let exam_exists: Option<i64> = sqlx::query_scalar("SELECT id FROM exams WHERE id = ?")
        .bind(req.exam_id)
        .fetch_optional(pool)
        .await?;
    if exam_exists.is_none() {
        return Err(AppError::NotFound("Exam not found".to_string()));
    }

    let access_token = token::generate_access_token(&req.center_code);
    let now = Utc::now();

    let mut tx = pool.begin().await?;

    let link = sqlx::query_as::<_, CenterLink>(
        r#"
        INSERT INTO center_links
            (exam_id, center_code, center_name, access_token, status, max_usage,
             usage_count, token_expires_at, seat_count, ip_range, reporting_time,
             gate_close_time, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(req.exam_id)
    .bind(&req.center_code)
    .bind(&req.center_name)
    .bind(&access_token)
    .bind(LinkStatus::Active)
    .bind(req.max_usage)
    .bind(req.token_expires_at)
    .bind(req.seat_count.unwrap_or(0))
    .bind(&req.ip_range)
    .bind(req.reporting_time)
    .bind(req.gate_close_time)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if e.as_database_error()
            .is_some_and(|d| d.is_unique_violation())
        {
            AppError::DuplicateCenter(format!(
                "Center '{}' already holds an active link for this exam",
                req.center_code
            ))
        } else {
            AppError::InternalServerError(e.to_string())
        }
    })?;

    let password_hash = hash::hash_password(&req.operator_password)?;

    sqlx::query(
        "INSERT INTO center_operators (center_link_id, username, password_hash, created_at)
         VALUES (?, ?, ?, ?)",
    )
    .bind(link.id)
    .bind(&req.operator_username)
    .bind(&password_hash)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        "Issued center link {} for exam {} ({})",
        link.id,
        link.exam_id,
        token::redact(&link.access_token)
    );

    Ok(link)
}

/// Resolves an access token to its link, rejecting suspended, expired and
/// exhausted ones. Read-only; consuming a usage slot is a separate step.
pub async fn validate_token(pool: &SqlitePool, access_token: &str) -> Result<CenterLink, AppError> {
    let link = sqlx::query_as::<_, CenterLink>("SELECT * FROM center_links WHERE access_token = ?")
        .bind(access_token)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::InvalidToken)?;

    check_link(&link)?;

    Ok(link)
}

/// Same lookup, but inside a caller's transaction.
pub async fn load_by_token(
    conn: &mut SqliteConnection,
    access_token: &str,
) -> Result<CenterLink, AppError> {
    sqlx::query_as::<_, CenterLink>("SELECT * FROM center_links WHERE access_token = ?")
        .bind(access_token)
        .fetch_optional(conn)
        .await?
        .ok_or(AppError::InvalidToken)
}

pub async fn load_link(pool: &SqlitePool, link_id: i64) -> Result<CenterLink, AppError> {
    sqlx::query_as::<_, CenterLink>("SELECT * FROM center_links WHERE id = ?")
        .bind(link_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Center link not found".to_string()))
}

/// Gate checks in rejection order: expiry, suspension, usage cap. Expiry
/// goes first so a link the janitor already flipped to SUSPENDED still
/// reports the honest reason.
pub fn check_link(link: &CenterLink) -> Result<(), AppError> {
    if link.is_expired() {
        return Err(AppError::TokenExpired);
    }
    if link.status == LinkStatus::Suspended {
        return Err(AppError::LinkSuspended);
    }
    if link.is_exhausted() {
        return Err(AppError::TokenExhausted);
    }
    Ok(())
}

/// Takes one usage slot, guarded so the cap holds under concurrent starts.
/// The status and expiry gates run beforehand in the same transaction; this
/// statement only has to defend the counter itself.
pub async fn consume_usage(conn: &mut SqliteConnection, link_id: i64) -> Result<(), AppError> {
    let result = sqlx::query(
        r#"
        UPDATE center_links
        SET usage_count = usage_count + 1, updated_at = ?
        WHERE id = ? AND (max_usage IS NULL OR usage_count < max_usage)
        "#,
    )
    .bind(Utc::now())
    .bind(link_id)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::TokenExhausted);
    }

    Ok(())
}

/// Swaps the bearer token in a single UPDATE. The old token stops matching
/// the instant this commits; usage counters and status carry over.
pub async fn rotate_token(pool: &SqlitePool, link_id: i64) -> Result<CenterLink, AppError> {
    let current = load_link(pool, link_id).await?;

    let fresh = token::generate_access_token(&current.center_code);

    let link = sqlx::query_as::<_, CenterLink>(
        "UPDATE center_links SET access_token = ?, updated_at = ? WHERE id = ? RETURNING *",
    )
    .bind(&fresh)
    .bind(Utc::now())
    .bind(link_id)
    .fetch_one(pool)
    .await?;

    tracing::info!(
        "Rotated access token for center link {} ({})",
        link.id,
        token::redact(&link.access_token)
    );

    Ok(link)
}

/// Suspends or reinstates a link. Existing sessions are untouched either
/// way; only new starts consult the status.
pub async fn set_status(
    pool: &SqlitePool,
    link_id: i64,
    status: LinkStatus,
) -> Result<CenterLink, AppError> {
    let link = sqlx::query_as::<_, CenterLink>(
        "UPDATE center_links SET status = ?, updated_at = ? WHERE id = ? RETURNING *",
    )
    .bind(status)
    .bind(Utc::now())
    .bind(link_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        if e.as_database_error()
            .is_some_and(|d| d.is_unique_violation())
        {
            AppError::DuplicateCenter(
                "Another active link already exists for this center and exam".to_string(),
            )
        } else {
            AppError::InternalServerError(e.to_string())
        }
    })?
    .ok_or_else(|| AppError::NotFound("Center link not found".to_string()))?;

    tracing::info!("Center link {} status set to {:?}", link.id, link.status);

    Ok(link)
}

pub async fn list_links(
    pool: &SqlitePool,
    exam_id: Option<i64>,
) -> Result<Vec<CenterLink>, AppError> {
    let links = match exam_id {
        Some(id) => {
            sqlx::query_as::<_, CenterLink>(
                "SELECT * FROM center_links WHERE exam_id = ? ORDER BY id",
            )
            .bind(id)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, CenterLink>("SELECT * FROM center_links ORDER BY id")
                .fetch_all(pool)
                .await?
        }
    };

    Ok(links)
}
