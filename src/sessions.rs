// src/sessions.rs

//! Central exam session lifecycle.
//!
//! A session is born ACTIVE and dies exactly once, into COMPLETED or
//! TERMINATED. Nothing here expires sessions on a timer; a silent
//! candidate machine shows up as a stale heartbeat on the monitor and a
//! human decides what to do about it.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::AppError;
use crate::models::candidate::Candidate;
use crate::models::center_link::CenterLink;
use crate::models::exam::Exam;
use crate::models::exam_session::{
    ExamSession, SessionMonitor, SessionStatus, StartSessionRequest, TerminatedBy,
};
use crate::registry;
use crate::utils::token;

/// Starts a session through a center link. Link gates, the roster check,
/// the single-device rule and the usage cap all settle inside one
/// transaction, so two racing logins cannot both slip through.
pub async fn start_session(
    pool: &SqlitePool,
    req: &StartSessionRequest,
    ip_address: Option<String>,
    user_agent: Option<String>,
) -> Result<(ExamSession, CenterLink), AppError> {
    let mut tx = pool.begin().await?;

    let link = registry::load_by_token(&mut *tx, &req.access_token).await?;
    registry::check_link(&link)?;

    let exam = sqlx::query_as::<_, Exam>("SELECT * FROM exams WHERE id = ?")
        .bind(link.exam_id)
        .fetch_one(&mut *tx)
        .await?;

    let candidate = sqlx::query_as::<_, Candidate>(
        "SELECT * FROM candidates WHERE id = ? AND exam_id = ?",
    )
    .bind(req.candidate_id)
    .bind(exam.id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Candidate is not on this exam's roster".to_string()))?;

    if candidate.roll_number != req.roll_number {
        return Err(AppError::BadRequest(
            "Roll number does not match this candidate".to_string(),
        ));
    }

    let session_token = token::generate_session_token();
    let now = Utc::now();
    let browser_locked = exam.seb_config.browser_lock;

    let inserted = if exam.single_device_login {
        // Insert-if-absent: the WHERE clause and the insert are one
        // statement, so concurrent starts for the same candidate cannot
        // both see "no active session".
        sqlx::query(
            r#"
            INSERT INTO exam_sessions
                (session_token, exam_id, center_link_id, candidate_id, roll_number,
                 status, start_time, last_heartbeat, browser_locked, ip_address, user_agent)
            SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
            WHERE NOT EXISTS (
                SELECT 1 FROM exam_sessions
                WHERE exam_id = ? AND candidate_id = ? AND status = ?
            )
            "#,
        )
        .bind(&session_token)
        .bind(exam.id)
        .bind(link.id)
        .bind(candidate.id)
        .bind(&candidate.roll_number)
        .bind(SessionStatus::Active)
        .bind(now)
        .bind(now)
        .bind(browser_locked)
        .bind(&ip_address)
        .bind(&user_agent)
        .bind(exam.id)
        .bind(candidate.id)
        .bind(SessionStatus::Active)
        .execute(&mut *tx)
        .await?
        .rows_affected()
    } else {
        sqlx::query(
            r#"
            INSERT INTO exam_sessions
                (session_token, exam_id, center_link_id, candidate_id, roll_number,
                 status, start_time, last_heartbeat, browser_locked, ip_address, user_agent)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session_token)
        .bind(exam.id)
        .bind(link.id)
        .bind(candidate.id)
        .bind(&candidate.roll_number)
        .bind(SessionStatus::Active)
        .bind(now)
        .bind(now)
        .bind(browser_locked)
        .bind(&ip_address)
        .bind(&user_agent)
        .execute(&mut *tx)
        .await?
        .rows_affected()
    };

    if inserted == 0 {
        return Err(AppError::DuplicateSession(format!(
            "Candidate {} already has an active session for this exam",
            candidate.roll_number
        )));
    }

    registry::consume_usage(&mut *tx, link.id).await?;

    let session =
        sqlx::query_as::<_, ExamSession>("SELECT * FROM exam_sessions WHERE session_token = ?")
            .bind(&session_token)
            .fetch_one(&mut *tx)
            .await?;

    tx.commit().await?;

    tracing::info!(
        "Started session {} for candidate {} via center {}",
        token::redact(&session.session_token),
        candidate.roll_number,
        link.center_code
    );

    Ok((session, link))
}

pub async fn load_by_token(pool: &SqlitePool, session_token: &str) -> Result<ExamSession, AppError> {
    sqlx::query_as::<_, ExamSession>("SELECT * FROM exam_sessions WHERE session_token = ?")
        .bind(session_token)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::SessionNotFound)
}

/// Records a liveness ping. Only ACTIVE sessions accept one; a missed
/// heartbeat has no effect on state.
pub async fn heartbeat(pool: &SqlitePool, session_token: &str) -> Result<DateTime<Utc>, AppError> {
    let now = Utc::now();

    let result =
        sqlx::query("UPDATE exam_sessions SET last_heartbeat = ? WHERE session_token = ? AND status = ?")
            .bind(now)
            .bind(session_token)
            .bind(SessionStatus::Active)
            .execute(pool)
            .await?;

    if result.rows_affected() == 0 {
        // Exists but closed, or never existed.
        load_by_token(pool, session_token).await?;
        return Err(AppError::SessionNotActive);
    }

    Ok(now)
}

/// Candidate finished normally: ACTIVE -> COMPLETED.
pub async fn complete_session(
    pool: &SqlitePool,
    session_token: &str,
) -> Result<ExamSession, AppError> {
    let completed = sqlx::query_as::<_, ExamSession>(
        r#"
        UPDATE exam_sessions
        SET status = ?, end_time = ?
        WHERE session_token = ? AND status = ?
        RETURNING *
        "#,
    )
    .bind(SessionStatus::Completed)
    .bind(Utc::now())
    .bind(session_token)
    .bind(SessionStatus::Active)
    .fetch_optional(pool)
    .await?;

    match completed {
        Some(session) => {
            tracing::info!(
                "Session {} completed by candidate {}",
                token::redact(&session.session_token),
                session.roll_number
            );
            Ok(session)
        }
        None => {
            load_by_token(pool, session_token).await?;
            Err(AppError::SessionAlreadyClosed)
        }
    }
}

/// Forced close: ACTIVE -> TERMINATED with an audit reason. Re-issuing the
/// identical order against an already terminated session is a no-op
/// success; any other transition out of a closed state is refused.
pub async fn terminate_session(
    pool: &SqlitePool,
    session_token: &str,
    reason: &str,
    actor: TerminatedBy,
) -> Result<ExamSession, AppError> {
    let mut tx = pool.begin().await?;

    let current =
        sqlx::query_as::<_, ExamSession>("SELECT * FROM exam_sessions WHERE session_token = ?")
            .bind(session_token)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::SessionNotFound)?;

    match current.status {
        SessionStatus::Active => {}
        SessionStatus::Terminated if current.termination_reason.as_deref() == Some(reason) => {
            return Ok(current);
        }
        _ => return Err(AppError::SessionAlreadyClosed),
    }

    let session = sqlx::query_as::<_, ExamSession>(
        r#"
        UPDATE exam_sessions
        SET status = ?, end_time = ?, termination_reason = ?, terminated_by = ?
        WHERE id = ? AND status = ?
        RETURNING *
        "#,
    )
    .bind(SessionStatus::Terminated)
    .bind(Utc::now())
    .bind(reason)
    .bind(actor)
    .bind(current.id)
    .bind(SessionStatus::Active)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::SessionAlreadyClosed)?;

    tx.commit().await?;

    tracing::warn!(
        "Session {} terminated by {:?}: {}",
        token::redact(session_token),
        actor,
        reason
    );

    Ok(session)
}

/// Live board for invigilation staff. Staleness is computed at read time
/// against the configured alert threshold.
pub async fn monitor(
    pool: &SqlitePool,
    exam_id: Option<i64>,
    alert_secs: i64,
) -> Result<Vec<SessionMonitor>, AppError> {
    let sessions = match exam_id {
        Some(id) => {
            sqlx::query_as::<_, ExamSession>(
                "SELECT * FROM exam_sessions WHERE exam_id = ? ORDER BY start_time DESC, id DESC",
            )
            .bind(id)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, ExamSession>(
                "SELECT * FROM exam_sessions ORDER BY start_time DESC, id DESC",
            )
            .fetch_all(pool)
            .await?
        }
    };

    let now = Utc::now();
    let board = sessions
        .into_iter()
        .map(|session| {
            let heartbeat_age_secs = (now - session.last_heartbeat).num_seconds().max(0);
            let stale = session.status == SessionStatus::Active && heartbeat_age_secs > alert_secs;
            SessionMonitor {
                heartbeat_age_secs,
                stale,
                session,
            }
        })
        .collect();

    Ok(board)
}
