// src/sync.rs

//! Center-to-portal reconciliation.
//!
//! Uploads closed local sessions and their responses once connectivity is
//! back. Each session merges inside its own transaction and flips a
//! synced flag at the end, so re-running a batch after any kind of crash
//! re-uploads nothing and loses nothing. Central responses are keyed on
//! (exam, candidate, question); a re-delivered answer overwrites in place
//! and the last write wins.

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::error::AppError;
use crate::models::exam_session::{ExamSession, SessionStatus, TerminatedBy};
use crate::models::local_session::{LocalResponse, LocalSessionStatus, LocalStudentSession};
use crate::models::sync_log::{SyncLog, SyncLogStatus};
use crate::packages;
use crate::registry;
use crate::utils::token;

/// Runs one sync batch for a center link: every SUBMITTED or TERMINATED
/// local session not yet uploaded, oldest first. Per-session rejections
/// (e.g. the center's usage cap was already spent) are counted and left
/// pending; storage failures abort the batch.
pub async fn sync_batch(
    pool: &SqlitePool,
    center_link_id: i64,
    exam_id: i64,
) -> Result<SyncLog, AppError> {
    let started_at = Utc::now();

    let log_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO sync_logs (center_link_id, exam_id, sync_type, status, started_at)
        VALUES (?, ?, 'RESPONSES', ?, ?)
        RETURNING id
        "#,
    )
    .bind(center_link_id)
    .bind(exam_id)
    .bind(SyncLogStatus::InProgress)
    .bind(started_at)
    .fetch_one(pool)
    .await?;

    let pending = sqlx::query_as::<_, LocalStudentSession>(
        r#"
        SELECT * FROM local_student_sessions
        WHERE center_link_id = ? AND exam_id = ? AND synced_to_main = 0 AND status IN (?, ?)
        ORDER BY id
        "#,
    )
    .bind(center_link_id)
    .bind(exam_id)
    .bind(LocalSessionStatus::Submitted)
    .bind(LocalSessionStatus::Terminated)
    .fetch_all(pool)
    .await?;

    let mut records_uploaded: i64 = 0;
    let mut records_failed: i64 = 0;

    for local in &pending {
        match merge_session(pool, local).await {
            Ok(uploaded) => records_uploaded += uploaded,
            Err(AppError::InternalServerError(msg)) => {
                // Storage trouble. Close the log with what landed so far;
                // everything unmerged stays pending for the next batch.
                finalize_log(
                    pool,
                    log_id,
                    SyncLogStatus::Failed,
                    records_uploaded,
                    records_failed,
                )
                .await?;
                return Err(AppError::SyncPartialFailure(format!(
                    "Batch aborted after {} uploads: {}",
                    records_uploaded, msg
                )));
            }
            Err(e) => {
                records_failed += 1;
                tracing::warn!(
                    "Sync rejected session {}: {}",
                    token::redact(&local.session_token),
                    e
                );
            }
        }
    }

    finalize_log(
        pool,
        log_id,
        SyncLogStatus::Completed,
        records_uploaded,
        records_failed,
    )
    .await?;

    if records_failed == 0 {
        packages::mark_synced(pool, exam_id).await?;
    }

    let log = sqlx::query_as::<_, SyncLog>("SELECT * FROM sync_logs WHERE id = ?")
        .bind(log_id)
        .fetch_one(pool)
        .await?;

    tracing::info!(
        "Sync batch {} for center link {}: {} responses uploaded, {} sessions rejected",
        log.id,
        center_link_id,
        log.records_uploaded,
        log.records_failed
    );

    Ok(log)
}

/// Replays one closed local session into the central store: registers the
/// session if the portal never saw it, settles its terminal status,
/// upserts its responses and flips the synced flag. All of it commits
/// together or not at all. Returns the number of response rows uploaded.
async fn merge_session(pool: &SqlitePool, local: &LocalStudentSession) -> Result<i64, AppError> {
    let target = match local.status {
        LocalSessionStatus::Submitted => SessionStatus::Completed,
        LocalSessionStatus::Terminated => SessionStatus::Terminated,
        // caller only hands over closed sessions
        _ => return Ok(0),
    };

    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let central =
        sqlx::query_as::<_, ExamSession>("SELECT * FROM exam_sessions WHERE session_token = ?")
            .bind(&local.session_token)
            .fetch_optional(&mut *tx)
            .await?;

    match central {
        None => {
            // The sitting ran entirely offline. Register it in its terminal
            // state and take the usage slot a live start would have taken;
            // if the cap is already spent the whole merge rolls back.
            let start_time = local.exam_start_time.unwrap_or(local.created_at);
            let last_beat = local
                .exam_end_time
                .or(local.exam_start_time)
                .unwrap_or(local.created_at);
            let terminated_by = match target {
                SessionStatus::Terminated => Some(TerminatedBy::Admin),
                _ => None,
            };

            let roll_number: String =
                sqlx::query_scalar("SELECT roll_number FROM candidates WHERE id = ?")
                    .bind(local.candidate_id)
                    .fetch_one(&mut *tx)
                    .await?;

            sqlx::query(
                r#"
                INSERT INTO exam_sessions
                    (session_token, exam_id, center_link_id, candidate_id, roll_number,
                     status, start_time, end_time, last_heartbeat,
                     termination_reason, terminated_by, browser_locked)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
                "#,
            )
            .bind(&local.session_token)
            .bind(local.exam_id)
            .bind(local.center_link_id)
            .bind(local.candidate_id)
            .bind(&roll_number)
            .bind(target)
            .bind(start_time)
            .bind(local.exam_end_time)
            .bind(last_beat)
            .bind(&local.termination_reason)
            .bind(terminated_by)
            .execute(&mut *tx)
            .await?;

            registry::consume_usage(&mut *tx, local.center_link_id).await?;
        }
        Some(c) if c.status == SessionStatus::Active => {
            let terminated_by = match target {
                SessionStatus::Terminated => Some(TerminatedBy::Admin),
                _ => None,
            };
            sqlx::query(
                r#"
                UPDATE exam_sessions
                SET status = ?, end_time = ?, termination_reason = ?, terminated_by = ?
                WHERE id = ? AND status = ?
                "#,
            )
            .bind(target)
            .bind(local.exam_end_time.unwrap_or(now))
            .bind(&local.termination_reason)
            .bind(terminated_by)
            .bind(c.id)
            .bind(SessionStatus::Active)
            .execute(&mut *tx)
            .await?;
        }
        // Closed centrally already; terminal states are never rewritten.
        Some(_) => {}
    }

    let responses = sqlx::query_as::<_, LocalResponse>(
        "SELECT * FROM local_responses WHERE local_session_id = ? ORDER BY question_id",
    )
    .bind(local.id)
    .fetch_all(&mut *tx)
    .await?;

    let mut uploaded: i64 = 0;
    for r in &responses {
        sqlx::query(
            r#"
            INSERT INTO central_responses
                (exam_id, candidate_id, question_id, selected_answer,
                 marked_for_review, time_taken_secs, synced_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (exam_id, candidate_id, question_id) DO UPDATE SET
                selected_answer = excluded.selected_answer,
                marked_for_review = excluded.marked_for_review,
                time_taken_secs = excluded.time_taken_secs,
                synced_at = excluded.synced_at
            "#,
        )
        .bind(local.exam_id)
        .bind(local.candidate_id)
        .bind(r.question_id)
        .bind(&r.selected_answer)
        .bind(r.marked_for_review)
        .bind(r.time_taken_secs)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        uploaded += 1;
    }

    sqlx::query(
        "UPDATE local_student_sessions SET synced_to_main = 1, synced_to_main_at = ? WHERE id = ?",
    )
    .bind(now)
    .bind(local.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(uploaded)
}

/// Closes a sync log exactly once. Terminal logs are never edited, the
/// status guard makes a double finalize a no-op.
async fn finalize_log(
    pool: &SqlitePool,
    log_id: i64,
    status: SyncLogStatus,
    uploaded: i64,
    failed: i64,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE sync_logs
        SET status = ?, records_uploaded = ?, records_failed = ?, completed_at = ?
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(status)
    .bind(uploaded)
    .bind(failed)
    .bind(Utc::now())
    .bind(log_id)
    .bind(SyncLogStatus::InProgress)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn list_logs(
    pool: &SqlitePool,
    exam_id: Option<i64>,
    center_link_id: Option<i64>,
) -> Result<Vec<SyncLog>, AppError> {
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM sync_logs WHERE 1 = 1");

    if let Some(id) = exam_id {
        builder.push(" AND exam_id = ");
        builder.push_bind(id);
    }
    if let Some(id) = center_link_id {
        builder.push(" AND center_link_id = ");
        builder.push_bind(id);
    }
    builder.push(" ORDER BY id DESC");

    let logs = builder
        .build_query_as::<SyncLog>()
        .fetch_all(pool)
        .await?;

    Ok(logs)
}
