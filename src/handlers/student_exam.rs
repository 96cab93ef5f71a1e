// src/handlers/student_exam.rs

//! Candidate-facing exam panel, addressed by session token.
//!
//! Every write here is local and synchronous. A WAN outage mid-exam is
//! invisible from this surface; reconciliation happens elsewhere.

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    error::AppError,
    models::local_session::{
        LocalSessionStatus, LocalStudentSession, ResponseItem, SaveResponsesRequest,
        SubmitExamRequest,
    },
    models::question_paper::PublicQuestion,
    packages,
    state::PaperCache,
    utils::token,
};

async fn load_session(
    pool: &SqlitePool,
    session_token: &str,
) -> Result<LocalStudentSession, AppError> {
    sqlx::query_as::<_, LocalStudentSession>(
        "SELECT * FROM local_student_sessions WHERE session_token = ?",
    )
    .bind(session_token)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::SessionNotFound)
}

async fn upsert_responses(
    pool: &SqlitePool,
    local_session_id: i64,
    responses: &[ResponseItem],
) -> Result<i64, AppError> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    for r in responses {
        sqlx::query(
            r#"
            INSERT INTO local_responses
                (local_session_id, question_id, selected_answer,
                 marked_for_review, time_taken_secs, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (local_session_id, question_id) DO UPDATE SET
                selected_answer = excluded.selected_answer,
                marked_for_review = excluded.marked_for_review,
                time_taken_secs = excluded.time_taken_secs,
                recorded_at = excluded.recorded_at
            "#,
        )
        .bind(local_session_id)
        .bind(r.question_id)
        .bind(&r.selected_answer)
        .bind(r.marked_for_review)
        .bind(r.time_taken_secs)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(responses.len() as i64)
}

/// Serves the question list with answer keys stripped. The first fetch
/// moves the session WAITING -> IN_PROGRESS and stamps the start time.
///
/// Requires a READY package for the exam and a paper the operator has
/// already unlocked; candidates cannot trigger decryption themselves.
pub async fn get_questions(
    State(pool): State<SqlitePool>,
    State(papers): State<PaperCache>,
    Path(session_token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = load_session(&pool, &session_token).await?;

    match session.status {
        LocalSessionStatus::Waiting | LocalSessionStatus::InProgress => {}
        _ => return Err(AppError::SessionNotActive),
    }

    let shift_id: Option<i64> = sqlx::query_scalar("SELECT shift_id FROM candidates WHERE id = ?")
        .bind(session.candidate_id)
        .fetch_one(&pool)
        .await?;

    let package = packages::current_package(&pool, session.exam_id, shift_id).await?;

    let mut unlocked = None;
    for paper_id in package.paper_ids.iter().copied() {
        if let Some(questions) = papers.get(paper_id).await {
            unlocked = Some(questions);
            break;
        }
    }
    let questions = unlocked.ok_or_else(|| {
        AppError::PackageNotReady("The question paper has not been unlocked yet".to_string())
    })?;

    if session.status == LocalSessionStatus::Waiting {
        sqlx::query(
            "UPDATE local_student_sessions SET status = ?, exam_start_time = ? WHERE id = ? AND status = ?",
        )
        .bind(LocalSessionStatus::InProgress)
        .bind(Utc::now())
        .bind(session.id)
        .bind(LocalSessionStatus::Waiting)
        .execute(&pool)
        .await?;

        tracing::info!("Session {} began the paper", token::redact(&session_token));
    }

    let stripped: Vec<PublicQuestion> = questions.iter().map(PublicQuestion::from).collect();

    Ok(Json(json!({
        "package_code": package.package_code,
        "questions": stripped,
    })))
}

/// Bulk answer save. Upserts per question; saving the same question again
/// overwrites the earlier answer.
pub async fn save_responses(
    State(pool): State<SqlitePool>,
    Path(session_token): Path<String>,
    Json(payload): Json<SaveResponsesRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let session = load_session(&pool, &session_token).await?;

    match session.status {
        LocalSessionStatus::Waiting | LocalSessionStatus::InProgress => {}
        _ => return Err(AppError::SessionNotActive),
    }

    let saved = upsert_responses(&pool, session.id, &payload.responses).await?;

    Ok(Json(json!({ "saved": saved })))
}

/// Final submission: lands any remaining responses, then closes the
/// session as SUBMITTED. Local-only; sync state does not gate it.
pub async fn submit_exam(
    State(pool): State<SqlitePool>,
    Path(session_token): Path<String>,
    Json(payload): Json<SubmitExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let session = load_session(&pool, &session_token).await?;

    match session.status {
        LocalSessionStatus::Waiting | LocalSessionStatus::InProgress => {}
        _ => return Err(AppError::SessionAlreadyClosed),
    }

    if !payload.responses.is_empty() {
        upsert_responses(&pool, session.id, &payload.responses).await?;
    }

    let submitted = sqlx::query_as::<_, LocalStudentSession>(
        r#"
        UPDATE local_student_sessions
        SET status = ?, exam_end_time = ?
        WHERE id = ? AND status IN ('WAITING', 'IN_PROGRESS')
        RETURNING *
        "#,
    )
    .bind(LocalSessionStatus::Submitted)
    .bind(Utc::now())
    .bind(session.id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::SessionAlreadyClosed)?;

    if let Some(total) = payload.total_questions {
        let answered: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM local_responses WHERE local_session_id = ?")
                .bind(session.id)
                .fetch_one(&pool)
                .await?;
        tracing::info!(
            "Session {} submitted: {}/{} questions answered",
            token::redact(&session_token),
            answered,
            total
        );
    } else {
        tracing::info!("Session {} submitted", token::redact(&session_token));
    }

    Ok(Json(submitted))
}
