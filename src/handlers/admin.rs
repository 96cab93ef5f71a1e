// src/handlers/admin.rs

//! Portal-side administration: exam and roster provisioning, center link
//! management, the paper vault, package builds, session monitoring and
//! the sync audit trail. All routes require an admin JWT minted by the
//! main portal with the shared secret.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use sqlx::{SqlitePool, types::Json as SqlJson};
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::candidate::RosterUploadRequest,
    models::center_link::{IssueLinkRequest, UpdateLinkStatusRequest},
    models::exam::{CreateExamRequest, Exam},
    models::exam_session::{TerminateSessionRequest, TerminatedBy},
    models::offline_package::BuildPackageRequest,
    models::question_paper::{CreatePaperRequest, DecryptPaperRequest},
    packages, registry, sessions, sync, vault,
};

/// Creates the minimal exam row this subsystem needs. Full exam CRUD
/// lives in the main portal; this is the provisioning seam.
pub async fn create_exam(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let exam = sqlx::query_as::<_, Exam>(
        r#"
        INSERT INTO exams (exam_code, title, single_device_login, duration_minutes, seb_config, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&payload.exam_code)
    .bind(&payload.title)
    .bind(payload.single_device_login.unwrap_or(true))
    .bind(payload.duration_minutes.unwrap_or(120))
    .bind(SqlJson(payload.seb_config.unwrap_or_default()))
    .bind(Utc::now())
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if e.as_database_error()
            .is_some_and(|d| d.is_unique_violation())
        {
            AppError::Conflict(format!("Exam code '{}' already exists", payload.exam_code))
        } else {
            AppError::InternalServerError(e.to_string())
        }
    })?;

    tracing::info!("Created exam {} ({})", exam.exam_code, exam.id);

    Ok((StatusCode::CREATED, Json(exam)))
}

/// Uploads (or re-uploads) an exam roster. Existing roll numbers get
/// their name and shift updated in place.
pub async fn upload_roster(
    State(pool): State<SqlitePool>,
    Path(exam_id): Path<i64>,
    Json(payload): Json<RosterUploadRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let exam_exists: Option<i64> = sqlx::query_scalar("SELECT id FROM exams WHERE id = ?")
        .bind(exam_id)
        .fetch_optional(&pool)
        .await?;
    if exam_exists.is_none() {
        return Err(AppError::NotFound("Exam not found".to_string()));
    }

    let now = Utc::now();
    let mut tx = pool.begin().await?;

    for entry in &payload.candidates {
        sqlx::query(
            r#"
            INSERT INTO candidates (exam_id, roll_number, full_name, shift_id, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (exam_id, roll_number) DO UPDATE SET
                full_name = excluded.full_name,
                shift_id = excluded.shift_id
            "#,
        )
        .bind(exam_id)
        .bind(&entry.roll_number)
        .bind(&entry.full_name)
        .bind(entry.shift_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    tracing::info!(
        "Roster upload for exam {}: {} candidates",
        exam_id,
        payload.candidates.len()
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({ "uploaded": payload.candidates.len() })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ExamScopeParams {
    pub exam_id: Option<i64>,
}

/// Issues a center link. The raw access token appears in this response
/// and nowhere else; hand it to the center out of band.
pub async fn issue_link(
    State(pool): State<SqlitePool>,
    Json(payload): Json<IssueLinkRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let link = registry::issue_link(&pool, &payload).await?;
    let access_token = link.access_token.clone();

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "link": link,
            "access_token": access_token,
        })),
    ))
}

/// Swaps a link's access token. The response is the only place the new
/// token is readable.
pub async fn rotate_link(
    State(pool): State<SqlitePool>,
    Path(link_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let link = registry::rotate_token(&pool, link_id).await?;
    let access_token = link.access_token.clone();

    Ok(Json(json!({
        "link": link,
        "access_token": access_token,
    })))
}

/// Suspends or reinstates a link.
pub async fn update_link_status(
    State(pool): State<SqlitePool>,
    Path(link_id): Path<i64>,
    Json(payload): Json<UpdateLinkStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    let link = registry::set_status(&pool, link_id, payload.status).await?;
    Ok(Json(link))
}

pub async fn list_links(
    State(pool): State<SqlitePool>,
    Query(params): Query<ExamScopeParams>,
) -> Result<impl IntoResponse, AppError> {
    let links = registry::list_links(&pool, params.exam_id).await?;
    Ok(Json(links))
}

/// Seals a question paper into the vault.
pub async fn create_paper(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreatePaperRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let paper = vault::encrypt_paper(&pool, &payload).await?;

    Ok((StatusCode::CREATED, Json(paper)))
}

/// Decrypts a paper for inspection. Passphrase gated; answer keys are
/// included, this surface is admin-only.
pub async fn decrypt_paper(
    State(pool): State<SqlitePool>,
    Path(paper_id): Path<i64>,
    Json(payload): Json<DecryptPaperRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let questions = vault::decrypt_paper(&pool, paper_id, &payload.passphrase).await?;

    Ok(Json(questions))
}

/// Builds a fresh offline package for an exam (optionally one shift).
pub async fn build_package(
    State(pool): State<SqlitePool>,
    Json(payload): Json<BuildPackageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let package = packages::build_package(&pool, payload.exam_id, payload.shift_id).await?;

    Ok((StatusCode::CREATED, Json(package)))
}

pub async fn list_packages(
    State(pool): State<SqlitePool>,
    Query(params): Query<ExamScopeParams>,
) -> Result<impl IntoResponse, AppError> {
    let packages = packages::list_packages(&pool, params.exam_id).await?;
    Ok(Json(packages))
}

/// Live session board with heartbeat ages and stale flags.
pub async fn monitor_sessions(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Query(params): Query<ExamScopeParams>,
) -> Result<impl IntoResponse, AppError> {
    let board = sessions::monitor(&pool, params.exam_id, config.heartbeat_alert_secs).await?;
    Ok(Json(board))
}

/// Forcibly closes a central session with an audit reason.
pub async fn terminate_session(
    State(pool): State<SqlitePool>,
    Path(session_token): Path<String>,
    Json(payload): Json<TerminateSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let session =
        sessions::terminate_session(&pool, &session_token, &payload.reason, TerminatedBy::Admin)
            .await?;

    Ok(Json(session))
}

#[derive(Debug, Deserialize)]
pub struct SyncLogParams {
    pub exam_id: Option<i64>,
    pub center_link_id: Option<i64>,
}

/// Sync audit trail, newest first.
pub async fn list_sync_logs(
    State(pool): State<SqlitePool>,
    Query(params): Query<SyncLogParams>,
) -> Result<impl IntoResponse, AppError> {
    let logs = sync::list_logs(&pool, params.exam_id, params.center_link_id).await?;
    Ok(Json(logs))
}
