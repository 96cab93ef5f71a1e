// src/handlers/secure_exam.rs

use std::net::SocketAddr;

use axum::{
    Json,
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, StatusCode, header::USER_AGENT},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    error::AppError,
    models::exam::Exam,
    models::exam_session::{EndSessionRequest, HeartbeatRequest, StartSessionRequest},
    packages, registry, sessions,
};

/// Checks a center access token without consuming anything, and returns
/// what the lockdown client needs to render the gate screen.
pub async fn validate_token(
    State(pool): State<SqlitePool>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let link = registry::validate_token(&pool, &token).await?;

    let exam = sqlx::query_as::<_, Exam>("SELECT * FROM exams WHERE id = ?")
        .bind(link.exam_id)
        .fetch_one(&pool)
        .await?;

    Ok(Json(json!({
        "center": link,
        "exam": exam,
    })))
}

/// Opens a session for a candidate arriving through a center link.
/// Consumes one usage slot on success.
pub async fn start_session(
    State(pool): State<SqlitePool>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<StartSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let ip_address = Some(addr.ip().to_string());
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let (session, link) = sessions::start_session(&pool, &payload, ip_address, user_agent).await?;

    let exam = sqlx::query_as::<_, Exam>("SELECT * FROM exams WHERE id = ?")
        .bind(session.exam_id)
        .fetch_one(&pool)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "session": session,
            "center_name": link.center_name,
            "seb_config": exam.seb_config,
            "duration_minutes": exam.duration_minutes,
        })),
    ))
}

/// Liveness ping from the candidate machine.
pub async fn heartbeat(
    State(pool): State<SqlitePool>,
    Json(payload): Json<HeartbeatRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let server_time = sessions::heartbeat(&pool, &payload.session_token).await?;

    Ok(Json(json!({
        "status": "alive",
        "server_time": server_time,
    })))
}

/// Candidate finished the paper.
pub async fn end_session(
    State(pool): State<SqlitePool>,
    Json(payload): Json<EndSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let session = sessions::complete_session(&pool, &payload.session_token).await?;

    Ok(Json(session))
}

#[derive(Debug, Deserialize)]
pub struct PackageParams {
    pub shift_id: Option<i64>,
}

/// Full offline package download, gated on a valid center token.
pub async fn download_package(
    State(pool): State<SqlitePool>,
    Path(token): Path<String>,
    Query(params): Query<PackageParams>,
) -> Result<impl IntoResponse, AppError> {
    let link = registry::validate_token(&pool, &token).await?;

    let manifest = packages::manifest(&pool, &link, params.shift_id).await?;

    Ok(Json(manifest))
}
