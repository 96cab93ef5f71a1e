// src/handlers/center_admin.rs

//! Center-operator gateway.
//!
//! Everything here runs on the center's local network. Candidate-facing
//! writes land in the local tables and never wait on the WAN; the only
//! handlers that touch central state (student-login while online,
//! sync-to-main) go through the connectivity handle first.

use std::net::SocketAddr;

use axum::{
    Json,
    extract::{ConnectInfo, Extension, State},
    http::{HeaderMap, StatusCode, header::USER_AGENT},
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::candidate::Candidate,
    models::center_link::{CenterLink, CenterOperator, OperatorLoginRequest},
    models::exam_session::StartSessionRequest,
    models::local_session::{
        LocalSessionStatus, LocalSessionSummary, LocalStudentSession, StudentLoginRequest,
        TerminateStudentRequest,
    },
    models::question_paper::UnlockPaperRequest,
    models::sync_log::SyncRequest,
    registry, sessions,
    state::{Connectivity, PaperCache},
    sync,
    utils::{
        hash::verify_password,
        jwt::{Claims, sign_jwt},
        token,
    },
    vault,
};

/// Authenticates a center operator and returns a JWT scoped to their link.
///
/// A physical center can hold one ACTIVE link per exam, so the username
/// picks out which of the center's links the operator belongs to.
/// Rotated-out and suspended links keep their operator rows but stop
/// accepting logins.
pub async fn login(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Json(payload): Json<OperatorLoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let link = sqlx::query_as::<_, CenterLink>(
        r#"
        SELECT cl.* FROM center_links cl
        JOIN center_operators co ON co.center_link_id = cl.id
        WHERE cl.center_code = ? AND cl.status = 'ACTIVE' AND co.username = ?
        ORDER BY cl.id DESC LIMIT 1
        "#,
    )
    .bind(&payload.center_code)
    .bind(&payload.username)
    .fetch_optional(&pool)
    .await?;

    // A missing center and a bad password read the same from outside.
    let link = link.ok_or(AppError::AuthError("Invalid credentials".to_string()))?;

    let operator = sqlx::query_as::<_, CenterOperator>(
        "SELECT * FROM center_operators WHERE center_link_id = ? AND username = ?",
    )
    .bind(link.id)
    .bind(&payload.username)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::AuthError("Invalid credentials".to_string()))?;

    if !verify_password(&payload.password, &operator.password_hash)? {
        return Err(AppError::AuthError("Invalid credentials".to_string()));
    }

    let jwt = sign_jwt(
        operator.id,
        "center",
        Some(link.id),
        &config.jwt_secret,
        config.jwt_expiration_secs,
    )?;

    tracing::info!(
        "Operator {} logged in for center {} (link {})",
        operator.username,
        link.center_code,
        link.id
    );

    Ok(Json(json!({
        "token": jwt,
        "type": "Bearer",
        "center_name": link.center_name,
        "exam_id": link.exam_id,
    })))
}

/// Resolves the link an operator token is scoped to.
async fn operator_link(pool: &SqlitePool, claims: &Claims) -> Result<CenterLink, AppError> {
    let link_id = claims
        .center_link_id
        .ok_or_else(|| AppError::AuthError("Not a center operator token".to_string()))?;
    registry::load_link(pool, link_id).await
}

/// Seats a candidate and opens their local session.
///
/// While the portal is reachable the central session is registered in the
/// same request and any rejection (duplicate device, exhausted cap) fails
/// the login outright. Offline, the session exists only locally and the
/// reconciler registers it later.
pub async fn student_login(
    State(pool): State<SqlitePool>,
    State(central): State<Connectivity>,
    Extension(claims): Extension<Claims>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<StudentLoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let link = operator_link(&pool, &claims).await?;

    let candidate =
        sqlx::query_as::<_, Candidate>("SELECT * FROM candidates WHERE id = ? AND exam_id = ?")
            .bind(payload.candidate_id)
            .bind(link.exam_id)
            .fetch_optional(&pool)
            .await?
            .ok_or_else(|| {
                AppError::NotFound("Candidate is not on this exam's roster".to_string())
            })?;

    if candidate.roll_number != payload.roll_number {
        return Err(AppError::BadRequest(
            "Roll number does not match this candidate".to_string(),
        ));
    }

    // One open seat per candidate per center, regardless of central policy.
    let open_local: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT id FROM local_student_sessions
        WHERE center_link_id = ? AND candidate_id = ? AND status IN ('WAITING', 'IN_PROGRESS')
        "#,
    )
    .bind(link.id)
    .bind(candidate.id)
    .fetch_optional(&pool)
    .await?;
    if open_local.is_some() {
        return Err(AppError::DuplicateSession(format!(
            "Candidate {} is already seated at this center",
            candidate.roll_number
        )));
    }

    let (session_token, central_registered) = if central.is_online() {
        let req = StartSessionRequest {
            access_token: link.access_token.clone(),
            candidate_id: candidate.id,
            roll_number: candidate.roll_number.clone(),
        };
        let ip_address = Some(addr.ip().to_string());
        let user_agent = headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let (session, _) = sessions::start_session(&pool, &req, ip_address, user_agent).await?;
        (session.session_token, true)
    } else {
        // Gate checks still apply offline; the link data shipped with the
        // package. Usage is consumed at sync time instead.
        registry::check_link(&link)?;
        (token::generate_session_token(), false)
    };

    // The seat check repeats inside the insert so two operator consoles
    // racing on the same candidate cannot both seat them.
    let local = sqlx::query_as::<_, LocalStudentSession>(
        r#"
        INSERT INTO local_student_sessions
            (center_link_id, exam_id, candidate_id, session_token, seat_number,
             computer_number, status, synced_to_center, synced_to_main, created_at)
        SELECT ?, ?, ?, ?, ?, ?, ?, 1, 0, ?
        WHERE NOT EXISTS (
            SELECT 1 FROM local_student_sessions
            WHERE center_link_id = ? AND candidate_id = ?
              AND status IN ('WAITING', 'IN_PROGRESS')
        )
        RETURNING *
        "#,
    )
    .bind(link.id)
    .bind(link.exam_id)
    .bind(candidate.id)
    .bind(&session_token)
    .bind(&payload.seat_number)
    .bind(&payload.computer_number)
    .bind(LocalSessionStatus::Waiting)
    .bind(Utc::now())
    .bind(link.id)
    .bind(candidate.id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| {
        AppError::DuplicateSession(format!(
            "Candidate {} is already seated at this center",
            candidate.roll_number
        ))
    })?;

    tracing::info!(
        "Seated candidate {} at center {} ({}, central_registered={})",
        candidate.roll_number,
        link.center_code,
        token::redact(&session_token),
        central_registered
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "session": local,
            "candidate": candidate,
            "central_registered": central_registered,
        })),
    ))
}

/// Decrypts a paper into the in-process cache so the student panel can
/// serve it. The passphrase arrives from the invigilator at gate time and
/// is dropped when this request ends.
pub async fn unlock_paper(
    State(pool): State<SqlitePool>,
    State(papers): State<PaperCache>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UnlockPaperRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let link = operator_link(&pool, &claims).await?;

    let paper = vault::load_paper(&pool, payload.paper_id).await?;
    if paper.exam_id != link.exam_id {
        return Err(AppError::NotFound("Question paper not found".to_string()));
    }

    let questions = vault::open_paper(&paper, &payload.passphrase).map_err(|e| {
        if matches!(e, AppError::DecryptionFailed) {
            tracing::warn!(
                "Failed unlock attempt for paper {} at center {}",
                paper.paper_code,
                link.center_code
            );
        }
        e
    })?;

    let count = questions.len();
    papers.unlock(paper.id, questions).await;

    tracing::info!(
        "Paper {} unlocked at center {} ({} questions)",
        paper.paper_code,
        link.center_code,
        count
    );

    Ok(Json(json!({
        "paper_code": paper.paper_code,
        "questions": count,
    })))
}

/// Operator closes a candidate's local session with a reason. Repeating
/// the identical order is a no-op success; the reconciler carries the
/// termination to the portal.
pub async fn terminate_student(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<TerminateStudentRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let link = operator_link(&pool, &claims).await?;

    let current = sqlx::query_as::<_, LocalStudentSession>(
        "SELECT * FROM local_student_sessions WHERE session_token = ? AND center_link_id = ?",
    )
    .bind(&payload.session_token)
    .bind(link.id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::SessionNotFound)?;

    match current.status {
        LocalSessionStatus::Waiting | LocalSessionStatus::InProgress => {}
        LocalSessionStatus::Terminated
            if current.termination_reason.as_deref() == Some(payload.reason.as_str()) =>
        {
            return Ok(Json(current));
        }
        _ => return Err(AppError::SessionAlreadyClosed),
    }

    let session = sqlx::query_as::<_, LocalStudentSession>(
        r#"
        UPDATE local_student_sessions
        SET status = ?, termination_reason = ?, exam_end_time = ?
        WHERE id = ? AND status IN ('WAITING', 'IN_PROGRESS')
        RETURNING *
        "#,
    )
    .bind(LocalSessionStatus::Terminated)
    .bind(&payload.reason)
    .bind(Utc::now())
    .bind(current.id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::SessionAlreadyClosed)?;

    tracing::warn!(
        "Local session {} terminated by operator: {}",
        token::redact(&session.session_token),
        payload.reason
    );

    Ok(Json(session))
}

/// Uploads every closed, unsynced local session to the portal.
pub async fn sync_to_main(
    State(pool): State<SqlitePool>,
    State(central): State<Connectivity>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<SyncRequest>,
) -> Result<impl IntoResponse, AppError> {
    let link = operator_link(&pool, &claims).await?;

    let exam_id = payload.exam_id.unwrap_or(link.exam_id);
    if exam_id != link.exam_id {
        return Err(AppError::BadRequest(
            "This center is not linked to that exam".to_string(),
        ));
    }

    if !central.is_online() {
        return Err(AppError::BadRequest(
            "The portal is not reachable; check connectivity and retry".to_string(),
        ));
    }

    let log = sync::sync_batch(&pool, link.id, exam_id).await?;

    Ok(Json(json!({
        "uploaded": log.records_uploaded,
        "failed": log.records_failed,
        "log": log,
    })))
}

/// DTO for the offline-mode switch.
#[derive(Debug, Deserialize)]
pub struct ConnectivityRequest {
    pub online: bool,
}

/// Flips the gateway's view of WAN availability.
pub async fn set_connectivity(
    State(central): State<Connectivity>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ConnectivityRequest>,
) -> Result<impl IntoResponse, AppError> {
    // Scope check only; no row to load.
    claims
        .center_link_id
        .ok_or_else(|| AppError::AuthError("Not a center operator token".to_string()))?;

    central.set_online(payload.online);
    tracing::info!("Center connectivity set to online={}", payload.online);

    Ok(Json(json!({ "online": payload.online })))
}

/// Lists the center's local sessions with answer counts and sync flags.
pub async fn local_sessions(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let link = operator_link(&pool, &claims).await?;

    let rows = sqlx::query_as::<_, LocalStudentSession>(
        "SELECT * FROM local_student_sessions WHERE center_link_id = ? ORDER BY id",
    )
    .bind(link.id)
    .fetch_all(&pool)
    .await?;

    let mut summaries = Vec::with_capacity(rows.len());
    for session in rows {
        let responses: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM local_responses WHERE local_session_id = ?")
                .bind(session.id)
                .fetch_one(&pool)
                .await?;
        summaries.push(LocalSessionSummary { session, responses });
    }

    Ok(Json(summaries))
}
