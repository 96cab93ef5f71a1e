// src/models/exam_session.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Central session lifecycle. Transitions only leave ACTIVE; a closed
/// session never reopens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Active,
    Completed,
    Terminated,
}

/// Who closed a terminated session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminatedBy {
    Admin,
    Candidate,
    System,
}

/// Represents the 'exam_sessions' table in the database.
/// The portal-side record of one candidate sitting one exam.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExamSession {
    pub id: i64,

    /// Opaque bearer token the candidate machine holds for the session.
    pub session_token: String,

    pub exam_id: i64,
    pub center_link_id: i64,
    pub candidate_id: i64,
    pub roll_number: String,

    pub status: SessionStatus,

    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,

    /// Bumped by the candidate machine roughly once a minute. A stale
    /// value flags the session for invigilators; it never closes it.
    pub last_heartbeat: chrono::DateTime<chrono::Utc>,

    pub termination_reason: Option<String>,
    pub terminated_by: Option<TerminatedBy>,

    pub browser_locked: bool,

    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// DTO for starting a session through a center link.
#[derive(Debug, Deserialize, Validate)]
pub struct StartSessionRequest {
    #[validate(length(min = 10, max = 200))]
    pub access_token: String,

    pub candidate_id: i64,

    #[validate(length(min = 1, max = 50))]
    pub roll_number: String,
}

/// DTO for the periodic liveness ping.
#[derive(Debug, Deserialize, Validate)]
pub struct HeartbeatRequest {
    #[validate(length(min = 1, max = 100))]
    pub session_token: String,
}

/// DTO for a candidate finishing normally.
#[derive(Debug, Deserialize, Validate)]
pub struct EndSessionRequest {
    #[validate(length(min = 1, max = 100))]
    pub session_token: String,
}

/// DTO for an administrator forcibly closing a session.
#[derive(Debug, Deserialize, Validate)]
pub struct TerminateSessionRequest {
    #[validate(length(
        min = 3,
        max = 500,
        message = "A termination reason is required."
    ))]
    pub reason: String,
}

/// One row on the live monitoring board.
#[derive(Debug, Serialize)]
pub struct SessionMonitor {
    #[serde(flatten)]
    pub session: ExamSession,

    /// Seconds since the last heartbeat, at read time.
    pub heartbeat_age_secs: i64,

    /// True when the session is ACTIVE but the heartbeat is older than the
    /// configured alert threshold.
    pub stale: bool,
}
