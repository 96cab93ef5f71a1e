// src/models/local_session.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Lifecycle of a center-local session. WAITING and IN_PROGRESS are live;
/// SUBMITTED and TERMINATED are terminal and eligible for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocalSessionStatus {
    Waiting,
    InProgress,
    Submitted,
    Terminated,
}

/// Represents the 'local_student_sessions' table in the database.
/// The center-side shadow of a candidate's sitting. It exists even when
/// the portal was unreachable at login time; reconciliation happens in
/// the sync module.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LocalStudentSession {
    pub id: i64,
    pub center_link_id: i64,
    pub exam_id: i64,
    pub candidate_id: i64,

    /// Matches the central session token when the portal registered the
    /// sitting live; otherwise minted locally and registered during sync.
    pub session_token: String,

    pub seat_number: Option<String>,
    pub computer_number: Option<String>,

    pub status: LocalSessionStatus,

    pub termination_reason: Option<String>,

    pub exam_start_time: Option<chrono::DateTime<chrono::Utc>>,
    pub exam_end_time: Option<chrono::DateTime<chrono::Utc>>,

    pub synced_to_center: bool,

    /// Set exactly once, after the portal accepted this sitting's records.
    pub synced_to_main: bool,
    pub synced_to_main_at: Option<chrono::DateTime<chrono::Utc>>,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Represents the 'local_responses' table in the database.
/// One row per (session, question); re-saves overwrite in place.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LocalResponse {
    pub id: i64,
    pub local_session_id: i64,
    pub question_id: i64,
    pub selected_answer: String,
    pub marked_for_review: bool,
    pub time_taken_secs: i64,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for seating a candidate at the center.
#[derive(Debug, Deserialize, Validate)]
pub struct StudentLoginRequest {
    pub candidate_id: i64,

    #[validate(length(min = 1, max = 50))]
    pub roll_number: String,

    #[validate(length(max = 20))]
    pub seat_number: Option<String>,

    #[validate(length(max = 20))]
    pub computer_number: Option<String>,
}

/// One answer in a save batch.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ResponseItem {
    pub question_id: i64,

    #[validate(length(min = 1, max = 500))]
    pub selected_answer: String,

    #[serde(default)]
    pub marked_for_review: bool,

    #[serde(default)]
    #[validate(range(min = 0))]
    pub time_taken_secs: i64,
}

/// DTO for saving a batch of answers. Always lands in local storage only.
#[derive(Debug, Deserialize, Validate)]
pub struct SaveResponsesRequest {
    #[validate(length(min = 1, message = "At least one response is required."), nested)]
    pub responses: Vec<ResponseItem>,
}

/// DTO for the final submission from the candidate machine. Any responses
/// still on the machine ride along and upsert before the status flips.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitExamRequest {
    #[serde(default)]
    #[validate(nested)]
    pub responses: Vec<ResponseItem>,

    /// Question count as the candidate machine saw it; logged for audit.
    pub total_questions: Option<i64>,
}

/// DTO for a center operator forcibly closing a local session.
#[derive(Debug, Deserialize, Validate)]
pub struct TerminateStudentRequest {
    #[validate(length(min = 1, max = 100))]
    pub session_token: String,

    #[validate(length(
        min = 3,
        max = 500,
        message = "A termination reason is required."
    ))]
    pub reason: String,
}

/// A local session plus its recorded answer count, for the operator panel.
#[derive(Debug, Serialize)]
pub struct LocalSessionSummary {
    #[serde(flatten)]
    pub session: LocalStudentSession,

    pub responses: i64,
}
