// src/models/candidate.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'candidates' table in the database.
/// One row per registered candidate on an exam's roster.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Candidate {
    pub id: i64,
    pub exam_id: i64,

    /// Roll number printed on the admit card. Unique within an exam.
    pub roll_number: String,

    pub full_name: String,

    /// Shift the candidate is allotted to, when the exam runs in shifts.
    pub shift_id: Option<i64>,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// One roster row in a bulk upload.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RosterEntry {
    #[validate(length(min = 1, max = 50))]
    pub roll_number: String,

    #[validate(length(min = 1, max = 100))]
    pub full_name: String,

    pub shift_id: Option<i64>,
}

/// DTO for uploading (or re-uploading) an exam roster.
/// Re-uploads update names and shifts in place.
#[derive(Debug, Deserialize, Validate)]
pub struct RosterUploadRequest {
    #[validate(length(min = 1, message = "Roster must contain at least one candidate."), nested)]
    pub candidates: Vec<RosterEntry>,
}
