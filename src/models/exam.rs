// src/models/exam.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

/// Safe Exam Browser requirements pushed to the candidate machine at
/// session start. Stored as a JSON blob on the exam row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SebConfig {
    /// Candidate machines must run with the lockdown browser engaged.
    #[serde(default)]
    pub browser_lock: bool,

    /// Password invigilators use to quit the lockdown browser mid-exam.
    #[serde(default)]
    pub quit_password: Option<String>,

    /// URLs reachable from inside the lockdown browser, if any.
    #[serde(default)]
    pub allowed_urls: Vec<String>,
}

impl Default for SebConfig {
    fn default() -> Self {
        Self {
            browser_lock: true,
            quit_password: None,
            allowed_urls: Vec::new(),
        }
    }
}

/// Represents the 'exams' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Exam {
    pub id: i64,

    /// Unique human-readable code (e.g., 'SSC-CGL-2025-T1').
    pub exam_code: String,

    pub title: String,

    /// Whether a candidate may hold only one ACTIVE session at a time.
    pub single_device_login: bool,

    pub duration_minutes: i64,

    pub seb_config: Json<SebConfig>,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for creating a new exam.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateExamRequest {
    #[validate(length(
        min = 3,
        max = 50,
        message = "Exam code length must be between 3 and 50 characters."
    ))]
    pub exam_code: String,

    #[validate(length(min = 1, max = 200))]
    pub title: String,

    /// Defaults to true; high-stakes exams keep this on.
    pub single_device_login: Option<bool>,

    #[validate(range(min = 10, max = 600))]
    pub duration_minutes: Option<i64>,

    pub seb_config: Option<SebConfig>,
}
