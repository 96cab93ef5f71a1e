// src/models/sync_log.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Outcome of one sync batch. Terminal rows are never edited; a retry
/// appends a fresh log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncLogStatus {
    InProgress,
    Completed,
    Failed,
}

/// Represents the 'sync_logs' table in the database.
/// Append-only audit trail of center-to-portal uploads.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SyncLog {
    pub id: i64,
    pub center_link_id: i64,
    pub exam_id: i64,

    /// What the batch carried. Currently always 'RESPONSES'.
    pub sync_type: String,

    pub status: SyncLogStatus,

    /// Response rows accepted by the portal in this batch.
    pub records_uploaded: i64,

    /// Sessions the portal refused (e.g., the center's usage cap was
    /// already spent). These stay pending locally and retry next batch.
    pub records_failed: i64,

    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for kicking off a sync batch. The link in the operator's token
/// fixes the scope; a mismatched exam_id is rejected outright.
#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub exam_id: Option<i64>,
}
