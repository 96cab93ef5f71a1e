// src/models/offline_package.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};

use crate::models::candidate::Candidate;
use crate::models::exam::Exam;

/// Build state of an offline package. A package with no sealed papers to
/// carry stays BUILDING until papers exist and it is rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PackageStatus {
    Building,
    Ready,
}

/// Whether results produced under this package have reached the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PackageSyncStatus {
    Pending,
    Synced,
}

/// Represents the 'offline_packages' table in the database.
/// Everything a center needs to run one exam shift with no connectivity:
/// the roster and the still-encrypted papers. Rebuilding an exam's package
/// inserts a new row; downloads always pick the newest READY one.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OfflinePackage {
    pub id: i64,

    /// Unique package code (e.g., 'pkg-3fa2b1c409de').
    pub package_code: String,

    pub exam_id: i64,
    pub shift_id: Option<i64>,

    /// Papers bundled into this package, by id.
    pub paper_ids: Json<Vec<i64>>,

    pub candidate_count: i64,

    pub status: PackageStatus,
    pub sync_status: PackageSyncStatus,

    pub built_at: chrono::DateTime<chrono::Utc>,
    pub last_sync_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for building a package.
#[derive(Debug, Deserialize)]
pub struct BuildPackageRequest {
    pub exam_id: i64,
    pub shift_id: Option<i64>,
}

/// One sealed paper inside a downloaded package. Binary fields travel hex
/// encoded; the passphrase to open them travels out of band.
#[derive(Debug, Serialize)]
pub struct PaperBundle {
    pub paper_id: i64,
    pub paper_code: String,
    pub ciphertext: String,
    pub kdf_salt: String,
    pub nonce: String,
    pub content_hash: String,
}

/// The full download a center receives before exam day.
#[derive(Debug, Serialize)]
pub struct PackageManifest {
    pub package: OfflinePackage,
    pub exam: Exam,
    pub candidates: Vec<Candidate>,
    pub papers: Vec<PaperBundle>,
}
