// src/packages.rs

//! Offline package builder and delivery.
//!
//! A package bundles one exam shift's roster with the still-encrypted
//! papers. Centers download it while the WAN is good and run the shift
//! from local storage. Rebuilds insert a new row; delivery always picks
//! the newest READY one, so a superseded package simply stops being
//! served.

use chrono::Utc;
use sqlx::{SqlitePool, types::Json};

use crate::error::AppError;
use crate::models::candidate::Candidate;
use crate::models::center_link::CenterLink;
use crate::models::exam::Exam;
use crate::models::offline_package::{
    OfflinePackage, PackageManifest, PackageStatus, PackageSyncStatus, PaperBundle,
};
use crate::models::question_paper::QuestionPaper;
use crate::utils::token;

/// Snapshots the roster and active papers into a new package row. With no
/// sealed papers to carry the row stays BUILDING and is never served.
pub async fn build_package(
    pool: &SqlitePool,
    exam_id: i64,
    shift_id: Option<i64>,
) -> Result<OfflinePackage, AppError> {
    let mut tx = pool.begin().await?;

    let exam_exists: Option<i64> = sqlx::query_scalar("SELECT id FROM exams WHERE id = ?")
        .bind(exam_id)
        .fetch_optional(&mut *tx)
        .await?;
    if exam_exists.is_none() {
        return Err(AppError::NotFound("Exam not found".to_string()));
    }

    let candidate_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM candidates WHERE exam_id = ? AND (? IS NULL OR shift_id = ?)",
    )
    .bind(exam_id)
    .bind(shift_id)
    .bind(shift_id)
    .fetch_one(&mut *tx)
    .await?;

    let paper_ids: Vec<i64> = sqlx::query_scalar(
        "SELECT id FROM question_papers WHERE exam_id = ? AND is_active = 1 ORDER BY id",
    )
    .bind(exam_id)
    .fetch_all(&mut *tx)
    .await?;

    let status = if paper_ids.is_empty() {
        PackageStatus::Building
    } else {
        PackageStatus::Ready
    };
    let package_code = token::generate_package_code();
    let paper_count = paper_ids.len();

    let package = sqlx::query_as::<_, OfflinePackage>(
        r#"
        INSERT INTO offline_packages
            (package_code, exam_id, shift_id, paper_ids, candidate_count,
             status, sync_status, built_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&package_code)
    .bind(exam_id)
    .bind(shift_id)
    .bind(Json(paper_ids))
    .bind(candidate_count)
    .bind(status)
    .bind(PackageSyncStatus::Pending)
    .bind(Utc::now())
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        "Built package {} for exam {}: {} candidates, {} papers, {:?}",
        package.package_code,
        exam_id,
        candidate_count,
        paper_count,
        package.status
    );

    Ok(package)
}

/// The package a center should be running right now: newest READY row for
/// the exam, preferring an exact shift match over a shift-agnostic one.
pub async fn current_package(
    pool: &SqlitePool,
    exam_id: i64,
    shift_id: Option<i64>,
) -> Result<OfflinePackage, AppError> {
    sqlx::query_as::<_, OfflinePackage>(
        r#"
        SELECT * FROM offline_packages
        WHERE exam_id = ? AND status = ? AND (shift_id IS ? OR shift_id IS NULL)
        ORDER BY (shift_id IS NULL) ASC, id DESC
        LIMIT 1
        "#,
    )
    .bind(exam_id)
    .bind(PackageStatus::Ready)
    .bind(shift_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::PackageNotReady("No package is ready for this exam".to_string()))
}

/// Assembles the full download for one center: package metadata, roster
/// and sealed papers (hex encoded, passphrases travel out of band).
pub async fn manifest(
    pool: &SqlitePool,
    link: &CenterLink,
    shift_id: Option<i64>,
) -> Result<PackageManifest, AppError> {
    let package = current_package(pool, link.exam_id, shift_id).await?;

    let exam = sqlx::query_as::<_, Exam>("SELECT * FROM exams WHERE id = ?")
        .bind(link.exam_id)
        .fetch_one(pool)
        .await?;

    let candidates = match package.shift_id {
        Some(shift) => {
            sqlx::query_as::<_, Candidate>(
                "SELECT * FROM candidates WHERE exam_id = ? AND shift_id = ? ORDER BY roll_number",
            )
            .bind(link.exam_id)
            .bind(shift)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, Candidate>(
                "SELECT * FROM candidates WHERE exam_id = ? ORDER BY roll_number",
            )
            .bind(link.exam_id)
            .fetch_all(pool)
            .await?
        }
    };

    let mut papers = Vec::with_capacity(package.paper_ids.len());
    for paper_id in package.paper_ids.iter().copied() {
        let paper =
            sqlx::query_as::<_, QuestionPaper>("SELECT * FROM question_papers WHERE id = ?")
                .bind(paper_id)
                .fetch_optional(pool)
                .await?;
        if let Some(p) = paper {
            papers.push(PaperBundle {
                paper_id: p.id,
                paper_code: p.paper_code,
                ciphertext: hex::encode(&p.ciphertext),
                kdf_salt: hex::encode(&p.kdf_salt),
                nonce: hex::encode(&p.nonce),
                content_hash: p.content_hash,
            });
        }
    }

    tracing::info!(
        "Package {} downloaded by center {}",
        package.package_code,
        link.center_code
    );

    Ok(PackageManifest {
        package,
        exam,
        candidates,
        papers,
    })
}

/// Stamps every READY package of the exam as synced. Called after a sync
/// batch lands with nothing left behind.
pub async fn mark_synced(pool: &SqlitePool, exam_id: i64) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE offline_packages SET sync_status = ?, last_sync_at = ? WHERE exam_id = ? AND status = ?",
    )
    .bind(PackageSyncStatus::Synced)
    .bind(Utc::now())
    .bind(exam_id)
    .bind(PackageStatus::Ready)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn list_packages(
    pool: &SqlitePool,
    exam_id: Option<i64>,
) -> Result<Vec<OfflinePackage>, AppError> {
    let packages = match exam_id {
        Some(id) => {
            sqlx::query_as::<_, OfflinePackage>(
                "SELECT * FROM offline_packages WHERE exam_id = ? ORDER BY id DESC",
            )
            .bind(id)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, OfflinePackage>("SELECT * FROM offline_packages ORDER BY id DESC")
                .fetch_all(pool)
                .await?
        }
    };

    Ok(packages)
}
