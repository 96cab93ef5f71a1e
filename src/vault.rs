// src/vault.rs

//! Question paper vault.
//!
//! Papers rest as AES-256-GCM ciphertext under a key derived from an exam
//! controller passphrase with Argon2id. Neither the passphrase nor the
//! derived key is ever persisted; decryption happens in memory, on
//! explicit request, shortly before the shift starts.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use argon2::Argon2;
use chrono::Utc;
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use crate::error::AppError;
use crate::models::question_paper::{CreatePaperRequest, PaperQuestion, QuestionPaper};

/// Argon2 salt length in bytes.
const KDF_SALT_LEN: usize = 16;

/// AES-256-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Output of sealing a paper, ready to persist. The auth tag rides at the
/// tail of the ciphertext.
pub struct SealedPaper {
    pub ciphertext: Vec<u8>,
    pub kdf_salt: Vec<u8>,
    pub nonce: Vec<u8>,
    pub content_hash: String,
}

fn derive_key(passphrase: &str, salt: &[u8]) -> Result<[u8; 32], AppError> {
    let mut key = [0u8; 32];
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| AppError::InternalServerError(format!("Key derivation failed: {}", e)))?;
    Ok(key)
}

/// Serializes and encrypts a question set. A fresh salt and nonce are
/// drawn on every seal.
pub fn seal_questions(
    questions: &[PaperQuestion],
    passphrase: &str,
) -> Result<SealedPaper, AppError> {
    let plaintext = serde_json::to_vec(questions)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let mut rng = rand::rng();
    let salt: [u8; KDF_SALT_LEN] = rng.random();

    let key = derive_key(passphrase, &salt)?;
    let cipher = Aes256Gcm::new((&key).into());

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_slice())
        .map_err(|e| AppError::InternalServerError(format!("Encryption failed: {}", e)))?;

    let content_hash = hex::encode(Sha256::digest(&plaintext));

    Ok(SealedPaper {
        ciphertext,
        kdf_salt: salt.to_vec(),
        nonce: nonce.to_vec(),
        content_hash,
    })
}

/// Decrypts a sealed paper and verifies the plaintext hash. Every failure
/// mode collapses into DecryptionFailed; callers learn nothing about which
/// check tripped.
pub fn open_paper(paper: &QuestionPaper, passphrase: &str) -> Result<Vec<PaperQuestion>, AppError> {
    let nonce_bytes: [u8; NONCE_LEN] = paper
        .nonce
        .as_slice()
        .try_into()
        .map_err(|_| AppError::DecryptionFailed)?;
    let nonce = Nonce::from(nonce_bytes);

    let key = derive_key(passphrase, &paper.kdf_salt)?;
    let cipher = Aes256Gcm::new((&key).into());

    let plaintext = cipher
        .decrypt(&nonce, paper.ciphertext.as_slice())
        .map_err(|_| AppError::DecryptionFailed)?;

    if hex::encode(Sha256::digest(&plaintext)) != paper.content_hash {
        return Err(AppError::DecryptionFailed);
    }

    serde_json::from_slice(&plaintext).map_err(|_| AppError::DecryptionFailed)
}

/// Seals a paper and stores it. The passphrase is dropped on return.
pub async fn encrypt_paper(
    pool: &SqlitePool,
    req: &CreatePaperRequest,
) -> Result<QuestionPaper, AppError> {
    let exam_exists: Option<i64> = sqlx::query_scalar("SELECT id FROM exams WHERE id = ?")
        .bind(req.exam_id)
        .fetch_optional(pool)
        .await?;
    if exam_exists.is_none() {
        return Err(AppError::NotFound("Exam not found".to_string()));
    }

    let sealed = seal_questions(&req.questions, &req.passphrase)?;

    let paper = sqlx::query_as::<_, QuestionPaper>(
        r#"
        INSERT INTO question_papers
            (exam_id, paper_code, ciphertext, kdf_salt, nonce, content_hash, is_active, created_at)
        VALUES (?, ?, ?, ?, ?, ?, 1, ?)
        RETURNING *
        "#,
    )
    .bind(req.exam_id)
    .bind(&req.paper_code)
    .bind(&sealed.ciphertext)
    .bind(&sealed.kdf_salt)
    .bind(&sealed.nonce)
    .bind(&sealed.content_hash)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if e.as_database_error()
            .is_some_and(|d| d.is_unique_violation())
        {
            AppError::Conflict(format!("Paper code '{}' already exists", req.paper_code))
        } else {
            AppError::InternalServerError(e.to_string())
        }
    })?;

    tracing::info!(
        "Sealed paper {} ({} questions) for exam {}",
        paper.paper_code,
        req.questions.len(),
        paper.exam_id
    );

    Ok(paper)
}

pub async fn load_paper(pool: &SqlitePool, paper_id: i64) -> Result<QuestionPaper, AppError> {
    sqlx::query_as::<_, QuestionPaper>("SELECT * FROM question_papers WHERE id = ?")
        .bind(paper_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Question paper not found".to_string()))
}

/// Loads and decrypts one paper. Failed attempts are logged and surface as
/// DecryptionFailed; there is no retry bookkeeping.
pub async fn decrypt_paper(
    pool: &SqlitePool,
    paper_id: i64,
    passphrase: &str,
) -> Result<Vec<PaperQuestion>, AppError> {
    let paper = load_paper(pool, paper_id).await?;

    open_paper(&paper, passphrase).map_err(|e| {
        if matches!(e, AppError::DecryptionFailed) {
            tracing::warn!("Failed decryption attempt for paper {}", paper.paper_code);
        }
        e
    })
}
