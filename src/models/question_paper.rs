// src/models/question_paper.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// A single question inside a paper. Papers are encrypted as one JSON
/// document, so this type never maps to a table of its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperQuestion {
    pub id: i64,

    /// 'single' (single choice) or 'multiple' (multiple choice).
    #[serde(rename = "type")]
    pub question_type: String,

    pub content: String,

    pub options: Vec<String>,

    /// The correct answer key. Stripped before anything reaches a candidate.
    pub answer: String,

    pub marks: Option<i64>,
}

/// DTO for sending a question to a candidate (excludes the answer).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    #[serde(rename = "type")]
    pub question_type: String,
    pub content: String,
    pub options: Vec<String>,
    pub marks: Option<i64>,
}

impl From<&PaperQuestion> for PublicQuestion {
    fn from(q: &PaperQuestion) -> Self {
        Self {
            id: q.id,
            question_type: q.question_type.clone(),
            content: q.content.clone(),
            options: q.options.clone(),
            marks: q.marks,
        }
    }
}

/// Represents the 'question_papers' table in the database.
/// Question content exists only as AES-256-GCM ciphertext at rest; the
/// key material never leaves this process and is derived per request.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuestionPaper {
    pub id: i64,
    pub exam_id: i64,

    /// Unique paper code (e.g., 'SSC-CGL-2025-T1-SETA').
    pub paper_code: String,

    #[serde(skip)]
    pub ciphertext: Vec<u8>,

    #[serde(skip)]
    pub kdf_salt: Vec<u8>,

    #[serde(skip)]
    pub nonce: Vec<u8>,

    /// SHA-256 of the plaintext question JSON, hex encoded. Checked after
    /// every decryption.
    pub content_hash: String,

    pub is_active: bool,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for sealing a new paper into the vault.
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePaperRequest {
    pub exam_id: i64,

    #[validate(length(min = 3, max = 50))]
    pub paper_code: String,

    #[validate(length(
        min = 8,
        max = 128,
        message = "Passphrase length must be between 8 and 128 characters."
    ))]
    pub passphrase: String,

    #[validate(custom(function = validate_questions))]
    pub questions: Vec<PaperQuestion>,
}

fn validate_questions(questions: &[PaperQuestion]) -> Result<(), validator::ValidationError> {
    if questions.is_empty() {
        return Err(validator::ValidationError::new("questions_cannot_be_empty"));
    }
    for q in questions {
        if q.content.is_empty() || q.content.len() > 2000 {
            return Err(validator::ValidationError::new("question_content_length"));
        }
        if q.options.is_empty() {
            return Err(validator::ValidationError::new("options_cannot_be_empty"));
        }
        if q.options.iter().any(|opt| opt.len() > 500) {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}

/// DTO for decrypting a paper with its passphrase.
#[derive(Debug, Deserialize, Validate)]
pub struct DecryptPaperRequest {
    #[validate(length(min = 1, max = 128))]
    pub passphrase: String,
}

/// DTO for a center operator unlocking a paper at exam start.
#[derive(Debug, Deserialize, Validate)]
pub struct UnlockPaperRequest {
    pub paper_id: i64,

    #[validate(length(min = 1, max = 128))]
    pub passphrase: String,
}
