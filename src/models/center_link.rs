// src/models/center_link.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Lifecycle of a center link. SUSPENDED blocks new sessions but leaves
/// running ones untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkStatus {
    Active,
    Suspended,
}

/// Represents the 'center_links' table in the database.
/// A center link grants one examination center scoped access to one exam.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CenterLink {
    pub id: i64,
    pub exam_id: i64,

    /// Short code operators quote over the phone (e.g., 'DL-091').
    pub center_code: String,

    pub center_name: String,

    /// Bearer credential for the center. Returned once at issue/rotate
    /// time, never serialized afterwards.
    #[serde(skip)]
    pub access_token: String,

    pub status: LinkStatus,

    /// Maximum sessions this center may start. NULL means unlimited.
    pub max_usage: Option<i64>,

    pub usage_count: i64,

    /// After this instant the token stops validating. NULL means no expiry.
    pub token_expires_at: Option<chrono::DateTime<chrono::Utc>>,

    pub seat_count: i64,
    pub ip_range: Option<String>,
    pub reporting_time: Option<chrono::DateTime<chrono::Utc>>,
    pub gate_close_time: Option<chrono::DateTime<chrono::Utc>>,

    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl CenterLink {
    pub fn is_expired(&self) -> bool {
        match self.token_expires_at {
            Some(expiry) => expiry < chrono::Utc::now(),
            None => false,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        match self.max_usage {
            Some(max) => self.usage_count >= max,
            None => false,
        }
    }
}

/// DTO for issuing a new center link.
#[derive(Debug, Deserialize, Validate)]
pub struct IssueLinkRequest {
    pub exam_id: i64,

    #[validate(length(min = 2, max = 30))]
    pub center_code: String,

    #[validate(length(min = 1, max = 200))]
    pub center_name: String,

    #[validate(range(min = 1))]
    pub max_usage: Option<i64>,

    pub token_expires_at: Option<chrono::DateTime<chrono::Utc>>,

    #[validate(range(min = 0, max = 10000))]
    pub seat_count: Option<i64>,

    #[validate(length(max = 100))]
    pub ip_range: Option<String>,

    pub reporting_time: Option<chrono::DateTime<chrono::Utc>>,
    pub gate_close_time: Option<chrono::DateTime<chrono::Utc>>,

    /// Login for the center administrator bundled with the link.
    #[validate(length(min = 3, max = 50))]
    pub operator_username: String,

    #[validate(length(min = 8, max = 128))]
    pub operator_password: String,
}

/// DTO for suspending or reinstating a link.
#[derive(Debug, Deserialize)]
pub struct UpdateLinkStatusRequest {
    pub status: LinkStatus,
}

/// Represents the 'center_operators' table in the database.
/// The human running the lab, bound to exactly one center link.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CenterOperator {
    pub id: i64,
    pub center_link_id: i64,
    pub username: String,

    #[serde(skip)]
    pub password_hash: String,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for a center operator logging in to the gateway.
#[derive(Debug, Deserialize, Validate)]
pub struct OperatorLoginRequest {
    #[validate(length(min = 2, max = 30))]
    pub center_code: String,

    #[validate(length(min = 3, max = 50))]
    pub username: String,

    #[validate(length(min = 8, max = 128))]
    pub password: String,
}
