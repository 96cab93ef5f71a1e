// src/models/mod.rs

pub mod candidate;
pub mod center_link;
pub mod exam;
pub mod exam_session;
pub mod local_session;
pub mod offline_package;
pub mod question_paper;
pub mod sync_log;
