// src/handlers/mod.rs

pub mod admin;
pub mod center_admin;
pub mod secure_exam;
pub mod student_exam;
