// src/lib.rs

pub mod config;
pub mod error;
pub mod handlers;
pub mod janitor;
pub mod models;
pub mod packages;
pub mod registry;
pub mod routes;
pub mod sessions;
pub mod state;
pub mod sync;
pub mod utils;
pub mod vault;

// Re-export specific items for convenience if needed
pub use routes::create_router;
