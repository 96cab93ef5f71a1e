use crate::config::Config;
use crate::models::question_paper::PaperQuestion;
use axum::extract::FromRef;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub papers: PaperCache,
    pub central: Connectivity,
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for PaperCache {
    fn from_ref(state: &AppState) -> Self {
        state.papers.clone()
    }
}

impl FromRef<AppState> for Connectivity {
    fn from_ref(state: &AppState) -> Self {
        state.central.clone()
    }
}

/// Decrypted question papers, held in memory only. Nothing here is ever
/// written back to disk; a restart locks every paper again.
#[derive(Clone, Default)]
pub struct PaperCache {
    inner: Arc<RwLock<HashMap<i64, Vec<PaperQuestion>>>>,
}

impl PaperCache {
    pub async fn unlock(&self, paper_id: i64, questions: Vec<PaperQuestion>) {
        self.inner.write().await.insert(paper_id, questions);
    }

    pub async fn get(&self, paper_id: i64) -> Option<Vec<PaperQuestion>> {
        self.inner.read().await.get(&paper_id).cloned()
    }

    pub async fn is_unlocked(&self, paper_id: i64) -> bool {
        self.inner.read().await.contains_key(&paper_id)
    }
}

/// Whether the center currently has a route to the main portal. Flipped by
/// the center administrator when the WAN drops; gateway handlers consult it
/// before touching any central table.
#[derive(Clone)]
pub struct Connectivity {
    online: Arc<AtomicBool>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Relaxed);
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}
