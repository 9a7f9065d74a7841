use std::sync::Arc;

use cam2_jobs::Supervisor;
use cam2_storage::ResultStore;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: cam2_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Owner of every running submission.
    pub supervisor: Supervisor,
    /// Where finished submissions leave their results.
    pub result_store: Arc<dyn ResultStore>,
}
