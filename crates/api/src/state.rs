use std::sync::Arc;

use crate::config::ServerConfig;
use crate::storage::BlobStorage;
use crate::ws::{AnnotationStore, ConnectionRegistry};

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: aat_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Live real-time connections, grouped per project.
    pub registry: Arc<ConnectionRegistry>,
    /// Annotation reads for real-time refresh cycles.
    pub annotation_store: Arc<dyn AnnotationStore>,
    /// Uploaded scene files.
    pub storage: Arc<BlobStorage>,
}
