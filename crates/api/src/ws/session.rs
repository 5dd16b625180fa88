//! One client's real-time session.
//!
//! A [`Session`] exists only while its connection is active: opening it
//! registers the connection (and replays the last snapshot), dropping it
//! deregisters. Every inbound frame is a refresh trigger handled by
//! [`Session::refresh`].

use std::sync::Arc;

use aat_core::annotation::Snapshot;
use aat_core::types::ProjectId;

use crate::ws::registry::{ConnectionRegistry, MembershipGuard};
use crate::ws::store::{AnnotationStore, StoreError};
use crate::ws::topic::{ConnId, PublishReport, WsReceiver};

/// A refresh cycle that published nothing.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

/// An active connection bound to one project's topic.
pub struct Session {
    guard: MembershipGuard,
    store: Arc<dyn AnnotationStore>,
}

impl Session {
    /// Register `conn_id` with the project's topic.
    ///
    /// Returns the session and the outbound queue for the connection's
    /// writer. The queue already holds the last snapshot if one exists.
    pub fn open(
        registry: &ConnectionRegistry,
        store: Arc<dyn AnnotationStore>,
        project_id: ProjectId,
        conn_id: impl Into<ConnId>,
    ) -> (Self, WsReceiver) {
        let (guard, receiver) = registry.register(project_id, conn_id).into_parts();
        (Self { guard, store }, receiver)
    }

    pub fn conn_id(&self) -> &str {
        self.guard.conn_id()
    }

    pub fn project_id(&self) -> ProjectId {
        self.guard.project_id()
    }

    /// Whether the connection is still registered. False once it has been
    /// dropped for a failed delivery.
    pub fn is_registered(&self) -> bool {
        self.guard.is_registered()
    }

    /// Re-read the project's annotations and broadcast them to every member.
    ///
    /// On a store failure nothing is published and the last snapshot stays
    /// as it was; the session remains usable for the next trigger.
    pub async fn refresh(&self) -> Result<PublishReport, RefreshError> {
        let topic = self.guard.topic();
        let _cycle = topic.begin_refresh().await;

        let annotations = self.store.list_for_project(self.project_id()).await?;
        let report = topic.publish(Snapshot::new(annotations))?;
        Ok(report)
    }
}
