//! Connection registry: which live connections belong to which project.
//!
//! The registry maps each project id to its [`Topic`]. The map lock is only
//! taken to find, create or unlink a topic; all delivery work happens under
//! the topic's own lock, so unrelated projects never serialize behind each
//! other.
//!
//! A topic is created on first use and unlinked when its last registration
//! goes away, unless it holds a snapshot to replay. Lock order is always the
//! map lock before a topic's state lock.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use aat_core::annotation::Snapshot;
use aat_core::types::ProjectId;
use axum::extract::ws::Message;
use parking_lot::RwLock;
use tokio::sync::mpsc::error::TryRecvError;

use crate::ws::topic::{ConnId, MemberHandle, PublishReport, Topic, WsReceiver};

/// Default capacity of each connection's outbound queue.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 32;

type TopicMap = RwLock<HashMap<ProjectId, Arc<Topic>>>;

/// Tracks every open real-time connection, grouped per project.
///
/// Thread-safe; designed to be wrapped in `Arc` and shared across the
/// application.
pub struct ConnectionRegistry {
    topics: Arc<TopicMap>,
    outbound_buffer: usize,
}

impl ConnectionRegistry {
    /// Create an empty registry with [`DEFAULT_OUTBOUND_BUFFER`].
    pub fn new() -> Self {
        Self::with_outbound_buffer(DEFAULT_OUTBOUND_BUFFER)
    }

    /// Create an empty registry whose connections queue at most
    /// `outbound_buffer` frames before being treated as stalled.
    pub fn with_outbound_buffer(outbound_buffer: usize) -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
            outbound_buffer,
        }
    }

    /// Look up a project's topic without creating it.
    pub fn topic(&self, project_id: ProjectId) -> Option<Arc<Topic>> {
        self.topics.read().get(&project_id).cloned()
    }

    fn new_topic(&self, project_id: ProjectId) -> Arc<Topic> {
        tracing::debug!(project_id = %project_id, "Created topic");
        Arc::new(Topic::new(project_id, self.outbound_buffer))
    }

    /// Register a connection with a project's topic, creating the topic if
    /// needed.
    ///
    /// If the project already has a published snapshot, it is queued for
    /// this connection only. The returned [`Membership`] owns the outbound
    /// queue and deregisters the connection when dropped.
    pub fn register(&self, project_id: ProjectId, conn_id: impl Into<ConnId>) -> Membership {
        let conn_id = conn_id.into();

        // The member is added while the map lock is held, so the topic
        // cannot be unlinked between lookup and insertion.
        let (topic, token, receiver) = {
            let topics = self.topics.read();
            let existing = topics.get(&project_id).cloned();
            match existing {
                Some(topic) => {
                    let (token, receiver) = topic.add(conn_id.clone());
                    (topic, token, receiver)
                }
                None => {
                    drop(topics);
                    let mut topics = self.topics.write();
                    let topic = Arc::clone(
                        topics
                            .entry(project_id)
                            .or_insert_with(|| self.new_topic(project_id)),
                    );
                    let (token, receiver) = topic.add(conn_id.clone());
                    (topic, token, receiver)
                }
            }
        };

        Membership {
            guard: MembershipGuard {
                topic,
                topics: Arc::downgrade(&self.topics),
                conn_id,
                token,
            },
            receiver,
        }
    }

    /// Remove a connection from a project's topic.
    ///
    /// Safe to call redundantly: an unknown project or connection is a no-op.
    /// Returns whether anything was removed.
    pub fn deregister(&self, project_id: ProjectId, conn_id: &str) -> bool {
        let Some(topic) = self.topic(project_id) else {
            return false;
        };
        let removed = topic.remove(conn_id);
        unlink_if_idle(&self.topics, &topic);
        removed
    }

    /// Point-in-time copy of a project's members.
    pub fn snapshot_members(&self, project_id: ProjectId) -> Vec<MemberHandle> {
        self.topic(project_id)
            .map(|topic| topic.members())
            .unwrap_or_default()
    }

    /// The most recently published snapshot for a project since startup.
    pub fn last_snapshot(&self, project_id: ProjectId) -> Option<Snapshot> {
        self.topic(project_id).and_then(|topic| topic.last_snapshot())
    }

    /// Publish a snapshot to a project's topic, creating the topic if needed.
    pub fn publish(
        &self,
        project_id: ProjectId,
        snapshot: Snapshot,
    ) -> Result<PublishReport, serde_json::Error> {
        // Held across the publish so the topic stays linked until its last
        // snapshot is set.
        let topics = self.topics.read();
        if let Some(topic) = topics.get(&project_id) {
            return topic.publish(snapshot);
        }
        drop(topics);

        let mut topics = self.topics.write();
        topics
            .entry(project_id)
            .or_insert_with(|| self.new_topic(project_id))
            .publish(snapshot)
    }

    /// Total number of registered connections across all projects.
    pub fn connection_count(&self) -> usize {
        self.all_topics().iter().map(|t| t.member_count()).sum()
    }

    /// Number of connections registered for one project.
    pub fn member_count(&self, project_id: ProjectId) -> usize {
        self.topic(project_id)
            .map(|topic| topic.member_count())
            .unwrap_or(0)
    }

    /// Number of live topics.
    pub fn topic_count(&self) -> usize {
        self.topics.read().len()
    }

    /// Send a Ping frame to every connection.
    ///
    /// Connections that cannot take the frame are dropped, exactly as in a
    /// publish.
    pub fn ping_all(&self) -> PublishReport {
        let mut total = PublishReport::default();
        for topic in self.all_topics() {
            let report = topic.ping();
            total.delivered += report.delivered;
            total.dropped += report.dropped;
        }
        total
    }

    /// Send a Close frame to every connection, then clear all memberships.
    ///
    /// Used during graceful shutdown. Last snapshots are kept.
    pub fn shutdown_all(&self) -> usize {
        let count = self.all_topics().iter().map(|t| t.close_all()).sum();
        tracing::info!(count, "Closed all WebSocket connections");
        count
    }

    fn all_topics(&self) -> Vec<Arc<Topic>> {
        self.topics.read().values().cloned().collect()
    }
}

/// Unlink `topic` from the map if it is still the linked topic for its
/// project and has nothing left to serve.
fn unlink_if_idle(topics: &TopicMap, topic: &Arc<Topic>) {
    if !topic.is_idle() {
        return;
    }
    let project_id = topic.project_id();
    let mut topics = topics.write();
    let linked = topics
        .get(&project_id)
        .is_some_and(|current| Arc::ptr_eq(current, topic));
    if linked && topic.retire_if_idle() {
        topics.remove(&project_id);
        tracing::debug!(project_id = %project_id, "Removed idle topic");
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A live registration: the outbound queue plus its cleanup guard.
pub struct Membership {
    guard: MembershipGuard,
    receiver: WsReceiver,
}

impl Membership {
    pub fn guard(&self) -> &MembershipGuard {
        &self.guard
    }

    /// Wait for the next outbound frame. `None` once the connection has
    /// been dropped from the topic.
    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Result<Message, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Split into the guard (kept by the session) and the receiver (moved
    /// into the writer task).
    pub fn into_parts(self) -> (MembershipGuard, WsReceiver) {
        (self.guard, self.receiver)
    }
}

/// RAII handle that deregisters its connection on drop.
///
/// Removal is keyed on this registration, so a guard outliving a newer
/// registration under the same connection id leaves the newer one alone.
pub struct MembershipGuard {
    topic: Arc<Topic>,
    topics: Weak<TopicMap>,
    conn_id: ConnId,
    token: u64,
}

impl MembershipGuard {
    pub fn conn_id(&self) -> &str {
        &self.conn_id
    }

    pub fn project_id(&self) -> ProjectId {
        self.topic.project_id()
    }

    pub fn topic(&self) -> &Arc<Topic> {
        &self.topic
    }

    /// Whether this registration is still a member of its topic.
    pub fn is_registered(&self) -> bool {
        self.topic.is_registered(&self.conn_id, self.token)
    }
}

impl Drop for MembershipGuard {
    fn drop(&mut self) {
        if self.topic.remove_registration(&self.conn_id, self.token) {
            tracing::debug!(
                project_id = %self.topic.project_id(),
                conn_id = %self.conn_id,
                "Deregistered connection"
            );
        }
        if let Some(topics) = self.topics.upgrade() {
            unlink_if_idle(&topics, &self.topic);
        }
    }
}
