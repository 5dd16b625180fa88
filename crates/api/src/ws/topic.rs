//! Per-project broadcast topic.
//!
//! A [`Topic`] owns the member connections of one project plus the last
//! snapshot published to them. Every operation on a topic is local to it:
//! two projects never contend on the same lock.
//!
//! Delivery never blocks on a peer. Each member has a bounded outbound
//! queue and is fed with `try_send`; a member whose queue is closed or full
//! is dropped from the topic after the delivery loop, and delivery carries on
//! with the rest.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use aat_core::annotation::Snapshot;
use aat_core::types::{ProjectId, Timestamp};
use axum::body::Bytes;
use axum::extract::ws::Message;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Opaque per-connection identifier.
pub type ConnId = String;

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::Sender<Message>;

/// Channel receiver half drained by the connection's writer task.
pub type WsReceiver = mpsc::Receiver<Message>;

/// Why a message could not be queued for a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The member's outbound queue is at capacity (slow or stalled client).
    Full,
    /// The member's writer has gone away.
    Closed,
}

/// A registered connection, as seen by the delivery loop.
#[derive(Debug, Clone)]
pub struct MemberHandle {
    pub conn_id: ConnId,
    /// When this connection joined the topic. Logged when it is dropped.
    pub connected_at: Timestamp,
    /// Distinguishes successive registrations under the same `conn_id`.
    token: u64,
    sender: WsSender,
}

impl MemberHandle {
    fn try_deliver(&self, message: Message) -> Result<(), DeliveryFailure> {
        self.sender.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryFailure::Full,
            TrySendError::Closed(_) => DeliveryFailure::Closed,
        })
    }
}

/// Outcome of one delivery round.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    /// Members the message was queued for.
    pub delivered: usize,
    /// Members that failed delivery and were deregistered.
    pub dropped: usize,
}

/// The last published snapshot with its encoded frame, so joiners can be
/// replayed without re-encoding.
struct LastPublished {
    snapshot: Snapshot,
    frame: Message,
}

#[derive(Default)]
struct TopicState {
    members: HashMap<ConnId, MemberHandle>,
    last: Option<LastPublished>,
    /// Set once the registry has unlinked this topic. A retired topic takes
    /// no new snapshot.
    retired: bool,
}

/// Broadcast channel for one project's annotation stream.
pub struct Topic {
    project_id: ProjectId,
    outbound_buffer: usize,
    next_token: AtomicU64,
    /// Membership and last snapshot. Held only for short, non-blocking
    /// critical sections.
    state: Mutex<TopicState>,
    /// Serializes delivery rounds so every member observes publishes in
    /// the order they were issued.
    delivery: Mutex<()>,
    /// Serializes store read + publish cycles so a slower, older read can
    /// never overwrite a newer snapshot.
    refresh: tokio::sync::Mutex<()>,
}

impl Topic {
    pub(crate) fn new(project_id: ProjectId, outbound_buffer: usize) -> Self {
        Self {
            project_id,
            // `mpsc::channel` panics on a zero capacity.
            outbound_buffer: outbound_buffer.max(1),
            next_token: AtomicU64::new(0),
            state: Mutex::new(TopicState::default()),
            delivery: Mutex::new(()),
            refresh: tokio::sync::Mutex::new(()),
        }
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    /// Add a connection and replay the last snapshot to it alone.
    ///
    /// Insertion and replay happen in one critical section with respect to
    /// [`publish`](Self::publish), so a joiner racing a publish receives the
    /// new snapshot exactly once: either as replay or as broadcast.
    /// Re-adding an existing `conn_id` replaces its queue.
    pub(crate) fn add(&self, conn_id: ConnId) -> (u64, WsReceiver) {
        let (tx, rx) = mpsc::channel(self.outbound_buffer);
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let handle = MemberHandle {
            conn_id: conn_id.clone(),
            connected_at: chrono::Utc::now(),
            token,
            sender: tx,
        };

        let mut state = self.state.lock();
        if let Some(last) = &state.last {
            // A fresh queue always has room for one frame.
            let _ = handle.try_deliver(last.frame.clone());
            tracing::debug!(
                project_id = %self.project_id,
                conn_id = %conn_id,
                annotations = last.snapshot.len(),
                "Replayed last snapshot to new connection"
            );
        }
        if state.members.insert(conn_id, handle).is_some() {
            tracing::debug!(project_id = %self.project_id, "Replaced existing registration");
        }
        (token, rx)
    }

    /// Remove a connection. Returns false if it was not a member.
    pub(crate) fn remove(&self, conn_id: &str) -> bool {
        self.state.lock().members.remove(conn_id).is_some()
    }

    /// Remove a connection only if it is still the registration identified
    /// by `token`.
    pub(crate) fn remove_registration(&self, conn_id: &str, token: u64) -> bool {
        let mut state = self.state.lock();
        match state.members.get(conn_id) {
            Some(member) if member.token == token => {
                state.members.remove(conn_id);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn is_registered(&self, conn_id: &str, token: u64) -> bool {
        self.state
            .lock()
            .members
            .get(conn_id)
            .is_some_and(|m| m.token == token)
    }

    /// Point-in-time copy of the member set.
    pub fn members(&self) -> Vec<MemberHandle> {
        self.state.lock().members.values().cloned().collect()
    }

    pub fn member_count(&self) -> usize {
        self.state.lock().members.len()
    }

    /// Mark the topic retired if it has no members and nothing to replay.
    ///
    /// Called by the registry with the topic map write-locked, so no
    /// registration can reach this topic afterwards.
    pub(crate) fn retire_if_idle(&self) -> bool {
        let mut state = self.state.lock();
        if state.members.is_empty() && state.last.is_none() {
            state.retired = true;
        }
        state.retired
    }

    /// Whether the topic has no members and no snapshot to replay.
    pub(crate) fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.members.is_empty() && state.last.is_none()
    }

    /// The most recently published snapshot, if any.
    pub fn last_snapshot(&self) -> Option<Snapshot> {
        self.state
            .lock()
            .last
            .as_ref()
            .map(|last| last.snapshot.clone())
    }

    /// Replace the last snapshot and send it to every current member.
    ///
    /// Encoding happens before anything is touched: if it fails, neither the
    /// last snapshot nor any member is affected.
    pub fn publish(&self, snapshot: Snapshot) -> Result<PublishReport, serde_json::Error> {
        let frame = Message::Text(snapshot.to_json()?.into());
        let annotations = snapshot.len();

        let _round = self.delivery.lock();
        let members: Vec<MemberHandle> = {
            let mut state = self.state.lock();
            if state.retired {
                tracing::debug!(project_id = %self.project_id, "Skipped publish to retired topic");
                return Ok(PublishReport::default());
            }
            state.last = Some(LastPublished {
                snapshot,
                frame: frame.clone(),
            });
            state.members.values().cloned().collect()
        };

        let report = self.deliver(&members, frame);
        tracing::debug!(
            project_id = %self.project_id,
            annotations,
            delivered = report.delivered,
            dropped = report.dropped,
            "Published annotation snapshot"
        );
        Ok(report)
    }

    /// Send a Ping frame to every member.
    pub(crate) fn ping(&self) -> PublishReport {
        let _round = self.delivery.lock();
        let members = self.members();
        self.deliver(&members, Message::Ping(Bytes::new()))
    }

    /// Queue a Close frame for every member and clear the member set.
    ///
    /// Dropping the senders ends each writer task once it has flushed the
    /// Close frame. Returns how many members were closed.
    pub(crate) fn close_all(&self) -> usize {
        let mut state = self.state.lock();
        for member in state.members.values() {
            let _ = member.try_deliver(Message::Close(None));
        }
        let count = state.members.len();
        state.members.clear();
        count
    }

    /// Hold the refresh lock for one read-then-publish cycle.
    pub(crate) async fn begin_refresh(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.refresh.lock().await
    }

    /// Queue `message` for each member independently, then drop the members
    /// that failed.
    fn deliver(&self, members: &[MemberHandle], message: Message) -> PublishReport {
        let mut report = PublishReport::default();
        let mut failed = Vec::new();

        for member in members {
            match member.try_deliver(message.clone()) {
                Ok(()) => report.delivered += 1,
                Err(failure) => {
                    tracing::debug!(
                        project_id = %self.project_id,
                        conn_id = %member.conn_id,
                        connected_at = %member.connected_at,
                        ?failure,
                        "Delivery failed, dropping connection"
                    );
                    failed.push(member);
                }
            }
        }

        if !failed.is_empty() {
            let mut state = self.state.lock();
            for member in failed {
                let still_same = state
                    .members
                    .get(&member.conn_id)
                    .is_some_and(|current| current.token == member.token);
                if still_same {
                    state.members.remove(&member.conn_id);
                }
                report.dropped += 1;
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use aat_core::annotation::AnnotationView;
    use serde_json::json;

    use super::*;

    fn snapshot(ids: &[i64]) -> Snapshot {
        ids.iter()
            .map(|&id| AnnotationView {
                id,
                note: format!("note-{id}"),
                coordinates: json!({ "x": id }),
            })
            .collect()
    }

    fn text(msg: Message) -> String {
        match msg {
            Message::Text(t) => t.as_str().to_owned(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn zero_buffer_is_clamped() {
        let topic = Topic::new(ProjectId::new_v4(), 0);
        let (_token, mut rx) = topic.add("c".into());
        topic.publish(snapshot(&[1])).unwrap();
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn full_queue_drops_only_that_member() {
        let topic = Topic::new(ProjectId::new_v4(), 1);
        let (_t1, mut slow) = topic.add("slow".into());
        let (_t2, mut fast) = topic.add("fast".into());

        let first = topic.publish(snapshot(&[1])).unwrap();
        assert_eq!(first, PublishReport { delivered: 2, dropped: 0 });

        // Only `fast` drains its queue.
        text(fast.try_recv().unwrap());

        let second = topic.publish(snapshot(&[1, 2])).unwrap();
        assert_eq!(second, PublishReport { delivered: 1, dropped: 1 });
        assert_eq!(topic.member_count(), 1);

        // `slow` still has the first frame, then sees its queue closed.
        text(slow.try_recv().unwrap());
        assert!(slow.try_recv().is_err());
        assert!(text(fast.try_recv().unwrap()).contains("note-2"));
    }

    #[test]
    fn stale_failure_does_not_evict_newer_registration() {
        let topic = Topic::new(ProjectId::new_v4(), 4);
        let (old_token, _rx_old) = topic.add("c".into());
        let (new_token, _rx_new) = topic.add("c".into());

        assert!(!topic.remove_registration("c", old_token));
        assert!(topic.is_registered("c", new_token));
        assert!(topic.remove_registration("c", new_token));
        assert_eq!(topic.member_count(), 0);
    }

    #[test]
    fn close_all_sends_close_and_clears() {
        let topic = Topic::new(ProjectId::new_v4(), 4);
        let (_t, mut rx) = topic.add("c".into());

        assert_eq!(topic.close_all(), 1);
        assert_eq!(topic.member_count(), 0);
        assert!(matches!(rx.try_recv(), Ok(Message::Close(None))));
    }

    #[test]
    fn retire_only_when_idle() {
        let topic = Topic::new(ProjectId::new_v4(), 4);
        let (token, _rx) = topic.add("c".into());
        assert!(!topic.retire_if_idle());

        topic.remove_registration("c", token);
        assert!(topic.is_idle());
        assert!(topic.retire_if_idle());
    }

    #[test]
    fn published_topic_is_never_idle() {
        let topic = Topic::new(ProjectId::new_v4(), 4);
        topic.publish(snapshot(&[1])).unwrap();
        assert!(!topic.is_idle());
        assert!(!topic.retire_if_idle());
    }

    #[test]
    fn retired_topic_drops_publishes() {
        let topic = Topic::new(ProjectId::new_v4(), 4);
        assert!(topic.retire_if_idle());

        let report = topic.publish(snapshot(&[1])).unwrap();
        assert_eq!(report, PublishReport::default());
        assert!(topic.last_snapshot().is_none());
    }
}
