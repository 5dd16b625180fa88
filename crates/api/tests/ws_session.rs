//! Tests for refresh cycles driven through `Session`.
//!
//! A session re-reads the annotation store and publishes the result to the
//! whole project. The store here is in-memory so outages and slow reads can
//! be simulated.

mod common;

use std::sync::Arc;
use std::time::Duration;

use aat_api::ws::{AnnotationStore, ConnectionRegistry, RefreshError, Session, StoreError};
use aat_core::annotation::AnnotationView;
use aat_core::types::{DbId, ProjectId};
use assert_matches::assert_matches;
use async_trait::async_trait;
use common::{decode, view, MemoryStore};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// Test: late joiner then refresh reaches everyone
// ---------------------------------------------------------------------------

#[tokio::test]
async fn late_joiner_gets_replay_then_both_get_refresh() {
    let registry = ConnectionRegistry::new();
    let store = MemoryStore::new();
    let p1 = ProjectId::new_v4();
    let initial = vec![view(1, "a", 0, 0)];

    store.set(p1, initial.clone());
    let (c1, mut c1_rx) = Session::open(&registry, store.clone(), p1, "C1");
    c1.refresh().await.unwrap();
    assert_eq!(decode(c1_rx.try_recv().unwrap()), initial);

    // C2 joins and immediately receives the same snapshot.
    let (_c2, mut c2_rx) = Session::open(&registry, store.clone(), p1, "C2");
    assert_eq!(decode(c2_rx.try_recv().unwrap()), initial);
    assert_matches!(c1_rx.try_recv(), Err(TryRecvError::Empty));

    // The next trigger sees a second annotation.
    let updated = vec![view(1, "a", 0, 0), view(2, "b", 1, 1)];
    store.set(p1, updated.clone());
    let report = c1.refresh().await.unwrap();

    assert_eq!(report.delivered, 2);
    assert_eq!(decode(c1_rx.try_recv().unwrap()), updated);
    assert_eq!(decode(c2_rx.try_recv().unwrap()), updated);
    assert_eq!(
        registry.last_snapshot(p1).unwrap().annotations(),
        updated.as_slice()
    );
}

#[tokio::test]
async fn snapshot_frame_is_a_bare_array_of_views() {
    let registry = ConnectionRegistry::new();
    let store = MemoryStore::new();
    let p = ProjectId::new_v4();
    store.set(p, vec![view(7, "door", 3, 4)]);

    let (session, mut rx) = Session::open(&registry, store, p, "c");
    session.refresh().await.unwrap();

    let frame = match rx.try_recv().unwrap() {
        axum::extract::ws::Message::Text(text) => text.as_str().to_owned(),
        other => panic!("expected text frame, got {other:?}"),
    };
    let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(
        value,
        serde_json::json!([{ "id": 7, "note": "door", "coordinates": { "x": 3, "y": 4 } }])
    );
}

#[tokio::test]
async fn refresh_with_no_annotations_publishes_empty_array() {
    let registry = ConnectionRegistry::new();
    let p = ProjectId::new_v4();

    let (session, mut rx) = Session::open(&registry, MemoryStore::new(), p, "c");
    session.refresh().await.unwrap();

    assert!(decode(rx.try_recv().unwrap()).is_empty());
    assert_eq!(registry.last_snapshot(p).map(|s| s.is_empty()), Some(true));
}

// ---------------------------------------------------------------------------
// Test: store outage publishes nothing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn store_failure_publishes_nothing_and_keeps_session() {
    let registry = ConnectionRegistry::new();
    let store = MemoryStore::new();
    let p1 = ProjectId::new_v4();
    store.set(p1, vec![view(1, "a", 0, 0)]);

    let (c1, mut c1_rx) = Session::open(&registry, store.clone(), p1, "C1");
    c1.refresh().await.unwrap();
    c1_rx.try_recv().unwrap();
    let before = registry.last_snapshot(p1);

    store.set_failing(true);
    store.set(p1, vec![view(1, "a", 0, 0), view(2, "b", 1, 1)]);
    let err = c1.refresh().await.unwrap_err();

    assert_matches!(err, RefreshError::Store(StoreError::Database(_)));
    assert_eq!(registry.last_snapshot(p1), before);
    assert_matches!(c1_rx.try_recv(), Err(TryRecvError::Empty));
    assert!(c1.is_registered());

    // Recovery: the next trigger goes through.
    store.set_failing(false);
    c1.refresh().await.unwrap();
    assert_eq!(decode(c1_rx.try_recv().unwrap()).len(), 2);
}

#[tokio::test]
async fn store_failure_before_any_publish_leaves_no_snapshot() {
    let registry = ConnectionRegistry::new();
    let store = MemoryStore::new();
    store.set_failing(true);
    let p = ProjectId::new_v4();

    let (session, mut rx) = Session::open(&registry, store, p, "c");

    assert!(session.refresh().await.is_err());
    assert!(registry.last_snapshot(p).is_none());
    assert_matches!(rx.try_recv(), Err(TryRecvError::Empty));
}

// ---------------------------------------------------------------------------
// Test: session lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dropping_session_deregisters() {
    let registry = ConnectionRegistry::new();
    let p = ProjectId::new_v4();

    let (session, _rx) = Session::open(&registry, MemoryStore::new(), p, "c");
    assert_eq!(session.conn_id(), "c");
    assert_eq!(session.project_id(), p);
    assert_eq!(registry.member_count(p), 1);

    drop(session);
    assert_eq!(registry.member_count(p), 0);
}

#[tokio::test]
async fn session_dropped_for_backpressure_reports_unregistered() {
    let registry = ConnectionRegistry::with_outbound_buffer(1);
    let store = MemoryStore::new();
    let p = ProjectId::new_v4();

    let (slow, _slow_rx) = Session::open(&registry, store.clone(), p, "slow");
    let (fast, mut fast_rx) = Session::open(&registry, store.clone(), p, "fast");

    fast.refresh().await.unwrap();
    fast_rx.try_recv().unwrap();
    let report = fast.refresh().await.unwrap();

    assert_eq!(report.dropped, 1);
    assert!(!slow.is_registered());
    assert!(fast.is_registered());
}

// ---------------------------------------------------------------------------
// Test: a slow refresh on one project does not hold up another
// ---------------------------------------------------------------------------

/// Store whose reads for one project wait until released.
struct GatedStore {
    gated: ProjectId,
    release: Notify,
}

#[async_trait]
impl AnnotationStore for GatedStore {
    async fn list_for_project(
        &self,
        project_id: ProjectId,
    ) -> Result<Vec<AnnotationView>, StoreError> {
        if project_id == self.gated {
            self.release.notified().await;
        }
        Ok(vec![view(1, "a", 0, 0)])
    }

    async fn can_access(&self, _project_id: ProjectId, _user_id: DbId) -> Result<bool, StoreError> {
        Ok(true)
    }
}

#[tokio::test]
async fn slow_refresh_on_one_project_does_not_block_another() {
    let registry = Arc::new(ConnectionRegistry::new());
    let (a, b) = (ProjectId::new_v4(), ProjectId::new_v4());
    let store = Arc::new(GatedStore {
        gated: a,
        release: Notify::new(),
    });

    let (on_a, mut a_rx) = Session::open(&registry, store.clone(), a, "on-a");
    let (on_b, mut b_rx) = Session::open(&registry, store.clone(), b, "on-b");

    let pending_a = tokio::spawn(async move {
        let report = on_a.refresh().await;
        (on_a, report)
    });

    tokio::time::timeout(Duration::from_secs(2), on_b.refresh())
        .await
        .expect("refresh on B must not wait on A")
        .unwrap();
    assert!(b_rx.try_recv().is_ok());
    assert_matches!(a_rx.try_recv(), Err(TryRecvError::Empty));
    assert!(registry.last_snapshot(a).is_none());

    store.release.notify_one();
    let (_on_a, report) = pending_a.await.unwrap();
    assert_eq!(report.unwrap().delivered, 1);
    assert!(a_rx.try_recv().is_ok());
    assert_matches!(b_rx.try_recv(), Err(TryRecvError::Empty));
}
