//! Real-time annotation fan-out.
//!
//! Provides the per-project connection registry and broadcast topics, the
//! per-connection session loop, heartbeat pings, and the HTTP upgrade
//! handler used by Axum routes.

mod handler;
mod heartbeat;
pub mod registry;
pub mod session;
pub mod store;
pub mod topic;

pub use handler::project_annotations_ws;
pub use heartbeat::start_heartbeat;
pub use registry::{ConnectionRegistry, Membership, MembershipGuard};
pub use session::{RefreshError, Session};
pub use store::{AnnotationStore, PgAnnotationStore, StoreError};
pub use topic::{MemberHandle, PublishReport, Topic};
