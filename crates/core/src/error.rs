use std::fmt;

use crate::types::{DbId, ProjectId};

/// Identifier carried by [`CoreError::NotFound`].
///
/// Users and annotations are keyed by database sequence ids, projects by
/// opaque UUID tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityId {
    Db(DbId),
    Project(ProjectId),
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Db(id) => write!(f, "{id}"),
            EntityId::Project(id) => write!(f, "{id}"),
        }
    }
}

impl From<DbId> for EntityId {
    fn from(id: DbId) -> Self {
        EntityId::Db(id)
    }
}

impl From<ProjectId> for EntityId {
    fn from(id: ProjectId) -> Self {
        EntityId::Project(id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: EntityId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for a [`CoreError::NotFound`] on any id type.
    pub fn not_found(entity: &'static str, id: impl Into<EntityId>) -> Self {
        CoreError::NotFound {
            entity,
            id: id.into(),
        }
    }
}
