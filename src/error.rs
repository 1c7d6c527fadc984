use thiserror::Error;

/// The three failure classes callers are expected to distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    StorageFailure,
}

#[derive(Debug, Error)]
pub enum CanvasError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Database error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

impl CanvasError {
    pub fn project_not_found(id: crate::domain::ProjectId) -> Self {
        CanvasError::NotFound {
            entity: "project",
            id: id.0,
        }
    }

    pub fn node_not_found(id: crate::domain::NodeId) -> Self {
        CanvasError::NotFound {
            entity: "node",
            id: id.0,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        CanvasError::InvalidArgument(msg.into())
    }

    /// Collapses the error into the class a caller should react to.
    ///
    /// Configuration problems count as storage failures: the store could not be
    /// reached, and the caller's data was left untouched.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CanvasError::NotFound { .. } => ErrorKind::NotFound,
            CanvasError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            CanvasError::Storage(_)
            | CanvasError::Migration(_)
            | CanvasError::Io(_)
            | CanvasError::Corrupt(_)
            | CanvasError::Config(_) => ErrorKind::StorageFailure,
        }
    }
}

pub type CanvasResult<T> = Result<T, CanvasError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NodeId, ProjectId};

    #[test]
    fn kinds_follow_variants() {
        assert_eq!(
            CanvasError::project_not_found(ProjectId(3)).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(CanvasError::invalid("x").kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            CanvasError::Storage(sqlx::Error::RowNotFound).kind(),
            ErrorKind::StorageFailure
        );
        assert_eq!(
            CanvasError::node_not_found(NodeId(9)).to_string(),
            "node 9 not found"
        );
    }
}
