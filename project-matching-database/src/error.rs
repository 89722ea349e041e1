use diesel::result::DatabaseErrorKind;
use diesel_async::pooled_connection::deadpool;
use thiserror::Error;

#[allow(clippy::module_name_repetitions)]
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to create database pool {0}")]
    PoolBuild(#[from] deadpool::BuildError),
    #[error("Database pool failed {0}")]
    Pool(#[from] deadpool::PoolError),
    #[error("Database query failed {0}")]
    Database(#[from] diesel::result::Error),
    #[error("Stored enumeration snapshot is unreadable {0}")]
    Snapshot(#[from] serde_json::Error),
    #[error("Attempt {0} has no enumeration snapshot")]
    MissingSnapshot(i32),
    #[error("Unknown outcome {0:?} stored on attempt")]
    UnknownOutcome(String),
    #[error("Unknown role {0:?} stored on matching record")]
    UnknownRole(String),
    #[error("Value {0} does not fit into its column")]
    OutOfRange(String),
}

impl DatabaseError {
    /// Whether running the same job again later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Pool(_) => true,
            Self::Database(diesel::result::Error::DatabaseError(kind, _)) => matches!(
                kind,
                DatabaseErrorKind::SerializationFailure | DatabaseErrorKind::ClosedConnection
            ),
            Self::Database(diesel::result::Error::BrokenTransactionManager) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DatabaseError;

    #[test]
    fn data_errors_are_not_transient() {
        assert!(!DatabaseError::UnknownRole("chair".to_owned()).is_transient());
        assert!(!DatabaseError::Database(diesel::result::Error::NotFound).is_transient());
        assert!(DatabaseError::Database(diesel::result::Error::BrokenTransactionManager).is_transient());
    }
}
