//! Error types for the storage layer.

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A row that was expected to exist does not.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// What kind of row was looked up.
        entity: &'static str,
        /// The key that missed.
        id: String,
    },

    /// A row in the database holds a value the domain cannot represent.
    #[error("corrupt {entity} row {id}: {detail}")]
    Corrupt {
        /// What kind of row is damaged.
        entity: &'static str,
        /// The row's key.
        id: String,
        /// What could not be interpreted.
        detail: String,
    },

    /// The underlying database failed.
    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}
