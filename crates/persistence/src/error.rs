use thiserror::Error;

use crate::Collection;

/// Errors that can occur when talking to a persistence collaborator.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The document does not exist in the collection.
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: Collection, id: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A filesystem error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend rejected or could not serve the request.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Result type for persistence operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;
