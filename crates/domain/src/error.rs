//! Domain error types.

use persistence::{IdentityError, PersistenceError, UploadError};
use thiserror::Error;

use crate::admin::AdminError;
use crate::cart::CartError;
use crate::catalog::CatalogError;
use crate::order::OrderError;
use crate::settings::SettingsError;
use crate::snapshot::SnapshotError;
use crate::store::SyncError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A catalog operation was rejected.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// A cart operation was rejected.
    #[error(transparent)]
    Cart(#[from] CartError),

    /// An order operation was rejected.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// A settings update was rejected.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// An admin setup or sign-in step was rejected.
    #[error(transparent)]
    Admin(#[from] AdminError),

    /// The document gateway failed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// The image upload collaborator failed.
    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    /// The identity service failed or rejected the request.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// A snapshot could not be encoded or decoded.
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// Persisting a mutation failed.
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
}

impl DomainError {
    /// Returns true for malformed input caught before any mutation.
    pub fn is_validation(&self) -> bool {
        match self {
            DomainError::Catalog(_) | DomainError::Settings(_) => true,
            DomainError::Cart(err) => !matches!(err, CartError::ProductNotFound(_)),
            DomainError::Order(err) => matches!(
                err,
                OrderError::TableNumberRequired
                    | OrderError::InvalidTableNumber(_)
                    | OrderError::EmptyCart
            ),
            DomainError::Admin(err) => !matches!(err, AdminError::TooManyAttempts { .. }),
            DomainError::Upload(UploadError::InvalidFile(_) | UploadError::MissingFile) => true,
            DomainError::Identity(IdentityError::InvalidEmail | IdentityError::WeakPassword) => {
                true
            }
            _ => false,
        }
    }

    /// Returns true when the referenced entity does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DomainError::Cart(CartError::ProductNotFound(_) | CartError::ItemNotInCart(_))
                | DomainError::Order(OrderError::NotFound(_))
                | DomainError::Persistence(PersistenceError::NotFound { .. })
        )
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
