//! Collaborators consumed by the restaurant domain store.
//!
//! - [`DocumentGateway`] for document CRUD and counters, with in-memory and
//!   PostgreSQL implementations
//! - [`SnapshotSlot`] for the single serialized state snapshot
//! - [`IdentityService`] for admin authentication
//! - [`ImageStorage`] for product image upload and deletion

pub mod error;
pub mod gateway;
pub mod identity;
pub mod images;
pub mod memory;
pub mod postgres;
pub mod snapshot;

pub use error::{PersistenceError, Result};
pub use gateway::{Collection, Document, DocumentGateway, DocumentGatewayExt};
pub use identity::{
    AdminCredentials, AdminProfile, FileIdentityService, IdentityError, IdentityService,
    InMemoryIdentityService, is_valid_email,
};
pub use images::{
    BearerToken, ImageFile, ImageStorage, InMemoryImageStorage, LocalImageStorage, UploadError,
    UploadOptions, UploadedImage, generate_filename, validate_image_file,
};
pub use memory::InMemoryDocumentGateway;
pub use postgres::PostgresDocumentGateway;
pub use snapshot::{DEFAULT_SLOT, FileSnapshotSlot, InMemorySnapshotSlot, SnapshotSlot};
