//! Product image upload collaborator.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default image size ceiling (10 MB).
pub const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;

/// Content types accepted by default.
pub const DEFAULT_ALLOWED_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/webp",
    "image/gif",
];

/// Errors from image validation and storage.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Missing or malformed bearer credential.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The file failed type or size validation.
    #[error("{0}")]
    InvalidFile(String),

    /// The request carried no file.
    #[error("No file provided")]
    MissingFile,

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The storage backend rejected the operation.
    #[error("Storage error: {0}")]
    Storage(String),
}

/// An image received from a client.
#[derive(Debug, Clone)]
pub struct ImageFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Limits applied to uploaded images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    pub max_bytes: usize,
    pub allowed_types: Vec<String>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            allowed_types: DEFAULT_ALLOWED_TYPES.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl UploadOptions {
    /// Default allow-list with a custom size ceiling.
    pub fn with_max_bytes(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            ..Self::default()
        }
    }
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedImage {
    pub url: String,
    pub filename: String,
    pub size: usize,
    pub uploaded_at: DateTime<Utc>,
}

/// Checks an image against the type allow-list and size ceiling.
pub fn validate_image_file(file: &ImageFile, options: &UploadOptions) -> Result<(), UploadError> {
    let content_type = file.content_type.to_ascii_lowercase();
    if !options.allowed_types.iter().any(|t| *t == content_type) {
        return Err(UploadError::InvalidFile(format!(
            "Invalid file type. Allowed types: {}",
            options.allowed_types.join(", ")
        )));
    }

    if file.size() > options.max_bytes {
        return Err(UploadError::InvalidFile(format!(
            "File too large. Maximum size: {}MB",
            options.max_bytes / (1024 * 1024)
        )));
    }

    Ok(())
}

/// A bearer credential taken from an `Authorization` header.
#[derive(Debug)]
pub struct BearerToken(SecretString);

impl BearerToken {
    /// Parses `Bearer <token>`. Anything else is unauthorized.
    pub fn from_header(header: Option<&str>) -> Result<Self, UploadError> {
        let header = header.ok_or_else(|| {
            UploadError::Unauthorized("Missing authorization header".to_string())
        })?;
        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            UploadError::Unauthorized("Invalid authorization header".to_string())
        })?;
        let token = token.trim();
        if token.is_empty() {
            return Err(UploadError::Unauthorized("Empty bearer token".to_string()));
        }
        Ok(Self(SecretString::from(token.to_string())))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

/// Builds a unique storage name: `{base}-{millis}-{random6}.{ext}`.
///
/// The base is the part of the original name before the first dot, with
/// non-alphanumerics replaced by `-` and lowercased. The extension is kept
/// only if it is 1 to 10 ASCII alphanumerics; otherwise it becomes `jpg`.
pub fn generate_filename(original: &str) -> String {
    let (base, ext) = match original.split_once('.') {
        Some((base, _)) => (base, original.rsplit('.').next().unwrap_or_default()),
        None => (original, ""),
    };

    let base: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let base = if base.is_empty() { "image".to_string() } else { base };
    let valid_ext = (1..=10).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric());
    let ext = if valid_ext {
        ext.to_ascii_lowercase()
    } else {
        "jpg".to_string()
    };

    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect();

    format!(
        "{}-{}-{}.{}",
        base,
        Utc::now().timestamp_millis(),
        suffix,
        ext
    )
}

/// Extracts the stored filename from a filename or public URL.
///
/// Returns None for names that could escape the storage directory.
fn stored_name(filename_or_url: &str) -> Option<&str> {
    let trimmed = filename_or_url.split(['?', '#']).next().unwrap_or_default();
    let name = trimmed.rsplit('/').next().unwrap_or_default();
    if name.is_empty() || name == "." || name == ".." || name.contains('\\') {
        return None;
    }
    Some(name)
}

/// Image storage operations.
#[async_trait]
pub trait ImageStorage: Send + Sync {
    /// Validates and stores an image.
    async fn upload(
        &self,
        token: &BearerToken,
        file: ImageFile,
    ) -> Result<UploadedImage, UploadError>;

    /// Deletes a stored image by filename or URL. Returns false if it
    /// didn't exist.
    async fn delete(&self, token: &BearerToken, filename_or_url: &str)
    -> Result<bool, UploadError>;

    /// Limits enforced on upload.
    fn options(&self) -> &UploadOptions;
}

fn authorize(required: Option<&SecretString>, token: &BearerToken) -> Result<(), UploadError> {
    match required {
        Some(expected) if expected.expose_secret() != token.expose() => Err(
            UploadError::Unauthorized("Invalid bearer token".to_string()),
        ),
        _ => Ok(()),
    }
}

/// Stores images in a local directory served under a public URL prefix.
#[derive(Debug)]
pub struct LocalImageStorage {
    root: PathBuf,
    public_prefix: String,
    options: UploadOptions,
    required_token: Option<SecretString>,
}

impl LocalImageStorage {
    pub fn new(root: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_prefix: public_prefix.into().trim_end_matches('/').to_string(),
            options: UploadOptions::default(),
            required_token: None,
        }
    }

    pub fn with_options(mut self, options: UploadOptions) -> Self {
        self.options = options;
        self
    }

    /// Requires every request's bearer token to equal `token`.
    pub fn with_required_token(mut self, token: SecretString) -> Self {
        self.required_token = Some(token);
        self
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

#[async_trait]
impl ImageStorage for LocalImageStorage {
    #[tracing::instrument(skip(self, token, file), fields(filename = %file.filename, size = file.size()))]
    async fn upload(
        &self,
        token: &BearerToken,
        file: ImageFile,
    ) -> Result<UploadedImage, UploadError> {
        authorize(self.required_token.as_ref(), token)?;
        validate_image_file(&file, &self.options)?;

        tokio::fs::create_dir_all(&self.root).await?;
        let filename = generate_filename(&file.filename);
        let size = file.size();
        tokio::fs::write(self.root.join(&filename), &file.bytes).await?;

        metrics::counter!("image_uploads_total").increment(1);
        tracing::info!(%filename, "Image stored");

        Ok(UploadedImage {
            url: format!("{}/{}", self.public_prefix, filename),
            filename,
            size,
            uploaded_at: Utc::now(),
        })
    }

    async fn delete(
        &self,
        token: &BearerToken,
        filename_or_url: &str,
    ) -> Result<bool, UploadError> {
        authorize(self.required_token.as_ref(), token)?;

        let name = stored_name(filename_or_url).ok_or_else(|| {
            UploadError::InvalidFile(format!("Invalid image reference: {filename_or_url}"))
        })?;

        match tokio::fs::remove_file(self.root.join(name)).await {
            Ok(()) => {
                tracing::info!(filename = %name, "Image deleted");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn options(&self) -> &UploadOptions {
        &self.options
    }
}

#[derive(Debug, Default)]
struct InMemoryImageState {
    images: HashMap<String, Vec<u8>>,
    fail_on_upload: bool,
}

/// In-memory image storage for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryImageStorage {
    state: Arc<RwLock<InMemoryImageState>>,
    options: UploadOptions,
}

impl InMemoryImageStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: UploadOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Configures uploads to fail (or succeed again).
    pub fn set_fail_on_upload(&self, fail: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_on_upload = fail;
    }

    pub fn image_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .images
            .len()
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .images
            .contains_key(filename)
    }
}

#[async_trait]
impl ImageStorage for InMemoryImageStorage {
    async fn upload(
        &self,
        _token: &BearerToken,
        file: ImageFile,
    ) -> Result<UploadedImage, UploadError> {
        validate_image_file(&file, &self.options)?;

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.fail_on_upload {
            return Err(UploadError::Storage("Upload rejected".to_string()));
        }

        let filename = generate_filename(&file.filename);
        let size = file.size();
        state.images.insert(filename.clone(), file.bytes);

        Ok(UploadedImage {
            url: format!("/uploads/{filename}"),
            filename,
            size,
            uploaded_at: Utc::now(),
        })
    }

    async fn delete(
        &self,
        _token: &BearerToken,
        filename_or_url: &str,
    ) -> Result<bool, UploadError> {
        let name = stored_name(filename_or_url).ok_or_else(|| {
            UploadError::InvalidFile(format!("Invalid image reference: {filename_or_url}"))
        })?;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        Ok(state.images.remove(name).is_some())
    }

    fn options(&self) -> &UploadOptions {
        &self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> BearerToken {
        BearerToken::from_header(Some("Bearer abc123")).unwrap()
    }

    fn png(bytes: usize) -> ImageFile {
        ImageFile::new("Classic Burger.png", "image/png", vec![0u8; bytes])
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(token().expose(), "abc123");

        for header in [None, Some("abc123"), Some("Basic abc123"), Some("Bearer   ")] {
            let result = BearerToken::from_header(header);
            assert!(matches!(result, Err(UploadError::Unauthorized(_))));
        }
    }

    #[test]
    fn validation_rejects_wrong_type() {
        let file = ImageFile::new("doc.pdf", "application/pdf", vec![1, 2, 3]);
        let err = validate_image_file(&file, &UploadOptions::default()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid file type. Allowed types: image/jpeg, image/jpg, image/png, image/webp, image/gif"
        );
    }

    #[test]
    fn validation_rejects_oversized_files() {
        let options = UploadOptions::with_max_bytes(5 * 1024 * 1024);
        let err = validate_image_file(&png(5 * 1024 * 1024 + 1), &options).unwrap_err();
        assert_eq!(err.to_string(), "File too large. Maximum size: 5MB");

        assert!(validate_image_file(&png(5 * 1024 * 1024), &options).is_ok());
    }

    #[test]
    fn generated_filenames() {
        let name = generate_filename("My Photo!.JPG");
        assert!(name.starts_with("my-photo--"));
        assert!(name.ends_with(".jpg"));

        let parts: Vec<_> = name.trim_end_matches(".jpg").rsplitn(3, '-').collect();
        assert_eq!(parts[0].len(), 6);
        assert!(parts[1].parse::<i64>().is_ok());

        assert!(generate_filename("noextension").ends_with(".jpg"));
        assert!(generate_filename("archive.tar.gz").starts_with("archive-"));
        assert!(generate_filename("archive.tar.gz").ends_with(".gz"));
        assert_ne!(generate_filename("a.png"), generate_filename("a.png"));
        assert!(generate_filename("trailing.").ends_with(".jpg"));
        let hostile = generate_filename("a./x");
        assert!(hostile.starts_with("a-"));
        assert!(hostile.ends_with(".jpg"));
        assert!(!hostile.contains('/'));
        assert!(generate_filename("shot.p n g").ends_with(".jpg"));
    }

    #[test]
    fn stored_name_rejects_traversal() {
        assert_eq!(stored_name("/uploads/burger-1-abcdef.png"), Some("burger-1-abcdef.png"));
        assert_eq!(
            stored_name("https://cdn.example.com/uploads/x.png?v=2"),
            Some("x.png")
        );
        assert_eq!(stored_name("../"), None);
        assert_eq!(stored_name("/uploads/.."), None);
        assert_eq!(stored_name("..\\secret"), None);
        assert_eq!(stored_name(""), None);
    }

    #[tokio::test]
    async fn local_storage_upload_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalImageStorage::new(dir.path().join("uploads"), "/uploads/");

        let uploaded = storage.upload(&token(), png(128)).await.unwrap();
        assert!(uploaded.url.starts_with("/uploads/classic-burger-"));
        assert_eq!(uploaded.size, 128);
        assert!(dir.path().join("uploads").join(&uploaded.filename).exists());

        assert!(storage.delete(&token(), &uploaded.url).await.unwrap());
        assert!(!storage.delete(&token(), &uploaded.url).await.unwrap());
    }

    #[tokio::test]
    async fn local_storage_enforces_required_token() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalImageStorage::new(dir.path(), "/uploads")
            .with_required_token(SecretString::from("expected".to_string()));

        let result = storage.upload(&token(), png(10)).await;
        assert!(matches!(result, Err(UploadError::Unauthorized(_))));

        let good = BearerToken::from_header(Some("Bearer expected")).unwrap();
        assert!(storage.upload(&good, png(10)).await.is_ok());
    }

    #[tokio::test]
    async fn local_storage_rejects_invalid_files_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalImageStorage::new(dir.path().join("uploads"), "/uploads");

        let file = ImageFile::new("notes.txt", "text/plain", b"hello".to_vec());
        let result = storage.upload(&token(), file).await;
        assert!(matches!(result, Err(UploadError::InvalidFile(_))));
        assert!(!dir.path().join("uploads").exists());
    }

    #[tokio::test]
    async fn in_memory_storage() {
        let storage = InMemoryImageStorage::new();
        let uploaded = storage.upload(&token(), png(4)).await.unwrap();
        assert!(storage.contains(&uploaded.filename));

        storage.set_fail_on_upload(true);
        assert!(storage.upload(&token(), png(4)).await.is_err());
        assert_eq!(storage.image_count(), 1);

        assert!(storage.delete(&token(), &uploaded.url).await.unwrap());
        assert_eq!(storage.image_count(), 0);
    }
}
