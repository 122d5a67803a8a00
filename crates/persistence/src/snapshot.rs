use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::{PersistenceError, Result};

/// Key under which the full state snapshot is stored.
pub const DEFAULT_SLOT: &str = "restaurantState";

/// A single named slot holding the serialized state snapshot.
///
/// The slot stores opaque text; encoding and versioning are the caller's
/// concern.
#[async_trait]
pub trait SnapshotSlot: Send + Sync {
    /// The slot's key.
    fn key(&self) -> &str;

    /// Reads the slot's contents, or None if it has never been written.
    async fn load(&self) -> Result<Option<String>>;

    /// Replaces the slot's contents.
    async fn save(&self, contents: &str) -> Result<()>;

    /// Removes the slot. Clearing an empty slot is not an error.
    async fn clear(&self) -> Result<()>;
}

/// In-memory snapshot slot for tests.
#[derive(Debug, Clone)]
pub struct InMemorySnapshotSlot {
    key: String,
    contents: Arc<RwLock<Option<String>>>,
    fail_on_save: Arc<AtomicBool>,
    saves: Arc<AtomicUsize>,
}

impl Default for InMemorySnapshotSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySnapshotSlot {
    /// Creates an empty slot under the default key.
    pub fn new() -> Self {
        Self {
            key: DEFAULT_SLOT.to_string(),
            contents: Arc::new(RwLock::new(None)),
            fail_on_save: Arc::new(AtomicBool::new(false)),
            saves: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Creates a slot pre-populated with `contents`.
    pub fn with_contents(contents: impl Into<String>) -> Self {
        let slot = Self::new();
        *slot
            .contents
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(contents.into());
        slot
    }

    /// Configures saves to fail (or succeed again).
    pub fn set_fail_on_save(&self, fail: bool) {
        self.fail_on_save.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Current contents, if any.
    pub fn contents(&self) -> Option<String> {
        self.contents
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl SnapshotSlot for InMemorySnapshotSlot {
    fn key(&self) -> &str {
        &self.key
    }

    async fn load(&self) -> Result<Option<String>> {
        Ok(self.contents())
    }

    async fn save(&self, contents: &str) -> Result<()> {
        if self.fail_on_save.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable(
                "snapshot slot rejected the write".to_string(),
            ));
        }
        *self
            .contents
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(contents.to_string());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self
            .contents
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Snapshot slot backed by a single file on disk.
///
/// Writes go to a sibling temporary file which is then renamed over the
/// target, so readers never observe a partially written snapshot.
#[derive(Debug, Clone)]
pub struct FileSnapshotSlot {
    key: String,
    path: PathBuf,
}

impl FileSnapshotSlot {
    /// Creates a slot stored at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            key: DEFAULT_SLOT.to_string(),
            path: path.into(),
        }
    }

    /// The file backing this slot.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| DEFAULT_SLOT.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotSlot for FileSnapshotSlot {
    fn key(&self) -> &str {
        &self.key
    }

    async fn load(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(skip(self, contents), fields(path = %self.path.display(), bytes = contents.len()))]
    async fn save(&self, contents: &str) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, contents).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        tracing::debug!("Snapshot written");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
