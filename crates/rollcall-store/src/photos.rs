//! Filesystem store for student reference photos.
//!
//! Photos are the only persisted recognition input; embeddings are always
//! recomputed from these files on rebuild. Stored names are
//! uuid-prefixed so uploads can never collide or shadow each other.

use crate::StoreError;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub struct PhotoStore {
    dir: PathBuf,
}

impl PhotoStore {
    /// Open the photo directory, creating it if needed.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Persist photo bytes, returning the stored reference.
    ///
    /// The original name contributes only its extension; the stored name
    /// is a fresh uuid.
    pub fn save(&self, original_name: &str, bytes: &[u8]) -> Result<String, StoreError> {
        let ext = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("jpg");
        let stored = format!("{}.{ext}", Uuid::new_v4());
        std::fs::write(self.dir.join(&stored), bytes)?;
        tracing::debug!(photo = %stored, size = bytes.len(), "photo saved");
        Ok(stored)
    }

    /// Resolve a photo reference to its bytes.
    pub fn resolve(&self, photo_ref: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_of(photo_ref);
        if !path.exists() {
            return Err(StoreError::PhotoMissing(photo_ref.to_string()));
        }
        Ok(std::fs::read(path)?)
    }

    /// Remove a stored photo. A missing file is not an error.
    pub fn remove(&self, photo_ref: &str) -> Result<(), StoreError> {
        let path = self.path_of(photo_ref);
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// References are treated as bare filenames; any directory components
    /// are stripped so a crafted reference cannot escape the photo dir.
    fn path_of(&self, photo_ref: &str) -> PathBuf {
        let name = Path::new(photo_ref)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        self.dir.join(name)
    }
}
