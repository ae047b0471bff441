//! Object storage the pipelines read from and write to.
//!
//! Buckets hold objects addressed by `/`-separated keys, as in S3. Two
//! implementations ship with the crate:
//!
//! - [`FsObjectStore`]: one directory per bucket under a root directory
//! - [`MemoryObjectStore`]: an in-process map for tests and dry runs
//!
//! ```text
//! buckets/                 # FsObjectStore root
//! ├── uploads/             # bucket
//! │   └── tags/bread.jpg   # key "tags/bread.jpg"
//! └── static/
//!     └── tags/bread/
//!         ├── orig.jpeg
//!         └── 1200.webp
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },
    #[error("invalid object key {0:?}")]
    InvalidKey(String),
    #[error("failed to walk bucket: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Minimal object storage interface.
///
/// Implementations must be `Sync` so one store can be shared by every
/// record of an event.
pub trait ObjectStore: Sync {
    /// Read a whole object.
    fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Keys starting with `prefix`, in lexicographic order, at most
    /// `max_keys` of them when a limit is given.
    fn list(
        &self,
        bucket: &str,
        prefix: &str,
        max_keys: Option<usize>,
    ) -> Result<Vec<String>, StorageError>;

    /// Delete the given keys. Keys that do not exist are ignored.
    fn delete(&self, bucket: &str, keys: &[String]) -> Result<(), StorageError>;

    /// Create or replace an object.
    fn put(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<(), StorageError>;
}

/// Reject keys that would escape the bucket or map to odd paths.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if bad {
        Err(StorageError::InvalidKey(key.to_string()))
    } else {
        Ok(())
    }
}

fn validate_bucket(bucket: &str) -> Result<(), StorageError> {
    if bucket.is_empty() || bucket.contains('/') || bucket.contains('\\') || bucket == ".." {
        Err(StorageError::InvalidKey(bucket.to_string()))
    } else {
        Ok(())
    }
}

fn take(mut keys: Vec<String>, max_keys: Option<usize>) -> Vec<String> {
    keys.sort();
    if let Some(max) = max_keys {
        keys.truncate(max);
    }
    keys
}

// =============================================================================
// Filesystem
// =============================================================================

/// Buckets are directories under `root`; keys are relative paths.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        validate_bucket(bucket)?;
        Ok(self.root.join(bucket))
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.bucket_dir(bucket)?.join(key))
    }
}

/// Key for a file below a bucket directory, always `/`-separated.
fn key_for(bucket_dir: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(bucket_dir).ok()?;
    let segments: Option<Vec<&str>> = relative
        .components()
        .map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();
    segments.map(|s| s.join("/"))
}

impl ObjectStore for FsObjectStore {
    fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(bucket, key)?;
        fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            _ => StorageError::Io(e),
        })
    }

    fn list(
        &self,
        bucket: &str,
        prefix: &str,
        max_keys: Option<usize>,
    ) -> Result<Vec<String>, StorageError> {
        let dir = self.bucket_dir(bucket)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in WalkDir::new(&dir).follow_links(false) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            match key_for(&dir, entry.path()) {
                Some(key) if key.starts_with(prefix) => keys.push(key),
                _ => {}
            }
        }
        Ok(take(keys, max_keys))
    }

    fn delete(&self, bucket: &str, keys: &[String]) -> Result<(), StorageError> {
        for key in keys {
            let path = self.object_path(bucket, key)?;
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn put(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        Ok(())
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Objects kept in a map keyed by `(bucket, key)`.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(bucket, key)` currently stored.
    pub fn keys(&self) -> Vec<(String, String)> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<(String, String), Vec<u8>>> {
        // A poisoned map is still a consistent map
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ObjectStore for MemoryObjectStore {
    fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        self.lock()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    fn list(
        &self,
        bucket: &str,
        prefix: &str,
        max_keys: Option<usize>,
    ) -> Result<Vec<String>, StorageError> {
        let keys = self
            .lock()
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect();
        Ok(take(keys, max_keys))
    }

    fn delete(&self, bucket: &str, keys: &[String]) -> Result<(), StorageError> {
        let mut objects = self.lock();
        for key in keys {
            objects.remove(&(bucket.to_string(), key.clone()));
        }
        Ok(())
    }

    fn put(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        validate_key(key)?;
        self.lock()
            .insert((bucket.to_string(), key.to_string()), bytes.to_vec());
        Ok(())
    }
}
