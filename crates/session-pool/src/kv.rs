//! Key-value storage for whole-collection values
//!
//! Each collection (`accounts`, `sessions`) is one serialized string under
//! one key. `FileKv` keeps one file per key and replaces it atomically on
//! every write; `MemoryKv` backs tests and ephemeral runs.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};

/// Boxed future returned by store traits (keeps them dyn-compatible).
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// A get/set string store.
pub trait KeyValueStore: Send + Sync {
    /// Value under `key`, or `None` if the key was never written.
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

    /// Replace the value under `key`.
    fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()>;
}

/// In-process store.
#[derive(Default)]
pub struct MemoryKv {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKv {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move { Ok(self.values.lock().await.get(key).cloned()) })
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.values.lock().await.insert(key.to_string(), value);
            Ok(())
        })
    }
}

/// One JSON file per key under a data directory.
pub struct FileKv {
    dir: PathBuf,
    tmp_seq: AtomicU64,
}

impl FileKv {
    /// Open (creating if needed) the data directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::Storage(format!("creating data dir {}: {e}", dir.display())))?;
        Ok(Self {
            dir,
            tmp_seq: AtomicU64::new(0),
        })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn tmp_path(&self, key: &str) -> PathBuf {
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        self.dir
            .join(format!(".{key}.tmp.{}.{seq}", std::process::id()))
    }
}

impl KeyValueStore for FileKv {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            let path = self.path(key);
            match tokio::fs::read_to_string(&path).await {
                Ok(contents) => Ok(Some(contents)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(Error::Storage(format!("reading {}: {e}", path.display()))),
            }
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let tmp = self.tmp_path(key);
            write_atomic(&tmp, &self.path(key), value.as_bytes()).await
        })
    }
}

/// Write to `tmp`, restrict it to 0600, then rename over `path`.
///
/// Collections hold passwords and session cookies, hence the permissions.
async fn write_atomic(tmp: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    tokio::fs::write(tmp, bytes)
        .await
        .map_err(|e| Error::Storage(format!("writing temp file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(tmp, perms)
            .await
            .map_err(|e| Error::Storage(format!("setting file permissions: {e}")))?;
    }

    tokio::fs::rename(tmp, path)
        .await
        .map_err(|e| Error::Storage(format!("renaming temp file: {e}")))?;

    debug!(path = %path.display(), "persisted collection");
    Ok(())
}
