use crate::utils::validation::stored_file_name;
use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};

/// Attempts at finding a free `<millis>-<name>` slot before giving up
const MAX_CREATE_ATTEMPTS: i64 = 32;

/// Directory of per-request upload files
#[derive(Debug, Clone)]
pub struct TempStore {
    dir: PathBuf,
}

/// Outcome of a best-effort purge
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PurgeReport {
    pub removed: usize,
    pub failed: usize,
}

impl TempStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the store directory if it does not exist yet
    pub async fn prepare(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("create upload dir {}", self.dir.display()))
    }

    /// Exclusively creates the file for a new upload.
    ///
    /// The name is `<millis>-<original>`; on a collision the timestamp is
    /// bumped until a free name is found.
    pub async fn create(&self, original_name: &str) -> Result<(TempFileGuard, File)> {
        let now = Utc::now().timestamp_millis();

        for offset in 0..MAX_CREATE_ATTEMPTS {
            let path = self.dir.join(stored_file_name(now + offset, original_name));
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => {
                    tracing::debug!("Created upload file {}", path.display());
                    return Ok((TempFileGuard::new(path), file));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(anyhow!(e).context(format!("create {}", path.display())));
                }
            }
        }

        Err(anyhow!(
            "no free upload name for '{}' after {} attempts",
            original_name,
            MAX_CREATE_ATTEMPTS
        ))
    }

    /// Removes every entry in the store, logging each one.
    ///
    /// Individual failures are logged and counted, never returned.
    pub async fn purge(&self) -> PurgeReport {
        let mut report = PurgeReport::default();

        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return report,
            Err(e) => {
                tracing::warn!("Cannot list upload dir {}: {}", self.dir.display(), e);
                report.failed += 1;
                return report;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Failed to read upload dir entry: {}", e);
                    report.failed += 1;
                    break;
                }
            };

            let path = entry.path();
            let removed = match entry.file_type().await {
                Ok(kind) if kind.is_dir() => fs::remove_dir_all(&path).await,
                _ => fs::remove_file(&path).await,
            };

            match removed {
                Ok(()) => {
                    tracing::info!("🧹 Removed leftover upload {}", path.display());
                    report.removed += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!("Failed to remove {}: {}", path.display(), e);
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// True when the store directory exists and is not read-only
    pub async fn is_writable(&self) -> bool {
        match fs::metadata(&self.dir).await {
            Ok(meta) => meta.is_dir() && !meta.permissions().readonly(),
            Err(_) => false,
        }
    }
}

/// Owns one upload file and deletes it exactly once.
///
/// `remove` is the normal path. If the guard is dropped first (handler
/// future cancelled by a client disconnect, or a panic) the file is
/// removed synchronously in `Drop`.
#[derive(Debug)]
pub struct TempFileGuard {
    path: Option<PathBuf>,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    pub async fn remove(mut self) -> std::io::Result<()> {
        let Some(path) = self.path.take() else {
            return Ok(());
        };

        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!("Deleted upload file {}", path.display());
                Ok(())
            }
            // Already gone, e.g. swept by a concurrent purge
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                tracing::error!("Failed to delete upload file {}: {}", path.display(), e);
                Err(e)
            }
        }
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::warn!("Removed abandoned upload file {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::error!("Failed to remove abandoned upload {}: {}", path.display(), e)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    fn entries(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[tokio::test]
    async fn test_prepare_creates_missing_dir() {
        let root = tempfile::tempdir().unwrap();
        let store = TempStore::new(root.path().join("nested").join("uploads"));
        store.prepare().await.unwrap();
        assert!(store.dir().is_dir());
        assert!(store.is_writable().await);
    }

    #[tokio::test]
    async fn test_create_uses_timestamp_prefix() {
        let root = tempfile::tempdir().unwrap();
        let store = TempStore::new(root.path());

        let (guard, mut file) = store.create("data.csv").await.unwrap();
        file.write_all(b"a,b\n").await.unwrap();

        let name = guard.path().file_name().unwrap().to_string_lossy().into_owned();
        let (prefix, rest) = name.split_once('-').unwrap();
        assert!(prefix.parse::<i64>().is_ok());
        assert_eq!(rest, "data.csv");
        assert_eq!(guard.path().parent().unwrap(), root.path());
    }

    #[tokio::test]
    async fn test_create_avoids_collisions() {
        let root = tempfile::tempdir().unwrap();
        let store = TempStore::new(root.path());

        let (first, _f1) = store.create("same.csv").await.unwrap();
        let (second, _f2) = store.create("same.csv").await.unwrap();
        assert_ne!(first.path(), second.path());
        assert_eq!(entries(root.path()).len(), 2);
    }

    #[tokio::test]
    async fn test_guard_remove_and_drop() {
        let root = tempfile::tempdir().unwrap();
        let store = TempStore::new(root.path());

        let (guard, file) = store.create("a.csv").await.unwrap();
        drop(file);
        guard.remove().await.unwrap();
        assert!(entries(root.path()).is_empty());

        let (guard, file) = store.create("b.csv").await.unwrap();
        drop(file);
        drop(guard);
        assert!(entries(root.path()).is_empty());
    }

    #[tokio::test]
    async fn test_remove_tolerates_missing_file() {
        let root = tempfile::tempdir().unwrap();
        let store = TempStore::new(root.path());

        let (guard, file) = store.create("a.csv").await.unwrap();
        drop(file);
        std::fs::remove_file(guard.path()).unwrap();
        assert!(guard.remove().await.is_ok());
    }

    #[tokio::test]
    async fn test_purge_removes_everything() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("1-left.csv"), "x").unwrap();
        std::fs::write(root.path().join("2-over.csv"), "y").unwrap();
        std::fs::create_dir(root.path().join("stray")).unwrap();
        std::fs::write(root.path().join("stray").join("inner"), "z").unwrap();

        let store = TempStore::new(root.path());
        let report = store.purge().await;

        assert_eq!(report, PurgeReport { removed: 3, failed: 0 });
        assert!(entries(root.path()).is_empty());
    }

    #[tokio::test]
    async fn test_purge_missing_dir_is_noop() {
        let root = tempfile::tempdir().unwrap();
        let store = TempStore::new(root.path().join("absent"));
        assert_eq!(store.purge().await, PurgeReport::default());
        assert!(!store.is_writable().await);
    }
}
