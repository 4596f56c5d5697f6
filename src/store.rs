//! Durable storage for the [`Snapshot`].
//!
//! The snapshot is a single JSON document:
//!
//! ```text
//! {"subscriptions": {"<name>": {"<title>": ModelRecord, ...}, ...}}
//! ```
//!
//! Saves go to a sibling temp file which is then renamed over the target, so a
//! reader never observes a half-written snapshot and a failed save leaves the
//! previous file intact.

use crate::config::temp_path_for;
use crate::errors::PersistenceError;
use crate::models::Snapshot;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot from disk.
    ///
    /// # Returns
    ///
    /// An empty [`Snapshot`] when no file exists yet.
    ///
    /// # Errors
    ///
    /// [`PersistenceError::Malformed`] when the file exists but is not a
    /// snapshot. The caller must not overwrite it in that case.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn load(&self) -> Result<Snapshot, PersistenceError> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No snapshot on disk yet; starting empty");
                return Ok(Snapshot::default());
            }
            Err(source) => {
                return Err(PersistenceError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let snapshot: Snapshot =
            serde_json::from_str(&text).map_err(|source| PersistenceError::Malformed {
                path: self.path.clone(),
                source,
            })?;
        info!(
            subscriptions = snapshot.subscriptions.len(),
            records = snapshot.len(),
            "Loaded snapshot"
        );
        Ok(snapshot)
    }

    /// Replace the on-disk snapshot with `snapshot`.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(snapshot)?;
        let write_err = |source| PersistenceError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let tmp = temp_path_for(&self.path);
        if let Err(e) = fs::write(&tmp, json).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(write_err(e));
        }
        if let Err(e) = fs::rename(&tmp, &self.path).await {
            warn!(tmp = %tmp.display(), error = %e, "Rename failed; removing temp file");
            let _ = fs::remove_file(&tmp).await;
            return Err(write_err(e));
        }

        info!(records = snapshot.len(), "Saved snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelDetail, ModelRecord, ModelStats};
    use chrono::{TimeZone, Utc};

    fn sample_snapshot() -> Snapshot {
        let mut snapshot = Snapshot::default();
        let published = Utc
            .with_ymd_and_hms(2025, 3, 14, 9, 26, 53)
            .unwrap()
            .checked_add_signed(chrono::Duration::nanoseconds(123_456_789))
            .unwrap();
        let records = snapshot.subscriptions.entry("alpha".to_string()).or_default();
        records.insert(
            "M1".to_string(),
            ModelRecord {
                title: "M1".to_string(),
                link: "http://x/1".to_string(),
                published_at: Some(published),
                stats: ModelStats {
                    likes: Some(3720),
                    followers: Some(50),
                },
                detail: ModelDetail {
                    introduction: Some("A small model, ünïcødé ✓".to_string()),
                    tags: vec!["text-generation".to_string(), "gguf".to_string()],
                    size: Some("8.03B params".to_string()),
                    license: Some("apache-2.0".to_string()),
                    downloads: Some("1.2M".to_string()),
                },
                subscription_name: "alpha".to_string(),
            },
        );
        records.insert(
            "M2".to_string(),
            ModelRecord {
                title: "M2".to_string(),
                link: "http://x/2".to_string(),
                published_at: None,
                stats: ModelStats::default(),
                detail: ModelDetail::default(),
                subscription_name: "alpha".to_string(),
            },
        );
        snapshot.subscriptions.insert("beta".to_string(), Default::default());
        snapshot
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("models.json"));
        let snapshot = store.load().await.unwrap();
        assert!(snapshot.subscriptions.is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("data").join("models.json"));
        let snapshot = sample_snapshot();

        store.save(&snapshot).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, snapshot);

        // A second save of the loaded value produces identical bytes.
        let first = std::fs::read(store.path()).unwrap();
        store.save(&loaded).await.unwrap();
        let second = std::fs::read(store.path()).unwrap();
        assert_eq!(first, second);
        assert!(!temp_path_for(store.path()).exists());
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.json");
        std::fs::write(&path, "{\"subscriptions\": [1, 2").unwrap();

        let store = SnapshotStore::new(&path);
        assert!(matches!(
            store.load().await,
            Err(PersistenceError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_save_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.json");
        let store = SnapshotStore::new(&path);
        store.save(&sample_snapshot()).await.unwrap();
        let before = std::fs::read(&path).unwrap();

        // A directory sitting where the temp file goes makes the write fail.
        std::fs::create_dir(temp_path_for(&path)).unwrap();
        let err = store.save(&Snapshot::default()).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Write { .. }));
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }
}
