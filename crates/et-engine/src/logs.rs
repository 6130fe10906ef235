//! Per-trial log artifacts.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use et_types::{TrialError, TuneResult};

/// Where captured job output is kept.
pub trait LogStore: Send + Sync {
    /// Persist `text` for `trial_id` and return the artifact location.
    fn write(&self, trial_id: &str, text: &str) -> TuneResult<PathBuf>;

    /// Remove a previously written artifact. Missing artifacts are not an error.
    fn delete(&self, location: &Path) -> TuneResult<()>;
}

/// Writes `{trial_id}_{YYYYmmdd-HHMMSS}.log` files into one directory.
#[derive(Debug, Clone)]
pub struct FileLogStore {
    pub log_dir: PathBuf,
}

impl FileLogStore {
    pub fn new<P: AsRef<Path>>(log_dir: P) -> TuneResult<Self> {
        let log_dir = log_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&log_dir)?;
        Ok(Self { log_dir })
    }

    pub fn log_path(&self, trial_id: &str, at: DateTime<Utc>) -> PathBuf {
        self.log_dir
            .join(format!("{trial_id}_{}.log", at.format("%Y%m%d-%H%M%S")))
    }
}

impl LogStore for FileLogStore {
    fn write(&self, trial_id: &str, text: &str) -> TuneResult<PathBuf> {
        let path = self.log_path(trial_id, Utc::now());
        std::fs::create_dir_all(&self.log_dir)?;
        std::fs::write(&path, text).map_err(|e| TrialError::LogArtifact {
            trial_id: trial_id.to_string(),
            message: format!("{}: {e}", path.display()),
        })?;
        Ok(path)
    }

    fn delete(&self, location: &Path) -> TuneResult<()> {
        match std::fs::remove_file(location) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Keeps logs in memory, keyed by a synthetic `memory://` path.
#[derive(Debug, Default)]
pub struct MemoryLogStore {
    entries: Mutex<BTreeMap<PathBuf, String>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, location: &Path) -> Option<String> {
        self.entries.lock().get(location).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl LogStore for MemoryLogStore {
    fn write(&self, trial_id: &str, text: &str) -> TuneResult<PathBuf> {
        let location = PathBuf::from(format!("memory://{trial_id}.log"));
        self.entries.lock().insert(location.clone(), text.to_string());
        Ok(location)
    }

    fn delete(&self, location: &Path) -> TuneResult<()> {
        self.entries.lock().remove(location);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn file_store_names_logs_by_trial_and_timestamp() {
        let dir = tempdir().unwrap();
        let store = FileLogStore::new(dir.path().join("autotune_logs")).unwrap();
        let at = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(
            store.log_path("autotune_stage1_1", at),
            dir.path()
                .join("autotune_logs")
                .join("autotune_stage1_1_20260304-050607.log")
        );
    }

    #[test]
    fn file_store_write_and_delete() {
        let dir = tempdir().unwrap();
        let store = FileLogStore::new(dir.path()).unwrap();

        let path = store.write("autotune_stage2_3", "Validation bpb: 1.0\n").unwrap();
        assert!(path.starts_with(dir.path()));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Validation bpb: 1.0\n");

        store.delete(&path).unwrap();
        assert!(!path.exists());
        // second delete is a no-op
        store.delete(&path).unwrap();
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryLogStore::new();
        assert!(store.is_empty());

        let location = store.write("t1", "hello").unwrap();
        assert_eq!(store.get(&location).as_deref(), Some("hello"));
        assert_eq!(store.len(), 1);

        store.delete(&location).unwrap();
        assert!(store.is_empty());
        assert!(store.get(&location).is_none());
    }
}
