//! Persistence backends for the record collection.
//!
//! The collection is saved whole on every mutation. Records are small and few,
//! and a whole-file write keeps other readers of the same namespace from ever
//! seeing half of an update.

use crate::types::WithdrawalRecord;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
    time::SystemTime,
};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Namespace the tracker has always stored its collection under.
pub const DEFAULT_NAMESPACE: &str = "bridge_withdrawal_transactions";

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Identifies one version of the persisted collection.
///
/// A changed revision that the store did not write itself means another
/// process updated the namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Revision {
    pub modified: SystemTime,
    pub len: u64,
}

/// Trait for record collection backends.
pub trait Persistence: Send + Sync {
    /// Load the whole collection. A namespace never written loads as empty.
    fn load(&self) -> Result<Vec<WithdrawalRecord>, PersistenceError>;

    /// Replace the whole collection.
    fn save(&self, records: &[WithdrawalRecord]) -> Result<(), PersistenceError>;

    /// Current revision, for backends shared with other processes.
    fn revision(&self) -> Option<Revision> {
        None
    }
}

/// One JSON array per namespace, in `<dir>/<namespace>.json`.
#[derive(Debug, Clone)]
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(dir: impl AsRef<Path>, namespace: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{namespace}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Persistence for JsonFile {
    fn load(&self) -> Result<Vec<WithdrawalRecord>, PersistenceError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, records: &[WithdrawalRecord]) -> Result<(), PersistenceError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        // Each writer gets its own temp file so concurrent saves never
        // interleave bytes; the rename picks one whole collection.
        let json = serde_json::to_vec_pretty(records)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    fn revision(&self) -> Option<Revision> {
        let metadata = fs::metadata(&self.path).ok()?;
        Some(Revision {
            modified: metadata.modified().ok()?,
            len: metadata.len(),
        })
    }
}

/// In-process backend. Clones share the same collection, which lets a test
/// reopen a store and observe what a previous instance saved.
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    records: Arc<Mutex<Vec<WithdrawalRecord>>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for MemoryPersistence {
    fn load(&self) -> Result<Vec<WithdrawalRecord>, PersistenceError> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, records: &[WithdrawalRecord]) -> Result<(), PersistenceError> {
        *self.records.lock().unwrap_or_else(PoisonError::into_inner) = records.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordMeta;
    use alloy_primitives::B256;

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonFile::new(dir.path(), DEFAULT_NAMESPACE);
        assert!(file.load().unwrap().is_empty());
        assert!(file.revision().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonFile::new(dir.path().join("nested"), DEFAULT_NAMESPACE);
        let record = WithdrawalRecord::new(B256::repeat_byte(0xaa), RecordMeta::default());

        file.save(std::slice::from_ref(&record)).unwrap();

        assert!(file.path().ends_with("bridge_withdrawal_transactions.json"));
        assert_eq!(file.load().unwrap(), vec![record]);
        assert!(file.revision().is_some());

        let entries: Vec<_> = fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec!["bridge_withdrawal_transactions.json"]);
    }

    #[test]
    fn test_concurrent_saves_leave_a_whole_collection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();

        let writers: Vec<_> = (1..=8u8)
            .map(|n| {
                let file = JsonFile::new(&path, DEFAULT_NAMESPACE);
                std::thread::spawn(move || {
                    let records: Vec<_> = (0..n)
                        .map(|i| {
                            WithdrawalRecord::new(B256::repeat_byte(i + 1), RecordMeta::default())
                        })
                        .collect();
                    for _ in 0..20 {
                        file.save(&records).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let loaded = JsonFile::new(&path, DEFAULT_NAMESPACE).load().unwrap();
        assert!((1..=8).contains(&loaded.len()));
        assert_eq!(fs::read_dir(&path).unwrap().count(), 1);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonFile::new(dir.path(), "corrupt");
        fs::write(file.path(), b"{not json").unwrap();
        assert!(matches!(
            file.load(),
            Err(PersistenceError::Serialization(_))
        ));
    }

    #[test]
    fn test_memory_clones_share_state() {
        let a = MemoryPersistence::new();
        let b = a.clone();
        let record = WithdrawalRecord::new(B256::repeat_byte(0x01), RecordMeta::default());
        a.save(std::slice::from_ref(&record)).unwrap();
        assert_eq!(b.load().unwrap(), vec![record]);
    }
}
