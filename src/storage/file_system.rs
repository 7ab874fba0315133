use alloy::primitives::Address;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::models::WalletRecord;
use super::{validate_user_id, ShareStore};
use crate::error::StorageError;
use crate::shares::Share;

const RECORD_FILE: &str = "record.json";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// File system share store
///
/// Layout: `<base>/<sha256(user_id)>/record.json`. Records are written to a
/// temp file first and then linked (create) or renamed (replace) into place,
/// so a record file is never observed half-written.
#[derive(Clone)]
pub struct FileShareStore {
    base_path: PathBuf,
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl FileShareStore {
    /// Create a store under the default base directory ("./wallets")
    pub fn new() -> Self {
        Self::new_with_base_dir(PathBuf::from("./wallets"))
    }

    /// Create a store with a custom base directory
    pub fn new_with_base_dir(base_path: PathBuf) -> Self {
        Self {
            base_path,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_path
    }

    fn wallet_dir(&self, user_id: &str) -> PathBuf {
        let digest = Sha256::digest(user_id.as_bytes());
        self.base_path.join(hex::encode(digest))
    }

    fn record_path(&self, user_id: &str) -> PathBuf {
        self.wallet_dir(user_id).join(RECORD_FILE)
    }

    fn temp_path(&self, user_id: &str) -> PathBuf {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.wallet_dir(user_id)
            .join(format!("{}.{}.{}.tmp", RECORD_FILE, std::process::id(), n))
    }

    /// Run `f` holding the lock that serializes read-modify-write for one user
    ///
    /// The entry is removed again once no other caller waits on it.
    fn with_user_lock<T>(&self, user_id: &str, f: impl FnOnce() -> T) -> T {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        let result = {
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            f()
        };

        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // held only by the map and by us
        if Arc::strong_count(&lock) == 2 {
            locks.remove(user_id);
        }
        result
    }

    fn write_temp(&self, record: &WalletRecord) -> Result<PathBuf, StorageError> {
        let temp = self.temp_path(&record.user_id);
        let json = serde_json::to_vec_pretty(record)?;
        fs::write(&temp, json)?;
        Ok(temp)
    }

    fn read_record(&self, user_id: &str) -> Result<WalletRecord, StorageError> {
        let path = self.record_path(user_id);
        let contents = match fs::read(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(user_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let record = serde_json::from_slice(&contents)?;
        Ok(record)
    }

    fn swap_shares(
        &self,
        user_id: &str,
        expected_generation: Option<u32>,
        server_share: Share,
        recovery_share: Share,
    ) -> Result<WalletRecord, StorageError> {
        validate_user_id(user_id)?;
        self.with_user_lock(user_id, || {
            self.rotate_locked(user_id, expected_generation, server_share, recovery_share)
        })
    }

    fn rotate_locked(
        &self,
        user_id: &str,
        expected_generation: Option<u32>,
        server_share: Share,
        recovery_share: Share,
    ) -> Result<WalletRecord, StorageError> {
        let current = self.read_record(user_id)?;
        if let Some(expected) = expected_generation {
            if current.generation != expected {
                return Err(StorageError::GenerationConflict {
                    user_id: user_id.to_string(),
                    expected,
                    actual: current.generation,
                });
            }
        }

        let updated = current.rotated(server_share, recovery_share);
        let temp = self.write_temp(&updated)?;
        if let Err(e) = fs::rename(&temp, self.record_path(user_id)) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }

        log::debug!(
            "Stored share generation {} for user {}",
            updated.generation,
            user_id
        );
        Ok(updated)
    }
}

impl Default for FileShareStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ShareStore for FileShareStore {
    fn create(
        &self,
        user_id: &str,
        address: Address,
        server_share: Share,
        recovery_share: Share,
    ) -> Result<WalletRecord, StorageError> {
        validate_user_id(user_id)?;
        fs::create_dir_all(self.wallet_dir(user_id))?;

        let record = WalletRecord::new(user_id, address, server_share, recovery_share);
        let temp = self.write_temp(&record)?;

        // hard_link fails if the target exists, across processes too
        let linked = fs::hard_link(&temp, self.record_path(user_id));
        let _ = fs::remove_file(&temp);
        match linked {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StorageError::WalletAlreadyExists(user_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        }

        log::debug!("Stored wallet record for user {}", user_id);
        Ok(record)
    }

    fn get(&self, user_id: &str) -> Result<WalletRecord, StorageError> {
        validate_user_id(user_id)?;
        self.read_record(user_id)
    }

    fn replace_shares(
        &self,
        user_id: &str,
        server_share: Share,
        recovery_share: Share,
    ) -> Result<WalletRecord, StorageError> {
        self.swap_shares(user_id, None, server_share, recovery_share)
    }

    fn replace_shares_if(
        &self,
        user_id: &str,
        expected_generation: u32,
        server_share: Share,
        recovery_share: Share,
    ) -> Result<WalletRecord, StorageError> {
        self.swap_shares(user_id, Some(expected_generation), server_share, recovery_share)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shares::{generate_key_pair, split};

    fn tracked_locks(store: &FileShareStore) -> usize {
        store.locks.lock().unwrap().len()
    }

    #[test]
    fn test_user_locks_are_released() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileShareStore::new_with_base_dir(temp_dir.path().to_path_buf());
        let (address, key) = generate_key_pair().unwrap();

        for i in 0..50 {
            let set = split(key.as_bytes()).unwrap();
            let missing = store.replace_shares(&format!("ghost-{}", i), set.server, set.recovery);
            assert!(matches!(missing, Err(StorageError::NotFound(_))));
        }
        assert_eq!(tracked_locks(&store), 0);

        let set = split(key.as_bytes()).unwrap();
        store.create("alice", address, set.server, set.recovery).unwrap();
        let set = split(key.as_bytes()).unwrap();
        store.replace_shares_if("alice", 1, set.server, set.recovery).unwrap();
        let set = split(key.as_bytes()).unwrap();
        assert!(store.replace_shares_if("alice", 1, set.server, set.recovery).is_err());
        assert_eq!(tracked_locks(&store), 0);
    }

    #[test]
    fn test_concurrent_rotations_release_their_locks() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileShareStore::new_with_base_dir(temp_dir.path().to_path_buf());
        let (address, key) = generate_key_pair().unwrap();
        let set = split(key.as_bytes()).unwrap();
        store.create("bob", address, set.server, set.recovery).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let set = split(key.as_bytes()).unwrap();
                std::thread::spawn(move || store.replace_shares("bob", set.server, set.recovery))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(store.get("bob").unwrap().generation, 9);
        assert_eq!(tracked_locks(&store), 0);
    }
}
