//! Disk-backed cache of the organization tree.
//!
//! One record per (master account, access role) pair. A record older than the
//! TTL is treated exactly like a missing one: the caller reloads from the
//! organizations API and replaces the whole record. Records are never patched
//! in place.
//!
//! The store is injected into `Org` instead of being a process-wide file path,
//! so tests and embedders can use [`MemoryCacheStore`] or a temporary directory.

use super::model::OrgRecord;
use anyhow::{Context, Result};
use fs2::FileExt;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::debug;

/// Records older than this are stale
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Identity of one cache slot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub master_account_id: String,
    pub access_role: String,
}

impl CacheKey {
    pub fn new(master_account_id: &str, access_role: &str) -> Self {
        Self {
            master_account_id: master_account_id.to_string(),
            access_role: access_role.to_string(),
        }
    }

    /// Deterministic file name; role paths (`service-role/Foo`) are flattened
    pub fn file_name(&self) -> String {
        let role: String = self
            .access_role
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' => '_',
                c => c,
            })
            .collect();
        format!("{}-{}.json", self.master_account_id, role)
    }
}

/// Why a cache read produced nothing usable. Every variant means "reload".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheMiss {
    #[error("Cache file not found")]
    NotFound,
    #[error("Cache file too old")]
    TooOld { age: Duration },
    #[error("Cache file unreadable: {0}")]
    Unreadable(String),
}

/// Storage for organization snapshots
pub trait OrgCacheStore: Send + Sync {
    /// Fresh record for `key`, or the reason there is none
    fn read(&self, key: &CacheKey) -> std::result::Result<OrgRecord, CacheMiss>;

    /// Replace the record for `key`
    fn write(&self, key: &CacheKey, record: &OrgRecord) -> Result<()>;
}

fn check_age(written: SystemTime, ttl: Duration) -> std::result::Result<(), CacheMiss> {
    // A timestamp in the future (clock skew) counts as fresh
    let age = written.elapsed().unwrap_or(Duration::ZERO);
    if age >= ttl {
        Err(CacheMiss::TooOld { age })
    } else {
        Ok(())
    }
}

/// JSON files in a directory, staleness from the file modification time
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    dir: PathBuf,
    ttl: Duration,
}

impl FileCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ttl: DEFAULT_CACHE_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Store under the platform cache directory (`~/.cache/orgcrawler` on Linux)
    pub fn default_location() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("com", "", "orgcrawler")
            .context("Could not determine a home directory for the organization cache")?;
        Ok(Self::new(dirs.cache_dir()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }
}

impl OrgCacheStore for FileCacheStore {
    fn read(&self, key: &CacheKey) -> std::result::Result<OrgRecord, CacheMiss> {
        let path = self.path_for(key);
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(CacheMiss::NotFound),
            Err(e) => return Err(CacheMiss::Unreadable(e.to_string())),
        };

        let modified = metadata
            .modified()
            .map_err(|e| CacheMiss::Unreadable(e.to_string()))?;
        check_age(modified, self.ttl)?;

        let contents = fs::read(&path).map_err(|e| CacheMiss::Unreadable(e.to_string()))?;
        let record: OrgRecord = serde_json::from_slice(&contents)
            .map_err(|e| CacheMiss::Unreadable(format!("{}: {}", path.display(), e)))?;

        debug!("Cache hit for {:?} at {:?}", key, path);
        Ok(record)
    }

    fn write(&self, key: &CacheKey, record: &OrgRecord) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create cache directory {:?}", self.dir))?;

        let path = self.path_for(key);
        let lock_path = path.with_extension("lock");
        let lock = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to open cache lock {:?}", lock_path))?;
        lock.lock_exclusive()
            .with_context(|| format!("Failed to lock {:?}", lock_path))?;

        let result = (|| -> Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
                .context("Failed to create temporary cache file")?;
            serde_json::to_writer_pretty(&mut tmp, record)
                .context("Failed to serialize organization record")?;
            tmp.flush()?;
            tmp.persist(&path)
                .with_context(|| format!("Failed to move cache file into {:?}", path))?;
            Ok(())
        })();

        // The exclusive lock is released when `lock` is dropped
        drop(lock);
        result?;

        debug!("Wrote organization cache to {:?}", path);
        Ok(())
    }
}

/// In-process store with the same staleness rule, keyed by write time
#[derive(Debug)]
pub struct MemoryCacheStore {
    ttl: Duration,
    records: Mutex<HashMap<CacheKey, (SystemTime, OrgRecord)>>,
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl MemoryCacheStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Insert a record as if it had been written at `written`
    pub fn insert_at(&self, key: &CacheKey, record: OrgRecord, written: SystemTime) {
        if let Ok(mut records) = self.records.lock() {
            records.insert(key.clone(), (written, record));
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.records
            .lock()
            .map(|records| records.contains_key(key))
            .unwrap_or(false)
    }
}

impl OrgCacheStore for MemoryCacheStore {
    fn read(&self, key: &CacheKey) -> std::result::Result<OrgRecord, CacheMiss> {
        let records = self
            .records
            .lock()
            .map_err(|e| CacheMiss::Unreadable(e.to_string()))?;
        let (written, record) = records.get(key).ok_or(CacheMiss::NotFound)?;
        check_age(*written, self.ttl)?;
        Ok(record.clone())
    }

    fn write(&self, key: &CacheKey, record: &OrgRecord) -> Result<()> {
        self.insert_at(key, record.clone(), SystemTime::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::org::model::{Account, OrganizationalUnit};
    use pretty_assertions::assert_eq;

    fn record() -> OrgRecord {
        OrgRecord {
            id: "o-exampleorg".to_string(),
            root_id: "r-exam".to_string(),
            master_account_id: "123456789012".to_string(),
            access_role: "OrgMasterRole".to_string(),
            accounts: vec![Account {
                organization_id: "o-exampleorg".to_string(),
                master_account_id: "123456789012".to_string(),
                name: "account01".to_string(),
                id: "210987654321".to_string(),
                parent_id: "ou-exam-00000001".to_string(),
                email: "account01@example.com".to_string(),
                aliases: vec![],
                credentials: None,
            }],
            org_units: vec![OrganizationalUnit {
                organization_id: "o-exampleorg".to_string(),
                master_account_id: "123456789012".to_string(),
                name: "ou01".to_string(),
                id: "ou-exam-00000001".to_string(),
                parent_id: "r-exam".to_string(),
            }],
        }
    }

    fn key() -> CacheKey {
        CacheKey::new("123456789012", "OrgMasterRole")
    }

    fn set_mtime(path: &Path, when: SystemTime) {
        let file = fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(when).unwrap();
    }

    #[test]
    fn test_file_name_is_deterministic() {
        assert_eq!(key().file_name(), "123456789012-OrgMasterRole.json");
        assert_eq!(
            CacheKey::new("123456789012", "service-role/Auditor").file_name(),
            "123456789012-service-role_Auditor.json"
        );
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path().join("nested"));

        assert_eq!(store.read(&key()), Err(CacheMiss::NotFound));

        store.write(&key(), &record()).unwrap();
        assert!(store.path_for(&key()).exists());
        assert_eq!(store.read(&key()).unwrap(), record());

        // A second write replaces the whole record
        let mut updated = record();
        updated.accounts.clear();
        store.write(&key(), &updated).unwrap();
        assert_eq!(store.read(&key()).unwrap(), updated);
    }

    #[test]
    fn test_file_store_staleness() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());
        store.write(&key(), &record()).unwrap();
        let path = store.path_for(&key());

        set_mtime(&path, SystemTime::now() - Duration::from_secs(3600));
        let miss = store.read(&key()).unwrap_err();
        assert!(matches!(miss, CacheMiss::TooOld { .. }));
        assert_eq!(miss.to_string(), "Cache file too old");

        set_mtime(&path, SystemTime::now() - Duration::from_secs(3500));
        assert_eq!(store.read(&key()).unwrap(), record());
    }

    #[test]
    fn test_file_store_corrupt_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());
        fs::write(store.path_for(&key()), b"{ not json").unwrap();
        assert!(matches!(store.read(&key()), Err(CacheMiss::Unreadable(_))));
    }

    #[test]
    fn test_file_store_releases_write_lock() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());
        store.write(&key(), &record()).unwrap();

        let lock_path = store.path_for(&key()).with_extension("lock");
        let lock = fs::OpenOptions::new().write(true).open(&lock_path).unwrap();
        lock.try_lock_exclusive().unwrap();
        drop(lock);

        // Another store on the same directory can write again
        let other = FileCacheStore::new(dir.path());
        other.write(&key(), &record()).unwrap();
        assert_eq!(store.read(&key()).unwrap(), record());
    }

    #[test]
    fn test_memory_store_staleness() {
        let store = MemoryCacheStore::new(Duration::from_secs(60));
        assert_eq!(store.read(&key()), Err(CacheMiss::NotFound));
        assert_eq!(CacheMiss::NotFound.to_string(), "Cache file not found");

        store.insert_at(&key(), record(), SystemTime::now() - Duration::from_secs(61));
        assert!(matches!(store.read(&key()), Err(CacheMiss::TooOld { .. })));

        store.write(&key(), &record()).unwrap();
        assert_eq!(store.read(&key()).unwrap(), record());
        assert!(!store.contains(&CacheKey::new("123456789012", "OtherRole")));
    }
}
