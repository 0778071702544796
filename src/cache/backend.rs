use std::collections::HashMap;
use std::path::Path;

use crate::cache::entry::CacheEntry;
use crate::error::CacheError;

/// Storage backend abstraction for [`crate::cache::Cache`]. Two
/// implementations are provided: an in-memory map and an on-disk
/// `redb`-backed key-value store.
pub trait CacheBackend: Send + Sync {
    fn get(&self, fingerprint: &str) -> Result<Option<CacheEntry>, CacheError>;
    fn set(&self, fingerprint: &str, entry: &CacheEntry) -> Result<(), CacheError>;
    fn all(&self) -> Result<HashMap<String, CacheEntry>, CacheError>;
    fn len(&self) -> Result<usize, CacheError>;
}

/// Plain in-memory backend. The default for tests and short-lived runs.
#[derive(Default)]
pub struct InMemoryBackend {
    data: std::sync::Mutex<HashMap<String, CacheEntry>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(data: HashMap<String, CacheEntry>) -> Self {
        Self {
            data: std::sync::Mutex::new(data),
        }
    }
}

impl CacheBackend for InMemoryBackend {
    fn get(&self, fingerprint: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.data.lock().unwrap().get(fingerprint).cloned())
    }

    fn set(&self, fingerprint: &str, entry: &CacheEntry) -> Result<(), CacheError> {
        self.data
            .lock()
            .unwrap()
            .insert(fingerprint.to_string(), entry.clone());
        Ok(())
    }

    fn all(&self) -> Result<HashMap<String, CacheEntry>, CacheError> {
        Ok(self.data.lock().unwrap().clone())
    }

    fn len(&self) -> Result<usize, CacheError> {
        Ok(self.data.lock().unwrap().len())
    }
}

const REDB_TABLE: redb::TableDefinition<&str, &[u8]> = redb::TableDefinition::new("cache");

/// On-disk backend over a single `redb` file, matching the specification's
/// "a single directory `.cache/` containing `data.db`" persisted layout.
pub struct RedbBackend {
    db: redb::Database,
}

impl RedbBackend {
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = redb::Database::create(path)
            .map_err(|e| CacheError::Backend(format!("failed to open redb database: {e}")))?;
        // Ensure the table exists.
        let write_txn = db
            .begin_write()
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        {
            let _ = write_txn
                .open_table(REDB_TABLE)
                .map_err(|e| CacheError::Backend(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(Self { db })
    }
}

impl CacheBackend for RedbBackend {
    fn get(&self, fingerprint: &str) -> Result<Option<CacheEntry>, CacheError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        let table = read_txn
            .open_table(REDB_TABLE)
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        match table
            .get(fingerprint)
            .map_err(|e| CacheError::Backend(e.to_string()))?
        {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes.value())?)),
            None => Ok(None),
        }
    }

    fn set(&self, fingerprint: &str, entry: &CacheEntry) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(entry)?;
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(REDB_TABLE)
                .map_err(|e| CacheError::Backend(e.to_string()))?;
            table
                .insert(fingerprint, bytes.as_slice())
                .map_err(|e| CacheError::Backend(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(())
    }

    fn all(&self) -> Result<HashMap<String, CacheEntry>, CacheError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        let table = read_txn
            .open_table(REDB_TABLE)
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        let mut out = HashMap::new();
        for entry in table
            .iter()
            .map_err(|e| CacheError::Backend(e.to_string()))?
        {
            let (k, v) = entry.map_err(|e| CacheError::Backend(e.to_string()))?;
            out.insert(k.value().to_string(), serde_json::from_slice(v.value())?);
        }
        Ok(out)
    }

    fn len(&self) -> Result<usize, CacheError> {
        Ok(self.all()?.len())
    }
}
