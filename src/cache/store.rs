use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use secrecy::SecretString;
use tokio::io::AsyncWriteExt;

use crate::cache::backend::{CacheBackend, InMemoryBackend, RedbBackend};
use crate::cache::entry::{fingerprint, CacheEntry};
use crate::cache::remote::RemoteCacheClient;
use crate::error::{CacheError, CacheRemoteError};
use crate::observability::{NoopObserver, Observer, ObserverEvent};

/// Mapping from fingerprint to [`CacheEntry`], backed by either an
/// in-memory map or an on-disk key-value store, with deferred-write and
/// local<->remote reconciliation support.
///
/// See specification §3/§4.2 for the full contract.
pub struct Cache {
    backend: Box<dyn CacheBackend>,
    /// Entries produced in the current process (candidates for remote
    /// upload on session exit).
    new_entries: StdMutex<HashMap<String, CacheEntry>>,
    /// Entries staged for commit at session exit when `immediate_write` is
    /// false. Never consulted by `fetch` — see specification §9 Open
    /// Question (c).
    deferred_entries: StdMutex<HashMap<String, CacheEntry>>,
    immediate_write: bool,
    remote: Option<RemoteCacheClient>,
    remote_backups: bool,
    observer: Arc<dyn Observer>,
}

impl Cache {
    pub fn new(backend: Box<dyn CacheBackend>, immediate_write: bool) -> Self {
        Self {
            backend,
            new_entries: StdMutex::new(HashMap::new()),
            deferred_entries: StdMutex::new(HashMap::new()),
            immediate_write,
            remote: None,
            remote_backups: false,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn in_memory(immediate_write: bool) -> Self {
        Self::new(Box::new(InMemoryBackend::new()), immediate_write)
    }

    pub fn on_disk(path: &Path, immediate_write: bool) -> Result<Self, CacheError> {
        Ok(Self::new(Box::new(RedbBackend::open(path)?), immediate_write))
    }

    pub fn with_remote(mut self, base_url: impl Into<String>, api_key: Option<SecretString>, remote_backups: bool) -> Self {
        self.remote = Some(RemoteCacheClient::new(base_url, api_key));
        self.remote_backups = remote_backups;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Recompute the fingerprint and return the stored output, or `None` on
    /// a miss. Never fails — remote/backend errors surface as a miss and are
    /// logged (specification §4.2: "Fetch never raises").
    pub fn fetch(
        &self,
        model: &str,
        parameters: &str,
        system_prompt: &str,
        user_prompt: &str,
        iteration: u32,
    ) -> Option<String> {
        let fp = fingerprint(model, parameters, system_prompt, user_prompt, iteration);
        match self.backend.get(&fp) {
            Ok(Some(entry)) => {
                self.observer.record_event(&ObserverEvent::CacheHit {
                    fingerprint: fp.clone(),
                });
                Some(entry.output)
            }
            Ok(None) => {
                self.observer.record_event(&ObserverEvent::CacheMiss {
                    fingerprint: fp.clone(),
                });
                None
            }
            Err(e) => {
                tracing::warn!(fingerprint = %fp, error = %e, "cache backend read failed; treating as miss");
                None
            }
        }
    }

    /// Build and record a [`CacheEntry`]. Always recorded in `new_entries`;
    /// committed to the backend immediately iff `immediate_write`, else
    /// staged in `deferred_entries` until session exit.
    pub fn store(
        &self,
        model: &str,
        parameters: &str,
        system_prompt: &str,
        user_prompt: &str,
        response: &str,
        iteration: u32,
        timestamp: i64,
    ) -> Result<String, CacheError> {
        let entry = CacheEntry::new(
            model,
            parameters,
            system_prompt,
            user_prompt,
            response,
            iteration,
            timestamp,
        );
        let fp = entry.fingerprint();

        self.new_entries
            .lock()
            .unwrap()
            .insert(fp.clone(), entry.clone());

        if self.immediate_write {
            self.backend.set(&fp, &entry)?;
        } else {
            self.deferred_entries
                .lock()
                .unwrap()
                .insert(fp.clone(), entry);
        }

        self.observer.record_event(&ObserverEvent::CacheStore {
            fingerprint: fp.clone(),
            immediate: self.immediate_write,
        });

        Ok(fp)
    }

    /// Bulk-add entries. Fails with [`CacheError::KeyConflict`] for any
    /// incoming key that already exists in the backend with a different
    /// entry. The conflicting add as a whole fails (no partial commit for
    /// that call), matching the original's "Mismatch in values" behavior.
    pub fn add_from_dict(
        &self,
        incoming: HashMap<String, CacheEntry>,
        write_now: bool,
    ) -> Result<(), CacheError> {
        // Validate before writing anything, so a conflict never leaves a
        // partially-applied batch behind.
        for (key, value) in &incoming {
            if let Some(existing) = self.backend.get(key)? {
                if &existing != value {
                    return Err(CacheError::KeyConflict {
                        fingerprint: key.clone(),
                    });
                }
            }
        }

        for (key, value) in incoming {
            self.new_entries.lock().unwrap().insert(key.clone(), value.clone());
            if write_now {
                self.backend.set(&key, &value)?;
            } else {
                self.deferred_entries.lock().unwrap().insert(key, value);
            }
        }
        Ok(())
    }

    pub fn new_entries(&self) -> HashMap<String, CacheEntry> {
        self.new_entries.lock().unwrap().clone()
    }

    pub fn deferred_entries(&self) -> HashMap<String, CacheEntry> {
        self.deferred_entries.lock().unwrap().clone()
    }

    pub fn len(&self) -> Result<usize, CacheError> {
        self.backend.len()
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }

    pub fn all(&self) -> Result<HashMap<String, CacheEntry>, CacheError> {
        self.backend.all()
    }

    /// Two caches are equal iff they have the same fingerprint *set*,
    /// regardless of any differences in entry contents (matches the
    /// original's `__eq__`).
    pub fn key_set_eq(&self, other: &Cache) -> Result<bool, CacheError> {
        let mine: std::collections::BTreeSet<String> = self.all()?.into_keys().collect();
        let theirs: std::collections::BTreeSet<String> = other.all()?.into_keys().collect();
        Ok(mine == theirs)
    }

    pub async fn write_jsonl(&self, path: &Path) -> Result<(), CacheError> {
        let mut file = tokio::fs::File::create(path).await?;
        for (fp, entry) in self.all()? {
            let line = serde_json::to_string(&serde_json::json!({ fp: entry }))?;
            file.write_all(line.as_bytes()).await?;
            file.write_all(b"\n").await?;
        }
        Ok(())
    }

    pub async fn from_jsonl(path: &Path, immediate_write: bool) -> Result<Self, CacheError> {
        let contents = tokio::fs::read_to_string(path).await?;
        let mut map = HashMap::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let obj: HashMap<String, CacheEntry> = serde_json::from_str(line)?;
            map.extend(obj);
        }
        Ok(Self::new(Box::new(InMemoryBackend::from_map(map)), immediate_write))
    }

    /// Exports the current contents into a fresh on-disk backend.
    pub fn write_kv_store(&self, path: &Path) -> Result<(), CacheError> {
        let backend = RedbBackend::open(path)?;
        for (fp, entry) in self.all()? {
            backend.set(&fp, &entry)?;
        }
        Ok(())
    }

    pub fn from_kv_store(path: &Path, immediate_write: bool) -> Result<Self, CacheError> {
        Ok(Self::new(Box::new(RedbBackend::open(path)?), immediate_write))
    }

    /// `GET {EXPECTED_PARROT_CACHE_URL}/items/all` and build an in-memory
    /// cache from the response.
    pub async fn from_remote(
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
        immediate_write: bool,
    ) -> Result<Self, CacheRemoteError> {
        let client = RemoteCacheClient::new(base_url, api_key);
        let map = client.get_all().await?;
        Ok(Self::new(Box::new(InMemoryBackend::from_map(map)), immediate_write))
    }

    /// Fetch entries present remotely but missing locally and merge them in
    /// (best-effort; errors are logged, never fatal per specification §4.2).
    async fn session_enter(&self) {
        let Some(remote) = &self.remote else {
            return;
        };
        if !self.remote_backups {
            return;
        }
        match remote.get_all().await {
            Ok(remote_entries) => {
                let existing = match self.all() {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to read local cache during session enter");
                        return;
                    }
                };
                let missing: HashMap<String, CacheEntry> = remote_entries
                    .into_iter()
                    .filter(|(k, _)| !existing.contains_key(k))
                    .collect();
                if let Err(e) = self.add_from_dict(missing, true) {
                    tracing::warn!(error = %e, "failed to merge remote cache entries on session enter");
                }
            }
            Err(e) => {
                self.observer.record_event(&ObserverEvent::CacheRemoteSyncFailed {
                    reason: e.to_string(),
                });
                tracing::warn!(error = %e, "remote cache fetch-on-enter failed; continuing locally");
            }
        }
    }

    /// Commits `deferred_entries` into the backend unconditionally, then
    /// best-effort uploads `new_entries` to the remote when configured.
    /// Guaranteed to run by [`Cache::run_session`] on every exit path,
    /// including when the session body returns an error.
    async fn session_exit(&self) {
        let deferred: HashMap<String, CacheEntry> =
            self.deferred_entries.lock().unwrap().drain().collect();
        for (fp, entry) in &deferred {
            if let Err(e) = self.backend.set(fp, entry) {
                tracing::warn!(fingerprint = %fp, error = %e, "failed to commit deferred cache entry on session exit");
            }
        }

        if let Some(remote) = &self.remote {
            if self.remote_backups {
                let new_entries = self.new_entries();
                if let Err(e) = remote.post_batch(&new_entries).await {
                    self.observer.record_event(&ObserverEvent::CacheRemoteSyncFailed {
                        reason: e.to_string(),
                    });
                    tracing::warn!(error = %e, "remote cache upload on session exit failed; local state is still committed");
                }
            }
        }
    }

    /// Runs `body` within a cache session: entering may pull missing
    /// entries from the remote cache; exiting always commits
    /// `deferred_entries` and (best-effort) uploads `new_entries`, even if
    /// `body` returns an error.
    pub async fn run_session<F, Fut, T>(self: Arc<Self>, body: F) -> Result<T, CacheError>
    where
        F: FnOnce(Arc<Self>) -> Fut,
        Fut: std::future::Future<Output = Result<T, CacheError>>,
    {
        self.session_enter().await;
        let result = body(self.clone()).await;
        self.session_exit().await;
        result
    }
}
