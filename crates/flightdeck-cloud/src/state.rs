//! File-backed entity store
//!
//! Keeps the domain/cluster registry in `.flightdeck/registry.json` for
//! operators running without a shared table service. Reads and writes both
//! hold `lock.json`, which is created exclusively, so concurrent invocations
//! on the same host serialise their conditional updates. A writer that finds
//! the lock held backs off and tries again until the wait limit runs out.

use crate::error::{CloudError, Result};
use crate::store::{ClusterEntity, DomainEntity, EntityStore, Registry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".flightdeck";
const STATE_FILE: &str = "registry.json";
const STATE_TEMP: &str = "registry.json.tmp";
const STATE_BACKUP: &str = "registry.json.backup";
const LOCK_FILE: &str = "lock.json";

/// Locks older than this belong to a crashed invocation
const STALE_LOCK_AGE: Duration = Duration::from_secs(60);
/// How long to wait for a held lock before giving up
const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(30);
const LOCK_BACKOFF_START: Duration = Duration::from_millis(5);
const LOCK_BACKOFF_MAX: Duration = Duration::from_millis(250);

/// On-disk registry document
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryFile {
    version: u32,
    updated_at: DateTime<Utc>,
    #[serde(flatten)]
    registry: Registry,
}

impl Default for RegistryFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            registry: Registry::default(),
        }
    }
}

/// Entity store persisted as a JSON file
pub struct LocalEntityStore {
    /// Directory holding `.flightdeck/`
    root: PathBuf,
    /// Serialises lock attempts within this process
    guard: Mutex<()>,
    lock_wait: Duration,
}

impl LocalEntityStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            guard: Mutex::new(()),
            lock_wait: DEFAULT_LOCK_WAIT,
        }
    }

    /// Override how long a held lock is waited for
    pub fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    fn temp_path(&self) -> PathBuf {
        self.state_dir().join(STATE_TEMP)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    async fn load(&self) -> Result<RegistryFile> {
        let path = self.state_path();
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("Registry file not found, starting empty");
                return Ok(RegistryFile::default());
            }
            Err(e) => return Err(e.into()),
        };
        let state: RegistryFile = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "Registry file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        Ok(state)
    }

    /// Write the registry beside the live file, keep the previous contents
    /// as a backup, then rename the new file into place.
    async fn save(&self, state: &mut RegistryFile) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let temp = self.temp_path();

        state.updated_at = Utc::now();
        let content = serde_json::to_string_pretty(state)?;
        let mut file = fs::File::create(&temp).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        if path.exists() {
            fs::copy(&path, self.backup_path()).await?;
        }
        fs::rename(&temp, &path).await?;

        tracing::debug!(
            domains = state.registry.domains.len(),
            clusters = state.registry.clusters.len(),
            "Saved registry"
        );
        Ok(())
    }

    /// Create `lock.json` exclusively, backing off while another holder has it
    async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();
        let started = Instant::now();
        let mut backoff = LOCK_BACKOFF_START;

        loop {
            let created = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
                .await;

            match created {
                Ok(mut file) => {
                    let lock = StateLock {
                        lock_path: lock_path.clone(),
                        released: false,
                    };
                    let info = LockInfo {
                        holder: lock_holder(),
                        acquired_at: Utc::now(),
                    };
                    file.write_all(serde_json::to_string_pretty(&info)?.as_bytes())
                        .await?;
                    return Ok(lock);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }

            if let Some(holder) = self.stale_holder(&lock_path).await {
                tracing::warn!("Removing stale registry lock from {}", holder);
                match fs::remove_file(&lock_path).await {
                    Ok(()) => continue,
                    Err(e) if e.kind() == ErrorKind::NotFound => continue,
                    Err(e) => return Err(e.into()),
                }
            }

            if started.elapsed() >= self.lock_wait {
                let holder = read_lock_info(&lock_path)
                    .await
                    .map(|info| format!("{} since {}", info.holder, info.acquired_at))
                    .unwrap_or_else(|| "another invocation".to_string());
                return Err(CloudError::LockError(format!(
                    "Registry is locked by {}",
                    holder
                )));
            }

            tracing::trace!(?backoff, "Registry lock held, waiting");
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(LOCK_BACKOFF_MAX);
        }
    }

    /// Holder of the lock at `path` if it is old enough to be abandoned
    async fn stale_holder(&self, path: &Path) -> Option<String> {
        if let Some(info) = read_lock_info(path).await {
            let age = Utc::now().signed_duration_since(info.acquired_at);
            return (age.num_seconds() >= STALE_LOCK_AGE.as_secs() as i64).then_some(info.holder);
        }
        // Unreadable locks may be mid-write; judge them by modification time
        let modified = fs::metadata(path).await.ok()?.modified().ok()?;
        let age = SystemTime::now().duration_since(modified).ok()?;
        (age >= STALE_LOCK_AGE).then(|| "an unknown holder".to_string())
    }

    /// Run a read-modify-write cycle under the lock
    async fn update<T>(&self, f: impl FnOnce(&mut Registry) -> Result<T>) -> Result<T> {
        let _guard = self.guard.lock().await;
        let lock = self.acquire_lock().await?;
        let mut state = self.load().await?;
        let result = f(&mut state.registry);
        if result.is_ok() {
            self.save(&mut state).await?;
        }
        lock.release().await?;
        result
    }

    async fn read(&self) -> Result<Registry> {
        let _guard = self.guard.lock().await;
        let lock = self.acquire_lock().await?;
        let state = self.load().await?;
        lock.release().await?;
        Ok(state.registry)
    }
}

fn lock_holder() -> String {
    let host = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("HOST"))
        .unwrap_or_else(|_| "unknown".to_string());
    format!("{} (pid {})", host, std::process::id())
}

async fn read_lock_info(path: &Path) -> Option<LockInfo> {
    let content = fs::read_to_string(path).await.ok()?;
    serde_json::from_str(&content).ok()
}

#[async_trait]
impl EntityStore for LocalEntityStore {
    async fn ensure_tables(&self) -> Result<()> {
        self.ensure_state_dir().await
    }

    async fn put_domain(&self, domain: &DomainEntity) -> Result<()> {
        let domain = domain.clone();
        self.update(move |r| {
            r.domains.insert(domain.name.clone(), domain);
            Ok(())
        })
        .await
    }

    async fn get_domain(&self, name: &str) -> Result<Option<DomainEntity>> {
        Ok(self.read().await?.domains.remove(name))
    }

    async fn delete_domain(&self, name: &str) -> Result<()> {
        self.update(|r| {
            r.domains.remove(name);
            Ok(())
        })
        .await
    }

    async fn set_domain_prefix(&self, name: &str, prefix: &str) -> Result<()> {
        self.update(|r| {
            r.set_prefix(name, prefix);
            Ok(())
        })
        .await
    }

    async fn add_net_booking(&self, domain: &str, index: u8) -> Result<()> {
        self.update(|r| r.add_booking(domain, index)).await
    }

    async fn remove_net_booking(&self, domain: &str, index: u8) -> Result<()> {
        self.update(|r| r.remove_booking(domain, index)).await
    }

    async fn put_cluster(&self, cluster: &ClusterEntity) -> Result<()> {
        let cluster = cluster.clone();
        self.update(move |r| {
            r.clusters.insert(cluster.name.clone(), cluster);
            Ok(())
        })
        .await
    }

    async fn get_cluster(&self, name: &str) -> Result<Option<ClusterEntity>> {
        Ok(self.read().await?.clusters.remove(name))
    }

    async fn delete_cluster(&self, name: &str) -> Result<()> {
        self.update(|r| {
            r.clusters.remove(name);
            Ok(())
        })
        .await
    }

    async fn add_group_count(&self, name: &str, delta: i64) -> Result<()> {
        self.update(|r| {
            r.add_group_count(name, delta);
            Ok(())
        })
        .await
    }
}

/// Lock information
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for the registry lock
struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    async fn release(mut self) -> Result<()> {
        if !self.released {
            self.released = true;
            match fs::remove_file(&self.lock_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_registry_save_load() {
        let temp_dir = tempdir().unwrap();
        let store = LocalEntityStore::new(temp_dir.path());

        store
            .put_domain(&DomainEntity::new("lab", "lab"))
            .await
            .unwrap();
        store.add_net_booking("lab", 0).await.unwrap();
        store.add_net_booking("lab", 5).await.unwrap();

        let reopened = LocalEntityStore::new(temp_dir.path());
        let domain = reopened.get_domain("lab").await.unwrap().unwrap();
        assert_eq!(domain.net_bookings.into_iter().collect::<Vec<_>>(), vec![0, 5]);
        assert!(temp_dir.path().join(".flightdeck/registry.json.backup").exists());
        assert!(!temp_dir.path().join(".flightdeck/lock.json").exists());
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let temp_dir = tempdir().unwrap();
        let store = LocalEntityStore::new(temp_dir.path());

        assert!(store.get_domain("missing").await.unwrap().is_none());
        assert!(store.get_cluster("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_condition_leaves_file_untouched() {
        let temp_dir = tempdir().unwrap();
        let store = LocalEntityStore::new(temp_dir.path());
        store
            .put_domain(&DomainEntity::new("lab", "lab"))
            .await
            .unwrap();

        let err = store.remove_net_booking("lab", 9).await.unwrap_err();
        assert!(matches!(err, CloudError::ConditionFailed(_)));
        assert!(!temp_dir.path().join(".flightdeck/lock.json").exists());
    }

    fn write_lock(dir: &Path, acquired_at: DateTime<Utc>) {
        let lock = LockInfo {
            holder: "other-host".into(),
            acquired_at,
        };
        std::fs::write(
            dir.join(".flightdeck/lock.json"),
            serde_json::to_string(&lock).unwrap(),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_held_lock_is_waited_for() {
        let temp_dir = tempdir().unwrap();
        let store = LocalEntityStore::new(temp_dir.path());
        store.ensure_tables().await.unwrap();
        write_lock(temp_dir.path(), Utc::now());

        let lock_path = temp_dir.path().join(".flightdeck/lock.json");
        let holder = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            std::fs::remove_file(lock_path).unwrap();
        });

        store
            .put_domain(&DomainEntity::new("lab", "lab"))
            .await
            .unwrap();
        holder.await.unwrap();
        assert!(store.get_domain("lab").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_held_lock_times_out() {
        let temp_dir = tempdir().unwrap();
        let store =
            LocalEntityStore::new(temp_dir.path()).with_lock_wait(Duration::from_millis(50));
        store.ensure_tables().await.unwrap();
        write_lock(temp_dir.path(), Utc::now());

        let err = store
            .put_domain(&DomainEntity::new("lab", "lab"))
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::LockError(ref m) if m.contains("other-host")));
        assert!(temp_dir.path().join(".flightdeck/lock.json").exists());
    }

    #[tokio::test]
    async fn test_stale_lock_is_reclaimed() {
        let temp_dir = tempdir().unwrap();
        let store = LocalEntityStore::new(temp_dir.path());
        store.ensure_tables().await.unwrap();
        write_lock(temp_dir.path(), Utc::now() - chrono::Duration::minutes(5));

        store
            .put_domain(&DomainEntity::new("lab", "lab"))
            .await
            .unwrap();
        assert!(!temp_dir.path().join(".flightdeck/lock.json").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stores_sharing_a_directory_book_each_index_once() {
        let temp_dir = tempdir().unwrap();
        let first = Arc::new(LocalEntityStore::new(temp_dir.path()));
        let second = Arc::new(LocalEntityStore::new(temp_dir.path()));
        let watcher = Arc::new(LocalEntityStore::new(temp_dir.path()));
        first
            .put_domain(&DomainEntity::new("base", "base"))
            .await
            .unwrap();

        let running = Arc::new(AtomicBool::new(true));
        let reader = {
            let running = running.clone();
            tokio::spawn(async move {
                let mut reads = 0u32;
                while running.load(Ordering::SeqCst) {
                    // A write in progress never hides the registry
                    assert!(watcher.get_domain("base").await.unwrap().is_some());
                    reads += 1;
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
                reads
            })
        };

        for round in 0..40 {
            let domain = format!("lab{}", round);
            let a = {
                let store = first.clone();
                let domain = domain.clone();
                tokio::spawn(async move { store.add_net_booking(&domain, 0).await })
            };
            let b = {
                let store = second.clone();
                let domain = domain.clone();
                tokio::spawn(async move { store.add_net_booking(&domain, 0).await })
            };
            let results = [a.await.unwrap(), b.await.unwrap()];

            let won = results.iter().filter(|r| r.is_ok()).count();
            assert_eq!(won, 1, "round {}: {:?}", round, results);
            assert!(results
                .iter()
                .any(|r| matches!(r, Err(CloudError::ConditionFailed(_)))));
        }

        running.store(false, Ordering::SeqCst);
        assert!(reader.await.unwrap() > 0);
        assert!(!temp_dir.path().join(".flightdeck/lock.json").exists());
        assert!(!temp_dir.path().join(".flightdeck/registry.json.tmp").exists());
    }
}
