//! Local device storage
//!
//! Small key-value persistence for UI preference flags. Values are stored as
//! JSON strings. [`Preferences`] is the typed facade screens use; its writes
//! are fire and forget: failures are logged and dropped.

use crate::config::Deployment;
use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Key-value device storage
#[async_trait]
pub trait LocalStorage: Send + Sync {
    /// Raw value for `key`
    async fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store raw value
    async fn set_raw(&self, key: &str, value: String) -> Result<(), StorageError>;

    /// Remove `key`
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

impl dyn LocalStorage {
    /// Typed value for `key`
    ///
    /// # Errors
    /// Returns error on storage failure or if the value does not decode
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.get_raw(key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| StorageError::Decode {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Store typed value
    ///
    /// # Errors
    /// Returns error on storage failure or if the value does not encode
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)?;
        self.set_raw(key, raw).await
    }
}

/// In-memory storage
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: DashMap<String, String>,
}

impl MemoryStorage {
    /// Create empty storage
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether storage is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl LocalStorage for MemoryStorage {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn set_raw(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Storage backed by one JSON document on disk
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    document: Mutex<Option<BTreeMap<String, String>>>,
}

impl FileStorage {
    /// File name inside the storage directory
    pub const FILE_NAME: &'static str = "storage.json";

    /// Storage in `dir`
    #[must_use]
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::at(dir.as_ref().join(Self::FILE_NAME))
    }

    /// Storage at exactly `path`
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            document: Mutex::new(None),
        }
    }

    /// Backing file
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(text) => serde_json::from_str(&text).map_err(|source| StorageError::Decode {
                key: self.path.display().to_string(),
                source,
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn persist(&self, document: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(document)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn with_document<R>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> (R, bool) + Send,
    ) -> Result<R, StorageError> {
        let mut guard = self.document.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        let document = guard.get_or_insert_with(BTreeMap::new);
        let (result, dirty) = f(document);
        if dirty {
            self.persist(document).await?;
        }
        Ok(result)
    }
}

#[async_trait]
impl LocalStorage for FileStorage {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.with_document(|document| (document.get(key).cloned(), false))
            .await
    }

    async fn set_raw(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.with_document(|document| {
            document.insert(key.to_string(), value);
            ((), true)
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.with_document(|document| ((), document.remove(key).is_some()))
            .await
    }
}

/// Where the user is in onboarding
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingProgress {
    /// Last completed step
    pub step: u32,
    /// Finished
    pub completed: bool,
    /// Last change
    pub updated_at: Option<DateTime<Utc>>,
}

/// Typed preference keys over [`LocalStorage`]
#[derive(Clone)]
pub struct Preferences {
    storage: Arc<dyn LocalStorage>,
    writes: Arc<Mutex<()>>,
}

impl Preferences {
    /// Dismissed banner ids
    pub const DISMISSED_BANNERS: &'static str = "dismissedBanners";
    /// Last chosen deployment
    pub const REMEMBERED_ENVIRONMENT: &'static str = "rememberedEnvironment";
    /// Onboarding state
    pub const ONBOARDING_PROGRESS: &'static str = "onboardingProgress";

    /// Preferences over `storage`
    #[must_use]
    pub fn new(storage: Arc<dyn LocalStorage>) -> Self {
        Self {
            storage,
            writes: Arc::new(Mutex::new(())),
        }
    }

    /// Backing storage
    #[inline]
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn LocalStorage> {
        &self.storage
    }

    async fn read<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        match self.storage.get::<T>(key).await {
            Ok(value) => value.unwrap_or_default(),
            Err(err) => {
                tracing::warn!(key, error = %err, "failed to read preference");
                T::default()
            }
        }
    }

    /// Run `write` in the background, serialized with other writes
    fn spawn_write<F, Fut>(&self, key: &'static str, write: F) -> JoinHandle<()>
    where
        F: FnOnce(Arc<dyn LocalStorage>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<(), StorageError>> + Send,
    {
        let storage = Arc::clone(&self.storage);
        let writes = Arc::clone(&self.writes);
        tokio::spawn(async move {
            let _serialized = writes.lock().await;
            if let Err(err) = write(storage).await {
                tracing::warn!(key, error = %err, "failed to write preference");
            }
        })
    }

    /// Dismissed banner ids
    pub async fn dismissed_banners(&self) -> BTreeSet<String> {
        self.read(Self::DISMISSED_BANNERS).await
    }

    /// Whether banner `id` was dismissed
    pub async fn is_banner_dismissed(&self, id: &str) -> bool {
        self.dismissed_banners().await.contains(id)
    }

    /// Remember that banner `id` was dismissed
    pub fn dismiss_banner(&self, id: impl Into<String>) -> JoinHandle<()> {
        let id = id.into();
        self.spawn_write(Self::DISMISSED_BANNERS, move |storage| async move {
            let mut banners = storage
                .get::<BTreeSet<String>>(Self::DISMISSED_BANNERS)
                .await
                .ok()
                .flatten()
                .unwrap_or_default();
            banners.insert(id);
            storage.set(Self::DISMISSED_BANNERS, &banners).await
        })
    }

    /// Last chosen deployment
    pub async fn remembered_environment(&self) -> Option<Deployment> {
        self.read(Self::REMEMBERED_ENVIRONMENT).await
    }

    /// Remember the chosen deployment
    pub fn remember_environment(&self, environment: Deployment) -> JoinHandle<()> {
        self.spawn_write(Self::REMEMBERED_ENVIRONMENT, move |storage| async move {
            storage.set(Self::REMEMBERED_ENVIRONMENT, &environment).await
        })
    }

    /// Onboarding state
    pub async fn onboarding_progress(&self) -> OnboardingProgress {
        self.read(Self::ONBOARDING_PROGRESS).await
    }

    /// Record onboarding state
    pub fn set_onboarding_progress(&self, step: u32, completed: bool) -> JoinHandle<()> {
        let progress = OnboardingProgress {
            step,
            completed,
            updated_at: Some(Utc::now()),
        };
        self.spawn_write(Self::ONBOARDING_PROGRESS, move |storage| async move {
            storage.set(Self::ONBOARDING_PROGRESS, &progress).await
        })
    }

    /// Drop per-user flags (logout); the remembered environment stays
    pub fn clear_user_flags(&self) -> JoinHandle<()> {
        self.spawn_write(Self::DISMISSED_BANNERS, |storage| async move {
            storage.remove(Self::DISMISSED_BANNERS).await?;
            storage.remove(Self::ONBOARDING_PROGRESS).await
        })
    }
}

impl std::fmt::Debug for Preferences {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preferences").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Storage whose every call fails
    struct Broken;

    #[async_trait]
    impl LocalStorage for Broken {
        async fn get_raw(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(std::io::Error::other("disk gone").into())
        }

        async fn set_raw(&self, _key: &str, _value: String) -> Result<(), StorageError> {
            Err(std::io::Error::other("disk gone").into())
        }

        async fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(std::io::Error::other("disk gone").into())
        }
    }

    #[tokio::test]
    async fn memory_typed_roundtrip() {
        let storage: Arc<dyn LocalStorage> = Arc::new(MemoryStorage::new());
        storage.set("count", &3u32).await.unwrap();
        assert_eq!(storage.get::<u32>("count").await.unwrap(), Some(3));
        storage.remove("count").await.unwrap();
        assert_eq!(storage.get::<u32>("count").await.unwrap(), None);
    }

    #[tokio::test]
    async fn undecodable_values_are_errors() {
        let storage: Arc<dyn LocalStorage> = Arc::new(MemoryStorage::new());
        storage.set_raw("count", "not json".into()).await.unwrap();
        assert!(matches!(
            storage.get::<u32>("count").await,
            Err(StorageError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn file_storage_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage: Arc<dyn LocalStorage> = Arc::new(FileStorage::in_dir(dir.path()));
            storage.set("theme", "dark").await.unwrap();
        }
        let storage: Arc<dyn LocalStorage> = Arc::new(FileStorage::in_dir(dir.path()));
        assert_eq!(storage.get::<String>("theme").await.unwrap().as_deref(), Some("dark"));
    }

    #[tokio::test]
    async fn preferences_roundtrip() {
        let preferences = Preferences::new(Arc::new(MemoryStorage::new()));
        preferences.dismiss_banner("welcome").await.unwrap();
        preferences.dismiss_banner("mint").await.unwrap();
        preferences.remember_environment(Deployment::Development).await.unwrap();
        preferences.set_onboarding_progress(2, false).await.unwrap();

        assert!(preferences.is_banner_dismissed("welcome").await);
        assert_eq!(preferences.dismissed_banners().await.len(), 2);
        assert_eq!(preferences.remembered_environment().await, Some(Deployment::Development));
        assert_eq!(preferences.onboarding_progress().await.step, 2);

        preferences.clear_user_flags().await.unwrap();
        assert!(preferences.dismissed_banners().await.is_empty());
        assert_eq!(preferences.remembered_environment().await, Some(Deployment::Development));
    }

    #[tokio::test]
    async fn preference_failures_are_swallowed() {
        let preferences = Preferences::new(Arc::new(Broken));
        // write task completes without panicking or surfacing the error
        preferences.dismiss_banner("welcome").await.unwrap();
        assert!(preferences.dismissed_banners().await.is_empty());
        assert_eq!(preferences.remembered_environment().await, None);
    }
}
