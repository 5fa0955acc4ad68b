//! # Ping Config Store
//!
//! Durable per-session reminder configuration. One record per
//! `(group, session)` identity, keyed by a pure function so the backing
//! medium stays swappable: JSON files on disk in production, an in-memory
//! map in tests and ephemeral runs.
//!
//! Unreadable records are treated exactly like absent ones. A corrupt file
//! costs that session its reminders; it never takes the service down.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{error, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use super::interval::Interval;

/// Storage key for one config record.
pub fn record_key(group_id: &str, game_id: &str) -> String {
    format!("{group_id}/{game_id}")
}

/// Reminder configuration for one session.
///
/// `last_ping` is seeded from the session's own last-activity time at
/// creation so a freshly enabled reminder does not fire immediately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingConfig {
    pub group_id: String,
    /// The session id; persisted as `sessionId`, also the game's channel.
    #[serde(rename = "sessionId")]
    pub game_id: String,
    pub enabled: bool,
    pub interval: Interval,
    pub last_ping: DateTime<Utc>,
}

impl PingConfig {
    pub fn new(
        group_id: impl Into<String>,
        game_id: impl Into<String>,
        interval: Interval,
        last_ping: DateTime<Utc>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            game_id: game_id.into(),
            enabled: true,
            interval,
            last_ping,
        }
    }

    pub fn with_last_ping(mut self, last_ping: DateTime<Utc>) -> Self {
        self.last_ping = last_ping;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn key(&self) -> String {
        record_key(&self.group_id, &self.game_id)
    }
}

/// Minimal key-value surface the config store runs on.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Prepare the backing medium. Called once at startup.
    async fn init(&self) -> Result<()>;

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    async fn keys(&self) -> Result<Vec<String>>;
}

/// One JSON file per record at `{root}/{group}/{session}.json`.
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

#[async_trait]
impl RecordStore for JsonFileStore {
    async fn init(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("cannot create config root {}", self.root.display()))
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("cannot read record {key}")),
        }
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write-then-rename so a crash mid-write never leaves a truncated
        // record in place.
        let tmp = path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("cannot persist record {key}"))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("cannot delete record {key}")),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut groups = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(e.into()),
        };

        while let Some(group_entry) = groups.next_entry().await? {
            if !group_entry.file_type().await?.is_dir() {
                continue;
            }
            let group_name = group_entry.file_name().to_string_lossy().into_owned();
            let mut records = tokio::fs::read_dir(group_entry.path()).await?;
            while let Some(record_entry) = records.next_entry().await? {
                let path = record_entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    keys.push(format!("{group_name}/{stem}"));
                }
            }
        }
        Ok(keys)
    }
}

/// DashMap-backed store for tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryStore {
    records: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.records.get(key).map(|r| r.clone()))
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.records.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.records.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.records.iter().map(|r| r.key().clone()).collect())
    }
}

/// CRUD over [`PingConfig`] records with the service's durability policy:
/// reads treat unparsable data as absent, mutations are best effort.
#[derive(Clone)]
pub struct PingStore {
    backend: Arc<dyn RecordStore>,
}

impl PingStore {
    pub fn new(backend: Arc<dyn RecordStore>) -> Self {
        Self { backend }
    }

    pub async fn init(&self) -> Result<()> {
        self.backend.init().await
    }

    pub async fn read(&self, group_id: &str, game_id: &str) -> Option<PingConfig> {
        let key = record_key(group_id, game_id);
        match self.backend.read(&key).await {
            Ok(Some(bytes)) => parse_config(&key, &bytes),
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read ping config {key}: {e}");
                None
            }
        }
    }

    /// Persist a brand-new record. Fails if one already exists.
    pub async fn insert_new(&self, config: &PingConfig) -> Result<()> {
        let key = config.key();
        if self.backend.read(&key).await?.is_some() {
            bail!("ping config already exists: {key}");
        }
        self.update(config).await
    }

    /// Full-record overwrite.
    pub async fn update(&self, config: &PingConfig) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(config)?;
        self.backend.write(&config.key(), &bytes).await
    }

    /// Idempotent delete.
    pub async fn delete(&self, group_id: &str, game_id: &str) -> Result<()> {
        self.backend.delete(&record_key(group_id, game_id)).await
    }

    /// All records that parse and are enabled. Anything unreadable is
    /// logged and skipped.
    pub async fn enabled_configs(&self) -> Vec<PingConfig> {
        let keys = match self.backend.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                error!("Failed to enumerate ping configs: {e}");
                return Vec::new();
            }
        };

        let mut configs = Vec::new();
        for key in keys {
            match self.backend.read(&key).await {
                Ok(Some(bytes)) => {
                    if let Some(config) = parse_config(&key, &bytes) {
                        if config.enabled {
                            configs.push(config);
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Failed to read ping config {key}: {e}"),
            }
        }
        configs
    }

    /// Refresh `last_ping`, keeping the in-memory view going if the write
    /// fails.
    pub async fn set_last_ping(&self, group_id: &str, game_id: &str, when: DateTime<Utc>) {
        if let Some(config) = self.read(group_id, game_id).await {
            if let Err(e) = self.update(&config.with_last_ping(when)).await {
                warn!("Failed to update lastPing for {group_id}/{game_id}: {e}");
            }
        }
    }

    /// Flip the enabled flag, best effort.
    pub async fn set_enabled(&self, group_id: &str, game_id: &str, enabled: bool) {
        if let Some(config) = self.read(group_id, game_id).await {
            if let Err(e) = self.update(&config.with_enabled(enabled)).await {
                warn!("Failed to update enabled flag for {group_id}/{game_id}: {e}");
            }
        }
    }
}

fn parse_config(key: &str, bytes: &[u8]) -> Option<PingConfig> {
    match serde_json::from_slice(bytes) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!("Ignoring unparsable ping config {key}: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::reminders::interval::{IntervalUnit, DEFAULT_PING_INTERVAL};

    fn config(group: &str, game: &str) -> PingConfig {
        PingConfig::new(group, game, DEFAULT_PING_INTERVAL, Utc::now())
    }

    fn memory_store() -> (PingStore, Arc<MemoryStore>) {
        let backend = Arc::new(MemoryStore::new());
        (PingStore::new(backend.clone()), backend)
    }

    #[test]
    fn test_record_key_is_deterministic() {
        assert_eq!(record_key("100", "200"), "100/200");
        assert_eq!(record_key("100", "200"), record_key("100", "200"));
    }

    #[tokio::test]
    async fn test_insert_and_read_roundtrip() {
        let (store, _) = memory_store();
        let cfg = config("100", "200");

        store.insert_new(&cfg).await.unwrap();
        assert_eq!(store.read("100", "200").await.unwrap(), cfg);
    }

    #[tokio::test]
    async fn test_insert_new_rejects_duplicate_identity() {
        let (store, _) = memory_store();
        store.insert_new(&config("100", "200")).await.unwrap();
        assert!(store.insert_new(&config("100", "200")).await.is_err());
    }

    #[tokio::test]
    async fn test_read_missing_is_none_not_error() {
        let (store, _) = memory_store();
        assert!(store.read("100", "404").await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_record_reads_as_absent() {
        let (store, backend) = memory_store();
        backend.write("100/200", b"{definitely not json").await.unwrap();

        assert!(store.read("100", "200").await.is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (store, _) = memory_store();
        store.insert_new(&config("100", "200")).await.unwrap();

        store.delete("100", "200").await.unwrap();
        store.delete("100", "200").await.unwrap();
        assert!(store.read("100", "200").await.is_none());
    }

    #[tokio::test]
    async fn test_enabled_configs_filters_and_skips() {
        let (store, backend) = memory_store();
        store.insert_new(&config("100", "200")).await.unwrap();
        store
            .insert_new(&config("100", "201").with_enabled(false))
            .await
            .unwrap();
        backend.write("100/202", b"garbage").await.unwrap();

        let configs = store.enabled_configs().await;
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].game_id, "200");
    }

    #[tokio::test]
    async fn test_set_last_ping_missing_record_is_noop() {
        let (store, backend) = memory_store();
        store.set_last_ping("100", "404", Utc::now()).await;
        assert!(backend.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_enabled_flips_flag() {
        let (store, _) = memory_store();
        store.insert_new(&config("100", "200")).await.unwrap();

        store.set_enabled("100", "200", false).await;
        assert!(!store.read("100", "200").await.unwrap().enabled);
    }

    #[test]
    fn test_record_layout_on_disk() {
        let cfg = PingConfig::new(
            "100",
            "200",
            Interval::of(45, IntervalUnit::Minutes),
            "2024-05-01T08:30:00Z".parse().unwrap(),
        );
        let json: serde_json::Value =
            serde_json::from_slice(&serde_json::to_vec_pretty(&cfg).unwrap()).unwrap();

        assert_eq!(json["groupId"], "100");
        assert_eq!(json["sessionId"], "200");
        assert_eq!(json["enabled"], true);
        assert_eq!(json["interval"]["magnitude"], 45);
        assert_eq!(json["interval"]["unit"], "minutes");
        assert!(json["lastPing"].is_string());
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = PingStore::new(Arc::new(JsonFileStore::new(tmp.path())));
        store.init().await.unwrap();

        let cfg = config("100", "200");
        store.insert_new(&cfg).await.unwrap();
        assert_eq!(store.read("100", "200").await.unwrap(), cfg);

        let path = tmp.path().join("100").join("200.json");
        assert!(path.exists());
        assert!(!tmp.path().join("100").join("200.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_store_keys_walks_groups() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = JsonFileStore::new(tmp.path());
        backend.init().await.unwrap();
        backend.write("100/200", b"{}").await.unwrap();
        backend.write("300/400", b"{}").await.unwrap();
        // Stray files at the root are not records.
        tokio::fs::write(tmp.path().join("readme.txt"), b"hi")
            .await
            .unwrap();

        let mut keys = backend.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["100/200", "300/400"]);
    }

    #[tokio::test]
    async fn test_file_store_keys_on_missing_root() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = JsonFileStore::new(tmp.path().join("never-created"));
        assert!(backend.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_delete_missing_ok() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = JsonFileStore::new(tmp.path());
        backend.delete("100/404").await.unwrap();
    }
}
