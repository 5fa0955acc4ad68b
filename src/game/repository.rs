//! # Local Game Repository
//!
//! File-backed [`GameGateway`] for deployments where the bot shares a
//! repository directory with the rules engine. One JSON document per
//! session at `{root}/{group_id}/{game_id}.json`.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::{GameGateway, GameState, GroupInfo};

/// Reads engine state straight off disk. Never writes.
pub struct LocalGameRepository {
    root: PathBuf,
}

impl LocalGameRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn group_dir(&self, group_id: &str) -> PathBuf {
        self.root.join(group_id)
    }

    fn game_path(&self, group_id: &str, game_id: &str) -> PathBuf {
        self.group_dir(group_id).join(format!("{game_id}.json"))
    }

    async fn read_game(&self, path: &Path) -> Result<GameState> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("game record not readable: {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("game record not parsable: {}", path.display()))
    }
}

#[async_trait]
impl GameGateway for LocalGameRepository {
    async fn retrieve_group(&self, group_id: &str) -> Result<GroupInfo> {
        let dir = self.group_dir(group_id);
        let meta = tokio::fs::metadata(&dir)
            .await
            .map_err(|_| anyhow!("no such group: {group_id}"))?;
        if !meta.is_dir() {
            return Err(anyhow!("no such group: {group_id}"));
        }
        Ok(GroupInfo {
            id: group_id.to_string(),
        })
    }

    async fn retrieve_game(&self, group_id: &str, game_id: &str) -> Result<GameState> {
        self.read_game(&self.game_path(group_id, game_id)).await
    }
}
