//! # Configuration Module
//!
//! Process configuration loaded from environment variables (with `.env`
//! support via dotenvy in the binary).
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Bot process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Discord bot token (required).
    pub discord_token: String,

    /// Root directory for the bot's own persisted state.
    pub data_dir: PathBuf,

    /// Shared repository directory the rules engine writes game state to.
    pub repository_path: PathBuf,

    /// Default log filter, overridable via `RUST_LOG`.
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Only `DISCORD_TOKEN` is required; everything else has a default
    /// suitable for a self-hosted deployment.
    pub fn from_env() -> Result<Self> {
        let discord_token =
            std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN must be set")?;

        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string());
        let repository_path =
            std::env::var("GAME_REPOSITORY_PATH").unwrap_or_else(|_| "repository".to_string());
        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            discord_token,
            data_dir: PathBuf::from(data_dir),
            repository_path: PathBuf::from(repository_path),
            log_level,
        })
    }

    /// Where reminder configs live under the data directory.
    pub fn ping_config_root(&self) -> PathBuf {
        self.data_dir.join("service").join("automatic-ping")
    }
}
