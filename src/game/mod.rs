//! # Game Engine Client
//!
//! Read-only contract against the Skirmish rules engine. The bot never
//! mutates game state; it retrieves groups and sessions to decide who to
//! notify.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Local JSON repository gateway for self-hosted deployments
//! - 1.0.0: Initial gateway trait and session state types

pub mod repository;

pub use repository::LocalGameRepository;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle phase of a game session.
///
/// Sessions only move forward: `Setup` -> `Active` -> `Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GamePhase {
    Setup,
    Active,
    Ended,
}

/// A player faction and the member leading it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nation {
    pub id: String,
    /// Discord user id of the nation's leader.
    pub leader_id: String,
}

/// One territory held by a nation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub nation_id: String,
    pub territory_id: String,
}

/// Snapshot of one running session as the engine reports it.
///
/// The session id doubles as the id of the guild channel the game is
/// played in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub id: String,
    pub phase: GamePhase,
    /// Last time any game action was recorded by the engine.
    pub updated_at: DateTime<Utc>,
    pub nations: Vec<Nation>,
    pub claims: Vec<Claim>,
    /// Turn holder during the active phase, if the engine has one.
    #[serde(default)]
    pub current_player: Option<String>,
}

impl GameState {
    /// Nations that have not claimed any territory yet.
    ///
    /// During setup these are the players holding the game up.
    pub fn nations_without_claims(&self) -> Vec<&Nation> {
        self.nations
            .iter()
            .filter(|nation| !self.claims.iter().any(|claim| claim.nation_id == nation.id))
            .collect()
    }
}

/// The community that owns a set of sessions (one Discord guild).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    pub id: String,
}

/// Retrieval interface over the rules engine.
///
/// Calls fail when the group or session no longer exists; callers treat
/// that as the session being gone, not as a process-level error.
#[async_trait]
pub trait GameGateway: Send + Sync {
    async fn retrieve_group(&self, group_id: &str) -> Result<GroupInfo>;

    async fn retrieve_game(&self, group_id: &str, game_id: &str) -> Result<GameState>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nation(id: &str, leader: &str) -> Nation {
        Nation {
            id: id.to_string(),
            leader_id: leader.to_string(),
        }
    }

    fn claim(nation_id: &str, territory: &str) -> Claim {
        Claim {
            nation_id: nation_id.to_string(),
            territory_id: territory.to_string(),
        }
    }

    fn game(nations: Vec<Nation>, claims: Vec<Claim>) -> GameState {
        GameState {
            id: "123".to_string(),
            phase: GamePhase::Setup,
            updated_at: Utc::now(),
            nations,
            claims,
            current_player: None,
        }
    }

    #[test]
    fn test_nations_without_claims_mixed() {
        let state = game(
            vec![nation("n1", "alice"), nation("n2", "bob")],
            vec![claim("n2", "t1")],
        );

        let unclaimed = state.nations_without_claims();
        assert_eq!(unclaimed.len(), 1);
        assert_eq!(unclaimed[0].leader_id, "alice");
    }

    #[test]
    fn test_nations_without_claims_all_claimed() {
        let state = game(
            vec![nation("n1", "alice"), nation("n2", "bob")],
            vec![claim("n1", "t1"), claim("n2", "t2")],
        );

        assert!(state.nations_without_claims().is_empty());
    }

    #[test]
    fn test_nations_without_claims_no_nations() {
        let state = game(vec![], vec![]);
        assert!(state.nations_without_claims().is_empty());
    }

    #[test]
    fn test_phase_serde_uppercase() {
        assert_eq!(
            serde_json::to_string(&GamePhase::Active).unwrap(),
            "\"ACTIVE\""
        );
        let phase: GamePhase = serde_json::from_str("\"SETUP\"").unwrap();
        assert_eq!(phase, GamePhase::Setup);
    }

    #[test]
    fn test_game_state_missing_current_player() {
        let json = r#"{
            "id": "555",
            "phase": "ENDED",
            "updatedAt": "2024-03-01T12:00:00Z",
            "nations": [],
            "claims": []
        }"#;
        let state: GameState = serde_json::from_str(json).unwrap();
        assert_eq!(state.phase, GamePhase::Ended);
        assert!(state.current_player.is_none());
    }
}
