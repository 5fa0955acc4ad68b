//! # Reminder Scheduler
//!
//! Watches every in-progress game session and periodically pings whoever
//! must act: during setup, the leaders who have not claimed territory;
//! during the active phase, the current turn holder.
//!
//! One recurring tokio task per watched session, registered in a
//! [`TaskRegistry`] so a session can never hold two timers. Tasks are
//! rebuilt from persisted [`PingConfig`] records on startup; each tick
//! re-reads its config and re-fetches live game state, trusting nothing
//! cached from the previous tick.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: true
//!
//! ## Changelog
//! - 2.0.0: Owned scheduler object with explicit start/shutdown, timeout
//!   guards on every collaborator call, phase hand-off
//! - 1.0.0: Initial recurring ping tasks with file-backed configs

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::discord::{ChannelRef, GuildDirectory, NotificationSink};
use crate::game::{GameGateway, GamePhase, GameState};

use super::interval::{Interval, DEFAULT_PING_INTERVAL};
use super::registry::{TaskHandle, TaskRegistry};
use super::store::{PingConfig, PingStore};

/// Upper bound on any single collaborator call, so one hung lookup cannot
/// starve the timer pool.
const COLLABORATOR_TIMEOUT: Duration = Duration::from_secs(30);

/// What a session's watch task is currently looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchKind {
    /// Ping leaders who have not claimed a starting territory.
    Setup,
    /// Ping the current turn holder.
    Turn,
}

impl WatchKind {
    fn label(self) -> &'static str {
        match self {
            WatchKind::Setup => "setup",
            WatchKind::Turn => "turn",
        }
    }
}

/// What the watch loop should do after a tick.
enum TickOutcome {
    Continue,
    /// Remove the registry entry and end the loop.
    Stop,
    /// Hand the session off to a watch of the other kind.
    Switch(WatchKind),
}

/// Orchestrates one recurring reminder task per watched session.
///
/// Cheap to clone; all clones share the same registry, pause flag, and
/// store. Constructed once at process start and injected where needed.
#[derive(Clone)]
pub struct ReminderScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    store: PingStore,
    registry: TaskRegistry,
    paused: AtomicBool,
    gateway: Arc<dyn GameGateway>,
    directory: Arc<dyn GuildDirectory>,
    sink: Arc<dyn NotificationSink>,
}

impl ReminderScheduler {
    pub fn new(
        store: PingStore,
        gateway: Arc<dyn GameGateway>,
        directory: Arc<dyn GuildDirectory>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                registry: TaskRegistry::new(),
                paused: AtomicBool::new(false),
                gateway,
                directory,
                sink,
            }),
        }
    }

    /// Recover persisted configs and install one watch task per session
    /// that still exists.
    ///
    /// Never fails the process: a broken config root just means zero
    /// recovered tasks.
    pub async fn start(&self) {
        if let Err(e) = self.inner.store.init().await {
            error!("Failed to prepare reminder config storage, continuing without recovery: {e}");
        }

        let now = Utc::now();
        for mut config in self.inner.store.enabled_configs().await {
            let group_id = config.group_id.clone();
            let game_id = config.game_id.clone();

            if let Err(e) = self.inner.retrieve_group_bounded(&group_id).await {
                info!("Skipping reminder config {group_id}/{game_id}: group unavailable: {e}");
                continue;
            }
            let game = match self.inner.retrieve_game_bounded(&group_id, &game_id).await {
                Ok(game) => game,
                Err(e) => {
                    info!("Skipping reminder config {group_id}/{game_id}: session unavailable: {e}");
                    continue;
                }
            };
            if let Err(e) = self.inner.resolve_channel_bounded(&group_id, &game_id).await {
                info!("Skipping reminder config {group_id}/{game_id}: channel unavailable: {e}");
                continue;
            }

            // Game progress observed while the bot was down counts as a
            // ping, so a stale reminder does not fire right after boot.
            if game.updated_at > config.last_ping {
                config.last_ping = game.updated_at;
                if let Err(e) = self.inner.store.update(&config).await {
                    warn!("Failed to persist reconciled lastPing for {group_id}/{game_id}: {e}");
                }
            }

            let kind = match game.phase {
                GamePhase::Setup => WatchKind::Setup,
                GamePhase::Active => WatchKind::Turn,
                GamePhase::Ended => {
                    debug!("Session {game_id} already ended; not scheduling");
                    continue;
                }
            };
            install_watch(&self.inner, &config, kind, now);
        }

        let count = self.inner.registry.len();
        let noun = if count == 1 { "task" } else { "tasks" };
        info!("Reminder service running with {count} {noun}.");
    }

    /// Cancel every watch task. In-flight ticks finish naturally.
    pub fn shutdown(&self) {
        for handle in self.inner.registry.drain() {
            handle.shutdown();
        }
    }

    /// Stop all ticking without touching tasks or schedules. Paused ticks
    /// are true no-ops, so resuming picks up exactly where scheduling
    /// left off.
    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::Relaxed);
    }

    pub fn unpause(&self) {
        self.inner.paused.store(false, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::Relaxed)
    }

    /// Enable reminders for a session and start watching it.
    ///
    /// Fails if a config already exists or the session cannot be found.
    /// `last_ping` is seeded from the session's own last-activity time so
    /// the first reminder only fires a full interval after the last move.
    pub async fn create_config(
        &self,
        group_id: &str,
        game_id: &str,
        interval: Interval,
    ) -> Result<PingConfig> {
        let game = self.inner.retrieve_game_bounded(group_id, game_id).await?;
        let config = PingConfig::new(group_id, game_id, interval, game.updated_at);
        self.inner.store.insert_new(&config).await?;

        let kind = match game.phase {
            GamePhase::Setup => WatchKind::Setup,
            GamePhase::Active => WatchKind::Turn,
            GamePhase::Ended => return Ok(config),
        };
        install_watch(&self.inner, &config, kind, Utc::now());
        Ok(config)
    }

    pub async fn config(&self, group_id: &str, game_id: &str) -> Option<PingConfig> {
        self.inner.store.read(group_id, game_id).await
    }

    /// Get the session's config, creating one with the default interval
    /// if it is missing or unreadable.
    pub async fn retrieve_config(&self, group_id: &str, game_id: &str) -> Result<PingConfig> {
        if let Some(config) = self.inner.store.read(group_id, game_id).await {
            return Ok(config);
        }
        // A corrupt record reads as absent; clear it before recreating.
        if let Err(e) = self.inner.store.delete(group_id, game_id).await {
            warn!("Failed to clear stale reminder config {group_id}/{game_id}: {e}");
        }
        self.create_config(group_id, game_id, DEFAULT_PING_INTERVAL).await
    }

    /// Turn reminders off for a session: end its task, release the timer,
    /// delete the record.
    pub async fn delete_config(&self, group_id: &str, game_id: &str) -> Result<()> {
        self.inner.end_task(game_id);
        self.inner.store.delete(group_id, game_id).await
    }

    /// Number of sessions currently being watched.
    pub fn task_count(&self) -> usize {
        self.inner.registry.len()
    }
}

/// Delay before the first tick so recovery neither re-fires a reminder
/// that is not due nor waits a full extra period for an overdue one.
fn initial_delay_minutes(config: &PingConfig, now: DateTime<Utc>) -> u64 {
    let elapsed = now
        .signed_duration_since(config.last_ping)
        .num_minutes()
        .max(0) as u64;
    config.interval.as_minutes().saturating_sub(elapsed)
}

/// Install a watch task for the session, if it does not already have one.
fn install_watch(inner: &Arc<Inner>, config: &PingConfig, kind: WatchKind, now: DateTime<Utc>) -> bool {
    let initial_delay = Duration::from_secs(initial_delay_minutes(config, now) * 60);
    let period = config.interval.to_duration();
    let group_id = config.group_id.clone();
    let game_id = config.game_id.clone();

    inner.registry.try_insert(&config.game_id, || {
        let inner = inner.clone();
        TaskHandle::new(tokio::spawn(async move {
            watch_loop(inner, group_id, game_id, kind, initial_delay, period).await;
        }))
    })
}

/// Body of one session's recurring task. Ticks never overlap: each runs
/// inline here before the timer is awaited again.
async fn watch_loop(
    inner: Arc<Inner>,
    group_id: String,
    game_id: String,
    kind: WatchKind,
    initial_delay: Duration,
    period: Duration,
) {
    let start = tokio::time::Instant::now() + initial_delay;
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        match inner.run_tick(&group_id, &game_id, kind).await {
            TickOutcome::Continue => {}
            TickOutcome::Stop => {
                // Self-shutdown: drop our own handle rather than aborting
                // it so this loop exits normally.
                inner.registry.remove(&game_id);
                break;
            }
            TickOutcome::Switch(next) => {
                inner.registry.remove(&game_id);
                hand_off(&inner, &group_id, &game_id, next).await;
                break;
            }
        }
    }
}

/// Cancel-then-create phase hand-off. Not atomic: at worst the session
/// skips one tick during the window, which is accepted over serializing
/// unrelated sessions behind a global lock.
async fn hand_off(inner: &Arc<Inner>, group_id: &str, game_id: &str, kind: WatchKind) {
    let Some(config) = inner.store.read(group_id, game_id).await else {
        return;
    };
    if !config.enabled {
        return;
    }
    if install_watch(inner, &config, kind, Utc::now()) {
        info!("Session {game_id} moved to the {} watch", kind.label());
    }
}

impl Inner {
    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    fn end_task(&self, game_id: &str) {
        if let Some(handle) = self.registry.remove(game_id) {
            handle.shutdown();
        }
    }

    async fn retrieve_group_bounded(&self, group_id: &str) -> Result<crate::game::GroupInfo> {
        tokio::time::timeout(COLLABORATOR_TIMEOUT, self.gateway.retrieve_group(group_id))
            .await
            .map_err(|_| anyhow!("timed out retrieving group {group_id}"))?
    }

    async fn retrieve_game_bounded(&self, group_id: &str, game_id: &str) -> Result<GameState> {
        tokio::time::timeout(
            COLLABORATOR_TIMEOUT,
            self.gateway.retrieve_game(group_id, game_id),
        )
        .await
        .map_err(|_| anyhow!("timed out retrieving game {game_id}"))?
    }

    async fn resolve_channel_bounded(&self, group_id: &str, channel_id: &str) -> Result<ChannelRef> {
        tokio::time::timeout(
            COLLABORATOR_TIMEOUT,
            self.directory.resolve_channel(group_id, channel_id),
        )
        .await
        .map_err(|_| anyhow!("timed out resolving channel {channel_id}"))?
    }

    async fn member_mention_bounded(&self, group_id: &str, user_id: &str) -> Result<String> {
        tokio::time::timeout(
            COLLABORATOR_TIMEOUT,
            self.directory.member_mention(group_id, user_id),
        )
        .await
        .map_err(|_| anyhow!("timed out resolving member {user_id}"))?
    }

    async fn send_bounded(&self, channel: &ChannelRef, text: &str) -> Result<()> {
        tokio::time::timeout(COLLABORATOR_TIMEOUT, self.sink.send(channel, text))
            .await
            .map_err(|_| anyhow!("timed out sending to channel {}", channel.channel_id))?
    }

    async fn run_tick(&self, group_id: &str, game_id: &str, kind: WatchKind) -> TickOutcome {
        if self.is_paused() {
            return TickOutcome::Continue;
        }

        // The record on disk is the source of truth for enabled/interval.
        let Some(config) = self.store.read(group_id, game_id).await else {
            debug!("Reminder config for session {game_id} is gone; ending task");
            return TickOutcome::Stop;
        };
        if !config.enabled {
            debug!("Reminders disabled for session {game_id}; ending task");
            return TickOutcome::Stop;
        }

        let game = match self.retrieve_game_bounded(group_id, game_id).await {
            Ok(game) => game,
            Err(e) => return self.fail_stop(group_id, game_id, &e).await,
        };

        match kind {
            WatchKind::Setup => match game.phase {
                GamePhase::Setup => self.setup_tick(group_id, game_id, &game).await,
                GamePhase::Active => TickOutcome::Switch(WatchKind::Turn),
                GamePhase::Ended => self.retire(group_id, game_id).await,
            },
            WatchKind::Turn => match game.phase {
                GamePhase::Ended => self.retire(group_id, game_id).await,
                _ => self.turn_tick(group_id, game_id, &game).await,
            },
        }
    }

    /// Remind every leader still holding the setup phase up. No
    /// recipients means nothing is sent and `last_ping` stays untouched.
    async fn setup_tick(&self, group_id: &str, game_id: &str, game: &GameState) -> TickOutcome {
        let stragglers = game.nations_without_claims();
        if stragglers.is_empty() {
            return TickOutcome::Continue;
        }

        let channel = match self.resolve_channel_bounded(group_id, game_id).await {
            Ok(channel) => channel,
            Err(e) => return self.fail_stop(group_id, game_id, &e).await,
        };

        let mut mentions = Vec::with_capacity(stragglers.len());
        for nation in stragglers {
            match self.member_mention_bounded(group_id, &nation.leader_id).await {
                Ok(mention) => mentions.push(mention),
                Err(e) => return self.fail_stop(group_id, game_id, &e).await,
            }
        }

        let text = format!(
            "Reminder to finish setting up this game: {}",
            mentions.join(", ")
        );
        self.deliver(group_id, game_id, &channel, &text).await
    }

    /// Remind the current turn holder, if the engine reports one.
    async fn turn_tick(&self, group_id: &str, game_id: &str, game: &GameState) -> TickOutcome {
        let Some(player_id) = game.current_player.as_deref() else {
            return TickOutcome::Continue;
        };

        let channel = match self.resolve_channel_bounded(group_id, game_id).await {
            Ok(channel) => channel,
            Err(e) => return self.fail_stop(group_id, game_id, &e).await,
        };
        let mention = match self.member_mention_bounded(group_id, player_id).await {
            Ok(mention) => mention,
            Err(e) => return self.fail_stop(group_id, game_id, &e).await,
        };

        let text = format!("Reminder that it is your turn {mention}.");
        self.deliver(group_id, game_id, &channel, &text).await
    }

    /// Send one reminder. A failed send is not retried this tick;
    /// `last_ping` stays unchanged so the next tick tries again.
    async fn deliver(
        &self,
        group_id: &str,
        game_id: &str,
        channel: &ChannelRef,
        text: &str,
    ) -> TickOutcome {
        match self.send_bounded(channel, text).await {
            Ok(()) => self.store.set_last_ping(group_id, game_id, Utc::now()).await,
            Err(e) => warn!("Failed to deliver reminder for session {game_id}: {e}"),
        }
        TickOutcome::Continue
    }

    /// Fail-stop for this session only: disable its config and end its
    /// task. Other sessions keep ticking.
    async fn fail_stop(&self, group_id: &str, game_id: &str, err: &anyhow::Error) -> TickOutcome {
        warn!("Reminder task for session {game_id} failed, disabling: {err}");
        self.store.set_enabled(group_id, game_id, false).await;
        TickOutcome::Stop
    }

    /// The session ended; reminders for it are over.
    async fn retire(&self, group_id: &str, game_id: &str) -> TickOutcome {
        info!("Session {game_id} has ended; stopping its reminders");
        self.store.set_enabled(group_id, game_id, false).await;
        TickOutcome::Stop
    }
}
