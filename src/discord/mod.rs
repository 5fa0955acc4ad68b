//! # Discord Adapters
//!
//! Seam between the scheduler and the messaging SDK: channel/member
//! resolution and outbound delivery, as traits so tests can run without a
//! gateway connection.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.2.0
//! - **Toggleable**: false

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serenity::http::Http;
use serenity::model::channel::Channel;
use serenity::model::id::ChannelId;
use serenity::model::mention::Mentionable;
use std::sync::Arc;

/// A resolved guild channel a reminder can be delivered to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
    pub guild_id: String,
    pub channel_id: String,
}

/// Resolves guild-scoped entities by id.
///
/// Every call may fail: guilds kick the bot, channels get deleted, members
/// leave. Callers treat failure as "this session can no longer be
/// reminded", not as a process error.
#[async_trait]
pub trait GuildDirectory: Send + Sync {
    /// Confirm the channel exists inside the given guild.
    async fn resolve_channel(&self, guild_id: &str, channel_id: &str) -> Result<ChannelRef>;

    /// Render a mentionable handle for a guild member.
    async fn member_mention(&self, guild_id: &str, user_id: &str) -> Result<String>;
}

/// Delivers one message to one channel, best effort.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, channel: &ChannelRef, text: &str) -> Result<()>;
}

fn parse_id(kind: &str, value: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .with_context(|| format!("not a snowflake {kind} id: {value}"))
}

/// [`GuildDirectory`] over serenity's REST client.
pub struct DiscordDirectory {
    http: Arc<Http>,
}

impl DiscordDirectory {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl GuildDirectory for DiscordDirectory {
    async fn resolve_channel(&self, guild_id: &str, channel_id: &str) -> Result<ChannelRef> {
        let guild = parse_id("guild", guild_id)?;
        let channel = parse_id("channel", channel_id)?;

        match self.http.get_channel(channel).await? {
            Channel::Guild(guild_channel) if guild_channel.guild_id.0 == guild => Ok(ChannelRef {
                guild_id: guild_id.to_string(),
                channel_id: channel_id.to_string(),
            }),
            _ => Err(anyhow!(
                "channel {channel_id} is not a guild channel of {guild_id}"
            )),
        }
    }

    async fn member_mention(&self, guild_id: &str, user_id: &str) -> Result<String> {
        let guild = parse_id("guild", guild_id)?;
        let user = parse_id("user", user_id)?;

        let member = self.http.get_member(guild, user).await?;
        Ok(member.user.mention().to_string())
    }
}

/// [`NotificationSink`] over serenity's REST client.
pub struct DiscordSink {
    http: Arc<Http>,
}

impl DiscordSink {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl NotificationSink for DiscordSink {
    async fn send(&self, channel: &ChannelRef, text: &str) -> Result<()> {
        let channel_id = parse_id("channel", &channel.channel_id)?;
        ChannelId(channel_id).say(&*self.http, text).await?;
        Ok(())
    }
}
