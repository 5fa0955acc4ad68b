use anyhow::Result;
use dotenvy::dotenv;
use log::{error, info};
use serenity::async_trait;
use serenity::model::gateway::Ready;
use serenity::prelude::*;
use std::sync::Arc;

use skirmish::core::Config;
use skirmish::discord::{DiscordDirectory, DiscordSink};
use skirmish::features::reminders::{JsonFileStore, PingStore, ReminderScheduler};
use skirmish::game::LocalGameRepository;

struct Handler;

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("{} is connected and serving {} guilds", ready.user.name, ready.guilds.len());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::from_env()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("Starting Skirmish bot...");

    let store = PingStore::new(Arc::new(JsonFileStore::new(config.ping_config_root())));
    let gateway = Arc::new(LocalGameRepository::new(config.repository_path.clone()));

    let intents = GatewayIntents::GUILDS;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(Handler)
        .await
        .map_err(|e| {
            error!("Failed to create Discord client: {e}");
            anyhow::anyhow!("Client creation failed: {}", e)
        })?;

    info!("Bot configured successfully. Connecting to Discord gateway...");

    // Start the reminder scheduler off the client's HTTP handle
    let http = client.cache_and_http.http.clone();
    let scheduler = ReminderScheduler::new(
        store,
        gateway,
        Arc::new(DiscordDirectory::new(http.clone())),
        Arc::new(DiscordSink::new(http)),
    );
    tokio::spawn(async move {
        scheduler.start().await;
    });

    if let Err(why) = client.start().await {
        error!("Gateway connection failed: {why:?}");
        return Err(anyhow::anyhow!(
            "Failed to establish gateway connection: {}",
            why
        ));
    }

    Ok(())
}
