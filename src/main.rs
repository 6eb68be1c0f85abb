use std::sync::Arc;

use anyhow::Context as _;
use serenity::model::gateway::GatewayIntents;
use serenity::model::id::GuildId;
use serenity::prelude::*;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use modbot::config::Config;
use modbot::database::{self, AccountStore, MemoryStore, PgStore};
use modbot::handler::Handler;
use modbot::model::{AppState, ShardManagerContainer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("invalid configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let store: Arc<dyn AccountStore> = if config.database_url == "memory" {
        info!(target = "startup", "using in-memory store");
        Arc::new(MemoryStore::new())
    } else {
        let pool = database::init::connect(&config.database_url)
            .await
            .context("failed to connect to the database")?;
        database::init::ensure_schema(&pool)
            .await
            .context("failed to prepare the database schema")?;
        Arc::new(PgStore::new(pool))
    };

    let app_state = Arc::new(AppState::new(store, &config.caches, config.admin_ids.clone()));

    // In Serenity v0.12, interactions are received by default with GUILDS.
    let intents =
        GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(Handler {
            allowed_guild_id: GuildId::new(config.server_id),
        })
        .await
        .context("error creating the Discord client")?;

    {
        let mut data = client.data.write().await;
        data.insert::<ShardManagerContainer>(client.shard_manager.clone());
        data.insert::<AppState>(app_state.clone());
    }

    let result = client.start().await;
    app_state.stop_caches();
    if let Err(why) = result {
        error!(target = "startup", error = ?why, "client error");
        return Err(why.into());
    }
    Ok(())
}
