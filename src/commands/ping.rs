use crate::model::ShardManagerContainer;
use serenity::builder::{CreateCommand, EditInteractionResponse};
use serenity::model::application::CommandInteraction;
use serenity::model::channel::Message;
use serenity::prelude::*;
use tracing::warn;

pub fn register() -> CreateCommand {
    CreateCommand::new("ping").description("Check the bot's gateway latency.")
}

async fn latency_text(ctx: &Context) -> String {
    let data = ctx.data.read().await;
    let Some(shard_manager) = data.get::<ShardManagerContainer>() else {
        return "N/A".to_string();
    };
    let runners = shard_manager.runners.lock().await;
    runners
        .get(&ctx.shard_id)
        .and_then(|runner| runner.latency)
        .map_or_else(
            || "N/A".to_string(),
            |latency| format!("{:.2} ms", latency.as_millis()),
        )
}

pub async fn run_slash(ctx: &Context, interaction: &CommandInteraction) {
    interaction.defer_ephemeral(&ctx.http).await.ok();
    let response = format!("Pong! Heartbeat Latency: `{}`", latency_text(ctx).await);
    interaction
        .edit_response(&ctx.http, EditInteractionResponse::new().content(response))
        .await
        .ok();
}

pub async fn run_prefix(ctx: &Context, msg: &Message) {
    let response = format!("Pong! Heartbeat Latency: `{}`", latency_text(ctx).await);
    if let Err(why) = msg.channel_id.say(&ctx.http, response).await {
        warn!(target = "commands.ping", error = ?why, "error sending ping response");
    }
}
