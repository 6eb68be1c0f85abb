use crate::commands;
use serenity::async_trait;
use serenity::client::Context;
use serenity::model::application::Interaction;
use serenity::model::{channel::Message, gateway::Ready, id::GuildId};
use serenity::prelude::EventHandler;
use std::str::FromStr;
use tracing::{debug, error, info};

pub const PREFIX: &str = "!";

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Ping,
    Points,
    Unknown,
}

impl FromStr for Command {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ping" => Ok(Command::Ping),
            "points" | "pts" => Ok(Command::Points),
            _ => Ok(Command::Unknown),
        }
    }
}

pub struct Handler {
    pub allowed_guild_id: GuildId,
}

#[async_trait]
impl EventHandler for Handler {
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Command(command) = &interaction else {
            return;
        };
        debug!(target = "handler", command = %command.data.name, user = command.user.id.get(), "slash command");
        match command.data.name.as_str() {
            "ping" => commands::ping::run_slash(&ctx, command).await,
            "whois" => commands::identity::whois::run_slash(&ctx, command).await,
            "points" => commands::identity::points::run_slash(&ctx, command).await,
            "link" => commands::identity::link::run_slash(&ctx, command).await,
            "cachestats" => commands::admin::run_slash(&ctx, command).await,
            _ => {}
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.guild_id != Some(self.allowed_guild_id) || msg.author.bot {
            return;
        }
        let Some(command_body) = msg.content.strip_prefix(PREFIX) else {
            return;
        };
        let Some(command_str) = command_body.split_whitespace().next() else {
            return;
        };
        match Command::from_str(command_str).unwrap_or(Command::Unknown) {
            Command::Ping => commands::ping::run_prefix(&ctx, &msg).await,
            Command::Points => commands::identity::points::run_prefix(&ctx, &msg).await,
            Command::Unknown => {}
        }
    }

    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(target = "handler", user = %ready.user.name, "connected and ready");
        let commands_to_register = vec![
            commands::ping::register(),
            commands::identity::whois::register(),
            commands::identity::points::register(),
            commands::identity::link::register(),
            commands::admin::register(),
        ];
        match self
            .allowed_guild_id
            .set_commands(&ctx.http, commands_to_register)
            .await
        {
            Ok(registered) => info!(target = "handler", count = registered.len(), "registered guild commands"),
            Err(e) => error!(target = "handler", error = ?e, "error creating guild commands"),
        }
    }
}
