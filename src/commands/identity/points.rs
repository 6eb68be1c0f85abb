use crate::AppState;
use crate::commands::{edit_text, user_option};
use crate::util::format_points;
use serenity::builder::{CreateCommand, CreateCommandOption};
use serenity::model::application::{CommandInteraction, CommandOptionType};
use serenity::model::channel::Message;
use serenity::model::user::User;
use serenity::prelude::*;
use tracing::warn;

pub fn register() -> CreateCommand {
    CreateCommand::new("points")
        .description("Show a user's point balance.")
        .add_option(
            CreateCommandOption::new(CommandOptionType::User, "user", "Defaults to you.")
                .required(false),
        )
}

async fn balance_line(app: &AppState, user: &User) -> String {
    match app.discord_users.get_or_create(user).await {
        Ok(record) => {
            let points = record.identity.map_or(0, |i| i.points);
            format!("**{}** has {}.", record.user.label(), format_points(points))
        }
        Err(e) => {
            warn!(target = "commands.points", user = user.id.get(), error = %e, "balance lookup failed");
            format!("Lookup failed: {e}")
        }
    }
}

pub async fn run_slash(ctx: &Context, interaction: &CommandInteraction) {
    interaction.defer_ephemeral(&ctx.http).await.ok();
    let Some(app) = AppState::from_ctx(ctx).await else {
        return;
    };
    let target = user_option(ctx, interaction, "user").await;
    let line = balance_line(&app, &target).await;
    edit_text(ctx, interaction, "points.balance", line).await;
}

pub async fn run_prefix(ctx: &Context, msg: &Message) {
    let Some(app) = AppState::from_ctx(ctx).await else {
        return;
    };
    let target = msg.mentions.first().unwrap_or(&msg.author);
    let line = balance_line(&app, target).await;
    if let Err(why) = msg.channel_id.say(&ctx.http, line).await {
        warn!(target = "commands.points", error = ?why, "error sending points response");
    }
}
