//! `/link`: ties a Twitch account to a Discord user by consolidating their identities.
use crate::AppState;
use crate::cache::{CacheError, CacheKey, KeyParse};
use crate::commands::{edit_embed, edit_text, string_option, user_option};
use crate::constants::COLOR_OK;
use crate::database::models::TwitchUserRecord;
use crate::util::format_points;
use serenity::builder::{CreateCommand, CreateCommandOption, CreateEmbed};
use serenity::model::application::{CommandInteraction, CommandOptionType};
use serenity::prelude::*;
use tracing::info;

pub fn register() -> CreateCommand {
    CreateCommand::new("link")
        .description("Link a Twitch account to a Discord user (admin only).")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "twitch", "Twitch user id or login.")
                .required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::User, "user", "Defaults to you.")
                .required(false),
        )
}

/// Numeric input is an id; anything else is a login.
async fn find_twitch(app: &AppState, raw: &str) -> Result<TwitchUserRecord, CacheError> {
    let key = CacheKey::from(raw);
    match key.parse_numeric() {
        KeyParse::Parsed(id) => app.twitch_users.get_user_by_id(id, false).await,
        KeyParse::Unparsed => app.twitch_users.get_user_by_name(raw, false).await,
    }
}

pub async fn run_slash(ctx: &Context, interaction: &CommandInteraction) {
    interaction.defer_ephemeral(&ctx.http).await.ok();
    let Some(app) = AppState::from_ctx(ctx).await else {
        return;
    };
    if !app.is_admin(interaction.user.id) {
        edit_text(ctx, interaction, "link.denied", "Only bot admins can link accounts.").await;
        return;
    }
    let Some(raw) = string_option(interaction, "twitch") else {
        edit_text(ctx, interaction, "link.args", "Missing `twitch` option.").await;
        return;
    };
    let target = user_option(ctx, interaction, "user").await;

    let twitch = match find_twitch(&app, raw).await {
        Ok(record) => record,
        Err(e) => {
            edit_text(ctx, interaction, "link.twitch", format!("Twitch account `{raw}`: {e}")).await;
            return;
        }
    };
    let discord = match app.discord_users.get_or_create(&target).await {
        Ok(record) => record,
        Err(e) => {
            edit_text(ctx, interaction, "link.discord", format!("Discord account: {e}")).await;
            return;
        }
    };

    let merged = match app
        .consolidator
        .consolidate(&[twitch.user.clone()], &[discord.user.clone()])
        .await
    {
        Ok(identity) => identity,
        Err(e) => {
            edit_text(ctx, interaction, "link.consolidate", format!("Linking failed: {e}")).await;
            return;
        }
    };
    info!(
        target = "commands.link",
        by = interaction.user.id.get(),
        twitch = twitch.user.id,
        discord = discord.user.id,
        identity = merged.id,
        "accounts linked"
    );

    let embed = CreateEmbed::new()
        .title("Accounts linked")
        .description(format!(
            "Twitch `{}` and Discord **{}** now share identity #{}.",
            twitch.user.login,
            discord.user.label(),
            merged.id
        ))
        .field("Points", format_points(merged.points), true)
        .color(COLOR_OK);
    edit_embed(ctx, interaction, "link.done", embed).await;
}
