use crate::AppState;
use crate::commands::{edit_embed, edit_text, user_option};
use crate::constants::COLOR_OK;
use crate::database::models::Identity;
use crate::util::format_points;
use serenity::builder::{CreateCommand, CreateCommandOption, CreateEmbed};
use serenity::model::application::{CommandInteraction, CommandOptionType};
use serenity::prelude::*;
use tracing::warn;

pub fn register() -> CreateCommand {
    CreateCommand::new("whois")
        .description("Show the identity and linked accounts of a user.")
        .add_option(
            CreateCommandOption::new(CommandOptionType::User, "user", "Defaults to you.")
                .required(false),
        )
}

fn roles(identity: &Identity) -> String {
    let mut roles = Vec::new();
    if identity.admin {
        roles.push("Admin");
    }
    if identity.moderator {
        roles.push("Moderator");
    }
    if identity.authenticated {
        roles.push("Authenticated");
    }
    if roles.is_empty() {
        "None".to_string()
    } else {
        roles.join(", ")
    }
}

pub async fn run_slash(ctx: &Context, interaction: &CommandInteraction) {
    interaction.defer_ephemeral(&ctx.http).await.ok();
    let Some(app) = AppState::from_ctx(ctx).await else {
        return;
    };
    let target = user_option(ctx, interaction, "user").await;

    let record = match app.discord_users.get_or_create(&target).await {
        Ok(record) => record,
        Err(e) => {
            edit_text(ctx, interaction, "whois.lookup", format!("Lookup failed: {e}")).await;
            return;
        }
    };

    let mut embed = CreateEmbed::new()
        .title(format!("Who is {}?", record.user.label()))
        .color(COLOR_OK);

    let Some(identity) = record.identity else {
        embed = embed.description("No identity yet. Link a Twitch account with `/link`.");
        edit_embed(ctx, interaction, "whois.none", embed).await;
        return;
    };

    let mut twitch_logins = Vec::new();
    match app.store.linked_accounts(identity.id).await {
        Ok(linked) => {
            for id in linked.twitch {
                match app.twitch_users.get_user_by_id(id, false).await {
                    Ok(twitch) => twitch_logins.push(format!("`{}`", twitch.user.login)),
                    Err(e) => warn!(target = "commands.whois", id, error = %e, "linked twitch user missing"),
                }
            }
        }
        Err(e) => warn!(target = "commands.whois", identity = identity.id, error = %e, "linked accounts lookup failed"),
    }
    let twitch = if twitch_logins.is_empty() {
        "None".to_string()
    } else {
        twitch_logins.join(", ")
    };

    embed = embed
        .field("Identity", format!("#{}", identity.id), true)
        .field("Points", format_points(identity.points), true)
        .field("Roles", roles(&identity), true)
        .field("Twitch", twitch, false);
    if let Some(tier) = identity.supporter {
        embed = embed.field("Supporter", format!("{tier:?}"), true);
    }
    edit_embed(ctx, interaction, "whois.embed", embed).await;
}
