// src/commands/mod.rs
// Slash and prefix commands exposed on Discord.

pub mod admin;
pub mod identity;
pub mod ping;

use serenity::builder::{CreateEmbed, EditInteractionResponse};
use serenity::model::application::CommandInteraction;
use serenity::model::user::User;
use serenity::prelude::Context;
use tracing::error;

/// Edits the deferred response of a command; failures are logged with a tag.
pub(crate) async fn edit(
    ctx: &Context,
    interaction: &CommandInteraction,
    tag: &str,
    builder: EditInteractionResponse,
) {
    if let Err(e) = interaction.edit_response(&ctx.http, builder).await {
        error!(target = "ui.edit", command = %interaction.data.name, tag = %tag, error = ?e, "edit_response failed");
    }
}

pub(crate) async fn edit_text(ctx: &Context, interaction: &CommandInteraction, tag: &str, text: impl Into<String>) {
    edit(ctx, interaction, tag, EditInteractionResponse::new().content(text)).await;
}

pub(crate) async fn edit_embed(ctx: &Context, interaction: &CommandInteraction, tag: &str, embed: CreateEmbed) {
    edit(ctx, interaction, tag, EditInteractionResponse::new().embed(embed)).await;
}

/// The user given in the `name` option, falling back to the invoking user.
pub(crate) async fn user_option(ctx: &Context, interaction: &CommandInteraction, name: &str) -> User {
    let Some(id) = interaction
        .data
        .options
        .iter()
        .find(|o| o.name == name)
        .and_then(|o| o.value.as_user_id())
    else {
        return interaction.user.clone();
    };
    if let Some(user) = interaction.data.resolved.users.get(&id) {
        return user.clone();
    }
    id.to_user(ctx)
        .await
        .unwrap_or_else(|_| interaction.user.clone())
}

pub(crate) fn string_option<'a>(interaction: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    interaction
        .data
        .options
        .iter()
        .find(|o| o.name == name)
        .and_then(|o| o.value.as_str())
}
