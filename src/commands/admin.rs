//! `/cachestats`: per-cache size and hit counters for bot admins.
use crate::AppState;
use crate::cache::CacheStatsSnapshot;
use crate::commands::{edit_embed, edit_text};
use crate::constants::COLOR_OK;
use crate::util::comma;
use serenity::builder::{CreateCommand, CreateEmbed};
use serenity::model::application::CommandInteraction;
use serenity::prelude::*;

pub fn register() -> CreateCommand {
    CreateCommand::new("cachestats").description("Show cache statistics (admin only).")
}

fn stats_field(len: usize, stats: &CacheStatsSnapshot) -> String {
    format!(
        "Entries: {}\nHits: {} · Misses: {}\nCoalesced: {} · Evicted: {}\nHit rate: {:.1}%",
        comma(len as i64),
        comma(stats.hits as i64),
        comma(stats.misses as i64),
        comma(stats.coalesced as i64),
        comma(stats.evicted as i64),
        stats.hit_rate()
    )
}

pub async fn run_slash(ctx: &Context, interaction: &CommandInteraction) {
    interaction.defer_ephemeral(&ctx.http).await.ok();
    let Some(app) = AppState::from_ctx(ctx).await else {
        return;
    };
    if !app.is_admin(interaction.user.id) {
        edit_text(ctx, interaction, "cachestats.denied", "Only bot admins can view cache stats.").await;
        return;
    }

    let twitch = app.twitch_users.cache();
    let discord = app.discord_users.cache();
    let sessions = app.sessions.cache();
    let embed = CreateEmbed::new()
        .title("Cache statistics")
        .field(twitch.name(), stats_field(twitch.len().await, &twitch.stats()), true)
        .field(discord.name(), stats_field(discord.len().await, &discord.stats()), true)
        .field(sessions.name(), stats_field(sessions.len().await, &sessions.stats()), true)
        .color(COLOR_OK);
    edit_embed(ctx, interaction, "cachestats.embed", embed).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_field_formats_counts() {
        let stats = CacheStatsSnapshot {
            hits: 3,
            misses: 1,
            coalesced: 2,
            evicted: 1200,
        };
        let text = stats_field(4, &stats);
        assert!(text.contains("Entries: 4"));
        assert!(text.contains("Evicted: 1,200"));
        assert!(text.contains("Hit rate: 83.3%"));
    }
}
