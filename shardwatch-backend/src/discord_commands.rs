use crate::Context;
use chrono::Utc;
use poise::CreateReply;
use poise::command;
use poise::serenity_prelude::{CreateEmbed, CreateEmbedFooter};
use shardwatch_backend::helpers::format_elapsed;
use shardwatch_backend::validation;
use shardwatch_db::{ServerRecord, ServerStatus, Tier};

pub(crate) type Error = Box<dyn std::error::Error + Send + Sync>;

const EMBED_COLOR: u32 = 0x5865F2;

fn status_icon(record: &ServerRecord) -> &'static str {
    match record.status {
        ServerStatus::Online if record.capacity <= 0 => "🟡",
        ServerStatus::Online => "🟢",
        ServerStatus::Offline => "🔴",
        ServerStatus::Unknown => "❔",
    }
}

fn open_tiers(record: &ServerRecord) -> String {
    let open: Vec<_> = Tier::NOTIFIED
        .into_iter()
        .filter(|tier| record.tier_gates.get(*tier))
        .map(Tier::label)
        .collect();
    if open.is_empty() {
        "none".to_string()
    } else {
        open.join(", ")
    }
}

/// List every tracked game server
#[command(slash_command, prefix_command)]
pub async fn servers(ctx: Context<'_>) -> Result<(), Error> {
    let data = ctx.data();
    let lines: Vec<String> = {
        let store = data.store.lock().await;
        store
            .records()
            .iter()
            .map(|r| {
                let stale = if r.is_stale(Utc::now(), data.stale_after) {
                    " (stale)"
                } else {
                    ""
                };
                format!(
                    "{} **{}** {} / {}{}",
                    status_icon(r),
                    r.name,
                    r.status,
                    r.access_tier.label(),
                    stale
                )
            })
            .collect()
    };

    let embed = CreateEmbed::default()
        .title("Tracked Servers")
        .color(EMBED_COLOR);
    let embed = if lines.is_empty() {
        embed.description("No servers seen yet.")
    } else {
        embed.description(lines.join("\n"))
    };
    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Show the current state of one game server
#[command(slash_command, prefix_command)]
pub async fn server(
    ctx: Context<'_>,
    #[description = "Server name"] name: String,
) -> Result<(), Error> {
    validation::validate_server_name(&name)?;
    let data = ctx.data();
    let record = {
        let store = data.store.lock().await;
        store.find(&name).cloned()
    };
    let Some(record) = record else {
        ctx.say(format!("No tracked server named `{name}`.")).await?;
        return Ok(());
    };

    let now = Utc::now();
    let mut embed = CreateEmbed::default()
        .title(format!("{} {}", status_icon(&record), record.name))
        .color(EMBED_COLOR)
        .field("Status", record.status.to_string(), true)
        .field("Access", record.access_tier.label(), true)
        .field("Capacity", record.capacity.to_string(), true)
        .field("Open to", open_tiers(&record), false)
        .field("Last change", format_elapsed(record.last_update, now), true)
        .field("Last seen", format_elapsed(record.last_seen, now), true);
    if record.is_pending() {
        embed = embed.footer(CreateEmbedFooter::new("Change observed, notices pending"));
    } else if record.is_stale(now, data.stale_after) {
        embed = embed.footer(CreateEmbedFooter::new(
            "Missing from recent status polls; details may be out of date",
        ));
    }
    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}
