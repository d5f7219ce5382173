//! Operator subcommands over the schedule service.

use std::io::Read;
use std::path::Path;

use anyhow::Context;
use chrono::Utc;
use relay_set::RelaySet;
use scheduler_config_and_utils::{Config, Paths};
use scheduler_database::AsyncDatabase;
use scheduler_service::{EventView, ScheduleService};

async fn open_service(config: &Config, paths: &Paths) -> anyhow::Result<ScheduleService> {
    let db_path = config.database_path(paths);
    let db = AsyncDatabase::open(&db_path)
        .await
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    Ok(ScheduleService::new(db))
}

fn read_event(source: &Path) -> anyhow::Result<String> {
    if source == Path::new("-") {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("failed to read event from stdin")?;
        return Ok(raw);
    }
    std::fs::read_to_string(source)
        .with_context(|| format!("failed to read event from {}", source.display()))
}

pub async fn submit(
    config: &Config,
    paths: &Paths,
    event: &Path,
    publish_at: &str,
) -> anyhow::Result<()> {
    let raw = read_event(event)?;
    let service = open_service(config, paths).await?;
    let id = service.submit_raw(&raw, publish_at, Utc::now()).await?;
    println!("{}", id);
    Ok(())
}

pub async fn list(
    config: &Config,
    paths: &Paths,
    pubkey: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let service = open_service(config, paths).await?;
    let events = service.list(pubkey).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&events)?);
        return Ok(());
    }

    if events.is_empty() {
        println!("No scheduled events");
        return Ok(());
    }
    for event in &events {
        println!("{}", format_row(event));
    }
    Ok(())
}

fn format_row(event: &EventView) -> String {
    let mut row = format!(
        "{}  {:<9}  attempts={}  publish_at={}",
        event.id,
        event.status.as_str(),
        event.attempt_count,
        event.publish_at
    );
    if let Some(next) = &event.next_attempt_at {
        row.push_str(&format!("  next={}", next));
    }
    if let Some(error) = &event.last_error {
        row.push_str(&format!("  error={:?}", error));
    }
    if !event.content_preview.is_empty() {
        row.push_str(&format!("\n    {}", event.content_preview));
    }
    row
}

pub async fn reset(config: &Config, paths: &Paths, id: &str) -> anyhow::Result<()> {
    let service = open_service(config, paths).await?;
    service.reset(id).await?;
    println!("Event {} queued for delivery", id);
    Ok(())
}

pub fn relays(config: &Config, paths: &Paths) {
    let set = RelaySet::new(config.relays_path(paths));
    let relays = set.load();
    if relays.is_empty() {
        println!("No relays configured ({})", set.path().display());
        return;
    }
    for relay in relays {
        println!("{}", relay);
    }
}

pub async fn status(config: &Config, paths: &Paths) -> anyhow::Result<()> {
    let service = open_service(config, paths).await?;
    let counts = service.status_counts().await?;
    println!("scheduled: {}", counts.scheduled);
    println!("retrying:  {}", counts.retrying);
    println!("sent:      {}", counts.sent);
    println!("error:     {}", counts.error);
    println!("total:     {}", counts.total());
    Ok(())
}
