//! Deskline - A terminal view of the live support queue

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use std::sync::Arc;

use cli::{Cli, Command};

use desk::{
    DeskConfig, DeskStore, PollingChangeFeed, ReplyHandler, StoreOptions, SupabaseClient, SupabaseSource, Thread,
    Ticket, TicketId, ZohoDeskClient,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    if let Err(e) = run(cli.into_command()).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(command: Command) -> Result<()> {
    let cfg = match DeskConfig::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            if let Some(path) = DeskConfig::default_config_path() {
                warn!(
                    "To configure Deskline, either:\n\
                     1. Place your settings at: {}\n\
                     2. Or set environment variables: SUPABASE_URL, SUPABASE_KEY and DESK_AGENT_NAME",
                    path.display()
                );
            }
            return Err(e);
        }
    };

    match command {
        Command::Watch => watch(&cfg).await,
        Command::Open { ticket } => open(&cfg, TicketId::new(ticket)).await,
        Command::Reply { ticket, channel, text } => {
            reply(&cfg, TicketId::new(ticket), &channel, text.join(" ")).await
        }
    }
}

fn start_store(cfg: &DeskConfig) -> Result<DeskStore> {
    let client = Arc::new(SupabaseClient::new(&cfg.supabase_url, cfg.supabase_key.clone())?);
    let source = Arc::new(SupabaseSource::new(client.clone()));
    let feed = Arc::new(PollingChangeFeed::new(client, cfg.poll_interval()));
    let options = StoreOptions::new(cfg.agent.clone()).with_page_size(cfg.page_size);
    Ok(DeskStore::start(source, feed, options))
}

fn print_tickets(tickets: &[Ticket]) {
    println!("{:<12} {:<24} {:<10} {:<8} {}", "TICKET", "CONTACT", "CHANNEL", "STATUS", "UPDATED");
    for ticket in tickets {
        println!(
            "{:<12} {:<24} {:<10} {:<8} {}{}",
            ticket.id.as_str(),
            ticket.contact_name,
            ticket.channel,
            ticket.status,
            ticket.modified_time.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M"),
            if ticket.is_unread { "  *" } else { "" },
        );
    }
}

fn print_threads(threads: &[Thread]) {
    for thread in threads {
        println!(
            "--- {} ({}) {}",
            thread.author_name,
            thread.author_type,
            thread.created_time.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M"),
        );
        println!("{}\n", thread.content);
    }
}

async fn watch(cfg: &DeskConfig) -> Result<()> {
    let store = start_store(cfg)?;
    store.initialize().await?;
    store.fetch_tickets(0).await?;

    let mut changes = store.subscribe_changes();
    print_tickets(&store.tickets().await?);
    info!("Watching for changes, press Ctrl-C to quit");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                print_tickets(&store.tickets().await?);
            }
        }
    }

    store.close().await?;
    Ok(())
}

async fn open(cfg: &DeskConfig, ticket_id: TicketId) -> Result<()> {
    let store = start_store(cfg)?;
    let threads = store.open_ticket(ticket_id.clone()).await?;
    print_threads(&threads);

    if let Err(e) = store.mark_ticket_as_read(ticket_id).await {
        warn!("Could not record read state: {:#}", e);
    }
    Ok(())
}

async fn reply(cfg: &DeskConfig, ticket_id: TicketId, channel: &str, text: String) -> Result<()> {
    let zoho = cfg
        .zoho
        .as_ref()
        .context("Zoho Desk is not configured (set ZOHO_ORG_ID and ZOHO_ACCESS_TOKEN)")?;
    let client = ZohoDeskClient::new(&zoho.base_url, zoho.org_id.clone(), zoho.access_token.clone())?;
    let handler = ReplyHandler::new(Arc::new(client));
    let channel = channel.to_string();

    tokio::task::spawn_blocking(move || handler.send_reply(&ticket_id, &text, &channel))
        .await
        .context("Reply task failed")?
}
