use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::Parser;
use client_core::{
    config::load_settings, ClientEvent, ConversationRef, DeliveryState, SyncEngine,
};
use futures::StreamExt;
use shared::domain::{ConversationId, UserId};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    /// TOML settings file; environment variables still override it.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    api_base_url: Option<String>,
    #[arg(long)]
    hub_url: Option<String>,
    /// Without an email the cookie session is resumed, if any.
    #[arg(long)]
    email: Option<String>,
    #[arg(long, default_value = "")]
    password: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(url) = args.api_base_url {
        settings.api_base_url = url;
    }
    if let Some(url) = args.hub_url {
        settings.hub_url = url;
    }

    let engine = SyncEngine::from_settings(settings).context("failed to build engine")?;
    let printer = tokio::spawn(print_events(Arc::clone(&engine)));

    let user = match args.email {
        Some(email) => Some(engine.sign_in(&email, &args.password).await?),
        None => engine.restore_session().await?,
    };
    let Some(user) = user else {
        bail!("no session to resume; pass --email and --password");
    };
    println!("signed in as {} ({})", user.name, user.id);
    println!("commands: /list, /open <conversation-id>, /dm <user-id> <name>, /search <term>, /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Err(err) = run_command(&engine, line).await {
            println!("error: {err}");
        }
        if line == "/quit" {
            break;
        }
    }

    engine.stop().await;
    printer.abort();
    Ok(())
}

async fn run_command(engine: &Arc<SyncEngine>, line: &str) -> Result<()> {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    match command {
        "/quit" => {}
        "/list" => {
            engine.load_conversation_list().await?;
            print_list(engine).await;
        }
        "/open" => {
            let id = engine
                .open_conversation(ConversationRef::Existing(ConversationId::new(rest.trim())))
                .await?;
            print_messages(engine, &id).await;
        }
        "/dm" => {
            let (user_id, name) = rest.trim().split_once(' ').unwrap_or((rest.trim(), ""));
            if user_id.is_empty() {
                bail!("usage: /dm <user-id> <name>");
            }
            let id = engine
                .open_conversation(ConversationRef::User {
                    user_id: UserId::new(user_id),
                    display_name: name.trim().to_string(),
                })
                .await?;
            print_messages(engine, &id).await;
        }
        "/search" => {
            for user in engine.search_users(rest).await? {
                println!("  {}  {}", user.id, user.name);
            }
        }
        _ => {
            engine.send_message(line).await?;
        }
    }
    Ok(())
}

async fn print_list(engine: &SyncEngine) {
    for view in engine.snapshot().await.conversations {
        let marker = if view.unread { "*" } else { " " };
        let last = view
            .conversation
            .last_message
            .map(|last| last.body)
            .unwrap_or_default();
        println!(
            "{marker} {}  {}  [{:?}]  {last}",
            view.conversation.id, view.conversation.title, view.peer_presence
        );
    }
}

async fn print_messages(engine: &SyncEngine, id: &ConversationId) {
    let snapshot = engine.snapshot().await;
    if snapshot.open_conversation.as_ref() != Some(id) {
        return;
    }
    for message in snapshot.messages {
        let state = match message.delivery {
            DeliveryState::Sending => " (sending)",
            DeliveryState::Failed => " (failed)",
            DeliveryState::Delivered if message.is_read => " (read)",
            DeliveryState::Delivered => "",
        };
        println!(
            "  [{}] {}: {}{state}",
            message.sent_at.format("%H:%M"),
            message.sender_id,
            message.body
        );
    }
}

async fn print_events(engine: Arc<SyncEngine>) {
    let mut events = engine.subscribe();
    while let Some(event) = events.next().await {
        match event {
            ClientEvent::ConnectionStateChanged(state) => println!("~ connection: {state:?}"),
            ClientEvent::MessagesUpdated(id) => print_messages(&engine, &id).await,
            ClientEvent::UnreadChanged {
                conversation_id,
                unread: true,
            } => println!("~ new activity in {conversation_id}"),
            ClientEvent::PresenceChanged { user_id, presence } => {
                println!("~ {user_id} is {presence:?}")
            }
            ClientEvent::ConversationPromoted {
                provisional,
                persisted,
            } => println!("~ {provisional} is now {persisted}"),
            ClientEvent::SessionExpired => println!("~ session expired; please sign in again"),
            ClientEvent::Error(message) => warn!(%message, "cli: engine reported an error"),
            _ => {}
        }
    }
}
