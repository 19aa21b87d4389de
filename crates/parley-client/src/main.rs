//! # parley
//!
//! Line-oriented terminal front end for the chat client.
//!
//! Plain lines are sent to the active channel. Commands start with `/`:
//! `/channels`, `/join <name|id>`, `/create <name>`, `/rename <id> <name>`,
//! `/remove <id>`, `/dismiss`, `/status`, `/resync`, `/quit`.

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use parley_client::{
    init_tracing, ChatView, ClientConfig, ClientEvent, SyncController, ViewSnapshot,
};
use parley_net::{ConnectionStatus, HttpChatApi, SocketIoTransport};
use parley_shared::constants::APP_NAME;
use parley_shared::types::{ChannelId, Session};

/// Number of messages printed when switching channels.
const BACKLOG_LINES: usize = 20;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Tracing and configuration
    // -----------------------------------------------------------------------
    init_tracing();
    info!("Starting {} v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::from_env();
    info!(?config, "Loaded configuration");

    let token = std::env::var("PARLEY_TOKEN").context("PARLEY_TOKEN is not set")?;
    let username = std::env::var("PARLEY_USERNAME").context("PARLEY_USERNAME is not set")?;

    // -----------------------------------------------------------------------
    // 2. Backend and controller
    // -----------------------------------------------------------------------
    let api = Arc::new(HttpChatApi::new(&config.api_url, config.request_timeout)?);
    let transport = Arc::new(SocketIoTransport::new(&config.push_url)?);
    info!(api = %config.api_url, push = %transport.endpoint(), "Backend endpoints");
    let controller = SyncController::new(api, transport, &config);
    let mut view = ChatView::new(controller.clone(), config.scroll_threshold_px);

    if let Err(e) = controller.start_session(Session::new(token, username)).await {
        warn!(error = %e, "Initial sync failed");
        println!("! initial sync failed: {e} (try /resync)");
    }
    render_channel(&view.snapshot()?);

    // -----------------------------------------------------------------------
    // 3. Input / update loop
    // -----------------------------------------------------------------------
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_line(&view, line.trim()).await? {
                    break;
                }
            }
            update = view.next_update() => {
                let Some(update) = update else { break };
                match update.event {
                    Some(ClientEvent::MessageAdded { channel_id, message_id, .. }) => {
                        let active = update.snapshot.active_channel.as_ref().map(|c| &c.id);
                        if active == Some(&channel_id) {
                            if let Some(m) = update.snapshot.messages.iter().find(|m| m.id == message_id) {
                                println!("<{}> {}", m.username, m.body);
                            }
                        }
                    }
                    Some(ClientEvent::SelectionChanged { .. }) | Some(ClientEvent::MessagesReset) => {
                        render_channel(&update.snapshot);
                    }
                    Some(ClientEvent::StateChanged { state }) => println!("* {state}"),
                    Some(ClientEvent::Notice { notice }) => println!("! {}", notice.message),
                    Some(ClientEvent::AuthRequired) => {
                        println!("! session rejected, sign in again");
                        break;
                    }
                    Some(ClientEvent::ChannelsChanged) | Some(ClientEvent::NoticesChanged) => {}
                    None => render_channel(&update.snapshot),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    controller.logout()?;
    info!("parley stopped");
    Ok(())
}

/// Handle one input line. Returns `false` when the user asked to quit.
async fn handle_line(view: &ChatView, line: &str) -> anyhow::Result<bool> {
    if line.is_empty() {
        return Ok(true);
    }

    let Some(command) = line.strip_prefix('/') else {
        if let Err(e) = view.send_message(line).await {
            println!("! send failed: {e}");
        }
        return Ok(true);
    };

    let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
    let rest = rest.trim();
    let snapshot = view.snapshot()?;

    let outcome = match name {
        "quit" => return Ok(false),
        "channels" => {
            for c in &snapshot.channels {
                let marker = if c.is_active { '*' } else { ' ' };
                println!("{marker} [{}] {}", c.id, c.name);
            }
            Ok(())
        }
        "join" => {
            let id = view
                .controller()
                .find_channel(rest)?
                .unwrap_or_else(|| ChannelId::from(rest));
            view.select_channel(&id)
        }
        "create" => view.create_channel(rest).await.map(|_| ()),
        "rename" => match rest.split_once(' ') {
            Some((id, new_name)) => view
                .rename_channel(&ChannelId::from(id), new_name)
                .await
                .map(|c| println!("* renamed to {}", c.name)),
            None => {
                println!("usage: /rename <id> <name>");
                Ok(())
            }
        },
        "remove" => view
            .remove_channel(&ChannelId::from(rest))
            .await
            .map(|()| println!("* removed {rest}")),
        "dismiss" => {
            for notice in &snapshot.notices {
                view.dismiss_notice(notice.id)?;
            }
            Ok(())
        }
        "status" => {
            let connection = match view.connection_status() {
                ConnectionStatus::Disconnected => "disconnected".to_string(),
                ConnectionStatus::Connecting => "connecting".to_string(),
                ConnectionStatus::Connected => "connected".to_string(),
                ConnectionStatus::Degraded { attempt } => format!("reconnecting (attempt {attempt})"),
            };
            println!(
                "* {} as {}, push {connection}, {} notice(s)",
                snapshot.state,
                snapshot.username.as_deref().unwrap_or("-"),
                snapshot.notices.len()
            );
            Ok(())
        }
        "resync" => view.controller().resync().await,
        other => {
            println!("unknown command: /{other}");
            Ok(())
        }
    };

    if let Err(e) = outcome {
        println!("! {e}");
    }
    Ok(true)
}

fn render_channel(snapshot: &ViewSnapshot) {
    let Some(channel) = &snapshot.active_channel else {
        println!("* no channel selected");
        return;
    };
    println!("== #{} ({} messages) ==", channel.name, snapshot.message_count);
    let skip = snapshot.messages.len().saturating_sub(BACKLOG_LINES);
    for m in &snapshot.messages[skip..] {
        println!("<{}> {}", m.username, m.body);
    }
}
