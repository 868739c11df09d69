//! Interactive terminal client for PairChat.
//!
//! Usage: `pairchat <self-id> [peer-id]`. Lines are sent as messages;
//! `/peer <id>` switches the conversation, `/login <id>` and `/logout`
//! exercise the identity transitions, `/quit` exits.

mod history;

use anyhow::Context;
use colored::Colorize;
use history::HttpHistoryStore;
use pairchat_protocol::ParticipantId;
use pairchat_sync::tcp::TcpChannelTransport;
use pairchat_sync::{
    ChannelConfig, ChannelStatus, ChatSession, ConversationView, DisplayRole, DisplayedMessage,
    SyncError,
};
use std::env;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    // Default to warnings only; the terminal belongs to the conversation.
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let mut args = env::args().skip(1);
    let self_id = args
        .next()
        .context("usage: pairchat <self-id> [peer-id]")?;
    let peer = args.next();

    let http_base =
        env::var("PAIRCHAT_HTTP").unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());
    let relay_addr = env::var("PAIRCHAT_RELAY").unwrap_or_else(|_| "127.0.0.1:5001".to_string());

    let (identity_tx, identity_rx) = watch::channel(Some(ParticipantId::new(self_id)));
    let handle = ChatSession::spawn(
        TcpChannelTransport::new(relay_addr),
        HttpHistoryStore::new(http_base),
        identity_rx,
        ChannelConfig::default(),
    );
    if let Some(peer) = peer {
        handle.set_peer(Some(ParticipantId::new(peer)))?;
    }

    println!(
        "{}",
        "commands: /peer <id>, /login <id>, /logout, /quit".dimmed()
    );

    let mut view_rx = handle.view();
    tokio::spawn(async move {
        let mut last: Vec<DisplayedMessage> = Vec::new();
        loop {
            if view_rx.changed().await.is_err() {
                break;
            }
            let view = view_rx.borrow_and_update().clone();
            render(&view, &mut last);
        }
    });

    let mut status_rx = handle.status();
    tokio::spawn(async move {
        let mut last = *status_rx.borrow();
        while status_rx.changed().await.is_ok() {
            let status = *status_rx.borrow_and_update();
            if status != last {
                print_status(status);
                last = status;
            }
        }
    });

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix("/peer ") {
            handle.set_peer(Some(ParticipantId::new(rest.trim())))?;
        } else if let Some(rest) = line.strip_prefix("/login ") {
            identity_tx.send(Some(ParticipantId::new(rest.trim())))?;
        } else if line == "/logout" {
            identity_tx.send(None)?;
            println!("{}", "signed out".dimmed());
        } else if line == "/quit" {
            handle.shutdown();
            break;
        } else if line.starts_with('/') {
            eprintln!("unknown command: {line}");
        } else {
            match handle.send(line).await {
                Ok(()) => {}
                Err(SyncError::AuthRequired) => {
                    eprintln!("{}", "sign in first: /login <id>".red())
                }
                Err(err) => eprintln!("{}", format!("send rejected: {err}").red()),
            }
        }
    }
    Ok(())
}

/// Print new rows incrementally; a reset or history prepend reprints the
/// whole conversation under a divider.
fn render(view: &ConversationView, last: &mut Vec<DisplayedMessage>) {
    let start = if is_extension_of(&view.messages, last) {
        last.len()
    } else {
        if !view.messages.is_empty() || !last.is_empty() {
            println!("{}", "── conversation ──".dimmed());
        }
        0
    };
    for message in &view.messages[start..] {
        print_message(message);
    }
    *last = view.messages.clone();
}

/// Prefix check that ignores confirmation flips on existing rows.
fn is_extension_of(current: &[DisplayedMessage], last: &[DisplayedMessage]) -> bool {
    current.len() >= last.len()
        && current
            .iter()
            .zip(last.iter())
            .all(|(a, b)| a.sender == b.sender && a.body == b.body)
}

fn print_message(message: &DisplayedMessage) {
    match message.role {
        DisplayRole::Own => println!("{} {}", "you:".green().bold(), message.body),
        DisplayRole::Other => println!(
            "{} {}",
            format!("{}:", message.sender).cyan().bold(),
            message.body
        ),
    }
}

fn print_status(status: ChannelStatus) {
    match status {
        ChannelStatus::Connected => eprintln!("{}", "* connected".green()),
        ChannelStatus::Reconnecting => eprintln!("{}", "* reconnecting".yellow()),
        ChannelStatus::Idle => eprintln!("{}", "* no conversation".dimmed()),
    }
}
