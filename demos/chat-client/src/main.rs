//! Console chat over chatwire.
//!
//! Keeps a realtime channel to the relay and falls back to the HTTP API when
//! the channel is down. Type `/help` for commands.
//!
//!   cargo run -p chatwire-demo-relay
//!   cargo run -p chatwire-demo-client -- --user 1 --to 2
//!   cargo run -p chatwire-demo-client -- --user 2 --to 1

mod commands;
mod debounce;

use anyhow::Context;
use chatwire_client::{ClientConfig, PollOutcome, RealtimeClient, SessionStore, SessionToken};
use chatwire_core::{HandlerKey, Inbound, Intent, SendOutcome, Tag, UserId};
use clap::Parser;
use commands::Command;
use debounce::Debounce;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about = "Chat from the terminal over a chatwire channel")]
struct Args {
    /// TOML client configuration.
    #[arg(long, env = "CHATWIRE_CONFIG")]
    config: Option<PathBuf>,
    /// Who you are.
    #[arg(long, env = "CHATWIRE_USER")]
    user: UserId,
    /// Session token. Defaults to the user id, which is what the demo relay expects.
    #[arg(long, env = "CHATWIRE_TOKEN")]
    token: Option<String>,
    /// Conversation partner.
    #[arg(long)]
    to: Option<UserId>,
    /// Seconds between polls for missed messages while disconnected.
    #[arg(long, default_value_t = 15)]
    poll_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("chatwire_client=info".parse()?)
                .add_directive("chatwire_demo_client=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ClientConfig::default(),
    }
    .with_env_overrides()?;

    let token = args.token.clone().unwrap_or_else(|| args.user.to_string());
    let session = Arc::new(SessionStore::logged_in(
        SessionToken::new(token),
        args.user.clone(),
    ));
    let client = RealtimeClient::connect(config, session.clone())?;
    install_handlers(&client);

    let mut states = client.watch_state();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            println!("* {state}");
        }
    });

    let mut partner = args.to.clone();
    let mut reads = Debounce::new(Duration::from_millis(300));
    let mut poll = tokio::time::interval(Duration::from_secs(args.poll_secs.max(1)));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let command = match commands::parse(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(message) => {
                        println!("{message}");
                        continue;
                    }
                };
                match command {
                    Command::Quit => break,
                    Command::To(user) => {
                        println!("* talking to {user}");
                        partner = Some(user);
                    }
                    Command::Read(sender) => {
                        if reads.fire(sender.clone()) {
                            report(client.send(Intent::mark_read(sender)).await);
                        }
                    }
                    Command::Poll => report_poll(client.poll_missed_messages().await),
                    Command::Status => match client.snapshot().await {
                        Some(snapshot) => println!("* {snapshot:?}"),
                        None => println!("* connection manager stopped"),
                    },
                    Command::Say(text) => match &partner {
                        Some(to) => report(client.send(Intent::chat(to.clone(), text)).await),
                        None => println!("* pick someone with /to <user> first"),
                    },
                    Command::Typing => match &partner {
                        Some(to) => report(client.send(Intent::typing(to.clone())).await),
                        None => println!("* pick someone with /to <user> first"),
                    },
                }
            }

            _ = poll.tick() => {
                if !client.is_connected() {
                    report_poll(client.poll_missed_messages().await);
                }
            }
        }
    }

    session.logout();
    client.close();
    Ok(())
}

fn install_handlers(client: &RealtimeClient) {
    client.register(Tag::Chat, |inbound: &Inbound| {
        if let Some(envelope) = inbound.envelope() {
            let from = envelope.from.as_ref().map_or("?", UserId::as_str);
            println!("[{from}] {}", envelope.content.as_deref().unwrap_or_default());
        }
    });
    client.register(Tag::Typing, |inbound: &Inbound| {
        if let Some(from) = inbound.envelope().and_then(|e| e.from.as_ref()) {
            println!("* {from} is typing");
        }
    });
    client.register(Tag::MarkRead, |inbound: &Inbound| {
        if let Some(from) = inbound.envelope().and_then(|e| e.from.as_ref()) {
            println!("* {from} read your messages");
        }
    });
    client.register(Tag::NewMessages, |inbound: &Inbound| match inbound {
        Inbound::UnreadConversations(conversations) => {
            for conversation in conversations {
                let partner = conversation
                    .fields
                    .get("partnerId")
                    .map(|id| id.as_str().map_or_else(|| id.to_string(), str::to_string))
                    .unwrap_or_else(|| "?".to_string());
                println!("* {partner}: {} unread", conversation.unread_count);
            }
        }
        Inbound::Envelope(envelope) => {
            println!("* new messages: {}", envelope.content.as_deref().unwrap_or("?"));
        }
    });
    client.register(HandlerKey::Default, |inbound: &Inbound| {
        tracing::debug!(?inbound, "unhandled inbound");
    });
}

fn report(outcome: SendOutcome) {
    match outcome {
        SendOutcome::SentViaChannel => {}
        SendOutcome::SentViaFallback => println!("* sent (offline delivery)"),
        SendOutcome::Ignored => {}
        SendOutcome::Invalid => println!("* not sent: invalid message"),
        SendOutcome::Failed(failure) => println!("* not sent: {failure}"),
    }
}

fn report_poll(outcome: PollOutcome) {
    match outcome {
        PollOutcome::Failed => println!("* could not check for messages"),
        PollOutcome::Unhandled(count) | PollOutcome::Notified(count) => {
            tracing::debug!(count, "poll found unread conversations");
        }
        PollOutcome::Skipped | PollOutcome::NothingUnread => {}
    }
}
