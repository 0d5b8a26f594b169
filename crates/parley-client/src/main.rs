//! Parley command-line client.
//!
//! # Usage
//!
//! ```bash
//! parley --server ws://localhost:3000/chat --user alice --conversation 42
//! ```
//!
//! Lines typed on stdin are sent to the open conversation. Commands:
//!
//! - `/open <id>`: open a conversation
//! - `/close`: close the open conversation
//! - `/typing`: signal a keystroke
//! - `/retry <message id>`: retry an errored message
//! - `/quit`: exit

use std::{
    io::{self, Write},
    time::Duration,
};

use clap::Parser;
use parley_client::{
    Command, NoHistory, Runtime, RuntimeConfig, RuntimeError, RuntimeHandle, SystemEnv,
    websocket::{ReconnectConfig, WebSocketTransport},
};
use parley_core::{DeliveryStatus, MessageId, SyncConfig, Update};
use parley_proto::{ConversationId, UserId};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Parley chat client
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(about = "Real-time chat client")]
#[command(version)]
struct Args {
    /// WebSocket endpoint of the chat server
    #[arg(short, long, default_value = "ws://127.0.0.1:3000/chat")]
    server: String,

    /// Local user id
    #[arg(short, long)]
    user: String,

    /// Conversation to open on start
    #[arg(short, long)]
    conversation: Option<String>,

    /// Acknowledgement deadline for sends, in milliseconds
    #[arg(long, default_value = "10000")]
    ack_timeout_ms: u64,

    /// Delay before retrying a failed send, in milliseconds
    #[arg(long, default_value = "3000")]
    retry_delay_ms: u64,

    /// Idle time that ends a typing burst, in milliseconds
    #[arg(long, default_value = "1000")]
    typing_idle_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();

    let user_id = UserId::new(&args.user).ok_or("user id must not be blank")?;
    let transport = WebSocketTransport::new(&args.server, ReconnectConfig::default())?;
    let sync = SyncConfig {
        ack_timeout: Duration::from_millis(args.ack_timeout_ms),
        retry_delay: Duration::from_millis(args.retry_delay_ms),
        typing_idle: Duration::from_millis(args.typing_idle_ms),
        ..SyncConfig::default()
    };

    tracing::info!(server = %args.server, user = %user_id, "parley starting");

    let (runtime, handle) =
        Runtime::new(transport, NoHistory, SystemEnv::new(), user_id, sync, RuntimeConfig::default());
    let printer = tokio::spawn(print_updates(handle.subscribe()));
    let runtime = tokio::spawn(runtime.run());

    if let Some(conversation) = args.conversation {
        let conversation_id =
            ConversationId::new(&conversation).ok_or("conversation id must not be blank")?;
        handle.send(Command::Open(conversation_id)).await?;
    }

    read_commands(&handle).await?;
    drop(handle);

    runtime.await??;
    printer.abort();
    Ok(())
}

async fn read_commands(handle: &RuntimeHandle) -> Result<(), RuntimeError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let command = match parse_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(usage) => {
                writeln!(io::stderr().lock(), "{usage}")?;
                continue;
            },
        };
        let quit = command == Command::Shutdown;
        handle.send(command).await?;
        if quit {
            break;
        }
    }
    Ok(())
}

fn parse_line(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Send(line.to_owned())));
    };

    let (name, arg) = rest.split_once(' ').map_or((rest, ""), |(n, a)| (n, a.trim()));
    let command = match name {
        "open" => Command::Open(
            ConversationId::new(arg).ok_or_else(|| "usage: /open <conversation id>".to_owned())?,
        ),
        "close" => Command::Close,
        "typing" => Command::Keystroke,
        "retry" => {
            Command::Retry(MessageId::parse(arg).ok_or_else(|| "usage: /retry <message id>".to_owned())?)
        },
        "quit" => Command::Shutdown,
        other => return Err(format!("unknown command /{other}")),
    };
    Ok(Some(command))
}

async fn print_updates(mut updates: broadcast::Receiver<Update>) {
    loop {
        let update = match updates.recv().await {
            Ok(update) => update,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "display fell behind");
                continue;
            },
            Err(broadcast::error::RecvError::Closed) => return,
        };
        if let Err(error) = print_update(&update) {
            tracing::warn!(%error, "stdout unavailable");
            return;
        }
    }
}

fn print_update(update: &Update) -> io::Result<()> {
    let mut out = io::stdout().lock();
    match update {
        Update::Transcript { conversation_id, messages } => {
            writeln!(out, "--- {conversation_id} ---")?;
            for message in messages {
                let marker = match message.status {
                    DeliveryStatus::Sending => " (sending)",
                    DeliveryStatus::Delivered => "",
                    DeliveryStatus::Error => " (failed)",
                };
                writeln!(out, "[{}] {}: {}{marker}", message.id, message.sender_id, message.content)?;
            }
        },
        Update::Typing { conversation_id, users } if !users.is_empty() => {
            let names: Vec<String> = users.iter().map(ToString::to_string).collect();
            writeln!(out, "{conversation_id}: {} typing", names.join(", "))?;
        },
        Update::Typing { .. } | Update::ComposerCleared { .. } => {},
        Update::Conversations(summaries) => {
            for summary in summaries {
                writeln!(
                    out,
                    "{} {} ({} unread)",
                    summary.id, summary.display_name, summary.unread_count
                )?;
            }
        },
        Update::Connection(state) => writeln!(out, "* {state}")?,
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_messages() {
        assert_eq!(parse_line("  hello  "), Ok(Some(Command::Send("hello".into()))));
        assert_eq!(parse_line("   "), Ok(None));
    }

    #[test]
    fn slash_commands_parse() {
        assert_eq!(
            parse_line("/open 42"),
            Ok(Some(Command::Open(ConversationId::new("42").expect("id"))))
        );
        assert_eq!(parse_line("/retry temp-3"), Ok(Some(Command::Retry(MessageId::Local(3)))));
        assert_eq!(parse_line("/quit"), Ok(Some(Command::Shutdown)));
        assert!(parse_line("/retry").is_err());
        assert!(parse_line("/dance").is_err());
    }
}
