//! Connection monitor

use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

use huddle_core::connection::{
    spawn_connection_task, ConnectionCommand, ConnectionEvent, ConnectionHandle,
    ConnectionSnapshot, TransportStatus, WebSocketTransport,
};
use huddle_core::Config;

use crate::output::{Output, OutputFormat};

/// Connect to the sync server and report connection changes until Ctrl-C
pub async fn run(config: &Config, url: Option<String>, output: &Output) -> Result<()> {
    let Some(url) = url.or_else(|| config.sync_url.clone()) else {
        bail!(
            "Sync URL not configured. Pass --url or set it with:\n  \
             huddle config set sync_url ws://your-server:3030"
        );
    };

    let (transport, status_rx) = WebSocketTransport::new(url.clone());
    output.message(&format!("Connecting to {} as {}", url, transport.peer_id()));

    let mut handle = spawn_connection_task(Arc::new(transport), status_rx, config.reconnect);
    let lines = BufReader::new(tokio::io::stdin()).lines();
    let result = monitor(&mut handle, lines, output).await;

    handle.shutdown().await;
    output.success("Connection closed");
    result
}

/// Print connection events and forward typed commands until Ctrl-C
///
/// Returns early when the connection task goes away. Closing the command
/// input leaves the event stream running.
async fn monitor<R>(
    handle: &mut ConnectionHandle,
    mut lines: Lines<R>,
    output: &Output,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut input_open = true;

    loop {
        tokio::select! {
            event = handle.event_rx.recv() => match event {
                Some(event) => print_event(&event, &handle.snapshot(), output),
                None => break,
            },
            line = lines.next_line(), if input_open => match line? {
                Some(line) => match parse_command(&line) {
                    Some(command) => {
                        if handle.command_tx.send(command).await.is_err() {
                            break;
                        }
                    }
                    None => output.message("Commands: disconnect, reconnect, offline, online"),
                },
                None => input_open = false,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}

fn parse_command(line: &str) -> Option<ConnectionCommand> {
    match line.trim().to_ascii_lowercase().as_str() {
        "disconnect" | "d" => Some(ConnectionCommand::Disconnect),
        "reconnect" | "r" => Some(ConnectionCommand::Reconnect),
        "offline" => Some(ConnectionCommand::SetOnline(false)),
        "online" => Some(ConnectionCommand::SetOnline(true)),
        _ => None,
    }
}

fn print_event(
    event: &ConnectionEvent,
    snapshot: &ConnectionSnapshot,
    output: &Output,
) {
    match output.format {
        OutputFormat::Json => match event {
            ConnectionEvent::StateChanged(status) => {
                let status = TransportStatus { status: *status };
                if let Ok(json) = serde_json::to_string(&status) {
                    println!("{}", json);
                }
            }
            _ => {
                if let Ok(json) = serde_json::to_string(snapshot) {
                    println!("{}", json);
                }
            }
        },
        OutputFormat::Quiet => {
            if let ConnectionEvent::StateChanged(status) = event {
                println!("{}", status);
            }
        }
        OutputFormat::Human => match event {
            ConnectionEvent::StateChanged(status) => println!("● {}", status),
            ConnectionEvent::RetryScheduled { attempt, delay } => {
                println!("  retry #{} in {}s", attempt, delay.as_secs())
            }
            ConnectionEvent::Reconnecting { attempt } => println!("  reconnecting (#{})", attempt),
            ConnectionEvent::OnlineChanged(online) => {
                println!("  {}", if *online { "online" } else { "offline" });
                if let Some(message) = snapshot.status_message() {
                    println!("  {}", message);
                }
            }
        },
    }
}
