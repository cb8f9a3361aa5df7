//! Minimal terminal front end for the churn session layer.
//!
//! Prints every event the SDK emits and reads commands from stdin:
//!
//!   /join #channel      join a channel on the connected server
//!   /channel #channel   switch which channel plain text goes to
//!   /me <text>          send a CTCP ACTION to the current channel
//!   /nick <nick>        change nick on all sessions
//!   /quit               disconnect and exit
//!
//! Anything else is sent as a message to the current channel (the most
//! recently joined one).

mod config;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use churn_sdk::{Client, Event, EventKind};

#[derive(Parser)]
#[command(name = "churn", about = "Minimal IRC client on the churn session layer")]
pub struct Cli {
    /// IRC server (host or host:port)
    #[arg(long)]
    pub server: Option<String>,

    /// Nickname
    #[arg(long)]
    pub nick: Option<String>,

    /// Channels to join after connecting (comma separated)
    #[arg(long)]
    pub channels: Option<String>,
}

/// Display-side state: the channel plain input goes to, plus the NAMES
/// accumulation mirror (fragments are only shown once the flush arrives).
#[derive(Default)]
struct Ui {
    current: Mutex<Option<String>>,
    arriving: Mutex<HashMap<String, Vec<String>>>,
}

impl Ui {
    fn on_event(&self, event: &Event) {
        match event {
            Event::ChannelJoined { channel, host, .. } => {
                *self.current.lock() = Some(channel.clone());
                println!("* joined {channel} on {host}");
            }
            Event::MessageReceived {
                user,
                message,
                channel,
                ..
            } => println!("[{channel}] <{user}> {message}"),
            Event::ActionReceived {
                user,
                message,
                channel,
                ..
            } => println!("[{channel}] * {user} {message}"),
            Event::NoticeReceived {
                user,
                message,
                channel,
                ..
            } => println!("[{channel}] -{user}- {message}"),
            Event::TopicChanged { topic, channel, .. } => match topic {
                Some(topic) => println!("[{channel}] topic: {topic}"),
                None => println!("[{channel}] no topic set"),
            },
            Event::UserJoined { user, channel, .. } => println!("[{channel}] --> {user}"),
            Event::UserLeft { user, channel, .. } => println!("[{channel}] <-- {user}"),
            Event::UserRenamed {
                old_nick, new_nick, ..
            } => println!("* {old_nick} is now known as {new_nick}"),
            Event::ListNames { channel, names, .. } => {
                self.arriving
                    .lock()
                    .entry(channel.clone())
                    .or_default()
                    .extend(names.iter().cloned());
            }
            Event::EndNames { channel, .. } => {
                let names = self.arriving.lock().remove(channel).unwrap_or_default();
                println!("[{channel}] users: {}", names.join(" "));
            }
        }
    }
}

fn handle_input(client: &Client, host: &str, port: u16, ui: &Ui, line: &str) {
    if line.is_empty() {
        return;
    }

    let result = if let Some(rest) = line.strip_prefix('/') {
        let (command, args) = rest.split_once(' ').unwrap_or((rest, ""));
        let args = args.trim();
        match command {
            "join" if !args.is_empty() => client.join_channel(host, port, args),
            "channel" if !args.is_empty() => {
                *ui.current.lock() = Some(args.to_string());
                return;
            }
            "me" if !args.is_empty() => match ui.current.lock().clone() {
                Some(channel) => client.send_action(host, port, &channel, args),
                None => {
                    eprintln!("no channel joined yet");
                    return;
                }
            },
            "nick" if !args.is_empty() => client.change_nick(args),
            "quit" => {
                client.stop();
                return;
            }
            _ => {
                eprintln!("unknown command \"/{command}\"");
                return;
            }
        }
    } else {
        match ui.current.lock().clone() {
            Some(channel) => client.send_message(host, port, &channel, line),
            None => {
                eprintln!("no channel joined yet");
                return;
            }
        }
    };

    if let Err(e) = result {
        eprintln!("{e}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::Config::load();
    let resolved = config::Resolved::merge(&cli, &config);
    config::Config {
        server: Some(format!("{}:{}", resolved.host, resolved.port)),
        nick: Some(resolved.nick.clone()),
        channels: Some(resolved.channels.clone()),
    }
    .save();

    let client = Client::new();
    let ui = Arc::new(Ui::default());
    for kind in EventKind::ALL {
        let ui = ui.clone();
        client.register_handler(kind, move |event| {
            ui.on_event(event);
            Ok(())
        });
    }

    println!(
        "connecting to {}:{} as {}",
        resolved.host, resolved.port, resolved.nick
    );
    client.connect(&resolved.nick, &resolved.host, resolved.port);

    // Join the configured channels once the session has signed on.
    {
        let client = client.clone();
        let host = resolved.host.clone();
        let port = resolved.port;
        let channels = resolved.channels.clone();
        tokio::spawn(async move {
            for channel in channels {
                while client.join_channel(&host, port, &channel).is_err() {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
                tracing::debug!(channel = %channel, "autojoin sent");
            }
        });
    }

    // Stdin command loop.
    {
        let client = client.clone();
        let ui = ui.clone();
        let host = resolved.host.clone();
        let port = resolved.port;
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                handle_input(&client, &host, port, &ui, line.trim());
            }
        });
    }

    client.run().await;
    Ok(())
}
