//! Persistent configuration for the churn CLI.
//!
//! Config file lives at `~/.config/churn/cli.toml`. CLI arguments override
//! the file; the file is rewritten with the resolved values on startup so
//! the next bare `churn` invocation reconnects to the same place.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use churn_sdk::DEFAULT_PORT;

/// Default IRC server.
pub const DEFAULT_SERVER: &str = "irc.libera.chat";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Server address (host or host:port).
    pub server: Option<String>,
    /// IRC nickname.
    pub nick: Option<String>,
    /// Channels to join after connecting.
    pub channels: Option<Vec<String>>,
}

fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("churn")
        .join("cli.toml")
}

impl Config {
    pub fn load() -> Self {
        let path = config_path();
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(s) => match toml::from_str(&s) {
                    Ok(c) => return c,
                    Err(e) => eprintln!("Warning: bad config file {}: {e}", path.display()),
                },
                Err(e) => eprintln!("Warning: can't read {}: {e}", path.display()),
            }
        }
        Self::default()
    }

    pub fn save(&self) {
        let path = config_path();
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        match toml::to_string_pretty(self) {
            Ok(s) => {
                if let Err(e) = std::fs::write(&path, s) {
                    eprintln!("Warning: can't save config: {e}");
                }
            }
            Err(e) => eprintln!("Warning: can't serialize config: {e}"),
        }
    }
}

/// Effective settings after merging CLI args > config file > defaults.
pub struct Resolved {
    pub host: String,
    pub port: u16,
    pub nick: String,
    pub channels: Vec<String>,
}

impl Resolved {
    pub fn merge(cli: &super::Cli, config: &Config) -> Self {
        let server = cli
            .server
            .clone()
            .or_else(|| config.server.clone())
            .unwrap_or_else(|| DEFAULT_SERVER.to_string());

        let (host, port) = match server.rsplit_once(':') {
            Some((h, p)) => match p.parse() {
                Ok(port) => (h.to_string(), port),
                Err(_) => (server.clone(), DEFAULT_PORT),
            },
            None => (server.clone(), DEFAULT_PORT),
        };

        let nick = cli
            .nick
            .clone()
            .or_else(|| config.nick.clone())
            .unwrap_or_else(|| {
                whoami::fallible::username().unwrap_or_else(|_| "guest".to_string())
            });

        let channels = if let Some(ref list) = cli.channels {
            list.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        } else {
            config.channels.clone().unwrap_or_default()
        };

        Self {
            host,
            port,
            nick,
            channels,
        }
    }
}
