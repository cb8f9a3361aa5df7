//! One server connection: registration, the read loop, and reconnects.
//!
//! Each session is a tokio task that exclusively owns its socket and its
//! [`SessionState`]. Inbound bytes are framed, parsed, folded into state,
//! and forwarded to the client's event queue; every line extracted from a
//! read is processed to completion before the next read, so subscribers see
//! a total order of events per session. Outbound commands arrive over an
//! unbounded channel and are written to the wire immediately.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use rand::Rng;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::event::Event;
use crate::message::{LineBuffer, Message};
use crate::parser;
use crate::state::{SessionState, SessionStatus};

/// Reconnect backoff parameters.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Ceiling for the backoff.
    pub max_delay: Duration,
    /// Multiplier applied after each failed attempt.
    pub backoff_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Next backoff delay: grow by the factor, add up to 25% jitter, cap.
    pub(crate) fn next_delay(&self, current: Duration) -> Duration {
        let mut grown = (current.as_millis() as f64 * self.backoff_factor) as u64;
        let jitter_cap = current.as_millis() as u64 / 4;
        if jitter_cap > 0 {
            grown += rand::thread_rng().gen_range(0..=jitter_cap);
        }
        Duration::from_millis(grown.min(self.max_delay.as_millis() as u64))
    }
}

/// Outbound operations routed to a session task by the client.
#[derive(Debug)]
pub(crate) enum SessionCommand {
    Privmsg { channel: String, text: String },
    Action { channel: String, text: String },
    Join { channel: String },
    Nick { nick: String },
    Quit,
}

/// Routing entry for one signed-on session, held in the client registry.
#[derive(Debug, Clone)]
pub(crate) struct SessionHandle {
    pub(crate) id: u64,
    pub(crate) cmd_tx: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    pub(crate) fn send(&self, cmd: SessionCommand) -> Result<(), ()> {
        self.cmd_tx.send(cmd).map_err(|_| ())
    }
}

pub(crate) type Registry = Arc<Mutex<HashMap<String, SessionHandle>>>;

/// Why one connection attempt ended.
#[derive(Debug)]
enum Exit {
    /// User-initiated shutdown; do not reconnect.
    Quit,
    /// Transport died or the server went silent; reconnect applies.
    ConnectionLost,
}

/// Inactivity threshold before we probe the server.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);
/// Silence threshold after which the connection is considered dead.
const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(120);

/// Give up on nick alternates after this many ERR_NICKNAMEINUSE replies.
const MAX_NICK_TRIES: u32 = 5;

/// Everything one session task needs; built by `Client::connect`.
pub(crate) struct Session {
    pub(crate) id: u64,
    pub(crate) nick: String,
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) realname: String,
    pub(crate) registry: Registry,
    pub(crate) event_tx: mpsc::Sender<Event>,
    pub(crate) cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
    pub(crate) cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    pub(crate) reconnect: ReconnectConfig,
    pub(crate) stopping: Arc<AtomicBool>,
}

impl Session {
    /// Connect, register, and read until quit or shutdown, reconnecting
    /// with backoff after connection loss. Channels joined through the
    /// command API are re-joined after every successful registration.
    pub(crate) async fn run(mut self) {
        let mut delay = self.reconnect.initial_delay;
        let mut autojoin: Vec<String> = Vec::new();
        loop {
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }
            tracing::debug!(host = %self.host, port = self.port, "connecting");
            match TcpStream::connect((self.host.as_str(), self.port)).await {
                Ok(stream) => {
                    delay = self.reconnect.initial_delay;
                    let (reader, writer) = stream.into_split();
                    // Fresh state per connection: membership and topics are
                    // rebuilt from server replies, never carried over.
                    let mut state = SessionState::new(&self.nick, &self.host, self.port);
                    let result = self.drive(reader, writer, &mut state, &mut autojoin).await;
                    // Carry a server-confirmed rename into the next
                    // registration attempt.
                    self.nick = state.nick.clone();
                    self.unregister();
                    match result {
                        Ok(Exit::Quit) => break,
                        Ok(Exit::ConnectionLost) => {
                            tracing::info!(host = %self.host, port = self.port, "connection lost");
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, host = %self.host, port = self.port, "session error");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        host = %self.host,
                        port = self.port,
                        delay_ms = delay.as_millis() as u64,
                        "connect failed, retrying"
                    );
                }
            }
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }
            if !self.backoff_wait(delay).await {
                break;
            }
            delay = self.reconnect.next_delay(delay);
        }
        self.unregister();
    }

    /// Sleep out a reconnect delay, cut short by a shutdown command.
    /// Returns `false` when the session should exit instead of retrying.
    async fn backoff_wait(&mut self, delay: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + delay;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return true,
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(SessionCommand::Quit) | None => return false,
                    // Not addressable while disconnected; drop it.
                    Some(_) => {}
                }
            }
        }
    }

    /// Drop our registry entry, unless a replacement session already owns
    /// the key.
    fn unregister(&self) {
        let key = format!("{}:{}", self.host, self.port);
        let mut registry = self.registry.lock();
        if registry.get(&key).is_some_and(|h| h.id == self.id) {
            registry.remove(&key);
        }
    }

    /// Run one established connection to completion.
    async fn drive<R, W>(
        &mut self,
        mut reader: R,
        mut writer: W,
        state: &mut SessionState,
        autojoin: &mut Vec<String>,
    ) -> Result<Exit>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let Session {
            id,
            realname,
            registry,
            event_tx,
            cmd_rx,
            cmd_tx,
            ..
        } = self;

        let base_nick = state.nick.clone();
        writer
            .write_all(format!("NICK {}\r\n", state.nick).as_bytes())
            .await?;
        writer
            .write_all(format!("USER {} 0 * :{}\r\n", state.nick, realname).as_bytes())
            .await?;

        let mut lines = LineBuffer::new();
        let mut chunk = vec![0u8; 4096];
        let mut nick_tries: u32 = 0;
        let mut last_activity = tokio::time::Instant::now();
        let mut ping_deadline = last_activity + KEEPALIVE_INTERVAL;

        loop {
            tokio::select! {
                result = reader.read(&mut chunk) => {
                    let n = result?;
                    if n == 0 {
                        return Ok(Exit::ConnectionLost);
                    }
                    last_activity = tokio::time::Instant::now();
                    ping_deadline = last_activity + KEEPALIVE_INTERVAL;
                    lines.extend(&chunk[..n]);

                    while let Some(line) = lines.next_line() {
                        let Some(msg) = Message::parse(&line) else {
                            if !line.is_empty() {
                                tracing::debug!(line = %line, "dropping unparseable line");
                            }
                            continue;
                        };
                        match msg.command.as_str() {
                            "PING" => {
                                let token = msg.params.first().map(String::as_str).unwrap_or("");
                                writer.write_all(format!("PONG :{token}\r\n").as_bytes()).await?;
                            }
                            // ERR_NICKNAMEINUSE before registration: try an
                            // alternate before giving the connection up.
                            "433" if state.status != SessionStatus::Registered => {
                                nick_tries += 1;
                                if nick_tries > MAX_NICK_TRIES {
                                    tracing::warn!(nick = %base_nick, "nick exhausted, reconnecting");
                                    return Ok(Exit::ConnectionLost);
                                }
                                let alt = format!("{base_nick}{nick_tries}");
                                writer.write_all(format!("NICK {alt}\r\n").as_bytes()).await?;
                                state.nick = alt;
                            }
                            // RPL_WELCOME: registration complete. Only now
                            // does the session become addressable.
                            "001" => {
                                if let Some(confirmed) = msg.params.first()
                                    && !confirmed.is_empty()
                                {
                                    state.nick = confirmed.clone();
                                }
                                state.status = SessionStatus::Registered;
                                tracing::info!(host = %state.host, port = state.port, nick = %state.nick, "registered");
                                registry.lock().insert(
                                    format!("{}:{}", state.host, state.port),
                                    SessionHandle { id: *id, cmd_tx: cmd_tx.clone() },
                                );
                                for channel in autojoin.iter() {
                                    writer.write_all(format!("JOIN {channel}\r\n").as_bytes()).await?;
                                }
                            }
                            // RPL_ISUPPORT: membership prefix order.
                            "005" => state.absorb_isupport(&msg.params),
                            _ => {
                                for event in parser::events_for(&msg, state) {
                                    state.apply(&event);
                                    if event_tx.send(event).await.is_err() {
                                        // Client is gone; nothing left to serve.
                                        return Ok(Exit::Quit);
                                    }
                                }
                            }
                        }
                    }
                }
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(SessionCommand::Quit) | None => {
                            let _ = writer.write_all(b"QUIT\r\n").await;
                            return Ok(Exit::Quit);
                        }
                        Some(cmd) => {
                            execute_command(&mut writer, cmd, state, event_tx, autojoin).await?;
                        }
                    }
                }
                _ = tokio::time::sleep_until(ping_deadline) => {
                    if last_activity.elapsed() > KEEPALIVE_TIMEOUT {
                        tracing::info!(host = %state.host, port = state.port, "ping timeout");
                        return Ok(Exit::ConnectionLost);
                    }
                    writer.write_all(b"PING :keepalive\r\n").await?;
                    ping_deadline = tokio::time::Instant::now() + KEEPALIVE_INTERVAL;
                }
            }
        }
    }
}

/// Write one outbound command to the wire, synthesizing the local echo
/// event for messages and actions so the UI renders its own output without
/// special-casing.
async fn execute_command<W: AsyncWrite + Unpin>(
    writer: &mut W,
    cmd: SessionCommand,
    state: &SessionState,
    event_tx: &mpsc::Sender<Event>,
    autojoin: &mut Vec<String>,
) -> Result<()> {
    match cmd {
        SessionCommand::Privmsg { channel, text } => {
            writer
                .write_all(format!("PRIVMSG {channel} :{text}\r\n").as_bytes())
                .await?;
            let _ = event_tx
                .send(Event::MessageReceived {
                    user: state.nick.clone(),
                    message: text,
                    channel,
                    host: state.host.clone(),
                    port: state.port,
                })
                .await;
        }
        SessionCommand::Action { channel, text } => {
            writer
                .write_all(format!("PRIVMSG {channel} :\u{1}ACTION {text}\u{1}\r\n").as_bytes())
                .await?;
            let _ = event_tx
                .send(Event::ActionReceived {
                    user: state.nick.clone(),
                    message: text,
                    channel,
                    host: state.host.clone(),
                    port: state.port,
                })
                .await;
        }
        SessionCommand::Join { channel } => {
            writer
                .write_all(format!("JOIN {channel}\r\n").as_bytes())
                .await?;
            if !autojoin.contains(&channel) {
                autojoin.push(channel);
            }
        }
        SessionCommand::Nick { nick } => {
            writer
                .write_all(format!("NICK {nick}\r\n").as_bytes())
                .await?;
        }
        SessionCommand::Quit => {
            writer.write_all(b"QUIT\r\n").await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};

    #[test]
    fn backoff_grows_and_caps() {
        let config = ReconnectConfig::default();
        let next = config.next_delay(Duration::from_secs(1));
        assert!(next >= Duration::from_secs(2));
        assert!(next <= Duration::from_millis(2250));

        let capped = config.next_delay(Duration::from_secs(60));
        assert_eq!(capped, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn drive_registers_echoes_and_quits() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let (read_half, write_half) = tokio::io::split(client_io);
        let (event_tx, mut event_rx) = mpsc::channel(64);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let mut session = Session {
            id: 1,
            nick: "alice".into(),
            host: "irc.test".into(),
            port: 6667,
            realname: "tester".into(),
            registry: Arc::new(Mutex::new(HashMap::new())),
            event_tx,
            cmd_rx,
            cmd_tx: cmd_tx.clone(),
            reconnect: ReconnectConfig::default(),
            stopping: Arc::new(AtomicBool::new(false)),
        };
        let mut state = SessionState::new("alice", "irc.test", 6667);
        let mut autojoin = Vec::new();

        let server = tokio::spawn(async move {
            let (r, mut w) = tokio::io::split(server_io);
            let mut lines = BufReader::new(r).lines();
            assert_eq!(lines.next_line().await.unwrap().unwrap(), "NICK alice");
            assert!(
                lines
                    .next_line()
                    .await
                    .unwrap()
                    .unwrap()
                    .starts_with("USER alice 0 * :")
            );
            w.write_all(b":irc.test 001 alice :Welcome\r\n").await.unwrap();

            w.write_all(b"PING :keep\r\n").await.unwrap();
            assert_eq!(lines.next_line().await.unwrap().unwrap(), "PONG :keep");

            cmd_tx
                .send(SessionCommand::Privmsg {
                    channel: "#chan".into(),
                    text: "hi".into(),
                })
                .unwrap();
            assert_eq!(
                lines.next_line().await.unwrap().unwrap(),
                "PRIVMSG #chan :hi"
            );

            cmd_tx
                .send(SessionCommand::Action {
                    channel: "#chan".into(),
                    text: "waves".into(),
                })
                .unwrap();
            assert_eq!(
                lines.next_line().await.unwrap().unwrap(),
                "PRIVMSG #chan :\u{1}ACTION waves\u{1}"
            );

            cmd_tx.send(SessionCommand::Quit).unwrap();
            assert_eq!(lines.next_line().await.unwrap().unwrap(), "QUIT");
        });

        let exit = session
            .drive(read_half, write_half, &mut state, &mut autojoin)
            .await
            .unwrap();
        assert!(matches!(exit, Exit::Quit));
        server.await.unwrap();

        // Registration succeeded and the echoes carry the local nick.
        assert_eq!(state.status, SessionStatus::Registered);
        assert!(matches!(
            event_rx.recv().await.unwrap(),
            Event::MessageReceived { user, message, channel, .. }
                if user == "alice" && message == "hi" && channel == "#chan"
        ));
        assert!(matches!(
            event_rx.recv().await.unwrap(),
            Event::ActionReceived { user, message, .. }
                if user == "alice" && message == "waves"
        ));
    }

    #[tokio::test]
    async fn backoff_wait_ends_early_on_quit() {
        let (event_tx, _event_rx) = mpsc::channel(8);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let mut session = Session {
            id: 1,
            nick: "alice".into(),
            host: "irc.test".into(),
            port: 6667,
            realname: "tester".into(),
            registry: Arc::new(Mutex::new(HashMap::new())),
            event_tx,
            cmd_rx,
            cmd_tx: cmd_tx.clone(),
            reconnect: ReconnectConfig::default(),
            stopping: Arc::new(AtomicBool::new(false)),
        };

        cmd_tx.send(SessionCommand::Quit).unwrap();
        let retry = tokio::time::timeout(
            Duration::from_secs(1),
            session.backoff_wait(Duration::from_secs(60)),
        )
        .await
        .expect("quit did not interrupt the backoff sleep");
        assert!(!retry);

        // With nothing on the command channel the full delay elapses.
        assert!(session.backoff_wait(Duration::from_millis(5)).await);
    }

    #[tokio::test]
    async fn drive_retries_alternate_nicks() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let (read_half, write_half) = tokio::io::split(client_io);
        let (event_tx, _event_rx) = mpsc::channel(64);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let mut session = Session {
            id: 1,
            nick: "alice".into(),
            host: "irc.test".into(),
            port: 6667,
            realname: "tester".into(),
            registry: Arc::new(Mutex::new(HashMap::new())),
            event_tx,
            cmd_rx,
            cmd_tx: cmd_tx.clone(),
            reconnect: ReconnectConfig::default(),
            stopping: Arc::new(AtomicBool::new(false)),
        };
        let mut state = SessionState::new("alice", "irc.test", 6667);
        let mut autojoin = Vec::new();

        let server = tokio::spawn(async move {
            let (r, mut w) = tokio::io::split(server_io);
            let mut lines = BufReader::new(r).lines();
            assert_eq!(lines.next_line().await.unwrap().unwrap(), "NICK alice");
            lines.next_line().await.unwrap().unwrap(); // USER
            w.write_all(b":irc.test 433 * alice :Nickname is already in use\r\n")
                .await
                .unwrap();
            assert_eq!(lines.next_line().await.unwrap().unwrap(), "NICK alice1");
            w.write_all(b":irc.test 001 alice1 :Welcome\r\n").await.unwrap();
            cmd_tx.send(SessionCommand::Quit).unwrap();
            assert_eq!(lines.next_line().await.unwrap().unwrap(), "QUIT");
        });

        let exit = session
            .drive(read_half, write_half, &mut state, &mut autojoin)
            .await
            .unwrap();
        assert!(matches!(exit, Exit::Quit));
        server.await.unwrap();
        assert_eq!(state.nick, "alice1");
    }
}
