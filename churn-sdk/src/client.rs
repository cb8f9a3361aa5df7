//! The connection manager and outbound command API.
//!
//! A [`Client`] owns the registry of live sessions (keyed by `host:port`),
//! the dispatcher, and the event queue every session task feeds. It is the
//! only type a presentation layer needs: register handlers, connect, issue
//! commands, and drive [`Client::run`]. Clones share the same state, so a
//! handle can be captured by UI callbacks and background tasks alike.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::dispatch::Dispatcher;
use crate::error::Error;
use crate::event::{Event, EventKind};
use crate::session::{ReconnectConfig, Registry, Session, SessionCommand};

/// Default IRC port.
pub const DEFAULT_PORT: u16 = 6667;

/// Connection parameters shared by every session a client opens.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Real name sent during USER registration.
    pub realname: String,
    /// Reconnect backoff parameters.
    pub reconnect: ReconnectConfig,
    /// Event queue depth. Sessions stall rather than drop events when the
    /// consumer falls this far behind.
    pub event_buffer: usize,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            realname: "churn user".to_string(),
            reconnect: ReconnectConfig::default(),
            event_buffer: 4096,
        }
    }
}

struct Inner {
    config: ConnectConfig,
    registry: Registry,
    /// Command senders for every session ever spawned. The registry only
    /// holds signed-on sessions; `stop` broadcasts here so sessions still
    /// connecting or backing off exit too.
    sessions: Mutex<Vec<mpsc::UnboundedSender<SessionCommand>>>,
    dispatcher: Mutex<Dispatcher>,
    event_tx: Mutex<Option<mpsc::Sender<Event>>>,
    event_rx: Mutex<Option<mpsc::Receiver<Event>>>,
    stopping: Arc<AtomicBool>,
    next_session_id: AtomicU64,
}

/// Handle to the session layer. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn new() -> Self {
        Self::with_config(ConnectConfig::default())
    }

    pub fn with_config(config: ConnectConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer);
        Client {
            inner: Arc::new(Inner {
                config,
                registry: Registry::default(),
                sessions: Mutex::new(Vec::new()),
                dispatcher: Mutex::new(Dispatcher::new()),
                event_tx: Mutex::new(Some(event_tx)),
                event_rx: Mutex::new(Some(event_rx)),
                stopping: Arc::new(AtomicBool::new(false)),
                next_session_id: AtomicU64::new(1),
            }),
        }
    }

    /// Subscribe to one event kind. Subscribers for a kind run in
    /// registration order from the [`run`](Client::run) loop; a failing
    /// subscriber is logged and skipped.
    pub fn register_handler<F>(&self, kind: EventKind, handler: F)
    where
        F: FnMut(&Event) -> anyhow::Result<()> + Send + 'static,
    {
        self.inner.dispatcher.lock().register(kind, Box::new(handler));
    }

    /// Open a session to `host:port` and keep it alive (reconnecting with
    /// backoff) until [`stop`](Client::stop).
    ///
    /// A second call for the same `(host, port)` opens an independent
    /// connection; whichever signs on last owns the registry entry for
    /// that key.
    pub fn connect(&self, nickname: &str, host: &str, port: u16) {
        let Some(event_tx) = self.inner.event_tx.lock().clone() else {
            tracing::error!(host, port, "connect() called after stop()");
            return;
        };
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        self.inner.sessions.lock().push(cmd_tx.clone());
        let session = Session {
            id: self.inner.next_session_id.fetch_add(1, Ordering::Relaxed),
            nick: nickname.to_string(),
            host: host.to_string(),
            port,
            realname: self.inner.config.realname.clone(),
            registry: self.inner.registry.clone(),
            event_tx,
            cmd_rx,
            cmd_tx,
            reconnect: self.inner.config.reconnect.clone(),
            stopping: self.inner.stopping.clone(),
        };
        tokio::spawn(session.run());
    }

    /// Send a PRIVMSG to `channel` on the addressed session.
    ///
    /// The session echoes the message back as a `MessageReceived` event
    /// carrying the local nickname, so the UI renders its own output the
    /// same way as everyone else's.
    pub fn send_message(
        &self,
        host: &str,
        port: u16,
        channel: &str,
        text: &str,
    ) -> Result<(), Error> {
        self.send_command(
            host,
            port,
            SessionCommand::Privmsg {
                channel: channel.to_string(),
                text: text.to_string(),
            },
        )
    }

    /// Send a CTCP ACTION ("/me") to `channel` on the addressed session.
    /// Echoed back as an `ActionReceived` event.
    pub fn send_action(
        &self,
        host: &str,
        port: u16,
        channel: &str,
        text: &str,
    ) -> Result<(), Error> {
        self.send_command(
            host,
            port,
            SessionCommand::Action {
                channel: channel.to_string(),
                text: text.to_string(),
            },
        )
    }

    /// Join a channel on the addressed session. The channel is re-joined
    /// automatically after a reconnect.
    pub fn join_channel(&self, host: &str, port: u16, channel: &str) -> Result<(), Error> {
        self.send_command(
            host,
            port,
            SessionCommand::Join {
                channel: channel.to_string(),
            },
        )
    }

    /// Request a nick change on every live session.
    pub fn change_nick(&self, nickname: &str) -> Result<(), Error> {
        let handles: Vec<_> = self.inner.registry.lock().values().cloned().collect();
        if handles.is_empty() {
            return Err(Error::NoSessions);
        }
        for handle in handles {
            let _ = handle.send(SessionCommand::Nick {
                nick: nickname.to_string(),
            });
        }
        Ok(())
    }

    /// Consume events and deliver them to registered handlers, one at a
    /// time, until [`stop`](Client::stop) has run its course.
    pub async fn run(&self) {
        let Some(mut rx) = self.inner.event_rx.lock().take() else {
            tracing::error!("run() called more than once");
            return;
        };
        while let Some(event) = rx.recv().await {
            self.inner.dispatcher.lock().dispatch(&event);
        }
    }

    /// Hard shutdown: QUIT every session, stop all reconnect loops, and
    /// let [`run`](Client::run) return once the queue drains.
    pub fn stop(&self) {
        self.inner.stopping.store(true, Ordering::SeqCst);
        // Registered or not; sends to sessions that already exited are
        // ignored.
        for cmd_tx in self.inner.sessions.lock().iter() {
            let _ = cmd_tx.send(SessionCommand::Quit);
        }
        // Drop the prototype sender so the event queue closes when the
        // last session task exits.
        self.inner.event_tx.lock().take();
    }

    fn send_command(&self, host: &str, port: u16, cmd: SessionCommand) -> Result<(), Error> {
        let key = format!("{host}:{port}");
        let handle = self
            .inner
            .registry
            .lock()
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::NotConnected {
                host: host.to_string(),
                port,
            })?;
        // A session that died since sign-on counts as absent too.
        handle.send(cmd).map_err(|_| Error::NotConnected {
            host: host.to_string(),
            port,
        })
    }
}
