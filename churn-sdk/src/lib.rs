//! IRC protocol session layer.
//!
//! This crate owns TCP connections to IRC servers, speaks the wire
//! protocol, tracks per-channel state (membership, topics, nicknames), and
//! exposes all of it to a presentation layer as a typed event stream. The
//! UI never touches sockets or protocol text: it registers handlers for
//! [`EventKind`]s and issues outbound commands through a [`Client`].
//!
//! ```no_run
//! use churn_sdk::{Client, EventKind, DEFAULT_PORT};
//!
//! # async fn example() {
//! let client = Client::new();
//! client.register_handler(EventKind::MessageReceived, |event| {
//!     println!("{event:?}");
//!     Ok(())
//! });
//! client.connect("alice", "irc.libera.chat", DEFAULT_PORT);
//! client.run().await;
//! # }
//! ```

pub mod client;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod message;
pub mod parser;
pub mod session;
pub mod state;

pub use client::{Client, ConnectConfig, DEFAULT_PORT};
pub use dispatch::Dispatcher;
pub use error::Error;
pub use event::{Event, EventKind};
pub use message::{LineBuffer, Message};
pub use session::ReconnectConfig;
pub use state::{Channel, SessionState, SessionStatus};
