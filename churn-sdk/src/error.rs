//! Caller-visible errors for the outbound command API.

use thiserror::Error;

/// Why an outbound command could not be delivered.
#[derive(Debug, Error)]
pub enum Error {
    /// No live session for the addressed server. The caller should surface
    /// this to the end user; it is never swallowed internally.
    #[error("not connected to {host}:{port}")]
    NotConnected { host: String, port: u16 },

    /// A connection-wide command (nick change) with no live session at all.
    #[error("no active sessions")]
    NoSessions,
}
