//! Events emitted by the session layer for the UI layer to consume.

/// Routing key for subscriber registration: one variant per [`Event`] kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ChannelJoined,
    MessageReceived,
    ActionReceived,
    NoticeReceived,
    TopicChanged,
    UserJoined,
    UserLeft,
    UserRenamed,
    ListNames,
    EndNames,
}

impl EventKind {
    /// Every kind, for consumers that subscribe to the full stream.
    pub const ALL: [EventKind; 10] = [
        EventKind::ChannelJoined,
        EventKind::MessageReceived,
        EventKind::ActionReceived,
        EventKind::NoticeReceived,
        EventKind::TopicChanged,
        EventKind::UserJoined,
        EventKind::UserLeft,
        EventKind::UserRenamed,
        EventKind::ListNames,
        EventKind::EndNames,
    ];
}

/// Events the session layer emits to the consumer (TUI, GUI, bot, etc.).
///
/// Variants carry copies of the relevant scalar fields only, never handles
/// into live session state, so a subscriber can hold an event as long as it
/// likes without racing the session task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The local user joined a channel.
    ChannelJoined {
        channel: String,
        host: String,
        port: u16,
    },

    /// A message in a channel or a private message.
    ///
    /// For a private message `channel` is the sender's nick; for a message
    /// targeted at `*` it is the connection's host.
    MessageReceived {
        user: String,
        message: String,
        channel: String,
        host: String,
        port: u16,
    },

    /// A CTCP ACTION ("/me waves"), unwrapped from its PRIVMSG carrier.
    ActionReceived {
        user: String,
        message: String,
        channel: String,
        host: String,
        port: u16,
    },

    /// A NOTICE, with the same target rules as `MessageReceived`.
    NoticeReceived {
        user: String,
        message: String,
        channel: String,
        host: String,
        port: u16,
    },

    /// Channel topic changed or was reported on join. `None` means unset.
    TopicChanged {
        topic: Option<String>,
        channel: String,
        host: String,
        port: u16,
    },

    /// Someone joined a channel (including the local user).
    UserJoined {
        user: String,
        channel: String,
        host: String,
        port: u16,
    },

    /// Someone left a channel.
    UserLeft {
        user: String,
        channel: String,
        host: String,
        port: u16,
    },

    /// A user changed nick. Connection-wide, not per channel.
    UserRenamed {
        old_nick: String,
        new_nick: String,
        host: String,
        port: u16,
    },

    /// One fragment of a NAMES reply, membership prefixes stripped.
    ///
    /// The member list is only authoritative once [`Event::EndNames`] for
    /// the same channel arrives.
    ListNames {
        channel: String,
        names: Vec<String>,
        host: String,
        port: u16,
    },

    /// End of a NAMES reply: the accumulated names are now authoritative.
    EndNames {
        channel: String,
        host: String,
        port: u16,
    },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ChannelJoined { .. } => EventKind::ChannelJoined,
            Event::MessageReceived { .. } => EventKind::MessageReceived,
            Event::ActionReceived { .. } => EventKind::ActionReceived,
            Event::NoticeReceived { .. } => EventKind::NoticeReceived,
            Event::TopicChanged { .. } => EventKind::TopicChanged,
            Event::UserJoined { .. } => EventKind::UserJoined,
            Event::UserLeft { .. } => EventKind::UserLeft,
            Event::UserRenamed { .. } => EventKind::UserRenamed,
            Event::ListNames { .. } => EventKind::ListNames,
            Event::EndNames { .. } => EventKind::EndNames,
        }
    }
}
