//! Per-connection session state.
//!
//! A [`SessionState`] is owned by exactly one session task and mutated only
//! by [`SessionState::apply`]ing parsed events, so the state a subscriber
//! can infer from the event stream never disagrees with the state the
//! session holds. A fresh state is built for every (re)connection attempt:
//! membership and topics are always rebuilt from server replies, never
//! carried over a reconnect.

use std::collections::HashMap;

use crate::event::Event;

/// Connection lifecycle of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Registered,
}

/// One joined channel.
#[derive(Debug, Default)]
pub struct Channel {
    /// `None` means no topic set.
    pub topic: Option<String>,
    /// Authoritative member list, as of the last end-of-names flush plus
    /// later joins/parts/renames.
    pub members: Vec<String>,
    /// Names accumulated from 353 fragments, awaiting the 366 flush.
    arriving: Vec<String>,
}

/// Membership prefixes assumed until the server advertises its own.
pub const DEFAULT_PREFIXES: &[char] = &['@', '+'];

#[derive(Debug)]
pub struct SessionState {
    pub host: String,
    pub port: u16,
    /// Current nickname; follows server-confirmed renames.
    pub nick: String,
    pub status: SessionStatus,
    channels: HashMap<String, Channel>,
    /// Membership prefix characters in server priority order.
    prefixes: Vec<char>,
}

impl SessionState {
    pub fn new(nick: &str, host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            nick: nick.to_string(),
            status: SessionStatus::Connecting,
            channels: HashMap::new(),
            prefixes: DEFAULT_PREFIXES.to_vec(),
        }
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(name)
    }

    /// Names of all joined channels.
    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    pub fn prefixes(&self) -> &[char] {
        &self.prefixes
    }

    /// Digest RPL_ISUPPORT (005) parameters. Only `PREFIX=` matters here:
    /// it lists membership prefix characters in server priority order,
    /// e.g. `PREFIX=(ov)@+`.
    pub fn absorb_isupport(&mut self, params: &[String]) {
        for param in params {
            if let Some(value) = param.strip_prefix("PREFIX=") {
                self.prefixes = match value.split_once(')') {
                    Some((_, prefixes)) => prefixes.chars().collect(),
                    None => value.chars().collect(),
                };
            }
        }
    }

    /// Fold one event into the state. Both parsed inbound events and local
    /// echo events pass through here before dispatch.
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::ChannelJoined { channel, .. } => {
                self.channels.entry(channel.clone()).or_default();
            }
            Event::UserJoined { user, channel, .. } => {
                let chan = self.channels.entry(channel.clone()).or_default();
                if !chan.members.iter().any(|m| m == user) {
                    chan.members.push(user.clone());
                }
            }
            Event::UserLeft { user, channel, .. } => {
                if *user == self.nick {
                    self.channels.remove(channel);
                } else if let Some(chan) = self.channels.get_mut(channel) {
                    chan.members.retain(|m| m != user);
                }
            }
            Event::UserRenamed {
                old_nick, new_nick, ..
            } => {
                if *old_nick == self.nick {
                    self.nick = new_nick.clone();
                }
                for chan in self.channels.values_mut() {
                    for member in &mut chan.members {
                        if member == old_nick {
                            *member = new_nick.clone();
                        }
                    }
                }
            }
            Event::TopicChanged { topic, channel, .. } => {
                if let Some(chan) = self.channels.get_mut(channel) {
                    chan.topic = topic.clone();
                }
            }
            Event::ListNames { channel, names, .. } => {
                let chan = self.channels.entry(channel.clone()).or_default();
                chan.arriving.extend(names.iter().cloned());
            }
            Event::EndNames { channel, .. } => {
                if let Some(chan) = self.channels.get_mut(channel) {
                    // An end marker with no preceding fragments is a no-op,
                    // so a replayed 366 cannot clear a live member list.
                    if !chan.arriving.is_empty() {
                        chan.members = std::mem::take(&mut chan.arriving);
                    }
                }
            }
            Event::MessageReceived { .. }
            | Event::ActionReceived { .. }
            | Event::NoticeReceived { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SessionState {
        SessionState::new("me", "irc.test", 6667)
    }

    fn list_names(channel: &str, names: &[&str]) -> Event {
        Event::ListNames {
            channel: channel.to_string(),
            names: names.iter().map(|s| s.to_string()).collect(),
            host: "irc.test".to_string(),
            port: 6667,
        }
    }

    fn end_names(channel: &str) -> Event {
        Event::EndNames {
            channel: channel.to_string(),
            host: "irc.test".to_string(),
            port: 6667,
        }
    }

    #[test]
    fn names_accumulate_until_flush() {
        let mut st = state();
        st.apply(&list_names("#chan", &["alice", "bob"]));
        st.apply(&list_names("#chan", &["carol"]));
        // Fragments are not authoritative before the flush.
        assert!(st.channel("#chan").unwrap().members.is_empty());

        st.apply(&end_names("#chan"));
        assert_eq!(
            st.channel("#chan").unwrap().members,
            vec!["alice", "bob", "carol"]
        );
    }

    #[test]
    fn names_flush_replaces_previous_membership() {
        let mut st = state();
        st.apply(&list_names("#chan", &["alice", "ghost"]));
        st.apply(&end_names("#chan"));

        st.apply(&list_names("#chan", &["alice"]));
        st.apply(&end_names("#chan"));
        assert_eq!(st.channel("#chan").unwrap().members, vec!["alice"]);
    }

    #[test]
    fn duplicate_end_names_is_a_no_op() {
        let mut st = state();
        st.apply(&list_names("#chan", &["alice", "bob"]));
        st.apply(&end_names("#chan"));
        st.apply(&end_names("#chan"));
        assert_eq!(st.channel("#chan").unwrap().members, vec!["alice", "bob"]);
    }

    #[test]
    fn join_and_part_track_membership() {
        let mut st = state();
        st.apply(&Event::ChannelJoined {
            channel: "#chan".into(),
            host: "irc.test".into(),
            port: 6667,
        });
        st.apply(&Event::UserJoined {
            user: "bob".into(),
            channel: "#chan".into(),
            host: "irc.test".into(),
            port: 6667,
        });
        assert_eq!(st.channel("#chan").unwrap().members, vec!["bob"]);

        st.apply(&Event::UserLeft {
            user: "bob".into(),
            channel: "#chan".into(),
            host: "irc.test".into(),
            port: 6667,
        });
        assert!(st.channel("#chan").unwrap().members.is_empty());
    }

    #[test]
    fn own_part_drops_the_channel() {
        let mut st = state();
        st.apply(&Event::ChannelJoined {
            channel: "#chan".into(),
            host: "irc.test".into(),
            port: 6667,
        });
        st.apply(&Event::UserLeft {
            user: "me".into(),
            channel: "#chan".into(),
            host: "irc.test".into(),
            port: 6667,
        });
        assert!(st.channel("#chan").is_none());
    }

    #[test]
    fn rename_updates_every_channel_and_own_nick() {
        let mut st = state();
        for chan in ["#a", "#b"] {
            st.apply(&list_names(chan, &["me", "bob"]));
            st.apply(&end_names(chan));
        }
        st.apply(&Event::UserRenamed {
            old_nick: "bob".into(),
            new_nick: "rob".into(),
            host: "irc.test".into(),
            port: 6667,
        });
        assert_eq!(st.channel("#a").unwrap().members, vec!["me", "rob"]);
        assert_eq!(st.channel("#b").unwrap().members, vec!["me", "rob"]);

        st.apply(&Event::UserRenamed {
            old_nick: "me".into(),
            new_nick: "myself".into(),
            host: "irc.test".into(),
            port: 6667,
        });
        assert_eq!(st.nick, "myself");
        assert_eq!(st.channel("#a").unwrap().members, vec!["myself", "rob"]);
    }

    #[test]
    fn topic_set_and_clear() {
        let mut st = state();
        st.apply(&Event::ChannelJoined {
            channel: "#chan".into(),
            host: "irc.test".into(),
            port: 6667,
        });
        st.apply(&Event::TopicChanged {
            topic: Some("welcome".into()),
            channel: "#chan".into(),
            host: "irc.test".into(),
            port: 6667,
        });
        assert_eq!(st.channel("#chan").unwrap().topic.as_deref(), Some("welcome"));

        st.apply(&Event::TopicChanged {
            topic: None,
            channel: "#chan".into(),
            host: "irc.test".into(),
            port: 6667,
        });
        assert_eq!(st.channel("#chan").unwrap().topic, None);
    }

    #[test]
    fn isupport_overrides_default_prefixes() {
        let mut st = state();
        assert_eq!(st.prefixes(), DEFAULT_PREFIXES);

        st.absorb_isupport(&[
            "CHANTYPES=#".to_string(),
            "PREFIX=(qov)~@+".to_string(),
            "NICKLEN=30".to_string(),
        ]);
        assert_eq!(st.prefixes(), &['~', '@', '+']);
    }
}
