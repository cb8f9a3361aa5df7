//! Semantic interpretation of inbound IRC messages.
//!
//! One flat dispatch from command/numeric to the closed [`Event`] set.
//! Connection machinery (PING, registration numerics) is handled by the
//! session loop before lines reach this point; anything unrecognized here
//! is logged and dropped.

use crate::event::Event;
use crate::message::Message;
use crate::state::SessionState;

const RPL_NOTOPIC: &str = "331";
const RPL_TOPIC: &str = "332";
const RPL_NAMREPLY: &str = "353";
const RPL_ENDOFNAMES: &str = "366";

/// Map one inbound message to zero or more semantic events.
///
/// A JOIN by the local user yields two events (`ChannelJoined` then
/// `UserJoined`); everything else yields at most one.
pub fn events_for(msg: &Message, state: &SessionState) -> Vec<Event> {
    match msg.command.as_str() {
        "JOIN" => {
            let (Some(user), Some(channel)) = (msg.sender_nick(), msg.params.first()) else {
                return Vec::new();
            };
            let mut events = Vec::new();
            if user == state.nick {
                events.push(Event::ChannelJoined {
                    channel: channel.clone(),
                    host: state.host.clone(),
                    port: state.port,
                });
            }
            events.push(Event::UserJoined {
                user: user.to_string(),
                channel: channel.clone(),
                host: state.host.clone(),
                port: state.port,
            });
            events
        }
        "PART" => {
            let (Some(user), Some(channel)) = (msg.sender_nick(), msg.params.first()) else {
                return Vec::new();
            };
            vec![Event::UserLeft {
                user: user.to_string(),
                channel: channel.clone(),
                host: state.host.clone(),
                port: state.port,
            }]
        }
        "NICK" => {
            let (Some(old_nick), Some(new_nick)) = (msg.sender_nick(), msg.params.first()) else {
                return Vec::new();
            };
            if new_nick.is_empty() {
                return Vec::new();
            }
            vec![Event::UserRenamed {
                old_nick: old_nick.to_string(),
                new_nick: new_nick.clone(),
                host: state.host.clone(),
                port: state.port,
            }]
        }
        "PRIVMSG" => chat_events(msg, state, false),
        "NOTICE" => chat_events(msg, state, true),
        "TOPIC" => {
            let Some(channel) = msg.params.first() else {
                return Vec::new();
            };
            vec![Event::TopicChanged {
                topic: msg.params.get(1).filter(|t| !t.is_empty()).cloned(),
                channel: channel.clone(),
                host: state.host.clone(),
                port: state.port,
            }]
        }
        // :server 332 <me> <channel> :<topic>
        RPL_TOPIC => {
            if msg.params.len() < 3 {
                return Vec::new();
            }
            vec![Event::TopicChanged {
                topic: Some(msg.params[2].clone()).filter(|t| !t.is_empty()),
                channel: msg.params[1].clone(),
                host: state.host.clone(),
                port: state.port,
            }]
        }
        // :server 331 <me> <channel> :No topic is set
        RPL_NOTOPIC => {
            if msg.params.len() < 2 {
                return Vec::new();
            }
            vec![Event::TopicChanged {
                topic: None,
                channel: msg.params[1].clone(),
                host: state.host.clone(),
                port: state.port,
            }]
        }
        // :server 353 <me> <symbol> <channel> :<names>
        RPL_NAMREPLY => {
            if msg.params.len() < 4 {
                return Vec::new();
            }
            let names = msg.params[3]
                .split_whitespace()
                .map(|name| strip_membership_prefix(name, state.prefixes()).to_string())
                .collect();
            vec![Event::ListNames {
                channel: msg.params[2].clone(),
                names,
                host: state.host.clone(),
                port: state.port,
            }]
        }
        // :server 366 <me> <channel> :End of /NAMES list
        RPL_ENDOFNAMES => {
            if msg.params.len() < 2 {
                return Vec::new();
            }
            vec![Event::EndNames {
                channel: msg.params[1].clone(),
                host: state.host.clone(),
                port: state.port,
            }]
        }
        other => {
            tracing::trace!(command = other, "unhandled command");
            Vec::new()
        }
    }
}

/// PRIVMSG and NOTICE share target substitution: a message addressed to us
/// belongs to the sender's "channel"; a `*` target belongs to the host.
fn chat_events(msg: &Message, state: &SessionState, notice: bool) -> Vec<Event> {
    let (Some(target), Some(text)) = (msg.params.first(), msg.params.get(1)) else {
        return Vec::new();
    };
    let Some(user) = msg.sender_nick() else {
        return Vec::new();
    };
    let user = user.to_string();

    let channel = if *target == state.nick {
        user.clone()
    } else if target == "*" {
        state.host.clone()
    } else {
        target.clone()
    };

    if !notice && let Some(action) = ctcp_action(text) {
        return vec![Event::ActionReceived {
            user,
            message: action.to_string(),
            channel,
            host: state.host.clone(),
            port: state.port,
        }];
    }

    let event = if notice {
        Event::NoticeReceived {
            user,
            message: text.clone(),
            channel,
            host: state.host.clone(),
            port: state.port,
        }
    } else {
        Event::MessageReceived {
            user,
            message: text.clone(),
            channel,
            host: state.host.clone(),
            port: state.port,
        }
    };
    vec![event]
}

/// Unwrap a CTCP ACTION payload: `\x01ACTION <text>\x01`.
fn ctcp_action(text: &str) -> Option<&str> {
    let inner = text.strip_prefix('\u{1}')?;
    let inner = inner.strip_suffix('\u{1}').unwrap_or(inner);
    let rest = inner.strip_prefix("ACTION")?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

/// Drop a single leading membership prefix character (`@op`, `+voiced`).
///
/// Only the first character is considered, so `@+bob` with prefixes `@+`
/// strips the `@` and keeps `+bob`.
fn strip_membership_prefix<'a>(name: &'a str, prefixes: &[char]) -> &'a str {
    match name.chars().next() {
        Some(c) if prefixes.contains(&c) => &name[c.len_utf8()..],
        _ => name,
    }
}
