//! Just enough of the Twitch IRC dialect to follow one channel anonymously.

use crate::models::{emote::EmoteMap, message::MessageTags};
use std::collections::HashMap;
use twitch_types::{DisplayName, UserName};

/// A server line the chat transport acts on.
#[derive(Debug, PartialEq)]
pub enum IrcLine {
    Ping(String),
    Welcome,
    Privmsg(Privmsg),
    Other,
}

#[derive(Debug, PartialEq)]
pub struct Privmsg {
    pub channel: String,
    pub login: String,
    pub tags: MessageTags,
    pub text: String,
}

pub fn parse_line(line: &str) -> IrcLine {
    let line = line.trim_end_matches(['\r', '\n']);
    if let Some(token) = line.strip_prefix("PING ") {
        return IrcLine::Ping(token.to_string());
    }

    let (tags, payload) = parse_irc_tags(line);
    let mut parts = payload.splitn(4, ' ');
    let (Some(prefix), Some(command)) = (parts.next(), parts.next()) else {
        return IrcLine::Other;
    };
    if !prefix.starts_with(':') {
        return IrcLine::Other;
    }

    match command {
        "001" => IrcLine::Welcome,
        "PRIVMSG" => {
            let (Some(target), Some(trailing)) = (parts.next(), parts.next()) else {
                return IrcLine::Other;
            };
            parse_privmsg(prefix, target, trailing, tags)
                .map(IrcLine::Privmsg)
                .unwrap_or(IrcLine::Other)
        }
        _ => IrcLine::Other,
    }
}

fn parse_privmsg(
    prefix: &str,
    target: &str,
    trailing: &str,
    mut tags: HashMap<String, String>,
) -> Option<Privmsg> {
    let login = prefix[1..]
        .split('!')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if login.is_empty() {
        return None;
    }
    let text = trailing.strip_prefix(':').unwrap_or(trailing);
    // `/me` lines are wrapped in CTCP ACTION; emote ranges index the inner text.
    let text = text
        .strip_prefix("\u{1}ACTION ")
        .map(|inner| inner.strip_suffix('\u{1}').unwrap_or(inner))
        .unwrap_or(text);

    let message_tags = MessageTags {
        display_name: tags
            .remove("display-name")
            .filter(|value| !value.is_empty())
            .map(DisplayName::from),
        username: Some(UserName::from(login.clone())),
        emotes: tags.get("emotes").and_then(|value| parse_emotes_tag(value)),
    };

    Some(Privmsg {
        channel: normalize_channel(target),
        login,
        tags: message_tags,
        text: text.to_string(),
    })
}

/// Parses `25:0-4,12-16/1902:6-10`. Ranges are kept verbatim; an empty tag is `None`.
pub fn parse_emotes_tag(value: &str) -> Option<EmoteMap> {
    let mut emotes = EmoteMap::new();
    for entry in value.split('/').filter(|entry| !entry.is_empty()) {
        let Some((id, ranges)) = entry.split_once(':') else {
            tracing::debug!("Skipping emote entry without ranges: {:?}", entry);
            continue;
        };
        emotes
            .entry(id.to_string())
            .or_default()
            .extend(ranges.split(',').filter(|r| !r.is_empty()).map(str::to_string));
    }
    (!emotes.is_empty()).then_some(emotes)
}

fn parse_irc_tags(line: &str) -> (HashMap<String, String>, &str) {
    let Some(stripped) = line.strip_prefix('@') else {
        return (HashMap::new(), line);
    };
    let Some((tags_part, payload)) = stripped.split_once(' ') else {
        return (HashMap::new(), line);
    };

    let tags = tags_part
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.to_string(), decode_irc_tag_value(value)))
        .collect();
    (tags, payload)
}

fn decode_irc_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('s') => out.push(' '),
            Some(':') => out.push(';'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

pub fn normalize_channel(value: &str) -> String {
    value.trim().trim_start_matches('#').to_ascii_lowercase()
}

/// Anonymous logins need no password; Twitch accepts any `justinfan` nick.
pub fn anonymous_nick() -> String {
    use rand::Rng;
    format!("justinfan{}", rand::rng().random_range(10000..100000))
}

/// The registration sequence for an anonymous, read-only session.
pub fn login_commands(nick: &str, channel: &str) -> [String; 4] {
    [
        "CAP REQ :twitch.tv/tags twitch.tv/commands".to_string(),
        "PASS SCHMOOPIIE".to_string(),
        format!("NICK {}", nick),
        format!("JOIN #{}", channel),
    ]
}
