use super::emote::EmoteMap;
use chrono::{DateTime, Local};
use twitch_types::{DisplayName, UserName};

/// The subset of IRC message tags the overlay cares about.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessageTags {
    pub display_name: Option<DisplayName>,
    pub username: Option<UserName>,
    pub emotes: Option<EmoteMap>,
}

impl MessageTags {
    /// The name to show for the sender: the display name when set, the login otherwise.
    pub fn sender_name(&self) -> Option<&str> {
        self.display_name
            .as_ref()
            .map(|name| name.as_str())
            .filter(|name| !name.is_empty())
            .or_else(|| self.username.as_ref().map(|name| name.as_str()))
            .filter(|name| !name.is_empty())
    }
}

#[derive(Clone, Debug)]
pub struct ChatMessage {
    pub sender_name: String,
    pub text: String,
    pub emotes: Option<EmoteMap>,
    pub timestamp: DateTime<Local>,
}

impl ChatMessage {
    pub fn new(
        sender_name: impl Into<String>,
        text: impl Into<String>,
        emotes: Option<EmoteMap>,
    ) -> Self {
        Self {
            sender_name: sender_name.into(),
            text: text.into(),
            emotes,
            timestamp: Local::now(),
        }
    }

    /// Builds the message shown for a chat line. `None` if the tags carry no usable name.
    pub fn from_tags(tags: MessageTags, text: String) -> Option<Self> {
        let sender_name = tags.sender_name()?.to_string();
        Some(Self::new(sender_name, text, tags.emotes))
    }
}
