use crate::models::message::{ChatMessage, MessageTags};

/// Everything the presenter reacts to.
#[derive(Debug)]
pub enum AppEvent {
    Chat(ChatEvent),
    /// Debug hook: show a message without a live chat connection.
    Simulate(ChatMessage),
}

/// Events surfaced by the chat transport.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatEvent {
    Connected {
        address: String,
        port: u16,
    },
    Message {
        channel: String,
        tags: MessageTags,
        text: String,
        is_self: bool,
    },
    Disconnected {
        reason: String,
    },
}
