pub mod chat;
pub mod irc;
