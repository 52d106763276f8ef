use super::irc::{IrcLine, anonymous_nick, login_commands, normalize_channel, parse_line};
use crate::{
    app::config::Config,
    events::app_event::{AppEvent, ChatEvent},
};
use async_trait::async_trait;
use eyre::{WrapErr, eyre};
use futures::{SinkExt, StreamExt};
use std::{collections::VecDeque, time::Duration};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message as WsMessage,
};
use url::Url;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
/// Silence after which the client pings the server itself.
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);
/// How long a client ping may go unanswered before the link counts as dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);
const KEEPALIVE_PING: &str = "PING :tmi.twitch.tv";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

/// A source of chat events for a single channel.
#[async_trait]
pub trait ChatTransport: Send {
    async fn connect(&mut self) -> Result<(), eyre::Report>;

    /// The next event, or `None` once the transport has given up.
    async fn next_event(&mut self) -> Option<ChatEvent>;
}

/// Anonymous read-only Twitch chat over IRC-over-WebSocket.
pub struct TwitchIrcTransport {
    server: String,
    channel: String,
    nick: String,
    reconnect: bool,
    stream: Option<WsStream>,
    pending: VecDeque<ChatEvent>,
    backoff: Duration,
    idle_timeout: Duration,
    pong_timeout: Duration,
    awaiting_pong: bool,
}

impl TwitchIrcTransport {
    pub fn new(config: &Config) -> Self {
        Self {
            server: config.chat.server.clone(),
            channel: normalize_channel(&config.channel),
            nick: anonymous_nick(),
            reconnect: config.chat.reconnect,
            stream: None,
            pending: VecDeque::new(),
            backoff: INITIAL_BACKOFF,
            idle_timeout: IDLE_TIMEOUT,
            pong_timeout: PONG_TIMEOUT,
            awaiting_pong: false,
        }
    }

    fn endpoint(&self) -> (String, u16) {
        match Url::parse(&self.server) {
            Ok(url) => (
                url.host_str().unwrap_or_default().to_string(),
                url.port_or_known_default().unwrap_or_default(),
            ),
            Err(_) => (self.server.clone(), 0),
        }
    }

    async fn open(&mut self) -> Result<(), eyre::Report> {
        tracing::info!("Connecting to {} as {}", self.server, self.nick);
        let (mut ws, _) = connect_async(self.server.as_str())
            .await
            .wrap_err_with(|| format!("WebSocket handshake with {} failed", self.server))?;

        for command in login_commands(&self.nick, &self.channel) {
            ws.send(WsMessage::text(command))
                .await
                .wrap_err("Failed to send login commands")?;
        }
        tracing::info!("Joined #{}", self.channel);

        self.stream = Some(ws);
        self.awaiting_pong = false;
        Ok(())
    }

    async fn send_line(&mut self, line: String) -> Result<(), eyre::Report> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| eyre!("Not connected"))?;
        stream.send(WsMessage::text(line)).await?;
        Ok(())
    }

    async fn handle_text(&mut self, text: &str) -> Result<(), eyre::Report> {
        for line in text.split("\r\n").filter(|line| !line.is_empty()) {
            match parse_line(line) {
                IrcLine::Ping(token) => {
                    tracing::trace!("PING {}", token);
                    self.send_line(format!("PONG {}", token)).await?;
                }
                IrcLine::Welcome => {
                    self.backoff = INITIAL_BACKOFF;
                    let (address, port) = self.endpoint();
                    self.pending.push_back(ChatEvent::Connected { address, port });
                }
                IrcLine::Privmsg(msg) if msg.channel == self.channel => {
                    self.pending.push_back(ChatEvent::Message {
                        channel: format!("#{}", msg.channel),
                        is_self: msg.login == self.nick,
                        tags: msg.tags,
                        text: msg.text,
                    });
                }
                IrcLine::Privmsg(msg) => {
                    tracing::debug!("Ignoring message for #{}", msg.channel);
                }
                IrcLine::Other => {}
            }
        }
        Ok(())
    }

    fn drop_connection(&mut self, reason: String) {
        self.stream = None;
        self.awaiting_pong = false;
        self.pending.push_back(ChatEvent::Disconnected { reason });
    }

    /// Nothing arrived within the current wait. A half-open socket never
    /// errors on its own, so probe it once and give up if it stays silent.
    async fn handle_silence(&mut self) {
        if self.awaiting_pong {
            self.drop_connection(format!(
                "No reply to keep-alive PING within {:?}",
                self.pong_timeout
            ));
            return;
        }

        tracing::debug!("No traffic for {:?}, pinging the server", self.idle_timeout);
        self.awaiting_pong = true;
        if let Err(e) = self.send_line(KEEPALIVE_PING.to_string()).await {
            self.drop_connection(e.to_string());
        }
    }

    async fn reconnect(&mut self) {
        while self.stream.is_none() {
            tracing::info!("Reconnecting to Twitch chat in {:?}", self.backoff);
            tokio::time::sleep(self.backoff).await;
            self.backoff = next_backoff(self.backoff);

            if let Err(e) = self.open().await {
                tracing::warn!("Reconnect attempt failed: {:?}", e);
            }
        }
    }
}

#[async_trait]
impl ChatTransport for TwitchIrcTransport {
    async fn connect(&mut self) -> Result<(), eyre::Report> {
        if self.channel.is_empty() {
            return Err(eyre!("No channel configured"));
        }
        self.open().await
    }

    async fn next_event(&mut self) -> Option<ChatEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            let Some(stream) = self.stream.as_mut() else {
                if !self.reconnect {
                    return None;
                }
                self.reconnect().await;
                continue;
            };

            let wait = if self.awaiting_pong {
                self.pong_timeout
            } else {
                self.idle_timeout
            };
            let Ok(frame) = tokio::time::timeout(wait, stream.next()).await else {
                self.handle_silence().await;
                continue;
            };

            match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    self.awaiting_pong = false;
                    if let Err(e) = self.handle_text(text.as_str()).await {
                        self.drop_connection(e.to_string());
                    }
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    self.drop_connection(format!("Connection closed: {:?}", frame));
                }
                Some(Ok(_)) => self.awaiting_pong = false,
                Some(Err(e)) => self.drop_connection(e.to_string()),
                None => self.drop_connection("Connection ended".to_string()),
            }
        }
    }
}

/// Connects the transport and forwards its events to the presenter.
pub struct ChatAdapter<T> {
    transport: T,
    event_tx: mpsc::Sender<AppEvent>,
}

impl<T: ChatTransport> ChatAdapter<T> {
    pub fn new(transport: T, event_tx: mpsc::Sender<AppEvent>) -> Self {
        Self {
            transport,
            event_tx,
        }
    }

    /// Runs until the transport gives up or the presenter goes away.
    /// A failed connect is logged and leaves live chat off.
    pub async fn run(mut self) {
        if let Err(e) = self.transport.connect().await {
            tracing::error!("Failed to connect to Twitch chat: {:?}", e);
            return;
        }

        while let Some(event) = self.transport.next_event().await {
            if self.event_tx.send(AppEvent::Chat(event)).await.is_err() {
                tracing::error!("Failed to forward chat event: presenter channel is closed.");
                break;
            }
        }
        tracing::info!("Chat adapter stopped.");
    }
}
