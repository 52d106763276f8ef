use super::{config::Config, identity::IdentityResolver};
use crate::{
    events::app_event::{AppEvent, ChatEvent},
    models::{emote::EmoteMap, message::ChatMessage},
    overlay::{
        sound::NotificationPlayer,
        surface::{Surface, SurfaceOp},
    },
    utils::text_processing::render_emotes,
};
use std::sync::Arc;
use tokio::{
    sync::mpsc,
    time::{Instant, sleep_until},
};

/// Shows the latest chat message as the overlay card and hides it again once
/// the display duration has passed since the most recent message.
///
/// The presenter owns its surface and the only hide deadline; replacing the
/// deadline is how a pending hide gets cancelled.
pub struct Presenter<S, P> {
    config: Arc<Config>,
    identity: IdentityResolver,
    surface: S,
    player: P,
    hide_deadline: Option<Instant>,
}

impl<S: Surface, P: NotificationPlayer> Presenter<S, P> {
    pub fn new(config: Arc<Config>, identity: IdentityResolver, surface: S, player: P) -> Self {
        Self {
            config,
            identity,
            surface,
            player,
            hide_deadline: None,
        }
    }

    /// Processes events one at a time until every sender is gone.
    pub async fn run(mut self, mut rx: mpsc::Receiver<AppEvent>) {
        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                _ = wait_for(self.hide_deadline) => self.hide(),
            }
        }
        tracing::info!("Presenter stopped: no more event sources.");
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Chat(ChatEvent::Connected { address, port }) => {
                tracing::info!("Connected to Twitch chat at {}:{}", address, port);
            }
            AppEvent::Chat(ChatEvent::Message {
                channel,
                tags,
                text,
                is_self,
            }) => {
                if self.config.debug {
                    tracing::info!(
                        "Message received in {} (self: {}): {:?} {:?} emotes: {:?}",
                        channel,
                        is_self,
                        tags.sender_name(),
                        text,
                        tags.emotes
                    );
                }
                match ChatMessage::from_tags(tags, text) {
                    Some(message) => self.show(message),
                    None => tracing::warn!("Dropping a chat message without a sender name"),
                }
            }
            AppEvent::Chat(ChatEvent::Disconnected { reason }) => {
                tracing::warn!("Disconnected from Twitch chat: {}", reason);
            }
            AppEvent::Simulate(message) => {
                tracing::info!("Simulated message from {}", message.sender_name);
                self.show(message);
            }
        }
    }

    fn show(&mut self, message: ChatMessage) {
        if self.config.debug {
            tracing::info!(
                "Showing message from {} received at {}",
                message.sender_name,
                message.timestamp.format("%H:%M:%S%.3f")
            );
        }
        self.present(&message.sender_name, &message.text, message.emotes.as_ref());
    }

    /// Displays one message. Failures are logged; the card may be left partially updated.
    pub fn present(&mut self, username: &str, text: &str, emotes: Option<&EmoteMap>) {
        if let Err(e) = self.try_present(username, text, emotes) {
            tracing::error!("Failed to display message from {}: {:?}", username, e);
        }
    }

    fn try_present(
        &mut self,
        username: &str,
        text: &str,
        emotes: Option<&EmoteMap>,
    ) -> Result<(), eyre::Report> {
        let login = username.to_lowercase();
        let number = self.identity.resolve_number(&login);
        let team = self.identity.resolve_team(&login);

        self.surface.apply(SurfaceOp::SetUsername {
            text: username.to_uppercase(),
        })?;
        self.surface.apply(SurfaceOp::SetNumber { value: number })?;
        self.surface.apply(SurfaceOp::SetTeamColor { color: team.color })?;
        self.surface.apply(SurfaceOp::SetTeamLogo { url: team.logo })?;

        let body = render_emotes(text, emotes, &self.config.emote_size);
        self.surface.apply(SurfaceOp::SetMessageHtml {
            html: format!("\"{}\"", body),
        })?;

        if self.config.accessibility.enable_aria {
            self.surface.apply(SurfaceOp::SetMessageLabel {
                label: format!("Message from {}: {}", username, text),
            })?;
        }

        self.surface.apply(SurfaceOp::SetOpacity { value: 1.0 })?;
        self.player.play();

        self.hide_deadline = Some(Instant::now() + self.config.display_duration());
        Ok(())
    }

    pub fn hide(&mut self) {
        self.hide_deadline = None;
        if let Err(e) = self.surface.apply(SurfaceOp::SetOpacity { value: 0.0 }) {
            tracing::error!("Failed to hide the overlay: {:?}", e);
        }
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
