use super::surface::{OverlayHub, Surface, SurfaceOp};
use crate::app::config::AudioConfig;
use eyre::{WrapErr, eyre};
use reqwest::Client as ReqwestClient;
use std::{path::PathBuf, time::Duration};
use url::Url;

const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// The path the overlay server serves a local sound file under.
pub const LOCAL_SOUND_ROUTE: &str = "/sound";

pub trait NotificationPlayer {
    /// Restarts the notification from the beginning. Never fails.
    fn play(&self);
}

#[derive(Debug, Clone, PartialEq)]
pub enum SoundSource {
    Remote(Url),
    Local(PathBuf),
}

impl SoundSource {
    pub fn parse(raw: &str) -> Self {
        match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => SoundSource::Remote(url),
            _ => SoundSource::Local(PathBuf::from(raw)),
        }
    }

    /// The URL the overlay page loads the sound from.
    pub fn page_url(&self) -> String {
        match self {
            SoundSource::Remote(url) => url.to_string(),
            SoundSource::Local(_) => LOCAL_SOUND_ROUTE.to_string(),
        }
    }

    pub fn local_path(&self) -> Option<&PathBuf> {
        match self {
            SoundSource::Local(path) => Some(path),
            SoundSource::Remote(_) => None,
        }
    }

    /// Checks that the sound can actually be loaded.
    pub async fn preload(&self) -> Result<(), eyre::Report> {
        match self {
            SoundSource::Remote(url) => {
                let client = ReqwestClient::builder()
                    .user_agent(APP_USER_AGENT)
                    .timeout(Duration::from_secs(10))
                    .build()?;
                client
                    .get(url.clone())
                    .send()
                    .await
                    .wrap_err_with(|| format!("Could not fetch {}", url))?
                    .error_for_status()
                    .wrap_err_with(|| format!("Server refused {}", url))?;
            }
            SoundSource::Local(path) => {
                let metadata = tokio::fs::metadata(path)
                    .await
                    .wrap_err_with(|| format!("Could not open {:?}", path))?;
                if !metadata.is_file() {
                    return Err(eyre!("{:?} is not a file", path));
                }
            }
        }
        Ok(())
    }
}

/// Resolves and preloads the configured sound. `None` leaves audio disabled.
pub async fn load_sound(config: &AudioConfig) -> Option<SoundSource> {
    let source = SoundSource::parse(&config.url);
    match source.preload().await {
        Ok(()) => {
            tracing::info!("Notification sound ready: {:?}", source);
            Some(source)
        }
        Err(e) => {
            tracing::error!("Failed to load the notification sound, audio disabled: {:?}", e);
            None
        }
    }
}

/// Plays the notification on the attached overlay pages.
pub struct OverlaySound {
    hub: OverlayHub,
    sound: Option<SoundSource>,
    volume: f32,
}

impl OverlaySound {
    pub fn new(hub: OverlayHub, sound: Option<SoundSource>, volume: f32) -> Self {
        Self { hub, sound, volume }
    }
}

impl NotificationPlayer for OverlaySound {
    fn play(&self) {
        let Some(sound) = &self.sound else {
            return;
        };

        if self.hub.viewer_count() == 0 {
            tracing::warn!("Could not play the notification: no overlay page attached");
            return;
        }

        let op = SurfaceOp::PlaySound {
            url: sound.page_url(),
            volume: self.volume,
        };
        if let Err(e) = self.hub.apply(op) {
            tracing::warn!("Could not play the notification: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_sources() {
        assert!(matches!(
            SoundSource::parse("https://cdn.example.com/ding.mp3"),
            SoundSource::Remote(_)
        ));
        let local = SoundSource::parse("sounds/notification.mp3");
        assert_eq!(local.local_path(), Some(&PathBuf::from("sounds/notification.mp3")));
        assert_eq!(local.page_url(), "/sound");
    }

    #[tokio::test]
    async fn missing_local_file_disables_audio() {
        let config = AudioConfig {
            url: "does/not/exist.mp3".into(),
            volume: 0.5,
        };
        assert!(load_sound(&config).await.is_none());
    }

    #[test]
    fn plays_on_attached_pages() {
        let hub = OverlayHub::new(8);
        let (_, mut rx) = hub.subscribe();
        let player = OverlaySound::new(hub, Some(SoundSource::parse("ding.mp3")), 0.25);

        player.play();
        assert_eq!(
            rx.try_recv().unwrap(),
            r#"{"op":"play_sound","url":"/sound","volume":0.25}"#
        );
    }

    #[test]
    fn disabled_or_unattached_player_is_silent() {
        let hub = OverlayHub::new(8);
        OverlaySound::new(hub.clone(), Some(SoundSource::parse("ding.mp3")), 0.5).play();

        let (_, mut rx) = hub.subscribe();
        OverlaySound::new(hub, None, 0.5).play();
        assert!(rx.try_recv().is_err());
    }
}
