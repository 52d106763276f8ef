use eyre::{WrapErr, eyre};
use figment::{
    Figment, Provider,
    providers::{Env, Format, Serialized, Toml},
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

const BASE_CONFIG_PATH: &str = "config/overlay.toml";
const ENV_PREFIX: &str = "RACECHAT_";

static CHANNEL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9_]{1,25}$").expect("channel pattern is valid")
});

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// An absolute http(s) URL, or a path to a local file served by the overlay.
    pub url: String,
    pub volume: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            url: "sounds/notification.mp3".to_string(),
            volume: 0.5,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NumberRange {
    pub min: u32,
    pub max: u32,
}

impl Default for NumberRange {
    fn default() -> Self {
        Self { min: 1, max: 99 }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SpecialUser {
    pub username: String,
    pub number: u32,
    pub team: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct AccessibilityConfig {
    pub enable_aria: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct OverlayConfig {
    pub bind: SocketAddr,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 7878)),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    pub server: String,
    pub reconnect: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            server: "wss://irc-ws.chat.twitch.tv:443".to_string(),
            reconnect: true,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub channel: String,
    pub display_duration_ms: u64,
    /// CSS length used as the emote image height.
    pub emote_size: String,
    pub debug: bool,
    pub audio: AudioConfig,
    pub numbers: NumberRange,
    pub special_user: Option<SpecialUser>,
    pub accessibility: AccessibilityConfig,
    pub overlay: OverlayConfig,
    pub chat: ChatConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel: String::new(),
            display_duration_ms: 8000,
            emote_size: "1.2em".to_string(),
            debug: false,
            audio: AudioConfig::default(),
            numbers: NumberRange::default(),
            special_user: None,
            accessibility: AccessibilityConfig { enable_aria: true },
            overlay: OverlayConfig::default(),
            chat: ChatConfig::default(),
        }
    }
}

impl Config {
    pub fn display_duration(&self) -> Duration {
        Duration::from_millis(self.display_duration_ms)
    }

    /// The channel login without a leading `#`, lowercased.
    pub fn channel_login(&self) -> String {
        self.channel.trim().trim_start_matches('#').to_lowercase()
    }

    pub fn validate(&self) -> Result<(), eyre::Report> {
        let channel = self.channel_login();
        if !CHANNEL_REGEX.is_match(&channel) {
            return Err(eyre!("Invalid Twitch channel name: {:?}", self.channel));
        }
        if self.numbers.min > self.numbers.max {
            return Err(eyre!(
                "Random number range is empty: min {} > max {}",
                self.numbers.min,
                self.numbers.max
            ));
        }
        if self.display_duration_ms == 0 {
            return Err(eyre!("display_duration_ms must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.audio.volume) {
            return Err(eyre!(
                "Audio volume must be within [0, 1], got {}",
                self.audio.volume
            ));
        }
        Ok(())
    }
}

fn user_config_path() -> Result<PathBuf, eyre::Report> {
    dirs::config_dir()
        .map(|dir| dir.join(env!("CARGO_PKG_NAME")).join("overlay.toml"))
        .ok_or_else(|| eyre!("Could not find a config directory"))
}

/// Defaults, then the shipped config, then the per-user file.
fn file_layers(base: &Path, user: &Path) -> Figment {
    Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(base))
        .merge(Toml::file(user))
}

pub async fn load() -> Result<Config, eyre::Report> {
    let user = user_config_path()?;
    load_from(
        Path::new(BASE_CONFIG_PATH),
        &user,
        Env::prefixed(ENV_PREFIX).split("__"),
    )
    .await
}

/// Loads and validates the config with `overrides` on top of the files.
/// On first run the user file is seeded from the file layers only, so
/// overrides never outlive the process that set them.
async fn load_from(
    base: &Path,
    user: &Path,
    overrides: impl Provider,
) -> Result<Config, eyre::Report> {
    tracing::info!("Loading config from {:?} and {:?}", base, user);

    let files = file_layers(base, user);
    let config: Config = files
        .clone()
        .merge(overrides)
        .extract()
        .wrap_err("Could not load config")?;
    config.validate()?;

    if !user.exists() {
        let seed: Config = files.extract().wrap_err("Could not load config files")?;
        if let Err(e) = write_user_config(user, &seed).await {
            tracing::warn!("Failed to write initial user config: {:?}", e);
        }
    }

    Ok(config)
}

async fn write_user_config(path: &Path, config: &Config) -> Result<(), eyre::Report> {
    tracing::info!("Writing user config to {:?}", path);
    let contents = toml::to_string_pretty(config).wrap_err("Failed to serialize config")?;

    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .wrap_err_with(|| format!("Could not create {:?}", dir))?;
    }
    tokio::fs::write(path, contents)
        .await
        .wrap_err_with(|| format!("Could not write {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            channel: "#Liiukiin".into(),
            ..Config::default()
        }
    }

    #[test]
    fn defaults_match_overlay_defaults() {
        let config = Config::default();
        assert_eq!(config.display_duration(), Duration::from_millis(8000));
        assert_eq!(config.numbers, NumberRange { min: 1, max: 99 });
        assert_eq!(config.emote_size, "1.2em");
        assert!(config.accessibility.enable_aria);
        assert!(config.chat.reconnect);
    }

    #[test]
    fn normalizes_channel_login() {
        assert_eq!(valid().channel_login(), "liiukiin");
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn rejects_bad_settings() {
        assert!(Config::default().validate().is_err());

        let mut config = valid();
        config.numbers = NumberRange { min: 10, max: 1 };
        assert!(config.validate().is_err());

        let mut config = valid();
        config.audio.volume = 1.5;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.display_duration_ms = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.channel = "not a channel".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_layers_override_defaults() {
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::string(
                r#"
channel = "liiukiin"
display_duration_ms = 5000

[numbers]
min = 10
max = 20

[special_user]
username = "liiukiin"
number = 1
team = "ferrari"
"#,
            ))
            .extract()
            .expect("valid config");

        assert_eq!(config.channel, "liiukiin");
        assert_eq!(config.display_duration_ms, 5000);
        assert_eq!(config.numbers, NumberRange { min: 10, max: 20 });
        assert_eq!(config.special_user.map(|s| s.number), Some(1));
        assert_eq!(config.audio, AudioConfig::default());
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "racechat-config-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("temp dir");
        std::fs::write(dir.join("base.toml"), "channel = \"liiukiin\"\n").expect("write base");
        dir
    }

    #[tokio::test]
    async fn overrides_are_not_written_to_the_user_file() {
        let dir = scratch_dir("overrides");
        let base = dir.join("base.toml");
        let user = dir.join("user").join("overlay.toml");

        let config = load_from(
            &base,
            &user,
            Serialized::default("channel", "temporary_override"),
        )
        .await
        .expect("valid config");
        assert_eq!(config.channel, "temporary_override");

        let written = std::fs::read_to_string(&user).expect("user file seeded");
        assert!(written.contains("liiukiin"));
        assert!(!written.contains("temporary_override"));

        let config = load_from(&base, &user, Toml::string(""))
            .await
            .expect("valid config");
        assert_eq!(config.channel, "liiukiin");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn invalid_overrides_fail_without_seeding_the_user_file() {
        let dir = scratch_dir("invalid");
        let base = dir.join("base.toml");
        let user = dir.join("overlay.toml");

        let result = load_from(
            &base,
            &user,
            Toml::string("[numbers]\nmin = 50\nmax = 10\n"),
        )
        .await;
        assert!(result.is_err());
        assert!(!user.exists());

        let config = load_from(&base, &user, Toml::string(""))
            .await
            .expect("valid once the override is gone");
        assert_eq!(config.numbers, NumberRange::default());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
