//! The static tables behind chatter identities: who drives with which number,
//! who drives for which team, and the registry of teams.

use crate::models::team::Team;
use eyre::WrapErr;
use figment::{
    Figment,
    providers::{Format, Toml},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
};

pub const ROSTER_PATH: &str = "config/roster.toml";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Roster {
    /// Lowercased username to racing number.
    pub numbers: HashMap<String, u32>,
    /// Lowercased username to team key.
    pub teams: HashMap<String, String>,
    pub registry: BTreeMap<String, Team>,
}

impl Default for Roster {
    fn default() -> Self {
        Self {
            numbers: HashMap::new(),
            teams: HashMap::new(),
            registry: default_registry(),
        }
    }
}

fn default_registry() -> BTreeMap<String, Team> {
    [
        ("alpine", "#0093cc", "img/teams/alpine.png"),
        ("aston_martin", "#229971", "img/teams/aston_martin.png"),
        ("ferrari", "#e8002d", "img/teams/ferrari.png"),
        ("haas", "#b6babd", "img/teams/haas.png"),
        ("kick_sauber", "#52e252", "img/teams/kick_sauber.png"),
        ("mclaren", "#ff8000", "img/teams/mclaren.png"),
        ("mercedes", "#27f4d2", "img/teams/mercedes.png"),
        ("racing_bulls", "#6692ff", "img/teams/racing_bulls.png"),
        ("red_bull", "#3671c6", "img/teams/red_bull.png"),
        ("williams", "#64c4ff", "img/teams/williams.png"),
    ]
    .into_iter()
    .map(|(key, color, logo)| (key.to_string(), Team::new(color, logo)))
    .collect()
}

impl Roster {
    /// Loads the roster from `path`. Keys of the per-user tables are lowercased.
    /// A file without a `registry` keeps the built-in teams.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, eyre::Report> {
        let path = path.as_ref();
        tracing::info!("Loading roster from {:?}", path);

        let file: Roster = Figment::new()
            .merge(Toml::file(path))
            .extract()
            .wrap_err_with(|| format!("Could not load roster from {:?}", path))?;

        let registry = if file.registry.is_empty() {
            default_registry()
        } else {
            file.registry
        };

        Ok(Self {
            numbers: lowercase_keys(file.numbers),
            teams: lowercase_keys(file.teams),
            registry,
        })
    }

    /// Loads the roster, falling back to the built-in one on any error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(roster) => roster,
            Err(e) => {
                tracing::error!("Failed to load roster, using built-in teams: {:?}", e);
                Self::default()
            }
        }
    }
}

fn lowercase_keys<V>(table: HashMap<String, V>) -> HashMap<String, V> {
    table
        .into_iter()
        .map(|(key, value)| (key.to_lowercase(), value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_roster_has_the_ten_teams() {
        let roster = Roster::default();
        assert_eq!(roster.registry.len(), 10);
        assert!(roster.registry.contains_key("ferrari"));
        assert!(roster.numbers.is_empty());
    }

    #[test]
    fn loads_tables_and_lowercases_usernames() {
        let dir = std::env::temp_dir().join(format!("racechat-roster-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("roster.toml");
        std::fs::write(
            &path,
            r##"
[numbers]
MaxV = 33

[teams]
maxv = "bulls"

[registry.bulls]
color = "#1e41ff"
logo = "bulls.png"
"##,
        )
        .expect("write roster");

        let roster = Roster::load(&path).expect("valid roster");
        assert_eq!(roster.numbers.get("maxv"), Some(&33));
        assert_eq!(roster.teams.get("maxv").map(String::as_str), Some("bulls"));
        assert_eq!(roster.registry.len(), 1);
        assert_eq!(roster.registry["bulls"], Team::new("#1e41ff", "bulls.png"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_keeps_builtin_registry() {
        let roster = Roster::load_or_default("does/not/exist.toml");
        assert_eq!(roster.registry.len(), 10);
    }
}
