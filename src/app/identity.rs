use super::{
    config::{Config, SpecialUser},
    roster::Roster,
};
use crate::models::team::Team;
use eyre::eyre;
use rand::{Rng, seq::IteratorRandom};
use std::{collections::BTreeMap, ops::RangeInclusive};

/// Assigns a racing number and a team to chatters.
///
/// Both lookups take the lowercased username and are total: special user
/// first, then the roster tables, then a random pick. Random picks are not
/// remembered, so an unassigned chatter gets a new number on every message.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    special_user: Option<SpecialUser>,
    numbers: RangeInclusive<u32>,
    roster: Roster,
}

impl IdentityResolver {
    pub fn new(config: &Config, roster: Roster) -> Result<Self, eyre::Report> {
        if roster.registry.is_empty() {
            return Err(eyre!("The team registry is empty"));
        }
        if config.numbers.min > config.numbers.max {
            return Err(eyre!(
                "Random number range is empty: min {} > max {}",
                config.numbers.min,
                config.numbers.max
            ));
        }
        Ok(Self {
            special_user: config.special_user.clone(),
            numbers: config.numbers.min..=config.numbers.max,
            roster,
        })
    }

    fn special_user(&self, username: &str) -> Option<&SpecialUser> {
        self.special_user
            .as_ref()
            .filter(|special| special.username.eq_ignore_ascii_case(username))
    }

    pub fn resolve_number(&self, username: &str) -> u32 {
        if let Some(special) = self.special_user(username) {
            return special.number;
        }
        if let Some(number) = self.roster.numbers.get(username) {
            return *number;
        }
        rand::rng().random_range(self.numbers.clone())
    }

    pub fn resolve_team(&self, username: &str) -> Team {
        let registry = &self.roster.registry;
        let assigned = match self.special_user(username) {
            Some(special) => Some(&special.team),
            None => self.roster.teams.get(username),
        };
        if let Some(team) = assigned.and_then(|key| registry.get(key)) {
            return team.clone();
        }
        random_team(registry)
    }
}

fn random_team(registry: &BTreeMap<String, Team>) -> Team {
    registry
        .values()
        .choose(&mut rand::rng())
        .cloned()
        // `new` refuses an empty registry.
        .unwrap_or_else(|| Team::new("#ffffff", ""))
}
