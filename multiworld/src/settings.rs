use std::collections::BTreeMap;

use anyhow::{bail, Result};
use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use strum_macros::{EnumString, VariantNames};

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct GenerationSettings {
    // Swaps allowed per fill stage before giving up on the attempt.
    #[serde(default = "default_swap_budget")]
    pub swap_budget: usize,
    #[serde(default)]
    pub location_selection: LocationSelection,
    #[serde(default = "default_spoiler")]
    pub spoiler: bool,
    #[serde(default)]
    pub players: Vec<PlayerSettings>,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct PlayerSettings {
    pub name: String,
    #[serde(default)]
    pub accessibility: Accessibility,
    #[serde(default)]
    pub early_items: BTreeMap<String, usize>,
    #[serde(default)]
    pub local_early_items: BTreeMap<String, usize>,
    #[serde(default)]
    pub start_inventory: BTreeMap<String, usize>,
}

/// What verification demands of a player's world.
#[derive(
    Clone, Copy, Default, Serialize, Deserialize, Debug, PartialEq, Eq, EnumString, VariantNames,
)]
pub enum Accessibility {
    /// Every location must be reachable.
    #[default]
    Full,
    /// Only the completion condition must be reachable.
    Minimal,
}

/// How the fill picks among the locations that could take an item.
#[derive(
    Clone, Copy, Default, Serialize, Deserialize, Debug, PartialEq, Eq, EnumString, VariantNames,
)]
pub enum LocationSelection {
    #[default]
    Uniform,
    // Biased toward regions further from the start region.
    WeightedByDepth,
}

fn default_swap_budget() -> usize {
    50
}

fn default_spoiler() -> bool {
    true
}

impl Default for GenerationSettings {
    fn default() -> Self {
        GenerationSettings {
            swap_budget: default_swap_budget(),
            location_selection: LocationSelection::default(),
            spoiler: default_spoiler(),
            players: vec![],
        }
    }
}

impl PlayerSettings {
    pub fn new(name: &str) -> Self {
        PlayerSettings {
            name: name.to_string(),
            accessibility: Accessibility::Full,
            early_items: BTreeMap::new(),
            local_early_items: BTreeMap::new(),
            start_inventory: BTreeMap::new(),
        }
    }
}

impl GenerationSettings {
    /// Settings for `num_players` players, filling in default player
    /// entries ("Player1", "Player2", ...) when none were given.
    pub fn for_players(&self, num_players: usize) -> Result<GenerationSettings> {
        let mut out = self.clone();
        if out.players.is_empty() {
            out.players = (1..=num_players)
                .map(|i| PlayerSettings::new(&format!("Player{i}")))
                .collect();
        }
        if out.players.len() != num_players {
            bail!(
                "settings list {} players but {} worlds were supplied",
                out.players.len(),
                num_players
            );
        }
        out.validate()?;
        Ok(out)
    }

    pub fn validate(&self) -> Result<()> {
        if self.swap_budget == 0 {
            bail!("swap_budget must be positive");
        }
        let mut names: HashSet<&str> = HashSet::new();
        for p in &self.players {
            if p.name.is_empty() {
                bail!("player names must not be empty");
            }
            if !names.insert(&p.name) {
                bail!("duplicate player name '{}'", p.name);
            }
        }
        Ok(())
    }

    pub fn accessibility(&self, player: usize) -> Accessibility {
        self.players
            .get(player)
            .map(|p| p.accessibility)
            .unwrap_or_default()
    }
}

pub fn parse_generation_settings(settings_json: &str) -> Result<GenerationSettings> {
    let mut des = serde_json::Deserializer::from_str(settings_json);
    let settings: GenerationSettings = serde_path_to_error::deserialize(&mut des)?;
    settings.validate()?;
    Ok(settings)
}
