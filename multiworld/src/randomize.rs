use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use log::info;
use multiworld_game::{
    GenerationError, ItemCode, ItemIdx, LocationAddress, MultiWorld, Placement, PlayerId,
};
use multiworld_logic::sweep::get_all_state;
use multiworld_logic::CollectionState;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::adapter::{build_multiworld, World};
use crate::early_items::distribute_early_items;
use crate::fill::{distribute_items_restrictive, region_depths, FillOptions};
use crate::settings::{Accessibility, GenerationSettings, LocationSelection};
use crate::spoiler_log::{get_spoiler_log, SpoilerLog};

/// Everything the fill mutates: the slot table and the items not yet placed.
#[derive(Clone, Debug)]
pub struct RandomizationState {
    pub placement: Placement,
    pub pool: Vec<ItemIdx>,
}

impl RandomizationState {
    pub fn new(world: &MultiWorld) -> Self {
        RandomizationState {
            placement: Placement::new(world),
            pool: world.itempool.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PlacedItem {
    pub item: ItemCode,
    // Index of the player that receives the item.
    pub player: PlayerId,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PlayerOutput {
    pub name: String,
    pub game: String,
    pub locations: BTreeMap<LocationAddress, PlacedItem>,
    pub start_inventory: Vec<ItemCode>,
    pub slot_data: serde_json::Value,
}

/// The persisted result of a generation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Randomization {
    pub seed: u64,
    pub seed_name: String,
    pub players: Vec<PlayerOutput>,
}

impl Randomization {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub struct Generated {
    pub multiworld: MultiWorld,
    pub placement: Placement,
    pub randomization: Randomization,
    pub spoiler_log: Option<SpoilerLog>,
}

pub struct Randomizer<'a> {
    pub world: &'a MultiWorld,
    pub settings: &'a GenerationSettings,
    region_depth: Vec<usize>,
    minimal_players: Vec<bool>,
}

impl<'a> Randomizer<'a> {
    pub fn new(world: &'a MultiWorld, settings: &'a GenerationSettings) -> Randomizer<'a> {
        let minimal_players = (0..world.num_players())
            .map(|p| settings.accessibility(p) == Accessibility::Minimal)
            .collect();
        Randomizer {
            world,
            settings,
            region_depth: region_depths(world),
            minimal_players,
        }
    }

    fn fill_options(&self) -> FillOptions<'_> {
        let depth_weights = match self.settings.location_selection {
            LocationSelection::Uniform => None,
            LocationSelection::WeightedByDepth => Some(self.region_depth.as_slice()),
        };
        FillOptions {
            swap_budget: self.settings.swap_budget,
            depth_weights,
            minimal_players: &self.minimal_players,
            ..FillOptions::new("Main")
        }
    }

    /// Configuration checks that must pass before any item is placed.
    pub fn precheck(&self, state: &RandomizationState) -> Result<()> {
        let world = self.world;
        for player in 0..world.num_players() {
            if world.start_regions[player].is_none() {
                bail!(GenerationError::MissingStartRegion { player });
            }
        }
        for (i, loc) in world.locations.iter().enumerate() {
            if loc.address.is_none() && !(state.placement.is_filled(i) && state.placement.locked[i])
            {
                bail!(GenerationError::UnplacedEvent {
                    player: loc.player,
                    name: loc.name.clone(),
                });
            }
        }

        let unfilled = state.placement.unfilled_locations(world);
        if state.pool.len() != unfilled.len() {
            let breakdown = (0..world.num_players())
                .map(|p| {
                    let items = state
                        .pool
                        .iter()
                        .filter(|&&i| world.items[i].player == p)
                        .count();
                    let locations = unfilled
                        .iter()
                        .filter(|&&l| world.locations[l].player == p)
                        .count();
                    format!("{}: {items} items, {locations} locations", world.player_name(p))
                })
                .collect::<Vec<_>>()
                .join("; ");
            bail!(GenerationError::PoolMismatch {
                items: state.pool.len(),
                locations: unfilled.len(),
                breakdown,
            });
        }

        let mut all_state = get_all_state(world, &state.pool, &state.placement)?;
        for (i, loc) in world.locations.iter().enumerate() {
            if loc.address.is_none() || self.minimal_players[loc.player] {
                continue;
            }
            if !all_state.can_reach_location(i)? {
                bail!(GenerationError::UnreachableLocation {
                    player: loc.player,
                    name: loc.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Early items, then the main fill, then verification.
    pub fn randomize(
        &self,
        state: &mut RandomizationState,
        seed: u64,
        rng: &mut StdRng,
    ) -> Result<()> {
        let world = self.world;
        self.precheck(state)?;
        info!(
            "[seed {seed}] placing {} items into {} locations",
            state.pool.len(),
            state.placement.unfilled_locations(world).len()
        );
        let base = CollectionState::new(world);
        let opts = self.fill_options();
        distribute_early_items(
            world,
            &base,
            &mut state.pool,
            &mut state.placement,
            &opts,
            rng,
        )?;
        distribute_items_restrictive(
            world,
            &base,
            &mut state.pool,
            &mut state.placement,
            &opts,
            rng,
        )?;
        self.verify(&state.placement)?;
        info!("[seed {seed}] verified all {} players", world.num_players());
        Ok(())
    }

    /// Checks the final assignment from the starting inventory alone.
    pub fn verify(&self, placement: &Placement) -> Result<()> {
        let world = self.world;
        let mut seen = vec![false; world.items.len()];
        for (i, loc) in world.locations.iter().enumerate() {
            match placement.items[i] {
                None if loc.address.is_some() => bail!(GenerationError::VerificationFailed {
                    player: loc.player,
                    name: world.player_name(loc.player).to_string(),
                    reason: format!("location '{}' is empty", loc.name),
                }),
                None => {}
                Some(item) => {
                    if seen[item] {
                        bail!(GenerationError::VerificationFailed {
                            player: loc.player,
                            name: world.player_name(loc.player).to_string(),
                            reason: format!("{} is placed twice", world.item_description(item)),
                        });
                    }
                    seen[item] = true;
                }
            }
        }
        for &item in &world.itempool {
            if !seen[item] {
                let player = world.items[item].player;
                bail!(GenerationError::VerificationFailed {
                    player,
                    name: world.player_name(player).to_string(),
                    reason: format!("{} was never placed", world.item_description(item)),
                });
            }
        }

        let mut state = CollectionState::new(world);
        state.sweep(placement)?;
        for player in 0..world.num_players() {
            let name = world.player_name(player).to_string();
            if !state.has_beaten_game(player)? {
                let mut missing = vec![];
                for loc in 0..world.locations.len() {
                    let Some(item) = placement.items[loc] else {
                        continue;
                    };
                    let it = &world.items[item];
                    if it.player == player && it.is_progression() && !state.checked_locations[loc]
                    {
                        missing.push(format!(
                            "{} at {}",
                            it.name,
                            world.location_description(loc)
                        ));
                    }
                }
                bail!(GenerationError::VerificationFailed {
                    player,
                    name,
                    reason: format!(
                        "completion condition not met; progression out of reach: [{}]",
                        missing.join(", ")
                    ),
                });
            }
            if self.minimal_players[player] {
                continue;
            }
            let mut unreachable = vec![];
            for loc in world.player_locations(player) {
                if world.locations[loc].address.is_some() && !state.can_reach_location(loc)? {
                    unreachable.push(world.locations[loc].name.clone());
                }
            }
            if !unreachable.is_empty() {
                bail!(GenerationError::VerificationFailed {
                    player,
                    name,
                    reason: format!("locations out of reach: [{}]", unreachable.join(", ")),
                });
            }
        }
        Ok(())
    }

    pub fn get_randomization(
        &self,
        placement: &Placement,
        worlds: &[Box<dyn World>],
        seed: u64,
        seed_name: &str,
    ) -> Result<Randomization> {
        let world = self.world;
        let mut players = vec![];
        for (player, adapter) in worlds.iter().enumerate() {
            let mut locations = BTreeMap::new();
            for loc in world.player_locations(player) {
                let (Some(address), Some(item)) =
                    (world.locations[loc].address, placement.items[loc])
                else {
                    continue;
                };
                let it = &world.items[item];
                let Some(code) = it.code else {
                    bail!(
                        "{} at {} has no item code",
                        world.item_description(item),
                        world.location_description(loc)
                    );
                };
                locations.insert(
                    address,
                    PlacedItem {
                        item: code,
                        player: it.player,
                    },
                );
            }
            let start_inventory = world.precollected_items[player]
                .iter()
                .filter_map(|&i| world.items[i].code)
                .collect();
            let slot_data = adapter
                .fill_slot_data(world, player, placement)
                .with_context(|| format!("slot data for player {player}"))?;
            players.push(PlayerOutput {
                name: world.player_name(player).to_string(),
                game: world.players[player].game.clone(),
                locations,
                start_inventory,
                slot_data,
            });
        }
        Ok(Randomization {
            seed,
            seed_name: seed_name.to_string(),
            players,
        })
    }
}

pub fn get_seed_name(seed: u64) -> String {
    let mut rng_seed = [0u8; 32];
    rng_seed[..8].copy_from_slice(&seed.to_le_bytes());
    // Keep this stream apart from the generation rng.
    rng_seed[8] = 1;
    let mut rng = StdRng::from_seed(rng_seed);
    // Leave out vowels and characters that could read like vowels, to minimize the chance
    // of forming words.
    let alphabet = "256789BCDFGHJKLMNPQRSTVWXYZbcdfghjkmnpqrstvwxyz";
    let mut out = String::new();
    for _ in 0..9 {
        let i = rng.gen_range(0..alphabet.len());
        out.push(alphabet.as_bytes()[i] as char);
    }
    out
}

/// Runs a whole generation: adapters, checks, fill, verification, output.
pub fn generate(
    worlds: &mut [Box<dyn World>],
    settings: &GenerationSettings,
    seed: u64,
) -> Result<Generated> {
    let settings = settings.for_players(worlds.len())?;
    let mut rng_seed = [0u8; 32];
    rng_seed[..8].copy_from_slice(&seed.to_le_bytes());
    let mut rng = StdRng::from_seed(rng_seed);
    let seed_name = get_seed_name(seed);

    let mw = build_multiworld(worlds, &settings, &mut rng)?;
    let (placement, randomization, spoiler_log) = {
        let randomizer = Randomizer::new(&mw, &settings);
        let mut state = RandomizationState::new(&mw);
        randomizer.precheck(&state)?;
        for (player, world) in worlds.iter_mut().enumerate() {
            world
                .pre_fill(&mw, player, &mut state, &mut rng)
                .with_context(|| format!("pre_fill for player {player}"))?;
        }
        randomizer.randomize(&mut state, seed, &mut rng)?;
        let spoiler_log = if settings.spoiler {
            Some(get_spoiler_log(&mw, &state.placement, seed, &seed_name)?)
        } else {
            None
        };
        let randomization =
            randomizer.get_randomization(&state.placement, worlds, seed, &seed_name)?;
        (state.placement, randomization, spoiler_log)
    };
    info!("[seed {seed}] generated seed {seed_name}");
    Ok(Generated {
        multiworld: mw,
        placement,
        randomization,
        spoiler_log,
    })
}
