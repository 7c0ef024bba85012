use anyhow::{Context, Result};
use log::info;
use multiworld_game::{ItemIdx, MultiWorld, Placement, PlayerId};
use rand::rngs::StdRng;

use crate::randomize::RandomizationState;
use crate::settings::GenerationSettings;

/// One player's game: builds its part of the shared graph and pool.
///
/// Each stage runs for every player, in player order, before the next stage
/// starts. Everything random must draw from the supplied `rng`.
pub trait World {
    fn game(&self) -> &str;

    /// Runs before any region exists. Early item requests belong here.
    fn generate_early(
        &mut self,
        _world: &mut MultiWorld,
        _player: PlayerId,
        _rng: &mut StdRng,
    ) -> Result<()> {
        Ok(())
    }

    fn create_regions(
        &mut self,
        world: &mut MultiWorld,
        player: PlayerId,
        rng: &mut StdRng,
    ) -> Result<()>;

    /// Must add exactly as many items to `world.itempool` as the player has
    /// unfilled addressed locations.
    fn create_items(
        &mut self,
        world: &mut MultiWorld,
        player: PlayerId,
        rng: &mut StdRng,
    ) -> Result<()>;

    /// Creates a single item by name, outside the pool.
    fn create_item(&self, world: &mut MultiWorld, player: PlayerId, name: &str)
        -> Result<ItemIdx>;

    /// Access rules, item rules and the completion condition.
    fn set_rules(&mut self, world: &mut MultiWorld, player: PlayerId) -> Result<()>;

    /// Places items ahead of the main fill. Items placed here must be taken
    /// out of `state.pool`.
    fn pre_fill(
        &mut self,
        _world: &MultiWorld,
        _player: PlayerId,
        _state: &mut RandomizationState,
        _rng: &mut StdRng,
    ) -> Result<()> {
        Ok(())
    }

    /// Opaque data handed to the client of this player along with the
    /// final assignment.
    fn fill_slot_data(
        &self,
        _world: &MultiWorld,
        _player: PlayerId,
        _placement: &Placement,
    ) -> Result<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }
}

/// Runs every construction stage of every adapter and returns the frozen
/// graph. `settings` must already hold one entry per world.
pub fn build_multiworld(
    worlds: &mut [Box<dyn World>],
    settings: &GenerationSettings,
    rng: &mut StdRng,
) -> Result<MultiWorld> {
    let mut mw = MultiWorld::new();
    for (world, player_settings) in worlds.iter().zip(&settings.players) {
        mw.add_player(&player_settings.name, world.game());
    }
    for (player, world) in worlds.iter_mut().enumerate() {
        world
            .generate_early(&mut mw, player, rng)
            .with_context(|| format!("generate_early for player {player}"))?;
        let player_settings = &settings.players[player];
        for (name, &count) in &player_settings.early_items {
            *mw.early_items[player].entry(name.clone()).or_default() += count;
        }
        for (name, &count) in &player_settings.local_early_items {
            *mw.local_early_items[player].entry(name.clone()).or_default() += count;
        }
    }
    for (player, world) in worlds.iter_mut().enumerate() {
        world
            .create_regions(&mut mw, player, rng)
            .with_context(|| format!("create_regions for player {player}"))?;
    }
    for (player, world) in worlds.iter_mut().enumerate() {
        world
            .create_items(&mut mw, player, rng)
            .with_context(|| format!("create_items for player {player}"))?;
    }
    for (player, world) in worlds.iter().enumerate() {
        for (name, &count) in &settings.players[player].start_inventory {
            for _ in 0..count {
                let item = world.create_item(&mut mw, player, name)?;
                mw.push_precollected(item);
            }
        }
    }
    for (player, world) in worlds.iter_mut().enumerate() {
        world
            .set_rules(&mut mw, player)
            .with_context(|| format!("set_rules for player {player}"))?;
    }
    info!(
        "built {} players: {} regions, {} locations, {} pool items",
        mw.num_players(),
        mw.regions.len(),
        mw.locations.len(),
        mw.itempool.len()
    );
    Ok(mw)
}
