use anyhow::{bail, Result};
use log::info;
use multiworld_game::{
    GenerationError, ItemClassification, ItemCode, ItemIdx, MultiWorld, PlayerId,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// An item an adapter wants in its pool.
#[derive(Clone, Debug, PartialEq)]
pub struct PoolEntry {
    pub name: String,
    pub classification: ItemClassification,
    pub code: Option<ItemCode>,
    // Non-unique items may be dropped when the pool is oversupplied.
    pub repeatable: bool,
}

impl PoolEntry {
    pub fn new(name: &str, classification: ItemClassification, code: ItemCode) -> Self {
        PoolEntry {
            name: name.to_string(),
            classification,
            code: Some(code),
            repeatable: false,
        }
    }

    pub fn repeatable(mut self) -> Self {
        self.repeatable = true;
        self
    }
}

/// Sizes `entries` to the player's unfilled locations, then creates the
/// items and adds them to the pool.
///
/// Oversupply is trimmed from repeatable entries, chosen at random.
/// Undersupply is padded with random picks from `filler`.
pub fn assemble_pool(
    world: &mut MultiWorld,
    player: PlayerId,
    mut entries: Vec<PoolEntry>,
    filler: &[PoolEntry],
    rng: &mut StdRng,
) -> Result<Vec<ItemIdx>> {
    let target = world.get_unfilled_locations(Some(player)).len();
    if entries.len() > target {
        let excess = entries.len() - target;
        let mut repeatable: Vec<usize> = (0..entries.len())
            .filter(|&i| entries[i].repeatable)
            .collect();
        if repeatable.len() < excess {
            bail!(GenerationError::PoolMismatch {
                items: entries.len(),
                locations: target,
                breakdown: format!(
                    "{}: {} unique items for {} locations",
                    world.player_name(player),
                    entries.len() - repeatable.len(),
                    target
                ),
            });
        }
        repeatable.shuffle(rng);
        let mut dropped = repeatable[..excess].to_vec();
        dropped.sort_unstable();
        for &i in dropped.iter().rev() {
            entries.remove(i);
        }
        info!(
            "{}: trimmed {excess} repeatable items from the pool",
            world.player_name(player)
        );
    } else if entries.len() < target {
        let missing = target - entries.len();
        if filler.is_empty() {
            bail!(GenerationError::PoolMismatch {
                items: entries.len(),
                locations: target,
                breakdown: format!(
                    "{}: {missing} locations short and no filler items",
                    world.player_name(player)
                ),
            });
        }
        for _ in 0..missing {
            if let Some(f) = filler.choose(rng) {
                entries.push(f.clone());
            }
        }
    }

    let items: Vec<ItemIdx> = entries
        .iter()
        .map(|e| world.create_item(player, &e.name, e.classification, e.code))
        .collect();
    world.itempool.extend(&items);
    Ok(items)
}
