use anyhow::Result;
use log::{debug, info, warn};
use multiworld_game::{
    GenerationError, ItemIdx, LocationIdx, LocationProgressType, MultiWorld, Placement, PlayerId,
};
use multiworld_logic::CollectionState;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::fill::{fill_restrictive, item_fits, FillOptions};

// Takes up to `count` copies of the named item out of the pool.
fn take_from_pool(
    world: &MultiWorld,
    pool: &mut Vec<ItemIdx>,
    player: PlayerId,
    name: &str,
    count: usize,
) -> Vec<ItemIdx> {
    let mut taken = vec![];
    let mut i = 0;
    while i < pool.len() && taken.len() < count {
        let it = &world.items[pool[i]];
        if it.player == player && it.name == name {
            taken.push(pool.remove(i));
        } else {
            i += 1;
        }
    }
    if taken.len() < count {
        warn!(
            "{}: asked for {} early '{}' but the pool only has {}",
            world.player_name(player),
            count,
            name,
            taken.len()
        );
    }
    taken
}

// Whether the fill can still succeed with the spots left in `placement`:
// every progression item of `pending` gets a reachable spot, and excluded
// locations do not outnumber the non-progression items. Runs on copies, so
// neither `placement` nor `rng` moves.
fn main_fill_still_fits(
    world: &MultiWorld,
    base_state: &CollectionState,
    pending: &[ItemIdx],
    placement: &Placement,
    template: &FillOptions,
    rng: &StdRng,
) -> Result<bool> {
    let mut locations = placement.unfilled_locations(world);
    let excluded = locations
        .iter()
        .filter(|&&l| world.locations[l].progress_type == LocationProgressType::Excluded)
        .count();
    let mut progression: Vec<ItemIdx> = vec![];
    for &item in pending {
        if world.items[item].is_progression() {
            progression.push(item);
        }
    }
    if excluded > pending.len() - progression.len() {
        return Ok(false);
    }
    if progression.is_empty() {
        return Ok(true);
    }

    let mut trial = placement.clone();
    let mut trial_rng = rng.clone();
    locations.shuffle(&mut trial_rng);
    let opts = FillOptions {
        stage: "Early item check",
        swap: true,
        allow_partial: false,
        ..*template
    };
    match fill_restrictive(
        world,
        base_state,
        &mut locations,
        &mut progression,
        &mut trial,
        &opts,
        &mut trial_rng,
    ) {
        Ok(_) => Ok(true),
        Err(e) => match e.downcast_ref::<GenerationError>() {
            Some(GenerationError::SearchExhausted { .. }) => Ok(false),
            _ => Err(e),
        },
    }
}

// Puts `item` in the first of `locations` it fits, as long as the main fill
// can still place `pending` afterwards. The chosen spot is locked and leaves
// `locations`.
#[allow(clippy::too_many_arguments)]
fn place_early(
    world: &MultiWorld,
    base_state: &CollectionState,
    item: ItemIdx,
    locations: &mut Vec<LocationIdx>,
    pending: &[ItemIdx],
    placement: &mut Placement,
    template: &FillOptions,
    single_player_placement: bool,
    rng: &StdRng,
) -> Result<bool> {
    for i in 0..locations.len() {
        let loc = locations[i];
        if placement.is_filled(loc) || !item_fits(world, item, loc, single_player_placement)? {
            continue;
        }
        placement.place(loc, item)?;
        if main_fill_still_fits(world, base_state, pending, placement, template, rng)? {
            placement.lock(loc);
            locations.remove(i);
            return Ok(true);
        }
        placement.take(loc);
        debug!(
            "{} at {} would leave the main fill stuck",
            world.item_description(item),
            world.location_description(loc)
        );
    }
    Ok(false)
}

/// Places the requested early items into locations reachable from the
/// starting state, before the main fill runs. This is a soft priority: an
/// item goes back to `pool` with a warning when it finds no early spot, or
/// when every early spot it fits would leave the rest of the pool with no
/// valid fill.
///
/// Local early items only go to their owner's locations and are handled
/// first.
pub fn distribute_early_items(
    world: &MultiWorld,
    base_state: &CollectionState,
    pool: &mut Vec<ItemIdx>,
    placement: &mut Placement,
    template: &FillOptions,
    rng: &mut StdRng,
) -> Result<()> {
    let requested = world
        .early_items
        .iter()
        .chain(&world.local_early_items)
        .any(|m| !m.is_empty());
    if !requested {
        return Ok(());
    }

    let mut sphere_state = base_state.clone();
    sphere_state.sweep(placement)?;
    let mut early_locations: Vec<LocationIdx> = vec![];
    for loc in placement.unfilled_locations(world) {
        if sphere_state.can_reach_location(loc)? {
            early_locations.push(loc);
        }
    }
    if early_locations.is_empty() {
        warn!("no locations are reachable from the start; early items go to the main fill");
        return Ok(());
    }
    early_locations.shuffle(rng);

    // (item, local) in placement order: local requests first, progression
    // ahead of the rest within each kind.
    let mut local: Vec<ItemIdx> = vec![];
    let mut global: Vec<ItemIdx> = vec![];
    for player in 0..world.num_players() {
        for (name, &count) in &world.local_early_items[player] {
            local.extend(take_from_pool(world, pool, player, name, count));
        }
        for (name, &count) in &world.early_items[player] {
            global.extend(take_from_pool(world, pool, player, name, count));
        }
    }
    local.sort_by_key(|&i| !world.items[i].is_progression());
    global.sort_by_key(|&i| !world.items[i].is_progression());
    let mut requests: Vec<(ItemIdx, bool)> = local.into_iter().map(|i| (i, true)).collect();
    requests.extend(global.into_iter().map(|i| (i, false)));

    let mut leftover: Vec<ItemIdx> = vec![];
    for (n, &(item, local)) in requests.iter().enumerate() {
        let mut pending: Vec<ItemIdx> = pool.clone();
        pending.extend_from_slice(&leftover);
        pending.extend(requests[n + 1..].iter().map(|&(i, _)| i));
        let placed = place_early(
            world,
            base_state,
            item,
            &mut early_locations,
            &pending,
            placement,
            template,
            local,
            rng,
        )?;
        if !placed {
            leftover.push(item);
        }
    }

    if !leftover.is_empty() {
        warn!(
            "{} early items found no early location: {}",
            leftover.len(),
            leftover
                .iter()
                .map(|&i| world.item_description(i))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    info!(
        "early items placed; {} sphere-one locations still open",
        early_locations.len()
    );
    pool.append(&mut leftover);
    Ok(())
}
