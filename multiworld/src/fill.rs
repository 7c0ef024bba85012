use std::collections::VecDeque;

use anyhow::{bail, Result};
use hashbrown::HashMap;
use log::{debug, info, warn};
use multiworld_game::{
    GenerationError, ItemClassification, ItemIdx, ItemNameId, LocationIdx, LocationProgressType,
    MultiWorld, Placement, PlayerId, RegionIdx,
};
use multiworld_logic::sweep::sweep_from_pool;
use multiworld_logic::CollectionState;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

// An item is not swapped out more than this many times per fill, so that two
// items competing for the same spot cannot trade places forever.
const MAX_SWAPS_PER_ITEM: usize = 2;

#[derive(Clone, Copy, Debug)]
pub struct FillOptions<'a> {
    // Names the fill in logs and errors.
    pub stage: &'a str,
    /// Items may only land in their owner's locations.
    pub single_player_placement: bool,
    pub swap: bool,
    /// Return unplaceable items to the pool instead of failing.
    pub allow_partial: bool,
    pub swap_budget: usize,
    /// When set, candidate locations are weighted by the static depth of
    /// their region instead of taking the first eligible one.
    pub depth_weights: Option<&'a [usize]>,
    /// Players whose locations need not all be reachable.
    pub minimal_players: &'a [bool],
}

impl<'a> FillOptions<'a> {
    pub fn new(stage: &'a str) -> Self {
        FillOptions {
            stage,
            single_player_placement: false,
            swap: true,
            allow_partial: false,
            swap_budget: 50,
            depth_weights: None,
            minimal_players: &[],
        }
    }

    fn is_minimal(&self, player: PlayerId) -> bool {
        self.minimal_players.get(player).copied().unwrap_or(false)
    }
}

/// Whether `item` may sit at `location` at all, ignoring reachability.
pub fn item_fits(
    world: &MultiWorld,
    item: ItemIdx,
    location: LocationIdx,
    single_player_placement: bool,
) -> Result<bool> {
    let it = &world.items[item];
    let loc = &world.locations[location];
    if single_player_placement && loc.player != it.player {
        return Ok(false);
    }
    if it.is_progression() && loc.progress_type == LocationProgressType::Excluded {
        return Ok(false);
    }
    loc.item_rule.accepts(it)
}

fn can_fill(
    state: &mut CollectionState,
    item: ItemIdx,
    location: LocationIdx,
    placement: &Placement,
    opts: &FillOptions,
    skip_access_check: bool,
) -> Result<bool> {
    let world = state.world;
    if placement.is_filled(location)
        || !item_fits(world, item, location, opts.single_player_placement)?
    {
        return Ok(false);
    }
    if skip_access_check && opts.is_minimal(world.locations[location].player) {
        return Ok(true);
    }
    state.can_reach_location(location)
}

// Index into `locations` of the spot chosen for `item`.
fn choose_location(
    state: &mut CollectionState,
    item: ItemIdx,
    locations: &[LocationIdx],
    placement: &Placement,
    opts: &FillOptions,
    skip_access_check: bool,
    rng: &mut StdRng,
) -> Result<Option<usize>> {
    let Some(depth) = opts.depth_weights else {
        // `locations` is shuffled, so the first eligible one is a uniform pick.
        for (i, &loc) in locations.iter().enumerate() {
            if can_fill(state, item, loc, placement, opts, skip_access_check)? {
                return Ok(Some(i));
            }
        }
        return Ok(None);
    };
    let world = state.world;
    let mut candidates: Vec<usize> = vec![];
    let mut weights: Vec<usize> = vec![];
    for (i, &loc) in locations.iter().enumerate() {
        if can_fill(state, item, loc, placement, opts, skip_access_check)? {
            candidates.push(i);
            weights.push(1 + depth[world.locations[loc].parent_region]);
        }
    }
    if candidates.is_empty() {
        return Ok(None);
    }
    let dist = WeightedIndex::new(&weights)?;
    Ok(Some(candidates[dist.sample(rng)]))
}

/// Places `item_pool` into `locations` so that the remaining pool stays
/// collectible: each item goes where the state assuming every other unplaced
/// item (plus `base_state`, swept over `placement`) can reach.
///
/// Placed locations are removed from `locations` and returned in placement
/// order. When an item has no reachable spot, earlier placements of this
/// call are swapped out, most recent first, up to `opts.swap_budget` times.
pub fn fill_restrictive(
    world: &MultiWorld,
    base_state: &CollectionState,
    locations: &mut Vec<LocationIdx>,
    item_pool: &mut Vec<ItemIdx>,
    placement: &mut Placement,
    opts: &FillOptions,
    rng: &mut StdRng,
) -> Result<Vec<LocationIdx>> {
    let mut placements: Vec<LocationIdx> = vec![];
    let mut unplaced: Vec<ItemIdx> = vec![];
    let mut swap_counts: HashMap<(PlayerId, ItemNameId), usize> = HashMap::new();
    let mut swaps = 0;

    while let Some(item) = item_pool.pop() {
        let mut state = sweep_from_pool(base_state, item_pool, placement)?;
        let owner = world.items[item].player;
        let skip_access_check = opts.is_minimal(owner) && state.has_beaten_game(owner)?;

        let mut spot = choose_location(
            &mut state,
            item,
            locations,
            placement,
            opts,
            skip_access_check,
            rng,
        )?
        .map(|i| locations.remove(i));

        if spot.is_none() && opts.swap && swaps < opts.swap_budget {
            spot = try_swap(
                world,
                base_state,
                item,
                item_pool,
                &mut placements,
                placement,
                opts,
                &mut swap_counts,
            )?;
            if spot.is_some() {
                swaps += 1;
            }
        }

        match spot {
            Some(loc) => {
                placement.place(loc, item)?;
                placements.push(loc);
            }
            None => {
                debug!(
                    "{}: no location for {}",
                    opts.stage,
                    world.item_description(item)
                );
                unplaced.push(item);
            }
        }
    }

    if !unplaced.is_empty() {
        if opts.allow_partial {
            warn!(
                "{}: {} items could not be placed and go back to the pool",
                opts.stage,
                unplaced.len()
            );
            item_pool.extend(unplaced);
        } else {
            bail!(GenerationError::SearchExhausted {
                stage: opts.stage.to_string(),
                unplaced: unplaced.iter().map(|&i| world.item_description(i)).collect(),
                swaps,
            });
        }
    }
    info!(
        "{}: placed {} items ({} swaps)",
        opts.stage,
        placements.len(),
        swaps
    );
    Ok(placements)
}

// Looks for an earlier placement of this fill whose spot `item` could take,
// assuming the displaced item is still to be placed. On success the spot is
// emptied, removed from `placements`, and the displaced item goes back on top
// of the pool.
#[allow(clippy::too_many_arguments)]
fn try_swap(
    world: &MultiWorld,
    base_state: &CollectionState,
    item: ItemIdx,
    item_pool: &mut Vec<ItemIdx>,
    placements: &mut Vec<LocationIdx>,
    placement: &mut Placement,
    opts: &FillOptions,
    swap_counts: &mut HashMap<(PlayerId, ItemNameId), usize>,
) -> Result<Option<LocationIdx>> {
    for i in (0..placements.len()).rev() {
        let loc = placements[i];
        let Some(placed) = placement.items[loc] else {
            continue;
        };
        let key = (world.items[placed].player, world.items[placed].name_id);
        if swap_counts.get(&key).copied().unwrap_or(0) >= MAX_SWAPS_PER_ITEM {
            continue;
        }
        if !item_fits(world, item, loc, opts.single_player_placement)? {
            continue;
        }
        placement.items[loc] = None;
        item_pool.push(placed);
        let mut swap_state = sweep_from_pool(base_state, item_pool, placement)?;
        if swap_state.can_reach_location(loc)? {
            placements.remove(i);
            *swap_counts.entry(key).or_default() += 1;
            debug!(
                "{}: {} displaces {} at {}",
                opts.stage,
                world.item_description(item),
                world.item_description(placed),
                world.location_description(loc)
            );
            return Ok(Some(loc));
        }
        item_pool.pop();
        placement.items[loc] = Some(placed);
    }
    Ok(None)
}

/// Places items with no regard for reachability, only item rules and
/// exclusion. Fails if anything is left over.
pub fn remaining_fill(
    world: &MultiWorld,
    locations: &mut Vec<LocationIdx>,
    item_pool: &mut Vec<ItemIdx>,
    placement: &mut Placement,
    stage: &str,
) -> Result<()> {
    let mut placements: Vec<LocationIdx> = vec![];
    let mut unplaced: Vec<ItemIdx> = vec![];
    let mut swaps = 0;

    while let Some(item) = item_pool.pop() {
        let mut spot = None;
        for (i, &loc) in locations.iter().enumerate() {
            if !placement.is_filled(loc) && item_fits(world, item, loc, false)? {
                spot = Some(i);
                break;
            }
        }
        if let Some(i) = spot {
            let loc = locations.remove(i);
            placement.place(loc, item)?;
            placements.push(loc);
            continue;
        }

        // Move an earlier item to a free spot it accepts and take its place.
        let mut swapped = false;
        'outer: for &p in placements.iter().rev() {
            if !item_fits(world, item, p, false)? {
                continue;
            }
            let Some(other) = placement.items[p] else {
                continue;
            };
            for (i, &loc) in locations.iter().enumerate() {
                if !placement.is_filled(loc) && item_fits(world, other, loc, false)? {
                    let loc = locations.remove(i);
                    placement.items[p] = Some(item);
                    placement.place(loc, other)?;
                    placements.push(loc);
                    swaps += 1;
                    swapped = true;
                    break 'outer;
                }
            }
        }
        if !swapped {
            unplaced.push(item);
        }
    }

    if !unplaced.is_empty() {
        bail!(GenerationError::SearchExhausted {
            stage: stage.to_string(),
            unplaced: unplaced.iter().map(|&i| world.item_description(i)).collect(),
            swaps,
        });
    }
    info!("{stage}: placed {} items ({swaps} swaps)", placements.len());
    Ok(())
}

/// The main fill: priority locations, then progression, then excluded
/// locations, then everything else. Consumes `pool`.
pub fn distribute_items_restrictive(
    world: &MultiWorld,
    base_state: &CollectionState,
    pool: &mut Vec<ItemIdx>,
    placement: &mut Placement,
    template: &FillOptions,
    rng: &mut StdRng,
) -> Result<()> {
    let mut fill_locations = placement.unfilled_locations(world);
    fill_locations.shuffle(rng);
    let mut itempool = std::mem::take(pool);
    itempool.shuffle(rng);

    let mut progitempool: Vec<ItemIdx> = vec![];
    let mut usefulitempool: Vec<ItemIdx> = vec![];
    let mut filleritempool: Vec<ItemIdx> = vec![];
    for item in itempool {
        let it = &world.items[item];
        if it.is_progression() {
            progitempool.push(item);
        } else if it.classification == ItemClassification::Useful {
            usefulitempool.push(item);
        } else {
            filleritempool.push(item);
        }
    }

    let mut prioritylocations: Vec<LocationIdx> = vec![];
    let mut defaultlocations: Vec<LocationIdx> = vec![];
    let mut excludedlocations: Vec<LocationIdx> = vec![];
    for loc in fill_locations {
        match world.locations[loc].progress_type {
            LocationProgressType::Priority => prioritylocations.push(loc),
            LocationProgressType::Default => defaultlocations.push(loc),
            LocationProgressType::Excluded => excludedlocations.push(loc),
        }
    }

    let available = usefulitempool.len() + filleritempool.len();
    if excludedlocations.len() > available {
        bail!(GenerationError::ExcludedOverflow {
            excluded: excludedlocations.len(),
            available,
        });
    }

    if !prioritylocations.is_empty() && !progitempool.is_empty() {
        let opts = FillOptions {
            stage: "Priority",
            swap: false,
            allow_partial: true,
            ..*template
        };
        fill_restrictive(
            world,
            base_state,
            &mut prioritylocations,
            &mut progitempool,
            placement,
            &opts,
            rng,
        )?;
        defaultlocations.append(&mut prioritylocations);
        defaultlocations.shuffle(rng);
    } else {
        defaultlocations.append(&mut prioritylocations);
    }

    if !progitempool.is_empty() {
        let opts = FillOptions {
            stage: "Progression",
            swap: true,
            allow_partial: false,
            ..*template
        };
        fill_restrictive(
            world,
            base_state,
            &mut defaultlocations,
            &mut progitempool,
            placement,
            &opts,
            rng,
        )?;
    }

    // Excluded locations take filler first, then useful items if filler runs out.
    let n = excludedlocations.len();
    let mut excluded_pool = filleritempool.split_off(filleritempool.len().saturating_sub(n));
    if excluded_pool.len() < n {
        let need = n - excluded_pool.len();
        excluded_pool.extend(usefulitempool.split_off(usefulitempool.len() - need));
    }
    remaining_fill(
        world,
        &mut excludedlocations,
        &mut excluded_pool,
        placement,
        "Excluded",
    )?;

    // Popped from the back, so useful items are placed before filler.
    let mut rest = filleritempool;
    rest.append(&mut usefulitempool);
    remaining_fill(world, &mut defaultlocations, &mut rest, placement, "Remaining")?;

    let unfilled = placement.unfilled_locations(world);
    if !unfilled.is_empty() {
        bail!(GenerationError::UnfilledLocations {
            locations: unfilled
                .iter()
                .map(|&l| world.location_description(l))
                .collect(),
        });
    }
    Ok(())
}

/// Breadth-first distance of every region from its player's start region,
/// ignoring rules. Regions with no path at all get 0.
pub fn region_depths(world: &MultiWorld) -> Vec<usize> {
    let mut depth: Vec<Option<usize>> = vec![None; world.regions.len()];
    let mut queue: VecDeque<RegionIdx> = VecDeque::new();
    for &start in world.start_regions.iter().flatten() {
        depth[start] = Some(0);
        queue.push_back(start);
    }
    while let Some(r) = queue.pop_front() {
        let d = depth[r].unwrap_or(0);
        for &e in &world.regions[r].exits {
            if let Some(target) = world.entrances[e].connected_region {
                if depth[target].is_none() {
                    depth[target] = Some(d + 1);
                    queue.push_back(target);
                }
            }
        }
    }
    depth.into_iter().map(|d| d.unwrap_or(0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use multiworld_game::ItemRule;
    use rand::SeedableRng;

    // Start -> Vault (needs Key) -> Inner (needs Lamp), one chest per region.
    fn chain_world() -> MultiWorld {
        let mut mw = MultiWorld::new();
        let p = mw.add_player("Alice", "Test");
        let start = mw.create_region(p, "Start").unwrap();
        let vault = mw.create_region(p, "Vault").unwrap();
        let inner = mw.create_region(p, "Inner").unwrap();
        let key = mw.has("Key", p);
        let lamp = mw.has("Lamp", p);
        mw.connect(start, vault, None, key).unwrap();
        mw.connect(vault, inner, None, lamp).unwrap();
        mw.create_location(start, "Chest@Start", Some(100)).unwrap();
        mw.create_location(vault, "Chest@Vault", Some(101)).unwrap();
        mw.create_location(inner, "Chest@Inner", Some(102)).unwrap();
        let k = mw.create_item(p, "Key", ItemClassification::Progression, Some(1));
        let l = mw.create_item(p, "Lamp", ItemClassification::Progression, Some(2));
        let c = mw.create_item(p, "Coin", ItemClassification::Filler, Some(3));
        mw.itempool = vec![k, l, c];
        mw
    }

    #[test]
    fn progression_fill_keeps_the_chain_solvable() {
        let mw = chain_world();
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut placement = Placement::new(&mw);
            let mut pool = mw.itempool.clone();
            let base = CollectionState::new(&mw);
            distribute_items_restrictive(
                &mw,
                &base,
                &mut pool,
                &mut placement,
                &FillOptions::new("Test"),
                &mut rng,
            )
            .unwrap();
            assert_eq!(placement.item_at(0), Some(0), "Key must open the chain");
            assert_eq!(placement.item_at(1), Some(1), "Lamp must sit before Inner");
            assert_eq!(placement.item_at(2), Some(2));
        }
    }

    #[test]
    fn excluded_location_gets_no_progression() {
        let mut mw = chain_world();
        mw.set_progress_type(0, LocationProgressType::Excluded);
        let mut rng = StdRng::seed_from_u64(1);
        let mut placement = Placement::new(&mw);
        let mut pool = mw.itempool.clone();
        let base = CollectionState::new(&mw);
        // Key can only go to Chest@Start, which is excluded.
        let err = distribute_items_restrictive(
            &mw,
            &base,
            &mut pool,
            &mut placement,
            &FillOptions::new("Test"),
            &mut rng,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GenerationError>(),
            Some(GenerationError::SearchExhausted { .. })
        ));
    }

    #[test]
    fn partial_fill_returns_items_to_the_pool() {
        let mw = chain_world();
        let mut rng = StdRng::seed_from_u64(2);
        let mut placement = Placement::new(&mw);
        let base = CollectionState::new(&mw);
        // Only the Vault chest is offered and nothing opens it.
        let mut locations = vec![1];
        let mut pool = vec![0];
        let opts = FillOptions {
            allow_partial: true,
            swap: false,
            ..FillOptions::new("Partial")
        };
        let placed = fill_restrictive(
            &mw,
            &base,
            &mut locations,
            &mut pool,
            &mut placement,
            &opts,
            &mut rng,
        )
        .unwrap();
        assert!(placed.is_empty());
        assert_eq!(pool, vec![0]);
        assert!(!placement.is_filled(1));
    }

    #[test]
    fn swap_recovers_from_a_bad_first_pick() {
        let mw = chain_world();
        let mut rng = StdRng::seed_from_u64(3);
        let mut placement = Placement::new(&mw);
        let base = CollectionState::new(&mw);
        // Lamp is placed first and can only take Chest@Start, after which
        // the Key has nowhere to go unless the Lamp is swapped out.
        let mut locations = vec![0, 1];
        let mut pool = vec![0, 1];
        let placed = fill_restrictive(
            &mw,
            &base,
            &mut locations,
            &mut pool,
            &mut placement,
            &FillOptions::new("Swap"),
            &mut rng,
        )
        .unwrap();
        assert_eq!(placed.len(), 2);
        assert_eq!(placement.item_at(0), Some(0));
        assert_eq!(placement.item_at(1), Some(1));
    }

    // Start -> A (needs K1) -> B (needs K2) -> C (needs K3), one chest per
    // region. Map opens nothing.
    fn long_chain_world() -> MultiWorld {
        let mut mw = MultiWorld::new();
        let p = mw.add_player("Alice", "Test");
        let mut prev = mw.create_region(p, "Start").unwrap();
        mw.create_location(prev, "Chest@Start", Some(100)).unwrap();
        for (i, (region, key)) in [("A", "K1"), ("B", "K2"), ("C", "K3")].iter().enumerate() {
            let next = mw.create_region(p, region).unwrap();
            let rule = mw.has(key, p);
            mw.connect(prev, next, None, rule).unwrap();
            mw.create_location(next, &format!("Chest@{region}"), Some(101 + i as i64))
                .unwrap();
            prev = next;
        }
        for (code, name) in ["K1", "K2", "K3", "Map"].iter().enumerate() {
            let item = mw.create_item(p, name, ItemClassification::Progression, Some(code as i64));
            mw.itempool.push(item);
        }
        mw
    }

    #[test]
    fn swap_budget_bounds_the_search() {
        let mw = long_chain_world();
        // Locations are tried in order and Map is popped first, so Map takes
        // Chest@Start and K3 takes Chest@A. K2 and then K1 each need a swap.
        let run = |swap_budget: usize| {
            let mut rng = StdRng::seed_from_u64(0);
            let mut placement = Placement::new(&mw);
            let base = CollectionState::new(&mw);
            let mut locations = vec![0, 1, 2, 3];
            let mut pool = mw.itempool.clone();
            let opts = FillOptions {
                swap_budget,
                ..FillOptions::new("Budget")
            };
            fill_restrictive(
                &mw,
                &base,
                &mut locations,
                &mut pool,
                &mut placement,
                &opts,
                &mut rng,
            )
            .map(|_| placement)
        };

        let err = run(1).unwrap_err();
        match err.downcast_ref::<GenerationError>() {
            Some(GenerationError::SearchExhausted {
                stage,
                unplaced,
                swaps,
            }) => {
                assert_eq!(stage, "Budget");
                assert_eq!(*swaps, 1);
                assert_eq!(unplaced, &vec!["K1 (Alice)".to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(!err
            .downcast_ref::<GenerationError>()
            .unwrap()
            .is_configuration());

        let placement = run(50).unwrap();
        assert_eq!(placement.item_at(0), Some(0));
        assert_eq!(placement.item_at(1), Some(1));
        assert_eq!(placement.item_at(2), Some(2));
        assert_eq!(placement.item_at(3), Some(3));
    }

    #[test]
    fn depth_weighted_fill_keeps_the_chain_solvable() {
        let mw = chain_world();
        let depths = region_depths(&mw);
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut placement = Placement::new(&mw);
            let mut pool = mw.itempool.clone();
            let base = CollectionState::new(&mw);
            let opts = FillOptions {
                depth_weights: Some(depths.as_slice()),
                ..FillOptions::new("Weighted")
            };
            distribute_items_restrictive(&mw, &base, &mut pool, &mut placement, &opts, &mut rng)
                .unwrap();
            assert_eq!(placement.item_at(0), Some(0));
            assert_eq!(placement.item_at(1), Some(1));
            assert_eq!(placement.item_at(2), Some(2));
        }
    }

    #[test]
    fn short_pool_leaves_unfilled_locations() {
        let mw = chain_world();
        let mut rng = StdRng::seed_from_u64(4);
        let mut placement = Placement::new(&mw);
        // Only the Key: Vault and Inner stay empty.
        let mut pool = vec![0];
        let base = CollectionState::new(&mw);
        let err = distribute_items_restrictive(
            &mw,
            &base,
            &mut pool,
            &mut placement,
            &FillOptions::new("Test"),
            &mut rng,
        )
        .unwrap_err();
        let Some(GenerationError::UnfilledLocations { locations }) =
            err.downcast_ref::<GenerationError>()
        else {
            panic!("unexpected error {err}");
        };
        assert_eq!(locations.len(), 2);
        assert!(!err
            .downcast_ref::<GenerationError>()
            .unwrap()
            .is_configuration());
    }

    #[test]
    fn single_player_fill_keeps_items_at_home() {
        let mut mw = MultiWorld::new();
        for name in ["Alice", "Bob"] {
            let p = mw.add_player(name, "Test");
            let start = mw.create_region(p, "Start").unwrap();
            for i in 0..2 {
                mw.create_location(start, &format!("Chest {i}"), Some(i)).unwrap();
            }
            let sword = mw.create_item(p, "Sword", ItemClassification::Progression, Some(1));
            mw.itempool.push(sword);
        }
        for seed in 0..10 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut placement = Placement::new(&mw);
            let base = CollectionState::new(&mw);
            // Bob's chests come first, so an unrestricted fill would put
            // both swords there.
            let mut locations = vec![2, 3, 0, 1];
            let mut pool = mw.itempool.clone();
            let opts = FillOptions {
                single_player_placement: true,
                ..FillOptions::new("Local")
            };
            fill_restrictive(
                &mw,
                &base,
                &mut locations,
                &mut pool,
                &mut placement,
                &opts,
                &mut rng,
            )
            .unwrap();
            for item in 0..2 {
                let loc = placement.items.iter().position(|&i| i == Some(item)).unwrap();
                assert_eq!(mw.locations[loc].player, mw.items[item].player);
            }
        }
    }

    #[test]
    fn remaining_fill_respects_item_rules() {
        let mut mw = chain_world();
        let coin_only = ItemRule::Named(vec![mw.item_name_id("Coin")]);
        mw.add_item_rule(0, coin_only);
        let mut placement = Placement::new(&mw);
        let mut locations = vec![0, 1];
        // Lamp is popped first and would take Chest@Start if allowed.
        let mut pool = vec![2, 1];
        remaining_fill(&mw, &mut locations, &mut pool, &mut placement, "Rest").unwrap();
        assert_eq!(placement.item_at(0), Some(2));
        assert_eq!(placement.item_at(1), Some(1));
    }

    #[test]
    fn depths_ignore_rules() {
        let mw = chain_world();
        assert_eq!(region_depths(&mw), vec![0, 1, 2]);
    }
}
