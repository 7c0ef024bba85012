use anyhow::Result;
use log::debug;
use multiworld_game::{ItemIdx, LocationIdx, Placement};

use crate::CollectionState;

impl<'a> CollectionState<'a> {
    /// Collects the progression items at every reachable location, one sphere
    /// at a time, until a sphere comes up empty. Returns the spheres (the
    /// locations collected in each).
    pub fn sweep_spheres(&mut self, placement: &Placement) -> Result<Vec<Vec<LocationIdx>>> {
        let world = self.world;
        let mut spheres: Vec<Vec<LocationIdx>> = vec![];
        loop {
            let mut sphere: Vec<LocationIdx> = vec![];
            for loc in 0..world.locations.len() {
                if self.checked_locations[loc] {
                    continue;
                }
                let Some(item) = placement.items[loc] else {
                    continue;
                };
                if !world.items[item].is_progression() {
                    continue;
                }
                if self.can_reach_location(loc)? {
                    sphere.push(loc);
                }
            }
            if sphere.is_empty() {
                break;
            }
            for &loc in &sphere {
                self.checked_locations[loc] = true;
                if let Some(item) = placement.items[loc] {
                    self.collect(item);
                }
            }
            debug!("sphere {}: {} items", spheres.len() + 1, sphere.len());
            spheres.push(sphere);
        }
        Ok(spheres)
    }

    pub fn sweep(&mut self, placement: &Placement) -> Result<usize> {
        Ok(self.sweep_spheres(placement)?.iter().map(|s| s.len()).sum())
    }

    /// Every reachable location, filled or not.
    pub fn reachable_locations(&mut self) -> Result<Vec<LocationIdx>> {
        let mut out = vec![];
        for loc in 0..self.world.locations.len() {
            if self.can_reach_location(loc)? {
                out.push(loc);
            }
        }
        Ok(out)
    }
}

/// `base` plus every item in `pool`, swept over `placement`: the most that
/// could ever be reached if the pool items were all found.
pub fn sweep_from_pool<'a>(
    base: &CollectionState<'a>,
    pool: &[ItemIdx],
    placement: &Placement,
) -> Result<CollectionState<'a>> {
    let mut state = base.clone();
    for &item in pool {
        state.collect(item);
    }
    state.sweep(placement)?;
    Ok(state)
}

/// Starting inventory plus every item of `pool`, swept.
pub fn get_all_state<'a>(
    world: &'a multiworld_game::MultiWorld,
    pool: &[ItemIdx],
    placement: &Placement,
) -> Result<CollectionState<'a>> {
    sweep_from_pool(&CollectionState::new(world), pool, placement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use multiworld_game::{ItemClassification, MultiWorld};

    // Start holds the Key; Vault (needs Key) holds the Lamp; Inner (needs Lamp)
    // holds a filler Coin.
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
        let l0 = mw.create_location(start, "Chest@Start", Some(100)).unwrap();
        let l1 = mw.create_location(vault, "Chest@Vault", Some(101)).unwrap();
        let l2 = mw.create_location(inner, "Chest@Inner", Some(102)).unwrap();
        let key_item = mw.create_item(p, "Key", ItemClassification::Progression, Some(1));
        let lamp_item = mw.create_item(p, "Lamp", ItemClassification::Progression, Some(2));
        let coin = mw.create_item(p, "Coin", ItemClassification::Filler, Some(3));
        mw.itempool = vec![key_item, lamp_item, coin];
        mw.locations[l0].item = Some(key_item);
        mw.locations[l1].item = Some(lamp_item);
        mw.locations[l2].item = Some(coin);
        mw
    }

    #[test]
    fn spheres_follow_the_chain() {
        let mw = chain_world();
        let placement = Placement::new(&mw);
        let mut state = CollectionState::new(&mw);
        let spheres = state.sweep_spheres(&placement).unwrap();
        assert_eq!(spheres, vec![vec![0], vec![1]]);
        assert!(state.has("Lamp", 0, 1));
        assert_eq!(state.reachable_locations().unwrap(), vec![0, 1, 2]);
        // A second sweep finds nothing new.
        assert_eq!(state.sweep(&placement).unwrap(), 0);
    }

    #[test]
    fn sweep_from_pool_assumes_pool_items() {
        let mut mw = chain_world();
        for loc in &mut mw.locations {
            loc.item = None;
        }
        let placement = Placement::new(&mw);
        let base = CollectionState::new(&mw);
        let mut assumed = sweep_from_pool(&base, &mw.itempool, &placement).unwrap();
        assert!(assumed.can_reach_location(2).unwrap());
        let mut partial = sweep_from_pool(&base, &mw.itempool[..1], &placement).unwrap();
        assert!(partial.can_reach_location(1).unwrap());
        assert!(!partial.can_reach_location(2).unwrap());
        assert!(get_all_state(&mw, &mw.itempool, &placement)
            .unwrap()
            .can_reach_location(2)
            .unwrap());
    }
}
