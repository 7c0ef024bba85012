pub mod sweep;

use std::collections::VecDeque;

use anyhow::{bail, Result};
use multiworld_game::{
    EntranceIdx, GenerationError, Inventory, ItemIdx, LocationIdx, MultiWorld, PlayerId,
    RegionIdx, Requirement, RuleContext,
};

/// A hypothetical set of collected items, plus the region reachability it
/// implies.
///
/// Reachability is computed lazily per player and cached; collecting an item
/// marks every player stale, and the next query resumes the fixed point from
/// the regions already known to be reachable.
#[derive(Clone)]
pub struct CollectionState<'a> {
    pub world: &'a MultiWorld,
    pub inventory: Inventory,
    reachable_regions: Vec<bool>, // Corresponds to MultiWorld.regions
    // Exits of reachable regions whose rules did not hold yet, per player:
    blocked_connections: Vec<Vec<EntranceIdx>>,
    stale: Vec<bool>,
    pub checked_locations: Vec<bool>, // Corresponds to MultiWorld.locations
}

impl<'a> CollectionState<'a> {
    /// A state holding nothing at all, not even starting inventory.
    pub fn empty(world: &'a MultiWorld) -> Self {
        let num_players = world.num_players();
        CollectionState {
            world,
            inventory: Inventory::new(num_players),
            reachable_regions: vec![false; world.regions.len()],
            blocked_connections: vec![vec![]; num_players],
            stale: vec![true; num_players],
            checked_locations: vec![false; world.locations.len()],
        }
    }

    /// A state holding every player's starting inventory.
    pub fn new(world: &'a MultiWorld) -> Self {
        let mut state = Self::empty(world);
        for items in &world.precollected_items {
            for &item in items {
                state.collect(item);
            }
        }
        state
    }

    /// Adds an item to the multiset. Only progression items can matter to
    /// any rule, so anything else is ignored. Returns whether the state changed.
    pub fn collect(&mut self, item: ItemIdx) -> bool {
        let it = &self.world.items[item];
        if !it.is_progression() {
            return false;
        }
        self.inventory.add(it.name_id, it.player);
        self.stale.fill(true);
        true
    }

    pub fn with_item(&self, item: ItemIdx) -> Self {
        let mut state = self.clone();
        state.collect(item);
        state
    }

    pub fn count(&self, name: &str, player: PlayerId) -> usize {
        match self.world.item_names.index_by_key.get(name) {
            Some(&name_id) => self.inventory.count(name_id, player),
            None => 0,
        }
    }

    pub fn has(&self, name: &str, player: PlayerId, count: usize) -> bool {
        self.count(name, player) >= count
    }

    pub fn has_any(&self, names: &[&str], player: PlayerId) -> bool {
        names.iter().any(|n| self.count(n, player) > 0)
    }

    pub fn has_all(&self, names: &[&str], player: PlayerId) -> bool {
        names.iter().all(|n| self.count(n, player) > 0)
    }

    pub fn count_group(&self, group: &str, player: PlayerId) -> Result<usize> {
        let names = self.world.get_item_group(group, player)?;
        Ok(names
            .iter()
            .map(|&name_id| self.inventory.count(name_id, player))
            .sum())
    }

    pub fn can_reach_region(&mut self, region: RegionIdx) -> Result<bool> {
        let player = self.world.regions[region].player;
        if self.stale[player] {
            self.update_reachable_regions(player)?;
        }
        Ok(self.reachable_regions[region])
    }

    pub fn can_reach_entrance(&mut self, entrance: EntranceIdx) -> Result<bool> {
        let world = self.world;
        let ent = &world.entrances[entrance];
        Ok(self.can_reach_region(ent.parent_region)? && self.check(&ent.access_rule)?)
    }

    pub fn can_reach_location(&mut self, location: LocationIdx) -> Result<bool> {
        let world = self.world;
        let loc = &world.locations[location];
        Ok(self.can_reach_region(loc.parent_region)? && self.check(&loc.access_rule)?)
    }

    pub fn reachable_regions(&mut self, player: PlayerId) -> Result<Vec<RegionIdx>> {
        if self.stale[player] {
            self.update_reachable_regions(player)?;
        }
        Ok((0..self.world.regions.len())
            .filter(|&r| self.reachable_regions[r] && self.world.regions[r].player == player)
            .collect())
    }

    /// Whether `player`'s completion condition holds.
    pub fn has_beaten_game(&mut self, player: PlayerId) -> Result<bool> {
        let world = self.world;
        self.check(&world.completion_conditions[player])
    }

    pub fn check(&mut self, req: &Requirement) -> Result<bool> {
        Ok(match req {
            Requirement::Free => true,
            Requirement::Never => false,
            Requirement::Has { item, player } => self.inventory.count(*item, *player) >= 1,
            Requirement::CountAtLeast {
                item,
                player,
                count,
            } => self.inventory.count(*item, *player) >= *count,
            Requirement::HasAny { items, player } => {
                items.iter().any(|&i| self.inventory.count(i, *player) > 0)
            }
            Requirement::HasAll { items, player } => {
                items.iter().all(|&i| self.inventory.count(i, *player) > 0)
            }
            Requirement::GroupCountAtLeast {
                group,
                player,
                count,
            } => self.count_group(group, *player)? >= *count,
            Requirement::CanReachRegion(region) => self.can_reach_region(*region)?,
            Requirement::CanReachLocation(location) => self.can_reach_location(*location)?,
            Requirement::And(reqs) => {
                for r in reqs {
                    if !self.check(r)? {
                        return Ok(false);
                    }
                }
                true
            }
            Requirement::Or(reqs) => {
                for r in reqs {
                    if self.check(r)? {
                        return Ok(true);
                    }
                }
                false
            }
            Requirement::Not(r) => !self.check(r)?,
            Requirement::Custom(rule) => rule.eval(&RuleContext {
                world: self.world,
                inventory: &self.inventory,
            })?,
        })
    }

    // Worklist traversal from the start region. Passes repeat until one adds
    // no region, since a rule may look at a region reached later in the pass.
    fn update_reachable_regions(&mut self, player: PlayerId) -> Result<()> {
        self.stale[player] = false;
        let world = self.world;
        let start = match world.start_regions[player] {
            Some(r) => r,
            None => bail!(GenerationError::MissingStartRegion { player }),
        };

        let mut queue: VecDeque<EntranceIdx> = VecDeque::new();
        if !self.reachable_regions[start] {
            self.reachable_regions[start] = true;
            queue.extend(world.regions[start].exits.iter().copied());
        }
        queue.extend(std::mem::take(&mut self.blocked_connections[player]));

        loop {
            let mut blocked: Vec<EntranceIdx> = vec![];
            let mut any_new = false;
            while let Some(e) = queue.pop_front() {
                let entrance = &world.entrances[e];
                let Some(target) = entrance.connected_region else {
                    continue;
                };
                if self.reachable_regions[target] {
                    continue;
                }
                if self.check(&entrance.access_rule)? {
                    self.reachable_regions[target] = true;
                    any_new = true;
                    queue.extend(world.regions[target].exits.iter().copied());
                    if let Some(indirect) = world.indirect_conditions.get(&target) {
                        queue.extend(indirect.iter().copied());
                    }
                } else {
                    blocked.push(e);
                }
            }
            blocked.sort_unstable();
            blocked.dedup();
            blocked.retain(|&e| match world.entrances[e].connected_region {
                Some(t) => !self.reachable_regions[t],
                None => false,
            });
            if !any_new || blocked.is_empty() {
                self.blocked_connections[player] = blocked;
                return Ok(());
            }
            queue.extend(blocked);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multiworld_game::{CustomRule, ItemClassification, RuleTarget};

    // Start -> Vault (needs Key) -> Inner (needs Lamp)
    fn vault_world() -> (MultiWorld, Vec<RegionIdx>) {
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
        (mw, vec![start, vault, inner])
    }

    #[test]
    fn reachability_grows_with_items() {
        let (mut mw, regions) = vault_world();
        let key = mw.create_item(0, "Key", ItemClassification::Progression, Some(1));
        let lamp = mw.create_item(0, "Lamp", ItemClassification::Progression, Some(2));

        let mut state = CollectionState::new(&mw);
        assert!(state.can_reach_region(regions[0]).unwrap());
        assert!(!state.can_reach_region(regions[1]).unwrap());

        let mut with_key = state.with_item(key);
        assert!(with_key.can_reach_region(regions[1]).unwrap());
        assert!(!with_key.can_reach_region(regions[2]).unwrap());
        // The original state is untouched.
        assert!(!state.can_reach_region(regions[1]).unwrap());

        with_key.collect(lamp);
        assert!(with_key.can_reach_region(regions[2]).unwrap());
        assert_eq!(with_key.reachable_regions(0).unwrap().len(), 3);
    }

    #[test]
    fn filler_is_never_counted() {
        let (mut mw, regions) = vault_world();
        let fake_key = mw.create_item(0, "Key", ItemClassification::Filler, Some(1));
        let mut state = CollectionState::new(&mw);
        assert!(!state.collect(fake_key));
        assert_eq!(state.count("Key", 0), 0);
        assert!(!state.can_reach_region(regions[1]).unwrap());
    }

    #[test]
    fn counts_and_groups() {
        let mut mw = MultiWorld::new();
        let p = mw.add_player("Alice", "Test");
        mw.create_region(p, "Menu").unwrap();
        mw.add_item_group(p, "Eggs", &["Blue Egg", "Red Egg"]);
        let blue = mw.create_item(p, "Blue Egg", ItemClassification::Progression, Some(1));
        let red = mw.create_item(p, "Red Egg", ItemClassification::Progression, Some(2));
        let mut state = CollectionState::new(&mw);
        state.collect(blue);
        state.collect(blue);
        state.collect(red);
        assert_eq!(state.count("Blue Egg", p), 2);
        assert!(state.has("Blue Egg", p, 2));
        assert!(!state.has("Blue Egg", p, 3));
        assert!(state.has_any(&["Green Egg", "Red Egg"], p));
        assert!(!state.has_all(&["Green Egg", "Red Egg"], p));
        assert_eq!(state.count_group("Eggs", p).unwrap(), 3);
        assert!(state.count_group("Stones", p).is_err());

        let rule = mw.group_count_at_least("Eggs", p, 3).unwrap();
        assert!(state.check(&rule).unwrap());
        let rule = mw.group_count_at_least("Eggs", p, 4).unwrap();
        assert!(!state.check(&rule).unwrap());
    }

    #[test]
    fn region_rule_resolves_within_one_pass() {
        // Start -> Gate needs to reach Far; Far is reached through a longer route.
        let mut mw = MultiWorld::new();
        let p = mw.add_player("Alice", "Test");
        let start = mw.create_region(p, "Start").unwrap();
        let gate = mw.create_region(p, "Gate").unwrap();
        let mid = mw.create_region(p, "Mid").unwrap();
        let far = mw.create_region(p, "Far").unwrap();
        // Created first so it is tried before Far is known to be reachable.
        mw.connect(start, gate, None, Requirement::CanReachRegion(far))
            .unwrap();
        mw.connect(start, mid, None, Requirement::Free).unwrap();
        mw.connect(mid, far, None, Requirement::Free).unwrap();

        let mut state = CollectionState::new(&mw);
        assert!(state.can_reach_region(gate).unwrap());
    }

    #[test]
    fn indirect_condition_requeues_entrance() {
        let mut mw = MultiWorld::new();
        let p = mw.add_player("Alice", "Test");
        let start = mw.create_region(p, "Start").unwrap();
        let gate = mw.create_region(p, "Gate").unwrap();
        let far = mw.create_region(p, "Far").unwrap();
        let e = mw
            .connect(start, gate, None, Requirement::CanReachRegion(far))
            .unwrap();
        let key = mw.has("Key", p);
        mw.connect(start, far, None, key).unwrap();
        mw.register_indirect_condition(far, e);
        let key_item = mw.create_item(p, "Key", ItemClassification::Progression, Some(1));

        let mut state = CollectionState::new(&mw);
        assert!(!state.can_reach_region(gate).unwrap());
        state.collect(key_item);
        assert!(state.can_reach_region(gate).unwrap());
    }

    #[test]
    fn precollected_items_are_in_new_state_only() {
        let (mut mw, regions) = vault_world();
        let key = mw.create_item(0, "Key", ItemClassification::Progression, Some(1));
        mw.push_precollected(key);
        assert!(CollectionState::new(&mw)
            .can_reach_region(regions[1])
            .unwrap());
        assert!(!CollectionState::empty(&mw)
            .can_reach_region(regions[1])
            .unwrap());
    }

    #[test]
    fn custom_rule_error_propagates() {
        let (mut mw, _) = vault_world();
        let vault_chest = mw.get_location("Chest@Vault", 0).unwrap();
        mw.set_rule(
            RuleTarget::Location(vault_chest),
            Requirement::Custom(CustomRule::new("explodes", |_| anyhow::bail!("boom"))),
        );
        let key = mw.create_item(0, "Key", ItemClassification::Progression, Some(1));
        let mut state = CollectionState::new(&mw).with_item(key);
        let err = state.can_reach_location(vault_chest).unwrap_err();
        assert!(format!("{err:#}").contains("explodes"));
    }

    #[test]
    fn custom_rule_sees_inventory() {
        let (mut mw, regions) = vault_world();
        let e = mw.get_entrance("Start -> Vault", 0).unwrap();
        mw.set_rule(
            RuleTarget::Entrance(e),
            Requirement::Custom(CustomRule::new("two keys", |cx| Ok(cx.has("Key", 0, 2)))),
        );
        let key = mw.create_item(0, "Key", ItemClassification::Progression, Some(1));
        let mut state = CollectionState::new(&mw).with_item(key);
        assert!(!state.can_reach_region(regions[1]).unwrap());
        state.collect(key);
        assert!(state.can_reach_region(regions[1]).unwrap());
    }

    #[test]
    fn missing_start_region_is_reported() {
        let mut mw = MultiWorld::new();
        mw.add_player("Alice", "Test");
        let mut state = CollectionState::new(&mw);
        let err = state.reachable_regions(0).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GenerationError>(),
            Some(GenerationError::MissingStartRegion { player: 0 })
        ));
    }
}
