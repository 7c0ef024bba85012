// The changes suggested by this lint usually make the code more cluttered and less clear:
#![allow(clippy::needless_range_loop)]

pub mod error;
pub mod placement;
pub mod requirement;
pub mod world;

pub use error::GenerationError;
pub use placement::Placement;
pub use requirement::{CustomItemRule, CustomRule, ItemRule, Requirement, RuleContext};
pub use world::{MultiWorld, PlayerInfo, RuleTarget};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::hash::Hash;
use strum_macros::{EnumString, VariantNames};

pub type PlayerId = usize;
pub type RegionIdx = usize; // Index into MultiWorld.regions
pub type EntranceIdx = usize; // Index into MultiWorld.entrances
pub type LocationIdx = usize; // Index into MultiWorld.locations
pub type ItemIdx = usize; // Index into MultiWorld.items
pub type ItemNameId = usize; // Index into MultiWorld.item_names
pub type LocationAddress = i64;
pub type ItemCode = i64;

#[derive(Default, Clone, Debug)]
pub struct IndexedVec<T: Hash + Eq> {
    pub keys: Vec<T>,
    pub index_by_key: HashMap<T, usize>,
}

impl<T: Hash + Eq> IndexedVec<T> {
    pub fn add<U: ToOwned<Owned = T> + ?Sized>(&mut self, name: &U) -> usize {
        if !self.index_by_key.contains_key(&name.to_owned()) {
            let idx = self.keys.len();
            self.index_by_key.insert(name.to_owned(), self.keys.len());
            self.keys.push(name.to_owned());
            idx
        } else {
            self.index_by_key[&name.to_owned()]
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    VariantNames,
    Serialize,
    Deserialize,
    PartialOrd,
    Ord,
)]
pub enum ItemClassification {
    Progression,
    Useful,
    Filler,
    Trap,
}

#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, EnumString, VariantNames, Serialize, Deserialize,
)]
pub enum LocationProgressType {
    #[default]
    Default,
    Excluded,
    Priority,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub name_id: ItemNameId,
    pub player: PlayerId,
    pub classification: ItemClassification,
    // None for event items, which never come from the real pool.
    pub code: Option<ItemCode>,
}

impl Item {
    pub fn is_progression(&self) -> bool {
        self.classification == ItemClassification::Progression
    }

    pub fn is_event(&self) -> bool {
        self.code.is_none()
    }
}

#[derive(Clone, Debug)]
pub struct Region {
    pub name: String,
    pub player: PlayerId,
    pub locations: Vec<LocationIdx>,
    pub exits: Vec<EntranceIdx>,
    pub entrances: Vec<EntranceIdx>,
}

#[derive(Clone, Debug)]
pub struct Entrance {
    pub name: String,
    pub player: PlayerId,
    pub parent_region: RegionIdx,
    pub connected_region: Option<RegionIdx>,
    pub access_rule: Requirement,
}

#[derive(Clone, Debug)]
pub struct Location {
    pub name: String,
    pub player: PlayerId,
    pub parent_region: RegionIdx,
    // None for event locations (internal bookkeeping, never filled from the pool).
    pub address: Option<LocationAddress>,
    // Item placed during graph construction (events and adapter-locked items).
    pub item: Option<ItemIdx>,
    pub locked: bool,
    pub progress_type: LocationProgressType,
    pub access_rule: Requirement,
    pub item_rule: ItemRule,
}

impl Location {
    pub fn is_event(&self) -> bool {
        self.address.is_none()
    }
}

/// Per-player multiset of collected item names.
///
/// Counts are stored densely by interned name; a name that was never
/// collected simply has no slot yet.
#[derive(Clone, Debug, Default)]
pub struct Inventory {
    counts: Vec<Vec<usize>>,
}

impl Inventory {
    pub fn new(num_players: usize) -> Self {
        Inventory {
            counts: vec![vec![]; num_players],
        }
    }

    pub fn count(&self, name: ItemNameId, player: PlayerId) -> usize {
        match self.counts.get(player) {
            Some(c) => c.get(name).copied().unwrap_or(0),
            None => 0,
        }
    }

    pub fn add(&mut self, name: ItemNameId, player: PlayerId) {
        if player >= self.counts.len() {
            self.counts.resize(player + 1, vec![]);
        }
        let c = &mut self.counts[player];
        if name >= c.len() {
            c.resize(name + 1, 0);
        }
        c[name] += 1;
    }

    // Returns false if there was nothing to remove.
    pub fn remove(&mut self, name: ItemNameId, player: PlayerId) -> bool {
        match self.counts.get_mut(player).and_then(|c| c.get_mut(name)) {
            Some(cnt) if *cnt > 0 => {
                *cnt -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn total(&self, player: PlayerId) -> usize {
        self.counts.get(player).map_or(0, |c| c.iter().sum())
    }

    pub fn is_subset_of(&self, other: &Inventory) -> bool {
        for (player, c) in self.counts.iter().enumerate() {
            for (name, &cnt) in c.iter().enumerate() {
                if cnt > other.count(name, player) {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inventory_counts_per_player() {
        let mut inv = Inventory::new(2);
        inv.add(3, 0);
        inv.add(3, 0);
        inv.add(3, 1);
        assert_eq!(inv.count(3, 0), 2);
        assert_eq!(inv.count(3, 1), 1);
        assert_eq!(inv.count(7, 1), 0);
        assert_eq!(inv.count(0, 5), 0);
        assert_eq!(inv.total(0), 2);

        assert!(inv.remove(3, 0));
        assert_eq!(inv.count(3, 0), 1);
        assert!(!inv.remove(4, 0));
    }

    #[test]
    fn inventory_subset() {
        let mut a = Inventory::new(1);
        let mut b = Inventory::new(1);
        assert!(a.is_subset_of(&b));
        a.add(0, 0);
        assert!(!a.is_subset_of(&b));
        b.add(0, 0);
        b.add(2, 0);
        assert!(a.is_subset_of(&b));
        assert!(!b.is_subset_of(&a));
    }

    #[test]
    fn indexed_vec_add_is_idempotent() {
        let mut v: IndexedVec<String> = IndexedVec::default();
        let a = v.add("Key");
        let b = v.add("Coin");
        assert_eq!(v.add("Key"), a);
        assert_ne!(a, b);
        assert_eq!(v.len(), 2);
    }
}
