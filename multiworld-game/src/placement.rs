use anyhow::{bail, Result};

use crate::{ItemIdx, LocationIdx, MultiWorld, PlayerId};

/// Location -> item slot table written by the fill.
///
/// The graph itself is frozen once adapters are done; everything that
/// changes during generation lives here, owned by a single session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Placement {
    pub items: Vec<Option<ItemIdx>>, // Corresponds to MultiWorld.locations
    pub locked: Vec<bool>,
}

impl Placement {
    pub fn new(world: &MultiWorld) -> Self {
        Placement {
            items: world.locations.iter().map(|l| l.item).collect(),
            locked: world.locations.iter().map(|l| l.locked).collect(),
        }
    }

    pub fn item_at(&self, location: LocationIdx) -> Option<ItemIdx> {
        self.items[location]
    }

    pub fn is_filled(&self, location: LocationIdx) -> bool {
        self.items[location].is_some()
    }

    pub fn place(&mut self, location: LocationIdx, item: ItemIdx) -> Result<()> {
        if let Some(existing) = self.items[location] {
            bail!("location {location} already holds item {existing}");
        }
        self.items[location] = Some(item);
        Ok(())
    }

    pub fn lock(&mut self, location: LocationIdx) {
        self.locked[location] = true;
    }

    /// Removes and returns the item at `location`, unless it is locked.
    pub fn take(&mut self, location: LocationIdx) -> Option<ItemIdx> {
        if self.locked[location] {
            return None;
        }
        self.items[location].take()
    }

    /// Addressed locations that are still empty, in arena order.
    pub fn unfilled_locations(&self, world: &MultiWorld) -> Vec<LocationIdx> {
        (0..self.items.len())
            .filter(|&i| self.items[i].is_none() && world.locations[i].address.is_some())
            .collect()
    }

    pub fn filled_locations(&self) -> Vec<LocationIdx> {
        (0..self.items.len())
            .filter(|&i| self.items[i].is_some())
            .collect()
    }

    pub fn find_item(&self, world: &MultiWorld, name: &str, player: PlayerId) -> Option<LocationIdx> {
        (0..self.items.len()).find(|&i| match self.items[i] {
            Some(item) => world.items[item].name == name && world.items[item].player == player,
            None => false,
        })
    }
}
