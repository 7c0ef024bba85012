use std::collections::BTreeMap;

use anyhow::{bail, Result};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::requirement::unknown_group;
use crate::{
    Entrance, EntranceIdx, GenerationError, IndexedVec, Item, ItemClassification, ItemCode,
    ItemIdx, ItemNameId, ItemRule, Location, LocationAddress, LocationIdx, LocationProgressType,
    PlayerId, Region, RegionIdx, Requirement,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub name: String,
    pub game: String,
}

/// Something a rule can be attached to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RuleTarget {
    Entrance(EntranceIdx),
    Location(LocationIdx),
}

/// The union of every player's graph, the item arena and the pool.
///
/// Regions, entrances, locations and items live in flat vectors; every
/// back-reference is an index into one of them.
#[derive(Clone, Debug, Default)]
pub struct MultiWorld {
    pub players: Vec<PlayerInfo>,
    pub regions: Vec<Region>,
    pub entrances: Vec<Entrance>,
    pub locations: Vec<Location>,
    pub items: Vec<Item>,
    pub item_names: IndexedVec<String>,
    pub itempool: Vec<ItemIdx>,
    pub precollected_items: Vec<Vec<ItemIdx>>,
    pub start_regions: Vec<Option<RegionIdx>>,
    pub completion_conditions: Vec<Requirement>,
    // BTreeMap so that early items are handled in a stable order.
    pub early_items: Vec<BTreeMap<String, usize>>,
    pub local_early_items: Vec<BTreeMap<String, usize>>,
    pub item_groups: Vec<HashMap<String, Vec<ItemNameId>>>,
    // Region -> entrances whose rules look at that region's reachability.
    pub indirect_conditions: HashMap<RegionIdx, Vec<EntranceIdx>>,
    region_idx_by_name: HashMap<(PlayerId, String), RegionIdx>,
    entrance_idx_by_name: HashMap<(PlayerId, String), EntranceIdx>,
    location_idx_by_name: HashMap<(PlayerId, String), LocationIdx>,
    location_idx_by_address: HashMap<(PlayerId, LocationAddress), LocationIdx>,
}

impl MultiWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_player(&mut self, name: &str, game: &str) -> PlayerId {
        let player = self.players.len();
        self.players.push(PlayerInfo {
            name: name.to_string(),
            game: game.to_string(),
        });
        self.precollected_items.push(vec![]);
        self.start_regions.push(None);
        self.completion_conditions.push(Requirement::Never);
        self.early_items.push(BTreeMap::new());
        self.local_early_items.push(BTreeMap::new());
        self.item_groups.push(HashMap::new());
        player
    }

    pub fn num_players(&self) -> usize {
        self.players.len()
    }

    pub fn player_name(&self, player: PlayerId) -> &str {
        self.players
            .get(player)
            .map(|p| p.name.as_str())
            .unwrap_or("<unknown>")
    }

    fn check_player(&self, player: PlayerId) -> Result<()> {
        if player >= self.players.len() {
            bail!("player {player} has not been added");
        }
        Ok(())
    }

    // Graph construction:

    /// Creates a region. A player's first region is its start region unless
    /// `set_start_region` says otherwise.
    pub fn create_region(&mut self, player: PlayerId, name: &str) -> Result<RegionIdx> {
        self.check_player(player)?;
        let key = (player, name.to_string());
        if self.region_idx_by_name.contains_key(&key) {
            bail!(GenerationError::DuplicateName {
                player,
                kind: "region",
                name: name.to_string(),
            });
        }
        let idx = self.regions.len();
        self.regions.push(Region {
            name: name.to_string(),
            player,
            locations: vec![],
            exits: vec![],
            entrances: vec![],
        });
        self.region_idx_by_name.insert(key, idx);
        if self.start_regions[player].is_none() {
            self.start_regions[player] = Some(idx);
        }
        Ok(idx)
    }

    pub fn set_start_region(&mut self, region: RegionIdx) {
        let player = self.regions[region].player;
        self.start_regions[player] = Some(region);
    }

    pub fn create_location(
        &mut self,
        region: RegionIdx,
        name: &str,
        address: Option<LocationAddress>,
    ) -> Result<LocationIdx> {
        let player = self.regions[region].player;
        let key = (player, name.to_string());
        if self.location_idx_by_name.contains_key(&key) {
            bail!(GenerationError::DuplicateName {
                player,
                kind: "location",
                name: name.to_string(),
            });
        }
        if let Some(address) = address {
            if let Some(&other) = self.location_idx_by_address.get(&(player, address)) {
                bail!(GenerationError::DuplicateName {
                    player,
                    kind: "address",
                    name: format!("{address} ({} and {name})", self.locations[other].name),
                });
            }
        }
        let idx = self.locations.len();
        self.locations.push(Location {
            name: name.to_string(),
            player,
            parent_region: region,
            address,
            item: None,
            locked: false,
            progress_type: LocationProgressType::Default,
            access_rule: Requirement::Free,
            item_rule: ItemRule::Any,
        });
        self.regions[region].locations.push(idx);
        self.location_idx_by_name.insert(key, idx);
        if let Some(address) = address {
            self.location_idx_by_address.insert((player, address), idx);
        }
        Ok(idx)
    }

    /// Creates an unconnected exit of `region`.
    pub fn create_entrance(&mut self, region: RegionIdx, name: &str) -> Result<EntranceIdx> {
        let player = self.regions[region].player;
        let key = (player, name.to_string());
        if self.entrance_idx_by_name.contains_key(&key) {
            bail!(GenerationError::DuplicateName {
                player,
                kind: "entrance",
                name: name.to_string(),
            });
        }
        let idx = self.entrances.len();
        self.entrances.push(Entrance {
            name: name.to_string(),
            player,
            parent_region: region,
            connected_region: None,
            access_rule: Requirement::Free,
        });
        self.regions[region].exits.push(idx);
        self.entrance_idx_by_name.insert(key, idx);
        Ok(idx)
    }

    pub fn connect_entrance(&mut self, entrance: EntranceIdx, target: RegionIdx) {
        if let Some(old) = self.entrances[entrance].connected_region {
            self.regions[old].entrances.retain(|&e| e != entrance);
        }
        self.entrances[entrance].connected_region = Some(target);
        self.regions[target].entrances.push(entrance);
    }

    /// Connects `source` to `target` with a new entrance, named
    /// "<source> -> <target>" unless a name is given.
    pub fn connect(
        &mut self,
        source: RegionIdx,
        target: RegionIdx,
        name: Option<&str>,
        rule: Requirement,
    ) -> Result<EntranceIdx> {
        let name = match name {
            Some(n) => n.to_string(),
            None => format!(
                "{} -> {}",
                self.regions[source].name, self.regions[target].name
            ),
        };
        let entrance = self.create_entrance(source, &name)?;
        self.entrances[entrance].access_rule = rule;
        self.connect_entrance(entrance, target);
        Ok(entrance)
    }

    pub fn set_progress_type(&mut self, location: LocationIdx, progress_type: LocationProgressType) {
        self.locations[location].progress_type = progress_type;
    }

    // Items:

    pub fn item_name_id(&mut self, name: &str) -> ItemNameId {
        self.item_names.add(name)
    }

    pub fn create_item(
        &mut self,
        player: PlayerId,
        name: &str,
        classification: ItemClassification,
        code: Option<ItemCode>,
    ) -> ItemIdx {
        let name_id = self.item_name_id(name);
        let idx = self.items.len();
        self.items.push(Item {
            name: name.to_string(),
            name_id,
            player,
            classification,
            code,
        });
        idx
    }

    /// Creates an event: an address-less location in `region` holding a
    /// locked, code-less progression item.
    pub fn create_event(
        &mut self,
        region: RegionIdx,
        location_name: &str,
        item_name: &str,
    ) -> Result<(LocationIdx, ItemIdx)> {
        let player = self.regions[region].player;
        let location = self.create_location(region, location_name, None)?;
        let item = self.create_item(player, item_name, ItemClassification::Progression, None);
        self.place_locked_item(location, item)?;
        Ok((location, item))
    }

    pub fn place_locked_item(&mut self, location: LocationIdx, item: ItemIdx) -> Result<()> {
        let loc = &mut self.locations[location];
        if let Some(existing) = loc.item {
            bail!(
                "player {}: location '{}' already holds {}",
                loc.player,
                loc.name,
                self.items[existing].name
            );
        }
        loc.item = Some(item);
        loc.locked = true;
        Ok(())
    }

    pub fn push_precollected(&mut self, item: ItemIdx) {
        let player = self.items[item].player;
        self.precollected_items[player].push(item);
    }

    pub fn add_item_group(&mut self, player: PlayerId, group: &str, names: &[&str]) {
        let ids: Vec<ItemNameId> = names.iter().map(|n| self.item_name_id(n)).collect();
        self.item_groups[player]
            .entry(group.to_string())
            .or_default()
            .extend(ids);
    }

    pub fn get_item_group(&self, group: &str, player: PlayerId) -> Result<&[ItemNameId]> {
        match self.item_groups.get(player).and_then(|g| g.get(group)) {
            Some(v) => Ok(v.as_slice()),
            None => bail!(unknown_group(group, player)),
        }
    }

    // Rule constructors:

    pub fn has(&mut self, name: &str, player: PlayerId) -> Requirement {
        Requirement::Has {
            item: self.item_name_id(name),
            player,
        }
    }

    pub fn count_at_least(&mut self, name: &str, player: PlayerId, count: usize) -> Requirement {
        if count == 0 {
            return Requirement::Free;
        }
        Requirement::CountAtLeast {
            item: self.item_name_id(name),
            player,
            count,
        }
    }

    pub fn has_any(&mut self, names: &[&str], player: PlayerId) -> Requirement {
        Requirement::HasAny {
            items: names.iter().map(|n| self.item_name_id(n)).collect(),
            player,
        }
    }

    pub fn has_all(&mut self, names: &[&str], player: PlayerId) -> Requirement {
        Requirement::HasAll {
            items: names.iter().map(|n| self.item_name_id(n)).collect(),
            player,
        }
    }

    pub fn group_count_at_least(
        &self,
        group: &str,
        player: PlayerId,
        count: usize,
    ) -> Result<Requirement> {
        self.get_item_group(group, player)?;
        Ok(Requirement::GroupCountAtLeast {
            group: group.to_string(),
            player,
            count,
        })
    }

    // Rule attachment:

    pub fn set_rule(&mut self, target: RuleTarget, rule: Requirement) {
        match target {
            RuleTarget::Entrance(e) => self.entrances[e].access_rule = rule,
            RuleTarget::Location(l) => self.locations[l].access_rule = rule,
        }
    }

    pub fn add_rule(&mut self, target: RuleTarget, rule: Requirement) {
        let slot = match target {
            RuleTarget::Entrance(e) => &mut self.entrances[e].access_rule,
            RuleTarget::Location(l) => &mut self.locations[l].access_rule,
        };
        let old = std::mem::replace(slot, Requirement::Free);
        *slot = old.and(rule);
    }

    pub fn add_item_rule(&mut self, location: LocationIdx, rule: ItemRule) {
        let slot = &mut self.locations[location].item_rule;
        let old = std::mem::replace(slot, ItemRule::Any);
        *slot = old.and(rule);
    }

    pub fn register_indirect_condition(&mut self, region: RegionIdx, entrance: EntranceIdx) {
        let v = self.indirect_conditions.entry(region).or_default();
        if !v.contains(&entrance) {
            v.push(entrance);
        }
    }

    pub fn set_completion_condition(&mut self, player: PlayerId, rule: Requirement) {
        self.completion_conditions[player] = rule;
    }

    // Lookups:

    pub fn get_region(&self, name: &str, player: PlayerId) -> Result<RegionIdx> {
        match self.region_idx_by_name.get(&(player, name.to_string())) {
            Some(&idx) => Ok(idx),
            None => bail!(GenerationError::UnknownRegion {
                player,
                name: name.to_string(),
            }),
        }
    }

    pub fn get_location(&self, name: &str, player: PlayerId) -> Result<LocationIdx> {
        match self.location_idx_by_name.get(&(player, name.to_string())) {
            Some(&idx) => Ok(idx),
            None => bail!(GenerationError::UnknownLocation {
                player,
                name: name.to_string(),
            }),
        }
    }

    pub fn get_entrance(&self, name: &str, player: PlayerId) -> Result<EntranceIdx> {
        match self.entrance_idx_by_name.get(&(player, name.to_string())) {
            Some(&idx) => Ok(idx),
            None => bail!(GenerationError::UnknownEntrance {
                player,
                name: name.to_string(),
            }),
        }
    }

    pub fn player_locations(&self, player: PlayerId) -> impl Iterator<Item = LocationIdx> + '_ {
        self.locations
            .iter()
            .enumerate()
            .filter(move |(_, l)| l.player == player)
            .map(|(i, _)| i)
    }

    /// Locations with an address that nothing was placed into during
    /// graph construction.
    pub fn get_unfilled_locations(&self, player: Option<PlayerId>) -> Vec<LocationIdx> {
        self.locations
            .iter()
            .enumerate()
            .filter(|(_, l)| l.address.is_some() && l.item.is_none())
            .filter(|(_, l)| player.map_or(true, |p| l.player == p))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn location_description(&self, location: LocationIdx) -> String {
        let loc = &self.locations[location];
        format!("{} ({})", loc.name, self.player_name(loc.player))
    }

    pub fn item_description(&self, item: ItemIdx) -> String {
        let it = &self.items[item];
        format!("{} ({})", it.name, self.player_name(it.player))
    }
}
