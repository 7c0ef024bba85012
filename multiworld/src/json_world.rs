use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use log::info;
use multiworld_game::{
    ItemClassification, ItemCode, ItemIdx, ItemRule, LocationAddress, LocationProgressType,
    MultiWorld, Placement, PlayerId, Requirement, RuleTarget,
};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::adapter::World;
use crate::pool::{assemble_pool, PoolEntry};

/// Rule expressions as written in world files, e.g.
/// `{"and": [{"has": "Key"}, {"count": ["Egg", 3]}]}`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuleDefinition {
    #[default]
    Free,
    Never,
    Has(String),
    Count(String, usize),
    Any(Vec<String>),
    All(Vec<String>),
    Group(String, usize),
    Region(String),
    Location(String),
    And(Vec<RuleDefinition>),
    Or(Vec<RuleDefinition>),
    Not(Box<RuleDefinition>),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ItemRuleDefinition {
    OwnItemsOnly,
    NoProgression,
    Only(Vec<String>),
    Never(Vec<String>),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LocationDefinition {
    pub name: String,
    pub address: LocationAddress,
    #[serde(default)]
    pub rule: RuleDefinition,
    #[serde(default)]
    pub progress_type: LocationProgressType,
    #[serde(default)]
    pub item_rules: Vec<ItemRuleDefinition>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ExitDefinition {
    pub to: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub rule: RuleDefinition,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EventDefinition {
    pub name: String,
    pub item: String,
    #[serde(default)]
    pub rule: RuleDefinition,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RegionDefinition {
    pub name: String,
    #[serde(default)]
    pub locations: Vec<LocationDefinition>,
    #[serde(default)]
    pub exits: Vec<ExitDefinition>,
    #[serde(default)]
    pub events: Vec<EventDefinition>,
}

fn one() -> usize {
    1
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ItemDefinition {
    pub name: String,
    pub code: ItemCode,
    pub classification: ItemClassification,
    #[serde(default = "one")]
    pub count: usize,
    #[serde(default)]
    pub repeatable: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WorldDefinition {
    pub game: String,
    // Defaults to the first region.
    #[serde(default)]
    pub start_region: Option<String>,
    pub regions: Vec<RegionDefinition>,
    pub items: Vec<ItemDefinition>,
    // Names from `items` used to pad the pool.
    #[serde(default)]
    pub filler: Vec<String>,
    #[serde(default)]
    pub item_groups: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub early_items: BTreeMap<String, usize>,
    #[serde(default)]
    pub local_early_items: BTreeMap<String, usize>,
    pub victory: RuleDefinition,
}

/// A world whose graph, pool and rules come from a JSON definition.
pub struct JsonWorld {
    pub def: WorldDefinition,
}

impl JsonWorld {
    pub fn new(def: WorldDefinition) -> Self {
        JsonWorld { def }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let mut des = serde_json::Deserializer::from_str(json);
        let def: WorldDefinition = serde_path_to_error::deserialize(&mut des)?;
        Ok(JsonWorld::new(def))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Unable to read {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("Unable to parse {}", path.display()))
    }

    fn item_definition(&self, name: &str) -> Result<&ItemDefinition> {
        match self.def.items.iter().find(|i| i.name == name) {
            Some(i) => Ok(i),
            None => bail!("{}: unknown item '{}'", self.def.game, name),
        }
    }
}

fn pool_entry(item: &ItemDefinition) -> PoolEntry {
    PoolEntry {
        name: item.name.clone(),
        classification: item.classification,
        code: Some(item.code),
        repeatable: item.repeatable,
    }
}

// Converts a rule for `player`, recording the regions it looks at.
fn build_rule(
    world: &mut MultiWorld,
    player: PlayerId,
    rule: &RuleDefinition,
    regions: &mut Vec<usize>,
) -> Result<Requirement> {
    Ok(match rule {
        RuleDefinition::Free => Requirement::Free,
        RuleDefinition::Never => Requirement::Never,
        RuleDefinition::Has(name) => world.has(name, player),
        RuleDefinition::Count(name, count) => world.count_at_least(name, player, *count),
        RuleDefinition::Any(names) => {
            let names: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
            world.has_any(&names, player)
        }
        RuleDefinition::All(names) => {
            let names: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
            world.has_all(&names, player)
        }
        RuleDefinition::Group(group, count) => world.group_count_at_least(group, player, *count)?,
        RuleDefinition::Region(name) => {
            let region = world.get_region(name, player)?;
            regions.push(region);
            Requirement::CanReachRegion(region)
        }
        RuleDefinition::Location(name) => {
            let location = world.get_location(name, player)?;
            regions.push(world.locations[location].parent_region);
            Requirement::CanReachLocation(location)
        }
        RuleDefinition::And(rules) => Requirement::make_and(
            rules
                .iter()
                .map(|r| build_rule(world, player, r, regions))
                .collect::<Result<Vec<_>>>()?,
        ),
        RuleDefinition::Or(rules) => Requirement::make_or(
            rules
                .iter()
                .map(|r| build_rule(world, player, r, regions))
                .collect::<Result<Vec<_>>>()?,
        ),
        RuleDefinition::Not(r) => Requirement::make_not(build_rule(world, player, r, regions)?),
    })
}

fn build_item_rule(world: &mut MultiWorld, player: PlayerId, rule: &ItemRuleDefinition) -> ItemRule {
    match rule {
        ItemRuleDefinition::OwnItemsOnly => ItemRule::OwnedBy(player),
        ItemRuleDefinition::NoProgression => ItemRule::NotProgression,
        ItemRuleDefinition::Only(names) => {
            ItemRule::Named(names.iter().map(|n| world.item_name_id(n)).collect())
        }
        ItemRuleDefinition::Never(names) => ItemRule::Not(Box::new(ItemRule::Named(
            names.iter().map(|n| world.item_name_id(n)).collect(),
        ))),
    }
}

impl World for JsonWorld {
    fn game(&self) -> &str {
        &self.def.game
    }

    fn generate_early(
        &mut self,
        world: &mut MultiWorld,
        player: PlayerId,
        _rng: &mut StdRng,
    ) -> Result<()> {
        for (name, &count) in &self.def.early_items {
            world.early_items[player].insert(name.clone(), count);
        }
        for (name, &count) in &self.def.local_early_items {
            world.local_early_items[player].insert(name.clone(), count);
        }
        for (group, names) in &self.def.item_groups {
            let names: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
            world.add_item_group(player, group, &names);
        }
        Ok(())
    }

    fn create_regions(
        &mut self,
        world: &mut MultiWorld,
        player: PlayerId,
        _rng: &mut StdRng,
    ) -> Result<()> {
        for r in &self.def.regions {
            world.create_region(player, &r.name)?;
        }
        if let Some(start) = &self.def.start_region {
            let region = world.get_region(start, player)?;
            world.set_start_region(region);
        }
        for r in &self.def.regions {
            let region = world.get_region(&r.name, player)?;
            for l in &r.locations {
                let loc = world.create_location(region, &l.name, Some(l.address))?;
                world.set_progress_type(loc, l.progress_type);
            }
            for e in &r.events {
                world.create_event(region, &e.name, &e.item)?;
            }
            for x in &r.exits {
                let target = world.get_region(&x.to, player)?;
                world.connect(region, target, x.name.as_deref(), Requirement::Free)?;
            }
        }
        Ok(())
    }

    fn create_items(
        &mut self,
        world: &mut MultiWorld,
        player: PlayerId,
        rng: &mut StdRng,
    ) -> Result<()> {
        let mut entries = vec![];
        for item in &self.def.items {
            for _ in 0..item.count {
                entries.push(pool_entry(item));
            }
        }
        let filler = self
            .def
            .filler
            .iter()
            .map(|name| self.item_definition(name).map(pool_entry))
            .collect::<Result<Vec<_>>>()?;
        let items = assemble_pool(world, player, entries, &filler, rng)?;
        info!(
            "{}: {} pool items for {}",
            self.def.game,
            items.len(),
            world.player_name(player)
        );
        Ok(())
    }

    fn create_item(&self, world: &mut MultiWorld, player: PlayerId, name: &str) -> Result<ItemIdx> {
        let def = self.item_definition(name)?;
        Ok(world.create_item(player, &def.name, def.classification, Some(def.code)))
    }

    fn set_rules(&mut self, world: &mut MultiWorld, player: PlayerId) -> Result<()> {
        for r in &self.def.regions {
            let region = world.get_region(&r.name, player)?;
            for l in &r.locations {
                let loc = world.get_location(&l.name, player)?;
                let mut seen = vec![];
                let rule = build_rule(world, player, &l.rule, &mut seen)?;
                world.set_rule(RuleTarget::Location(loc), rule);
                for ir in &l.item_rules {
                    let item_rule = build_item_rule(world, player, ir);
                    world.add_item_rule(loc, item_rule);
                }
            }
            for e in &r.events {
                let loc = world.get_location(&e.name, player)?;
                let mut seen = vec![];
                let rule = build_rule(world, player, &e.rule, &mut seen)?;
                world.set_rule(RuleTarget::Location(loc), rule);
            }
            for x in &r.exits {
                let name = match &x.name {
                    Some(n) => n.clone(),
                    None => format!("{} -> {}", r.name, x.to),
                };
                let entrance = world.get_entrance(&name, player)?;
                let mut seen = vec![];
                let rule = build_rule(world, player, &x.rule, &mut seen)?;
                world.set_rule(RuleTarget::Entrance(entrance), rule);
                for watched in seen {
                    if watched != region {
                        world.register_indirect_condition(watched, entrance);
                    }
                }
            }
        }
        let mut seen = vec![];
        let victory = build_rule(world, player, &self.def.victory, &mut seen)?;
        world.set_completion_condition(player, victory);
        Ok(())
    }

    fn fill_slot_data(
        &self,
        world: &MultiWorld,
        player: PlayerId,
        placement: &Placement,
    ) -> Result<serde_json::Value> {
        let own_items = world
            .player_locations(player)
            .filter_map(|l| placement.item_at(l))
            .filter(|&i| world.items[i].player == player && !world.items[i].is_event())
            .count();
        Ok(serde_json::json!({
            "game": self.def.game,
            "locations": world.get_unfilled_locations(Some(player)).len(),
            "own_items_at_home": own_items,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multiworld_game::GenerationError;
    use rand::SeedableRng;

    const WORLD: &str = r#"{
        "game": "Test",
        "regions": [
            {"name": "Start", "locations": [{"name": "Chest@Start", "address": 100}],
             "exits": [{"to": "Vault", "rule": {"has": "Key"}}]},
            {"name": "Vault", "locations": [{"name": "Chest@Vault", "address": 101}],
             "events": [{"name": "Boss", "item": "Victory", "rule": {"region": "Vault"}}]}
        ],
        "items": [
            {"name": "Key", "code": 1, "classification": "Progression"},
            {"name": "Coin", "code": 2, "classification": "Filler", "count": 0}
        ],
        "filler": ["Coin"],
        "victory": {"has": "Victory"}
    }"#;

    #[test]
    fn builds_graph_pool_and_rules() {
        let mut json_world = JsonWorld::from_json(WORLD).unwrap();
        let mut mw = MultiWorld::new();
        let p = mw.add_player("Alice", "Test");
        let mut rng = StdRng::seed_from_u64(0);
        json_world.generate_early(&mut mw, p, &mut rng).unwrap();
        json_world.create_regions(&mut mw, p, &mut rng).unwrap();
        json_world.create_items(&mut mw, p, &mut rng).unwrap();
        json_world.set_rules(&mut mw, p).unwrap();

        assert_eq!(mw.regions.len(), 2);
        assert_eq!(mw.get_unfilled_locations(Some(p)).len(), 2);
        let names: Vec<&str> = mw.itempool.iter().map(|&i| mw.items[i].name.as_str()).collect();
        assert_eq!(names, vec!["Key", "Coin"]);
        let vault = mw.get_entrance("Start -> Vault", p).unwrap();
        assert!(!mw.entrances[vault].access_rule.is_free());
        assert!(matches!(mw.completion_conditions[p], Requirement::Has { .. }));
    }

    #[test]
    fn unknown_region_in_rule_is_a_configuration_error() {
        let json = WORLD.replace(r#"{"region": "Vault"}"#, r#"{"region": "Attic"}"#);
        let mut json_world = JsonWorld::from_json(&json).unwrap();
        let mut mw = MultiWorld::new();
        let p = mw.add_player("Alice", "Test");
        let mut rng = StdRng::seed_from_u64(0);
        json_world.create_regions(&mut mw, p, &mut rng).unwrap();
        let err = json_world.set_rules(&mut mw, p).unwrap_err();
        assert_eq!(
            err.downcast_ref::<GenerationError>(),
            Some(&GenerationError::UnknownRegion {
                player: 0,
                name: "Attic".to_string()
            })
        );
    }

    #[test]
    fn rule_definitions_parse() {
        let rule: RuleDefinition =
            serde_json::from_str(r#"{"or": [{"count": ["Egg", 3]}, {"not": "never"}]}"#).unwrap();
        assert_eq!(
            rule,
            RuleDefinition::Or(vec![
                RuleDefinition::Count("Egg".to_string(), 3),
                RuleDefinition::Not(Box::new(RuleDefinition::Never)),
            ])
        );
    }
}
