use anyhow::Result;
use multiworld_game::{ItemIdx, LocationIdx, MultiWorld, Placement};
use multiworld_logic::CollectionState;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SpoilerItemLoc {
    pub item: String,
    pub item_player: String,
    pub location: String,
    pub location_player: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SpoilerSphere {
    pub sphere: usize,
    pub items: Vec<SpoilerItemLoc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SpoilerLog {
    pub seed: u64,
    pub seed_name: String,
    /// Sphere 0 is the starting inventory.
    pub playthrough: Vec<SpoilerSphere>,
    pub locations: Vec<SpoilerItemLoc>,
}

fn item_loc(world: &MultiWorld, item: ItemIdx, location: Option<LocationIdx>) -> SpoilerItemLoc {
    let it = &world.items[item];
    let (location, location_player) = match location {
        Some(l) => {
            let loc = &world.locations[l];
            (loc.name.clone(), world.player_name(loc.player).to_string())
        }
        None => ("Start".to_string(), world.player_name(it.player).to_string()),
    };
    SpoilerItemLoc {
        item: it.name.clone(),
        item_player: world.player_name(it.player).to_string(),
        location,
        location_player,
    }
}

pub fn get_spoiler_log(
    world: &MultiWorld,
    placement: &Placement,
    seed: u64,
    seed_name: &str,
) -> Result<SpoilerLog> {
    let mut playthrough = vec![];
    let start_items: Vec<SpoilerItemLoc> = world
        .precollected_items
        .iter()
        .flatten()
        .filter(|&&i| world.items[i].is_progression())
        .map(|&i| item_loc(world, i, None))
        .collect();
    if !start_items.is_empty() {
        playthrough.push(SpoilerSphere {
            sphere: 0,
            items: start_items,
        });
    }

    let mut state = CollectionState::new(world);
    for (i, sphere) in state.sweep_spheres(placement)?.into_iter().enumerate() {
        let items: Vec<SpoilerItemLoc> = sphere
            .into_iter()
            .filter_map(|loc| placement.item_at(loc).map(|item| (item, loc)))
            .filter(|&(item, _)| !world.items[item].is_event())
            .map(|(item, loc)| item_loc(world, item, Some(loc)))
            .collect();
        if !items.is_empty() {
            playthrough.push(SpoilerSphere {
                sphere: i + 1,
                items,
            });
        }
    }

    let locations = placement
        .filled_locations()
        .into_iter()
        .filter(|&l| world.locations[l].address.is_some())
        .filter_map(|l| placement.item_at(l).map(|item| item_loc(world, item, Some(l))))
        .collect();

    Ok(SpoilerLog {
        seed,
        seed_name: seed_name.to_string(),
        playthrough,
        locations,
    })
}
