use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::{
    GenerationError, Inventory, Item, ItemNameId, LocationIdx, MultiWorld, PlayerId, RegionIdx,
};

/// What a custom predicate gets to look at: the collected items, resolved
/// by name against the world they belong to.
pub struct RuleContext<'a> {
    pub world: &'a MultiWorld,
    pub inventory: &'a Inventory,
}

impl RuleContext<'_> {
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
}

type CustomRuleFn = dyn Fn(&RuleContext) -> Result<bool> + Send + Sync;
type CustomItemRuleFn = dyn Fn(&Item) -> Result<bool> + Send + Sync;

/// Adapter-authored access logic that the algebra can't express. It must be
/// a pure function of the collected items.
#[derive(Clone)]
pub struct CustomRule {
    pub name: String,
    func: Arc<CustomRuleFn>,
}

impl CustomRule {
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(&RuleContext) -> Result<bool> + Send + Sync + 'static,
    {
        CustomRule {
            name: name.to_string(),
            func: Arc::new(func),
        }
    }

    pub fn eval(&self, cx: &RuleContext) -> Result<bool> {
        (self.func)(cx).with_context(|| format!("custom rule '{}' failed", self.name))
    }
}

impl fmt::Debug for CustomRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Custom({})", self.name)
    }
}

#[derive(Clone)]
pub struct CustomItemRule {
    pub name: String,
    func: Arc<CustomItemRuleFn>,
}

impl CustomItemRule {
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(&Item) -> Result<bool> + Send + Sync + 'static,
    {
        CustomItemRule {
            name: name.to_string(),
            func: Arc::new(func),
        }
    }
}

impl fmt::Debug for CustomItemRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Custom({})", self.name)
    }
}

/// Access predicate over a collection state.
///
/// Reachability is cached monotonically, so rules are expected to only get
/// easier to satisfy as items are collected. `Not` is available for
/// adapters that need it, but wrapping anything that can flip from false to
/// true will give stale answers.
#[derive(Clone, Debug)]
pub enum Requirement {
    Free,
    Never,
    Has {
        item: ItemNameId,
        player: PlayerId,
    },
    CountAtLeast {
        item: ItemNameId,
        player: PlayerId,
        count: usize,
    },
    HasAny {
        items: Vec<ItemNameId>,
        player: PlayerId,
    },
    HasAll {
        items: Vec<ItemNameId>,
        player: PlayerId,
    },
    GroupCountAtLeast {
        group: String,
        player: PlayerId,
        count: usize,
    },
    CanReachRegion(RegionIdx),
    CanReachLocation(LocationIdx),
    And(Vec<Requirement>),
    Or(Vec<Requirement>),
    Not(Box<Requirement>),
    Custom(CustomRule),
}

impl Requirement {
    pub fn make_and(reqs: Vec<Requirement>) -> Requirement {
        let mut out_reqs: Vec<Requirement> = vec![];
        for req in reqs {
            if let Requirement::Never = req {
                return Requirement::Never;
            } else if let Requirement::Free = req {
                continue;
            } else if let Requirement::And(and_reqs) = req {
                out_reqs.extend(and_reqs);
            } else {
                out_reqs.push(req);
            }
        }
        if out_reqs.is_empty() {
            Requirement::Free
        } else if out_reqs.len() == 1 {
            out_reqs.pop().unwrap_or(Requirement::Free)
        } else {
            Requirement::And(out_reqs)
        }
    }

    pub fn make_or(reqs: Vec<Requirement>) -> Requirement {
        let mut out_reqs: Vec<Requirement> = vec![];
        for req in reqs {
            if let Requirement::Never = req {
                continue;
            } else if let Requirement::Free = req {
                return Requirement::Free;
            } else if let Requirement::Or(or_reqs) = req {
                out_reqs.extend(or_reqs);
            } else {
                out_reqs.push(req);
            }
        }
        if out_reqs.is_empty() {
            Requirement::Never
        } else if out_reqs.len() == 1 {
            out_reqs.pop().unwrap_or(Requirement::Never)
        } else {
            Requirement::Or(out_reqs)
        }
    }

    pub fn make_not(req: Requirement) -> Requirement {
        match req {
            Requirement::Free => Requirement::Never,
            Requirement::Never => Requirement::Free,
            Requirement::Not(inner) => *inner,
            other => Requirement::Not(Box::new(other)),
        }
    }

    pub fn and(self, other: Requirement) -> Requirement {
        Requirement::make_and(vec![self, other])
    }

    pub fn is_free(&self) -> bool {
        matches!(self, Requirement::Free)
    }
}

/// Restricts which items may be placed at a location.
#[derive(Clone, Debug)]
pub enum ItemRule {
    Any,
    Named(Vec<ItemNameId>),
    OwnedBy(PlayerId),
    NotProgression,
    And(Vec<ItemRule>),
    Not(Box<ItemRule>),
    Custom(CustomItemRule),
}

impl ItemRule {
    pub fn and(self, other: ItemRule) -> ItemRule {
        match (self, other) {
            (ItemRule::Any, r) | (r, ItemRule::Any) => r,
            (ItemRule::And(mut a), ItemRule::And(b)) => {
                a.extend(b);
                ItemRule::And(a)
            }
            (ItemRule::And(mut a), r) => {
                a.push(r);
                ItemRule::And(a)
            }
            (l, r) => ItemRule::And(vec![l, r]),
        }
    }

    pub fn accepts(&self, item: &Item) -> Result<bool> {
        match self {
            ItemRule::Any => Ok(true),
            ItemRule::Named(names) => Ok(names.contains(&item.name_id)),
            ItemRule::OwnedBy(player) => Ok(item.player == *player),
            ItemRule::NotProgression => Ok(!item.is_progression()),
            ItemRule::And(rules) => {
                for r in rules {
                    if !r.accepts(item)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            ItemRule::Not(r) => Ok(!r.accepts(item)?),
            ItemRule::Custom(rule) => (rule.func)(item)
                .with_context(|| format!("item rule '{}' failed on {}", rule.name, item.name)),
        }
    }
}

// Shared by the rule constructors on `MultiWorld`.
pub(crate) fn unknown_group(group: &str, player: PlayerId) -> GenerationError {
    GenerationError::UnknownItemGroup {
        player,
        name: group.to_string(),
    }
}
