//! Resource types, resource bundles and building costs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of cards of each resource type in the game. The bank starts with all of them.
pub const BANK_SUPPLY: u32 = 19;

/// The five tradeable resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Wood,
    Brick,
    Sheep,
    Wheat,
    Ore,
}

impl Resource {
    /// All resources in canonical order
    pub const ALL: [Resource; 5] = [
        Resource::Wood,
        Resource::Brick,
        Resource::Sheep,
        Resource::Wheat,
        Resource::Ore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Wood => "wood",
            Resource::Brick => "brick",
            Resource::Sheep => "sheep",
            Resource::Wheat => "wheat",
            Resource::Ore => "ore",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bundle of resource cards: a hand, a cost, a trade side or the bank.
///
/// Missing fields deserialize as zero so clients can send sparse bundles
/// such as `{"wheat": 2}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceCounts {
    pub wood: u32,
    pub brick: u32,
    pub sheep: u32,
    pub wheat: u32,
    pub ore: u32,
}

impl ResourceCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_amounts(wood: u32, brick: u32, sheep: u32, wheat: u32, ore: u32) -> Self {
        Self {
            wood,
            brick,
            sheep,
            wheat,
            ore,
        }
    }

    /// A bundle holding `amount` of a single resource
    pub fn single(resource: Resource, amount: u32) -> Self {
        let mut counts = Self::new();
        counts.set(resource, amount);
        counts
    }

    /// The full bank at game start
    pub fn full_bank() -> Self {
        Self::with_amounts(BANK_SUPPLY, BANK_SUPPLY, BANK_SUPPLY, BANK_SUPPLY, BANK_SUPPLY)
    }

    pub fn total(&self) -> u32 {
        self.wood + self.brick + self.sheep + self.wheat + self.ore
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn get(&self, resource: Resource) -> u32 {
        match resource {
            Resource::Wood => self.wood,
            Resource::Brick => self.brick,
            Resource::Sheep => self.sheep,
            Resource::Wheat => self.wheat,
            Resource::Ore => self.ore,
        }
    }

    pub fn set(&mut self, resource: Resource, count: u32) {
        match resource {
            Resource::Wood => self.wood = count,
            Resource::Brick => self.brick = count,
            Resource::Sheep => self.sheep = count,
            Resource::Wheat => self.wheat = count,
            Resource::Ore => self.ore = count,
        }
    }

    pub fn add(&mut self, resource: Resource, amount: u32) {
        self.set(resource, self.get(resource) + amount);
    }

    pub fn add_counts(&mut self, other: &ResourceCounts) {
        for r in Resource::ALL {
            self.add(r, other.get(r));
        }
    }

    /// Subtract what is available, flooring each counter at zero.
    pub fn saturating_sub_counts(&mut self, other: &ResourceCounts) {
        for r in Resource::ALL {
            self.set(r, self.get(r).saturating_sub(other.get(r)));
        }
    }

    /// Whether every counter of `cost` is covered
    pub fn can_afford(&self, cost: &ResourceCounts) -> bool {
        Resource::ALL.iter().all(|&r| self.get(r) >= cost.get(r))
    }

    /// `Some((resource, count))` when exactly one resource type is non-zero.
    pub fn single_kind(&self) -> Option<(Resource, u32)> {
        let mut found = None;
        for r in Resource::ALL {
            let n = self.get(r);
            if n == 0 {
                continue;
            }
            if found.is_some() {
                return None;
            }
            found = Some((r, n));
        }
        found
    }

    /// The resource with the highest count; ties go to the earlier resource in
    /// canonical order. `None` when empty.
    pub fn most_common(&self) -> Option<Resource> {
        let mut best: Option<(Resource, u32)> = None;
        for r in Resource::ALL {
            let n = self.get(r);
            if n > best.map(|(_, c)| c).unwrap_or(0) {
                best = Some((r, n));
            }
        }
        best.map(|(r, _)| r)
    }

    /// The resource of the `index`-th card if the hand were laid out in
    /// canonical order. Used to pick a uniformly random card.
    pub fn nth_card(&self, index: u32) -> Option<Resource> {
        let mut acc = 0;
        for r in Resource::ALL {
            acc += self.get(r);
            if index < acc {
                return Some(r);
            }
        }
        None
    }

    /// Non-zero entries in canonical order
    pub fn iter(&self) -> impl Iterator<Item = (Resource, u32)> + '_ {
        Resource::ALL
            .into_iter()
            .map(|r| (r, self.get(r)))
            .filter(|(_, n)| *n > 0)
    }
}

/// Building costs
pub mod costs {
    use super::ResourceCounts;

    /// Road: 1 wood, 1 brick
    pub fn road() -> ResourceCounts {
        ResourceCounts::with_amounts(1, 1, 0, 0, 0)
    }

    /// Settlement: 1 wood, 1 brick, 1 sheep, 1 wheat
    pub fn settlement() -> ResourceCounts {
        ResourceCounts::with_amounts(1, 1, 1, 1, 0)
    }

    /// City upgrade: 2 wheat, 3 ore
    pub fn city() -> ResourceCounts {
        ResourceCounts::with_amounts(0, 0, 0, 2, 3)
    }

    /// Development card: 1 sheep, 1 wheat, 1 ore
    pub fn development_card() -> ResourceCounts {
        ResourceCounts::with_amounts(0, 0, 1, 1, 1)
    }
}
