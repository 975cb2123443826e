//! Board presets: fixed curated layouts plus a seeded balanced-random layout.

use crate::board::{BoardError, LayoutSpec, Terrain, CENTER_INDEX, HEX_COUNT};
use crate::hex::{board_coords, HexCoord, BOARD_RADIUS};
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_PRESET_ID: &str = "classic-balanced";
pub const RANDOM_PRESET_ID: &str = "random-balanced";

/// Whole-assignment retries for the token solver
const TOKEN_ATTEMPTS: usize = 220;

/// Number tokens for the 18 producing hexes
const TOKEN_BAG: [u8; 18] = [2, 3, 3, 4, 4, 5, 5, 6, 6, 8, 8, 9, 9, 10, 10, 11, 11, 12];

/// Token row shared by the curated presets
const CURATED_TOKENS: [Option<u8>; HEX_COUNT] = [
    Some(5),
    Some(2),
    Some(6),
    Some(3),
    Some(8),
    Some(10),
    Some(9),
    Some(12),
    Some(11),
    None,
    Some(4),
    Some(8),
    Some(10),
    Some(9),
    Some(4),
    Some(5),
    Some(6),
    Some(3),
    Some(11),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PresetMeta {
    pub id: &'static str,
    pub name: &'static str,
}

pub const PRESETS: [PresetMeta; 6] = [
    PresetMeta {
        id: "classic-balanced",
        name: "Classic Balanced",
    },
    PresetMeta {
        id: "trade-heavy",
        name: "Trade Heavy",
    },
    PresetMeta {
        id: "sheep-wheat-boom",
        name: "Sheep/Wheat Boom",
    },
    PresetMeta {
        id: "high-ore",
        name: "High Ore",
    },
    PresetMeta {
        id: "high-brick-wood",
        name: "Brick/Wood Rush",
    },
    PresetMeta {
        id: "random-balanced",
        name: "Random (Balanced-ish)",
    },
];

pub fn is_known_preset(id: &str) -> bool {
    PRESETS.iter().any(|p| p.id == id)
}

/// A resolved preset ready to hand to [`crate::board::generate`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetDefinition {
    pub id: String,
    pub name: String,
    pub layout: LayoutSpec,
    pub desert_index: usize,
    pub seed: Option<String>,
}

/// FNV-1a over the seed string
fn hash_seed(seed: &str) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in seed.as_bytes() {
        h ^= u64::from(*b);
        h = h.wrapping_mul(0x0100_0000_01b3);
    }
    h
}

/// Deterministic generator for a seed string
pub fn seeded_rng(seed: &str) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(hash_seed(seed))
}

/// Resolve a preset id. Unknown ids fall back to the classic layout.
///
/// `random-balanced` requires a non-empty seed.
pub fn preset_definition(id: &str, seed: Option<&str>) -> Result<PresetDefinition, BoardError> {
    let meta = PRESETS
        .iter()
        .find(|p| p.id == id)
        .copied()
        .unwrap_or(PRESETS[0]);

    use Terrain::*;
    let resources = match meta.id {
        "trade-heavy" => [
            Wood, Brick, Sheep, Wheat, Ore, Wood, Brick, Ore, Wheat, Desert, Ore, Wood, Brick,
            Sheep, Wheat, Wood, Wheat, Sheep, Sheep,
        ],
        "sheep-wheat-boom" => [
            Wood, Ore, Sheep, Brick, Wheat, Sheep, Sheep, Ore, Wood, Desert, Ore, Wheat, Sheep,
            Wheat, Brick, Wood, Wheat, Brick, Wood,
        ],
        "high-ore" => [
            Wheat, Ore, Wheat, Sheep, Ore, Ore, Sheep, Wood, Brick, Desert, Wood, Brick, Wood,
            Brick, Sheep, Wheat, Wood, Sheep, Wheat,
        ],
        "high-brick-wood" => [
            Brick, Wood, Brick, Wood, Wood, Brick, Wood, Wheat, Ore, Desert, Ore, Wheat, Sheep,
            Wheat, Sheep, Wheat, Sheep, Sheep, Ore,
        ],
        RANDOM_PRESET_ID => {
            let seed = seed.map(str::trim).unwrap_or_default();
            if seed.is_empty() {
                return Err(BoardError::MissingSeed);
            }
            let (layout, desert_index) = random_balanced(seed)?;
            return Ok(PresetDefinition {
                id: meta.id.to_string(),
                name: meta.name.to_string(),
                layout,
                desert_index,
                seed: Some(seed.to_string()),
            });
        }
        _ => [
            Wood, Brick, Sheep, Wheat, Ore, Wood, Brick, Sheep, Wheat, Desert, Ore, Wood, Brick,
            Sheep, Wheat, Ore, Wood, Sheep, Wheat,
        ],
    };

    let layout = LayoutSpec {
        resources: resources.to_vec(),
        tokens: CURATED_TOKENS.to_vec(),
    };
    validate_curated(&layout)?;
    Ok(PresetDefinition {
        id: meta.id.to_string(),
        name: meta.name.to_string(),
        layout,
        desert_index: CENTER_INDEX,
        seed: None,
    })
}

fn validate_curated(layout: &LayoutSpec) -> Result<(), BoardError> {
    if layout.resources.len() != HEX_COUNT {
        return Err(BoardError::ResourceCountMismatch {
            expected: HEX_COUNT,
            actual: layout.resources.len(),
        });
    }
    if layout.tokens.len() != HEX_COUNT {
        return Err(BoardError::TokenCountMismatch {
            expected: HEX_COUNT,
            actual: layout.tokens.len(),
        });
    }
    if layout.resources[CENTER_INDEX] != Terrain::Desert {
        return Err(BoardError::DesertNotAtCenter {
            index: CENTER_INDEX,
        });
    }
    if layout.tokens[CENTER_INDEX].is_some() {
        return Err(BoardError::DesertHasToken {
            index: CENTER_INDEX,
        });
    }
    let deserts = layout
        .resources
        .iter()
        .filter(|r| **r == Terrain::Desert)
        .count();
    if deserts != 1 {
        return Err(BoardError::DesertCount(deserts));
    }
    Ok(())
}

fn is_hot(token: Option<u8>) -> bool {
    matches!(token, Some(6) | Some(8))
}

/// Hex-adjacency by position index, each list sorted ascending
pub fn neighbor_indices() -> Vec<Vec<usize>> {
    let coords = board_coords(BOARD_RADIUS);
    let index_by_coord: HashMap<HexCoord, usize> =
        coords.iter().enumerate().map(|(i, c)| (*c, i)).collect();
    coords
        .iter()
        .map(|c| {
            let mut list: Vec<usize> = c
                .neighbors()
                .iter()
                .filter_map(|n| index_by_coord.get(n).copied())
                .collect();
            list.sort_unstable();
            list
        })
        .collect()
}

/// Desert goes to a non-corner hex, weighted toward the middle
fn choose_desert_index<R: Rng + ?Sized>(rng: &mut R, coords: &[HexCoord]) -> usize {
    let candidates: Vec<usize> = (0..coords.len())
        .filter(|&i| !coords[i].is_board_corner())
        .collect();
    let weights: Vec<u32> = candidates
        .iter()
        .map(|&i| match coords[i].ring() {
            0 => 3,
            1 => 2,
            _ => 1,
        })
        .collect();
    match WeightedIndex::new(&weights) {
        Ok(dist) => candidates[dist.sample(rng)],
        Err(_) => CENTER_INDEX,
    }
}

struct TokenSolver<'a> {
    neighbors: &'a [Vec<usize>],
    tokens: Vec<Option<u8>>,
    ordered: Vec<u8>,
}

impl TokenSolver<'_> {
    fn can_place(&self, token: u8, idx: usize) -> bool {
        if !is_hot(Some(token)) {
            return true;
        }
        self.neighbors[idx].iter().all(|&n| !is_hot(self.tokens[n]))
    }

    fn backtrack<R: Rng + ?Sized>(&mut self, rng: &mut R, pos: usize, remaining: &[usize]) -> bool {
        let Some(&token) = self.ordered.get(pos) else {
            return true;
        };
        let mut viable: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|&idx| self.can_place(token, idx))
            .collect();
        viable.shuffle(rng);

        for idx in viable {
            self.tokens[idx] = Some(token);
            let rest: Vec<usize> = remaining.iter().copied().filter(|&v| v != idx).collect();
            if self.backtrack(rng, pos + 1, &rest) {
                return true;
            }
            self.tokens[idx] = None;
        }
        false
    }
}

/// Hot tokens (6/8) go first so the adjacency constraint prunes early.
fn try_assign_tokens<R: Rng + ?Sized>(
    rng: &mut R,
    neighbors: &[Vec<usize>],
    desert_index: usize,
) -> Option<Vec<Option<u8>>> {
    let mut hot: Vec<u8> = TOKEN_BAG.iter().copied().filter(|t| is_hot(Some(*t))).collect();
    let mut rest: Vec<u8> = TOKEN_BAG.iter().copied().filter(|t| !is_hot(Some(*t))).collect();
    hot.shuffle(rng);
    rest.shuffle(rng);
    hot.extend(rest);

    let indices: Vec<usize> = (0..HEX_COUNT).filter(|&i| i != desert_index).collect();
    let mut solver = TokenSolver {
        neighbors,
        tokens: vec![None; HEX_COUNT],
        ordered: hot,
    };
    solver
        .backtrack(rng, 0, &indices)
        .then_some(solver.tokens)
}

fn random_balanced(seed: &str) -> Result<(LayoutSpec, usize), BoardError> {
    let mut rng = seeded_rng(seed);
    let coords = board_coords(BOARD_RADIUS);
    let neighbors = neighbor_indices();

    let desert_index = choose_desert_index(&mut rng, &coords);

    let mut bag: Vec<Terrain> = Vec::with_capacity(HEX_COUNT - 1);
    for (terrain, count) in [
        (Terrain::Wood, 4),
        (Terrain::Brick, 3),
        (Terrain::Sheep, 4),
        (Terrain::Wheat, 4),
        (Terrain::Ore, 3),
    ] {
        bag.extend(std::iter::repeat(terrain).take(count));
    }
    bag.shuffle(&mut rng);
    let mut drawn = bag.into_iter();
    let resources: Vec<Terrain> = (0..HEX_COUNT)
        .map(|i| {
            if i == desert_index {
                Terrain::Desert
            } else {
                drawn.next().unwrap_or(Terrain::Desert)
            }
        })
        .collect();

    let tokens = (0..TOKEN_ATTEMPTS)
        .find_map(|_| try_assign_tokens(&mut rng, &neighbors, desert_index))
        .ok_or_else(|| BoardError::TokenAssignmentFailed(seed.to_string()))?;

    Ok((LayoutSpec { resources, tokens }, desert_index))
}
