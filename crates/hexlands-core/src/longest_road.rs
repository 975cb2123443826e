//! Longest-road evaluation.
//!
//! Each player's roads form an undirected multigraph over board vertices. The
//! longest trail (no edge used twice, vertices may repeat) is found by
//! depth-first search from every vertex. An opponent's settlement or city on a
//! vertex cuts the trail there: a walk may end at that vertex but not pass it.

use crate::board::Board;
use crate::game::{PlayerId, Structures};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Minimum trail length that can claim the award
pub const LONGEST_ROAD_MIN_LENGTH: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LongestRoadAward {
    /// Unique leader at or above the minimum, otherwise none
    pub holder: Option<PlayerId>,
    /// Best length across all players
    pub length: u32,
    /// Every player sharing the best length (empty when nobody has a road)
    pub leaders: Vec<PlayerId>,
    pub min_length: u32,
}

struct RoadWalker<'a> {
    adjacency: HashMap<&'a str, Vec<(usize, &'a str)>>,
    structures: &'a Structures,
    player: PlayerId,
    used: Vec<bool>,
}

impl RoadWalker<'_> {
    fn blocked(&self, vertex_id: &str) -> bool {
        self.structures
            .settlements
            .get(vertex_id)
            .is_some_and(|s| s.player_id != self.player)
    }

    fn walk(&mut self, vertex_id: &str, arrived: bool) -> u32 {
        if arrived && self.blocked(vertex_id) {
            return 0;
        }
        let Some(links) = self.adjacency.get(vertex_id).cloned() else {
            return 0;
        };
        let mut best = 0;
        for (edge, next) in links {
            if self.used[edge] {
                continue;
            }
            self.used[edge] = true;
            best = best.max(1 + self.walk(next, true));
            self.used[edge] = false;
        }
        best
    }
}

/// Length of `player`'s longest continuous road.
pub fn longest_road_for_player(board: &Board, structures: &Structures, player: PlayerId) -> u32 {
    let own: Vec<_> = structures
        .roads
        .iter()
        .filter(|(_, road)| road.player_id == player)
        .filter_map(|(edge_id, _)| board.edge(edge_id))
        .collect();
    if own.is_empty() {
        return 0;
    }

    let mut adjacency: HashMap<&str, Vec<(usize, &str)>> = HashMap::new();
    for (i, edge) in own.iter().enumerate() {
        adjacency
            .entry(edge.v_a.as_str())
            .or_default()
            .push((i, edge.v_b.as_str()));
        adjacency
            .entry(edge.v_b.as_str())
            .or_default()
            .push((i, edge.v_a.as_str()));
    }

    let mut starts: Vec<&str> = adjacency.keys().copied().collect();
    starts.sort_unstable();

    let mut walker = RoadWalker {
        adjacency,
        structures,
        player,
        used: vec![false; own.len()],
    };
    starts
        .into_iter()
        .map(|v| walker.walk(v, false))
        .max()
        .unwrap_or(0)
}

/// Decide who holds Longest Road among `players`.
///
/// The award needs a unique leader with at least [`LONGEST_ROAD_MIN_LENGTH`];
/// a tie at the top or a short best leaves it unclaimed.
pub fn compute_award(board: &Board, structures: &Structures, players: &[PlayerId]) -> LongestRoadAward {
    let lengths: Vec<(PlayerId, u32)> = players
        .iter()
        .map(|&p| (p, longest_road_for_player(board, structures, p)))
        .collect();
    let length = lengths.iter().map(|(_, l)| *l).max().unwrap_or(0);
    let leaders: Vec<PlayerId> = if length > 0 {
        lengths
            .iter()
            .filter(|(_, l)| *l == length)
            .map(|(p, _)| *p)
            .collect()
    } else {
        Vec::new()
    };
    let holder = if length >= LONGEST_ROAD_MIN_LENGTH && leaders.len() == 1 {
        Some(leaders[0])
    } else {
        None
    };
    LongestRoadAward {
        holder,
        length,
        leaders,
        min_length: LONGEST_ROAD_MIN_LENGTH,
    }
}
