//! Event deck variant: a shuffled deck of one-turn rule modifiers.

use crate::presets::seeded_rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Copies of each event in a fresh deck
pub const EVENT_COPIES: usize = 2;

/// Default number of turns between draws
pub const DEFAULT_EVENT_DRAW_INTERVAL: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Every bank ratio becomes 3:1
    MarketBoom,
    /// Roads cost one less wood
    RoadWork,
    /// Everyone gains one of their most common resource
    HarvestFestival,
    /// Bank trades pay one bonus card
    MerchantShips,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::MarketBoom,
        EventKind::RoadWork,
        EventKind::HarvestFestival,
        EventKind::MerchantShips,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::MarketBoom => "Market Boom",
            EventKind::RoadWork => "Road Work",
            EventKind::HarvestFestival => "Harvest Festival",
            EventKind::MerchantShips => "Merchant Ships",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            EventKind::MarketBoom => "Bank trades are 3:1 this turn (all players).",
            EventKind::RoadWork => "Roads cost 1 less wood this turn.",
            EventKind::HarvestFestival => "Each player gets +1 of their most common resource.",
            EventKind::MerchantShips => "Ports give +1 bonus resource on trades this turn.",
        }
    }

    pub fn short_text(&self) -> &'static str {
        match self {
            EventKind::MarketBoom => "3:1 bank trades",
            EventKind::RoadWork => "Cheaper roads",
            EventKind::HarvestFestival => "+1 top resource",
            EventKind::MerchantShips => "Port bonus",
        }
    }
}

/// The event in effect for the current turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveEvent {
    pub id: EventKind,
    pub name: String,
    pub description: String,
    pub short_text: String,
    pub drawn_at: u64,
    pub turn_number: u32,
}

impl ActiveEvent {
    pub fn new(kind: EventKind, drawn_at: u64, turn_number: u32) -> Self {
        Self {
            id: kind,
            name: kind.name().to_string(),
            description: kind.description().to_string(),
            short_text: kind.short_text().to_string(),
            drawn_at,
            turn_number,
        }
    }
}

/// Shuffle a fresh deck for a game seed. Draws pop from the end.
pub fn create_event_deck(seed: &str) -> Vec<EventKind> {
    let mut rng = seeded_rng(&format!("{seed}-events"));
    let mut deck: Vec<EventKind> = (0..EVENT_COPIES)
        .flat_map(|_| EventKind::ALL)
        .collect();
    deck.shuffle(&mut rng);
    deck
}

/// Events are drawn on turn 1 and then every `interval` turns.
pub fn should_draw_event(turn_number: u32, interval: u32) -> bool {
    if turn_number == 0 {
        return false;
    }
    turn_number == 1 || (interval > 0 && turn_number % interval == 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deck_has_two_of_each() {
        let deck = create_event_deck("abc");
        assert_eq!(deck.len(), 8);
        for kind in EventKind::ALL {
            assert_eq!(deck.iter().filter(|k| **k == kind).count(), 2);
        }
    }

    #[test]
    fn test_deck_is_deterministic_per_seed() {
        assert_eq!(create_event_deck("seed-1"), create_event_deck("seed-1"));
    }

    #[test]
    fn test_draw_schedule() {
        let drawn: Vec<u32> = (0..=10).filter(|t| should_draw_event(*t, 3)).collect();
        assert_eq!(drawn, vec![1, 4, 7, 10]);
        assert!(should_draw_event(1, 5));
        assert!(!should_draw_event(5, 5));
        assert!(should_draw_event(6, 5));
    }

    #[test]
    fn test_event_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&EventKind::HarvestFestival).unwrap(),
            "\"harvest_festival\""
        );
    }
}
