//! Per-player private state and the deltas the engine emits against it.
//!
//! Hands, development cards and hidden points never live in [`crate::game::Game`].
//! The engine reads them and returns [`PrivateDelta`]s; the owner of the
//! private records applies those deltas after a successful action.

use crate::game::PlayerId;
use crate::resources::ResourceCounts;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Development card types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevCard {
    /// Move robber and steal, counts toward Largest Army
    Knight,
    /// Worth 1 VP, kept hidden
    VictoryPoint,
    /// Build 2 roads for free
    RoadBuilding,
    /// Take any 2 resources from the bank
    YearOfPlenty,
    /// Take every card of one resource from every opponent
    Monopoly,
}

impl DevCard {
    /// Create the standard development card deck (25 cards)
    pub fn standard_deck() -> Vec<DevCard> {
        let mut deck = Vec::with_capacity(25);
        deck.extend(std::iter::repeat(DevCard::Knight).take(14));
        deck.extend(std::iter::repeat(DevCard::VictoryPoint).take(5));
        deck.extend(std::iter::repeat(DevCard::RoadBuilding).take(2));
        deck.extend(std::iter::repeat(DevCard::YearOfPlenty).take(2));
        deck.extend(std::iter::repeat(DevCard::Monopoly).take(2));
        deck
    }

    pub fn shuffled_deck<R: Rng + ?Sized>(rng: &mut R) -> Vec<DevCard> {
        let mut deck = Self::standard_deck();
        deck.shuffle(rng);
        deck
    }

    /// Whether this card can be played (VP cards are never "played")
    pub fn is_playable(&self) -> bool {
        !matches!(self, DevCard::VictoryPoint)
    }
}

/// Everything about a player that opponents must not see
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrivateState {
    pub hand: ResourceCounts,
    /// Playable development cards
    pub dev_cards_in_hand: Vec<DevCard>,
    /// Bought this turn, playable from the next turn
    pub dev_cards_new: Vec<DevCard>,
    pub played_knights_count: u32,
    pub hidden_victory_points_count: u32,
}

pub type PrivateStates = BTreeMap<PlayerId, PrivateState>;

/// One player's private changes from a single action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateDelta {
    pub player_id: PlayerId,
    pub gain: ResourceCounts,
    pub lose: ResourceCounts,
    pub dev_card_drawn: Option<DevCard>,
    pub dev_card_played: Option<DevCard>,
    pub promote_new_cards: bool,
    pub knight_played: bool,
}

impl PrivateDelta {
    pub fn new(player_id: PlayerId) -> Self {
        Self {
            player_id,
            ..Self::default()
        }
    }
}

impl PrivateState {
    /// Net hand after a delta, without mutating. Gains land before losses so
    /// a card received and spent in the same action nets out.
    pub fn hand_after(&self, delta: &PrivateDelta) -> ResourceCounts {
        let mut hand = self.hand;
        hand.add_counts(&delta.gain);
        hand.saturating_sub_counts(&delta.lose);
        hand
    }

    pub fn apply(&mut self, delta: &PrivateDelta) {
        self.hand = self.hand_after(delta);
        if let Some(card) = delta.dev_card_played {
            if let Some(idx) = self.dev_cards_in_hand.iter().position(|c| *c == card) {
                self.dev_cards_in_hand.remove(idx);
            }
        }
        if delta.knight_played {
            self.played_knights_count += 1;
        }
        match delta.dev_card_drawn {
            Some(DevCard::VictoryPoint) => self.hidden_victory_points_count += 1,
            Some(card) => self.dev_cards_new.push(card),
            None => {}
        }
        if delta.promote_new_cards {
            self.dev_cards_in_hand.append(&mut self.dev_cards_new);
        }
    }

    pub fn playable_count(&self, card: DevCard) -> usize {
        self.dev_cards_in_hand.iter().filter(|c| **c == card).count()
    }
}

/// Apply a batch of deltas. Deltas for players without a record are ignored.
pub fn apply_deltas(privates: &mut PrivateStates, deltas: &[PrivateDelta]) {
    for delta in deltas {
        if let Some(state) = privates.get_mut(&delta.player_id) {
            state.apply(delta);
        }
    }
}

/// Accumulates deltas per player while an action is being resolved, so later
/// checks in the same action see earlier movements.
#[derive(Debug, Default, Clone)]
pub(crate) struct DeltaSet {
    by_player: BTreeMap<PlayerId, PrivateDelta>,
}

impl DeltaSet {
    pub fn entry(&mut self, player_id: PlayerId) -> &mut PrivateDelta {
        self.by_player
            .entry(player_id)
            .or_insert_with(|| PrivateDelta::new(player_id))
    }

    pub fn gain(&mut self, player_id: PlayerId, counts: &ResourceCounts) {
        if !counts.is_empty() {
            self.entry(player_id).gain.add_counts(counts);
        }
    }

    pub fn lose(&mut self, player_id: PlayerId, counts: &ResourceCounts) {
        if !counts.is_empty() {
            self.entry(player_id).lose.add_counts(counts);
        }
    }

    pub fn get(&self, player_id: &PlayerId) -> Option<&PrivateDelta> {
        self.by_player.get(player_id)
    }

    pub fn into_vec(self) -> Vec<PrivateDelta> {
        self.by_player.into_values().collect()
    }
}
