//! Projections of a game for viewers.
//!
//! [`PublicGameSnapshot`] is what every subscriber sees. It is built field by
//! field from [`Game`] and has no place for hands or development cards.
//! [`PrivateSnapshot`] is one player's own view, sent only to that player.

use crate::board::Board;
use crate::events::EventKind;
use crate::game::{
    Awards, Game, GameSettings, LastRoll, LogEntry, Phase, PlayerId, Structures, Subphase,
    TradeOffer, TradeStatus,
};
use crate::private::{DevCard, PrivateState, PrivateStates};
use crate::resources::{Resource, ResourceCounts};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Newest log entries included in a snapshot
pub const PUBLIC_LOG_ENTRIES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantFlags {
    pub event_deck_enabled: bool,
    pub speed_trade_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupView {
    pub placement_order: Vec<PlayerId>,
    pub placement_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    pub id: EventKind,
    pub name: String,
    pub description: String,
    pub short_text: String,
}

/// What the current player is expected to do next, with the legal targets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hints {
    pub prompt: String,
    pub expected: Option<String>,
    pub legal_vertex_ids: Vec<String>,
    pub legal_edge_ids: Vec<String>,
    pub legal_hex_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub legal_victim_player_ids: Vec<PlayerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discard_required_by_player_id: Option<BTreeMap<PlayerId, u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discard_submitted_by_player_id: Option<BTreeMap<PlayerId, bool>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub bank_trade_available: bool,
}

impl Hints {
    fn prompt(prompt: impl Into<String>, expected: Option<&str>) -> Self {
        Self {
            prompt: prompt.into(),
            expected: expected.map(str::to_string),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicGameSnapshot {
    pub preset_id: String,
    pub board_seed: Option<String>,
    pub settings: GameSettings,
    pub variants: VariantFlags,
    pub phase: Phase,
    pub board: Board,
    pub structures: Structures,
    pub bank: ResourceCounts,
    pub awards: Awards,
    pub dev_deck_count: usize,
    pub dev_discard_count: usize,
    pub played_knights_by_player_id: BTreeMap<PlayerId, u32>,
    pub dev_card_played_this_turn: bool,
    pub victory_points_to_win: u32,
    pub points_by_player_id: BTreeMap<PlayerId, u32>,
    /// Public plus hidden points, only once the game is over
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_points_by_player_id: Option<BTreeMap<PlayerId, u32>>,
    pub winner_player_id: Option<PlayerId>,
    pub robber_hex_id: String,
    pub turn_order: Vec<PlayerId>,
    pub current_player_index: usize,
    pub current_player_id: Option<PlayerId>,
    pub turn_number: u32,
    pub subphase: Subphase,
    pub setup: Option<SetupView>,
    pub last_roll: Option<LastRoll>,
    pub trade_offers: Vec<TradeOffer>,
    pub current_event: Option<EventView>,
    pub event_deck_count: usize,
    pub hints: Hints,
    pub log: Vec<LogEntry>,
}

/// Build the snapshot every viewer receives.
///
/// `privates` is read only after the game is over, to reveal final scores.
pub fn public_snapshot(game: &Game, privates: &PrivateStates) -> PublicGameSnapshot {
    let mut points_by_player_id = game.points_by_player_id();
    let final_points_by_player_id = if game.is_over() {
        for (pid, state) in privates {
            if let Some(points) = points_by_player_id.get_mut(pid) {
                *points += state.hidden_victory_points_count;
            }
        }
        Some(points_by_player_id.clone())
    } else {
        None
    };

    let log_start = game.log.len().saturating_sub(PUBLIC_LOG_ENTRIES);
    PublicGameSnapshot {
        preset_id: game.preset_id.clone(),
        board_seed: game.board_seed.clone(),
        settings: game.settings,
        variants: VariantFlags {
            event_deck_enabled: game.variants.event_deck_enabled,
            speed_trade_enabled: game.variants.speed_trade_enabled,
        },
        phase: game.phase,
        board: game.board.clone(),
        structures: game.structures.clone(),
        bank: game.bank,
        awards: game.awards.clone(),
        dev_deck_count: game.dev_deck.len(),
        dev_discard_count: game.dev_discard.len(),
        played_knights_by_player_id: game.played_knights_by_player_id.clone(),
        dev_card_played_this_turn: game.dev_card_played_this_turn,
        victory_points_to_win: game.victory_points_to_win,
        points_by_player_id,
        final_points_by_player_id,
        winner_player_id: game.winner_player_id,
        robber_hex_id: game.robber_hex_id.clone(),
        turn_order: game.turn_order.clone(),
        current_player_index: game.current_player_index,
        current_player_id: game.current_player_id(),
        turn_number: game.turn_number,
        subphase: game.subphase,
        setup: game.phase.is_setup().then(|| SetupView {
            placement_order: game.setup.placement_order.clone(),
            placement_index: game.setup.placement_index,
        }),
        last_roll: game.last_roll,
        trade_offers: game.trade_offers.clone(),
        current_event: game.current_event.as_ref().map(|e| EventView {
            id: e.id,
            name: e.name.clone(),
            description: e.description.clone(),
            short_text: e.short_text.clone(),
        }),
        event_deck_count: game.event_deck.len(),
        hints: hints(game),
        log: game.log[log_start..].to_vec(),
    }
}

pub fn hints(game: &Game) -> Hints {
    match (game.phase, game.subphase) {
        (Phase::GameOver, _) => Hints::prompt("Game over", None),
        (Phase::SetupRound1 | Phase::SetupRound2, Subphase::SetupSettlement) => Hints {
            legal_vertex_ids: game.legal_setup_settlement_vertex_ids(),
            ..Hints::prompt("Place a settlement", Some("PLACE_SETTLEMENT"))
        },
        (Phase::SetupRound1 | Phase::SetupRound2, Subphase::SetupRoad) => Hints {
            legal_edge_ids: game.legal_setup_road_edge_ids(),
            ..Hints::prompt(
                "Place a road (adjacent to your settlement)",
                Some("PLACE_ROAD"),
            )
        },
        (Phase::Turn, Subphase::NeedsRoll) => Hints::prompt("Roll dice", Some("ROLL_DICE")),
        (Phase::Turn, Subphase::RobberDiscard) => {
            let robber = game.robber.clone().unwrap_or_default();
            Hints {
                discard_required_by_player_id: Some(robber.discard_required_by_player_id),
                discard_submitted_by_player_id: Some(robber.discard_submitted_by_player_id),
                ..Hints::prompt(
                    "7 rolled: discard, then move the robber.",
                    Some("DISCARD_CARDS"),
                )
            }
        }
        (Phase::Turn, Subphase::RobberMove) => Hints {
            legal_hex_ids: game.legal_robber_hex_ids(),
            ..Hints::prompt("Move the robber", Some("MOVE_ROBBER"))
        },
        (Phase::Turn, Subphase::RobberSteal) => Hints {
            legal_victim_player_ids: game
                .robber
                .as_ref()
                .map(|r| r.eligible_victim_player_ids.clone())
                .unwrap_or_default(),
            ..Hints::prompt("Choose someone to steal from", Some("STEAL_CARD"))
        },
        (Phase::Turn, Subphase::DevRoadBuilding) => {
            let remaining = game.dev_road_building.map_or(0, |d| d.roads_remaining);
            let prompt = match remaining {
                0 => "Road Building: place roads.".to_string(),
                1 => "Road Building: place 1 road.".to_string(),
                n => format!("Road Building: place {n} roads."),
            };
            Hints {
                legal_edge_ids: game
                    .current_player_id()
                    .map(|p| game.legal_road_edge_ids(p))
                    .unwrap_or_default(),
                ..Hints::prompt(prompt, Some("DEV_ROAD_BUILDING_PLACE_ROAD"))
            }
        }
        (Phase::Turn, Subphase::Main) => Hints {
            bank_trade_available: true,
            ..Hints::prompt("Main phase", None)
        },
        _ => Hints::prompt("...", None),
    }
}

/// One player's own cards, plus what they can currently do with them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateSnapshot {
    pub player_id: PlayerId,
    pub hand: ResourceCounts,
    pub dev_cards_in_hand: Vec<DevCard>,
    pub dev_cards_new: Vec<DevCard>,
    pub played_knights_count: u32,
    pub hidden_victory_points_count: u32,
    pub bank_trade_ratios: BTreeMap<Resource, u32>,
    /// Open offers this player could accept right now
    pub incoming_offer_ids: Vec<uuid::Uuid>,
}

pub fn private_snapshot(game: &Game, player: PlayerId, state: &PrivateState) -> PrivateSnapshot {
    let incoming_offer_ids = game
        .trade_offers
        .iter()
        .filter(|o| {
            o.status == TradeStatus::Open
                && o.from_player_id != player
                && o.to.includes(&player)
                && !o.rejected_by_player_ids.contains(&player)
                && game.has_player(&player)
        })
        .map(|o| o.id)
        .collect();
    PrivateSnapshot {
        player_id: player,
        hand: state.hand,
        dev_cards_in_hand: state.dev_cards_in_hand.clone(),
        dev_cards_new: state.dev_cards_new.clone(),
        played_knights_count: state.played_knights_count,
        hidden_victory_points_count: state.hidden_victory_points_count,
        bank_trade_ratios: game.bank_trade_ratios(player),
        incoming_offer_ids,
    }
}
