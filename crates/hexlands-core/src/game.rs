//! Core game state.
//!
//! [`Game`] is the public record of one game: everything in it may be shown to
//! every viewer. Hands, development cards and hidden points live in
//! [`crate::private`]. The rules that move a game forward are in
//! [`crate::rules`].

use crate::board::{generate, Board, BoardError, PortKind};
use crate::events::{create_event_deck, ActiveEvent, EventKind, DEFAULT_EVENT_DRAW_INTERVAL};
use crate::presets::{preset_definition, RANDOM_PRESET_ID};
use crate::private::DevCard;
use crate::resources::{Resource, ResourceCounts};
use crate::actions::TradeTarget;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

/// Players are identified by a v4 uuid
pub type PlayerId = Uuid;

pub const DEFAULT_VICTORY_POINTS_TO_WIN: u32 = 10;
pub const QUICK_VICTORY_POINTS_TO_WIN: u32 = 8;
pub const MIN_VICTORY_POINTS_TO_WIN: u32 = 6;
pub const MAX_VICTORY_POINTS_TO_WIN: u32 = 15;

/// Minimum knights for Largest Army
pub const LARGEST_ARMY_MIN_KNIGHTS: u32 = 3;

pub const MAX_ROADS: usize = 15;
pub const MAX_SETTLEMENTS: usize = 5;
pub const MAX_CITIES: usize = 4;

/// A hand above this size owes half of it on a 7
pub const DISCARD_THRESHOLD: u32 = 7;

const LOG_MAX_ENTRIES: usize = 400;
const LOG_TRIM_TO: usize = 300;

// ==================== Phases ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    SetupRound1,
    SetupRound2,
    Turn,
    GameOver,
}

impl Phase {
    pub fn is_setup(&self) -> bool {
        matches!(self, Phase::SetupRound1 | Phase::SetupRound2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subphase {
    SetupSettlement,
    SetupRoad,
    NeedsRoll,
    RobberDiscard,
    RobberMove,
    RobberSteal,
    Main,
    DevRoadBuilding,
    GameOver,
}

// ==================== Settings ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    #[default]
    Classic,
    Quick,
}

impl GameMode {
    pub fn default_victory_points(&self) -> u32 {
        match self {
            GameMode::Classic => DEFAULT_VICTORY_POINTS_TO_WIN,
            GameMode::Quick => QUICK_VICTORY_POINTS_TO_WIN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiceProfile {
    #[default]
    Standard,
    /// Occasionally forces a 7
    HighConflict,
}

/// Host-chosen overrides. Absent fields keep the mode's default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HouseRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub victory_points_to_win: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotes_enabled: Option<bool>,
}

impl HouseRules {
    /// Whether every present field is in range
    pub fn is_valid(&self) -> bool {
        self.victory_points_to_win.map_or(true, |vp| {
            (MIN_VICTORY_POINTS_TO_WIN..=MAX_VICTORY_POINTS_TO_WIN).contains(&vp)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.victory_points_to_win.is_none() && self.emotes_enabled.is_none()
    }

    pub fn emotes_enabled(&self) -> bool {
        self.emotes_enabled.unwrap_or(true)
    }
}

/// Optional rule variants a room can switch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Variants {
    pub event_deck_enabled: bool,
    pub speed_trade_enabled: bool,
    pub event_draw_interval: u32,
}

impl Default for Variants {
    fn default() -> Self {
        Self {
            event_deck_enabled: false,
            speed_trade_enabled: false,
            event_draw_interval: DEFAULT_EVENT_DRAW_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSettings {
    pub game_mode: GameMode,
    pub victory_points_to_win: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub house_rules: Option<HouseRules>,
}

impl GameSettings {
    pub fn resolve(game_mode: GameMode, house_rules: Option<HouseRules>) -> Self {
        let house_rules = house_rules.filter(|h| !h.is_empty() && h.is_valid());
        let victory_points_to_win = house_rules
            .and_then(|h| h.victory_points_to_win)
            .unwrap_or_else(|| game_mode.default_victory_points());
        Self {
            game_mode,
            victory_points_to_win,
            house_rules,
        }
    }
}

// ==================== Board Pieces ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureKind {
    Settlement,
    City,
}

impl StructureKind {
    /// Victory points and production multiplier
    pub fn weight(&self) -> u32 {
        match self {
            StructureKind::Settlement => 1,
            StructureKind::City => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub player_id: PlayerId,
    pub kind: StructureKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Road {
    pub player_id: PlayerId,
}

/// Pieces on the board, keyed by vertex id and edge id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Structures {
    pub settlements: BTreeMap<String, Settlement>,
    pub roads: BTreeMap<String, Road>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Awards {
    pub longest_road_player_id: Option<PlayerId>,
    pub longest_road_length: u32,
    pub largest_army_player_id: Option<PlayerId>,
}

// ==================== Turn Bookkeeping ====================

/// Discard and steal bookkeeping while the robber is being resolved
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobberState {
    pub discard_required_by_player_id: BTreeMap<PlayerId, u32>,
    pub discard_submitted_by_player_id: BTreeMap<PlayerId, bool>,
    pub eligible_victim_player_ids: Vec<PlayerId>,
}

impl RobberState {
    pub fn all_discarded(&self) -> bool {
        self.discard_required_by_player_id
            .keys()
            .all(|p| self.discard_submitted_by_player_id.get(p).copied().unwrap_or(false))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevRoadBuilding {
    pub roads_remaining: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupState {
    /// Snake order: turn order then reversed
    pub placement_order: Vec<PlayerId>,
    pub placement_index: usize,
    pub last_settlement_vertex_id: Option<String>,
    pub settlements_placed_by_player_id: BTreeMap<PlayerId, u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastRoll {
    pub d1: u8,
    pub d2: u8,
    pub sum: u8,
    pub at: u64,
    pub by: PlayerId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Open,
    Accepted,
    Rejected,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeOffer {
    pub id: Uuid,
    pub created_at: u64,
    pub from_player_id: PlayerId,
    pub to: TradeTarget,
    pub give: ResourceCounts,
    pub want: ResourceCounts,
    pub status: TradeStatus,
    pub accepted_by_player_id: Option<PlayerId>,
    pub rejected_by_player_ids: Vec<PlayerId>,
}

// ==================== Log ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    System,
    Build,
    Bank,
    Roll,
    Robber,
    Dev,
    Trade,
    Turn,
    Award,
    Event,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: Uuid,
    pub at: u64,
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub actor_player_id: Option<PlayerId>,
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

impl LogEntry {
    /// Ids come from the caller's rng so a seeded run is reproducible.
    pub fn new<R: Rng + ?Sized>(
        rng: &mut R,
        at: u64,
        kind: LogKind,
        actor_player_id: Option<PlayerId>,
        message: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            id: random_uuid(rng),
            at,
            kind,
            actor_player_id,
            message: message.into(),
            data,
        }
    }
}

pub(crate) fn random_uuid<R: Rng + ?Sized>(rng: &mut R) -> Uuid {
    uuid::Builder::from_random_bytes(rng.gen()).into_uuid()
}

// ==================== Errors ====================

/// Rule violations. None of them change the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameError {
    #[error("Not your turn")]
    NotYourTurn,

    #[error("That can't be done right now")]
    BadPhase,

    #[error("Unknown vertex")]
    BadVertex,

    #[error("Unknown edge")]
    BadEdge,

    #[error("Unknown hex")]
    BadHex,

    #[error("You can't build there")]
    IllegalPlacement,

    #[error("There is already a road there")]
    EdgeOccupied,

    #[error("No roads left")]
    OutOfPiecesRoad,

    #[error("No settlements left")]
    OutOfPiecesSettlement,

    #[error("No cities left")]
    OutOfPiecesCity,

    #[error("There is no settlement there")]
    NoSettlement,

    #[error("That isn't yours")]
    NotYours,

    #[error("That is already a city")]
    AlreadyCity,

    #[error("Not enough resources")]
    NotEnoughResources,

    #[error("You don't need to discard")]
    NoDiscardRequired,

    #[error("You already discarded")]
    AlreadyDiscarded,

    #[error("Discard the exact number of cards required")]
    BadDiscard,

    #[error("Pick a valid target")]
    IllegalTarget,

    #[error("That trade doesn't work")]
    BadTrade,

    #[error("Pick a valid trade partner")]
    BadTradeTo,

    #[error("The bank doesn't have enough")]
    BankEmpty,

    #[error("That offer no longer exists")]
    NoSuchOffer,

    #[error("That offer is closed")]
    OfferClosed,

    #[error("You can't accept your own offer")]
    CannotAcceptOwnOffer,

    #[error("That offer isn't for you")]
    NotForYou,

    #[error("You already rejected that offer")]
    AlreadyRejected,

    #[error("No development cards left")]
    DevDeckEmpty,

    #[error("You already played a development card this turn")]
    AlreadyPlayedDevCard,

    #[error("That card can't be played")]
    BadDevCard,

    #[error("You don't have that card")]
    NoDevCard,

    #[error("Pick the resources for that card")]
    BadDevSelection,

    #[error("The game is over")]
    GameOver,

    #[error("You're not in this game")]
    UnknownPlayer,
}

impl GameError {
    /// Stable wire code
    pub fn code(&self) -> &'static str {
        match self {
            GameError::NotYourTurn => "NOT_YOUR_TURN",
            GameError::BadPhase => "BAD_PHASE",
            GameError::BadVertex => "BAD_VERTEX",
            GameError::BadEdge => "BAD_EDGE",
            GameError::BadHex => "BAD_HEX",
            GameError::IllegalPlacement => "ILLEGAL_PLACEMENT",
            GameError::EdgeOccupied => "EDGE_OCCUPIED",
            GameError::OutOfPiecesRoad => "OUT_OF_PIECES_ROAD",
            GameError::OutOfPiecesSettlement => "OUT_OF_PIECES_SETTLEMENT",
            GameError::OutOfPiecesCity => "OUT_OF_PIECES_CITY",
            GameError::NoSettlement => "NO_SETTLEMENT",
            GameError::NotYours => "NOT_YOURS",
            GameError::AlreadyCity => "ALREADY_CITY",
            GameError::NotEnoughResources => "NOT_ENOUGH_RESOURCES",
            GameError::NoDiscardRequired => "NO_DISCARD_REQUIRED",
            GameError::AlreadyDiscarded => "ALREADY_DISCARDED",
            GameError::BadDiscard => "BAD_DISCARD",
            GameError::IllegalTarget => "ILLEGAL_TARGET",
            GameError::BadTrade => "BAD_TRADE",
            GameError::BadTradeTo => "BAD_TRADE_TO",
            GameError::BankEmpty => "BANK_EMPTY",
            GameError::NoSuchOffer => "NO_SUCH_OFFER",
            GameError::OfferClosed => "OFFER_CLOSED",
            GameError::CannotAcceptOwnOffer => "CANNOT_ACCEPT_OWN_OFFER",
            GameError::NotForYou => "NOT_FOR_YOU",
            GameError::AlreadyRejected => "ALREADY_REJECTED",
            GameError::DevDeckEmpty => "DEV_DECK_EMPTY",
            GameError::AlreadyPlayedDevCard => "ALREADY_PLAYED_DEV_CARD",
            GameError::BadDevCard => "BAD_DEV_CARD",
            GameError::NoDevCard => "NO_DEV_CARD",
            GameError::BadDevSelection => "BAD_DEV_SELECTION",
            GameError::GameOver => "GAME_OVER",
            GameError::UnknownPlayer => "UNKNOWN_PLAYER",
        }
    }
}

// ==================== Game ====================

/// Everything needed to start a game
#[derive(Debug, Clone)]
pub struct NewGameOptions {
    pub player_ids: Vec<PlayerId>,
    pub preset_id: String,
    pub board_seed: Option<String>,
    pub game_mode: GameMode,
    pub house_rules: Option<HouseRules>,
    pub variants: Variants,
    pub dice_profile: DiceProfile,
}

impl NewGameOptions {
    pub fn new(player_ids: Vec<PlayerId>) -> Self {
        Self {
            player_ids,
            preset_id: crate::presets::DEFAULT_PRESET_ID.to_string(),
            board_seed: None,
            game_mode: GameMode::Classic,
            house_rules: None,
            variants: Variants::default(),
            dice_profile: DiceProfile::Standard,
        }
    }
}

/// The public state of one game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub preset_id: String,
    pub board_seed: Option<String>,
    pub settings: GameSettings,
    #[serde(default)]
    pub variants: Variants,
    #[serde(default)]
    pub dice_profile: DiceProfile,
    pub phase: Phase,
    pub subphase: Subphase,
    pub board: Board,
    pub structures: Structures,
    pub bank: ResourceCounts,
    pub victory_points_to_win: u32,
    pub awards: Awards,
    pub winner_player_id: Option<PlayerId>,
    pub robber_hex_id: String,
    pub robber: Option<RobberState>,
    pub dev_deck: Vec<DevCard>,
    pub dev_discard: Vec<DevCard>,
    pub played_knights_by_player_id: BTreeMap<PlayerId, u32>,
    pub dev_card_played_this_turn: bool,
    pub dev_road_building: Option<DevRoadBuilding>,
    pub turn_order: Vec<PlayerId>,
    pub current_player_index: usize,
    pub turn_number: u32,
    pub setup: SetupState,
    pub last_roll: Option<LastRoll>,
    pub trade_offers: Vec<TradeOffer>,
    #[serde(default)]
    pub event_deck: Vec<EventKind>,
    pub current_event: Option<ActiveEvent>,
    pub log: Vec<LogEntry>,
}

impl Game {
    /// Build a fresh game in the first setup round.
    ///
    /// `player_ids` is the turn order. A `random-balanced` preset without a
    /// seed gets a random one, recorded on the game.
    pub fn new<R: Rng + ?Sized>(
        opts: NewGameOptions,
        rng: &mut R,
        now_ms: u64,
    ) -> Result<Game, BoardError> {
        let board_seed = if opts.preset_id == RANDOM_PRESET_ID {
            Some(
                opts.board_seed
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| random_hex_seed(rng)),
            )
        } else {
            None
        };
        let preset = preset_definition(&opts.preset_id, board_seed.as_deref())?;
        let board = generate(&preset.layout)?;
        let robber_hex_id = board
            .desert_hex_id()
            .ok_or(BoardError::DesertCount(0))?
            .to_string();

        let settings = GameSettings::resolve(opts.game_mode, opts.house_rules);
        let event_seed = board_seed.clone().unwrap_or_else(|| random_hex_seed(rng));
        let event_deck = if opts.variants.event_deck_enabled {
            create_event_deck(&event_seed)
        } else {
            Vec::new()
        };

        let turn_order = opts.player_ids;
        let placement_order: Vec<PlayerId> = turn_order
            .iter()
            .chain(turn_order.iter().rev())
            .copied()
            .collect();

        let mut game = Game {
            preset_id: preset.id,
            board_seed,
            settings,
            variants: opts.variants,
            dice_profile: opts.dice_profile,
            phase: Phase::SetupRound1,
            subphase: Subphase::SetupSettlement,
            board,
            structures: Structures::default(),
            bank: ResourceCounts::full_bank(),
            victory_points_to_win: settings.victory_points_to_win,
            awards: Awards::default(),
            winner_player_id: None,
            robber_hex_id,
            robber: None,
            dev_deck: DevCard::shuffled_deck(rng),
            dev_discard: Vec::new(),
            played_knights_by_player_id: turn_order.iter().map(|p| (*p, 0)).collect(),
            dev_card_played_this_turn: false,
            dev_road_building: None,
            turn_order,
            current_player_index: 0,
            turn_number: 1,
            setup: SetupState {
                placement_order,
                ..SetupState::default()
            },
            last_roll: None,
            trade_offers: Vec::new(),
            event_deck,
            current_event: None,
            log: Vec::new(),
        };
        let entry = LogEntry::new(rng, now_ms, LogKind::System, None, "Game started.", Value::Null);
        game.push_log(entry);
        Ok(game)
    }

    pub fn push_log(&mut self, entry: LogEntry) {
        self.log.push(entry);
        if self.log.len() > LOG_MAX_ENTRIES {
            let excess = self.log.len() - LOG_TRIM_TO;
            self.log.drain(..excess);
        }
    }

    /// Whose move it is: the placement slot during setup, else the turn holder
    pub fn current_player_id(&self) -> Option<PlayerId> {
        if self.phase.is_setup() {
            return self
                .setup
                .placement_order
                .get(self.setup.placement_index)
                .copied();
        }
        self.turn_order.get(self.current_player_index).copied()
    }

    pub fn is_over(&self) -> bool {
        self.phase == Phase::GameOver
    }

    pub fn has_player(&self, player: &PlayerId) -> bool {
        self.turn_order.contains(player)
    }

    pub(crate) fn end_game(&mut self, winner: Option<PlayerId>) {
        self.phase = Phase::GameOver;
        self.subphase = Subphase::GameOver;
        self.winner_player_id = winner;
        self.robber = None;
        self.dev_road_building = None;
    }

    // ==================== Pieces ====================

    pub fn count_roads(&self, player: PlayerId) -> usize {
        self.structures
            .roads
            .values()
            .filter(|r| r.player_id == player)
            .count()
    }

    fn count_structures(&self, player: PlayerId, kind: StructureKind) -> usize {
        self.structures
            .settlements
            .values()
            .filter(|s| s.player_id == player && s.kind == kind)
            .count()
    }

    pub fn count_settlements(&self, player: PlayerId) -> usize {
        self.count_structures(player, StructureKind::Settlement)
    }

    pub fn count_cities(&self, player: PlayerId) -> usize {
        self.count_structures(player, StructureKind::City)
    }

    /// Public points: buildings plus awards. Hidden victory point cards excluded.
    pub fn public_points(&self, player: PlayerId) -> u32 {
        let buildings: u32 = self
            .structures
            .settlements
            .values()
            .filter(|s| s.player_id == player)
            .map(|s| s.kind.weight())
            .sum();
        let mut points = buildings;
        if self.awards.longest_road_player_id == Some(player) {
            points += 2;
        }
        if self.awards.largest_army_player_id == Some(player) {
            points += 2;
        }
        points
    }

    pub fn points_by_player_id(&self) -> BTreeMap<PlayerId, u32> {
        self.turn_order
            .iter()
            .map(|p| (*p, self.public_points(*p)))
            .collect()
    }

    // ==================== Placement Rules ====================

    /// Empty vertex with no building on a neighbouring vertex
    pub fn is_legal_setup_settlement(&self, vertex_id: &str) -> bool {
        let Some(vertex) = self.board.vertex(vertex_id) else {
            return false;
        };
        if self.structures.settlements.contains_key(vertex_id) {
            return false;
        }
        vertex
            .neighbor_vertex_ids
            .iter()
            .all(|n| !self.structures.settlements.contains_key(n))
    }

    pub fn legal_setup_settlement_vertex_ids(&self) -> Vec<String> {
        self.board
            .vertices
            .iter()
            .filter(|v| self.is_legal_setup_settlement(&v.id))
            .map(|v| v.id.clone())
            .collect()
    }

    /// Free edges touching the settlement just placed
    pub fn legal_setup_road_edge_ids(&self) -> Vec<String> {
        let Some(vertex) = self
            .setup
            .last_settlement_vertex_id
            .as_deref()
            .and_then(|v| self.board.vertex(v))
        else {
            return Vec::new();
        };
        vertex
            .edge_ids
            .iter()
            .filter(|e| !self.structures.roads.contains_key(*e))
            .cloned()
            .collect()
    }

    /// A road may extend from an own building, or from an own road end that
    /// no opponent building occupies.
    fn connects_at(&self, player: PlayerId, vertex_id: &str) -> bool {
        if let Some(s) = self.structures.settlements.get(vertex_id) {
            return s.player_id == player;
        }
        self.board.vertex(vertex_id).is_some_and(|v| {
            v.edge_ids.iter().any(|e| {
                self.structures
                    .roads
                    .get(e)
                    .is_some_and(|r| r.player_id == player)
            })
        })
    }

    pub fn is_legal_road(&self, player: PlayerId, edge_id: &str) -> bool {
        let Some(edge) = self.board.edge(edge_id) else {
            return false;
        };
        if self.structures.roads.contains_key(edge_id) {
            return false;
        }
        edge.endpoints().iter().any(|v| self.connects_at(player, v))
    }

    pub fn legal_road_edge_ids(&self, player: PlayerId) -> Vec<String> {
        self.board
            .edges
            .iter()
            .filter(|e| self.is_legal_road(player, &e.id))
            .map(|e| e.id.clone())
            .collect()
    }

    pub fn is_legal_settlement(&self, player: PlayerId, vertex_id: &str) -> bool {
        if !self.is_legal_setup_settlement(vertex_id) {
            return false;
        }
        self.board.vertex(vertex_id).is_some_and(|v| {
            v.edge_ids.iter().any(|e| {
                self.structures
                    .roads
                    .get(e)
                    .is_some_and(|r| r.player_id == player)
            })
        })
    }

    pub fn legal_settlement_vertex_ids(&self, player: PlayerId) -> Vec<String> {
        self.board
            .vertices
            .iter()
            .filter(|v| self.is_legal_settlement(player, &v.id))
            .map(|v| v.id.clone())
            .collect()
    }

    /// Own settlements that could become cities
    pub fn legal_city_vertex_ids(&self, player: PlayerId) -> Vec<String> {
        self.structures
            .settlements
            .iter()
            .filter(|(_, s)| s.player_id == player && s.kind == StructureKind::Settlement)
            .map(|(v, _)| v.clone())
            .collect()
    }

    /// The robber must move somewhere new
    pub fn legal_robber_hex_ids(&self) -> Vec<String> {
        self.board
            .hexes
            .iter()
            .filter(|h| h.id != self.robber_hex_id)
            .map(|h| h.id.clone())
            .collect()
    }

    /// Owners of buildings on a hex's corners, in corner order, without the
    /// actor and without anyone no longer in the game
    pub fn robber_victims(&self, hex_id: &str, actor: PlayerId) -> Vec<PlayerId> {
        let Some(hex) = self.board.hex(hex_id) else {
            return Vec::new();
        };
        let mut victims = Vec::new();
        for v in &hex.corner_vertex_ids {
            if let Some(s) = self.structures.settlements.get(v) {
                if s.player_id != actor
                    && !victims.contains(&s.player_id)
                    && self.has_player(&s.player_id)
                {
                    victims.push(s.player_id);
                }
            }
        }
        victims
    }

    // ==================== Trading ====================

    /// Bank ratio for giving `resource`: 4, 3 with a generic port, 2 with a
    /// matching port. A market boom forces 3 for everything.
    pub fn bank_trade_ratio(&self, player: PlayerId, resource: Resource) -> u32 {
        if self.active_event() == Some(EventKind::MarketBoom) {
            return 3;
        }
        let mut ratio = 4;
        for (vertex_id, s) in &self.structures.settlements {
            if s.player_id != player {
                continue;
            }
            for port in self.board.ports_at(vertex_id) {
                let applies = match port.kind {
                    PortKind::Generic => true,
                    kind => kind.resource() == Some(resource),
                };
                if applies {
                    ratio = ratio.min(port.ratio);
                }
            }
        }
        ratio
    }

    pub fn bank_trade_ratios(&self, player: PlayerId) -> BTreeMap<Resource, u32> {
        Resource::ALL
            .into_iter()
            .map(|r| (r, self.bank_trade_ratio(player, r)))
            .collect()
    }

    pub fn offer(&self, id: Uuid) -> Option<&TradeOffer> {
        self.trade_offers.iter().find(|o| o.id == id)
    }

    pub fn active_event(&self) -> Option<EventKind> {
        self.current_event.as_ref().map(|e| e.id)
    }
}

fn random_hex_seed<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("{:016x}", rng.gen::<u64>())
}
