//! Game actions that players can submit.
//!
//! The wire form is a JSON object tagged by `type`, e.g.
//! `{"type": "BUILD_ROAD", "edgeId": "E12"}`. Each variant carries only the
//! fields that action needs, so malformed payloads are rejected at
//! deserialization before they reach the engine.

use crate::game::PlayerId;
use crate::private::DevCard;
use crate::resources::{Resource, ResourceCounts};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// All possible actions a player can take
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Action {
    // ==================== Setup Phase ====================
    /// Place a setup settlement
    PlaceSettlement { vertex_id: String },
    /// Place a setup road touching the settlement just placed
    PlaceRoad { edge_id: String },

    // ==================== Turn Actions ====================
    RollDice,
    EndTurn,

    // ==================== Building Actions (Main Phase) ====================
    BuildRoad { edge_id: String },
    BuildSettlement { vertex_id: String },
    BuildCity { vertex_id: String },
    BuyDevCard,

    // ==================== Development Card Actions ====================
    /// `take` is used by year of plenty, `resource_type` by monopoly
    PlayDevCard {
        card: DevCard,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        take: Option<ResourceCounts>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resource_type: Option<Resource>,
    },
    /// Place one of the free roads granted by road building
    DevRoadBuildingPlaceRoad { edge_id: String },

    // ==================== Robber Actions ====================
    DiscardCards { counts: ResourceCounts },
    MoveRobber { hex_id: String },
    StealCard { from_player_id: PlayerId },

    // ==================== Trading Actions ====================
    BankTrade {
        give: ResourceCounts,
        receive: ResourceCounts,
    },
    TradeOfferCreate {
        #[serde(default)]
        to: TradeTarget,
        give: ResourceCounts,
        want: ResourceCounts,
    },
    TradeOfferCancel { offer_id: Uuid },
    TradeOfferRespond {
        offer_id: Uuid,
        response: OfferResponse,
    },
}

impl Action {
    /// The wire name of this action's `type`
    pub fn kind(&self) -> &'static str {
        match self {
            Action::PlaceSettlement { .. } => "PLACE_SETTLEMENT",
            Action::PlaceRoad { .. } => "PLACE_ROAD",
            Action::RollDice => "ROLL_DICE",
            Action::EndTurn => "END_TURN",
            Action::BuildRoad { .. } => "BUILD_ROAD",
            Action::BuildSettlement { .. } => "BUILD_SETTLEMENT",
            Action::BuildCity { .. } => "BUILD_CITY",
            Action::BuyDevCard => "BUY_DEV_CARD",
            Action::PlayDevCard { .. } => "PLAY_DEV_CARD",
            Action::DevRoadBuildingPlaceRoad { .. } => "DEV_ROAD_BUILDING_PLACE_ROAD",
            Action::DiscardCards { .. } => "DISCARD_CARDS",
            Action::MoveRobber { .. } => "MOVE_ROBBER",
            Action::StealCard { .. } => "STEAL_CARD",
            Action::BankTrade { .. } => "BANK_TRADE",
            Action::TradeOfferCreate { .. } => "TRADE_OFFER_CREATE",
            Action::TradeOfferCancel { .. } => "TRADE_OFFER_CANCEL",
            Action::TradeOfferRespond { .. } => "TRADE_OFFER_RESPOND",
        }
    }

    /// Actions a player may submit when it is not their turn
    pub fn allowed_out_of_turn(&self) -> bool {
        matches!(
            self,
            Action::DiscardCards { .. } | Action::TradeOfferRespond { .. }
        )
    }
}

/// Who a trade offer is addressed to. Serialized as `"all"` or a player id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TradeTarget {
    #[default]
    All,
    Player(PlayerId),
}

impl TradeTarget {
    pub fn includes(&self, player: &PlayerId) -> bool {
        match self {
            TradeTarget::All => true,
            TradeTarget::Player(p) => p == player,
        }
    }
}

impl TryFrom<String> for TradeTarget {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == "all" {
            return Ok(TradeTarget::All);
        }
        Uuid::parse_str(&value)
            .map(TradeTarget::Player)
            .map_err(|_| format!("invalid trade target {value:?}"))
    }
}

impl From<TradeTarget> for String {
    fn from(target: TradeTarget) -> Self {
        target.to_string()
    }
}

impl fmt::Display for TradeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeTarget::All => f.write_str("all"),
            TradeTarget::Player(p) => write!(f, "{p}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferResponse {
    Accept,
    Reject,
}
