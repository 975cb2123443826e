//! Request errors and their wire envelope.

use hexlands_core::{BoardError, GameError};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Everything a request can fail with. Engine rule violations pass through
/// unchanged in [`ApiError::Game`].
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("request is not valid JSON")]
    BadJson,

    #[error("malformed request: {0}")]
    BadPayload(String),

    #[error("request exceeds {max_bytes} bytes")]
    PayloadTooLarge { max_bytes: usize },

    #[error("rate limited")]
    RateLimited,

    #[error("room not found")]
    RoomNotFound,

    #[error("unknown player id")]
    UnknownPlayerId,

    #[error("missing player name")]
    MissingPlayerName,

    #[error("player name contains control characters")]
    BadPlayerName,

    #[error("game already started")]
    GameAlreadyStarted,

    #[error("game not started")]
    GameNotStarted,

    #[error("game not over")]
    GameNotOver,

    #[error("room is full ({max_players} players)")]
    RoomFull { max_players: u32 },

    #[error("only the host can do that")]
    OnlyHost,

    #[error("need {min_players}..={max_players} ready players")]
    CantStartRoom { min_players: u32, max_players: u32 },

    #[error("bad admin secret")]
    BadAdminSecret,

    #[error("host PIN required")]
    HostPinRequired,

    #[error("bad host PIN")]
    BadHostPin,

    #[error("unknown preset")]
    BadPreset,

    #[error("unknown scenario")]
    BadScenario,

    #[error("unknown theme")]
    BadTheme,

    #[error("unknown game mode")]
    BadGameMode,

    #[error("max players must be 3..=6")]
    BadMaxPlayers,

    #[error("room already has {players} players")]
    MaxPlayersTooLow { players: u32 },

    #[error("invalid house rules")]
    BadHouseRules,

    #[error("victory points out of range")]
    BadVictoryPointsToWin,

    #[error("board seed only applies to the random preset")]
    BoardSeedNotApplicable,

    #[error("invalid action id")]
    BadActionId,

    #[error("unknown target player id")]
    UnknownTargetPlayerId,

    #[error("reset needs confirm: true")]
    ConfirmResetRequired,

    #[error("emotes are disabled")]
    EmotesDisabled,

    #[error("unknown emote")]
    BadEmote,

    #[error("emote cooldown")]
    EmoteCooldown,

    #[error("not subscribed to that room")]
    NotSubscribed,

    #[error(transparent)]
    Game(#[from] GameError),

    /// Board generation failed for the room's preset
    #[error(transparent)]
    Board(#[from] BoardError),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadJson => "BAD_JSON",
            ApiError::BadPayload(_) => "BAD_PAYLOAD",
            ApiError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            ApiError::RateLimited => "RATE_LIMITED",
            ApiError::RoomNotFound => "ROOM_NOT_FOUND",
            ApiError::UnknownPlayerId => "UNKNOWN_PLAYER_ID",
            ApiError::MissingPlayerName => "MISSING_PLAYER_NAME",
            ApiError::BadPlayerName => "BAD_PLAYER_NAME",
            ApiError::GameAlreadyStarted => "GAME_ALREADY_STARTED",
            ApiError::GameNotStarted => "GAME_NOT_STARTED",
            ApiError::GameNotOver => "GAME_NOT_OVER",
            ApiError::RoomFull { .. } => "ROOM_FULL",
            ApiError::OnlyHost => "ONLY_HOST",
            ApiError::CantStartRoom { .. } => "CANT_START_ROOM",
            ApiError::BadAdminSecret => "BAD_ADMIN_SECRET",
            ApiError::HostPinRequired => "HOST_PIN_REQUIRED",
            ApiError::BadHostPin => "BAD_HOST_PIN",
            ApiError::BadPreset | ApiError::Board(_) => "BAD_PRESET",
            ApiError::BadScenario => "BAD_SCENARIO",
            ApiError::BadTheme => "BAD_THEME",
            ApiError::BadGameMode => "BAD_GAME_MODE",
            ApiError::BadMaxPlayers => "BAD_MAX_PLAYERS",
            ApiError::MaxPlayersTooLow { .. } => "MAX_PLAYERS_TOO_LOW",
            ApiError::BadHouseRules => "BAD_HOUSE_RULES",
            ApiError::BadVictoryPointsToWin => "BAD_VICTORY_POINTS_TO_WIN",
            ApiError::BoardSeedNotApplicable => "BOARD_SEED_NOT_APPLICABLE",
            ApiError::BadActionId => "BAD_ACTION_ID",
            ApiError::UnknownTargetPlayerId => "UNKNOWN_TARGET_PLAYER_ID",
            ApiError::ConfirmResetRequired => "CONFIRM_RESET_REQUIRED",
            ApiError::EmotesDisabled => "EMOTES_DISABLED",
            ApiError::BadEmote => "BAD_EMOTE",
            ApiError::EmoteCooldown => "EMOTE_COOLDOWN",
            ApiError::NotSubscribed => "NOT_SUBSCRIBED",
            ApiError::Game(e) => e.code(),
        }
    }

    /// HTTP-like status class
    pub fn status(&self) -> u16 {
        match self {
            ApiError::RoomNotFound => 404,
            ApiError::PayloadTooLarge { .. } => 413,
            ApiError::RateLimited | ApiError::EmoteCooldown => 429,
            ApiError::UnknownPlayerId
            | ApiError::GameAlreadyStarted
            | ApiError::GameNotStarted
            | ApiError::GameNotOver
            | ApiError::RoomFull { .. }
            | ApiError::OnlyHost
            | ApiError::CantStartRoom { .. }
            | ApiError::BadAdminSecret
            | ApiError::HostPinRequired
            | ApiError::BadHostPin
            | ApiError::EmotesDisabled
            | ApiError::NotSubscribed => 403,
            ApiError::Board(_) => 500,
            _ => 400,
        }
    }

    pub fn data(&self) -> Option<Value> {
        match self {
            ApiError::PayloadTooLarge { max_bytes } => Some(json!({ "maxBytes": max_bytes })),
            ApiError::RoomFull { max_players } => Some(json!({ "maxPlayers": max_players })),
            ApiError::CantStartRoom {
                min_players,
                max_players,
            } => Some(json!({ "minPlayers": min_players, "maxPlayers": max_players })),
            ApiError::MaxPlayersTooLow { players } => Some(json!({ "players": players })),
            ApiError::BadPayload(detail) => Some(json!({ "detail": detail })),
            _ => None,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code(),
            message: human_text(self.code(), self.data().as_ref()),
            data: self.data(),
        }
    }
}

/// The `error` object of a failed reply
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

pub const FALLBACK_TEXT: &str = "Something went wrong. Please try again.";

/// Short sentence for a wire code, suitable for showing to a player.
pub fn human_text(code: &str, data: Option<&Value>) -> String {
    let max_players = data
        .and_then(|d| d.get("maxPlayers"))
        .and_then(Value::as_u64);
    let text = match code {
        "NOT_YOUR_TURN" => "Not your turn.",
        "BAD_PHASE" => "You can't do that right now.",
        "BAD_VERTEX" | "BAD_EDGE" | "BAD_HEX" => "That spot doesn't exist.",
        "ILLEGAL_PLACEMENT" => "That placement isn't legal.",
        "EDGE_OCCUPIED" => "There's already a road there.",
        "OUT_OF_PIECES_ROAD" => "Out of roads (15 max).",
        "OUT_OF_PIECES_SETTLEMENT" => "Out of settlements (5 max).",
        "OUT_OF_PIECES_CITY" => "Out of cities (4 max).",
        "NO_SETTLEMENT" => "You need a settlement there first.",
        "NOT_YOURS" => "That isn't yours.",
        "ALREADY_CITY" => "That's already a city.",
        "NOT_ENOUGH_RESOURCES" => "Not enough resources.",
        "NO_DISCARD_REQUIRED" => "You don't need to discard.",
        "ALREADY_DISCARDED" => "You already discarded.",
        "BAD_DISCARD" => "Discard exactly half your cards.",
        "ILLEGAL_TARGET" => "Pick a different target.",
        "BAD_TRADE" => "That trade doesn't work.",
        "BAD_TRADE_TO" => "Pick who to trade with.",
        "BANK_EMPTY" => "Bank is out of that resource.",
        "NO_SUCH_OFFER" => "That offer is gone.",
        "OFFER_CLOSED" => "That offer is closed.",
        "CANNOT_ACCEPT_OWN_OFFER" => "You can't accept your own offer.",
        "NOT_FOR_YOU" => "That offer isn't for you.",
        "ALREADY_REJECTED" => "You already passed on that offer.",
        "DEV_DECK_EMPTY" => "No development cards left.",
        "ALREADY_PLAYED_DEV_CARD" => "Only one development card per turn.",
        "BAD_DEV_CARD" => "You can't play that card now.",
        "NO_DEV_CARD" => "You don't have that card.",
        "BAD_DEV_SELECTION" => "Pick resources for that card.",
        "GAME_OVER" => "The game is over.",
        "UNKNOWN_PLAYER" => "You're not in this game.",
        "BAD_JSON" | "BAD_PAYLOAD" => "That didn't send right. Try again.",
        "PAYLOAD_TOO_LARGE" => "That request was too large.",
        "RATE_LIMITED" => "Too many requests. Try again.",
        "ROOM_NOT_FOUND" => "Room not found.",
        "UNKNOWN_PLAYER_ID" => "You're not in this room. Rejoin to play.",
        "MISSING_PLAYER_NAME" => "Enter a name.",
        "BAD_PLAYER_NAME" => "That name can't be used.",
        "GAME_ALREADY_STARTED" => "Game in progress. New players can't join mid-game.",
        "GAME_NOT_STARTED" => "The game hasn't started.",
        "GAME_NOT_OVER" => "The game isn't over yet.",
        "ROOM_FULL" => {
            return match max_players {
                Some(n) => format!("Room is full (max {n} players)."),
                None => "Room is full.".to_string(),
            }
        }
        "ONLY_HOST" => "Only the host can do that.",
        "CANT_START_ROOM" => {
            return format!(
                "Need 3 to {} players and everyone ready.",
                max_players.unwrap_or(6)
            )
        }
        "BAD_ADMIN_SECRET" => "Admin access denied.",
        "HOST_PIN_REQUIRED" => "Host PIN required.",
        "BAD_HOST_PIN" => "Bad host PIN.",
        "BAD_PRESET" => "Unknown board preset.",
        "BAD_SCENARIO" => "Unknown scenario.",
        "BAD_THEME" => "Unknown theme.",
        "BAD_GAME_MODE" => "Unknown game mode.",
        "BAD_MAX_PLAYERS" => "Pick 3 to 6 players.",
        "MAX_PLAYERS_TOO_LOW" => "More players have already joined.",
        "BAD_HOUSE_RULES" => "Those house rules aren't valid.",
        "BAD_VICTORY_POINTS_TO_WIN" => "Victory points must be 6 to 15.",
        "BOARD_SEED_NOT_APPLICABLE" => "Seeds only apply to the random board.",
        "BAD_ACTION_ID" => "That didn't send right. Try again.",
        "UNKNOWN_TARGET_PLAYER_ID" => "That player isn't in this room.",
        "CONFIRM_RESET_REQUIRED" => "Confirm the reset first.",
        "EMOTES_DISABLED" => "Emotes are off for this room.",
        "BAD_EMOTE" => "Unknown emote.",
        "EMOTE_COOLDOWN" => "Slow down a little.",
        "NOT_SUBSCRIBED" => "Not connected to that room.",
        _ => FALLBACK_TEXT,
    };
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_errors_keep_engine_code() {
        let err = ApiError::from(GameError::NotEnoughResources);
        assert_eq!(err.code(), "NOT_ENOUGH_RESOURCES");
        assert_eq!(err.status(), 400);
        assert_eq!(err.body().message, "Not enough resources.");
    }

    #[test]
    fn test_status_classes() {
        assert_eq!(ApiError::RoomNotFound.status(), 404);
        assert_eq!(ApiError::OnlyHost.status(), 403);
        assert_eq!(ApiError::PayloadTooLarge { max_bytes: 10 }.status(), 413);
        assert_eq!(ApiError::RateLimited.status(), 429);
        assert_eq!(ApiError::BadEmote.status(), 400);
    }

    #[test]
    fn test_room_full_carries_limit() {
        let body = ApiError::RoomFull { max_players: 5 }.body();
        assert_eq!(body.code, "ROOM_FULL");
        assert_eq!(body.data, Some(json!({ "maxPlayers": 5 })));
        assert_eq!(body.message, "Room is full (max 5 players).");
    }

    #[test]
    fn test_unknown_code_falls_back() {
        assert_eq!(human_text("SOMETHING_NEW", None), FALLBACK_TEXT);
    }

    #[test]
    fn test_every_engine_code_has_text() {
        let errors = [
            GameError::NotYourTurn,
            GameError::BadPhase,
            GameError::IllegalPlacement,
            GameError::BankEmpty,
            GameError::AlreadyPlayedDevCard,
            GameError::UnknownPlayer,
        ];
        for err in errors {
            assert_ne!(human_text(err.code(), None), FALLBACK_TEXT, "{}", err.code());
        }
    }
}
