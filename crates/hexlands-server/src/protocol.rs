//! WebSocket protocol messages for Hexlands.
//!
//! Every client message is a JSON object tagged by `type` with its fields in
//! `payload`, plus an optional top-level `requestId` that is echoed back on
//! the single `reply` each request receives. Subscribed connections also get
//! `state`, `emote` and `ping` pushes on the same socket.

use hexlands_core::{PlayerId, PrivateSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::room::RoomSnapshot;

/// Which stream a subscriber wants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Viewer,
    Player,
}

/// Messages sent from client to server.
#[derive(Debug, Clone, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    Ping,
    Health,
    Catalog,

    CreateRoom,
    GetRoom {
        room_code: String,
    },
    Join {
        room_code: String,
        player_name: Option<String>,
        player_id: Option<PlayerId>,
    },
    Ready {
        room_code: String,
        player_id: PlayerId,
        ready: bool,
    },

    /// Applies a bundled scenario. Host with PIN, or the admin secret.
    Settings {
        room_code: String,
        scenario_id: String,
        player_id: Option<PlayerId>,
        admin_secret: Option<String>,
        host_pin: Option<String>,
    },
    Preset {
        room_code: String,
        player_id: PlayerId,
        host_pin: Option<String>,
        preset_id: String,
    },
    BoardSeed {
        room_code: String,
        player_id: PlayerId,
        host_pin: Option<String>,
        board_seed: Option<String>,
    },
    Mode {
        room_code: String,
        player_id: PlayerId,
        host_pin: Option<String>,
        game_mode: String,
    },
    /// Raw so out-of-range values can get their own error code
    HouseRules {
        room_code: String,
        player_id: PlayerId,
        host_pin: Option<String>,
        house_rules: Value,
    },
    MaxPlayers {
        room_code: String,
        player_id: PlayerId,
        host_pin: Option<String>,
        max_players: i64,
    },
    Theme {
        room_code: String,
        player_id: PlayerId,
        host_pin: Option<String>,
        theme_id: String,
    },
    HostPin {
        room_code: String,
        player_id: PlayerId,
        host_pin: Option<String>,
        next_host_pin: Option<String>,
    },
    Start {
        room_code: String,
        player_id: PlayerId,
        host_pin: Option<String>,
    },
    Rematch {
        room_code: String,
        player_id: PlayerId,
        host_pin: Option<String>,
    },

    /// A game move. `action` is decoded after the idempotency check so a
    /// malformed retry replays the same rejection.
    Action {
        room_code: String,
        player_id: PlayerId,
        action_id: Option<String>,
        action: Value,
    },
    Emote {
        room_code: String,
        player_id: PlayerId,
        emote: String,
    },

    AdminKick {
        room_code: String,
        admin_secret: String,
        host_pin: Option<String>,
        target_player_id: PlayerId,
    },
    AdminHost {
        room_code: String,
        admin_secret: String,
        host_pin: Option<String>,
        host_player_id: PlayerId,
    },
    AdminReset {
        room_code: String,
        admin_secret: String,
        host_pin: Option<String>,
        #[serde(default)]
        confirm: bool,
    },
    AdminTimer {
        room_code: String,
        admin_secret: String,
        host_pin: Option<String>,
        paused: bool,
    },
    AdminExport {
        room_code: String,
        admin_secret: String,
        host_pin: Option<String>,
    },

    Subscribe {
        room_code: String,
        role: Role,
        player_id: Option<PlayerId>,
    },
    Unsubscribe {
        room_code: String,
    },
}

impl ClientMessage {
    /// Room the message addresses, if any
    pub fn room_code(&self) -> Option<&str> {
        use ClientMessage::*;
        match self {
            Ping | Health | Catalog | CreateRoom => None,
            GetRoom { room_code }
            | Join { room_code, .. }
            | Ready { room_code, .. }
            | Settings { room_code, .. }
            | Preset { room_code, .. }
            | BoardSeed { room_code, .. }
            | Mode { room_code, .. }
            | HouseRules { room_code, .. }
            | MaxPlayers { room_code, .. }
            | Theme { room_code, .. }
            | HostPin { room_code, .. }
            | Start { room_code, .. }
            | Rematch { room_code, .. }
            | Action { room_code, .. }
            | Emote { room_code, .. }
            | AdminKick { room_code, .. }
            | AdminHost { room_code, .. }
            | AdminReset { room_code, .. }
            | AdminTimer { room_code, .. }
            | AdminExport { room_code, .. }
            | Subscribe { room_code, .. }
            | Unsubscribe { room_code } => Some(room_code.as_str()),
        }
    }
}

/// Room codes are matched case-insensitively
pub fn normalize_room_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// A decoded request: the echoed request id plus the message or why it failed
#[derive(Debug)]
pub struct Request {
    pub request_id: Option<String>,
    pub message: Result<ClientMessage, ApiError>,
}

/// Parse one text frame. Invalid JSON is `BAD_JSON`; valid JSON of the wrong
/// shape is `BAD_PAYLOAD`, and still echoes the request id when present.
pub fn parse_request(text: &str) -> Request {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => {
            return Request {
                request_id: None,
                message: Err(ApiError::BadJson),
            }
        }
    };
    let request_id = value
        .get("requestId")
        .and_then(Value::as_str)
        .map(str::to_owned);
    let message =
        serde_json::from_value(value).map_err(|e| ApiError::BadPayload(e.to_string()));
    Request {
        request_id,
        message,
    }
}

/// Ephemeral reaction pushed to everyone in the room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmoteEvent {
    pub at: u64,
    pub player_id: PlayerId,
    pub name: String,
    pub color: String,
    pub emote: String,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Answer to exactly one request
    Reply(Reply),

    /// Full room snapshot after a change
    State {
        room: Box<RoomSnapshot>,
        #[serde(skip_serializing_if = "Option::is_none")]
        you: Option<PrivateSnapshot>,
    },

    Emote(EmoteEvent),

    /// Keepalive push
    Ping { at: u64 },
}

/// `{ok:true, ...}` or `{ok:false, error}` plus a status class
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub status: u16,
    pub body: Value,
}

impl Reply {
    /// Success. `fields` must be a JSON object; `ok: true` is merged in.
    pub fn ok(fields: Value) -> Self {
        let mut body = match fields {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        body.insert("ok".to_string(), Value::Bool(true));
        Self {
            request_id: None,
            status: 200,
            body: Value::Object(body),
        }
    }

    pub fn error(err: &ApiError) -> Self {
        Self {
            request_id: None,
            status: err.status(),
            body: serde_json::json!({ "ok": false, "error": err.body() }),
        }
    }

    pub fn from_result(result: Result<Value, ApiError>) -> Self {
        match result {
            Ok(fields) => Self::ok(fields),
            Err(err) => Self::error(&err),
        }
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.body.get("ok") == Some(&Value::Bool(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_parse_join() {
        let req = parse_request(
            r#"{"requestId":"r1","type":"join","payload":{"roomCode":"abcde","playerName":"Ada"}}"#,
        );
        assert_eq!(req.request_id.as_deref(), Some("r1"));
        match req.message.unwrap() {
            ClientMessage::Join {
                room_code,
                player_name,
                player_id,
            } => {
                assert_eq!(room_code, "abcde");
                assert_eq!(player_name.as_deref(), Some("Ada"));
                assert!(player_id.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_unit_message() {
        let req = parse_request(r#"{"type":"ping"}"#);
        assert!(matches!(req.message, Ok(ClientMessage::Ping)));
        assert!(req.request_id.is_none());
    }

    #[test]
    fn test_bad_json_vs_bad_payload() {
        let req = parse_request("{nope");
        assert_eq!(req.message.unwrap_err().code(), "BAD_JSON");

        let req = parse_request(r#"{"requestId":"r2","type":"ready","payload":{"roomCode":"X"}}"#);
        assert_eq!(req.request_id.as_deref(), Some("r2"));
        assert_eq!(req.message.unwrap_err().code(), "BAD_PAYLOAD");
    }

    #[test]
    fn test_malformed_player_id_is_bad_payload() {
        let req = parse_request(
            r#"{"type":"ready","payload":{"roomCode":"X","playerId":"not-a-uuid","ready":true}}"#,
        );
        assert_eq!(req.message.unwrap_err().code(), "BAD_PAYLOAD");
    }

    #[test]
    fn test_room_code_normalized() {
        assert_eq!(normalize_room_code("  abC2d "), "ABC2D");
    }

    #[test]
    fn test_reply_envelopes() {
        let ok = Reply::ok(json!({ "roomCode": "ABCDE" })).with_request_id(Some("7".into()));
        assert!(ok.is_ok());
        assert_eq!(
            serde_json::to_value(ServerMessage::Reply(ok)).unwrap(),
            json!({
                "type": "reply",
                "payload": {
                    "requestId": "7",
                    "status": 200,
                    "body": { "ok": true, "roomCode": "ABCDE" }
                }
            })
        );

        let err = Reply::error(&ApiError::RoomNotFound);
        assert!(!err.is_ok());
        assert_eq!(err.status, 404);
        assert_eq!(err.body["error"]["code"], "ROOM_NOT_FOUND");
    }
}
