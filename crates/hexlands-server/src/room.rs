//! Room management: lobby, host controls, the running game and subscribers.
//!
//! A [`Room`] is only ever touched behind its own mutex, so every method here
//! is plain synchronous code. Engine calls take the current game by
//! reference and the room swaps in the returned game only on success.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use hexlands_core::presets::RANDOM_PRESET_ID;
use hexlands_core::snapshot::{private_snapshot, public_snapshot};
use hexlands_core::{
    apply, apply_deltas, remove_player, Action, DiceProfile, Game, GameMode, HouseRules, LogEntry,
    LogKind, NewGameOptions, Phase, PlayerId, PresetMeta, PrivateSnapshot, PrivateState,
    PrivateStates, PublicGameSnapshot, Subphase, Variants, PRESETS,
};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::catalog::{
    self, Scenario, Theme, DEFAULT_MAX_PLAYERS, DEFAULT_SCENARIO_ID, EMOTES, EMOTE_COOLDOWN_MS,
    MAX_BOARD_SEED_CHARS, MAX_PLAYERS, MAX_PLAYER_NAME_CHARS, MIN_PLAYERS, PLAYER_COLORS,
    ROOM_CODE_ALPHABET, ROOM_CODE_LEN, SCENARIOS, THEMES,
};
use crate::error::ApiError;
use crate::idempotency::IdempotencyCache;
use crate::protocol::{EmoteEvent, Role, ServerMessage};

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub fn generate_room_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Lobby,
    InGame,
}

/// A player seated in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPlayer {
    pub player_id: PlayerId,
    pub name: String,
    pub color: String,
    pub ready: bool,
    pub connected: bool,
    pub joined_at: u64,
    pub last_seen_at: u64,
}

/// Turn clock shown to clients. Restarts whenever the active player changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnTimer {
    pub paused: bool,
    pub paused_at: Option<u64>,
    pub paused_total_ms: u64,
    pub turn_started_at: Option<u64>,
    pub active_player_id: Option<PlayerId>,
}

impl TurnTimer {
    fn track(&mut self, active: Option<PlayerId>, now: u64) {
        if active == self.active_player_id {
            return;
        }
        self.active_player_id = active;
        self.turn_started_at = active.map(|_| now);
        self.paused_total_ms = 0;
        self.paused_at = self.paused.then_some(now);
    }

    fn set_paused(&mut self, paused: bool, now: u64) {
        if paused == self.paused {
            return;
        }
        if paused {
            self.paused_at = Some(now);
        } else if let Some(at) = self.paused_at.take() {
            self.paused_total_ms += now.saturating_sub(at);
        }
        self.paused = paused;
    }

    fn reset(&mut self) {
        *self = TurnTimer {
            paused: self.paused,
            ..TurnTimer::default()
        };
    }
}

/// One connection attached to a room's push stream
#[derive(Debug)]
pub struct Subscriber {
    pub conn_id: u64,
    pub role: Role,
    pub player_id: Option<PlayerId>,
    pub tx: mpsc::UnboundedSender<ServerMessage>,
}

/// A hosted session: lobby plus optional running game.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub room_id: Uuid,
    pub room_code: String,
    pub admin_secret: String,
    pub status: RoomStatus,
    pub host_player_id: Option<PlayerId>,
    pub scenario_id: String,
    pub preset_id: String,
    pub theme_id: String,
    pub board_seed: Option<String>,
    pub game_mode: GameMode,
    pub max_players: u32,
    pub house_rules: Option<HouseRules>,
    pub dice_profile: DiceProfile,
    pub variants: Variants,
    pub host_pin_salt: Option<String>,
    pub host_pin_hash: Option<String>,
    pub created_at: u64,
    pub last_activity_at: u64,
    /// In join order
    pub players: Vec<RoomPlayer>,
    pub private_by_player_id: PrivateStates,
    pub game: Option<Game>,
    pub revision: u64,
    pub timer: TurnTimer,

    #[serde(skip)]
    pub actions: IdempotencyCache,
    #[serde(skip)]
    last_emote_at: HashMap<PlayerId, u64>,
    #[serde(skip)]
    subscribers: Vec<Subscriber>,
    #[serde(skip)]
    disconnect_timers: HashMap<PlayerId, JoinHandle<()>>,
    /// Set once the room is pruned so pending writes skip it
    #[serde(skip)]
    pub deleted: bool,
}

// ==================== Snapshots ====================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub player_id: PlayerId,
    pub name: String,
    pub color: String,
    pub ready: bool,
    pub connected: bool,
    pub is_host: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSettingsView {
    pub scenario_id: String,
    pub game_mode: GameMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub house_rules: Option<HouseRules>,
}

/// Everything any viewer may see about a room. Holds no hands or dev cards.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub server_time_ms: u64,
    pub room_code: String,
    pub revision: u64,
    pub status: RoomStatus,
    pub host_pin_enabled: bool,
    pub host_player_id: Option<PlayerId>,
    pub preset_id: String,
    pub theme_id: String,
    pub board_seed: Option<String>,
    pub game_mode: GameMode,
    pub dice_profile: DiceProfile,
    pub max_players: u32,
    pub variants: Variants,
    pub settings: RoomSettingsView,
    pub timer: TurnTimer,
    pub presets: &'static [PresetMeta],
    pub scenarios: &'static [Scenario],
    pub themes: &'static [Theme],
    pub players: Vec<PlayerView>,
    pub game: Option<PublicGameSnapshot>,
    pub created_at: u64,
    pub last_activity_at: u64,
}

// ==================== Input normalization ====================

/// Trim, cap at 24 chars; control characters are rejected outright.
pub fn normalize_player_name(raw: Option<&str>) -> Result<String, ApiError> {
    let raw = raw.ok_or(ApiError::MissingPlayerName)?;
    if raw.chars().any(char::is_control) {
        return Err(ApiError::BadPlayerName);
    }
    let name: String = raw.trim().chars().take(MAX_PLAYER_NAME_CHARS).collect();
    let name = name.trim_end().to_string();
    if name.is_empty() {
        return Err(ApiError::MissingPlayerName);
    }
    Ok(name)
}

/// Control characters stripped, trimmed, capped at 64 chars; blank is `None`.
pub fn normalize_board_seed(raw: Option<&str>) -> Option<String> {
    let cleaned: String = raw?.chars().filter(|c| !c.is_control()).collect();
    let seed: String = cleaned.trim().chars().take(MAX_BOARD_SEED_CHARS).collect();
    (!seed.is_empty()).then_some(seed)
}

/// Strict decode so out-of-range targets get their own code.
pub fn parse_house_rules(value: &Value) -> Result<Option<HouseRules>, ApiError> {
    let map = match value {
        Value::Null => return Ok(None),
        Value::Object(map) => map,
        _ => return Err(ApiError::BadHouseRules),
    };
    let mut rules = HouseRules::default();
    for (key, v) in map {
        match (key.as_str(), v) {
            (_, Value::Null) => {}
            ("victoryPointsToWin", Value::Number(n)) => {
                let vp = n.as_u64().ok_or(ApiError::BadVictoryPointsToWin)?;
                let vp = u32::try_from(vp).map_err(|_| ApiError::BadVictoryPointsToWin)?;
                rules.victory_points_to_win = Some(vp);
            }
            ("emotesEnabled", Value::Bool(b)) => rules.emotes_enabled = Some(*b),
            _ => return Err(ApiError::BadHouseRules),
        }
    }
    if !rules.is_valid() {
        return Err(ApiError::BadVictoryPointsToWin);
    }
    Ok((!rules.is_empty()).then_some(rules))
}

fn is_pin_shaped(pin: &str) -> bool {
    (4..=8).contains(&pin.len()) && pin.bytes().all(|b| b.is_ascii_digit())
}

fn hash_pin(salt: &str, pin: &str) -> String {
    hex::encode(Sha256::digest(format!("{salt}:{pin}").as_bytes()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ==================== Room ====================

impl Room {
    /// A fresh lobby with the default scenario applied.
    pub fn with_code(room_code: String, now: u64) -> Self {
        let mut room = Self {
            room_id: Uuid::new_v4(),
            room_code,
            admin_secret: Uuid::new_v4().to_string(),
            status: RoomStatus::Lobby,
            host_player_id: None,
            scenario_id: String::new(),
            preset_id: String::new(),
            theme_id: String::new(),
            board_seed: None,
            game_mode: GameMode::Classic,
            max_players: DEFAULT_MAX_PLAYERS,
            house_rules: None,
            dice_profile: DiceProfile::Standard,
            variants: Variants::default(),
            host_pin_salt: None,
            host_pin_hash: None,
            created_at: now,
            last_activity_at: now,
            players: Vec::new(),
            private_by_player_id: PrivateStates::new(),
            game: None,
            revision: 0,
            timer: TurnTimer::default(),
            actions: IdempotencyCache::default(),
            last_emote_at: HashMap::new(),
            subscribers: Vec::new(),
            disconnect_timers: HashMap::new(),
            deleted: false,
        };
        let default = catalog::scenario(DEFAULT_SCENARIO_ID).unwrap_or(&SCENARIOS[0]);
        room.apply_scenario(default);
        room
    }

    fn apply_scenario(&mut self, scenario: &Scenario) {
        self.scenario_id = scenario.id.to_string();
        self.preset_id = scenario.preset_id.to_string();
        self.game_mode = scenario.game_mode;
        self.theme_id = scenario.theme_id.to_string();
        self.dice_profile = scenario.dice_profile;
        self.variants = scenario.variants();
        if self.preset_id != RANDOM_PRESET_ID {
            self.board_seed = None;
        }
    }

    pub fn player(&self, id: PlayerId) -> Option<&RoomPlayer> {
        self.players.iter().find(|p| p.player_id == id)
    }

    fn player_mut(&mut self, id: PlayerId) -> Option<&mut RoomPlayer> {
        self.players.iter_mut().find(|p| p.player_id == id)
    }

    pub fn is_host(&self, id: PlayerId) -> bool {
        self.host_player_id == Some(id)
    }

    pub fn host_pin_enabled(&self) -> bool {
        self.host_pin_hash.is_some()
    }

    /// Keep a connected host; otherwise hand the role to the earliest
    /// connected player. With nobody connected a seated host stays.
    fn reassign_host(&mut self) {
        let host_connected = self
            .host_player_id
            .and_then(|id| self.player(id))
            .map(|p| p.connected);
        if host_connected == Some(true) {
            return;
        }
        if let Some(next) = self.players.iter().find(|p| p.connected) {
            self.host_player_id = Some(next.player_id);
            return;
        }
        if host_connected.is_none() {
            self.host_player_id = self.players.first().map(|p| p.player_id);
        }
    }

    fn pick_color(&self) -> String {
        PLAYER_COLORS
            .iter()
            .find(|c| !self.players.iter().any(|p| p.color == **c))
            .unwrap_or(&PLAYER_COLORS[self.players.len() % PLAYER_COLORS.len()])
            .to_string()
    }

    fn active_player(&self) -> Option<PlayerId> {
        match (&self.status, &self.game) {
            (RoomStatus::InGame, Some(game)) if !game.is_over() => game.current_player_id(),
            _ => None,
        }
    }

    fn require_lobby(&self) -> Result<(), ApiError> {
        if self.status != RoomStatus::Lobby {
            return Err(ApiError::GameAlreadyStarted);
        }
        Ok(())
    }

    fn require_member(&self, id: PlayerId) -> Result<&RoomPlayer, ApiError> {
        self.player(id).ok_or(ApiError::UnknownPlayerId)
    }

    // ==================== Authorization ====================

    /// Passes when no PIN is set.
    pub fn verify_host_pin(&self, pin: Option<&str>) -> Result<(), ApiError> {
        let (Some(salt), Some(hash)) = (&self.host_pin_salt, &self.host_pin_hash) else {
            return Ok(());
        };
        let pin = pin.map(str::trim).unwrap_or_default();
        if !is_pin_shaped(pin) {
            return Err(ApiError::HostPinRequired);
        }
        if !constant_time_eq(hash_pin(salt, pin).as_bytes(), hash.as_bytes()) {
            return Err(ApiError::BadHostPin);
        }
        Ok(())
    }

    pub fn require_host(&self, player: PlayerId, pin: Option<&str>) -> Result<(), ApiError> {
        self.require_member(player)?;
        if !self.is_host(player) {
            return Err(ApiError::OnlyHost);
        }
        self.verify_host_pin(pin)
    }

    pub fn require_admin(&self, secret: &str, pin: Option<&str>) -> Result<(), ApiError> {
        if !constant_time_eq(secret.as_bytes(), self.admin_secret.as_bytes()) {
            return Err(ApiError::BadAdminSecret);
        }
        self.verify_host_pin(pin)
    }

    // ==================== Lobby ====================

    /// Seat a new player, or refresh a returning one. Returns the player id
    /// and whether they are now host.
    pub fn join(
        &mut self,
        player_name: Option<String>,
        player_id: Option<PlayerId>,
        now: u64,
    ) -> Result<(PlayerId, bool), ApiError> {
        let name = normalize_player_name(player_name.as_deref())?;

        if let Some(id) = player_id {
            if let Some(existing) = self.player_mut(id) {
                existing.name = name;
                existing.connected = true;
                existing.last_seen_at = now;
                self.reassign_host();
                return Ok((id, self.is_host(id)));
            }
        }

        self.require_lobby()?;
        if self.players.len() as u32 >= self.max_players {
            return Err(ApiError::RoomFull {
                max_players: self.max_players,
            });
        }

        let id = Uuid::new_v4();
        let color = self.pick_color();
        self.players.push(RoomPlayer {
            player_id: id,
            name,
            color,
            ready: false,
            connected: true,
            joined_at: now,
            last_seen_at: now,
        });
        self.private_by_player_id.insert(id, PrivateState::default());
        if self.host_player_id.is_none() {
            self.host_player_id = Some(id);
        }
        self.reassign_host();
        Ok((id, self.is_host(id)))
    }

    pub fn set_ready(&mut self, player: PlayerId, ready: bool) -> Result<(), ApiError> {
        self.require_member(player)?;
        self.require_lobby()?;
        if let Some(p) = self.player_mut(player) {
            p.ready = ready;
        }
        Ok(())
    }

    pub fn set_scenario(&mut self, scenario_id: &str) -> Result<(), ApiError> {
        self.require_lobby()?;
        let scenario = catalog::scenario(scenario_id).ok_or(ApiError::BadScenario)?;
        self.apply_scenario(scenario);
        Ok(())
    }

    pub fn set_preset(&mut self, preset_id: &str) -> Result<(), ApiError> {
        self.require_lobby()?;
        if !PRESETS.iter().any(|p| p.id == preset_id) {
            return Err(ApiError::BadPreset);
        }
        self.preset_id = preset_id.to_string();
        if preset_id != RANDOM_PRESET_ID {
            self.board_seed = None;
        }
        Ok(())
    }

    pub fn set_board_seed(&mut self, raw: Option<&str>) -> Result<(), ApiError> {
        self.require_lobby()?;
        let seed = normalize_board_seed(raw);
        if seed.is_some() && self.preset_id != RANDOM_PRESET_ID {
            return Err(ApiError::BoardSeedNotApplicable);
        }
        self.board_seed = seed;
        Ok(())
    }

    pub fn set_game_mode(&mut self, mode: &str) -> Result<(), ApiError> {
        self.require_lobby()?;
        self.game_mode = match mode {
            "classic" => GameMode::Classic,
            "quick" => GameMode::Quick,
            _ => return Err(ApiError::BadGameMode),
        };
        Ok(())
    }

    pub fn set_house_rules(&mut self, value: &Value) -> Result<(), ApiError> {
        self.require_lobby()?;
        self.house_rules = parse_house_rules(value)?;
        Ok(())
    }

    pub fn set_max_players(&mut self, max_players: i64) -> Result<(), ApiError> {
        self.require_lobby()?;
        if !(i64::from(MIN_PLAYERS)..=i64::from(MAX_PLAYERS)).contains(&max_players) {
            return Err(ApiError::BadMaxPlayers);
        }
        let seated = self.players.len() as u32;
        let max_players = max_players as u32;
        if max_players < seated {
            return Err(ApiError::MaxPlayersTooLow { players: seated });
        }
        self.max_players = max_players;
        Ok(())
    }

    pub fn set_theme(&mut self, theme_id: &str) -> Result<(), ApiError> {
        self.require_lobby()?;
        if !THEMES.iter().any(|t| t.id == theme_id) {
            return Err(ApiError::BadTheme);
        }
        self.theme_id = theme_id.to_string();
        Ok(())
    }

    /// Set, change or clear (blank `next`) the host PIN. An existing PIN
    /// must be presented first.
    pub fn set_host_pin<R: Rng + ?Sized>(
        &mut self,
        current: Option<&str>,
        next: Option<&str>,
        rng: &mut R,
    ) -> Result<(), ApiError> {
        self.require_lobby()?;
        let next = next.map(str::trim).unwrap_or_default();
        if !next.is_empty() && !is_pin_shaped(next) {
            return Err(ApiError::BadHostPin);
        }
        self.verify_host_pin(current)?;

        if next.is_empty() {
            self.host_pin_salt = None;
            self.host_pin_hash = None;
        } else {
            let salt = hex::encode(rng.gen::<[u8; 16]>());
            self.host_pin_hash = Some(hash_pin(&salt, next));
            self.host_pin_salt = Some(salt);
        }
        Ok(())
    }

    fn check_player_count(&self) -> Result<(), ApiError> {
        let count = self.players.len() as u32;
        let all_ready = self.players.iter().all(|p| p.ready);
        if !(MIN_PLAYERS..=self.max_players).contains(&count) || !all_ready {
            return Err(ApiError::CantStartRoom {
                min_players: MIN_PLAYERS,
                max_players: self.max_players,
            });
        }
        Ok(())
    }

    fn begin_game<R: Rng + ?Sized>(&mut self, rng: &mut R, now: u64) -> Result<(), ApiError> {
        let mut order: Vec<PlayerId> = self.players.iter().map(|p| p.player_id).collect();
        order.shuffle(rng);

        let opts = NewGameOptions {
            player_ids: order,
            preset_id: self.preset_id.clone(),
            board_seed: self.board_seed.clone(),
            game_mode: self.game_mode,
            house_rules: self.house_rules,
            variants: self.variants,
            dice_profile: self.dice_profile,
        };
        let game = Game::new(opts, rng, now)?;

        self.private_by_player_id = self
            .players
            .iter()
            .map(|p| (p.player_id, PrivateState::default()))
            .collect();
        self.game = Some(game);
        self.status = RoomStatus::InGame;
        self.actions.clear();
        self.last_emote_at.clear();
        self.timer.reset();
        Ok(())
    }

    /// Host has already been checked.
    pub fn start<R: Rng + ?Sized>(&mut self, rng: &mut R, now: u64) -> Result<(), ApiError> {
        self.require_lobby()?;
        self.check_player_count()?;
        self.begin_game(rng, now)
    }

    pub fn rematch<R: Rng + ?Sized>(&mut self, rng: &mut R, now: u64) -> Result<(), ApiError> {
        let game = match (&self.status, &self.game) {
            (RoomStatus::InGame, Some(game)) => game,
            _ => return Err(ApiError::GameNotStarted),
        };
        if !game.is_over() {
            return Err(ApiError::GameNotOver);
        }
        self.check_player_count()?;
        for handle in self.disconnect_timers.drain().map(|(_, h)| h) {
            handle.abort();
        }
        self.begin_game(rng, now)
    }

    // ==================== Game ====================

    /// Run one action through the engine and swap in the result.
    pub fn apply_action<R: Rng + ?Sized>(
        &mut self,
        player: PlayerId,
        action: &Action,
        rng: &mut R,
        now: u64,
    ) -> Result<(), ApiError> {
        self.require_member(player)?;
        let game = match (&self.status, &self.game) {
            (RoomStatus::InGame, Some(game)) => game,
            _ => return Err(ApiError::GameNotStarted),
        };
        let outcome = apply(game, &self.private_by_player_id, player, action, rng, now)?;
        apply_deltas(&mut self.private_by_player_id, &outcome.private_deltas);
        self.game = Some(outcome.game);
        Ok(())
    }

    pub fn emote(&mut self, player: PlayerId, emote: &str, now: u64) -> Result<EmoteEvent, ApiError> {
        let seat = self.require_member(player)?.clone();
        if self.house_rules.is_some_and(|h| !h.emotes_enabled()) {
            return Err(ApiError::EmotesDisabled);
        }
        if !EMOTES.contains(&emote) {
            return Err(ApiError::BadEmote);
        }
        if let Some(last) = self.last_emote_at.get(&player) {
            if now.saturating_sub(*last) < EMOTE_COOLDOWN_MS {
                return Err(ApiError::EmoteCooldown);
            }
        }
        self.last_emote_at.insert(player, now);
        Ok(EmoteEvent {
            at: now,
            player_id: player,
            name: seat.name,
            color: seat.color,
            emote: emote.to_string(),
        })
    }

    fn push_system_log<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        now: u64,
        actor: Option<PlayerId>,
        message: &str,
        data: Value,
    ) {
        if let Some(game) = self.game.as_mut() {
            game.push_log(LogEntry::new(rng, now, LogKind::System, actor, message, data));
        }
    }

    // ==================== Admin ====================

    /// Remove a player from the room, and from the game through the engine.
    pub fn kick<R: Rng + ?Sized>(
        &mut self,
        target: PlayerId,
        rng: &mut R,
        now: u64,
    ) -> Result<(), ApiError> {
        let name = self
            .player(target)
            .ok_or(ApiError::UnknownTargetPlayerId)?
            .name
            .clone();

        if let Some(game) = self.game.as_ref().filter(|g| g.has_player(&target)) {
            let mut game = game.clone();
            let mut privates = self.private_by_player_id.clone();

            let mid_turn = game.current_player_id() == Some(target)
                && game.phase == Phase::Turn
                && game.subphase == Subphase::Main;
            if mid_turn {
                if let Ok(outcome) = apply(&game, &privates, target, &Action::EndTurn, rng, now) {
                    apply_deltas(&mut privates, &outcome.private_deltas);
                    game = outcome.game;
                }
            }

            let outcome = remove_player(&game, &privates, target, rng, now)?;
            apply_deltas(&mut privates, &outcome.private_deltas);
            self.game = Some(outcome.game);
            self.private_by_player_id = privates;
            self.push_system_log(
                rng,
                now,
                None,
                &format!("Kicked {name}."),
                json!({ "playerId": target }),
            );
        }

        self.players.retain(|p| p.player_id != target);
        self.private_by_player_id.remove(&target);
        self.actions.forget_player(target);
        self.last_emote_at.remove(&target);
        self.cancel_disconnect_timer(target);
        if self.is_host(target) {
            self.host_player_id = None;
        }
        self.reassign_host();
        Ok(())
    }

    pub fn set_host(&mut self, target: PlayerId) -> Result<(), ApiError> {
        if self.player(target).is_none() {
            return Err(ApiError::UnknownTargetPlayerId);
        }
        self.host_player_id = Some(target);
        Ok(())
    }

    /// Back to the lobby with everyone seated and unready.
    pub fn reset(&mut self, confirm: bool) -> Result<(), ApiError> {
        if !confirm {
            return Err(ApiError::ConfirmResetRequired);
        }
        self.status = RoomStatus::Lobby;
        self.game = None;
        for p in &mut self.players {
            p.ready = false;
        }
        self.private_by_player_id = self
            .players
            .iter()
            .map(|p| (p.player_id, PrivateState::default()))
            .collect();
        self.actions.clear();
        self.last_emote_at.clear();
        self.timer.reset();
        Ok(())
    }

    pub fn set_timer_paused(&mut self, paused: bool, now: u64) {
        self.timer.set_paused(paused, now);
    }

    /// Full dump for debugging, private state included.
    pub fn export(&self, now: u64) -> Value {
        json!({
            "exportedAt": now,
            "room": self,
        })
    }

    // ==================== Views ====================

    pub fn snapshot(&self, now: u64) -> RoomSnapshot {
        RoomSnapshot {
            server_time_ms: now,
            room_code: self.room_code.clone(),
            revision: self.revision,
            status: self.status,
            host_pin_enabled: self.host_pin_enabled(),
            host_player_id: self.host_player_id,
            preset_id: self.preset_id.clone(),
            theme_id: self.theme_id.clone(),
            board_seed: self.board_seed.clone(),
            game_mode: self.game_mode,
            dice_profile: self.dice_profile,
            max_players: self.max_players,
            variants: self.variants,
            settings: RoomSettingsView {
                scenario_id: self.scenario_id.clone(),
                game_mode: self.game_mode,
                house_rules: self.house_rules,
            },
            timer: self.timer,
            presets: &PRESETS,
            scenarios: &SCENARIOS,
            themes: &THEMES,
            players: self
                .players
                .iter()
                .map(|p| PlayerView {
                    player_id: p.player_id,
                    name: p.name.clone(),
                    color: p.color.clone(),
                    ready: p.ready,
                    connected: p.connected,
                    is_host: self.is_host(p.player_id),
                })
                .collect(),
            game: self
                .game
                .as_ref()
                .map(|g| public_snapshot(g, &self.private_by_player_id)),
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
        }
    }

    /// A player's own cards; `None` outside a game.
    pub fn private_view(&self, player: PlayerId) -> Option<PrivateSnapshot> {
        let game = self.game.as_ref()?;
        let state = self.private_by_player_id.get(&player)?;
        Some(private_snapshot(game, player, state))
    }

    // ==================== Subscribers ====================

    /// Attach a connection. Player subscriptions must name a seated player.
    pub fn subscribe(&mut self, sub: Subscriber, now: u64) -> Result<(), ApiError> {
        if sub.role == Role::Player {
            let id = sub.player_id.ok_or(ApiError::UnknownPlayerId)?;
            let seat = self.player_mut(id).ok_or(ApiError::UnknownPlayerId)?;
            seat.connected = true;
            seat.last_seen_at = now;
            self.cancel_disconnect_timer(id);
            self.reassign_host();
        }
        self.subscribers.retain(|s| s.conn_id != sub.conn_id);
        self.subscribers.push(sub);
        Ok(())
    }

    pub fn unsubscribe(&mut self, conn_id: u64) -> Option<Subscriber> {
        let idx = self.subscribers.iter().position(|s| s.conn_id == conn_id)?;
        Some(self.subscribers.remove(idx))
    }

    pub fn has_subscribers(&self) -> bool {
        !self.subscribers.is_empty()
    }

    /// Mark a player away after their last player stream closed. Returns
    /// true when a grace timer should decide whether to log it.
    pub fn player_disconnected(&mut self, player: PlayerId, now: u64) -> bool {
        let still_attached = self
            .subscribers
            .iter()
            .any(|s| s.role == Role::Player && s.player_id == Some(player));
        if still_attached {
            return false;
        }
        let Some(seat) = self.player_mut(player) else {
            return false;
        };
        seat.connected = false;
        seat.last_seen_at = now;
        match self.status {
            RoomStatus::Lobby => {
                self.reassign_host();
                false
            }
            RoomStatus::InGame => true,
        }
    }

    pub fn set_disconnect_timer(&mut self, player: PlayerId, handle: JoinHandle<()>) {
        if let Some(old) = self.disconnect_timers.insert(player, handle) {
            old.abort();
        }
    }

    fn cancel_disconnect_timer(&mut self, player: PlayerId) {
        if let Some(handle) = self.disconnect_timers.remove(&player) {
            handle.abort();
        }
    }

    /// Grace period over. Logs the disconnect if the player is still away.
    pub fn disconnect_grace_expired<R: Rng + ?Sized>(
        &mut self,
        player: PlayerId,
        rng: &mut R,
        now: u64,
    ) -> bool {
        self.disconnect_timers.remove(&player);
        let away = self.player(player).is_some_and(|p| !p.connected);
        if !away || self.status != RoomStatus::InGame {
            return false;
        }
        self.push_system_log(rng, now, Some(player), "Disconnected.", json!({}));
        true
    }

    /// Called once after loading from disk.
    pub fn mark_restored(&mut self) {
        for p in &mut self.players {
            p.connected = false;
        }
    }

    pub fn shut_down(&mut self) {
        self.deleted = true;
        self.subscribers.clear();
        for (_, handle) in self.disconnect_timers.drain() {
            handle.abort();
        }
    }

    /// Bump the revision and push a state event to every subscriber;
    /// subscribers whose channel is gone are dropped.
    pub fn broadcast_state(&mut self, now: u64) {
        self.last_activity_at = now;
        let active = self.active_player();
        self.timer.track(active, now);
        self.revision += 1;

        let room = Box::new(self.snapshot(now));
        let mut kept = Vec::with_capacity(self.subscribers.len());
        for sub in self.subscribers.drain(..) {
            let you = match (sub.role, sub.player_id) {
                (Role::Player, Some(id)) => self
                    .game
                    .as_ref()
                    .zip(self.private_by_player_id.get(&id))
                    .map(|(game, state)| private_snapshot(game, id, state)),
                _ => None,
            };
            let msg = ServerMessage::State {
                room: room.clone(),
                you,
            };
            if sub.tx.send(msg).is_ok() {
                kept.push(sub);
            }
        }
        self.subscribers = kept;
    }

    /// Push a message that is not part of room state (emotes, pings).
    pub fn broadcast(&mut self, msg: &ServerMessage) {
        self.subscribers.retain(|s| s.tx.send(msg.clone()).is_ok());
    }

    /// Send the current state to one subscriber only.
    /// A closed channel drops the subscriber, as in [`Room::broadcast`].
    pub fn send_state_to(&mut self, conn_id: u64, now: u64) {
        let Some(idx) = self.subscribers.iter().position(|s| s.conn_id == conn_id) else {
            return;
        };
        let sub = &self.subscribers[idx];
        let you = match (sub.role, sub.player_id) {
            (Role::Player, Some(id)) => self.private_view(id),
            _ => None,
        };
        let msg = ServerMessage::State {
            room: Box::new(self.snapshot(now)),
            you,
        };
        if self.subscribers[idx].tx.send(msg).is_err() {
            self.subscribers.remove(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexlands_core::{ResourceCounts, Resource};
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(5)
    }

    fn lobby(names: &[&str]) -> (Room, Vec<PlayerId>) {
        let mut room = Room::with_code("ABCDE".to_string(), 100);
        let ids = names
            .iter()
            .map(|n| room.join(Some(n.to_string()), None, 100).unwrap().0)
            .collect();
        (room, ids)
    }

    fn started(names: &[&str]) -> (Room, Vec<PlayerId>) {
        let (mut room, ids) = lobby(names);
        for id in &ids {
            room.set_ready(*id, true).unwrap();
        }
        room.start(&mut rng(), 200).unwrap();
        (room, ids)
    }

    fn subscriber(conn_id: u64, role: Role, player_id: Option<PlayerId>) -> (Subscriber, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Subscriber {
                conn_id,
                role,
                player_id,
                tx,
            },
            rx,
        )
    }

    #[test]
    fn test_create_room() {
        let room = Room::with_code("ABCDE".to_string(), 100);
        assert_eq!(room.status, RoomStatus::Lobby);
        assert_eq!(room.scenario_id, "classic");
        assert_eq!(room.preset_id, "classic-balanced");
        assert_eq!(room.theme_id, "aurora");
        assert_eq!(room.max_players, 4);
        assert!(Uuid::parse_str(&room.admin_secret).is_ok());
    }

    #[test]
    fn test_room_code_alphabet() {
        let code = generate_room_code(&mut rng());
        assert_eq!(code.len(), 5);
        assert!(code.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_join_assigns_host_and_colors() {
        let (room, ids) = lobby(&["Ada", "Bo"]);
        assert!(room.is_host(ids[0]));
        assert!(!room.is_host(ids[1]));
        assert_eq!(room.player(ids[0]).unwrap().color, "red");
        assert_eq!(room.player(ids[1]).unwrap().color, "blue");
        assert!(room.private_by_player_id.contains_key(&ids[1]));
    }

    #[test]
    fn test_join_name_rules() {
        let mut room = Room::with_code("ABCDE".to_string(), 0);
        assert_eq!(room.join(None, None, 0).unwrap_err().code(), "MISSING_PLAYER_NAME");
        assert_eq!(room.join(Some("   ".into()), None, 0).unwrap_err().code(), "MISSING_PLAYER_NAME");
        assert_eq!(room.join(Some("a\u{7}b".into()), None, 0).unwrap_err().code(), "BAD_PLAYER_NAME");

        let (id, _) = room.join(Some(format!("  {}  ", "x".repeat(40))), None, 0).unwrap();
        assert_eq!(room.player(id).unwrap().name.len(), 24);
    }

    #[test]
    fn test_rejoin_updates_name_without_new_seat() {
        let (mut room, ids) = lobby(&["Ada", "Bo"]);
        let (id, is_host) = room.join(Some("Ada Two".into()), Some(ids[0]), 150).unwrap();
        assert_eq!(id, ids[0]);
        assert!(is_host);
        assert_eq!(room.players.len(), 2);
        assert_eq!(room.player(id).unwrap().name, "Ada Two");
    }

    #[test]
    fn test_room_full_and_started() {
        let (mut room, _) = lobby(&["A", "B", "C", "D"]);
        let err = room.join(Some("E".into()), None, 0).unwrap_err();
        assert_eq!(err.code(), "ROOM_FULL");
        assert_eq!(err.data(), Some(json!({ "maxPlayers": 4 })));

        let (mut room, ids) = started(&["A", "B", "C"]);
        assert_eq!(room.join(Some("Late".into()), None, 0).unwrap_err().code(), "GAME_ALREADY_STARTED");
        // seated players may still rejoin mid-game
        assert!(room.join(Some("A".into()), Some(ids[0]), 0).is_ok());
    }

    #[test]
    fn test_start_needs_three_ready_players() {
        let (mut room, ids) = lobby(&["A", "B"]);
        for id in &ids {
            room.set_ready(*id, true).unwrap();
        }
        assert_eq!(room.start(&mut rng(), 0).unwrap_err().code(), "CANT_START_ROOM");

        let (c, _) = room.join(Some("C".into()), None, 0).unwrap();
        assert_eq!(room.start(&mut rng(), 0).unwrap_err().code(), "CANT_START_ROOM");
        room.set_ready(c, true).unwrap();
        room.start(&mut rng(), 0).unwrap();

        assert_eq!(room.status, RoomStatus::InGame);
        let game = room.game.as_ref().unwrap();
        let mut order = game.turn_order.clone();
        order.sort();
        let mut seated: Vec<_> = room.players.iter().map(|p| p.player_id).collect();
        seated.sort();
        assert_eq!(order, seated);
        assert!(room.private_by_player_id.values().all(|s| s.hand == ResourceCounts::default()));
    }

    #[test]
    fn test_host_only_checks() {
        let (room, ids) = lobby(&["A", "B"]);
        assert!(room.require_host(ids[0], None).is_ok());
        assert_eq!(room.require_host(ids[1], None).unwrap_err().code(), "ONLY_HOST");
        assert_eq!(room.require_host(Uuid::new_v4(), None).unwrap_err().code(), "UNKNOWN_PLAYER_ID");
        assert_eq!(room.require_admin("wrong", None).unwrap_err().code(), "BAD_ADMIN_SECRET");
        assert!(room.require_admin(&room.admin_secret.clone(), None).is_ok());
    }

    #[test]
    fn test_host_pin_lifecycle() {
        let (mut room, _) = lobby(&["A"]);
        let mut rng = rng();

        assert_eq!(room.set_host_pin(None, Some("12ab"), &mut rng).unwrap_err().code(), "BAD_HOST_PIN");
        room.set_host_pin(None, Some("4321"), &mut rng).unwrap();
        assert!(room.host_pin_enabled());
        assert_eq!(room.host_pin_salt.as_ref().unwrap().len(), 32);

        assert_eq!(room.verify_host_pin(None).unwrap_err().code(), "HOST_PIN_REQUIRED");
        assert_eq!(room.verify_host_pin(Some("1111")).unwrap_err().code(), "BAD_HOST_PIN");
        assert!(room.verify_host_pin(Some(" 4321 ")).is_ok());

        // changing needs the old PIN
        assert_eq!(room.set_host_pin(Some("0000"), Some("99999"), &mut rng).unwrap_err().code(), "BAD_HOST_PIN");
        room.set_host_pin(Some("4321"), Some("99999"), &mut rng).unwrap();
        assert!(room.verify_host_pin(Some("99999")).is_ok());

        room.set_host_pin(Some("99999"), Some(""), &mut rng).unwrap();
        assert!(!room.host_pin_enabled());
        assert!(room.verify_host_pin(None).is_ok());
    }

    #[test]
    fn test_lobby_settings() {
        let (mut room, _) = lobby(&["A", "B", "C"]);

        assert_eq!(room.set_preset("nope").unwrap_err().code(), "BAD_PRESET");
        assert_eq!(room.set_board_seed(Some("abc")).unwrap_err().code(), "BOARD_SEED_NOT_APPLICABLE");
        room.set_preset(RANDOM_PRESET_ID).unwrap();
        room.set_board_seed(Some("  table\u{0}-7  ")).unwrap();
        assert_eq!(room.board_seed.as_deref(), Some("table-7"));
        room.set_preset("high-ore").unwrap();
        assert_eq!(room.board_seed, None);

        assert_eq!(room.set_game_mode("blitz").unwrap_err().code(), "BAD_GAME_MODE");
        room.set_game_mode("quick").unwrap();
        assert_eq!(room.game_mode, GameMode::Quick);

        assert_eq!(room.set_max_players(7).unwrap_err().code(), "BAD_MAX_PLAYERS");
        room.set_max_players(3).unwrap();
        room.join(Some("D".into()), None, 0).unwrap_err();
        room.set_max_players(6).unwrap();
        room.join(Some("D".into()), None, 0).unwrap();
        let err = room.set_max_players(3).unwrap_err();
        assert_eq!(err.code(), "MAX_PLAYERS_TOO_LOW");
        assert_eq!(err.data(), Some(json!({ "players": 4 })));

        assert_eq!(room.set_theme("plaid").unwrap_err().code(), "BAD_THEME");
        room.set_theme("deep-sea").unwrap();

        assert_eq!(room.set_scenario("nope").unwrap_err().code(), "BAD_SCENARIO");
        room.set_scenario("high-conflict").unwrap();
        assert_eq!(room.dice_profile, DiceProfile::HighConflict);
        assert_eq!(room.preset_id, "high-brick-wood");
        assert_eq!(room.theme_id, "ember");
    }

    #[test]
    fn test_house_rules_parsing() {
        assert_eq!(parse_house_rules(&Value::Null).unwrap(), None);
        assert_eq!(parse_house_rules(&json!({})).unwrap(), None);
        assert_eq!(
            parse_house_rules(&json!({ "victoryPointsToWin": 12, "emotesEnabled": false })).unwrap(),
            Some(HouseRules {
                victory_points_to_win: Some(12),
                emotes_enabled: Some(false),
            })
        );
        assert_eq!(parse_house_rules(&json!({ "victoryPointsToWin": 40 })).unwrap_err().code(), "BAD_VICTORY_POINTS_TO_WIN");
        assert_eq!(parse_house_rules(&json!({ "victoryPointsToWin": 7.5 })).unwrap_err().code(), "BAD_VICTORY_POINTS_TO_WIN");
        assert_eq!(parse_house_rules(&json!({ "emotesEnabled": "yes" })).unwrap_err().code(), "BAD_HOUSE_RULES");
        assert_eq!(parse_house_rules(&json!({ "turbo": true })).unwrap_err().code(), "BAD_HOUSE_RULES");
        assert_eq!(parse_house_rules(&json!([1])).unwrap_err().code(), "BAD_HOUSE_RULES");
    }

    #[test]
    fn test_house_rules_reach_the_game() {
        let (mut room, ids) = lobby(&["A", "B", "C"]);
        room.set_house_rules(&json!({ "victoryPointsToWin": 7 })).unwrap();
        for id in &ids {
            room.set_ready(*id, true).unwrap();
        }
        room.start(&mut rng(), 0).unwrap();
        assert_eq!(room.game.as_ref().unwrap().victory_points_to_win, 7);
        assert_eq!(room.set_house_rules(&Value::Null).unwrap_err().code(), "GAME_ALREADY_STARTED");
    }

    #[test]
    fn test_actions_require_started_game() {
        let (mut room, ids) = lobby(&["A", "B", "C"]);
        let err = room.apply_action(ids[0], &Action::RollDice, &mut rng(), 0).unwrap_err();
        assert_eq!(err.code(), "GAME_NOT_STARTED");
    }

    #[test]
    fn test_engine_errors_pass_through() {
        let (mut room, _) = started(&["A", "B", "C"]);
        let game = room.game.as_ref().unwrap();
        let not_current = game.turn_order[1];
        let err = room.apply_action(not_current, &Action::RollDice, &mut rng(), 0).unwrap_err();
        assert_eq!(err.code(), "NOT_YOUR_TURN");
    }

    #[test]
    fn test_setup_action_swaps_game() {
        let (mut room, _) = started(&["A", "B", "C"]);
        let game = room.game.as_ref().unwrap();
        let first = game.turn_order[0];
        let vertex = game.legal_setup_settlement_vertex_ids()[0].clone();

        room.apply_action(first, &Action::PlaceSettlement { vertex_id: vertex.clone() }, &mut rng(), 300)
            .unwrap();
        let game = room.game.as_ref().unwrap();
        assert_eq!(game.structures.settlements.get(&vertex).map(|s| s.player_id), Some(first));
    }

    #[test]
    fn test_emote_rules() {
        let (mut room, ids) = lobby(&["A", "B"]);
        assert_eq!(room.emote(ids[0], "wave", 1_000).unwrap_err().code(), "BAD_EMOTE");
        let event = room.emote(ids[0], "gg", 1_000).unwrap();
        assert_eq!(event.color, "red");
        assert_eq!(room.emote(ids[0], "nice", 1_500).unwrap_err().code(), "EMOTE_COOLDOWN");
        assert!(room.emote(ids[0], "nice", 1_900).is_ok());
        assert!(room.emote(ids[1], "ouch", 1_500).is_ok());

        room.set_house_rules(&json!({ "emotesEnabled": false })).unwrap();
        assert_eq!(room.emote(ids[1], "gg", 9_000).unwrap_err().code(), "EMOTES_DISABLED");
        assert_eq!(room.emote(Uuid::new_v4(), "gg", 9_000).unwrap_err().code(), "UNKNOWN_PLAYER_ID");
    }

    #[test]
    fn test_kick_in_lobby_reassigns_host() {
        let (mut room, ids) = lobby(&["A", "B", "C"]);
        room.kick(ids[0], &mut rng(), 0).unwrap();
        assert_eq!(room.players.len(), 2);
        assert!(room.is_host(ids[1]));
        assert!(!room.private_by_player_id.contains_key(&ids[0]));
        assert_eq!(room.kick(ids[0], &mut rng(), 0).unwrap_err().code(), "UNKNOWN_TARGET_PLAYER_ID");
    }

    #[test]
    fn test_kick_mid_game_returns_cards_and_logs() {
        let (mut room, _) = started(&["A", "B", "C", "D"]);
        let victim = room.game.as_ref().unwrap().turn_order[2];
        let name = room.player(victim).unwrap().name.clone();
        let bank_before = room.game.as_ref().unwrap().bank;

        room.private_by_player_id.get_mut(&victim).unwrap().hand.add(Resource::Ore, 2);
        room.game.as_mut().unwrap().bank.set(Resource::Ore, bank_before.ore - 2);

        room.kick(victim, &mut rng(), 500).unwrap();
        let game = room.game.as_ref().unwrap();
        assert!(!game.turn_order.contains(&victim));
        assert_eq!(game.bank, bank_before);
        assert_eq!(game.log.last().unwrap().message, format!("Kicked {name}."));
        assert!(room.player(victim).is_none());
        assert!(!room.private_by_player_id.contains_key(&victim));
    }

    #[test]
    fn test_kick_current_player_in_main_ends_their_turn() {
        let (mut room, _) = started(&["A", "B", "C"]);
        let game = room.game.as_mut().unwrap();
        game.phase = Phase::Turn;
        game.subphase = Subphase::Main;
        game.current_player_index = 0;
        let current = game.turn_order[0];
        let next = game.turn_order[1];

        room.kick(current, &mut rng(), 700).unwrap();
        let game = room.game.as_ref().unwrap();
        assert_eq!(game.current_player_id(), Some(next));
        assert_eq!(game.subphase, Subphase::NeedsRoll);
        assert_eq!(game.turn_order.len(), 2);
    }

    #[test]
    fn test_reset_returns_to_lobby() {
        let (mut room, _) = started(&["A", "B", "C"]);
        assert_eq!(room.reset(false).unwrap_err().code(), "CONFIRM_RESET_REQUIRED");
        room.reset(true).unwrap();
        assert_eq!(room.status, RoomStatus::Lobby);
        assert!(room.game.is_none());
        assert!(room.players.iter().all(|p| !p.ready));
        assert_eq!(room.private_by_player_id.len(), 3);
    }

    #[test]
    fn test_rematch_needs_finished_game() {
        let (mut room, _) = lobby(&["A", "B", "C"]);
        assert_eq!(room.rematch(&mut rng(), 0).unwrap_err().code(), "GAME_NOT_STARTED");

        let (mut room, _) = started(&["A", "B", "C"]);
        assert_eq!(room.rematch(&mut rng(), 0).unwrap_err().code(), "GAME_NOT_OVER");

        let winner = room.game.as_ref().unwrap().turn_order[0];
        room.game.as_mut().unwrap().winner_player_id = Some(winner);
        room.game.as_mut().unwrap().phase = Phase::GameOver;
        room.rematch(&mut rng(), 900).unwrap();
        assert!(!room.game.as_ref().unwrap().is_over());
        assert!(room.actions.is_empty());
    }

    #[test]
    fn test_timer_resets_on_turn_change_and_pauses() {
        let mut timer = TurnTimer::default();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        timer.track(Some(a), 1_000);
        assert_eq!(timer.turn_started_at, Some(1_000));

        timer.set_paused(true, 2_000);
        timer.set_paused(false, 2_500);
        assert_eq!(timer.paused_total_ms, 500);

        timer.track(Some(a), 3_000);
        assert_eq!(timer.turn_started_at, Some(1_000));
        timer.track(Some(b), 4_000);
        assert_eq!(timer.turn_started_at, Some(4_000));
        assert_eq!(timer.paused_total_ms, 0);
    }

    #[test]
    fn test_broadcast_splits_public_and_private() {
        let (mut room, ids) = started(&["A", "B", "C"]);
        room.private_by_player_id.get_mut(&ids[0]).unwrap().hand.add(Resource::Wheat, 3);

        let (player_sub, mut player_rx) = subscriber(1, Role::Player, Some(ids[0]));
        let (viewer_sub, mut viewer_rx) = subscriber(2, Role::Viewer, None);
        room.subscribe(player_sub, 0).unwrap();
        room.subscribe(viewer_sub, 0).unwrap();

        let before = room.revision;
        room.broadcast_state(1_000);
        assert_eq!(room.revision, before + 1);

        match player_rx.try_recv().unwrap() {
            ServerMessage::State { room: snap, you } => {
                assert_eq!(snap.revision, before + 1);
                assert_eq!(you.unwrap().hand.wheat, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
        match viewer_rx.try_recv().unwrap() {
            ServerMessage::State { you, room: snap } => {
                assert!(you.is_none());
                let text = serde_json::to_string(&snap).unwrap();
                assert!(!text.contains("devCardsInHand"));
                assert!(!text.contains("\"hand\""));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_dead_subscriber_is_dropped() {
        let (mut room, _) = lobby(&["A"]);
        let (sub, rx) = subscriber(1, Role::Viewer, None);
        room.subscribe(sub, 0).unwrap();
        drop(rx);
        room.broadcast_state(10);
        assert!(!room.has_subscribers());
    }

    #[test]
    fn test_direct_state_to_dead_subscriber_drops_it() {
        let (mut room, _) = lobby(&["A"]);
        let (live, mut live_rx) = subscriber(1, Role::Viewer, None);
        let (dead, dead_rx) = subscriber(2, Role::Viewer, None);
        room.subscribe(live, 0).unwrap();
        room.subscribe(dead, 0).unwrap();
        drop(dead_rx);

        room.send_state_to(2, 10);
        assert!(room.unsubscribe(2).is_none());
        room.send_state_to(1, 10);
        assert!(matches!(live_rx.try_recv(), Ok(ServerMessage::State { .. })));
        assert!(room.has_subscribers());
    }

    #[test]
    fn test_player_subscribe_requires_seat() {
        let (mut room, _) = lobby(&["A"]);
        let (sub, _rx) = subscriber(1, Role::Player, Some(Uuid::new_v4()));
        assert_eq!(room.subscribe(sub, 0).unwrap_err().code(), "UNKNOWN_PLAYER_ID");
    }

    #[test]
    fn test_disconnect_in_lobby_moves_host() {
        let (mut room, ids) = lobby(&["A", "B"]);
        let (sub, _rx) = subscriber(1, Role::Player, Some(ids[0]));
        room.subscribe(sub, 0).unwrap();

        room.unsubscribe(1);
        assert!(!room.player_disconnected(ids[0], 10));
        assert!(!room.player(ids[0]).unwrap().connected);
        assert!(room.is_host(ids[1]));
    }

    #[test]
    fn test_disconnect_in_game_logs_after_grace() {
        let (mut room, ids) = started(&["A", "B", "C"]);
        let (sub, _rx) = subscriber(1, Role::Player, Some(ids[1]));
        room.subscribe(sub, 0).unwrap();
        room.unsubscribe(1);

        assert!(room.player_disconnected(ids[1], 10));
        let log_len = room.game.as_ref().unwrap().log.len();
        assert!(room.disconnect_grace_expired(ids[1], &mut rng(), 2_000));
        let game = room.game.as_ref().unwrap();
        assert_eq!(game.log.len(), log_len + 1);
        assert_eq!(game.log.last().unwrap().message, "Disconnected.");
        assert_eq!(game.log.last().unwrap().actor_player_id, Some(ids[1]));

        // a quick reconnect means nothing is logged
        let (sub, _rx) = subscriber(2, Role::Player, Some(ids[1]));
        room.subscribe(sub, 2_100).unwrap();
        assert!(!room.disconnect_grace_expired(ids[1], &mut rng(), 3_000));
    }

    #[test]
    fn test_export_includes_private_state() {
        let (room, ids) = started(&["A", "B", "C"]);
        let dump = room.export(5);
        assert_eq!(dump["exportedAt"], 5);
        assert!(dump["room"]["privateByPlayerId"].get(ids[0].to_string()).is_some());
        assert!(dump["room"]["adminSecret"].is_string());
    }
}
