//! WebSocket server, request dispatch and background tasks.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use hexlands_core::{Action, PlayerId};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::catalog;
use crate::config::Config;
use crate::error::ApiError;
use crate::idempotency::{is_valid_action_id, Lookup};
use crate::persist::{Persister, RoomStore, StoreError};
use crate::protocol::{normalize_room_code, parse_request, ClientMessage, Reply, Role, ServerMessage};
use crate::rate_limit::{Bucket, RateLimiter};
use crate::room::{generate_room_code, now_ms, Room, RoomStatus, Subscriber};

const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Server state shared across all connections.
pub struct ServerState {
    pub config: Config,
    /// Room code -> room. The room mutex is the only way to touch a room.
    pub rooms: DashMap<String, Arc<Mutex<Room>>>,
    pub limiter: RateLimiter,
    pub persister: Arc<Persister>,
    started_at: Instant,
    next_conn_id: AtomicU64,
}

impl ServerState {
    pub fn new(config: Config) -> Self {
        let store = RoomStore::new(config.rooms_dir());
        Self {
            limiter: RateLimiter::new(&config),
            persister: Arc::new(Persister::new(store, config.persist_debounce)),
            rooms: DashMap::new(),
            started_at: Instant::now(),
            next_conn_id: AtomicU64::new(1),
            config,
        }
    }

    /// Load stored rooms into memory.
    pub async fn restore(&self) -> Result<usize, StoreError> {
        let report = self
            .persister
            .store()
            .load_all(self.config.room_ttl)
            .await?;
        for path in &report.quarantined {
            warn!("Room record quarantined: {}", path.display());
        }
        let restored = report.rooms.len();
        for room in report.rooms {
            self.rooms
                .insert(room.room_code.clone(), Arc::new(Mutex::new(room)));
        }
        info!("Restored {} rooms", restored);
        Ok(restored)
    }

    fn room(&self, code: &str) -> Result<Arc<Mutex<Room>>, ApiError> {
        self.rooms
            .get(&normalize_room_code(code))
            .map(|r| Arc::clone(r.value()))
            .ok_or(ApiError::RoomNotFound)
    }

    fn create_room(&self, now: u64) -> Arc<Mutex<Room>> {
        let mut rng = ChaCha8Rng::from_entropy();
        loop {
            let code = generate_room_code(&mut rng);
            if let dashmap::mapref::entry::Entry::Vacant(slot) = self.rooms.entry(code.clone()) {
                let room = Arc::new(Mutex::new(Room::with_code(code, now)));
                slot.insert(Arc::clone(&room));
                return room;
            }
        }
    }

    /// Broadcast the new state and schedule a write.
    fn commit(&self, handle: &Arc<Mutex<Room>>, room: &mut Room, now: u64) {
        room.broadcast_state(now);
        self.persister.schedule(&room.room_code, Arc::clone(handle));
    }

    fn next_conn_id(&self) -> u64 {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    fn all_rooms(&self) -> Vec<Arc<Mutex<Room>>> {
        self.rooms.iter().map(|r| Arc::clone(r.value())).collect()
    }

    pub async fn heartbeat(&self) {
        let msg = ServerMessage::Ping { at: now_ms() };
        for room in self.all_rooms() {
            room.lock().await.broadcast(&msg);
        }
    }

    /// Drop rooms nobody watches that have been idle past the TTL.
    pub async fn prune_idle(&self, now: u64) -> usize {
        let Some(ttl) = self.config.room_ttl else {
            return 0;
        };
        let ttl_ms = ttl.as_millis() as u64;
        let codes: Vec<String> = self.rooms.iter().map(|r| r.key().clone()).collect();

        let mut pruned = 0;
        for code in codes {
            let Ok(room) = self.room(&code) else {
                continue;
            };
            {
                let mut guard = room.lock().await;
                if guard.has_subscribers() || now.saturating_sub(guard.last_activity_at) <= ttl_ms {
                    continue;
                }
                guard.shut_down();
            }
            self.rooms.remove(&code);
            self.persister.forget(&code).await;
            info!("Pruned idle room {}", code);
            pruned += 1;
        }
        pruned
    }

    pub async fn flush_all(&self) {
        for room in self.all_rooms() {
            self.persister.flush(&room).await;
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// What one socket has attached to
pub struct Connection {
    pub id: u64,
    pub ip: IpAddr,
    pub tx: mpsc::UnboundedSender<ServerMessage>,
    rooms: HashSet<String>,
}

impl Connection {
    pub fn new(id: u64, ip: IpAddr, tx: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            id,
            ip,
            tx,
            rooms: HashSet::new(),
        }
    }
}

// ==================== Transport ====================

/// Run the WebSocket server until a shutdown signal, then flush every room.
pub async fn run_server(state: Arc<ServerState>) -> anyhow::Result<()> {
    let addr = state.config.addr;
    let listener = TcpListener::bind(addr).await?;
    info!("Hexlands server listening on {}", addr);

    spawn_background_tasks(&state);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer_addr, state).await {
                            debug!("Connection error from {}: {}", peer_addr, e);
                        }
                    });
                }
                Err(e) => error!("Accept failed: {}", e),
            },
            _ = &mut shutdown => {
                info!("Shutting down, flushing {} rooms", state.rooms.len());
                state.flush_all().await;
                break;
            }
        }
    }
    Ok(())
}

pub fn spawn_background_tasks(state: &Arc<ServerState>) {
    let heartbeat_state = Arc::clone(state);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(heartbeat_state.config.heartbeat);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            heartbeat_state.heartbeat().await;
        }
    });

    if state.config.room_ttl.is_some() {
        let prune_state = Arc::clone(state);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PRUNE_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                prune_state.prune_idle(now_ms()).await;
            }
        });
    }
}

/// First `X-Forwarded-For` entry, if it parses
fn forwarded_ip(req: &Request) -> Option<IpAddr> {
    req.headers()
        .get("x-forwarded-for")?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

/// Handle a single WebSocket connection.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<ServerState>,
) -> anyhow::Result<()> {
    let trust_proxy = state.config.trust_proxy;
    let mut forwarded = None;
    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        if trust_proxy {
            forwarded = forwarded_ip(req);
        }
        Ok(resp)
    };
    let ws_stream = accept_hdr_async(stream, callback).await?;
    let ip = forwarded.unwrap_or(addr.ip());

    let conn_id = state.next_conn_id();
    info!("New WebSocket connection {} from {}", conn_id, ip);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Create channel for outgoing messages
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let mut conn = Connection::new(conn_id, ip, tx);

    // Spawn task to forward messages from channel to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(text) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        }
    });

    let max_bytes = state.config.max_json_bytes;
    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let reply = handle_text(&state, &mut conn, &text, max_bytes).await;
                if conn.tx.send(ServerMessage::Reply(reply)).is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                debug!("Client {} closing connection", conn_id);
                break;
            }
            Err(e) => {
                debug!("WebSocket error from {}: {}", conn_id, e);
                break;
            }
            _ => {}
        }
    }

    // Clean up on disconnect
    let rooms: Vec<String> = conn.rooms.drain().collect();
    for code in rooms {
        detach(&state, conn_id, &code).await;
    }
    send_task.abort();

    info!("Connection {} closed", conn_id);
    Ok(())
}

async fn handle_text(
    state: &Arc<ServerState>,
    conn: &mut Connection,
    text: &str,
    max_bytes: usize,
) -> Reply {
    if text.len() > max_bytes {
        return Reply::error(&ApiError::PayloadTooLarge { max_bytes });
    }
    let request = parse_request(text);
    let reply = match request.message {
        Ok(msg) => dispatch(state, conn, msg).await,
        Err(e) => Reply::error(&e),
    };
    reply.with_request_id(request.request_id)
}

// ==================== Dispatch ====================

/// Answer one client message.
pub async fn dispatch(state: &Arc<ServerState>, conn: &mut Connection, msg: ClientMessage) -> Reply {
    match msg {
        ClientMessage::Action {
            room_code,
            player_id,
            action_id,
            action,
        } => handle_action(state, conn, &room_code, player_id, action_id, action).await,
        other => Reply::from_result(handle_request(state, conn, other).await),
    }
}

fn room_reply(room: &Room, now: u64) -> Value {
    json!({ "room": room.snapshot(now) })
}

async fn handle_request(
    state: &Arc<ServerState>,
    conn: &mut Connection,
    msg: ClientMessage,
) -> Result<Value, ApiError> {
    let now = now_ms();
    let mut rng = ChaCha8Rng::from_entropy();

    match msg {
        ClientMessage::Ping => Ok(json!({ "pong": true, "at": now })),

        ClientMessage::Health => Ok(json!({
            "uptimeMs": state.uptime().as_millis() as u64,
            "roomsCount": state.rooms.len(),
        })),

        ClientMessage::Catalog => Ok(json!(catalog::catalog())),

        ClientMessage::CreateRoom => {
            let handle = state.create_room(now);
            let mut room = handle.lock().await;
            state.commit(&handle, &mut room, now);
            info!("Created room {}", room.room_code);
            Ok(json!({
                "roomCode": room.room_code,
                "adminSecret": room.admin_secret,
                "room": room.snapshot(now),
            }))
        }

        ClientMessage::GetRoom { room_code } => {
            let handle = state.room(&room_code)?;
            let room = handle.lock().await;
            Ok(room_reply(&room, now))
        }

        ClientMessage::Join {
            room_code,
            player_name,
            player_id,
        } => {
            if !state.limiter.allow(Bucket::Join, conn.ip, now) {
                return Err(ApiError::RateLimited);
            }
            let handle = state.room(&room_code)?;
            let mut room = handle.lock().await;
            let (player_id, is_host) = room.join(player_name, player_id, now)?;
            state.commit(&handle, &mut room, now);
            Ok(json!({
                "playerId": player_id,
                "isHost": is_host,
                "room": room.snapshot(now),
                "you": room.private_view(player_id),
            }))
        }

        ClientMessage::Ready {
            room_code,
            player_id,
            ready,
        } => {
            let handle = state.room(&room_code)?;
            let mut room = handle.lock().await;
            room.set_ready(player_id, ready)?;
            state.commit(&handle, &mut room, now);
            Ok(room_reply(&room, now))
        }

        ClientMessage::Settings {
            room_code,
            scenario_id,
            player_id,
            admin_secret,
            host_pin,
        } => {
            let handle = state.room(&room_code)?;
            let mut room = handle.lock().await;
            match (admin_secret.as_deref(), player_id) {
                (Some(secret), _) => room.require_admin(secret, host_pin.as_deref())?,
                (None, Some(player)) => room.require_host(player, host_pin.as_deref())?,
                (None, None) => return Err(ApiError::OnlyHost),
            }
            room.set_scenario(&scenario_id)?;
            state.commit(&handle, &mut room, now);
            Ok(room_reply(&room, now))
        }

        ClientMessage::Preset {
            room_code,
            player_id,
            host_pin,
            preset_id,
        } => {
            host_setting(state, &room_code, player_id, host_pin, now, |room| {
                room.set_preset(&preset_id)
            })
            .await
        }

        ClientMessage::BoardSeed {
            room_code,
            player_id,
            host_pin,
            board_seed,
        } => {
            host_setting(state, &room_code, player_id, host_pin, now, |room| {
                room.set_board_seed(board_seed.as_deref())
            })
            .await
        }

        ClientMessage::Mode {
            room_code,
            player_id,
            host_pin,
            game_mode,
        } => {
            host_setting(state, &room_code, player_id, host_pin, now, |room| {
                room.set_game_mode(&game_mode)
            })
            .await
        }

        ClientMessage::HouseRules {
            room_code,
            player_id,
            host_pin,
            house_rules,
        } => {
            host_setting(state, &room_code, player_id, host_pin, now, |room| {
                room.set_house_rules(&house_rules)
            })
            .await
        }

        ClientMessage::MaxPlayers {
            room_code,
            player_id,
            host_pin,
            max_players,
        } => {
            host_setting(state, &room_code, player_id, host_pin, now, |room| {
                room.set_max_players(max_players)
            })
            .await
        }

        ClientMessage::Theme {
            room_code,
            player_id,
            host_pin,
            theme_id,
        } => {
            host_setting(state, &room_code, player_id, host_pin, now, |room| {
                room.set_theme(&theme_id)
            })
            .await
        }

        ClientMessage::HostPin {
            room_code,
            player_id,
            host_pin,
            next_host_pin,
        } => {
            let current = host_pin.clone();
            host_setting(state, &room_code, player_id, host_pin, now, |room| {
                room.set_host_pin(current.as_deref(), next_host_pin.as_deref(), &mut rng)
            })
            .await
        }

        ClientMessage::Start {
            room_code,
            player_id,
            host_pin,
        } => {
            let reply = host_setting(state, &room_code, player_id, host_pin, now, |room| {
                room.start(&mut rng, now)
            })
            .await?;
            info!("Game started in room {}", normalize_room_code(&room_code));
            Ok(reply)
        }

        ClientMessage::Rematch {
            room_code,
            player_id,
            host_pin,
        } => {
            let handle = state.room(&room_code)?;
            let mut room = handle.lock().await;
            if room.status != RoomStatus::InGame || room.game.is_none() {
                return Err(ApiError::GameNotStarted);
            }
            room.require_host(player_id, host_pin.as_deref())?;
            room.rematch(&mut rng, now)?;
            state.commit(&handle, &mut room, now);
            Ok(room_reply(&room, now))
        }

        ClientMessage::Emote {
            room_code,
            player_id,
            emote,
        } => {
            if !state.limiter.allow(Bucket::Emote, conn.ip, now) {
                return Err(ApiError::RateLimited);
            }
            let handle = state.room(&room_code)?;
            let mut room = handle.lock().await;
            let event = room.emote(player_id, &emote, now)?;
            room.broadcast(&ServerMessage::Emote(event));
            Ok(json!({}))
        }

        ClientMessage::AdminKick {
            room_code,
            admin_secret,
            host_pin,
            target_player_id,
        } => {
            admin_command(state, &room_code, &admin_secret, host_pin, now, |room| {
                room.kick(target_player_id, &mut rng, now)
            })
            .await
        }

        ClientMessage::AdminHost {
            room_code,
            admin_secret,
            host_pin,
            host_player_id,
        } => {
            admin_command(state, &room_code, &admin_secret, host_pin, now, |room| {
                room.set_host(host_player_id)
            })
            .await
        }

        ClientMessage::AdminReset {
            room_code,
            admin_secret,
            host_pin,
            confirm,
        } => {
            admin_command(state, &room_code, &admin_secret, host_pin, now, |room| {
                room.reset(confirm)
            })
            .await
        }

        ClientMessage::AdminTimer {
            room_code,
            admin_secret,
            host_pin,
            paused,
        } => {
            admin_command(state, &room_code, &admin_secret, host_pin, now, |room| {
                room.set_timer_paused(paused, now);
                Ok(())
            })
            .await
        }

        ClientMessage::AdminExport {
            room_code,
            admin_secret,
            host_pin,
        } => {
            let handle = state.room(&room_code)?;
            let room = handle.lock().await;
            room.require_admin(&admin_secret, host_pin.as_deref())?;
            Ok(json!({ "export": room.export(now) }))
        }

        ClientMessage::Subscribe {
            room_code,
            role,
            player_id,
        } => {
            let handle = state.room(&room_code)?;
            let mut room = handle.lock().await;
            room.subscribe(
                Subscriber {
                    conn_id: conn.id,
                    role,
                    player_id: if role == Role::Player { player_id } else { None },
                    tx: conn.tx.clone(),
                },
                now,
            )?;
            conn.rooms.insert(room.room_code.clone());
            if role == Role::Player {
                state.commit(&handle, &mut room, now);
            } else {
                room.send_state_to(conn.id, now);
            }
            Ok(json!({ "roomCode": room.room_code, "revision": room.revision }))
        }

        ClientMessage::Unsubscribe { room_code } => {
            let code = normalize_room_code(&room_code);
            if !conn.rooms.remove(&code) {
                return Err(ApiError::NotSubscribed);
            }
            detach(state, conn.id, &code).await;
            Ok(json!({}))
        }

        ClientMessage::Action { .. } => Err(ApiError::BadPayload("unexpected action".into())),
    }
}

/// Lobby change by the host (plus PIN when one is set)
async fn host_setting<F>(
    state: &Arc<ServerState>,
    room_code: &str,
    player_id: PlayerId,
    host_pin: Option<String>,
    now: u64,
    change: F,
) -> Result<Value, ApiError>
where
    F: FnOnce(&mut Room) -> Result<(), ApiError>,
{
    let handle = state.room(room_code)?;
    let mut room = handle.lock().await;
    room.require_host(player_id, host_pin.as_deref())?;
    change(&mut room)?;
    state.commit(&handle, &mut room, now);
    Ok(room_reply(&room, now))
}

/// Change authorized by the room's admin secret (plus PIN when one is set)
async fn admin_command<F>(
    state: &Arc<ServerState>,
    room_code: &str,
    admin_secret: &str,
    host_pin: Option<String>,
    now: u64,
    change: F,
) -> Result<Value, ApiError>
where
    F: FnOnce(&mut Room) -> Result<(), ApiError>,
{
    let handle = state.room(room_code)?;
    let mut room = handle.lock().await;
    room.require_admin(admin_secret, host_pin.as_deref())?;
    change(&mut room)?;
    state.commit(&handle, &mut room, now);
    Ok(room_reply(&room, now))
}

/// Game actions. Replies are cached per `(playerId, actionId)` so a retry
/// replays the first answer instead of running the engine again.
async fn handle_action(
    state: &Arc<ServerState>,
    conn: &Connection,
    room_code: &str,
    player_id: PlayerId,
    action_id: Option<String>,
    action: Value,
) -> Reply {
    let now = now_ms();
    let handle = match state.room(room_code) {
        Ok(handle) => handle,
        Err(e) => return Reply::error(&e),
    };
    let mut room = handle.lock().await;

    if room.status != RoomStatus::InGame || room.game.is_none() {
        return Reply::error(&ApiError::GameNotStarted);
    }
    if !state.limiter.allow(Bucket::Action, conn.ip, now) {
        return Reply::error(&ApiError::RateLimited);
    }
    if room.player(player_id).is_none() {
        return Reply::error(&ApiError::UnknownPlayerId);
    }
    if let Some(id) = &action_id {
        if !is_valid_action_id(id) {
            return Reply::error(&ApiError::BadActionId);
        }
        match room.actions.begin(player_id, id) {
            Lookup::Done(reply) => return reply,
            Lookup::Pending => return Reply::ok(json!({ "pending": true })),
            Lookup::Fresh => {}
        }
    }

    let mut rng = ChaCha8Rng::from_entropy();
    let result = serde_json::from_value::<Action>(action)
        .map_err(|e| ApiError::BadPayload(e.to_string()))
        .and_then(|action| room.apply_action(player_id, &action, &mut rng, now));

    let reply = match result {
        Ok(()) => {
            state.commit(&handle, &mut room, now);
            Reply::ok(json!({
                "room": room.snapshot(now),
                "you": room.private_view(player_id),
            }))
        }
        Err(e) => Reply::error(&e),
    };
    if let Some(id) = &action_id {
        room.actions.complete(player_id, id, reply.clone());
    }
    reply
}

// ==================== Disconnects ====================

/// Detach a connection from a room, starting the grace timer for players.
async fn detach(state: &Arc<ServerState>, conn_id: u64, code: &str) {
    let Ok(handle) = state.room(code) else {
        return;
    };
    let mut room = handle.lock().await;
    let Some(sub) = room.unsubscribe(conn_id) else {
        return;
    };
    let (Role::Player, Some(player)) = (sub.role, sub.player_id) else {
        return;
    };

    let now = now_ms();
    let needs_grace = room.player_disconnected(player, now);
    state.commit(&handle, &mut room, now);
    if needs_grace {
        let timer = spawn_disconnect_grace(state, Arc::clone(&handle), player);
        room.set_disconnect_timer(player, timer);
    }
}

fn spawn_disconnect_grace(
    state: &Arc<ServerState>,
    handle: Arc<Mutex<Room>>,
    player: PlayerId,
) -> JoinHandle<()> {
    let state = Arc::clone(state);
    tokio::spawn(async move {
        tokio::time::sleep(state.config.disconnect_grace).await;
        let mut room = handle.lock().await;
        let now = now_ms();
        let mut rng = ChaCha8Rng::from_entropy();
        if room.disconnect_grace_expired(player, &mut rng, now) {
            debug!("Player {} still away in room {}", player, room.room_code);
            state.commit(&handle, &mut room, now);
        }
    })
}
