//! The rules engine.
//!
//! [`apply`] is a pure transition: it reads a game, the private states and one
//! action, and returns the next game together with the private deltas the
//! caller must apply. A rejected action returns a [`GameError`] and leaves the
//! input untouched, since all work happens on a clone.
//!
//! Every hand movement goes through the bank or between players in the same
//! call, so `bank + hands == 19` per resource holds after each success.

use crate::actions::{Action, OfferResponse, TradeTarget};
use crate::events::{should_draw_event, ActiveEvent, EventKind};
use crate::game::{
    random_uuid, DevRoadBuilding, DiceProfile, Game, GameError, LastRoll, LogEntry, LogKind,
    Phase, PlayerId, Road, RobberState, Settlement, StructureKind, Subphase, TradeOffer,
    TradeStatus, DISCARD_THRESHOLD, LARGEST_ARMY_MIN_KNIGHTS, MAX_CITIES, MAX_ROADS,
    MAX_SETTLEMENTS,
};
use crate::longest_road::compute_award;
use crate::private::{DeltaSet, DevCard, PrivateDelta, PrivateStates};
use crate::resources::{costs, Resource, ResourceCounts, BANK_SUPPLY};
use rand::Rng;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Chance that a high-conflict roll is forced to a 7
const HIGH_CONFLICT_SEVEN_CHANCE: f64 = 0.04;

/// Oldest closed offers are dropped past this many
const TRADE_OFFER_HISTORY: usize = 50;

/// A successful transition
#[derive(Debug, Clone)]
pub struct Outcome {
    pub game: Game,
    /// At most one delta per player
    pub private_deltas: Vec<PrivateDelta>,
}

/// Validate and apply one action by `actor`.
pub fn apply<R: Rng + ?Sized>(
    game: &Game,
    privates: &PrivateStates,
    actor: PlayerId,
    action: &Action,
    rng: &mut R,
    now_ms: u64,
) -> Result<Outcome, GameError> {
    if game.is_over() {
        return Err(GameError::GameOver);
    }
    if !game.has_player(&actor) {
        return Err(GameError::UnknownPlayer);
    }
    if !action.allowed_out_of_turn() && game.current_player_id() != Some(actor) {
        return Err(GameError::NotYourTurn);
    }

    let mut turn = Turn::new(game.clone(), privates, actor, rng, now_ms);
    match action {
        // ==================== Setup Phase ====================
        Action::PlaceSettlement { vertex_id } => turn.place_settlement(vertex_id)?,
        Action::PlaceRoad { edge_id } => turn.place_road(edge_id)?,

        // ==================== Turn Actions ====================
        Action::RollDice => turn.roll_dice()?,
        Action::EndTurn => {
            turn.expect(Subphase::Main)?;
            turn.end_turn();
        }

        // ==================== Building ====================
        Action::BuildRoad { edge_id } => turn.build_road(edge_id)?,
        Action::BuildSettlement { vertex_id } => turn.build_settlement(vertex_id)?,
        Action::BuildCity { vertex_id } => turn.build_city(vertex_id)?,

        // ==================== Development Cards ====================
        Action::BuyDevCard => turn.buy_dev_card()?,
        Action::PlayDevCard {
            card,
            take,
            resource_type,
        } => turn.play_dev_card(*card, *take, *resource_type)?,
        Action::DevRoadBuildingPlaceRoad { edge_id } => turn.place_free_road(edge_id)?,

        // ==================== Robber ====================
        Action::DiscardCards { counts } => turn.discard(counts)?,
        Action::MoveRobber { hex_id } => turn.move_robber(hex_id)?,
        Action::StealCard { from_player_id } => turn.steal(*from_player_id)?,

        // ==================== Trading ====================
        Action::BankTrade { give, receive } => turn.bank_trade(give, receive)?,
        Action::TradeOfferCreate { to, give, want } => turn.create_offer(*to, give, want)?,
        Action::TradeOfferCancel { offer_id } => turn.cancel_offer(*offer_id)?,
        Action::TradeOfferRespond { offer_id, response } => {
            turn.respond_to_offer(*offer_id, *response)?
        }
    }
    turn.check_secret_win();
    Ok(turn.finish())
}

/// Roll two dice under a profile
pub fn roll_dice<R: Rng + ?Sized>(rng: &mut R, profile: DiceProfile) -> (u8, u8) {
    if profile == DiceProfile::HighConflict && rng.gen_bool(HIGH_CONFLICT_SEVEN_CHANCE) {
        let d1 = rng.gen_range(1..=6);
        return (d1, 7 - d1);
    }
    (rng.gen_range(1..=6), rng.gen_range(1..=6))
}

/// Working state for one transition: the next game, the deltas so far and
/// a view of every hand with those deltas applied.
pub(crate) struct Turn<'a, R: ?Sized> {
    pub(crate) game: Game,
    privates: &'a PrivateStates,
    actor: PlayerId,
    deltas: DeltaSet,
    rng: &'a mut R,
    now_ms: u64,
}

impl<'a, R: Rng + ?Sized> Turn<'a, R> {
    pub(crate) fn new(
        game: Game,
        privates: &'a PrivateStates,
        actor: PlayerId,
        rng: &'a mut R,
        now_ms: u64,
    ) -> Self {
        Self {
            game,
            privates,
            actor,
            deltas: DeltaSet::default(),
            rng,
            now_ms,
        }
    }

    pub(crate) fn finish(self) -> Outcome {
        Outcome {
            game: self.game,
            private_deltas: self.deltas.into_vec(),
        }
    }

    pub(crate) fn log(
        &mut self,
        kind: LogKind,
        actor: Option<PlayerId>,
        message: impl Into<String>,
        data: Value,
    ) {
        let entry = LogEntry::new(&mut *self.rng, self.now_ms, kind, actor, message, data);
        self.game.push_log(entry);
    }

    // ==================== Hands and Bank ====================

    /// A player's hand as it stands mid-action
    pub(crate) fn hand(&self, player: PlayerId) -> ResourceCounts {
        let Some(state) = self.privates.get(&player) else {
            return ResourceCounts::default();
        };
        match self.deltas.get(&player) {
            Some(delta) => state.hand_after(delta),
            None => state.hand,
        }
    }

    fn hidden_points(&self, player: PlayerId) -> u32 {
        let stored = self
            .privates
            .get(&player)
            .map_or(0, |s| s.hidden_victory_points_count);
        let drawn = self
            .deltas
            .get(&player)
            .is_some_and(|d| d.dev_card_drawn == Some(DevCard::VictoryPoint));
        stored + u32::from(drawn)
    }

    /// Bank never rises above the fixed supply
    pub(crate) fn return_to_bank(&mut self, counts: &ResourceCounts) {
        for (r, n) in counts.iter() {
            let next = (self.game.bank.get(r) + n).min(BANK_SUPPLY);
            self.game.bank.set(r, next);
        }
    }

    fn pay(&mut self, player: PlayerId, cost: &ResourceCounts) -> Result<(), GameError> {
        if !self.hand(player).can_afford(cost) {
            return Err(GameError::NotEnoughResources);
        }
        self.deltas.lose(player, cost);
        self.return_to_bank(cost);
        Ok(())
    }

    /// Caller has checked the bank covers `counts`
    fn draw_from_bank(&mut self, player: PlayerId, counts: &ResourceCounts) {
        self.game.bank.saturating_sub_counts(counts);
        self.deltas.gain(player, counts);
    }

    pub(crate) fn discard_hand(&mut self, player: PlayerId) {
        let hand = self.hand(player);
        self.deltas.lose(player, &hand);
        self.return_to_bank(&hand);
    }

    fn transfer(&mut self, from: PlayerId, to: PlayerId, counts: &ResourceCounts) {
        self.deltas.lose(from, counts);
        self.deltas.gain(to, counts);
    }

    /// Pay out production. A resource whose total demand exceeds the bank is
    /// paid to nobody.
    fn distribute(
        &mut self,
        gains: BTreeMap<PlayerId, ResourceCounts>,
        message: &str,
        log_when_empty: bool,
    ) {
        let mut demand = ResourceCounts::default();
        for g in gains.values() {
            demand.add_counts(g);
        }
        let blocked: Vec<Resource> = Resource::ALL
            .into_iter()
            .filter(|r| demand.get(*r) > self.game.bank.get(*r))
            .collect();
        if !blocked.is_empty() {
            let names: Vec<&str> = blocked.iter().map(Resource::as_str).collect();
            self.log(
                LogKind::Bank,
                None,
                format!("Bank is empty for: {}.", names.join(", ")),
                json!({ "blocked": blocked }),
            );
        }

        let mut paid = BTreeMap::new();
        for (player, mut g) in gains {
            for r in &blocked {
                g.set(*r, 0);
            }
            if g.is_empty() {
                continue;
            }
            self.draw_from_bank(player, &g);
            paid.insert(player, g);
        }

        if !paid.is_empty() {
            self.log(LogKind::Roll, None, message, json!({ "gains": paid }));
        } else if log_when_empty {
            self.log(LogKind::Roll, None, "No resources produced.", Value::Null);
        }
    }

    // ==================== Gates ====================

    fn expect(&self, subphase: Subphase) -> Result<(), GameError> {
        if self.game.phase != Phase::Turn || self.game.subphase != subphase {
            return Err(GameError::BadPhase);
        }
        Ok(())
    }

    fn expect_setup(&self, subphase: Subphase) -> Result<(), GameError> {
        if !self.game.phase.is_setup() || self.game.subphase != subphase {
            return Err(GameError::BadPhase);
        }
        Ok(())
    }

    fn check_road_slot(&self, edge_id: &str) -> Result<(), GameError> {
        if self.game.board.edge(edge_id).is_none() {
            return Err(GameError::BadEdge);
        }
        if self.game.structures.roads.contains_key(edge_id) {
            return Err(GameError::EdgeOccupied);
        }
        if self.game.count_roads(self.actor) >= MAX_ROADS {
            return Err(GameError::OutOfPiecesRoad);
        }
        Ok(())
    }

    fn lay_road(&mut self, edge_id: &str) {
        self.game.structures.roads.insert(
            edge_id.to_string(),
            Road {
                player_id: self.actor,
            },
        );
    }

    // ==================== Setup ====================

    fn place_settlement(&mut self, vertex_id: &str) -> Result<(), GameError> {
        self.expect_setup(Subphase::SetupSettlement)?;
        let Some(vertex) = self.game.board.vertex(vertex_id) else {
            return Err(GameError::BadVertex);
        };
        let adjacent_hex_ids = vertex.adjacent_hex_ids.clone();
        if self.game.count_settlements(self.actor) >= MAX_SETTLEMENTS {
            return Err(GameError::OutOfPiecesSettlement);
        }
        if !self.game.is_legal_setup_settlement(vertex_id) {
            return Err(GameError::IllegalPlacement);
        }

        let actor = self.actor;
        self.game.structures.settlements.insert(
            vertex_id.to_string(),
            Settlement {
                player_id: actor,
                kind: StructureKind::Settlement,
            },
        );
        self.game.setup.last_settlement_vertex_id = Some(vertex_id.to_string());
        self.game.subphase = Subphase::SetupRoad;
        let placed = {
            let n = self
                .game
                .setup
                .settlements_placed_by_player_id
                .entry(actor)
                .or_insert(0);
            *n += 1;
            *n
        };
        self.log(
            LogKind::Build,
            Some(actor),
            format!("Placed a settlement ({placed}/2)."),
            json!({ "vertexId": vertex_id }),
        );

        if placed == 2 {
            let mut start = ResourceCounts::default();
            for hex_id in &adjacent_hex_ids {
                if let Some(r) = self.game.board.hex(hex_id).and_then(|h| h.resource.resource()) {
                    start.add(r, 1);
                }
            }
            let gains = BTreeMap::from([(actor, start)]);
            self.distribute(gains, "Starting resources distributed.", false);
        }

        self.update_longest_road();
        Ok(())
    }

    fn place_road(&mut self, edge_id: &str) -> Result<(), GameError> {
        self.expect_setup(Subphase::SetupRoad)?;
        self.check_road_slot(edge_id)?;
        if !self
            .game
            .legal_setup_road_edge_ids()
            .iter()
            .any(|e| e == edge_id)
        {
            return Err(GameError::IllegalPlacement);
        }

        self.lay_road(edge_id);
        self.log(
            LogKind::Build,
            Some(self.actor),
            "Placed a road.",
            json!({ "edgeId": edge_id }),
        );

        let setup = &mut self.game.setup;
        setup.placement_index += 1;
        setup.last_settlement_vertex_id = None;
        self.game.subphase = Subphase::SetupSettlement;
        if self.game.setup.placement_index >= self.game.setup.placement_order.len() {
            self.game.phase = Phase::Turn;
            self.game.subphase = Subphase::NeedsRoll;
            self.game.current_player_index = 0;
            self.log(LogKind::System, None, "Setup complete. Begin turn 1.", Value::Null);
        } else if self.game.setup.placement_index < self.game.turn_order.len() {
            self.game.phase = Phase::SetupRound1;
        } else {
            self.game.phase = Phase::SetupRound2;
        }

        self.update_longest_road();
        Ok(())
    }

    // ==================== Dice ====================

    fn roll_dice(&mut self) -> Result<(), GameError> {
        self.expect(Subphase::NeedsRoll)?;
        self.maybe_draw_event();

        let (d1, d2) = roll_dice(&mut *self.rng, self.game.dice_profile);
        let sum = d1 + d2;
        self.game.last_roll = Some(LastRoll {
            d1,
            d2,
            sum,
            at: self.now_ms,
            by: self.actor,
        });
        self.log(
            LogKind::Roll,
            Some(self.actor),
            format!("Rolled {sum} ({d1}+{d2})."),
            json!({ "d1": d1, "d2": d2, "sum": sum }),
        );

        // Harvest festival looks at hands as they were before this roll paid out
        let hands_before: Vec<(PlayerId, ResourceCounts)> = self
            .game
            .turn_order
            .iter()
            .map(|p| (*p, self.hand(*p)))
            .collect();

        if sum == 7 {
            self.start_robber();
        } else {
            self.game.subphase = Subphase::Main;
            self.produce(sum);
        }

        if self.game.active_event() == Some(EventKind::HarvestFestival) {
            self.harvest_festival(&hands_before);
        }
        Ok(())
    }

    fn maybe_draw_event(&mut self) {
        let variants = self.game.variants;
        if !variants.event_deck_enabled
            || !should_draw_event(self.game.turn_number, variants.event_draw_interval)
        {
            return;
        }
        let Some(kind) = self.game.event_deck.pop() else {
            return;
        };
        let event = ActiveEvent::new(kind, self.now_ms, self.game.turn_number);
        self.log(
            LogKind::Event,
            None,
            format!("Event: {}: {}", event.name, event.short_text),
            json!({ "eventId": kind, "eventDeckCount": self.game.event_deck.len() }),
        );
        self.game.current_event = Some(event);
    }

    fn produce(&mut self, sum: u8) {
        let mut gains: BTreeMap<PlayerId, ResourceCounts> = BTreeMap::new();
        for hex in &self.game.board.hexes {
            if hex.token != Some(sum) || hex.id == self.game.robber_hex_id {
                continue;
            }
            let Some(resource) = hex.resource.resource() else {
                continue;
            };
            for v in &hex.corner_vertex_ids {
                let Some(s) = self.game.structures.settlements.get(v) else {
                    continue;
                };
                if !self.game.has_player(&s.player_id) {
                    continue;
                }
                gains
                    .entry(s.player_id)
                    .or_default()
                    .add(resource, s.kind.weight());
            }
        }
        self.distribute(gains, "Resources distributed.", true);
    }

    fn harvest_festival(&mut self, hands_before: &[(PlayerId, ResourceCounts)]) {
        let mut gains = BTreeMap::new();
        for (player, hand) in hands_before {
            let Some(r) = hand.most_common() else {
                continue;
            };
            if self.game.bank.get(r) == 0 {
                continue;
            }
            let bonus = ResourceCounts::single(r, 1);
            self.draw_from_bank(*player, &bonus);
            gains.insert(*player, bonus);
        }
        if !gains.is_empty() {
            self.log(
                LogKind::Event,
                None,
                "Harvest Festival: +1 of each player's most common resource.",
                json!({ "gains": gains }),
            );
        }
    }

    // ==================== Robber ====================

    fn start_robber(&mut self) {
        let mut required = BTreeMap::new();
        for player in self.game.turn_order.clone() {
            let total = self.hand(player).total();
            if total > DISCARD_THRESHOLD {
                required.insert(player, total / 2);
            }
        }
        let owes = !required.is_empty();
        self.log(
            LogKind::Robber,
            Some(self.actor),
            "Rolled 7! Resolve the robber.",
            json!({ "discardRequiredByPlayerId": required }),
        );
        self.game.robber = Some(RobberState {
            discard_required_by_player_id: required,
            ..RobberState::default()
        });
        self.game.subphase = if owes {
            Subphase::RobberDiscard
        } else {
            Subphase::RobberMove
        };
    }

    fn discard(&mut self, counts: &ResourceCounts) -> Result<(), GameError> {
        self.expect(Subphase::RobberDiscard)?;
        let robber = self.game.robber.as_ref().ok_or(GameError::BadPhase)?;
        let required = robber
            .discard_required_by_player_id
            .get(&self.actor)
            .copied()
            .ok_or(GameError::NoDiscardRequired)?;
        if robber
            .discard_submitted_by_player_id
            .get(&self.actor)
            .copied()
            .unwrap_or(false)
        {
            return Err(GameError::AlreadyDiscarded);
        }
        if counts.total() != required {
            return Err(GameError::BadDiscard);
        }
        self.pay(self.actor, counts)?;

        let actor = self.actor;
        let mut done = false;
        if let Some(robber) = self.game.robber.as_mut() {
            robber.discard_submitted_by_player_id.insert(actor, true);
            done = robber.all_discarded();
        }
        self.log(
            LogKind::Robber,
            Some(actor),
            format!("Discarded {required} card(s)."),
            json!({ "count": required }),
        );
        if done {
            self.game.subphase = Subphase::RobberMove;
        }
        Ok(())
    }

    fn move_robber(&mut self, hex_id: &str) -> Result<(), GameError> {
        self.expect(Subphase::RobberMove)?;
        if self.game.board.hex(hex_id).is_none() {
            return Err(GameError::BadHex);
        }
        if hex_id == self.game.robber_hex_id {
            return Err(GameError::IllegalTarget);
        }

        self.game.robber_hex_id = hex_id.to_string();
        self.log(
            LogKind::Robber,
            Some(self.actor),
            "Moved the robber.",
            json!({ "hexId": hex_id }),
        );

        let victims = self.game.robber_victims(hex_id, self.actor);
        if victims.is_empty() {
            self.log(LogKind::Robber, Some(self.actor), "No one to steal from.", Value::Null);
            self.game.subphase = Subphase::Main;
            self.game.robber = None;
        } else {
            self.game
                .robber
                .get_or_insert_with(RobberState::default)
                .eligible_victim_player_ids = victims;
            self.game.subphase = Subphase::RobberSteal;
        }
        Ok(())
    }

    fn steal(&mut self, from: PlayerId) -> Result<(), GameError> {
        self.expect(Subphase::RobberSteal)?;
        let eligible = self
            .game
            .robber
            .as_ref()
            .is_some_and(|r| r.eligible_victim_player_ids.contains(&from));
        if !eligible {
            return Err(GameError::IllegalTarget);
        }

        let hand = self.hand(from);
        let stolen = match hand.total() {
            0 => None,
            total => hand.nth_card(self.rng.gen_range(0..total)),
        };
        if let Some(r) = stolen {
            self.transfer(from, self.actor, &ResourceCounts::single(r, 1));
        }
        let message = if stolen.is_some() {
            "Stole a card."
        } else {
            "Tried to steal, but they had no cards."
        };
        self.log(
            LogKind::Robber,
            Some(self.actor),
            message,
            json!({ "fromPlayerId": from, "didSteal": stolen.is_some() }),
        );
        self.game.subphase = Subphase::Main;
        self.game.robber = None;
        Ok(())
    }

    // ==================== Building ====================

    fn road_cost(&self) -> ResourceCounts {
        let mut cost = costs::road();
        if self.game.active_event() == Some(EventKind::RoadWork) {
            cost.wood = cost.wood.saturating_sub(1);
        }
        cost
    }

    fn build_road(&mut self, edge_id: &str) -> Result<(), GameError> {
        self.expect(Subphase::Main)?;
        self.check_road_slot(edge_id)?;
        if !self.game.is_legal_road(self.actor, edge_id) {
            return Err(GameError::IllegalPlacement);
        }
        let cost = self.road_cost();
        self.pay(self.actor, &cost)?;

        self.lay_road(edge_id);
        self.log(
            LogKind::Build,
            Some(self.actor),
            "Built a road.",
            json!({ "edgeId": edge_id }),
        );
        self.update_longest_road();
        Ok(())
    }

    fn build_settlement(&mut self, vertex_id: &str) -> Result<(), GameError> {
        self.expect(Subphase::Main)?;
        if self.game.board.vertex(vertex_id).is_none() {
            return Err(GameError::BadVertex);
        }
        if self.game.count_settlements(self.actor) >= MAX_SETTLEMENTS {
            return Err(GameError::OutOfPiecesSettlement);
        }
        if !self.game.is_legal_settlement(self.actor, vertex_id) {
            return Err(GameError::IllegalPlacement);
        }
        self.pay(self.actor, &costs::settlement())?;

        let actor = self.actor;
        self.game.structures.settlements.insert(
            vertex_id.to_string(),
            Settlement {
                player_id: actor,
                kind: StructureKind::Settlement,
            },
        );
        self.log(
            LogKind::Build,
            Some(actor),
            "Built a settlement.",
            json!({ "vertexId": vertex_id }),
        );
        self.update_longest_road();
        self.maybe_end_game(actor);
        Ok(())
    }

    fn build_city(&mut self, vertex_id: &str) -> Result<(), GameError> {
        self.expect(Subphase::Main)?;
        if self.game.board.vertex(vertex_id).is_none() {
            return Err(GameError::BadVertex);
        }
        let existing = self
            .game
            .structures
            .settlements
            .get(vertex_id)
            .ok_or(GameError::NoSettlement)?;
        if existing.player_id != self.actor {
            return Err(GameError::NotYours);
        }
        if existing.kind == StructureKind::City {
            return Err(GameError::AlreadyCity);
        }
        if self.game.count_cities(self.actor) >= MAX_CITIES {
            return Err(GameError::OutOfPiecesCity);
        }
        self.pay(self.actor, &costs::city())?;

        if let Some(s) = self.game.structures.settlements.get_mut(vertex_id) {
            s.kind = StructureKind::City;
        }
        self.log(
            LogKind::Build,
            Some(self.actor),
            "Upgraded to a city.",
            json!({ "vertexId": vertex_id }),
        );
        self.maybe_end_game(self.actor);
        Ok(())
    }

    // ==================== Development Cards ====================

    fn buy_dev_card(&mut self) -> Result<(), GameError> {
        self.expect(Subphase::Main)?;
        if self.game.dev_deck.is_empty() {
            return Err(GameError::DevDeckEmpty);
        }
        self.pay(self.actor, &costs::development_card())?;
        let card = self.game.dev_deck.pop().ok_or(GameError::DevDeckEmpty)?;
        self.deltas.entry(self.actor).dev_card_drawn = Some(card);
        self.log(
            LogKind::Dev,
            Some(self.actor),
            "Bought a development card.",
            json!({ "devDeckCount": self.game.dev_deck.len() }),
        );
        Ok(())
    }

    fn play_dev_card(
        &mut self,
        card: DevCard,
        take: Option<ResourceCounts>,
        resource_type: Option<Resource>,
    ) -> Result<(), GameError> {
        self.expect(Subphase::Main)?;
        if self.game.dev_card_played_this_turn {
            return Err(GameError::AlreadyPlayedDevCard);
        }
        if !card.is_playable() {
            return Err(GameError::BadDevCard);
        }
        let owned = self
            .privates
            .get(&self.actor)
            .map_or(0, |s| s.playable_count(card));
        if owned == 0 {
            return Err(GameError::NoDevCard);
        }

        let actor = self.actor;
        match card {
            DevCard::Knight => {
                self.mark_played(card);
                let knights = {
                    let n = self
                        .game
                        .played_knights_by_player_id
                        .entry(actor)
                        .or_insert(0);
                    *n += 1;
                    *n
                };
                self.deltas.entry(actor).knight_played = true;
                self.log(
                    LogKind::Dev,
                    Some(actor),
                    "Played a Knight.",
                    json!({ "playedKnights": knights }),
                );
                self.update_largest_army();
                if !self.game.is_over() {
                    self.game.subphase = Subphase::RobberMove;
                    self.game.robber = Some(RobberState::default());
                }
            }
            DevCard::RoadBuilding => {
                self.mark_played(card);
                let pieces_left = MAX_ROADS.saturating_sub(self.game.count_roads(actor));
                let roads_remaining = if self.game.legal_road_edge_ids(actor).is_empty() {
                    0
                } else {
                    pieces_left.min(2) as u32
                };
                self.log(
                    LogKind::Dev,
                    Some(actor),
                    "Played Road Building.",
                    json!({ "roadsRemaining": roads_remaining }),
                );
                if roads_remaining > 0 {
                    self.game.subphase = Subphase::DevRoadBuilding;
                    self.game.dev_road_building = Some(DevRoadBuilding { roads_remaining });
                }
            }
            DevCard::YearOfPlenty => {
                let take = take
                    .filter(|t| t.total() == 2)
                    .ok_or(GameError::BadDevSelection)?;
                if !self.game.bank.can_afford(&take) {
                    return Err(GameError::BankEmpty);
                }
                self.mark_played(card);
                self.draw_from_bank(actor, &take);
                self.log(
                    LogKind::Dev,
                    Some(actor),
                    "Played Year of Plenty.",
                    json!({ "take": take }),
                );
            }
            DevCard::Monopoly => {
                let resource = resource_type.ok_or(GameError::BadDevSelection)?;
                self.mark_played(card);
                let mut taken = 0;
                for other in self.game.turn_order.clone() {
                    if other == actor {
                        continue;
                    }
                    let n = self.hand(other).get(resource);
                    if n > 0 {
                        self.transfer(other, actor, &ResourceCounts::single(resource, n));
                        taken += n;
                    }
                }
                self.log(
                    LogKind::Dev,
                    Some(actor),
                    format!("Played Monopoly ({resource})."),
                    json!({ "resourceType": resource, "taken": taken }),
                );
            }
            DevCard::VictoryPoint => return Err(GameError::BadDevCard),
        }
        Ok(())
    }

    fn mark_played(&mut self, card: DevCard) {
        self.game.dev_card_played_this_turn = true;
        self.game.dev_discard.push(card);
        self.deltas.entry(self.actor).dev_card_played = Some(card);
    }

    fn place_free_road(&mut self, edge_id: &str) -> Result<(), GameError> {
        self.expect(Subphase::DevRoadBuilding)?;
        let remaining = self
            .game
            .dev_road_building
            .map(|d| d.roads_remaining)
            .filter(|n| *n > 0)
            .ok_or(GameError::BadPhase)?;
        self.check_road_slot(edge_id)?;
        if !self.game.is_legal_road(self.actor, edge_id) {
            return Err(GameError::IllegalPlacement);
        }

        self.lay_road(edge_id);
        let remaining = remaining - 1;
        self.log(
            LogKind::Build,
            Some(self.actor),
            "Built a free road.",
            json!({ "edgeId": edge_id, "roadsRemaining": remaining }),
        );
        let can_continue = remaining > 0
            && self.game.count_roads(self.actor) < MAX_ROADS
            && !self.game.legal_road_edge_ids(self.actor).is_empty();
        if can_continue {
            self.game.dev_road_building = Some(DevRoadBuilding {
                roads_remaining: remaining,
            });
        } else {
            self.game.dev_road_building = None;
            self.game.subphase = Subphase::Main;
        }
        self.update_longest_road();
        Ok(())
    }

    // ==================== Trading ====================

    fn bank_trade(
        &mut self,
        give: &ResourceCounts,
        receive: &ResourceCounts,
    ) -> Result<(), GameError> {
        self.expect(Subphase::Main)?;
        let (give_type, give_count) = give.single_kind().ok_or(GameError::BadTrade)?;
        let (want_type, want_count) = receive.single_kind().ok_or(GameError::BadTrade)?;
        if give_type == want_type {
            return Err(GameError::BadTrade);
        }
        let ratio = self.game.bank_trade_ratio(self.actor, give_type);
        if give_count != ratio * want_count {
            return Err(GameError::BadTrade);
        }
        if !self.hand(self.actor).can_afford(give) {
            return Err(GameError::NotEnoughResources);
        }
        if self.game.bank.get(want_type) < want_count {
            return Err(GameError::BankEmpty);
        }

        let actor = self.actor;
        self.pay(actor, give)?;
        self.draw_from_bank(actor, receive);
        let bonus = self.game.active_event() == Some(EventKind::MerchantShips)
            && self.game.bank.get(want_type) > 0;
        if bonus {
            self.draw_from_bank(actor, &ResourceCounts::single(want_type, 1));
        }
        self.log(
            LogKind::Bank,
            Some(actor),
            "Traded with the bank.",
            json!({ "give": give, "receive": receive, "ratio": ratio, "bonus": bonus }),
        );
        Ok(())
    }

    fn create_offer(
        &mut self,
        to: TradeTarget,
        give: &ResourceCounts,
        want: &ResourceCounts,
    ) -> Result<(), GameError> {
        self.expect(Subphase::Main)?;
        if let TradeTarget::Player(target) = to {
            if target == self.actor || !self.game.has_player(&target) {
                return Err(GameError::BadTradeTo);
            }
        }
        if give.is_empty() || want.is_empty() {
            return Err(GameError::BadTrade);
        }
        if !self.hand(self.actor).can_afford(give) {
            return Err(GameError::NotEnoughResources);
        }

        let offer = TradeOffer {
            id: random_uuid(&mut *self.rng),
            created_at: self.now_ms,
            from_player_id: self.actor,
            to,
            give: *give,
            want: *want,
            status: TradeStatus::Open,
            accepted_by_player_id: None,
            rejected_by_player_ids: Vec::new(),
        };
        let data = json!({ "offerId": offer.id, "to": to, "give": give, "want": want });
        self.game.trade_offers.push(offer);
        self.log(LogKind::Trade, Some(self.actor), "Offered a trade.", data);
        Ok(())
    }

    fn offer_index(&self, offer_id: uuid::Uuid) -> Result<usize, GameError> {
        let idx = self
            .game
            .trade_offers
            .iter()
            .position(|o| o.id == offer_id)
            .ok_or(GameError::NoSuchOffer)?;
        if self.game.trade_offers[idx].status != TradeStatus::Open {
            return Err(GameError::OfferClosed);
        }
        Ok(idx)
    }

    fn cancel_offer(&mut self, offer_id: uuid::Uuid) -> Result<(), GameError> {
        self.expect(Subphase::Main)?;
        let idx = self.offer_index(offer_id)?;
        if self.game.trade_offers[idx].from_player_id != self.actor {
            return Err(GameError::NotYours);
        }
        self.game.trade_offers[idx].status = TradeStatus::Cancelled;
        self.log(
            LogKind::Trade,
            Some(self.actor),
            "Cancelled the trade.",
            json!({ "offerId": offer_id }),
        );
        Ok(())
    }

    fn respond_to_offer(
        &mut self,
        offer_id: uuid::Uuid,
        response: OfferResponse,
    ) -> Result<(), GameError> {
        self.expect(Subphase::Main)?;
        let idx = self.offer_index(offer_id)?;
        let offer = self.game.trade_offers[idx].clone();
        let actor = self.actor;
        if offer.from_player_id == actor {
            return Err(GameError::CannotAcceptOwnOffer);
        }
        if !offer.to.includes(&actor) {
            return Err(GameError::NotForYou);
        }
        if offer.rejected_by_player_ids.contains(&actor) {
            return Err(GameError::AlreadyRejected);
        }

        match response {
            OfferResponse::Accept => {
                if !self.hand(offer.from_player_id).can_afford(&offer.give)
                    || !self.hand(actor).can_afford(&offer.want)
                {
                    return Err(GameError::NotEnoughResources);
                }
                self.transfer(offer.from_player_id, actor, &offer.give);
                self.transfer(actor, offer.from_player_id, &offer.want);
                let stored = &mut self.game.trade_offers[idx];
                stored.status = TradeStatus::Accepted;
                stored.accepted_by_player_id = Some(actor);
                self.log(
                    LogKind::Trade,
                    Some(actor),
                    "Accepted the trade.",
                    json!({ "offerId": offer_id, "fromPlayerId": offer.from_player_id }),
                );
            }
            OfferResponse::Reject => {
                let turn_order = self.game.turn_order.clone();
                let stored = &mut self.game.trade_offers[idx];
                stored.rejected_by_player_ids.push(actor);
                if everyone_rejected(stored, &turn_order) {
                    stored.status = TradeStatus::Rejected;
                }
                self.log(
                    LogKind::Trade,
                    Some(actor),
                    "Rejected the trade.",
                    json!({ "offerId": offer_id }),
                );
            }
        }
        Ok(())
    }

    // ==================== Turn Management ====================

    /// Close out the actor's turn and hand over to the next player.
    pub(crate) fn end_turn(&mut self) {
        let actor = self.actor;
        for offer in &mut self.game.trade_offers {
            if offer.from_player_id == actor && offer.status == TradeStatus::Open {
                offer.status = TradeStatus::Expired;
            }
        }
        trim_closed_offers(&mut self.game.trade_offers);

        if let Some(event) = self.game.current_event.take() {
            self.log(
                LogKind::Event,
                None,
                format!("Event ended: {}.", event.name),
                json!({ "eventId": event.id }),
            );
        }

        let n = self.game.turn_order.len();
        if n > 0 {
            let next = (self.game.current_player_index + 1) % n;
            if next == 0 {
                self.game.turn_number += 1;
            }
            self.game.current_player_index = next;
        }
        self.game.subphase = Subphase::NeedsRoll;
        self.game.dev_card_played_this_turn = false;
        self.game.robber = None;
        self.game.dev_road_building = None;
        let next_player = self.game.current_player_id();
        self.log(
            LogKind::Turn,
            Some(actor),
            "Ended their turn.",
            json!({ "nextPlayerId": next_player, "turnNumber": self.game.turn_number }),
        );
        self.deltas.entry(actor).promote_new_cards = true;
    }

    // ==================== Awards and Victory ====================

    /// Largest Army moves only when a player strictly passes the holder.
    fn update_largest_army(&mut self) {
        let actor = self.actor;
        let count = knights(&self.game, actor);
        if count < LARGEST_ARMY_MIN_KNIGHTS {
            return;
        }
        let holder = self.game.awards.largest_army_player_id;
        if holder == Some(actor) {
            return;
        }
        if holder.is_some_and(|h| knights(&self.game, h) >= count) {
            return;
        }
        self.game.awards.largest_army_player_id = Some(actor);
        self.log(
            LogKind::Award,
            Some(actor),
            "Took Largest Army.",
            json!({ "playedKnights": count }),
        );
        self.maybe_end_game(actor);
    }

    pub(crate) fn update_longest_road(&mut self) {
        let award = compute_award(
            &self.game.board,
            &self.game.structures,
            &self.game.turn_order,
        );
        let previous = self.game.awards.longest_road_player_id;
        let length = if award.holder.is_some() { award.length } else { 0 };
        if award.holder == previous && length == self.game.awards.longest_road_length {
            return;
        }
        self.game.awards.longest_road_player_id = award.holder;
        self.game.awards.longest_road_length = length;

        match award.holder {
            Some(holder) if previous != Some(holder) => {
                self.log(
                    LogKind::Award,
                    Some(holder),
                    format!("Took Longest Road ({length})."),
                    json!({ "length": length }),
                );
                if self.game.current_player_id() == Some(holder) {
                    self.maybe_end_game(holder);
                }
            }
            None => {
                if let Some(lost) = previous {
                    let reason = if award.length < award.min_length {
                        "below_min"
                    } else {
                        "tie"
                    };
                    self.log(
                        LogKind::Award,
                        None,
                        "Longest Road is unclaimed.",
                        json!({ "previousPlayerId": lost, "reason": reason, "length": award.length }),
                    );
                }
            }
            Some(_) => {}
        }
    }

    /// Public points only. Hidden points are checked after the action.
    fn maybe_end_game(&mut self, player: PlayerId) {
        if self.game.phase != Phase::Turn {
            return;
        }
        let points = self.game.public_points(player);
        let target = self.game.victory_points_to_win;
        if points < target {
            return;
        }
        self.game.end_game(Some(player));
        self.log(
            LogKind::System,
            Some(player),
            format!("Won the game with {points} VP!"),
            json!({ "points": points, "target": target }),
        );
    }

    /// Public plus hidden points for one player; ends the game when they
    /// reach the target.
    pub(crate) fn check_total_points(&mut self, player: PlayerId) -> bool {
        if self.game.phase != Phase::Turn {
            return false;
        }
        let hidden = self.hidden_points(player);
        let total = self.game.public_points(player) + hidden;
        let target = self.game.victory_points_to_win;
        if total < target {
            return false;
        }
        self.game.end_game(Some(player));
        self.log(
            LogKind::System,
            Some(player),
            format!("Won the game with {total} VP!"),
            json!({ "points": total, "target": target, "hiddenVictoryPointsCount": hidden }),
        );
        true
    }

    fn check_secret_win(&mut self) {
        let actor = self.actor;
        if self.game.current_player_id() != Some(actor) || self.hidden_points(actor) == 0 {
            return;
        }
        self.check_total_points(actor);
    }
}

pub(crate) fn knights(game: &Game, player: PlayerId) -> u32 {
    game.played_knights_by_player_id
        .get(&player)
        .copied()
        .unwrap_or(0)
}

/// A targeted offer closes on its target's rejection; an open-to-all offer
/// once every other seated player has rejected it.
pub(crate) fn everyone_rejected(offer: &TradeOffer, turn_order: &[PlayerId]) -> bool {
    match offer.to {
        TradeTarget::Player(target) => offer.rejected_by_player_ids.contains(&target),
        TradeTarget::All => turn_order
            .iter()
            .filter(|p| **p != offer.from_player_id)
            .all(|p| offer.rejected_by_player_ids.contains(p)),
    }
}

fn trim_closed_offers(offers: &mut Vec<TradeOffer>) {
    let mut excess = offers.len().saturating_sub(TRADE_OFFER_HISTORY);
    offers.retain(|o| {
        if excess > 0 && o.status != TradeStatus::Open {
            excess -= 1;
            return false;
        }
        true
    });
}
