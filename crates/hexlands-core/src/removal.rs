//! Removing a seated player from a running game.
//!
//! The removed player's hand goes back to the bank and every piece of turn
//! bookkeeping that mentions them is re-derived: turn and placement order,
//! robber discards and victims, open offers, awards. Buildings and roads stay
//! on the board.

use crate::actions::TradeTarget;
use crate::game::{
    Game, GameError, LogKind, Phase, PlayerId, Subphase, TradeStatus, LARGEST_ARMY_MIN_KNIGHTS,
};
use crate::private::PrivateStates;
use crate::rules::{everyone_rejected, knights, Outcome, Turn};
use rand::Rng;
use serde_json::{json, Value};

/// Remove `player` from `game`.
///
/// A player removed while it is their main phase ends their turn first, so
/// their offers expire normally. If they held the turn in any other subphase
/// the next player starts fresh at `needs_roll`.
pub fn remove_player<R: Rng + ?Sized>(
    game: &Game,
    privates: &PrivateStates,
    player: PlayerId,
    rng: &mut R,
    now_ms: u64,
) -> Result<Outcome, GameError> {
    if !game.has_player(&player) {
        return Err(GameError::UnknownPlayer);
    }

    let mut turn = Turn::new(game.clone(), privates, player, rng, now_ms);
    let was_current = game.current_player_id() == Some(player);
    if was_current && game.phase == Phase::Turn && game.subphase == Subphase::Main {
        turn.end_turn();
    }
    turn.discard_hand(player);

    drop_from_turn_order(&mut turn.game, player);
    if !turn.game.is_over() {
        drop_from_setup(&mut turn.game, player);
    }
    turn.game.played_knights_by_player_id.remove(&player);

    if was_current && turn.game.phase == Phase::Turn {
        let g = &mut turn.game;
        g.subphase = Subphase::NeedsRoll;
        g.robber = None;
        g.dev_road_building = None;
        g.dev_card_played_this_turn = false;
    }

    close_offers(&mut turn.game, player);

    let had_victims = turn
        .game
        .robber
        .as_ref()
        .is_some_and(|r| !r.eligible_victim_player_ids.is_empty());
    if let Some(robber) = turn.game.robber.as_mut() {
        robber.discard_required_by_player_id.remove(&player);
        robber.discard_submitted_by_player_id.remove(&player);
        robber.eligible_victim_player_ids.retain(|p| *p != player);
    }
    match turn.game.subphase {
        Subphase::RobberDiscard => {
            if turn.game.robber.as_ref().map_or(true, |r| r.all_discarded()) {
                turn.game.subphase = Subphase::RobberMove;
            }
        }
        Subphase::RobberSteal => {
            let none_left = turn
                .game
                .robber
                .as_ref()
                .map_or(true, |r| r.eligible_victim_player_ids.is_empty());
            if none_left && had_victims {
                turn.log(LogKind::Robber, None, "No one to steal from.", Value::Null);
                turn.game.subphase = Subphase::Main;
                turn.game.robber = None;
            }
        }
        _ => {}
    }

    if !turn.game.is_over() {
        recompute_awards(&mut turn);
        for candidate in turn.game.turn_order.clone() {
            if turn.check_total_points(candidate) {
                break;
            }
        }
    }

    Ok(turn.finish())
}

fn drop_from_turn_order(game: &mut Game, player: PlayerId) {
    let Some(idx) = game.turn_order.iter().position(|p| *p == player) else {
        return;
    };
    game.turn_order.remove(idx);
    if idx < game.current_player_index {
        game.current_player_index -= 1;
    }
    if game.current_player_index >= game.turn_order.len() {
        game.current_player_index = 0;
    }
    if game.turn_order.is_empty() {
        game.end_game(None);
    }
}

fn drop_from_setup(game: &mut Game, player: PlayerId) {
    let setup = &mut game.setup;
    let was_placing = setup.placement_order.get(setup.placement_index) == Some(&player);
    let removed_before = setup.placement_order[..setup.placement_index.min(setup.placement_order.len())]
        .iter()
        .filter(|p| **p == player)
        .count();
    setup.placement_order.retain(|p| *p != player);
    setup.placement_index -= removed_before;
    setup.settlements_placed_by_player_id.remove(&player);

    if !game.phase.is_setup() {
        return;
    }
    // A settlement without its road stays on the board; the next player
    // starts a fresh placement.
    if was_placing && game.subphase == Subphase::SetupRoad {
        game.subphase = Subphase::SetupSettlement;
        game.setup.last_settlement_vertex_id = None;
    }
    if game.setup.placement_index >= game.setup.placement_order.len() {
        game.phase = Phase::Turn;
        game.subphase = Subphase::NeedsRoll;
        game.current_player_index = 0;
    } else if game.setup.placement_index < game.turn_order.len() {
        game.phase = Phase::SetupRound1;
    } else {
        game.phase = Phase::SetupRound2;
    }
}

fn close_offers(game: &mut Game, player: PlayerId) {
    let turn_order = game.turn_order.clone();
    for offer in &mut game.trade_offers {
        offer.rejected_by_player_ids.retain(|p| *p != player);
        if offer.status != TradeStatus::Open {
            continue;
        }
        if offer.from_player_id == player || offer.to == TradeTarget::Player(player) {
            offer.status = TradeStatus::Cancelled;
        } else if offer.to == TradeTarget::All && everyone_rejected(offer, &turn_order) {
            offer.status = TradeStatus::Rejected;
        }
    }
}

/// Both awards are re-derived over the remaining players after every removal.
/// Longest Road can change hands even when the removed player did not hold
/// it, since a tie at the top may now have a unique leader.
fn recompute_awards<R: Rng + ?Sized>(turn: &mut Turn<'_, R>) {
    turn.update_longest_road();

    let holder = turn.game.awards.largest_army_player_id;
    if holder.is_some_and(|h| turn.game.turn_order.contains(&h)) {
        return;
    }
    let mut best: Option<(PlayerId, u32)> = None;
    for p in &turn.game.turn_order {
        let n = knights(&turn.game, *p);
        if n >= LARGEST_ARMY_MIN_KNIGHTS && best.map_or(true, |(_, b)| n > b) {
            best = Some((*p, n));
        }
    }
    let next = best.map(|(p, _)| p);
    if next == holder {
        return;
    }
    turn.game.awards.largest_army_player_id = next;
    match best {
        Some((p, n)) => turn.log(
            LogKind::Award,
            Some(p),
            "Took Largest Army.",
            json!({ "playedKnights": n }),
        ),
        None => turn.log(
            LogKind::Award,
            None,
            "Largest Army is unclaimed.",
            json!({ "previousPlayerId": holder }),
        ),
    }
}
