//! Integration tests for the Hexlands rules engine.
//!
//! These drive whole games through `apply` and check the properties that must
//! hold across many actions: resource conservation, the robber flow, trading
//! and victory.

use hexlands_core::board::{Board, PortKind};
use hexlands_core::hex::HexCoord;
use hexlands_core::presets::RANDOM_PRESET_ID;
use hexlands_core::resources::{costs, BANK_SUPPLY};
use hexlands_core::rules::roll_dice;
use hexlands_core::snapshot::hints;
use hexlands_core::*;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

struct Table {
    game: Game,
    privates: PrivateStates,
    rng: ChaCha8Rng,
    now: u64,
}

impl Table {
    fn new(players: usize, seed: u64) -> Self {
        Self::with_options(players, seed, |_| {})
    }

    fn with_options(players: usize, seed: u64, tweak: impl FnOnce(&mut NewGameOptions)) -> Self {
        let ids: Vec<PlayerId> = (0..players).map(|_| Uuid::new_v4()).collect();
        let mut opts = NewGameOptions::new(ids.clone());
        tweak(&mut opts);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let game = Game::new(opts, &mut rng, 0).unwrap();
        let privates = ids.iter().map(|p| (*p, PrivateState::default())).collect();
        Self {
            game,
            privates,
            rng,
            now: 0,
        }
    }

    fn seat(&self, i: usize) -> PlayerId {
        self.game.turn_order[i]
    }

    fn current(&self) -> PlayerId {
        self.game.current_player_id().unwrap()
    }

    fn hand(&self, p: PlayerId) -> ResourceCounts {
        self.privates[&p].hand
    }

    fn act(&mut self, actor: PlayerId, action: Action) -> Result<(), GameError> {
        self.now += 1;
        let outcome = apply(
            &self.game,
            &self.privates,
            actor,
            &action,
            &mut self.rng,
            self.now,
        )?;
        apply_deltas(&mut self.privates, &outcome.private_deltas);
        self.game = outcome.game;
        Ok(())
    }

    fn must(&mut self, actor: PlayerId, action: Action) {
        let kind = action.kind();
        if let Err(e) = self.act(actor, action) {
            panic!("{kind} by {actor} failed: {e:?}");
        }
    }

    /// Move cards from the bank into a hand
    fn grant(&mut self, p: PlayerId, counts: ResourceCounts) {
        assert!(self.game.bank.can_afford(&counts));
        self.game.bank.saturating_sub_counts(&counts);
        self.privates.get_mut(&p).unwrap().hand.add_counts(&counts);
    }

    fn assert_conserved(&self) {
        for r in Resource::ALL {
            let held: u32 = self.privates.values().map(|s| s.hand.get(r)).sum();
            assert_eq!(
                self.game.bank.get(r) + held,
                BANK_SUPPLY,
                "{r} not conserved"
            );
        }
    }

    fn finish_setup(&mut self) {
        while self.game.phase.is_setup() {
            let p = self.current();
            let h = hints(&self.game);
            match h.expected.as_deref() {
                Some("PLACE_SETTLEMENT") => self.must(
                    p,
                    Action::PlaceSettlement {
                        vertex_id: h.legal_vertex_ids[0].clone(),
                    },
                ),
                Some("PLACE_ROAD") => self.must(
                    p,
                    Action::PlaceRoad {
                        edge_id: h.legal_edge_ids[0].clone(),
                    },
                ),
                other => panic!("unexpected setup hint {other:?}"),
            }
            self.assert_conserved();
        }
    }

    fn place(&mut self, p: PlayerId, vertex_id: &str, kind: StructureKind) {
        self.game.structures.settlements.insert(
            vertex_id.to_string(),
            hexlands_core::game::Settlement { player_id: p, kind },
        );
    }

    /// Skip setup and hand the turn to seat 0 in `main`
    fn jump_to_main(&mut self) {
        self.game.phase = Phase::Turn;
        self.game.subphase = Subphase::Main;
        self.game.current_player_index = 0;
    }

    /// Re-seed until the next roll satisfies `want`, returning the sum
    fn rig_roll(&mut self, want: impl Fn(u8) -> bool) -> u8 {
        for seed in 0.. {
            let mut probe = ChaCha8Rng::seed_from_u64(seed);
            let (d1, d2) = roll_dice(&mut probe, DiceProfile::Standard);
            if want(d1 + d2) {
                self.rng = ChaCha8Rng::seed_from_u64(seed);
                return d1 + d2;
            }
        }
        unreachable!()
    }

    fn rig_seven(&mut self) {
        self.rig_roll(|sum| sum == 7);
    }

    /// One step of a simple greedy player. Returns false once the game is over.
    fn step(&mut self) -> bool {
        if self.game.is_over() {
            return false;
        }
        let p = self.current();
        match self.game.subphase {
            Subphase::NeedsRoll => self.must(p, Action::RollDice),
            Subphase::RobberDiscard => {
                let robber = self.game.robber.clone().unwrap();
                for (debtor, owed) in robber.discard_required_by_player_id {
                    if robber
                        .discard_submitted_by_player_id
                        .get(&debtor)
                        .copied()
                        .unwrap_or(false)
                    {
                        continue;
                    }
                    let counts = pick_cards(self.hand(debtor), owed);
                    self.must(debtor, Action::DiscardCards { counts });
                }
            }
            Subphase::RobberMove => {
                let hex_id = self.game.legal_robber_hex_ids()[0].clone();
                self.must(p, Action::MoveRobber { hex_id });
            }
            Subphase::RobberSteal => {
                let victim = self.game.robber.as_ref().unwrap().eligible_victim_player_ids[0];
                self.must(
                    p,
                    Action::StealCard {
                        from_player_id: victim,
                    },
                );
            }
            Subphase::DevRoadBuilding => {
                let edge_id = self.game.legal_road_edge_ids(p)[0].clone();
                self.must(p, Action::DevRoadBuildingPlaceRoad { edge_id });
            }
            Subphase::Main => self.main_move(p),
            other => panic!("unexpected subphase {other:?}"),
        }
        true
    }

    fn main_move(&mut self, p: PlayerId) {
        let hand = self.hand(p);
        let cities = self.game.legal_city_vertex_ids(p);
        if hand.can_afford(&costs::city()) && !cities.is_empty() && self.game.count_cities(p) < 4 {
            return self.must(
                p,
                Action::BuildCity {
                    vertex_id: cities[0].clone(),
                },
            );
        }
        let spots = self.game.legal_settlement_vertex_ids(p);
        if hand.can_afford(&costs::settlement())
            && !spots.is_empty()
            && self.game.count_settlements(p) < 5
        {
            return self.must(
                p,
                Action::BuildSettlement {
                    vertex_id: spots[0].clone(),
                },
            );
        }
        let roads = self.game.legal_road_edge_ids(p);
        if hand.can_afford(&costs::road()) && !roads.is_empty() && self.game.count_roads(p) < 15 {
            return self.must(
                p,
                Action::BuildRoad {
                    edge_id: roads[0].clone(),
                },
            );
        }
        if hand.can_afford(&costs::development_card()) && !self.game.dev_deck.is_empty() {
            return self.must(p, Action::BuyDevCard);
        }
        let state = &self.privates[&p];
        if !self.game.dev_card_played_this_turn && state.playable_count(DevCard::Knight) > 0 {
            return self.must(
                p,
                Action::PlayDevCard {
                    card: DevCard::Knight,
                    take: None,
                    resource_type: None,
                },
            );
        }
        if let Some((give, receive)) = self.bank_trade_for(p) {
            return self.must(p, Action::BankTrade { give, receive });
        }
        self.must(p, Action::EndTurn);
    }

    fn bank_trade_for(&self, p: PlayerId) -> Option<(ResourceCounts, ResourceCounts)> {
        let hand = self.hand(p);
        let give = Resource::ALL.into_iter().find(|r| {
            let ratio = self.game.bank_trade_ratio(p, *r);
            hand.get(*r) >= ratio
        })?;
        let receive = Resource::ALL
            .into_iter()
            .filter(|r| *r != give && self.game.bank.get(*r) > 0)
            .min_by_key(|r| hand.get(*r))?;
        let ratio = self.game.bank_trade_ratio(p, give);
        Some((
            ResourceCounts::single(give, ratio),
            ResourceCounts::single(receive, 1),
        ))
    }
}

/// Take `n` cards from a hand in canonical order
fn pick_cards(hand: ResourceCounts, n: u32) -> ResourceCounts {
    let mut out = ResourceCounts::default();
    let mut left = n;
    for r in Resource::ALL {
        let take = hand.get(r).min(left);
        out.add(r, take);
        left -= take;
    }
    out
}

/// Corners of the centre hex and the five edges joining them in order.
/// Every corner is inland, so each has a third edge pointing outward.
fn center_ring(board: &Board) -> (Vec<String>, Vec<String>) {
    let hex = board.hexes.iter().find(|h| h.q == 0 && h.r == 0).unwrap();
    let corners = hex.corner_vertex_ids.clone();
    let edges = corners
        .windows(2)
        .map(|w| board.edge_between(&w[0], &w[1]).unwrap().to_string())
        .collect();
    (corners, edges)
}

// ==================== Board Generation ====================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_balanced_boards_keep_hot_tokens_apart(seed in "[a-z0-9]{1,16}") {
        let preset = preset_definition(RANDOM_PRESET_ID, Some(&seed)).unwrap();
        let board = generate(&preset.layout).unwrap();
        prop_assert_eq!(board.hexes.len(), 19);

        let hot: Vec<HexCoord> = board
            .hexes
            .iter()
            .filter(|h| matches!(h.token, Some(6) | Some(8)))
            .map(|h| HexCoord::new(h.q, h.r))
            .collect();
        for (i, a) in hot.iter().enumerate() {
            for b in &hot[i + 1..] {
                prop_assert_ne!(a.distance_to(b), 1);
            }
        }

        let deserts: Vec<_> = board.hexes.iter().filter(|h| h.resource == Terrain::Desert).collect();
        prop_assert_eq!(deserts.len(), 1);
        prop_assert!(!HexCoord::new(deserts[0].q, deserts[0].r).is_board_corner());
        prop_assert_eq!(deserts[0].token, None);
    }
}

#[test]
fn test_same_seed_same_board() {
    let a = preset_definition(RANDOM_PRESET_ID, Some("table-7")).unwrap();
    let b = preset_definition(RANDOM_PRESET_ID, Some("table-7")).unwrap();
    assert_eq!(a.layout, b.layout);
}

// ==================== Whole Games ====================

#[test]
fn test_setup_flow_grants_starting_resources() {
    let mut t = Table::new(3, 1);
    t.finish_setup();
    assert_eq!(t.game.phase, Phase::Turn);
    assert_eq!(t.game.subphase, Subphase::NeedsRoll);
    assert_eq!(t.current(), t.seat(0));
    assert_eq!(t.game.structures.settlements.len(), 6);
    assert_eq!(t.game.structures.roads.len(), 6);
    for p in t.game.turn_order.clone() {
        assert_eq!(t.game.public_points(p), 2);
    }
    let dealt: u32 = t.privates.values().map(|s| s.hand.total()).sum();
    assert!(dealt > 0);
    t.assert_conserved();
}

#[test]
fn test_conservation_across_simulated_games() {
    for seed in [3_u64, 17, 99] {
        let mut t = Table::new(4, seed);
        t.finish_setup();
        for _ in 0..1500 {
            if !t.step() {
                break;
            }
            t.assert_conserved();
            for p in &t.game.turn_order {
                assert!(t.game.count_roads(*p) <= 15);
                assert!(t.game.count_settlements(*p) <= 5);
                assert!(t.game.count_cities(*p) <= 4);
            }
        }
    }
}

#[test]
fn test_conservation_with_event_deck() {
    let mut t = Table::with_options(3, 23, |opts| {
        opts.variants.event_deck_enabled = true;
        opts.variants.event_draw_interval = 1;
        opts.preset_id = RANDOM_PRESET_ID.to_string();
        opts.board_seed = Some("events".into());
    });
    t.finish_setup();
    let mut saw_event = false;
    for _ in 0..800 {
        if !t.step() {
            break;
        }
        saw_event |= t.game.current_event.is_some();
        t.assert_conserved();
    }
    assert!(saw_event);
}

// ==================== Robber ====================

#[test]
fn test_seven_with_nine_and_six_cards() {
    let mut t = Table::new(3, 2);
    t.jump_to_main();
    t.game.subphase = Subphase::NeedsRoll;
    let (p0, p1, p2) = (t.seat(0), t.seat(1), t.seat(2));
    t.grant(p1, ResourceCounts::with_amounts(3, 2, 2, 1, 1));
    t.grant(p2, ResourceCounts::with_amounts(2, 2, 2, 0, 0));
    t.rig_seven();

    t.must(p0, Action::RollDice);
    assert_eq!(t.game.last_roll.unwrap().sum, 7);
    assert_eq!(t.game.subphase, Subphase::RobberDiscard);
    let robber = t.game.robber.clone().unwrap();
    assert_eq!(robber.discard_required_by_player_id.len(), 1);
    assert_eq!(robber.discard_required_by_player_id[&p1], 4);

    let here = t.game.legal_robber_hex_ids()[0].clone();
    assert_eq!(
        t.act(p0, Action::MoveRobber { hex_id: here }),
        Err(GameError::BadPhase)
    );
    assert_eq!(
        t.act(
            p2,
            Action::DiscardCards {
                counts: ResourceCounts::single(Resource::Wood, 1)
            }
        ),
        Err(GameError::NoDiscardRequired)
    );
    assert_eq!(
        t.act(
            p1,
            Action::DiscardCards {
                counts: ResourceCounts::single(Resource::Wood, 3)
            }
        ),
        Err(GameError::BadDiscard)
    );
    assert_eq!(
        t.act(
            p1,
            Action::DiscardCards {
                counts: ResourceCounts::single(Resource::Ore, 4)
            }
        ),
        Err(GameError::NotEnoughResources)
    );

    t.must(
        p1,
        Action::DiscardCards {
            counts: ResourceCounts::with_amounts(3, 1, 0, 0, 0),
        },
    );
    assert_eq!(t.hand(p1).total(), 5);
    assert_eq!(t.hand(p2).total(), 6);
    assert_eq!(t.game.subphase, Subphase::RobberMove);
    assert_eq!(
        t.act(
            p1,
            Action::DiscardCards {
                counts: ResourceCounts::single(Resource::Sheep, 4)
            }
        ),
        Err(GameError::BadPhase)
    );
    t.assert_conserved();
}

#[test]
fn test_steal_takes_one_card_from_victim() {
    let mut t = Table::new(3, 4);
    t.jump_to_main();
    t.game.subphase = Subphase::RobberMove;
    let (p0, p1) = (t.seat(0), t.seat(1));
    let target = t
        .game
        .board
        .hexes
        .iter()
        .find(|h| h.id != t.game.robber_hex_id)
        .unwrap()
        .clone();
    t.place(p1, &target.corner_vertex_ids[0], StructureKind::Settlement);
    t.place(p0, &target.corner_vertex_ids[3], StructureKind::Settlement);
    t.grant(p1, ResourceCounts::with_amounts(0, 0, 2, 0, 1));

    t.must(p0, Action::MoveRobber { hex_id: target.id.clone() });
    assert_eq!(t.game.subphase, Subphase::RobberSteal);
    assert_eq!(
        t.game.robber.as_ref().unwrap().eligible_victim_player_ids,
        vec![p1]
    );
    assert_eq!(
        t.act(p0, Action::StealCard { from_player_id: t.seat(2) }),
        Err(GameError::IllegalTarget)
    );
    t.must(p0, Action::StealCard { from_player_id: p1 });
    assert_eq!(t.hand(p0).total(), 1);
    assert_eq!(t.hand(p1).total(), 2);
    assert_eq!(t.game.subphase, Subphase::Main);
    t.assert_conserved();
}

#[test]
fn test_robber_blocks_production() {
    let mut t = Table::new(3, 6);
    t.jump_to_main();
    t.game.subphase = Subphase::NeedsRoll;
    let p0 = t.seat(0);
    let sum = t.rig_roll(|sum| sum != 7);

    // A corner whose only producing hex for this roll is the robbed one
    let board = t.game.board.clone();
    let (hex_id, vertex_id) = board
        .hexes
        .iter()
        .filter(|h| h.token == Some(sum))
        .flat_map(|h| h.corner_vertex_ids.iter().map(move |v| (h, v)))
        .find(|(h, v)| {
            board.vertex(v).unwrap().adjacent_hex_ids.iter().all(|other| {
                *other == h.id || board.hex(other).unwrap().token != Some(sum)
            })
        })
        .map(|(h, v)| (h.id.clone(), v.clone()))
        .unwrap();
    t.place(p0, &vertex_id, StructureKind::City);
    t.game.robber_hex_id = hex_id;

    t.must(p0, Action::RollDice);
    assert_eq!(t.game.last_roll.unwrap().sum, sum);
    assert_eq!(t.hand(p0).total(), 0);
    t.assert_conserved();
}

// ==================== Trading ====================

#[test]
fn test_wheat_port_trades_two_for_one() {
    let mut t = Table::new(3, 8);
    t.jump_to_main();
    let p0 = t.seat(0);
    let wheat_port = t
        .game
        .board
        .ports
        .iter()
        .find(|p| p.kind == PortKind::Wheat)
        .unwrap()
        .clone();
    t.place(p0, &wheat_port.vertex_ids[0], StructureKind::Settlement);
    t.grant(p0, ResourceCounts::single(Resource::Wheat, 2));

    t.must(
        p0,
        Action::BankTrade {
            give: ResourceCounts::single(Resource::Wheat, 2),
            receive: ResourceCounts::single(Resource::Ore, 1),
        },
    );
    assert_eq!(t.hand(p0), ResourceCounts::single(Resource::Ore, 1));
    t.assert_conserved();
}

#[test]
fn test_generic_port_rejects_two_for_one() {
    let mut t = Table::new(3, 8);
    t.jump_to_main();
    let p0 = t.seat(0);
    let generic = t
        .game
        .board
        .ports
        .iter()
        .find(|p| p.kind == PortKind::Generic)
        .unwrap()
        .clone();
    t.place(p0, &generic.vertex_ids[0], StructureKind::Settlement);
    t.grant(p0, ResourceCounts::single(Resource::Wheat, 3));

    assert_eq!(
        t.act(
            p0,
            Action::BankTrade {
                give: ResourceCounts::single(Resource::Wheat, 2),
                receive: ResourceCounts::single(Resource::Ore, 1),
            }
        ),
        Err(GameError::BadTrade)
    );
    t.must(
        p0,
        Action::BankTrade {
            give: ResourceCounts::single(Resource::Wheat, 3),
            receive: ResourceCounts::single(Resource::Ore, 1),
        },
    );
}

#[test]
fn test_end_turn_expires_only_own_offers() {
    let mut t = Table::new(3, 9);
    t.jump_to_main();
    let (p0, p1) = (t.seat(0), t.seat(1));
    t.grant(p0, ResourceCounts::single(Resource::Wood, 1));
    t.must(
        p0,
        Action::TradeOfferCreate {
            to: TradeTarget::All,
            give: ResourceCounts::single(Resource::Wood, 1),
            want: ResourceCounts::single(Resource::Brick, 1),
        },
    );
    // An offer left over from another player's turn
    let mut other = t.game.trade_offers[0].clone();
    other.id = Uuid::new_v4();
    other.from_player_id = p1;
    t.game.trade_offers.push(other);

    t.must(p0, Action::EndTurn);
    assert_eq!(t.game.trade_offers[0].status, TradeStatus::Expired);
    assert_eq!(t.game.trade_offers[1].status, TradeStatus::Open);
    assert_eq!(t.current(), p1);
}

#[test]
fn test_player_trade_accept_moves_both_bundles() {
    let mut t = Table::new(3, 10);
    t.jump_to_main();
    let (p0, p1, p2) = (t.seat(0), t.seat(1), t.seat(2));
    t.grant(p0, ResourceCounts::single(Resource::Wood, 2));
    t.grant(p2, ResourceCounts::single(Resource::Ore, 1));
    t.must(
        p0,
        Action::TradeOfferCreate {
            to: TradeTarget::Player(p2),
            give: ResourceCounts::single(Resource::Wood, 2),
            want: ResourceCounts::single(Resource::Ore, 1),
        },
    );
    let offer_id = t.game.trade_offers[0].id;
    let accept = Action::TradeOfferRespond {
        offer_id,
        response: OfferResponse::Accept,
    };

    assert_eq!(t.act(p1, accept.clone()), Err(GameError::NotForYou));
    assert_eq!(t.act(p0, accept.clone()), Err(GameError::CannotAcceptOwnOffer));
    t.must(p2, accept.clone());
    assert_eq!(t.hand(p0), ResourceCounts::single(Resource::Ore, 1));
    assert_eq!(t.hand(p2), ResourceCounts::single(Resource::Wood, 2));
    assert_eq!(t.game.trade_offers[0].status, TradeStatus::Accepted);
    assert_eq!(t.act(p2, accept), Err(GameError::OfferClosed));
    t.assert_conserved();
}

#[test]
fn test_open_offer_closes_after_everyone_rejects() {
    let mut t = Table::new(3, 11);
    t.jump_to_main();
    let (p0, p1, p2) = (t.seat(0), t.seat(1), t.seat(2));
    t.grant(p0, ResourceCounts::single(Resource::Sheep, 1));
    t.must(
        p0,
        Action::TradeOfferCreate {
            to: TradeTarget::All,
            give: ResourceCounts::single(Resource::Sheep, 1),
            want: ResourceCounts::single(Resource::Brick, 1),
        },
    );
    let offer_id = t.game.trade_offers[0].id;
    let reject = Action::TradeOfferRespond {
        offer_id,
        response: OfferResponse::Reject,
    };
    t.must(p1, reject.clone());
    assert_eq!(t.game.trade_offers[0].status, TradeStatus::Open);
    assert_eq!(t.act(p1, reject.clone()), Err(GameError::AlreadyRejected));
    t.must(p2, reject);
    assert_eq!(t.game.trade_offers[0].status, TradeStatus::Rejected);
}

// ==================== Awards and Victory ====================

#[test]
fn test_five_roads_take_longest_road() {
    let mut t = Table::new(3, 12);
    t.jump_to_main();
    let p0 = t.seat(0);
    let (corners, path) = center_ring(&t.game.board);
    t.place(p0, &corners[0], StructureKind::Settlement);
    for (i, edge_id) in path.iter().enumerate() {
        t.grant(p0, costs::road());
        t.must(p0, Action::BuildRoad { edge_id: edge_id.clone() });
        let expected = if i == 4 { Some(p0) } else { None };
        assert_eq!(t.game.awards.longest_road_player_id, expected);
    }
    assert_eq!(t.game.awards.longest_road_length, 5);
    assert_eq!(t.game.public_points(p0), 3);
    assert!(t
        .game
        .log
        .iter()
        .any(|e| e.message == "Took Longest Road (5)."));
}

#[test]
fn test_rival_settlement_breaks_longest_road() {
    let mut t = Table::new(3, 13);
    t.jump_to_main();
    let (p0, p1) = (t.seat(0), t.seat(1));
    let (corners, path) = center_ring(&t.game.board);
    t.place(p0, &corners[0], StructureKind::Settlement);
    for e in &path {
        t.game.structures.roads.insert(e.clone(), hexlands_core::game::Road { player_id: p0 });
    }
    t.game.awards.longest_road_player_id = Some(p0);
    t.game.awards.longest_road_length = 5;

    // p1 reaches the third corner from outside the ring
    let cut = corners[2].clone();
    let side = t
        .game
        .board
        .vertex(&cut)
        .unwrap()
        .edge_ids
        .iter()
        .find(|e| !path.contains(e))
        .unwrap()
        .clone();
    t.game.structures.roads.insert(side, hexlands_core::game::Road { player_id: p1 });
    t.game.current_player_index = 1;
    t.grant(p1, costs::settlement());

    t.must(p1, Action::BuildSettlement { vertex_id: cut });
    assert_eq!(longest_road_for_player(&t.game.board, &t.game.structures, p0), 3);
    assert_eq!(t.game.awards.longest_road_player_id, None);
    assert_eq!(t.game.awards.longest_road_length, 0);
    assert!(t
        .game
        .log
        .iter()
        .any(|e| e.message == "Longest Road is unclaimed."));
}

#[test]
fn test_secret_win_on_buying_victory_point() {
    let mut t = Table::new(3, 14);
    t.jump_to_main();
    let p0 = t.seat(0);
    t.game.victory_points_to_win = 3;
    t.place(p0, "V0", StructureKind::Settlement);
    t.place(p0, "V20", StructureKind::Settlement);
    t.game.dev_deck.push(DevCard::VictoryPoint);
    t.grant(p0, costs::development_card());

    assert_eq!(t.game.public_points(p0), 2);
    t.must(p0, Action::BuyDevCard);
    assert!(t.game.is_over());
    assert_eq!(t.game.winner_player_id, Some(p0));
    assert_eq!(t.privates[&p0].hidden_victory_points_count, 1);
    assert_eq!(t.game.log.last().unwrap().message, "Won the game with 3 VP!");

    let snap = public_snapshot(&t.game, &t.privates);
    assert_eq!(snap.final_points_by_player_id.unwrap()[&p0], 3);
    assert_eq!(t.act(p0, Action::EndTurn), Err(GameError::GameOver));
}

#[test]
fn test_hidden_points_do_not_win_off_turn() {
    let mut t = Table::new(3, 15);
    t.jump_to_main();
    let (p0, p1) = (t.seat(0), t.seat(1));
    t.game.victory_points_to_win = 3;
    t.place(p1, "V0", StructureKind::City);
    t.privates.get_mut(&p1).unwrap().hidden_victory_points_count = 1;
    t.must(p0, Action::EndTurn);
    assert!(!t.game.is_over());

    // The next successful action by p1 on their turn reveals the win
    t.must(p1, Action::RollDice);
    assert!(t.game.is_over());
    assert_eq!(t.game.winner_player_id, Some(p1));
}

#[test]
fn test_settlement_reaching_target_wins() {
    let mut t = Table::new(3, 16);
    t.jump_to_main();
    let p0 = t.seat(0);
    t.game.victory_points_to_win = 3;
    let (corners, path) = center_ring(&t.game.board);
    t.place(p0, &corners[0], StructureKind::City);
    for e in &path[..2] {
        t.game.structures.roads.insert(e.clone(), hexlands_core::game::Road { player_id: p0 });
    }
    t.grant(p0, costs::settlement());
    t.must(
        p0,
        Action::BuildSettlement {
            vertex_id: corners[2].clone(),
        },
    );
    assert!(t.game.is_over());
    assert_eq!(t.game.winner_player_id, Some(p0));
    assert_eq!(t.game.phase, Phase::GameOver);
}

// ==================== Player Removal ====================

#[test]
fn test_removal_mid_discard_keeps_conservation() {
    let mut t = Table::new(4, 18);
    t.jump_to_main();
    t.game.subphase = Subphase::NeedsRoll;
    let (p0, p1, p2) = (t.seat(0), t.seat(1), t.seat(2));
    t.grant(p1, ResourceCounts::with_amounts(2, 2, 2, 2, 2));
    t.grant(p2, ResourceCounts::with_amounts(0, 3, 3, 3, 0));
    t.rig_seven();
    t.must(p0, Action::RollDice);
    assert_eq!(t.game.subphase, Subphase::RobberDiscard);

    t.must(
        p2,
        Action::DiscardCards {
            counts: ResourceCounts::with_amounts(0, 2, 2, 0, 0),
        },
    );
    assert_eq!(t.game.subphase, Subphase::RobberDiscard);

    let out = remove_player(&t.game, &t.privates, p1, &mut t.rng, 99).unwrap();
    apply_deltas(&mut t.privates, &out.private_deltas);
    t.privates.remove(&p1);
    t.game = out.game;

    assert_eq!(t.game.subphase, Subphase::RobberMove);
    assert_eq!(t.game.turn_order.len(), 3);
    assert_eq!(t.current(), p0);
    t.assert_conserved();

    let hex_id = t.game.legal_robber_hex_ids()[0].clone();
    t.must(p0, Action::MoveRobber { hex_id });
}

#[test]
fn test_removing_current_player_mid_robber_passes_turn() {
    let mut t = Table::new(3, 19);
    t.jump_to_main();
    t.game.subphase = Subphase::NeedsRoll;
    let (p0, p1) = (t.seat(0), t.seat(1));
    t.grant(p0, ResourceCounts::with_amounts(4, 4, 0, 0, 0));
    t.rig_seven();
    t.must(p0, Action::RollDice);
    assert_eq!(t.game.subphase, Subphase::RobberDiscard);

    let out = remove_player(&t.game, &t.privates, p0, &mut t.rng, 5).unwrap();
    apply_deltas(&mut t.privates, &out.private_deltas);
    t.privates.remove(&p0);
    t.game = out.game;

    assert_eq!(t.current(), p1);
    assert_eq!(t.game.subphase, Subphase::NeedsRoll);
    assert!(t.game.robber.is_none());
    t.assert_conserved();
    t.must(p1, Action::RollDice);
}

#[test]
fn test_removing_victim_during_steal() {
    let mut t = Table::new(3, 20);
    t.jump_to_main();
    t.game.subphase = Subphase::RobberMove;
    let (p0, p1, p2) = (t.seat(0), t.seat(1), t.seat(2));
    let target = t
        .game
        .board
        .hexes
        .iter()
        .find(|h| h.id != t.game.robber_hex_id)
        .unwrap()
        .clone();
    t.place(p1, &target.corner_vertex_ids[0], StructureKind::Settlement);
    t.place(p2, &target.corner_vertex_ids[3], StructureKind::Settlement);
    t.grant(p1, ResourceCounts::single(Resource::Brick, 1));
    t.must(p0, Action::MoveRobber { hex_id: target.id.clone() });
    assert_eq!(
        t.game.robber.as_ref().unwrap().eligible_victim_player_ids,
        vec![p1, p2]
    );

    let out = remove_player(&t.game, &t.privates, p1, &mut t.rng, 5).unwrap();
    t.game = out.game;
    t.privates.remove(&p1);
    assert_eq!(t.game.subphase, Subphase::RobberSteal);
    assert_eq!(
        t.game.robber.as_ref().unwrap().eligible_victim_player_ids,
        vec![p2]
    );

    let out = remove_player(&t.game, &t.privates, p2, &mut t.rng, 6).unwrap();
    t.game = out.game;
    assert_eq!(t.game.subphase, Subphase::Main);
}
