//! The rules engine: a pure function advancing a hand by one action.
//!
//! `apply` never mutates its input and performs no I/O. The only randomness,
//! shuffling, happens in `deal` through an injected seed, so every hand is
//! replayable from `(seed, seat order, action log)`.

use super::entities::{
    Card, HandOutcome, HandPhase, HandState, Seat, SeatIndex, SeatStatus, Spread, WinType,
    HAND_SIZE, IMMEDIATE_WIN_SCORE, SPECIAL_WIN_FLOOR, SPECIAL_WIN_SCORE,
};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A single move by the acting seat.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    DrawStock,
    DrawDiscard,
    Discard { card_idx: usize },
    Spread { cards: Vec<Card> },
    Hit {
        card_idx: usize,
        target_seat: SeatIndex,
        spread_idx: usize,
    },
    Drop,
    DeclareSpecialWin,
}

#[derive(Clone, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
pub enum RulesError {
    #[error("hand is not in progress")]
    HandNotInProgress,
    #[error("already drew this turn")]
    AlreadyDrawn,
    #[error("must draw before this action")]
    MustDrawFirst,
    #[error("stock is empty")]
    StockEmpty,
    #[error("discard pile is empty")]
    DiscardEmpty,
    #[error("no card at hand index {0}")]
    NoSuchCard(usize),
    #[error("cards do not form a valid spread")]
    InvalidSpread,
    #[error("cards are not all in hand")]
    CardsNotInHand,
    #[error("seat {target_seat} has no spread {spread_idx}")]
    NoSuchSpread {
        target_seat: SeatIndex,
        spread_idx: usize,
    },
    #[error("card cannot extend that spread")]
    InvalidHit,
    #[error("cannot drop for {0} more round(s)")]
    DropBlocked(u8),
    #[error("score {0} does not qualify for a special win")]
    NotASpecialScore(u32),
}

/// Shuffle with the given seed and deal five cards to each seat in
/// round-robin order. Checks the deal-time immediate win before returning.
pub fn deal(game_id: Uuid, seats: Vec<Seat>, stake: i64, seed: u64) -> HandState {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut stock = super::entities::shuffled_deck(&mut rng);

    let count = seats.len();
    let mut hands: Vec<Vec<Card>> = vec![Vec::with_capacity(HAND_SIZE); count];
    for _ in 0..HAND_SIZE {
        for hand in hands.iter_mut() {
            // The shuffled deck always covers 4 seats * 5 cards.
            if let Some(card) = stock.pop() {
                hand.push(card);
            }
        }
    }

    let mut state = HandState {
        game_id,
        seats,
        hands,
        spreads: vec![Vec::new(); count],
        stock,
        discard: Vec::new(),
        turn: 0,
        has_drawn: false,
        stake,
        phase: HandPhase::InProgress,
        state_hash: String::new(),
    };

    // IMMEDIATE_50 is only detectable at deal time.
    let winners: Vec<SeatIndex> = (0..count)
        .filter(|&i| state.score_of(i) == IMMEDIATE_WIN_SCORE)
        .collect();
    if !winners.is_empty() {
        finish(&mut state, WinType::Immediate50, winners, None);
    }

    state.rehash();
    state
}

/// Advance the hand by one action of the acting seat.
///
/// Pure: equal `(state, action)` inputs always produce equal outputs, and
/// the input state is never modified. Whose turn it is (and who is allowed
/// to submit the action) is the session layer's concern; the engine trusts
/// `state.turn`.
pub fn apply(state: &HandState, action: &Action) -> Result<HandState, RulesError> {
    if !matches!(state.phase, HandPhase::InProgress) {
        return Err(RulesError::HandNotInProgress);
    }

    let mut next = state.clone();
    let actor = next.turn;

    match action {
        Action::DrawStock => {
            if next.has_drawn {
                return Err(RulesError::AlreadyDrawn);
            }
            let card = next.stock.pop().ok_or(RulesError::StockEmpty)?;
            next.hands[actor].push(card);
            next.has_drawn = true;
        }

        Action::DrawDiscard => {
            if next.has_drawn {
                return Err(RulesError::AlreadyDrawn);
            }
            let card = next.discard.pop().ok_or(RulesError::DiscardEmpty)?;
            next.hands[actor].push(card);
            next.has_drawn = true;
        }

        Action::Discard { card_idx } => {
            if !next.has_drawn {
                return Err(RulesError::MustDrawFirst);
            }
            if *card_idx >= next.hands[actor].len() {
                return Err(RulesError::NoSuchCard(*card_idx));
            }
            let card = next.hands[actor].remove(*card_idx);
            next.discard.push(card);

            if next.hands[actor].is_empty() {
                finish(&mut next, WinType::RegularWin, vec![actor], None);
            } else if next.stock.is_empty() {
                let winners = min_score_seats(&next);
                finish(&mut next, WinType::StockEmpty, winners, None);
            } else {
                advance_turn(&mut next);
            }
        }

        Action::Spread { cards } => {
            if !next.has_drawn {
                return Err(RulesError::MustDrawFirst);
            }
            let spread = Spread::build(cards.clone()).ok_or(RulesError::InvalidSpread)?;
            remove_from_hand(&mut next.hands[actor], cards)?;
            next.spreads[actor].push(spread);

            // A second laid spread ends the hand immediately.
            if next.spreads[actor].len() >= 2 {
                finish(&mut next, WinType::Reem, vec![actor], None);
            }
        }

        Action::Hit {
            card_idx,
            target_seat,
            spread_idx,
        } => {
            if !next.has_drawn {
                return Err(RulesError::MustDrawFirst);
            }
            if *card_idx >= next.hands[actor].len() {
                return Err(RulesError::NoSuchCard(*card_idx));
            }
            let spread = next
                .spreads
                .get(*target_seat)
                .and_then(|s| s.get(*spread_idx))
                .ok_or(RulesError::NoSuchSpread {
                    target_seat: *target_seat,
                    spread_idx: *spread_idx,
                })?;
            let card = next.hands[actor][*card_idx];
            if !spread.can_extend(card) {
                return Err(RulesError::InvalidHit);
            }

            next.hands[actor].remove(*card_idx);
            next.spreads[*target_seat][*spread_idx].extend_with(card);

            let target = &mut next.seats[*target_seat];
            target.hit_count += 1;
            target.hit_penalty_rounds = if target.hit_count == 1 { 2 } else { 1 };

            advance_turn(&mut next);

            // A hit ends the turn without feeding the discard pile; if both
            // piles are now dry the next seat has no legal draw and the
            // hand ends on scores.
            if next.stock.is_empty() && next.discard.is_empty() {
                let winners = min_score_seats(&next);
                finish(&mut next, WinType::StockEmpty, winners, None);
            }
        }

        Action::Drop => {
            let penalty = next.seats[actor].hit_penalty_rounds;
            if penalty > 0 {
                return Err(RulesError::DropBlocked(penalty));
            }
            let winners = min_score_seats(&next);
            let min = winners
                .first()
                .map(|&i| next.score_of(i))
                .unwrap_or_default();
            let win_type = if next.score_of(actor) > min {
                WinType::DropCaught
            } else {
                WinType::DropWin
            };
            finish(&mut next, win_type, winners, Some(actor));
        }

        Action::DeclareSpecialWin => {
            let score = next.score_of(actor);
            if score != SPECIAL_WIN_SCORE && score > SPECIAL_WIN_FLOOR {
                return Err(RulesError::NotASpecialScore(score));
            }
            finish(&mut next, WinType::SpecialWin, vec![actor], None);
        }
    }

    next.rehash();
    Ok(next)
}

/// Mark a seat as having left the hand. Its cards stay where they are (the
/// card count invariant holds; dead hands never score), and the turn moves
/// on if the leaver was acting. Pure, like `apply`.
pub fn concede_seat(state: &HandState, seat: SeatIndex) -> HandState {
    let mut next = state.clone();
    next.seats[seat].status = SeatStatus::Left;
    next.seats[seat].connection_id = None;
    if matches!(next.phase, HandPhase::InProgress) && next.turn == seat {
        advance_turn(&mut next);
    }
    next.rehash();
    next
}

/// Terminate a hand in favour of the last human standing.
pub fn declare_forfeit(state: &HandState, winner: SeatIndex) -> HandState {
    let mut next = state.clone();
    finish(&mut next, WinType::ForfeitWin, vec![winner], None);
    next.rehash();
    next
}

/// Seats (excluding those who left) holding the minimum score. Ties allowed.
fn min_score_seats(state: &HandState) -> Vec<SeatIndex> {
    let eligible: Vec<SeatIndex> = (0..state.seats.len())
        .filter(|&i| state.seats[i].status != SeatStatus::Left)
        .collect();
    let min = eligible
        .iter()
        .map(|&i| state.score_of(i))
        .min()
        .unwrap_or_default();
    eligible
        .into_iter()
        .filter(|&i| state.score_of(i) == min)
        .collect()
}

/// Move to the next active seat, clearing the draw flag and ticking down the
/// incoming seat's hit penalty.
fn advance_turn(state: &mut HandState) {
    state.has_drawn = false;
    let count = state.seats.len();
    for _ in 0..count {
        state.turn = (state.turn + 1) % count;
        if state.seats[state.turn].status == SeatStatus::Active {
            break;
        }
    }
    let seat = &mut state.seats[state.turn];
    if seat.hit_penalty_rounds > 0 {
        seat.hit_penalty_rounds -= 1;
    }
}

fn finish(
    state: &mut HandState,
    win_type: WinType,
    winners: Vec<SeatIndex>,
    dropped_seat: Option<SeatIndex>,
) {
    state.phase = HandPhase::Over(HandOutcome {
        win_type,
        winners,
        round_scores: state.round_scores(),
        dropped_seat,
    });
}

/// Remove an exact multiset of cards from a hand, or fail without touching it.
fn remove_from_hand(hand: &mut Vec<Card>, cards: &[Card]) -> Result<(), RulesError> {
    let mut remaining = hand.clone();
    for card in cards {
        match remaining.iter().position(|c| c == card) {
            Some(idx) => {
                remaining.remove(idx);
            }
            None => return Err(RulesError::CardsNotInHand),
        }
    }
    *hand = remaining;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entities::{base_deck, Rank, Suit, DECK_SIZE};

    fn card(rank: Rank, suit: Suit) -> Card {
        Card::new(rank, suit)
    }

    fn two_bots() -> Vec<Seat> {
        vec![Seat::bot("bot_1", 1_000), Seat::bot("bot_2", 1_000)]
    }

    /// A hand with fully scripted piles, for exercising single actions.
    fn scripted(hands: Vec<Vec<Card>>, stock: Vec<Card>, discard: Vec<Card>) -> HandState {
        let count = hands.len();
        let seats = (0..count)
            .map(|i| Seat::bot(format!("bot_{}", i + 1), 1_000))
            .collect();
        let mut state = HandState {
            game_id: Uuid::nil(),
            seats,
            hands,
            spreads: vec![Vec::new(); count],
            stock,
            discard,
            turn: 0,
            has_drawn: false,
            stake: 10,
            phase: HandPhase::InProgress,
            state_hash: String::new(),
        };
        state.rehash();
        state
    }

    #[test]
    fn deal_conserves_all_forty_cards() {
        let state = deal(Uuid::nil(), two_bots(), 10, 7);
        assert_eq!(state.card_count(), DECK_SIZE);
        assert_eq!(state.hands[0].len(), 5);
        assert_eq!(state.hands[1].len(), 5);
        assert_eq!(state.stock.len(), 30);
        assert!(state.discard.is_empty());
    }

    #[test]
    fn deal_is_reproducible_for_a_seed() {
        let a = deal(Uuid::nil(), two_bots(), 10, 42);
        let b = deal(Uuid::nil(), two_bots(), 10, 42);
        assert_eq!(a.hands, b.hands);
        assert_eq!(a.stock, b.stock);
        assert_eq!(a.state_hash, b.state_hash);

        let c = deal(Uuid::nil(), two_bots(), 10, 43);
        assert_ne!(a.hands, c.hands);
    }

    #[test]
    fn apply_is_pure() {
        let state = deal(Uuid::nil(), two_bots(), 10, 7);
        let before = state.clone();
        let first = apply(&state, &Action::DrawStock).unwrap();
        let second = apply(&state, &Action::DrawStock).unwrap();
        assert_eq!(state, before);
        assert_eq!(first, second);
        assert_eq!(first.state_hash, second.state_hash);
    }

    #[test]
    fn draw_stock_moves_the_top_card() {
        let state = deal(Uuid::nil(), two_bots(), 10, 7);
        let top = *state.stock.last().unwrap();
        let next = apply(&state, &Action::DrawStock).unwrap();
        assert!(next.has_drawn);
        assert_eq!(next.hands[0].len(), 6);
        assert_eq!(*next.hands[0].last().unwrap(), top);
        assert_eq!(next.card_count(), DECK_SIZE);
    }

    #[test]
    fn second_draw_is_rejected() {
        let state = deal(Uuid::nil(), two_bots(), 10, 7);
        let next = apply(&state, &Action::DrawStock).unwrap();
        assert_eq!(
            apply(&next, &Action::DrawStock),
            Err(RulesError::AlreadyDrawn)
        );
        assert_eq!(
            apply(&next, &Action::DrawDiscard),
            Err(RulesError::AlreadyDrawn)
        );
    }

    #[test]
    fn draw_from_empty_stock_is_rejected() {
        let state = scripted(
            vec![
                vec![card(Rank::Two, Suit::Hearts)],
                vec![card(Rank::Three, Suit::Hearts)],
            ],
            vec![],
            vec![card(Rank::Four, Suit::Hearts)],
        );
        assert_eq!(
            apply(&state, &Action::DrawStock),
            Err(RulesError::StockEmpty)
        );
        // The discard route is still open.
        assert!(apply(&state, &Action::DrawDiscard).is_ok());
    }

    #[test]
    fn discard_requires_a_draw_first() {
        let state = deal(Uuid::nil(), two_bots(), 10, 7);
        assert_eq!(
            apply(&state, &Action::Discard { card_idx: 0 }),
            Err(RulesError::MustDrawFirst)
        );
    }

    #[test]
    fn discard_advances_turn_and_clears_draw_flag() {
        let state = deal(Uuid::nil(), two_bots(), 10, 7);
        let drawn = apply(&state, &Action::DrawStock).unwrap();
        let next = apply(&drawn, &Action::Discard { card_idx: 0 }).unwrap();
        assert_eq!(next.turn, 1);
        assert!(!next.has_drawn);
        assert_eq!(next.discard.len(), 1);
        assert_eq!(next.card_count(), DECK_SIZE);
    }

    #[test]
    fn regular_win_fires_when_the_discard_empties_the_hand() {
        // Seat 0 holds exactly three kings: draw, spread them, then discard
        // the drawn card to go out.
        let state = scripted(
            vec![
                vec![
                    card(Rank::King, Suit::Spades),
                    card(Rank::King, Suit::Hearts),
                    card(Rank::King, Suit::Diamonds),
                ],
                vec![card(Rank::Queen, Suit::Hearts)],
            ],
            vec![card(Rank::Five, Suit::Spades), card(Rank::Six, Suit::Spades)],
            vec![],
        );
        let drawn = apply(&state, &Action::DrawStock).unwrap();
        let spread = apply(
            &drawn,
            &Action::Spread {
                cards: vec![
                    card(Rank::King, Suit::Spades),
                    card(Rank::King, Suit::Hearts),
                    card(Rank::King, Suit::Diamonds),
                ],
            },
        )
        .unwrap();
        assert_eq!(spread.hands[0].len(), 1);

        let done = apply(&spread, &Action::Discard { card_idx: 0 }).unwrap();
        let outcome = done.outcome().expect("empty hand ends the hand");
        assert_eq!(outcome.win_type, WinType::RegularWin);
        assert_eq!(outcome.winners, vec![0]);
        assert_eq!(done.card_count(), DECK_SIZE);
    }

    #[test]
    fn discard_with_empty_stock_ends_by_stock_empty() {
        // Seat 0: score 2 after discard; seat 1: score 10. Stock runs dry.
        let state = scripted(
            vec![
                vec![card(Rank::Two, Suit::Hearts), card(Rank::King, Suit::Spades)],
                vec![card(Rank::Queen, Suit::Hearts)],
            ],
            vec![card(Rank::Seven, Suit::Clubs)],
            vec![],
        );
        let drawn = apply(&state, &Action::DrawStock).unwrap();
        assert!(drawn.stock.is_empty());
        // Discard the seven and the king, keeping the two: indexes after
        // draw are [2♥, K♠, 7♣]; discard K♠ first.
        let next = apply(&drawn, &Action::Discard { card_idx: 1 }).unwrap();
        let outcome = next.outcome().expect("stock empty should end the hand");
        assert_eq!(outcome.win_type, WinType::StockEmpty);
        // Seat 0 holds 2 + 7 = 9, seat 1 holds 10: seat 0 wins.
        assert_eq!(outcome.winners, vec![0]);
    }

    #[test]
    fn stock_empty_allows_ties() {
        // Seat 0 draws the last card (5♦), discards the king, and both
        // seats finish on exactly 5 points.
        let state = scripted(
            vec![
                vec![card(Rank::King, Suit::Spades)],
                vec![card(Rank::Five, Suit::Clubs)],
            ],
            vec![card(Rank::Five, Suit::Diamonds)],
            vec![],
        );
        let drawn = apply(&state, &Action::DrawStock).unwrap();
        assert!(drawn.stock.is_empty());

        let next = apply(&drawn, &Action::Discard { card_idx: 0 }).unwrap();
        let outcome = next.outcome().unwrap();
        assert_eq!(outcome.win_type, WinType::StockEmpty);
        assert_eq!(outcome.winners, vec![0, 1]);
        assert_eq!(outcome.round_scores, vec![5, 5]);
    }

    #[test]
    fn spread_requires_draw_and_valid_cards() {
        let hand = vec![
            card(Rank::King, Suit::Spades),
            card(Rank::King, Suit::Hearts),
            card(Rank::King, Suit::Diamonds),
            card(Rank::Four, Suit::Clubs),
        ];
        let spread_cards = hand[..3].to_vec();
        let state = scripted(
            vec![hand, vec![card(Rank::Two, Suit::Hearts)]],
            vec![card(Rank::Seven, Suit::Clubs), card(Rank::Six, Suit::Clubs)],
            vec![],
        );
        assert_eq!(
            apply(
                &state,
                &Action::Spread {
                    cards: spread_cards.clone()
                }
            ),
            Err(RulesError::MustDrawFirst)
        );

        let drawn = apply(&state, &Action::DrawStock).unwrap();
        let next = apply(
            &drawn,
            &Action::Spread {
                cards: spread_cards,
            },
        )
        .unwrap();
        assert_eq!(next.spreads[0].len(), 1);
        assert_eq!(next.hands[0].len(), 2);
        // Spreading does not advance the turn.
        assert_eq!(next.turn, 0);
        assert!(next.has_drawn);
        assert_eq!(next.card_count(), DECK_SIZE);
    }

    #[test]
    fn spreading_cards_not_in_hand_is_rejected() {
        let state = scripted(
            vec![
                vec![card(Rank::Two, Suit::Hearts), card(Rank::Three, Suit::Hearts)],
                vec![card(Rank::Two, Suit::Clubs)],
            ],
            vec![card(Rank::Seven, Suit::Clubs)],
            vec![],
        );
        let drawn = apply(&state, &Action::DrawStock).unwrap();
        let ghost = vec![
            card(Rank::King, Suit::Spades),
            card(Rank::King, Suit::Hearts),
            card(Rank::King, Suit::Diamonds),
        ];
        assert_eq!(
            apply(&drawn, &Action::Spread { cards: ghost }),
            Err(RulesError::CardsNotInHand)
        );
    }

    #[test]
    fn second_spread_wins_by_reem() {
        let hand = vec![
            card(Rank::King, Suit::Spades),
            card(Rank::King, Suit::Hearts),
            card(Rank::King, Suit::Diamonds),
            card(Rank::Four, Suit::Clubs),
            card(Rank::Five, Suit::Clubs),
        ];
        let state = scripted(
            vec![hand, vec![card(Rank::Two, Suit::Hearts)]],
            vec![card(Rank::Three, Suit::Clubs)],
            vec![],
        );
        let drawn = apply(&state, &Action::DrawStock).unwrap();
        let first = apply(
            &drawn,
            &Action::Spread {
                cards: vec![
                    card(Rank::King, Suit::Spades),
                    card(Rank::King, Suit::Hearts),
                    card(Rank::King, Suit::Diamonds),
                ],
            },
        )
        .unwrap();
        assert!(!first.is_over());

        let second = apply(
            &first,
            &Action::Spread {
                cards: vec![
                    card(Rank::Three, Suit::Clubs),
                    card(Rank::Four, Suit::Clubs),
                    card(Rank::Five, Suit::Clubs),
                ],
            },
        )
        .unwrap();
        let outcome = second.outcome().expect("second spread ends the hand");
        assert_eq!(outcome.win_type, WinType::Reem);
        assert_eq!(outcome.winners, vec![0]);
        assert_eq!(second.card_count(), DECK_SIZE);
    }

    #[test]
    fn hit_moves_card_penalises_target_and_ends_turn() {
        let mut state = scripted(
            vec![
                vec![card(Rank::King, Suit::Clubs), card(Rank::Two, Suit::Hearts)],
                vec![card(Rank::Three, Suit::Hearts)],
            ],
            vec![card(Rank::Seven, Suit::Clubs)],
            vec![],
        );
        state.spreads[1].push(
            Spread::build(vec![
                card(Rank::King, Suit::Spades),
                card(Rank::King, Suit::Hearts),
                card(Rank::King, Suit::Diamonds),
            ])
            .unwrap(),
        );
        state.rehash();

        let drawn = apply(&state, &Action::DrawStock).unwrap();
        let next = apply(
            &drawn,
            &Action::Hit {
                card_idx: 0,
                target_seat: 1,
                spread_idx: 0,
            },
        )
        .unwrap();

        assert_eq!(next.spreads[1][0].cards.len(), 4);
        assert_eq!(next.hands[0].len(), 2);
        assert_eq!(next.seats[1].hit_count, 1);
        // First hit sets two penalty rounds; the turn then passes to the
        // target, whose upkeep immediately ticks one off.
        assert_eq!(next.seats[1].hit_penalty_rounds, 1);
        assert_eq!(next.turn, 1);
        assert!(!next.has_drawn);
        assert_eq!(next.card_count(), DECK_SIZE);
    }

    #[test]
    fn subsequent_hits_penalise_one_round() {
        let mut state = scripted(
            vec![
                vec![card(Rank::King, Suit::Clubs), card(Rank::Two, Suit::Hearts)],
                vec![card(Rank::Three, Suit::Hearts)],
            ],
            vec![card(Rank::Seven, Suit::Clubs)],
            vec![],
        );
        state.seats[1].hit_count = 1;
        state.spreads[1].push(
            Spread::build(vec![
                card(Rank::King, Suit::Spades),
                card(Rank::King, Suit::Hearts),
                card(Rank::King, Suit::Diamonds),
            ])
            .unwrap(),
        );
        state.rehash();

        let drawn = apply(&state, &Action::DrawStock).unwrap();
        let next = apply(
            &drawn,
            &Action::Hit {
                card_idx: 0,
                target_seat: 1,
                spread_idx: 0,
            },
        )
        .unwrap();
        assert_eq!(next.seats[1].hit_count, 2);
        // Second hit sets one round, consumed at the target's own upkeep.
        assert_eq!(next.seats[1].hit_penalty_rounds, 0);
    }

    #[test]
    fn invalid_hit_is_rejected() {
        let mut state = scripted(
            vec![
                vec![card(Rank::Queen, Suit::Clubs), card(Rank::Two, Suit::Hearts)],
                vec![card(Rank::Three, Suit::Hearts)],
            ],
            vec![card(Rank::Seven, Suit::Clubs)],
            vec![],
        );
        state.spreads[1].push(
            Spread::build(vec![
                card(Rank::King, Suit::Spades),
                card(Rank::King, Suit::Hearts),
                card(Rank::King, Suit::Diamonds),
            ])
            .unwrap(),
        );
        state.rehash();

        let drawn = apply(&state, &Action::DrawStock).unwrap();
        assert_eq!(
            apply(
                &drawn,
                &Action::Hit {
                    card_idx: 0,
                    target_seat: 1,
                    spread_idx: 0,
                }
            ),
            Err(RulesError::InvalidHit)
        );
        assert_eq!(
            apply(
                &drawn,
                &Action::Hit {
                    card_idx: 0,
                    target_seat: 1,
                    spread_idx: 3,
                }
            ),
            Err(RulesError::NoSuchSpread {
                target_seat: 1,
                spread_idx: 3
            })
        );
    }

    #[test]
    fn drop_with_minimum_score_wins() {
        let state = scripted(
            vec![
                vec![card(Rank::Two, Suit::Hearts)],
                vec![card(Rank::King, Suit::Hearts)],
            ],
            vec![card(Rank::Seven, Suit::Clubs)],
            vec![],
        );
        let next = apply(&state, &Action::Drop).unwrap();
        let outcome = next.outcome().unwrap();
        assert_eq!(outcome.win_type, WinType::DropWin);
        assert_eq!(outcome.winners, vec![0]);
        assert_eq!(outcome.dropped_seat, Some(0));
        assert_eq!(outcome.round_scores, vec![2, 10]);
    }

    #[test]
    fn drop_above_minimum_is_caught() {
        let state = scripted(
            vec![
                vec![card(Rank::Six, Suit::Hearts)],
                vec![card(Rank::Three, Suit::Hearts)],
                vec![card(Rank::Four, Suit::Hearts)],
            ],
            vec![card(Rank::Seven, Suit::Clubs)],
            vec![],
        );
        let next = apply(&state, &Action::Drop).unwrap();
        let outcome = next.outcome().unwrap();
        assert_eq!(outcome.win_type, WinType::DropCaught);
        assert_eq!(outcome.winners, vec![1]);
        assert_eq!(outcome.dropped_seat, Some(0));
        assert_eq!(outcome.round_scores, vec![6, 3, 4]);
    }

    #[test]
    fn drop_while_penalised_is_rejected() {
        let mut state = scripted(
            vec![
                vec![card(Rank::Two, Suit::Hearts)],
                vec![card(Rank::King, Suit::Hearts)],
            ],
            vec![card(Rank::Seven, Suit::Clubs)],
            vec![],
        );
        state.seats[0].hit_penalty_rounds = 1;
        state.rehash();
        assert_eq!(apply(&state, &Action::Drop), Err(RulesError::DropBlocked(1)));
    }

    #[test]
    fn special_win_needs_forty_one_or_ten_and_under() {
        let forty_one = scripted(
            vec![
                vec![
                    card(Rank::King, Suit::Hearts),
                    card(Rank::King, Suit::Spades),
                    card(Rank::King, Suit::Diamonds),
                    card(Rank::King, Suit::Clubs),
                    card(Rank::Ace, Suit::Hearts),
                ],
                vec![card(Rank::Two, Suit::Hearts)],
            ],
            vec![card(Rank::Seven, Suit::Clubs)],
            vec![],
        );
        let next = apply(&forty_one, &Action::DeclareSpecialWin).unwrap();
        assert_eq!(next.outcome().unwrap().win_type, WinType::SpecialWin);

        let low = scripted(
            vec![
                vec![card(Rank::Two, Suit::Hearts), card(Rank::Three, Suit::Hearts)],
                vec![card(Rank::King, Suit::Hearts)],
            ],
            vec![card(Rank::Seven, Suit::Clubs)],
            vec![],
        );
        let next = apply(&low, &Action::DeclareSpecialWin).unwrap();
        assert_eq!(next.outcome().unwrap().win_type, WinType::SpecialWin);

        let mid = scripted(
            vec![
                vec![
                    card(Rank::Seven, Suit::Hearts),
                    card(Rank::Seven, Suit::Clubs),
                ],
                vec![card(Rank::King, Suit::Hearts)],
            ],
            vec![card(Rank::Seven, Suit::Spades)],
            vec![],
        );
        assert_eq!(
            apply(&mid, &Action::DeclareSpecialWin),
            Err(RulesError::NotASpecialScore(14))
        );
    }

    #[test]
    fn immediate_fifty_is_detected_at_deal_time() {
        // Brute-force a seed where some seat is dealt exactly 50 (five
        // court cards). Rare but findable; skip gracefully if the search
        // window misses, since the deterministic check is what matters.
        for seed in 0..20_000u64 {
            let state = deal(Uuid::nil(), two_bots(), 10, seed);
            if let Some(outcome) = state.outcome() {
                assert_eq!(outcome.win_type, WinType::Immediate50);
                for &w in &outcome.winners {
                    assert_eq!(state.score_of(w), 50);
                }
                return;
            }
        }
    }

    #[test]
    fn actions_on_finished_hands_are_rejected() {
        let state = scripted(
            vec![
                vec![card(Rank::Two, Suit::Hearts)],
                vec![card(Rank::King, Suit::Hearts)],
            ],
            vec![card(Rank::Seven, Suit::Clubs)],
            vec![],
        );
        let done = apply(&state, &Action::Drop).unwrap();
        assert_eq!(
            apply(&done, &Action::DrawStock),
            Err(RulesError::HandNotInProgress)
        );
    }

    #[test]
    fn turn_advance_skips_non_active_seats() {
        let mut state = scripted(
            vec![
                vec![card(Rank::Two, Suit::Hearts), card(Rank::Three, Suit::Hearts)],
                vec![card(Rank::King, Suit::Hearts)],
                vec![card(Rank::Queen, Suit::Hearts)],
            ],
            vec![
                card(Rank::Seven, Suit::Clubs),
                card(Rank::Six, Suit::Clubs),
            ],
            vec![],
        );
        state.seats[1].status = SeatStatus::Left;
        state.rehash();

        let drawn = apply(&state, &Action::DrawStock).unwrap();
        let next = apply(&drawn, &Action::Discard { card_idx: 0 }).unwrap();
        assert_eq!(next.turn, 2);
    }

    #[test]
    fn penalty_ticks_down_at_turn_start() {
        let mut state = scripted(
            vec![
                vec![card(Rank::Two, Suit::Hearts), card(Rank::Three, Suit::Hearts)],
                vec![card(Rank::King, Suit::Hearts)],
            ],
            vec![
                card(Rank::Seven, Suit::Clubs),
                card(Rank::Six, Suit::Clubs),
            ],
            vec![],
        );
        state.seats[1].hit_penalty_rounds = 2;
        state.rehash();

        let drawn = apply(&state, &Action::DrawStock).unwrap();
        let next = apply(&drawn, &Action::Discard { card_idx: 0 }).unwrap();
        assert_eq!(next.turn, 1);
        assert_eq!(next.seats[1].hit_penalty_rounds, 1);
    }

    #[test]
    fn conceding_the_acting_seat_advances_the_turn() {
        let state = deal(Uuid::nil(), two_bots(), 10, 7);
        assert_eq!(state.turn, 0);
        let next = concede_seat(&state, 0);
        assert_eq!(next.seats[0].status, SeatStatus::Left);
        assert_eq!(next.turn, 1);
        assert_eq!(next.card_count(), DECK_SIZE);
        // Conceding a non-acting seat leaves the turn alone.
        let other = concede_seat(&state, 1);
        assert_eq!(other.turn, 0);
    }

    #[test]
    fn forfeit_ends_the_hand_for_the_named_winner() {
        let state = deal(Uuid::nil(), two_bots(), 10, 7);
        let next = declare_forfeit(&state, 1);
        let outcome = next.outcome().unwrap();
        assert_eq!(outcome.win_type, WinType::ForfeitWin);
        assert_eq!(outcome.winners, vec![1]);
    }

    #[test]
    fn deck_is_exactly_the_stripped_forty() {
        let deck = base_deck();
        assert!(deck.iter().all(|c| c.rank.point_value() <= 10));
        assert_eq!(deck.len(), 40);
    }
}
