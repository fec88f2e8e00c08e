//! Bot decision logic.
//!
//! The policy is deterministic given the state: bots must behave identically
//! across runs so hands can be replayed from `(seed, action log)` alone.

use crate::game::{Action, Card, HandState, SeatIndex};

/// Scores at or below this make the bot drop when it legally can.
const DROP_THRESHOLD: u32 = 5;

/// Choose the next action for the acting seat, assumed to be a bot.
///
/// The policy, in order:
/// 1. Draw — from the discard pile when its top card extends the bot's
///    first laid spread, otherwise from the stock.
/// 2. Lay the first spread found in the hand.
/// 3. Play the first legal hit (hand order, then seat, then spread).
/// 4. Drop when the score is low and no hit penalty blocks it.
/// 5. Discard the highest-value card, first index on ties.
pub fn decide(state: &HandState) -> Action {
    let me = state.turn;
    let hand = &state.hands[me];

    if !state.has_drawn {
        return choose_draw(state, me);
    }

    if let Some(cards) = first_spread(hand) {
        return Action::Spread { cards };
    }

    if let Some((card_idx, target_seat, spread_idx)) = first_hit(state, me) {
        return Action::Hit {
            card_idx,
            target_seat,
            spread_idx,
        };
    }

    if state.score_of(me) <= DROP_THRESHOLD && state.seats[me].hit_penalty_rounds == 0 {
        return Action::Drop;
    }

    Action::Discard {
        card_idx: highest_value_index(hand),
    }
}

fn choose_draw(state: &HandState, me: SeatIndex) -> Action {
    let top_extends_own = match (state.discard.last(), state.spreads[me].first()) {
        (Some(&top), Some(spread)) => spread.can_extend(top),
        _ => false,
    };
    if top_extends_own && !state.discard.is_empty() {
        return Action::DrawDiscard;
    }
    if state.stock.is_empty() {
        // Only the discard pile is left to draw from.
        return Action::DrawDiscard;
    }
    Action::DrawStock
}

/// First spread found in the hand: same-rank groups in hand order, then
/// suited runs in hand order.
fn first_spread(hand: &[Card]) -> Option<Vec<Card>> {
    for card in hand {
        let group: Vec<Card> = hand.iter().filter(|c| c.rank == card.rank).copied().collect();
        if group.len() >= 3 {
            return Some(group);
        }
    }

    for card in hand {
        let mut suited: Vec<Card> = hand.iter().filter(|c| c.suit == card.suit).copied().collect();
        if suited.len() < 3 {
            continue;
        }
        suited.sort_by_key(|c| c.rank.order_index());
        // First contiguous window of length >= 3.
        let mut start = 0;
        for i in 1..=suited.len() {
            let broken = i == suited.len()
                || suited[i].rank.order_index() != suited[i - 1].rank.order_index() + 1;
            if broken {
                if i - start >= 3 {
                    return Some(suited[start..i].to_vec());
                }
                start = i;
            }
        }
    }

    None
}

/// First legal hit, enumerating own hand against every laid spread.
fn first_hit(state: &HandState, me: SeatIndex) -> Option<(usize, SeatIndex, usize)> {
    for (card_idx, &card) in state.hands[me].iter().enumerate() {
        for (target_seat, spreads) in state.spreads.iter().enumerate() {
            for (spread_idx, spread) in spreads.iter().enumerate() {
                if spread.can_extend(card) {
                    return Some((card_idx, target_seat, spread_idx));
                }
            }
        }
    }
    None
}

fn highest_value_index(hand: &[Card]) -> usize {
    let mut best = 0;
    for (i, card) in hand.iter().enumerate() {
        if card.rank.point_value() > hand[best].rank.point_value() {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entities::{HandPhase, Rank, Seat, Spread, Suit};
    use uuid::Uuid;

    fn card(rank: Rank, suit: Suit) -> Card {
        Card::new(rank, suit)
    }

    fn bot_state(hands: Vec<Vec<Card>>, stock: Vec<Card>, discard: Vec<Card>) -> HandState {
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
    fn draws_from_stock_by_default() {
        let state = bot_state(
            vec![
                vec![card(Rank::Two, Suit::Hearts)],
                vec![card(Rank::Three, Suit::Hearts)],
            ],
            vec![card(Rank::Seven, Suit::Clubs)],
            vec![card(Rank::King, Suit::Clubs)],
        );
        assert_eq!(decide(&state), Action::DrawStock);
    }

    #[test]
    fn draws_discard_when_top_extends_own_first_spread() {
        let mut state = bot_state(
            vec![
                vec![card(Rank::Two, Suit::Hearts)],
                vec![card(Rank::Three, Suit::Hearts)],
            ],
            vec![card(Rank::Seven, Suit::Clubs)],
            vec![card(Rank::King, Suit::Clubs)],
        );
        state.spreads[0].push(
            Spread::build(vec![
                card(Rank::King, Suit::Spades),
                card(Rank::King, Suit::Hearts),
                card(Rank::King, Suit::Diamonds),
            ])
            .unwrap(),
        );
        state.rehash();
        assert_eq!(decide(&state), Action::DrawDiscard);
    }

    #[test]
    fn falls_back_to_discard_pile_when_stock_is_dry() {
        let state = bot_state(
            vec![
                vec![card(Rank::Two, Suit::Hearts)],
                vec![card(Rank::Three, Suit::Hearts)],
            ],
            vec![],
            vec![card(Rank::King, Suit::Clubs)],
        );
        assert_eq!(decide(&state), Action::DrawDiscard);
    }

    #[test]
    fn lays_the_first_spread_in_hand() {
        let mut state = bot_state(
            vec![
                vec![
                    card(Rank::Queen, Suit::Spades),
                    card(Rank::Queen, Suit::Hearts),
                    card(Rank::Queen, Suit::Diamonds),
                    card(Rank::Two, Suit::Clubs),
                ],
                vec![card(Rank::Three, Suit::Hearts)],
            ],
            vec![card(Rank::Seven, Suit::Clubs)],
            vec![],
        );
        state.has_drawn = true;
        state.rehash();
        assert_eq!(
            decide(&state),
            Action::Spread {
                cards: vec![
                    card(Rank::Queen, Suit::Spades),
                    card(Rank::Queen, Suit::Hearts),
                    card(Rank::Queen, Suit::Diamonds),
                ]
            }
        );
    }

    #[test]
    fn finds_a_suited_run_spread() {
        let mut state = bot_state(
            vec![
                vec![
                    card(Rank::Two, Suit::Clubs),
                    card(Rank::King, Suit::Hearts),
                    card(Rank::Three, Suit::Clubs),
                    card(Rank::Four, Suit::Clubs),
                ],
                vec![card(Rank::Three, Suit::Hearts)],
            ],
            vec![card(Rank::Seven, Suit::Clubs)],
            vec![],
        );
        state.has_drawn = true;
        state.rehash();
        match decide(&state) {
            Action::Spread { cards } => {
                assert_eq!(cards.len(), 3);
                assert!(cards.iter().all(|c| c.suit == Suit::Clubs));
            }
            other => panic!("expected a spread, got {other:?}"),
        }
    }

    #[test]
    fn hits_the_first_extendable_spread() {
        let mut state = bot_state(
            vec![
                vec![card(Rank::King, Suit::Clubs), card(Rank::Seven, Suit::Hearts)],
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
        state.has_drawn = true;
        state.rehash();
        assert_eq!(
            decide(&state),
            Action::Hit {
                card_idx: 0,
                target_seat: 1,
                spread_idx: 0,
            }
        );
    }

    #[test]
    fn drops_on_a_low_score() {
        let mut state = bot_state(
            vec![
                vec![card(Rank::Two, Suit::Hearts), card(Rank::Three, Suit::Clubs)],
                vec![card(Rank::King, Suit::Hearts)],
            ],
            vec![card(Rank::Seven, Suit::Clubs)],
            vec![],
        );
        state.has_drawn = true;
        state.rehash();
        assert_eq!(decide(&state), Action::Drop);
    }

    #[test]
    fn does_not_drop_while_penalised() {
        let mut state = bot_state(
            vec![
                vec![card(Rank::Two, Suit::Hearts), card(Rank::Three, Suit::Clubs)],
                vec![card(Rank::King, Suit::Hearts)],
            ],
            vec![card(Rank::Seven, Suit::Clubs)],
            vec![],
        );
        state.has_drawn = true;
        state.seats[0].hit_penalty_rounds = 1;
        state.rehash();
        // Falls through to a discard instead.
        assert_eq!(decide(&state), Action::Discard { card_idx: 1 });
    }

    #[test]
    fn discards_the_highest_card_breaking_ties_by_first_index() {
        let mut state = bot_state(
            vec![
                vec![
                    card(Rank::Seven, Suit::Hearts),
                    card(Rank::King, Suit::Clubs),
                    card(Rank::Queen, Suit::Spades),
                ],
                vec![card(Rank::King, Suit::Hearts)],
            ],
            vec![card(Rank::Seven, Suit::Clubs)],
            vec![],
        );
        state.has_drawn = true;
        state.rehash();
        // K♣ and Q♠ are both worth 10; the king comes first.
        assert_eq!(decide(&state), Action::Discard { card_idx: 1 });
    }

    #[test]
    fn policy_is_deterministic() {
        let state = bot_state(
            vec![
                vec![
                    card(Rank::Seven, Suit::Hearts),
                    card(Rank::King, Suit::Clubs),
                    card(Rank::Two, Suit::Spades),
                ],
                vec![card(Rank::King, Suit::Hearts)],
            ],
            vec![card(Rank::Seven, Suit::Clubs)],
            vec![],
        );
        let first = decide(&state);
        for _ in 0..10 {
            assert_eq!(decide(&state), first);
        }
    }
}
