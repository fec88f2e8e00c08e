//! End-to-end rules and settlement scenarios with literal inputs.
//!
//! Hands are constructed card-by-card so each scenario is fully
//! deterministic, then settled against the in-memory ledger.

use reem::game::{
    apply, concede_seat, Action, Card, HandPhase, HandState, Rank, Seat, SeatStatus, Spread, Suit,
    WinType,
};
use reem::ledger::{LedgerManager, MemoryLedgerStore, SeatAccount, UserId, HOUSE_USER_ID};
use std::sync::Arc;
use uuid::Uuid;

fn card(rank: Rank, suit: Suit) -> Card {
    Card::new(rank, suit)
}

/// A hand built from explicit piles.
fn hand_with(hands: Vec<Vec<Card>>, stock: Vec<Card>, stake: i64) -> HandState {
    let count = hands.len();
    let seats = (0..count)
        .map(|i| Seat::human(format!("player_{}", i + 1), Uuid::new_v4(), 1_000))
        .collect();
    let mut state = HandState {
        game_id: Uuid::new_v4(),
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
    state.rehash();
    state
}

async fn ledger_with_players(count: usize, balance: i64) -> (LedgerManager, Arc<MemoryLedgerStore>) {
    let store = Arc::new(MemoryLedgerStore::new());
    for i in 0..count {
        store.credit(i as UserId + 1, balance).await;
    }
    (LedgerManager::new(store.clone()), store)
}

fn accounts(count: usize) -> Vec<SeatAccount> {
    (0..count)
        .map(|i| SeatAccount::new(i as i64 + 1, format!("player_{}", i + 1)))
        .collect()
}

#[tokio::test]
async fn reem_win_pays_the_full_pot() {
    // Seat 0 is dealt three kings plus 4♣ 5♣ and draws 3♣: two spreads in
    // one turn end the hand by REEM.
    let state = hand_with(
        vec![
            vec![
                card(Rank::King, Suit::Spades),
                card(Rank::King, Suit::Hearts),
                card(Rank::King, Suit::Diamonds),
                card(Rank::Four, Suit::Clubs),
                card(Rank::Five, Suit::Clubs),
            ],
            vec![
                card(Rank::Queen, Suit::Hearts),
                card(Rank::Queen, Suit::Spades),
                card(Rank::Two, Suit::Hearts),
                card(Rank::Two, Suit::Spades),
                card(Rank::Seven, Suit::Hearts),
            ],
        ],
        vec![card(Rank::Six, Suit::Spades), card(Rank::Three, Suit::Clubs)],
        10,
    );

    let drawn = apply(&state, &Action::DrawStock).unwrap();
    assert_eq!(*drawn.hands[0].last().unwrap(), card(Rank::Three, Suit::Clubs));

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

    // Settlement: stake 10, two seats, pot 20 to the winner.
    let (ledger, _) = ledger_with_players(2, 100).await;
    let accounts = accounts(2);
    ledger
        .deduct_stakes(&accounts, 10, 1, second.game_id)
        .await
        .unwrap();
    ledger
        .distribute_winnings(
            &accounts,
            &outcome.winners,
            outcome.win_type,
            10,
            1,
            second.game_id,
        )
        .await
        .unwrap();

    assert_eq!(ledger.balance(1).await.unwrap(), 110);
    assert_eq!(ledger.balance(2).await.unwrap(), 90);
}

#[tokio::test]
async fn stock_empty_tie_splits_the_pot() {
    // One card left in stock; both seats end on equal scores.
    let state = hand_with(
        vec![
            vec![card(Rank::King, Suit::Spades), card(Rank::Five, Suit::Hearts)],
            vec![card(Rank::Five, Suit::Clubs), card(Rank::Seven, Suit::Clubs)],
        ],
        vec![card(Rank::Seven, Suit::Diamonds)],
        5,
    );

    let drawn = apply(&state, &Action::DrawStock).unwrap();
    assert!(drawn.stock.is_empty());

    // Shed the king: seat 0 holds 5♥ + 7♦ = 12, seat 1 holds 5 + 7 = 12.
    let done = apply(&drawn, &Action::Discard { card_idx: 0 }).unwrap();
    let outcome = done.outcome().expect("empty stock ends the hand");
    assert_eq!(outcome.win_type, WinType::StockEmpty);
    assert_eq!(outcome.winners, vec![0, 1]);
    assert_eq!(outcome.round_scores, vec![12, 12]);

    // Pot 10 splits 5 each: both players break even.
    let (ledger, _) = ledger_with_players(2, 100).await;
    let accounts = accounts(2);
    ledger
        .deduct_stakes(&accounts, 5, 1, done.game_id)
        .await
        .unwrap();
    ledger
        .distribute_winnings(
            &accounts,
            &outcome.winners,
            outcome.win_type,
            5,
            1,
            done.game_id,
        )
        .await
        .unwrap();

    assert_eq!(ledger.balance(1).await.unwrap(), 100);
    assert_eq!(ledger.balance(2).await.unwrap(), 100);
    assert_eq!(ledger.balance(HOUSE_USER_ID).await.unwrap(), 0);
}

#[tokio::test]
async fn drop_caught_pays_every_seat_that_beat_the_dropper() {
    // Scores {6, 3, 4}: seat 0 drops and is strictly above the minimum.
    let state = hand_with(
        vec![
            vec![card(Rank::Six, Suit::Hearts)],
            vec![card(Rank::Three, Suit::Hearts)],
            vec![card(Rank::Four, Suit::Hearts)],
        ],
        vec![card(Rank::Seven, Suit::Clubs)],
        10,
    );

    let done = apply(&state, &Action::Drop).unwrap();
    let outcome = done.outcome().unwrap();
    assert_eq!(outcome.win_type, WinType::DropCaught);
    assert_eq!(outcome.winners, vec![1]);
    assert_eq!(outcome.dropped_seat, Some(0));

    let (ledger, _) = ledger_with_players(3, 100).await;
    let accounts = accounts(3);
    ledger
        .deduct_stakes(&accounts, 10, 1, done.game_id)
        .await
        .unwrap();
    ledger
        .distribute_winnings(
            &accounts,
            &outcome.winners,
            outcome.win_type,
            10,
            1,
            done.game_id,
        )
        .await
        .unwrap();
    let statuses: Vec<SeatStatus> = done.seats.iter().map(|s| s.status).collect();
    ledger
        .apply_drop_penalty(
            &accounts,
            0,
            &outcome.round_scores,
            &statuses,
            10,
            1,
            done.game_id,
        )
        .await
        .unwrap();

    // Seat 0: -10 stake, -10 to seat 1, -10 to seat 2.
    assert_eq!(ledger.balance(1).await.unwrap(), 70);
    // Seat 1: -10 stake, +30 pot, +10 penalty.
    assert_eq!(ledger.balance(2).await.unwrap(), 130);
    // Seat 2: -10 stake, +10 penalty.
    assert_eq!(ledger.balance(3).await.unwrap(), 100);
    // Everything conserves.
    assert_eq!(ledger.balance(HOUSE_USER_ID).await.unwrap(), 0);
}

#[tokio::test]
async fn drop_penalty_ignores_a_seat_that_left_before_the_drop() {
    // Scores {6, 3, 4}; seat 2 would beat the dropper but walked away
    // mid-hand. Its frozen dead hand collects nothing.
    let state = hand_with(
        vec![
            vec![card(Rank::Six, Suit::Hearts)],
            vec![card(Rank::Three, Suit::Hearts)],
            vec![card(Rank::Four, Suit::Hearts)],
        ],
        vec![card(Rank::Seven, Suit::Clubs)],
        10,
    );
    let conceded = concede_seat(&state, 2);
    assert_eq!(conceded.seats[2].status, SeatStatus::Left);

    let done = apply(&conceded, &Action::Drop).unwrap();
    let outcome = done.outcome().unwrap();
    assert_eq!(outcome.win_type, WinType::DropCaught);
    // Winner selection already skips the leaver; the penalty must too.
    assert_eq!(outcome.winners, vec![1]);

    let (ledger, _) = ledger_with_players(3, 100).await;
    let accounts = accounts(3);
    ledger
        .deduct_stakes(&accounts, 10, 1, done.game_id)
        .await
        .unwrap();
    ledger
        .distribute_winnings(
            &accounts,
            &outcome.winners,
            outcome.win_type,
            10,
            1,
            done.game_id,
        )
        .await
        .unwrap();
    let statuses: Vec<SeatStatus> = done.seats.iter().map(|s| s.status).collect();
    ledger
        .apply_drop_penalty(
            &accounts,
            0,
            &outcome.round_scores,
            &statuses,
            10,
            1,
            done.game_id,
        )
        .await
        .unwrap();

    // Seat 0: -10 stake, -10 penalty to the one live beaten seat.
    assert_eq!(ledger.balance(1).await.unwrap(), 80);
    // Seat 1: -10 stake, +30 pot, +10 penalty.
    assert_eq!(ledger.balance(2).await.unwrap(), 130);
    // Seat 2 left: its stake is forfeit and no penalty credit lands.
    assert_eq!(ledger.balance(3).await.unwrap(), 90);
    assert_eq!(ledger.balance(HOUSE_USER_ID).await.unwrap(), 0);
}

#[tokio::test]
async fn special_win_triples_the_pot_from_the_house() {
    let state = hand_with(
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
        10,
    );

    let done = apply(&state, &Action::DeclareSpecialWin).unwrap();
    let outcome = done.outcome().unwrap();
    assert_eq!(outcome.win_type, WinType::SpecialWin);

    let (ledger, _) = ledger_with_players(2, 100).await;
    let accounts = accounts(2);
    ledger
        .deduct_stakes(&accounts, 10, 1, done.game_id)
        .await
        .unwrap();
    ledger
        .distribute_winnings(&accounts, &[0], WinType::SpecialWin, 10, 1, done.game_id)
        .await
        .unwrap();

    // Triple pot: 60 chips against a 10 stake.
    assert_eq!(ledger.balance(1).await.unwrap(), 150);
    assert_eq!(ledger.balance(2).await.unwrap(), 90);
    // The bonus comes out of the house account.
    assert_eq!(ledger.balance(HOUSE_USER_ID).await.unwrap(), -40);
}

#[test]
fn spread_then_hit_preserves_every_card() {
    let mut state = hand_with(
        vec![
            vec![
                card(Rank::Queen, Suit::Spades),
                card(Rank::Queen, Suit::Hearts),
                card(Rank::Queen, Suit::Diamonds),
                card(Rank::Two, Suit::Clubs),
            ],
            vec![card(Rank::Queen, Suit::Clubs), card(Rank::Three, Suit::Hearts)],
        ],
        vec![
            card(Rank::Seven, Suit::Clubs),
            card(Rank::Six, Suit::Clubs),
            card(Rank::Five, Suit::Clubs),
        ],
        10,
    );
    state.rehash();

    let drawn = apply(&state, &Action::DrawStock).unwrap();
    let spread = apply(
        &drawn,
        &Action::Spread {
            cards: vec![
                card(Rank::Queen, Suit::Spades),
                card(Rank::Queen, Suit::Hearts),
                card(Rank::Queen, Suit::Diamonds),
            ],
        },
    )
    .unwrap();
    let after_discard = apply(&spread, &Action::Discard { card_idx: 0 }).unwrap();

    // Seat 1 hits the queen spread.
    let s1_drawn = apply(&after_discard, &Action::DrawStock).unwrap();
    let hit = apply(
        &s1_drawn,
        &Action::Hit {
            card_idx: 0,
            target_seat: 0,
            spread_idx: 0,
        },
    )
    .unwrap();

    assert_eq!(hit.spreads[0][0].cards.len(), 4);
    assert_eq!(hit.seats[0].hit_count, 1);
    // The scripted piles do not hold a full deck, but nothing may leak.
    assert_eq!(hit.card_count(), state.card_count());
}

#[test]
fn dropper_blocked_until_penalty_rounds_pass() {
    // Seat 1 was hit once: two penalty rounds, one consumed per own turn.
    let mut state = hand_with(
        vec![
            vec![card(Rank::Two, Suit::Hearts), card(Rank::King, Suit::Spades)],
            vec![card(Rank::Three, Suit::Hearts), card(Rank::King, Suit::Hearts)],
        ],
        vec![
            card(Rank::Seven, Suit::Clubs),
            card(Rank::Six, Suit::Clubs),
            card(Rank::Five, Suit::Clubs),
            card(Rank::Four, Suit::Clubs),
        ],
        10,
    );
    state.seats[1].hit_count = 1;
    state.seats[1].hit_penalty_rounds = 2;
    state.rehash();

    // Seat 0 plays through; seat 1's upkeep drops the penalty to 1.
    let s0 = apply(&state, &Action::DrawStock).unwrap();
    let to_s1 = apply(&s0, &Action::Discard { card_idx: 0 }).unwrap();
    assert_eq!(to_s1.turn, 1);
    assert_eq!(to_s1.seats[1].hit_penalty_rounds, 1);
    assert!(apply(&to_s1, &Action::Drop).is_err());

    // Around the table once more; the second upkeep clears it.
    let s1 = apply(&to_s1, &Action::DrawStock).unwrap();
    let to_s0 = apply(&s1, &Action::Discard { card_idx: 0 }).unwrap();
    let s0 = apply(&to_s0, &Action::DrawStock).unwrap();
    let back_to_s1 = apply(&s0, &Action::Discard { card_idx: 0 }).unwrap();
    assert_eq!(back_to_s1.seats[1].hit_penalty_rounds, 0);
    assert!(apply(&back_to_s1, &Action::Drop).is_ok());
}

#[test]
fn spread_canonical_order_keeps_hashes_stable() {
    let a = Spread::build(vec![
        card(Rank::Five, Suit::Clubs),
        card(Rank::Three, Suit::Clubs),
        card(Rank::Four, Suit::Clubs),
    ])
    .unwrap();
    let b = Spread::build(vec![
        card(Rank::Four, Suit::Clubs),
        card(Rank::Five, Suit::Clubs),
        card(Rank::Three, Suit::Clubs),
    ])
    .unwrap();
    assert_eq!(a, b);
}
