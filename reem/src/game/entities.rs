//! Core game entities: cards, seats, spreads, and the authoritative hand state.

use rand::{rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// Maximum seats at a table.
pub const MAX_SEATS: usize = 4;

/// Cards dealt to each seat at the start of a hand.
pub const HAND_SIZE: usize = 5;

/// Size of the stripped deck (8s, 9s, and 10s removed).
pub const DECK_SIZE: usize = 40;

/// A hand dealt at exactly this score wins outright at deal time.
pub const IMMEDIATE_WIN_SCORE: u32 = 50;

/// The exact score that qualifies for a declared special win.
pub const SPECIAL_WIN_SCORE: u32 = 41;

/// Scores at or below this also qualify for a declared special win.
pub const SPECIAL_WIN_FLOOR: u32 = 10;

/// Minimum cards in a spread.
pub const MIN_SPREAD_SIZE: usize = 3;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Suit {
    Hearts,
    Diamonds,
    Clubs,
    Spades,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Hearts, Suit::Diamonds, Suit::Clubs, Suit::Spades];
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Hearts => "♥",
            Self::Diamonds => "♦",
            Self::Clubs => "♣",
            Self::Spades => "♠",
        };
        write!(f, "{repr}")
    }
}

/// Ranks in the stripped deck. The run order is closed and ace-low:
/// `A,2,3,4,5,6,7,J,Q,K` with no wrap-around.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    Ace,
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Jack,
    Queen,
    King,
}

impl Rank {
    pub const ORDER: [Rank; 10] = [
        Rank::Ace,
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
    ];

    /// Position of this rank in the closed run order.
    pub fn order_index(self) -> usize {
        match self {
            Self::Ace => 0,
            Self::Two => 1,
            Self::Three => 2,
            Self::Four => 3,
            Self::Five => 4,
            Self::Six => 5,
            Self::Seven => 6,
            Self::Jack => 7,
            Self::Queen => 8,
            Self::King => 9,
        }
    }

    /// Point value counted against a hand: 2-7 at face, courts at 10, ace at 1.
    pub fn point_value(self) -> u32 {
        match self {
            Self::Ace => 1,
            Self::Two => 2,
            Self::Three => 3,
            Self::Four => 4,
            Self::Five => 5,
            Self::Six => 6,
            Self::Seven => 7,
            Self::Jack | Self::Queen | Self::King => 10,
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Ace => "A",
            Self::Two => "2",
            Self::Three => "3",
            Self::Four => "4",
            Self::Five => "5",
            Self::Six => "6",
            Self::Seven => "7",
            Self::Jack => "J",
            Self::Queen => "Q",
            Self::King => "K",
        };
        write!(f, "{repr}")
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

impl Card {
    pub const fn new(rank: Rank, suit: Suit) -> Self {
        Self { rank, suit }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.rank, self.suit)
    }
}

/// The 40-card deck in canonical order.
pub fn base_deck() -> Vec<Card> {
    let mut cards = Vec::with_capacity(DECK_SIZE);
    for rank in Rank::ORDER {
        for suit in Suit::ALL {
            cards.push(Card::new(rank, suit));
        }
    }
    cards
}

/// A freshly shuffled deck. Shuffling is the only randomness in the engine,
/// so the generator is injected by the caller.
pub fn shuffled_deck(rng: &mut StdRng) -> Vec<Card> {
    let mut cards = base_deck();
    cards.shuffle(rng);
    cards
}

/// Sum of point values over a set of cards. Only cards still in hand count
/// toward a seat's score; laid spreads do not.
pub fn hand_score(cards: &[Card]) -> u32 {
    cards.iter().map(|c| c.rank.point_value()).sum()
}

/// Type alias for seat positions within a hand.
pub type SeatIndex = usize;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatStatus {
    Active,
    Disconnected,
    Left,
}

/// A seat at the table, occupied by a human or a bot for the hand.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Seat {
    pub username: String,
    pub is_human: bool,
    /// None for bots and for humans whose connection dropped. Transport
    /// plumbing, not game state: excluded from the canonical hash so a
    /// reconnect does not desync every client at the table.
    #[serde(skip, default)]
    pub connection_id: Option<Uuid>,
    /// Chip balance snapshotted from the ledger at hand start.
    pub chips: i64,
    pub status: SeatStatus,
    /// Rounds this seat is still barred from dropping after being hit.
    pub hit_penalty_rounds: u8,
    /// Times this seat has been hit during the current hand.
    pub hit_count: u32,
}

impl Seat {
    pub fn human(username: impl Into<String>, connection_id: Uuid, chips: i64) -> Self {
        Self {
            username: username.into(),
            is_human: true,
            connection_id: Some(connection_id),
            chips,
            status: SeatStatus::Active,
            hit_penalty_rounds: 0,
            hit_count: 0,
        }
    }

    pub fn bot(username: impl Into<String>, chips: i64) -> Self {
        Self {
            username: username.into(),
            is_human: false,
            connection_id: None,
            chips,
            status: SeatStatus::Active,
            hit_penalty_rounds: 0,
            hit_count: 0,
        }
    }
}

/// A laid-down meld of at least three cards: either all one rank, or a
/// same-suit run in the closed rank order.
///
/// Cards are kept sorted by run order so equal spreads hash identically.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Spread {
    pub cards: Vec<Card>,
}

impl Spread {
    /// Validate and canonicalise a set of cards as a spread.
    pub fn build(mut cards: Vec<Card>) -> Option<Self> {
        cards.sort_by_key(|c| (c.rank.order_index(), c.suit));
        if !Self::is_valid(&cards) {
            return None;
        }
        Some(Self { cards })
    }

    /// True when the (sorted) cards form a valid spread.
    pub fn is_valid(cards: &[Card]) -> bool {
        if cards.len() < MIN_SPREAD_SIZE {
            return false;
        }
        let same_rank = cards.iter().all(|c| c.rank == cards[0].rank);
        if same_rank {
            // Duplicate cards would imply two identical suits.
            let mut suits: Vec<Suit> = cards.iter().map(|c| c.suit).collect();
            suits.sort();
            suits.dedup();
            return suits.len() == cards.len();
        }
        let same_suit = cards.iter().all(|c| c.suit == cards[0].suit);
        if !same_suit {
            return false;
        }
        cards
            .windows(2)
            .all(|w| w[1].rank.order_index() == w[0].rank.order_index() + 1)
    }

    /// True when `card` legally extends this spread: matching rank for a
    /// same-rank spread, or matching suit forming a contiguous run window.
    pub fn can_extend(&self, card: Card) -> bool {
        let same_rank = self.cards.iter().all(|c| c.rank == self.cards[0].rank);
        if same_rank && self.cards[0].rank != card.rank {
            return false;
        }
        if !same_rank && self.cards[0].suit != card.suit {
            return false;
        }
        let mut cards = self.cards.clone();
        cards.push(card);
        cards.sort_by_key(|c| (c.rank.order_index(), c.suit));
        Self::is_valid(&cards)
    }

    /// Insert an extending card, keeping canonical order. The caller must
    /// have checked `can_extend`.
    pub fn extend_with(&mut self, card: Card) {
        self.cards.push(card);
        self.cards.sort_by_key(|c| (c.rank.order_index(), c.suit));
    }
}

/// How a hand terminated.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WinType {
    Reem,
    Immediate50,
    SpecialWin,
    RegularWin,
    StockEmpty,
    DropWin,
    DropCaught,
    ForfeitWin,
}

impl fmt::Display for WinType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Reem => "REEM",
            Self::Immediate50 => "IMMEDIATE_50",
            Self::SpecialWin => "SPECIAL_WIN",
            Self::RegularWin => "REGULAR_WIN",
            Self::StockEmpty => "STOCK_EMPTY",
            Self::DropWin => "DROP_WIN",
            Self::DropCaught => "DROP_CAUGHT",
            Self::ForfeitWin => "FORFEIT_WIN",
        };
        write!(f, "{repr}")
    }
}

/// Terminal outcome of a hand.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct HandOutcome {
    pub win_type: WinType,
    pub winners: Vec<SeatIndex>,
    pub round_scores: Vec<u32>,
    pub dropped_seat: Option<SeatIndex>,
}

/// Hand lifecycle. Terminal data rides on the `Over` variant so in-progress
/// states carry no nullable outcome fields.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum HandPhase {
    Waiting,
    InProgress,
    Over(HandOutcome),
}

/// The authoritative per-table game state during a hand.
///
/// Only the session layer mutates the stored copy; the rules engine receives
/// it immutably and returns a fresh value.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct HandState {
    pub game_id: Uuid,
    pub seats: Vec<Seat>,
    /// `hands[i]` is the ordered hand held by seat `i`.
    pub hands: Vec<Vec<Card>>,
    /// `spreads[i]` are the melds laid by seat `i`, in lay order.
    pub spreads: Vec<Vec<Spread>>,
    /// Remaining draw pile; the top is the last element.
    pub stock: Vec<Card>,
    /// Discard pile; the top is the last element.
    pub discard: Vec<Card>,
    pub turn: SeatIndex,
    pub has_drawn: bool,
    pub stake: i64,
    #[serde(flatten)]
    pub phase: HandPhase,
    /// Canonical digest of everything above, recomputed on every mutation.
    #[serde(skip, default)]
    pub state_hash: String,
}

impl HandState {
    pub fn pot(&self) -> i64 {
        self.stake * self.seats.len() as i64
    }

    pub fn score_of(&self, seat: SeatIndex) -> u32 {
        hand_score(&self.hands[seat])
    }

    pub fn round_scores(&self) -> Vec<u32> {
        (0..self.seats.len()).map(|i| self.score_of(i)).collect()
    }

    pub fn is_over(&self) -> bool {
        matches!(self.phase, HandPhase::Over(_))
    }

    pub fn outcome(&self) -> Option<&HandOutcome> {
        match &self.phase {
            HandPhase::Over(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// Total cards across stock, discard, hands, and spreads. Always 40 for
    /// a dealt hand.
    pub fn card_count(&self) -> usize {
        self.stock.len()
            + self.discard.len()
            + self.hands.iter().map(Vec::len).sum::<usize>()
            + self
                .spreads
                .iter()
                .flatten()
                .map(|s| s.cards.len())
                .sum::<usize>()
    }

    /// Recompute the canonical state hash. The hash field itself is excluded
    /// from the digest input.
    pub fn rehash(&mut self) {
        self.state_hash = self.compute_hash();
    }

    pub fn compute_hash(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&bytes);
        hex::encode(digest)
    }

    /// Redact the state for a viewer. Seats see their own hand; everyone
    /// else's cards and the stock are hidden. Spreads and discards stay
    /// visible.
    pub fn redacted_for(&self, viewer: Option<SeatIndex>) -> HandStateView {
        self.view_where(|i| Some(i) == viewer)
    }

    /// The fully revealed state, for end-of-hand broadcasts where scores
    /// must be verifiable.
    pub fn revealed(&self) -> HandStateView {
        self.view_where(|_| true)
    }

    fn view_where(&self, show_hand: impl Fn(SeatIndex) -> bool) -> HandStateView {
        let hands = self
            .hands
            .iter()
            .enumerate()
            .map(|(i, hand)| {
                hand.iter()
                    .map(|card| {
                        if show_hand(i) {
                            CardView::Visible(*card)
                        } else {
                            CardView::hidden()
                        }
                    })
                    .collect()
            })
            .collect();

        HandStateView {
            game_id: self.game_id,
            seats: self
                .seats
                .iter()
                .enumerate()
                .map(|(i, seat)| SeatView {
                    username: seat.username.clone(),
                    is_human: seat.is_human,
                    status: seat.status,
                    chips: seat.chips,
                    hit_penalty_rounds: seat.hit_penalty_rounds,
                    hit_count: seat.hit_count,
                    card_count: self.hands[i].len(),
                })
                .collect(),
            hands,
            spreads: self.spreads.clone(),
            stock_count: self.stock.len(),
            discard: self.discard.clone(),
            turn: self.turn,
            has_drawn: self.has_drawn,
            stake: self.stake,
            pot: self.pot(),
            phase: self.phase.clone(),
            state_hash: self.state_hash.clone(),
        }
    }

    /// Index of the seat owned by `username`, if seated this hand.
    pub fn seat_of(&self, username: &str) -> Option<SeatIndex> {
        self.seats.iter().position(|s| s.username == username)
    }

    /// Index of the seat bound to a connection.
    pub fn seat_of_connection(&self, connection_id: Uuid) -> Option<SeatIndex> {
        self.seats
            .iter()
            .position(|s| s.connection_id == Some(connection_id))
    }
}

/// A seat as shown to clients: no connection internals, card count instead
/// of cards.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SeatView {
    pub username: String,
    pub is_human: bool,
    pub status: SeatStatus,
    pub chips: i64,
    pub hit_penalty_rounds: u8,
    pub hit_count: u32,
    pub card_count: usize,
}

/// A card as shown to clients; hidden cards serialise as
/// `{"rank":"hidden","suit":"hidden"}`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CardView {
    Visible(Card),
    Hidden {
        rank: &'static str,
        suit: &'static str,
    },
}

impl CardView {
    pub fn hidden() -> Self {
        Self::Hidden {
            rank: "hidden",
            suit: "hidden",
        }
    }
}

/// The hand state as seen by one viewer.
#[derive(Clone, Debug, Serialize)]
pub struct HandStateView {
    pub game_id: Uuid,
    pub seats: Vec<SeatView>,
    pub hands: Vec<Vec<CardView>>,
    pub spreads: Vec<Vec<Spread>>,
    pub stock_count: usize,
    pub discard: Vec<Card>,
    pub turn: SeatIndex,
    pub has_drawn: bool,
    pub stake: i64,
    pub pot: i64,
    #[serde(flatten)]
    pub phase: HandPhase,
    pub state_hash: String,
}
