//! Table actor: the single writer for one table's roster and hand state.
//!
//! Every mutation flows through the actor's mailbox; timers (countdowns,
//! the bot-turn delay, disconnect grace periods, transition expiry) are
//! deadlines checked on the tick.

use super::{
    config::TableConfig,
    messages::{Spectator, StateVerdict, TableMessage, TablePhase, TableResponse, Transition},
};
use crate::{
    bot,
    db::{save_status_with_retry, GameRecord, GameRepository, TableRepository},
    game::{self, Action, HandState, Seat, SeatStatus, WinType},
    ledger::{LedgerManager, SeatAccount, TableId, UserId, HOUSE_USER_ID},
    matchmaker::{MatchTrigger, SeatOutcome, TableRoster},
    net::{ServerEvent, TableSummary},
    queue::QueuedPlayer,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::{
    sync::mpsc,
    time::{interval, Instant},
};
use uuid::Uuid;

/// Minimum spacing between full state syncs per connection.
const SYNC_THROTTLE: Duration = Duration::from_secs(1);

/// Handle for sending messages to a table actor.
#[derive(Clone)]
pub struct TableHandle {
    sender: mpsc::Sender<TableMessage>,
    table_id: TableId,
}

impl TableHandle {
    pub fn new(sender: mpsc::Sender<TableMessage>, table_id: TableId) -> Self {
        Self { sender, table_id }
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub async fn send(&self, message: TableMessage) -> Result<(), String> {
        self.sender
            .send(message)
            .await
            .map_err(|_| "table is closed".to_string())
    }
}

pub struct TableActor {
    id: TableId,
    config: TableConfig,
    phase: TablePhase,

    /// Roster between hands; cloned into the hand state at deal.
    seats: Vec<Seat>,
    /// Username to user id for seated humans.
    user_ids: HashMap<String, UserId>,
    spectators: Vec<Spectator>,
    ready: HashSet<String>,
    hand: Option<HandState>,
    hand_started_at: Option<DateTime<Utc>>,
    transitions: Vec<Transition>,
    /// Bots to remove at the next hand boundary.
    bot_evictions: usize,

    /// Room membership: every connected socket watching this table.
    subscribers: HashMap<Uuid, mpsc::Sender<ServerEvent>>,

    countdown_until: Option<Instant>,
    bot_turn_at: Option<Instant>,
    disconnect_deadlines: HashMap<String, Instant>,
    last_sync: HashMap<Uuid, Instant>,

    ledger: LedgerManager,
    games: Arc<dyn GameRepository>,
    tables: Arc<dyn TableRepository>,

    /// Tells the manager this table's roster changed (for tables_update).
    roster_tx: Option<mpsc::UnboundedSender<TableId>>,
    /// Nudges the matchmaker on disconnects and seat churn.
    match_tx: Option<mpsc::Sender<MatchTrigger>>,

    inbox: mpsc::Receiver<TableMessage>,
    bot_counter: u32,
    closed: bool,
}

impl TableActor {
    pub fn new(
        id: TableId,
        config: TableConfig,
        ledger: LedgerManager,
        games: Arc<dyn GameRepository>,
        tables: Arc<dyn TableRepository>,
    ) -> (Self, TableHandle) {
        let (sender, inbox) = mpsc::channel(100);
        let actor = Self {
            id,
            config,
            phase: TablePhase::Empty,
            seats: Vec::new(),
            user_ids: HashMap::new(),
            spectators: Vec::new(),
            ready: HashSet::new(),
            hand: None,
            hand_started_at: None,
            transitions: Vec::new(),
            bot_evictions: 0,
            subscribers: HashMap::new(),
            countdown_until: None,
            bot_turn_at: None,
            disconnect_deadlines: HashMap::new(),
            last_sync: HashMap::new(),
            ledger,
            games,
            tables,
            roster_tx: None,
            match_tx: None,
            inbox,
            bot_counter: 0,
            closed: false,
        };
        let handle = TableHandle::new(sender, id);
        (actor, handle)
    }

    pub fn set_roster_notifier(&mut self, tx: mpsc::UnboundedSender<TableId>) {
        self.roster_tx = Some(tx);
    }

    pub fn set_match_trigger(&mut self, tx: mpsc::Sender<MatchTrigger>) {
        self.match_tx = Some(tx);
    }

    /// Run the actor event loop until closed.
    pub async fn run(mut self) {
        log::info!("table {} (stake {}) starting", self.id, self.config.stake);

        let mut tick = interval(self.config.tick_interval);
        loop {
            tokio::select! {
                message = self.inbox.recv() => {
                    match message {
                        Some(message) => self.handle_message(message).await,
                        None => break,
                    }
                    if self.closed {
                        break;
                    }
                }
                _ = tick.tick() => {
                    self.tick().await;
                    if self.closed {
                        break;
                    }
                }
            }
        }

        log::info!("table {} closed", self.id);
    }

    async fn handle_message(&mut self, message: TableMessage) {
        match message {
            TableMessage::Join {
                user_id,
                username,
                connection_id,
                reply,
            } => {
                let result = self.handle_join(user_id, username, connection_id).await;
                let _ = reply.send(result);
            }

            TableMessage::JoinSpectator {
                user_id,
                username,
                connection_id,
                reply,
            } => {
                let result = self.handle_spectate(user_id, username, connection_id);
                let _ = reply.send(result);
            }

            TableMessage::Ready { username, reply } => {
                let result = self.handle_ready(&username);
                let _ = reply.send(result);
            }

            TableMessage::GameAction {
                connection_id,
                username,
                action,
                client_hash,
            } => {
                self.handle_game_action(connection_id, &username, action, client_hash)
                    .await;
            }

            TableMessage::Leave { username, reply } => {
                let result = self.remove_player(&username).await;
                let _ = reply.send(result);
            }

            TableMessage::Reconnect {
                username,
                connection_id,
                reply,
            } => {
                let result = self.handle_reconnect(&username, connection_id);
                let _ = reply.send(result);
            }

            TableMessage::ConnectionClosed { connection_id } => {
                self.handle_connection_closed(connection_id).await;
            }

            TableMessage::RequestStateSync { connection_id } => {
                self.handle_state_sync(connection_id);
            }

            TableMessage::VerifyState { client_hash, reply } => {
                let verdict = self.verify_state(&client_hash);
                let _ = reply.send(verdict);
            }

            TableMessage::Subscribe {
                connection_id,
                sender,
            } => {
                self.subscribers.insert(connection_id, sender);
            }

            TableMessage::Unsubscribe { connection_id } => {
                self.subscribers.remove(&connection_id);
                self.last_sync.remove(&connection_id);
            }

            TableMessage::GetRoster { reply } => {
                let _ = reply.send(self.roster());
            }

            TableMessage::SeatFromQueue { player, reply } => {
                let QueuedPlayer {
                    user_id,
                    username,
                    connection_id,
                    ..
                } = player;
                let result = self.handle_join(user_id, username, connection_id).await;
                let _ = reply.send(result);
            }

            TableMessage::AddBotAndStart { reply } => {
                let result = self.handle_add_bot_and_start().await;
                let _ = reply.send(result);
            }

            TableMessage::EvictBots { reply } => {
                let _ = reply.send(self.handle_evict_bots());
            }

            TableMessage::ResolveTransitions { reply } => {
                if !self.hand_in_progress() {
                    self.resolve_transitions_now().await;
                    self.promote_waiting_spectators().await;
                }
                let _ = reply.send(TableResponse::Success);
            }

            TableMessage::GetSummary { reply } => {
                let _ = reply.send(self.summary());
            }

            TableMessage::Tick => {
                self.tick().await;
            }
        }
    }

    // -----------------------------------------------------------------
    // Joining and spectating
    // -----------------------------------------------------------------

    async fn handle_join(
        &mut self,
        user_id: UserId,
        username: String,
        connection_id: Uuid,
    ) -> Result<SeatOutcome, String> {
        if self.seats.iter().any(|s| s.username == username)
            || self.spectators.iter().any(|s| s.username == username)
        {
            return Err(format!("{username} is already at this table"));
        }

        if !self.hand_in_progress() {
            if self.claimed_seats() >= self.config.max_seats {
                return Ok(SeatOutcome::TableFull);
            }
            self.seat_human(user_id, &username, connection_id).await;
            return Ok(SeatOutcome::Seated);
        }

        // Hand running: the joiner spectates. With an unclaimed bot at the
        // table they are promised its seat; otherwise they wait for the
        // next hand.
        let earmarked: HashSet<String> = self
            .transitions
            .iter()
            .map(|t| t.bot_username.clone())
            .collect();
        let free_bot: Option<(usize, String)> = self
            .seats
            .iter()
            .enumerate()
            .find(|(_, s)| !s.is_human && !earmarked.contains(&s.username))
            .map(|(i, s)| (i, s.username.clone()));

        let view = self.hand.as_ref().map(|h| h.redacted_for(None));

        match free_bot {
            Some((seat_idx, bot_username)) => {
                let transition_id = Uuid::new_v4();
                self.transitions.push(Transition {
                    transition_id,
                    table_id: self.id,
                    pending_seat: seat_idx,
                    bot_username,
                    username: username.clone(),
                    started_at: Utc::now(),
                });
                self.spectators.push(Spectator {
                    user_id,
                    username: username.clone(),
                    connection_id,
                    joined_at: Utc::now(),
                    transition_id: Some(transition_id),
                    will_join_next_hand: false,
                });
                self.send_event(
                    connection_id,
                    ServerEvent::SpectatorModeActive {
                        table_id: self.id,
                        view,
                    },
                );
                self.broadcast_event(ServerEvent::TransitionInitiated {
                    table_id: self.id,
                    transition_id,
                });
                log::info!(
                    "{username} transitioning into table {} (bot seat {seat_idx})",
                    self.id
                );
                Ok(SeatOutcome::TransitionInitiated { transition_id })
            }
            None => {
                if self.claimed_seats() >= self.config.max_seats {
                    return Ok(SeatOutcome::TableFull);
                }
                self.spectators.push(Spectator {
                    user_id,
                    username: username.clone(),
                    connection_id,
                    joined_at: Utc::now(),
                    transition_id: None,
                    will_join_next_hand: true,
                });
                self.send_event(
                    connection_id,
                    ServerEvent::SpectatorModeActive {
                        table_id: self.id,
                        view,
                    },
                );
                Ok(SeatOutcome::WillJoinNextHand)
            }
        }
    }

    fn handle_spectate(
        &mut self,
        user_id: UserId,
        username: String,
        connection_id: Uuid,
    ) -> TableResponse {
        if self.spectators.iter().any(|s| s.username == username) {
            return TableResponse::Error(format!("{username} is already spectating"));
        }
        let view = self.hand.as_ref().map(|h| h.redacted_for(None));
        self.spectators.push(Spectator {
            user_id,
            username,
            connection_id,
            joined_at: Utc::now(),
            transition_id: None,
            will_join_next_hand: false,
        });
        self.send_event(
            connection_id,
            ServerEvent::SpectatorModeActive {
                table_id: self.id,
                view,
            },
        );
        TableResponse::Success
    }

    async fn seat_human(&mut self, user_id: UserId, username: &str, connection_id: Uuid) {
        let chips = self.ledger.balance(user_id).await.unwrap_or(0);
        self.seats.push(Seat::human(username, connection_id, chips));
        self.user_ids.insert(username.to_string(), user_id);
        if self.phase == TablePhase::Empty {
            self.phase = TablePhase::Waiting;
        }
        self.broadcast_event(ServerEvent::PlayerJoined {
            table_id: self.id,
            username: username.to_string(),
        });
        log::info!("{username} seated at table {}", self.id);
        self.notify_roster();
    }

    /// Seats plus seats promised to transitioning or waiting spectators.
    fn claimed_seats(&self) -> usize {
        let waiting = self
            .spectators
            .iter()
            .filter(|s| s.will_join_next_hand)
            .count();
        self.seats.len() + self.transitions.len() + waiting
    }

    // -----------------------------------------------------------------
    // Ready-up and hand start
    // -----------------------------------------------------------------

    fn handle_ready(&mut self, username: &str) -> TableResponse {
        let seat = self.seats.iter().find(|s| s.username == username);
        match seat {
            Some(seat) if seat.is_human => {}
            Some(_) => return TableResponse::Error("bots ready up on their own".to_string()),
            None => return TableResponse::NotAtTable,
        }
        if self.hand_in_progress() {
            return TableResponse::Error("hand already in progress".to_string());
        }

        self.ready.insert(username.to_string());

        // Bots are auto-ready, so the hand starts once every human is in.
        let humans_ready = self
            .seats
            .iter()
            .filter(|s| s.is_human)
            .all(|s| self.ready.contains(&s.username));
        if humans_ready && self.seats.len() >= 2 && self.phase == TablePhase::Waiting {
            self.begin_countdown(self.config.ready_countdown);
        }
        TableResponse::Success
    }

    fn begin_countdown(&mut self, duration: Duration) {
        self.phase = TablePhase::Countdown;
        self.countdown_until = Some(Instant::now() + duration);
        log::info!(
            "table {} counting down {}ms to deal",
            self.id,
            duration.as_millis()
        );
        self.notify_roster();
    }

    async fn handle_add_bot_and_start(&mut self) -> TableResponse {
        if self.hand_in_progress() || self.phase == TablePhase::Countdown {
            return TableResponse::Error("hand already starting".to_string());
        }
        let humans = self.seats.iter().filter(|s| s.is_human).count();
        let bots = self.seats.len() - humans;
        if humans != 1 || bots != 0 {
            return TableResponse::Error("table does not need a bot".to_string());
        }

        self.bot_counter += 1;
        let name = format!("bot_{}_{}", self.id, self.bot_counter);
        self.seats
            .push(Seat::bot(name.as_str(), self.config.stake * 100));
        log::info!("bot {name} seated at table {}", self.id);
        self.notify_roster();

        self.begin_countdown(self.config.match_countdown);
        TableResponse::Success
    }

    fn handle_evict_bots(&mut self) -> usize {
        let earmarked: HashSet<&String> =
            self.transitions.iter().map(|t| &t.bot_username).collect();
        if self.hand_in_progress() {
            let loose_bots = self
                .seats
                .iter()
                .filter(|s| !s.is_human && !earmarked.contains(&s.username))
                .count();
            self.bot_evictions = loose_bots;
            loose_bots
        } else {
            let before = self.seats.len();
            self.seats.retain(|s| s.is_human);
            let evicted = before - self.seats.len();
            if evicted > 0 {
                self.notify_roster();
            }
            evicted
        }
    }

    async fn start_hand(&mut self) {
        if self.seats.len() < 2 {
            log::warn!("table {} countdown lapsed with too few seats", self.id);
            self.phase = if self.seats.is_empty() {
                TablePhase::Empty
            } else {
                TablePhase::Waiting
            };
            return;
        }

        // Refresh chip snapshots from the ledger before staking.
        for seat in &mut self.seats {
            if seat.is_human {
                if let Some(&user_id) = self.user_ids.get(&seat.username) {
                    if let Ok(balance) = self.ledger.balance(user_id).await {
                        seat.chips = balance;
                    }
                }
            }
            seat.hit_penalty_rounds = 0;
            seat.hit_count = 0;
            if seat.status == SeatStatus::Left {
                seat.status = SeatStatus::Active;
            }
        }

        let game_id = Uuid::new_v4();
        let accounts = self.roster_accounts();
        if let Err(e) = self
            .ledger
            .deduct_stakes(&accounts, self.config.stake, self.id, game_id)
            .await
        {
            log::warn!("table {}: hand start aborted, stakes failed: {e}", self.id);
            self.phase = TablePhase::Waiting;
            self.ready.clear();
            self.broadcast_event(ServerEvent::Error {
                message: format!("hand could not start: {e}"),
            });
            self.notify_roster();
            return;
        }
        for seat in &mut self.seats {
            if seat.is_human {
                seat.chips -= self.config.stake;
            }
        }

        let seed = self.config.deal_seed.unwrap_or_else(rand::random);
        let hand = game::deal(game_id, self.seats.clone(), self.config.stake, seed);
        self.hand_started_at = Some(Utc::now());
        self.phase = TablePhase::InHand;
        self.ready.clear();

        if let Err(e) = save_status_with_retry(self.tables.as_ref(), self.id, "in_hand").await {
            log::error!("table {}: status save failed: {e}", self.id);
        }

        log::info!(
            "table {} dealt hand {} at stake {}",
            self.id,
            game_id,
            self.config.stake
        );

        let over = hand.is_over();
        self.hand = Some(hand);
        self.broadcast_game_update();
        if over {
            // A seat was dealt an immediate fifty.
            self.settle().await;
        } else {
            self.persist_hand().await;
            self.broadcast_turn_start();
            self.arm_bot_timer();
        }
        self.notify_roster();
    }

    // -----------------------------------------------------------------
    // Turn driving
    // -----------------------------------------------------------------

    async fn handle_game_action(
        &mut self,
        connection_id: Uuid,
        username: &str,
        action: Action,
        client_hash: Option<String>,
    ) {
        // Snapshot the validation inputs up front; the borrow of the hand
        // must not outlive the event pushes below.
        let snapshot = self.hand.as_ref().map(|h| {
            let acting = &h.seats[h.turn];
            (
                h.is_over(),
                acting.connection_id,
                acting.username.clone(),
                acting.is_human,
                h.state_hash.clone(),
            )
        });
        let is_discard = matches!(action, Action::Discard { .. });

        let (over, acting_conn, acting_user, acting_human, mut server_hash) = match snapshot {
            Some(s) => s,
            None => {
                self.reject_turn(connection_id, "no hand in progress", is_discard);
                return;
            }
        };
        if over {
            self.reject_turn(connection_id, "hand is over", is_discard);
            return;
        }

        if acting_conn != Some(connection_id) {
            // A discard from the right user on a fresh connection is a
            // reconnect race: patch the connection through and accept.
            if is_discard && acting_human && acting_user == username {
                self.patch_connection(username, connection_id);
                if let Some(hand) = &self.hand {
                    server_hash = hand.state_hash.clone();
                }
            } else {
                self.reject_turn(connection_id, "not your turn", is_discard);
                return;
            }
        }

        if let Some(client_hash) = client_hash {
            if client_hash != server_hash {
                log::debug!("table {}: desync from {username}, reconciling", self.id);
                self.reconcile(connection_id);
                return;
            }
        }

        let result = match &self.hand {
            Some(hand) => game::apply(hand, &action),
            None => return,
        };
        match result {
            Ok(next) => {
                self.hand = Some(next);
                self.after_action().await;
            }
            Err(e) => {
                self.reject_turn(connection_id, &e.to_string(), is_discard);
            }
        }
    }

    fn reject_turn(&mut self, connection_id: Uuid, message: &str, is_discard: bool) {
        self.send_event(
            connection_id,
            ServerEvent::TurnValidationError {
                message: message.to_string(),
            },
        );
        // Desyncs often present as discard failures; push the
        // authoritative state along with the rejection.
        if is_discard {
            self.push_state_sync(connection_id);
        }
    }

    fn reconcile(&mut self, connection_id: Uuid) {
        let view = self.hand.as_ref().map(|h| {
            let viewer = h.seat_of_connection(connection_id);
            h.redacted_for(viewer)
        });
        if let Some(view) = view {
            self.send_event(
                connection_id,
                ServerEvent::StateReconciled {
                    table_id: self.id,
                    view,
                },
            );
        }
    }

    /// Bookkeeping after any applied action, human or bot.
    async fn after_action(&mut self) {
        self.persist_hand().await;
        self.broadcast_game_update();
        let over = self.hand.as_ref().is_some_and(|h| h.is_over());
        if over {
            self.settle().await;
        } else {
            self.broadcast_turn_start();
            self.arm_bot_timer();
        }
    }

    fn arm_bot_timer(&mut self) {
        let is_bot_turn = self
            .hand
            .as_ref()
            .is_some_and(|h| !h.is_over() && !h.seats[h.turn].is_human);
        self.bot_turn_at = if is_bot_turn {
            Some(Instant::now() + self.config.bot_turn_delay)
        } else {
            None
        };
    }

    async fn drive_bot_turn(&mut self) {
        self.bot_turn_at = None;
        let Some(hand) = &self.hand else { return };
        if hand.is_over() || hand.seats[hand.turn].is_human {
            return;
        }

        let action = bot::decide(hand);
        match game::apply(hand, &action) {
            Ok(next) => {
                self.hand = Some(next);
                self.after_action().await;
            }
            Err(e) => {
                // Abort this bot turn without advancing state; the next
                // human action or matchmaker tick recovers the table.
                log::error!(
                    "table {}: bot action {action:?} failed: {e}",
                    self.id
                );
            }
        }
    }

    fn patch_connection(&mut self, username: &str, connection_id: Uuid) {
        if let Some(seat) = self.seats.iter_mut().find(|s| s.username == username) {
            seat.connection_id = Some(connection_id);
            seat.status = SeatStatus::Active;
        }
        if let Some(hand) = &mut self.hand {
            if let Some(idx) = hand.seat_of(username) {
                hand.seats[idx].connection_id = Some(connection_id);
                hand.seats[idx].status = SeatStatus::Active;
                hand.rehash();
            }
        }
        self.disconnect_deadlines.remove(username);
        // Seat status is part of the hashed state, so every client needs
        // the refreshed view.
        self.broadcast_game_update();
    }

    // -----------------------------------------------------------------
    // Settlement and hand end
    // -----------------------------------------------------------------

    async fn settle(&mut self) {
        let Some(hand) = self.hand.take() else { return };
        let Some(outcome) = hand.outcome().cloned() else {
            self.hand = Some(hand);
            return;
        };

        self.phase = TablePhase::Settling;
        self.bot_turn_at = None;

        let accounts: Vec<SeatAccount> = hand.seats.iter().map(|s| self.account_for(s)).collect();

        if let Err(e) = self
            .ledger
            .distribute_winnings(
                &accounts,
                &outcome.winners,
                outcome.win_type,
                hand.stake,
                self.id,
                hand.game_id,
            )
            .await
        {
            // The hand does not re-open; operators reconcile from the log.
            log::error!(
                "table {}: payout failed for game {}: {e}",
                self.id,
                hand.game_id
            );
        }

        if outcome.win_type == WinType::DropCaught {
            if let Some(dropper) = outcome.dropped_seat {
                let statuses: Vec<SeatStatus> = hand.seats.iter().map(|s| s.status).collect();
                if let Err(e) = self
                    .ledger
                    .apply_drop_penalty(
                        &accounts,
                        dropper,
                        &outcome.round_scores,
                        &statuses,
                        hand.stake,
                        self.id,
                        hand.game_id,
                    )
                    .await
                {
                    log::error!(
                        "table {}: drop penalty failed for game {}: {e}",
                        self.id,
                        hand.game_id
                    );
                }
            }
        }

        let record = GameRecord {
            game_id: hand.game_id,
            table_id: self.id,
            stake: hand.stake,
            seats: hand.seats.iter().map(|s| s.username.clone()).collect(),
            winners: outcome.winners.clone(),
            win_type: outcome.win_type.to_string(),
            round_scores: outcome.round_scores.clone(),
            started_at: self.hand_started_at.unwrap_or_else(Utc::now),
            ended_at: Utc::now(),
            final_state: serde_json::to_value(&hand).unwrap_or_default(),
        };
        if let Err(e) = self.games.record_game(&record).await {
            log::error!("table {}: game record failed: {e}", self.id);
        }

        self.broadcast_event(ServerEvent::GameOver {
            table_id: self.id,
            outcome: outcome.clone(),
            view: hand.revealed(),
        });
        log::info!(
            "table {} hand {} over: {} winners {:?}",
            self.id,
            hand.game_id,
            outcome.win_type,
            outcome.winners
        );

        for seat in &mut self.seats {
            seat.hit_penalty_rounds = 0;
            seat.hit_count = 0;
        }
        self.hand_started_at = None;

        self.apply_bot_evictions();
        self.resolve_transitions_now().await;
        self.promote_waiting_spectators().await;

        self.ready.clear();
        self.phase = if self.seats.is_empty() {
            TablePhase::Empty
        } else {
            TablePhase::Waiting
        };

        if let Err(e) = save_status_with_retry(self.tables.as_ref(), self.id, "waiting").await {
            log::error!("table {}: status save failed: {e}", self.id);
        }

        if self.config.dynamic && self.seats.is_empty() && self.spectators.is_empty() {
            if let Err(e) = self.tables.delete_table(self.id).await {
                log::error!("table {}: delete failed: {e}", self.id);
            }
            self.closed = true;
        }

        self.notify_roster();
    }

    fn apply_bot_evictions(&mut self) {
        if self.bot_evictions == 0 {
            return;
        }
        let earmarked: HashSet<String> = self
            .transitions
            .iter()
            .map(|t| t.bot_username.clone())
            .collect();
        let mut remaining = self.bot_evictions;
        self.seats.retain(|s| {
            if remaining > 0 && !s.is_human && !earmarked.contains(&s.username) {
                remaining -= 1;
                false
            } else {
                true
            }
        });
        self.bot_evictions = 0;
    }

    async fn resolve_transitions_now(&mut self) {
        let transitions = std::mem::take(&mut self.transitions);
        for transition in transitions {
            let Some(spectator_idx) = self
                .spectators
                .iter()
                .position(|s| s.transition_id == Some(transition.transition_id))
            else {
                // The joiner left while the hand ran; the bot keeps its seat.
                continue;
            };

            let Some(bot_idx) = self
                .seats
                .iter()
                .position(|s| s.username == transition.bot_username && !s.is_human)
            else {
                // Bot already evicted; seat the spectator like a waiter.
                let mut spectator = self.spectators.remove(spectator_idx);
                spectator.will_join_next_hand = true;
                spectator.transition_id = None;
                self.spectators.push(spectator);
                continue;
            };

            let spectator = self.spectators.remove(spectator_idx);
            self.seats.remove(bot_idx);
            let chips = self.ledger.balance(spectator.user_id).await.unwrap_or(0);
            let seat = Seat::human(spectator.username.as_str(), spectator.connection_id, chips);
            self.seats.insert(bot_idx, seat);
            self.user_ids
                .insert(spectator.username.clone(), spectator.user_id);

            self.broadcast_event(ServerEvent::TransitionCompleted {
                table_id: self.id,
                transition_id: transition.transition_id,
                username: spectator.username.clone(),
                seat: bot_idx,
            });
            self.broadcast_event(ServerEvent::PlayerJoined {
                table_id: self.id,
                username: spectator.username.clone(),
            });
            log::info!(
                "{} replaced bot {} at table {}",
                spectator.username,
                transition.bot_username,
                self.id
            );
        }
    }

    async fn promote_waiting_spectators(&mut self) {
        while self.seats.len() < self.config.max_seats {
            let Some(idx) = self
                .spectators
                .iter()
                .position(|s| s.will_join_next_hand)
            else {
                break;
            };
            let spectator = self.spectators.remove(idx);
            self.seat_human(
                spectator.user_id,
                &spectator.username,
                spectator.connection_id,
            )
            .await;
        }
    }

    // -----------------------------------------------------------------
    // Leaving, disconnects, reconnects
    // -----------------------------------------------------------------

    async fn remove_player(&mut self, username: &str) -> TableResponse {
        self.ready.remove(username);
        self.disconnect_deadlines.remove(username);

        // Spectators just drop out, taking any promised seat with them.
        if let Some(idx) = self.spectators.iter().position(|s| s.username == username) {
            let spectator = self.spectators.remove(idx);
            if let Some(tid) = spectator.transition_id {
                self.transitions.retain(|t| t.transition_id != tid);
            }
            self.notify_roster();
            return TableResponse::Success;
        }

        let Some(seat_idx) = self.seats.iter().position(|s| s.username == username) else {
            return TableResponse::NotAtTable;
        };
        let seat = self.seats.remove(seat_idx);

        if self.phase == TablePhase::Countdown {
            // A leaver before the deal cancels the start.
            self.phase = TablePhase::Waiting;
            self.countdown_until = None;
        }

        if self.hand_in_progress() {
            // The user-id mapping must outlive settlement accounting for
            // this seat, so it is dropped only afterwards.
            self.remove_from_hand(username).await;
        }
        self.user_ids.remove(username);

        self.broadcast_event(ServerEvent::PlayerLeft {
            table_id: self.id,
            username: username.to_string(),
        });
        log::info!("{username} left table {} ({:?})", self.id, seat.status);

        if self.seats.is_empty() && !self.hand_in_progress() {
            self.phase = TablePhase::Empty;
        }
        self.notify_roster();
        self.trigger_matchmaker();
        TableResponse::Success
    }

    /// Hand-side bookkeeping when a seated player leaves mid-hand.
    async fn remove_from_hand(&mut self, username: &str) {
        let Some(hand) = &self.hand else { return };
        let Some(hand_idx) = hand.seat_of(username) else {
            return;
        };

        let updated = game::concede_seat(hand, hand_idx);

        let live_humans: Vec<usize> = updated
            .seats
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_human && s.status != SeatStatus::Left)
            .map(|(i, _)| i)
            .collect();

        if live_humans.is_empty() {
            // No bots-only games: abandon the hand and reset the table.
            self.abandon_hand(updated).await;
        } else if live_humans.len() == 1 && updated.seats.len() >= 2 {
            let finished = game::declare_forfeit(&updated, live_humans[0]);
            self.hand = Some(finished);
            self.settle().await;
        } else {
            self.hand = Some(updated);
            self.after_action().await;
        }
    }

    /// Refund stakes and reset when every human is gone mid-hand.
    async fn abandon_hand(&mut self, hand: HandState) {
        log::warn!(
            "table {}: abandoning hand {} with no humans left",
            self.id,
            hand.game_id
        );
        let accounts: Vec<SeatAccount> = hand.seats.iter().map(|s| self.account_for(s)).collect();
        if let Err(e) = self
            .ledger
            .refund_stakes(&accounts, hand.stake, self.id, hand.game_id)
            .await
        {
            log::error!(
                "table {}: refund failed for abandoned game {}: {e}",
                self.id,
                hand.game_id
            );
        }
        self.hand = None;
        self.hand_started_at = None;
        self.bot_turn_at = None;
        self.transitions.clear();
        self.seats.retain(|s| s.is_human);
        self.ready.clear();
        self.phase = if self.seats.is_empty() {
            TablePhase::Empty
        } else {
            TablePhase::Waiting
        };
        if let Err(e) = save_status_with_retry(self.tables.as_ref(), self.id, "waiting").await {
            log::error!("table {}: status save failed: {e}", self.id);
        }
        self.notify_roster();
    }

    fn handle_reconnect(&mut self, username: &str, connection_id: Uuid) -> TableResponse {
        let known = self.seats.iter().any(|s| s.username == username);
        if !known {
            return TableResponse::Error("seat no longer held".to_string());
        }
        self.patch_connection(username, connection_id);
        self.broadcast_event(ServerEvent::PlayerReconnected {
            table_id: self.id,
            username: username.to_string(),
        });
        log::info!("{username} reconnected to table {}", self.id);
        // Fresh connection, fresh view.
        self.push_state_sync(connection_id);
        TableResponse::Success
    }

    async fn handle_connection_closed(&mut self, connection_id: Uuid) {
        self.subscribers.remove(&connection_id);
        self.last_sync.remove(&connection_id);

        // Spectators drop immediately.
        if let Some(idx) = self
            .spectators
            .iter()
            .position(|s| s.connection_id == connection_id)
        {
            let username = self.spectators[idx].username.clone();
            let _ = self.remove_player(&username).await;
            return;
        }

        let Some(seat) = self
            .seats
            .iter_mut()
            .find(|s| s.connection_id == Some(connection_id))
        else {
            return;
        };
        let username = seat.username.clone();
        seat.connection_id = None;
        seat.status = SeatStatus::Disconnected;

        if let Some(hand) = &mut self.hand {
            if let Some(idx) = hand.seat_of(&username) {
                hand.seats[idx].connection_id = None;
                hand.seats[idx].status = SeatStatus::Disconnected;
                hand.rehash();
            }
        }
        self.broadcast_game_update();

        let grace = if self.hand_in_progress() {
            self.config.grace_in_hand
        } else {
            self.config.grace_idle
        };
        self.disconnect_deadlines
            .insert(username.clone(), Instant::now() + grace);
        log::info!(
            "{username} disconnected from table {}; {}s grace",
            self.id,
            grace.as_secs()
        );
        self.trigger_matchmaker();
    }

    // -----------------------------------------------------------------
    // Sync and verification
    // -----------------------------------------------------------------

    fn handle_state_sync(&mut self, connection_id: Uuid) {
        // At most one full sync per second per connection.
        let now = Instant::now();
        if let Some(&last) = self.last_sync.get(&connection_id) {
            if now.duration_since(last) < SYNC_THROTTLE {
                return;
            }
        }
        self.last_sync.insert(connection_id, now);
        self.push_state_sync(connection_id);
    }

    fn push_state_sync(&mut self, connection_id: Uuid) {
        let view = self.hand.as_ref().map(|h| {
            let viewer = h.seat_of_connection(connection_id);
            h.redacted_for(viewer)
        });
        self.send_event(
            connection_id,
            ServerEvent::StateSync {
                table_id: self.id,
                phase: self.phase.to_string(),
                view,
            },
        );
    }

    fn verify_state(&self, client_hash: &str) -> StateVerdict {
        match &self.hand {
            Some(hand) => StateVerdict {
                synced: hand.state_hash == client_hash,
                server_hash: Some(hand.state_hash.clone()),
                hand_in_progress: !hand.is_over(),
            },
            None => StateVerdict {
                synced: true,
                server_hash: None,
                hand_in_progress: false,
            },
        }
    }

    // -----------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------

    async fn tick(&mut self) {
        let now = Instant::now();

        if let Some(at) = self.countdown_until {
            if now >= at {
                self.countdown_until = None;
                if self.phase == TablePhase::Countdown {
                    self.start_hand().await;
                }
            }
        }

        if let Some(at) = self.bot_turn_at {
            if now >= at {
                self.drive_bot_turn().await;
            }
        }

        let expired: Vec<String> = self
            .disconnect_deadlines
            .iter()
            .filter(|(_, &deadline)| now >= deadline)
            .map(|(name, _)| name.clone())
            .collect();
        for username in expired {
            log::info!(
                "{username} grace period expired on table {}; removing seat",
                self.id
            );
            let _ = self.remove_player(&username).await;
        }

        // Transitions whose hand never finished are cleaned up eventually.
        let ttl = ChronoDuration::from_std(self.config.transition_ttl)
            .unwrap_or_else(|_| ChronoDuration::seconds(1800));
        let cutoff = Utc::now() - ttl;
        let stale: Vec<Uuid> = self
            .transitions
            .iter()
            .filter(|t| t.started_at < cutoff)
            .map(|t| t.transition_id)
            .collect();
        for tid in stale {
            log::warn!("table {}: transition {tid} expired unresolved", self.id);
            self.transitions.retain(|t| t.transition_id != tid);
            for spectator in &mut self.spectators {
                if spectator.transition_id == Some(tid) {
                    spectator.transition_id = None;
                    spectator.will_join_next_hand = true;
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Broadcast plumbing
    // -----------------------------------------------------------------

    fn send_event(&mut self, connection_id: Uuid, event: ServerEvent) {
        let Some(sender) = self.subscribers.get(&connection_id) else {
            return;
        };
        match sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!(
                    "table {}: subscriber {connection_id} full, dropping event",
                    self.id
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.subscribers.remove(&connection_id);
            }
        }
    }

    /// Fire-and-forget to every socket in the room, spectators included.
    fn broadcast_event(&mut self, event: ServerEvent) {
        self.subscribers.retain(|connection_id, sender| {
            match sender.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::warn!("subscriber {connection_id} full, dropping event");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    /// Per-viewer `game_update`: every seat sees its own cards only.
    fn broadcast_game_update(&mut self) {
        let Some(hand) = &self.hand else { return };
        let updates: Vec<(Uuid, ServerEvent)> = self
            .subscribers
            .keys()
            .map(|&connection_id| {
                let viewer = hand.seat_of_connection(connection_id);
                (
                    connection_id,
                    ServerEvent::GameUpdate {
                        table_id: self.id,
                        view: hand.redacted_for(viewer),
                    },
                )
            })
            .collect();
        for (connection_id, event) in updates {
            self.send_event(connection_id, event);
        }
    }

    fn broadcast_turn_start(&mut self) {
        let Some(hand) = &self.hand else { return };
        if hand.is_over() {
            return;
        }
        let event = ServerEvent::TurnStart {
            table_id: self.id,
            seat: hand.turn,
            username: hand.seats[hand.turn].username.clone(),
        };
        self.broadcast_event(event);
    }

    fn notify_roster(&self) {
        if let Some(tx) = &self.roster_tx {
            let _ = tx.send(self.id);
        }
    }

    fn trigger_matchmaker(&self) {
        if let Some(tx) = &self.match_tx {
            let _ = tx.try_send(MatchTrigger::Disconnect(self.config.stake));
        }
    }

    // -----------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------

    fn hand_in_progress(&self) -> bool {
        self.hand.as_ref().is_some_and(|h| !h.is_over())
    }

    fn account_for(&self, seat: &Seat) -> SeatAccount {
        if seat.is_human {
            let user_id = self
                .user_ids
                .get(&seat.username)
                .copied()
                .unwrap_or(HOUSE_USER_ID);
            SeatAccount::new(user_id, seat.username.clone())
        } else {
            SeatAccount::house(seat.username.clone())
        }
    }

    fn roster_accounts(&self) -> Vec<SeatAccount> {
        self.seats.iter().map(|s| self.account_for(s)).collect()
    }

    fn roster(&self) -> TableRoster {
        let humans = self.seats.iter().filter(|s| s.is_human).count();
        let waiting = self
            .spectators
            .iter()
            .filter(|s| s.will_join_next_hand)
            .count();
        TableRoster {
            table_id: self.id,
            stake: self.config.stake,
            seat_count: self.seats.len(),
            human_seats: humans,
            bot_seats: self.seats.len() - humans,
            hand_in_progress: self.hand_in_progress() || self.phase == TablePhase::Countdown,
            pending_transitions: self.transitions.len() + waiting,
            dynamic: self.config.dynamic,
        }
    }

    fn summary(&self) -> TableSummary {
        TableSummary {
            table_id: self.id,
            stake: self.config.stake,
            seats: self.seats.iter().map(|s| s.username.clone()).collect(),
            spectator_count: self.spectators.len(),
            phase: self.phase.to_string(),
            dynamic: self.config.dynamic,
        }
    }

    async fn persist_hand(&self) {
        let Some(hand) = &self.hand else { return };
        match serde_json::to_value(hand) {
            Ok(snapshot) => {
                if let Err(e) = self.tables.save_hand(self.id, &snapshot).await {
                    log::error!("table {}: hand snapshot failed: {e}", self.id);
                }
            }
            Err(e) => log::error!("table {}: hand serialise failed: {e}", self.id),
        }
    }
}
