//! Table manager: spawns table actors, routes messages to them, and keeps
//! the lobby's view of the table pools fresh.

use super::{
    actor::{TableActor, TableHandle},
    config::{TableConfig, STAKE_LADDER, TABLES_PER_STAKE},
    messages::{TableMessage, TableResponse},
};
use crate::{
    db::{GameRepository, TableRepository, TableRow},
    ledger::{LedgerManager, TableId},
    matchmaker::{MatchTrigger, SeatOutcome, Seating, TableRoster},
    net::{ServerEvent, TableSummary},
    queue::QueuedPlayer,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex, RwLock};

/// Capacity of the lobby broadcast ring.
const LOBBY_CHANNEL_CAPACITY: usize = 64;

type ConfigFactory = Box<dyn Fn(i64, bool) -> TableConfig + Send + Sync>;

pub struct TableManager {
    ledger: LedgerManager,
    games: Arc<dyn GameRepository>,
    tables_repo: Arc<dyn TableRepository>,

    handles: RwLock<HashMap<TableId, TableHandle>>,
    /// Table ids per stake, preset tables first.
    by_stake: RwLock<HashMap<i64, Vec<TableId>>>,
    next_id: Mutex<TableId>,

    /// Fan-out for `tables_update` to every lobby listener.
    lobby_tx: broadcast::Sender<ServerEvent>,
    /// Actors report roster changes here; the aggregator turns them into
    /// lobby broadcasts.
    roster_tx: mpsc::UnboundedSender<TableId>,
    roster_rx: Mutex<Option<mpsc::UnboundedReceiver<TableId>>>,

    match_tx: RwLock<Option<mpsc::Sender<MatchTrigger>>>,
    config_factory: ConfigFactory,
}

impl TableManager {
    pub fn new(
        ledger: LedgerManager,
        games: Arc<dyn GameRepository>,
        tables_repo: Arc<dyn TableRepository>,
    ) -> Self {
        Self::with_config_factory(
            ledger,
            games,
            tables_repo,
            Box::new(|stake, dynamic| {
                if dynamic {
                    TableConfig::overflow(stake)
                } else {
                    TableConfig::for_stake(stake)
                }
            }),
        )
    }

    /// Tests shrink timers through a custom factory.
    pub fn with_config_factory(
        ledger: LedgerManager,
        games: Arc<dyn GameRepository>,
        tables_repo: Arc<dyn TableRepository>,
        config_factory: ConfigFactory,
    ) -> Self {
        let (lobby_tx, _) = broadcast::channel(LOBBY_CHANNEL_CAPACITY);
        let (roster_tx, roster_rx) = mpsc::unbounded_channel();
        Self {
            ledger,
            games,
            tables_repo,
            handles: RwLock::new(HashMap::new()),
            by_stake: RwLock::new(HashMap::new()),
            next_id: Mutex::new(1),
            lobby_tx,
            roster_tx,
            roster_rx: Mutex::new(Some(roster_rx)),
            match_tx: RwLock::new(None),
            config_factory,
        }
    }

    /// Wire the matchmaker trigger into every table spawned from here on.
    pub async fn set_match_trigger(&self, tx: mpsc::Sender<MatchTrigger>) {
        *self.match_tx.write().await = Some(tx);
    }

    /// Listen for lobby-wide `tables_update` broadcasts.
    pub fn lobby_subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.lobby_tx.subscribe()
    }

    /// Start the roster aggregator. Call once after construction.
    pub fn start(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let rx = manager.roster_rx.lock().await.take();
            let Some(mut rx) = rx else { return };
            while rx.recv().await.is_some() {
                // Coalesce bursts of roster churn into one update.
                while rx.try_recv().is_ok() {}
                let tables = manager.summaries().await;
                let _ = manager
                    .lobby_tx
                    .send(ServerEvent::TablesUpdate { tables });
            }
        });
    }

    /// Create the preset pools: two tables per rung of the stake ladder.
    pub async fn create_preset_tables(&self) -> Vec<TableId> {
        let mut created = Vec::new();
        for &stake in &STAKE_LADDER {
            for _ in 0..TABLES_PER_STAKE {
                match self.create_table(stake, false).await {
                    Ok(id) => created.push(id),
                    Err(e) => log::error!("preset table at stake {stake} failed: {e}"),
                }
            }
        }
        log::info!("created {} preset table(s)", created.len());
        created
    }

    pub async fn create_table(&self, stake: i64, dynamic: bool) -> Result<TableId, String> {
        let config = (self.config_factory)(stake, dynamic);
        config.validate()?;

        let table_id = {
            let mut next = self.next_id.lock().await;
            let id = *next;
            *next += 1;
            id
        };

        self.tables_repo
            .upsert_table(&TableRow {
                table_id,
                stake,
                status: "waiting".to_string(),
                dynamic,
                version: 0,
            })
            .await
            .map_err(|e| format!("table row save failed: {e}"))?;

        let (mut actor, handle) = TableActor::new(
            table_id,
            config,
            self.ledger.clone(),
            self.games.clone(),
            self.tables_repo.clone(),
        );
        actor.set_roster_notifier(self.roster_tx.clone());
        if let Some(tx) = self.match_tx.read().await.clone() {
            actor.set_match_trigger(tx);
        }

        self.handles.write().await.insert(table_id, handle);
        self.by_stake
            .write()
            .await
            .entry(stake)
            .or_default()
            .push(table_id);

        tokio::spawn(actor.run());
        log::info!(
            "spawned {} table {table_id} at stake {stake}",
            if dynamic { "dynamic" } else { "preset" }
        );
        Ok(table_id)
    }

    pub async fn get(&self, table_id: TableId) -> Option<TableHandle> {
        self.handles.read().await.get(&table_id).cloned()
    }

    /// Summaries of every live table, pruning any that have closed.
    pub async fn summaries(&self) -> Vec<TableSummary> {
        let handles: Vec<(TableId, TableHandle)> = {
            let map = self.handles.read().await;
            map.iter().map(|(id, h)| (*id, h.clone())).collect()
        };

        let mut summaries = Vec::with_capacity(handles.len());
        let mut dead = Vec::new();
        for (table_id, handle) in handles {
            let (tx, rx) = oneshot::channel();
            if handle.send(TableMessage::GetSummary { reply: tx }).await.is_err() {
                dead.push(table_id);
                continue;
            }
            match rx.await {
                Ok(summary) => summaries.push(summary),
                Err(_) => dead.push(table_id),
            }
        }

        if !dead.is_empty() {
            let mut map = self.handles.write().await;
            let mut stakes = self.by_stake.write().await;
            for table_id in dead {
                map.remove(&table_id);
                for ids in stakes.values_mut() {
                    ids.retain(|&id| id != table_id);
                }
            }
        }

        summaries.sort_by_key(|s| s.table_id);
        summaries
    }
}

#[async_trait]
impl Seating for TableManager {
    async fn rosters(&self, stake: i64) -> Vec<TableRoster> {
        let ids = self
            .by_stake
            .read()
            .await
            .get(&stake)
            .cloned()
            .unwrap_or_default();

        let mut rosters = Vec::with_capacity(ids.len());
        for table_id in ids {
            let Some(handle) = self.get(table_id).await else {
                continue;
            };
            let (tx, rx) = oneshot::channel();
            if handle.send(TableMessage::GetRoster { reply: tx }).await.is_ok() {
                if let Ok(roster) = rx.await {
                    rosters.push(roster);
                }
            }
        }
        rosters
    }

    async fn seat_player(
        &self,
        table_id: TableId,
        player: QueuedPlayer,
    ) -> Result<SeatOutcome, String> {
        let handle = self
            .get(table_id)
            .await
            .ok_or_else(|| format!("table {table_id} not found"))?;
        let (tx, rx) = oneshot::channel();
        handle
            .send(TableMessage::SeatFromQueue { player, reply: tx })
            .await?;
        rx.await.map_err(|_| "table closed".to_string())?
    }

    async fn add_bot_and_start(&self, table_id: TableId) -> Result<(), String> {
        let handle = self
            .get(table_id)
            .await
            .ok_or_else(|| format!("table {table_id} not found"))?;
        let (tx, rx) = oneshot::channel();
        handle
            .send(TableMessage::AddBotAndStart { reply: tx })
            .await?;
        match rx.await {
            Ok(TableResponse::Success) => Ok(()),
            Ok(other) => Err(other.error_message().unwrap_or_default()),
            Err(_) => Err("table closed".to_string()),
        }
    }

    async fn evict_bots(&self, table_id: TableId) -> Result<usize, String> {
        let handle = self
            .get(table_id)
            .await
            .ok_or_else(|| format!("table {table_id} not found"))?;
        let (tx, rx) = oneshot::channel();
        handle.send(TableMessage::EvictBots { reply: tx }).await?;
        rx.await.map_err(|_| "table closed".to_string())
    }

    async fn resolve_transitions(&self, table_id: TableId) -> Result<(), String> {
        let handle = self
            .get(table_id)
            .await
            .ok_or_else(|| format!("table {table_id} not found"))?;
        let (tx, rx) = oneshot::channel();
        handle
            .send(TableMessage::ResolveTransitions { reply: tx })
            .await?;
        let _ = rx.await;
        Ok(())
    }

    async fn create_overflow_table(&self, stake: i64) -> Result<TableId, String> {
        self.create_table(stake, true).await
    }
}
