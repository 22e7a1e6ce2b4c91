use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use market_data::MarketStore;
use player_engine::TradingEngine;
use session_core::{CoordinatorError, GameMode, MarketDay, RoomStatus};

use crate::db::CoordinatorDb;
use crate::models::Room;
use crate::registry::{
    self, fetch_players_for_room, fetch_room_by_id, update_player, update_room, RoomRegistry,
};

/// Who asked for a day advance.
#[derive(Debug, Clone, Copy)]
pub enum Initiator<'a> {
    Teacher(&'a str),
    /// The auto-timer driver; bypasses the creator check but re-validates the
    /// deadline under the room lock.
    System,
}

/// Serializes every mutation of a room behind a per-room lock and a
/// transaction, so readers only ever observe committed pre- or post-states.
pub struct SessionManager {
    db: CoordinatorDb,
    market: Arc<MarketStore>,
    engine: TradingEngine,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionManager {
    pub fn new(db: CoordinatorDb, market: Arc<MarketStore>) -> Self {
        Self {
            db,
            market,
            engine: TradingEngine::new(),
            locks: DashMap::new(),
        }
    }

    pub(crate) fn db(&self) -> &CoordinatorDb {
        &self.db
    }

    pub(crate) fn market(&self) -> &MarketStore {
        &self.market
    }

    /// The lock is keyed by room id: codes are recycled once a room
    /// finishes, ids never are.
    pub(crate) fn lock_for(&self, room_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub(crate) async fn require_room(&self, room_code: &str) -> Result<Room, CoordinatorError> {
        let code = room_code.trim().to_uppercase();
        registry::fetch_room_by_code(self.db.pool(), &code)
            .await?
            .ok_or(CoordinatorError::RoomNotFound(code))
    }

    pub(crate) async fn session_days(
        &self,
        room: &Room,
    ) -> Result<Vec<MarketDay>, CoordinatorError> {
        self.market
            .get_session_window(&room.config.tickers, room.start_date, room.end_date, 1)
            .await
    }

    /// Move a waiting room into play.
    pub async fn start(&self, room_code: &str, caller: &str) -> Result<Room, CoordinatorError> {
        let room = self.require_room(room_code).await?;
        RoomRegistry::verify_teacher(&room, caller)?;

        let lock = self.lock_for(&room.id);
        let _guard = lock.lock().await;

        let mut tx = self.db.pool().begin().await?;
        let mut room = fetch_room_by_id(&mut *tx, &room.id)
            .await?
            .ok_or(CoordinatorError::RoomNotFound(room.room_code))?;
        if room.status != RoomStatus::Waiting {
            return Err(CoordinatorError::InvalidTransition(format!(
                "cannot start a {} room",
                room.status
            )));
        }

        let now = Utc::now();
        room.status = RoomStatus::InProgress;
        room.current_day = 0;
        room.game_started_at = Some(now);
        if room.day_time_limit.is_some() {
            room.day_started_at = Some(now);
        }
        update_room(&mut *tx, &room).await?;
        tx.commit().await?;

        tracing::info!(room = %room.room_code, mode = %room.game_mode, "game started");
        Ok(room)
    }

    /// Advance a sync-mode room by one day, fanning out to every player.
    ///
    /// Two racing requests produce exactly one advance: the loser re-reads
    /// the room under the lock, sees the day already moved, and returns the
    /// fresh state without stepping anything twice.
    pub async fn advance_day(
        &self,
        room_code: &str,
        initiator: Initiator<'_>,
        day_time_limit: Option<i64>,
    ) -> Result<Room, CoordinatorError> {
        let observed = self.require_room(room_code).await?;
        if let Initiator::Teacher(caller) = initiator {
            RoomRegistry::verify_teacher(&observed, caller)?;
        }
        match observed.status {
            RoomStatus::Finished => return Ok(observed),
            RoomStatus::Waiting => {
                return Err(CoordinatorError::InvalidTransition(
                    "cannot advance a room that has not started".into(),
                ));
            }
            RoomStatus::InProgress => {}
        }
        if observed.game_mode == GameMode::Async {
            return Err(CoordinatorError::InvalidTransition(
                "async rooms advance per player, not per room".into(),
            ));
        }

        let lock = self.lock_for(&observed.id);
        let _guard = lock.lock().await;

        // read market data before opening the transaction so the pool stays free
        let days = self.session_days(&observed).await?;

        let mut tx = self.db.pool().begin().await?;
        let mut room = fetch_room_by_id(&mut *tx, &observed.id)
            .await?
            .ok_or(CoordinatorError::RoomNotFound(observed.room_code.clone()))?;

        if room.status == RoomStatus::Finished {
            return Ok(room);
        }
        if room.current_day != observed.current_day {
            // a concurrent advance won the race
            return Ok(room);
        }
        if matches!(initiator, Initiator::System) {
            let due = room
                .deadline()
                .map(|deadline| deadline <= Utc::now())
                .unwrap_or(false);
            if !due {
                // the timer was re-anchored after the driver's scan
                return Ok(room);
            }
        }

        let finishing = room.current_day + 1 >= room.num_days();
        let new_day = if finishing {
            room.num_days()
        } else {
            room.current_day + 1
        };
        let now = Utc::now();

        let players = fetch_players_for_room(&mut *tx, &room.id).await?;
        let mut benchmark = room.ai_benchmark.clone();
        for mut player in players {
            let mut shadow = player.ai_shadow.clone();
            shadow.advance_to(&days, new_day as usize);

            // only players tracking the room's day completed the previous one
            if player.current_day == room.current_day {
                let mut portfolio = player.portfolio(room.config.initial_cash);
                self.engine
                    .advance_day(&mut portfolio, &days, &room.config, shadow.return_pct)?;
                player.apply_portfolio(&portfolio);
            }

            player.is_ready = false;
            player.last_sync_day = new_day;
            player.ai_shadow = shadow.clone();
            player.updated_at = now;
            benchmark = shadow.snapshot();
            update_player(&mut *tx, &player).await?;
        }
        room.ai_benchmark = benchmark;

        if finishing {
            room.status = RoomStatus::Finished;
            room.current_day = room.num_days();
            room.game_ended_at = Some(now);
            room.day_started_at = None;
        } else {
            room.current_day = new_day;
            room.day_started_at = Some(now);
            if let Some(limit) = day_time_limit {
                if limit <= 0 {
                    return Err(CoordinatorError::InvalidRequest(
                        "day_time_limit must be positive".into(),
                    ));
                }
                room.day_time_limit = Some(limit);
            }
        }
        update_room(&mut *tx, &room).await?;
        tx.commit().await?;

        tracing::info!(
            room = %room.room_code,
            day = room.current_day,
            finished = finishing,
            "day advanced"
        );
        Ok(room)
    }

    /// Terminal and idempotent: replaying on a finished room changes nothing.
    pub async fn end_game(&self, room_code: &str, caller: &str) -> Result<Room, CoordinatorError> {
        let room = self.require_room(room_code).await?;
        RoomRegistry::verify_teacher(&room, caller)?;

        let lock = self.lock_for(&room.id);
        let _guard = lock.lock().await;

        let mut tx = self.db.pool().begin().await?;
        let mut room = fetch_room_by_id(&mut *tx, &room.id)
            .await?
            .ok_or(CoordinatorError::RoomNotFound(room.room_code))?;
        if room.status == RoomStatus::Finished {
            return Ok(room);
        }

        room.status = RoomStatus::Finished;
        room.game_ended_at = Some(Utc::now());
        room.day_started_at = None;
        update_room(&mut *tx, &room).await?;
        tx.commit().await?;

        tracing::info!(room = %room.room_code, "game ended");
        Ok(room)
    }

    /// Update the per-day limit and restart the clock on the current day.
    /// The wire contract carries no identity for this command, so the caller
    /// is only checked when one is supplied.
    pub async fn set_timer(
        &self,
        room_code: &str,
        caller: Option<&str>,
        duration_seconds: i64,
    ) -> Result<Room, CoordinatorError> {
        if duration_seconds <= 0 {
            return Err(CoordinatorError::InvalidRequest(
                "duration_seconds must be positive".into(),
            ));
        }

        let room = self.require_room(room_code).await?;
        if let Some(caller) = caller {
            RoomRegistry::verify_teacher(&room, caller)?;
        }

        let lock = self.lock_for(&room.id);
        let _guard = lock.lock().await;

        let mut tx = self.db.pool().begin().await?;
        let mut room = fetch_room_by_id(&mut *tx, &room.id)
            .await?
            .ok_or(CoordinatorError::RoomNotFound(room.room_code))?;
        if room.status == RoomStatus::Finished {
            return Err(CoordinatorError::InvalidTransition(
                "cannot set a timer on a finished room".into(),
            ));
        }

        room.day_time_limit = Some(duration_seconds);
        room.day_started_at = Some(Utc::now());
        update_room(&mut *tx, &room).await?;
        tx.commit().await?;

        tracing::info!(room = %room.room_code, seconds = duration_seconds, "timer set");
        Ok(room)
    }

    /// Codes of running sync_auto rooms whose persisted deadline has passed.
    /// Deadlines are always recomputed from `day_started_at`; nothing here
    /// depends on in-process timers, so a restart resumes cleanly.
    pub async fn expired_auto_rooms(&self) -> Result<Vec<String>, CoordinatorError> {
        let rows = sqlx::query_as::<_, crate::models::RoomRow>(
            "SELECT * FROM rooms WHERE game_mode = 'sync_auto' AND status = 'in_progress'",
        )
        .fetch_all(self.db.pool())
        .await?;

        let now = Utc::now();
        let mut due = Vec::new();
        for row in rows {
            let room = Room::try_from(row)?;
            if room
                .deadline()
                .map(|deadline| deadline <= now)
                .unwrap_or(false)
            {
                due.push(room.room_code);
            }
        }
        Ok(due)
    }
}
