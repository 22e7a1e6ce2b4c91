use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use player_engine::{Holding, PortfolioSnapshot, ScoreBreakdown, TradeRecord};
use session_core::{CoordinatorError, GameMode, RoomStatus};

use crate::models::Player;
use crate::registry::{fetch_player, fetch_players_for_room, fetch_room_by_id, update_player};
use crate::session::SessionManager;

/// The snapshot students poll at ~1 Hz.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomState {
    pub room_code: String,
    pub status: RoomStatus,
    pub game_mode: GameMode,
    pub current_day: i64,
    pub day_started_at: Option<DateTime<Utc>>,
    pub day_time_limit: Option<i64>,
    pub time_remaining: Option<i64>,
    pub waiting_for_teacher: bool,
    pub ready_count: i64,
    pub total_players: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: i64,
    pub player_id: String,
    pub player_name: String,
    pub score: f64,
    pub grade: String,
    pub portfolio_value: f64,
    pub total_return_pct: f64,
    pub current_day: i64,
    pub is_finished: bool,
}

/// Full post-day state pushed by a client; last writer wins on the player
/// record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePlayerState {
    pub current_day: i64,
    pub cash: f64,
    pub holdings: BTreeMap<String, Holding>,
    pub trades: Vec<TradeRecord>,
    pub portfolio_history: Vec<PortfolioSnapshot>,
    pub portfolio_value: f64,
    pub score: f64,
    pub grade: String,
    #[serde(default)]
    pub score_breakdown: Option<ScoreBreakdown>,
    #[serde(default)]
    pub is_finished: bool,
}

impl SessionManager {
    /// Point-in-time view of a room for polling clients.
    pub async fn room_state(&self, room_code: &str) -> Result<RoomState, CoordinatorError> {
        let room = self.require_room(room_code).await?;
        let players = fetch_players_for_room(self.db().pool(), &room.id).await?;

        let ready_count = players.iter().filter(|p| p.is_ready).count() as i64;
        let time_remaining = room.deadline().map(|deadline| {
            (deadline - Utc::now()).num_seconds().max(0)
        });

        Ok(RoomState {
            waiting_for_teacher: room.game_mode.is_sync()
                && room.status == RoomStatus::InProgress,
            room_code: room.room_code,
            status: room.status,
            game_mode: room.game_mode,
            current_day: room.current_day,
            day_started_at: room.day_started_at,
            day_time_limit: room.day_time_limit,
            time_remaining,
            ready_count,
            total_players: players.len() as i64,
        })
    }

    /// Ranked standings: score, then portfolio value, then join order. All
    /// three tie-breakers are needed to keep the UI from flickering when
    /// scores collide.
    pub async fn leaderboard(
        &self,
        room_code: &str,
    ) -> Result<Vec<LeaderboardEntry>, CoordinatorError> {
        let room = self.require_room(room_code).await?;
        let mut players = fetch_players_for_room(self.db().pool(), &room.id).await?;

        players.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(b.portfolio_value.total_cmp(&a.portfolio_value))
                .then(a.joined_at.cmp(&b.joined_at))
        });

        let initial_cash = room.config.initial_cash;
        Ok(players
            .into_iter()
            .enumerate()
            .map(|(i, p)| LeaderboardEntry {
                rank: i as i64 + 1,
                total_return_pct: p.total_return_pct(initial_cash),
                player_id: p.id,
                player_name: p.player_name,
                score: p.score,
                grade: p.grade,
                portfolio_value: p.portfolio_value,
                current_day: p.current_day,
                is_finished: p.is_finished,
            })
            .collect())
    }

    /// Flag a player ready for the current day. Idempotent; every advance
    /// clears it again.
    pub async fn mark_ready(&self, player_id: &str) -> Result<Player, CoordinatorError> {
        let player = fetch_player(self.db().pool(), player_id)
            .await?
            .ok_or_else(|| {
                CoordinatorError::InvalidRequest(format!("unknown player: {}", player_id))
            })?;
        let room = fetch_room_by_id(self.db().pool(), &player.room_id)
            .await?
            .ok_or_else(|| CoordinatorError::Internal("player without a room".into()))?;
        if room.status == RoomStatus::Finished {
            return Err(CoordinatorError::RoomFinished(room.room_code));
        }

        let lock = self.lock_for(&room.id);
        let _guard = lock.lock().await;

        let mut player = fetch_player(self.db().pool(), player_id)
            .await?
            .ok_or_else(|| {
                CoordinatorError::InvalidRequest(format!("unknown player: {}", player_id))
            })?;
        if !player.is_ready {
            player.is_ready = true;
            player.updated_at = Utc::now();
            update_player(self.db().pool(), &player).await?;
        }
        Ok(player)
    }

    /// Last-writer-wins sync from a client. In sync modes the room's day is
    /// authoritative, so a day index running ahead of the room is clamped
    /// back; the room's own day never moves here, in either direction.
    pub async fn update_player_state(
        &self,
        player_id: &str,
        update: UpdatePlayerState,
    ) -> Result<Player, CoordinatorError> {
        if update.current_day < 0 {
            return Err(CoordinatorError::InvalidRequest(
                "current_day must be non-negative".into(),
            ));
        }
        if update.cash < 0.0 {
            return Err(CoordinatorError::InvalidRequest(
                "cash must be non-negative".into(),
            ));
        }
        if update.holdings.values().any(|h| h.shares < 1) {
            return Err(CoordinatorError::InvalidRequest(
                "holdings must carry at least one share".into(),
            ));
        }

        let player = fetch_player(self.db().pool(), player_id)
            .await?
            .ok_or_else(|| {
                CoordinatorError::InvalidRequest(format!("unknown player: {}", player_id))
            })?;
        let room = fetch_room_by_id(self.db().pool(), &player.room_id)
            .await?
            .ok_or_else(|| CoordinatorError::Internal("player without a room".into()))?;
        if update.current_day > room.num_days() {
            return Err(CoordinatorError::InvalidRequest(format!(
                "current_day {} exceeds the {}-day session",
                update.current_day,
                room.num_days()
            )));
        }

        let lock = self.lock_for(&room.id);
        let _guard = lock.lock().await;

        let mut player = fetch_player(self.db().pool(), player_id)
            .await?
            .ok_or_else(|| {
                CoordinatorError::InvalidRequest(format!("unknown player: {}", player_id))
            })?;
        let room = fetch_room_by_id(self.db().pool(), &player.room_id)
            .await?
            .ok_or_else(|| CoordinatorError::Internal("player without a room".into()))?;

        let target_day = if room.game_mode.is_sync() {
            update.current_day.min(room.current_day)
        } else {
            update.current_day
        };

        // self-paced players drag their server-side shadow along
        let mut shadow = player.ai_shadow.clone();
        if (target_day as usize) > shadow.day {
            let days = self.session_days(&room).await?;
            shadow.advance_to(&days, target_day as usize);
        }

        player.current_day = target_day;
        player.cash = update.cash;
        player.holdings = update.holdings;
        player.trades = update.trades;
        player.portfolio_history = update.portfolio_history;
        player.portfolio_value = update.portfolio_value;
        player.score = update.score;
        player.grade = update.grade;
        if let Some(breakdown) = update.score_breakdown {
            player.score_breakdown = breakdown;
        }
        player.is_finished = update.is_finished;
        if update.is_finished && player.game_ended_at.is_none() {
            player.game_ended_at = Some(Utc::now());
        }
        player.last_sync_day = target_day;
        player.ai_shadow = shadow;
        player.updated_at = Utc::now();

        update_player(self.db().pool(), &player).await?;
        tracing::debug!(player = %player.player_name, day = target_day, "player state synced");
        Ok(player)
    }
}
