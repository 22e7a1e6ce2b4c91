use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use ai_benchmark::{BenchmarkSnapshot, ShadowPortfolio};
use player_engine::{Holding, PlayerPortfolio, PortfolioSnapshot, ScoreBreakdown, TradeRecord};
use session_core::{CoordinatorError, GameConfig, GameMode, RoomStatus};

/// A classroom session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub room_code: String,
    pub room_name: Option<String>,
    pub created_by: String,
    pub config: GameConfig,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: RoomStatus,
    pub game_mode: GameMode,
    pub current_day: i64,
    pub day_started_at: Option<DateTime<Utc>>,
    pub day_time_limit: Option<i64>,
    pub ai_benchmark: BenchmarkSnapshot,
    pub created_at: DateTime<Utc>,
    pub game_started_at: Option<DateTime<Utc>>,
    pub game_ended_at: Option<DateTime<Utc>>,
}

impl Room {
    pub fn num_days(&self) -> i64 {
        self.config.num_days as i64
    }

    /// When the current day's timer runs out, if one is set.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        match (self.day_started_at, self.day_time_limit) {
            (Some(started), Some(limit)) => Some(started + chrono::Duration::seconds(limit)),
            _ => None,
        }
    }
}

/// A participant in exactly one room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub room_id: String,
    pub player_name: String,
    pub player_email: Option<String>,
    pub current_day: i64,
    pub cash: f64,
    pub holdings: BTreeMap<String, Holding>,
    pub trades: Vec<TradeRecord>,
    pub portfolio_history: Vec<PortfolioSnapshot>,
    pub portfolio_value: f64,
    pub score: f64,
    pub grade: String,
    pub score_breakdown: ScoreBreakdown,
    pub is_ready: bool,
    pub last_sync_day: i64,
    pub is_finished: bool,
    pub ai_shadow: ShadowPortfolio,
    pub joined_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub game_ended_at: Option<DateTime<Utc>>,
}

impl Player {
    pub fn new(room: &Room, player_name: String, player_email: Option<String>) -> Self {
        let now = Utc::now();
        let initial_cash = room.config.initial_cash;
        let portfolio = PlayerPortfolio::new(initial_cash, room.config.difficulty);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            room_id: room.id.clone(),
            player_name,
            player_email,
            current_day: room.current_day,
            cash: initial_cash,
            holdings: BTreeMap::new(),
            trades: Vec::new(),
            portfolio_history: Vec::new(),
            portfolio_value: initial_cash,
            score: portfolio.score,
            grade: portfolio.grade.clone(),
            score_breakdown: portfolio.breakdown,
            is_ready: false,
            last_sync_day: room.current_day,
            is_finished: false,
            ai_shadow: ShadowPortfolio::new(initial_cash),
            joined_at: now,
            updated_at: now,
            game_ended_at: None,
        }
    }

    /// Build the engine-side state for a server-driven day advance.
    pub fn portfolio(&self, initial_cash: f64) -> PlayerPortfolio {
        PlayerPortfolio {
            current_day: self.current_day.max(0) as usize,
            initial_cash,
            cash: self.cash,
            holdings: self.holdings.clone(),
            trades: self.trades.clone(),
            pending: Vec::new(),
            history: self.portfolio_history.clone(),
            portfolio_value: self.portfolio_value,
            total_return_pct: if initial_cash > 0.0 {
                100.0 * (self.portfolio_value - initial_cash) / initial_cash
            } else {
                0.0
            },
            score: self.score,
            grade: self.grade.clone(),
            breakdown: self.score_breakdown.clone(),
            is_finished: self.is_finished,
            game_ended_at: self.game_ended_at,
        }
    }

    /// Copy engine results back onto the persisted record.
    pub fn apply_portfolio(&mut self, portfolio: &PlayerPortfolio) {
        self.current_day = portfolio.current_day as i64;
        self.cash = portfolio.cash;
        self.holdings = portfolio.holdings.clone();
        self.trades = portfolio.trades.clone();
        self.portfolio_history = portfolio.history.clone();
        self.portfolio_value = portfolio.portfolio_value;
        self.score = portfolio.score;
        self.grade = portfolio.grade.clone();
        self.score_breakdown = portfolio.breakdown.clone();
        self.is_finished = portfolio.is_finished;
        if let Some(ended) = portfolio.game_ended_at {
            self.game_ended_at = Some(ended);
        }
        self.updated_at = Utc::now();
    }

    pub fn total_return_pct(&self, initial_cash: f64) -> f64 {
        if initial_cash > 0.0 {
            100.0 * (self.portfolio_value - initial_cash) / initial_cash
        } else {
            0.0
        }
    }
}

/// Listing row for the teacher dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room_code: String,
    pub room_name: Option<String>,
    pub created_by: String,
    pub status: RoomStatus,
    pub game_mode: GameMode,
    pub current_day: i64,
    pub num_days: i64,
    pub player_count: i64,
    pub created_at: DateTime<Utc>,
}

// --- row mapping -----------------------------------------------------------

#[derive(sqlx::FromRow)]
pub(crate) struct RoomRow {
    pub id: String,
    pub room_code: String,
    pub room_name: Option<String>,
    pub created_by: String,
    pub config_json: String,
    pub start_date: String,
    pub end_date: String,
    pub status: String,
    pub game_mode: String,
    pub current_day: i64,
    pub day_started_at: Option<String>,
    pub day_time_limit: Option<i64>,
    pub ai_benchmark_json: String,
    pub created_at: String,
    pub game_started_at: Option<String>,
    pub game_ended_at: Option<String>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct PlayerRow {
    pub id: String,
    pub room_id: String,
    pub player_name: String,
    pub player_email: Option<String>,
    pub current_day: i64,
    pub cash: f64,
    pub holdings_json: String,
    pub trades_json: String,
    pub history_json: String,
    pub portfolio_value: f64,
    pub score: f64,
    pub grade: String,
    pub breakdown_json: String,
    pub is_ready: bool,
    pub last_sync_day: i64,
    pub is_finished: bool,
    pub ai_shadow_json: String,
    pub joined_at: String,
    pub updated_at: String,
    pub game_ended_at: Option<String>,
}

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate, CoordinatorError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| CoordinatorError::Internal(format!("corrupt date {}: {}", s, e)))
}

pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>, CoordinatorError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CoordinatorError::Internal(format!("corrupt timestamp {}: {}", s, e)))
}

pub(crate) fn parse_ts_opt(s: &Option<String>) -> Result<Option<DateTime<Utc>>, CoordinatorError> {
    s.as_deref().map(parse_ts).transpose()
}

pub(crate) fn fmt_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

pub(crate) fn fmt_ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339()
}

pub(crate) fn fmt_ts_opt(t: Option<DateTime<Utc>>) -> Option<String> {
    t.map(fmt_ts)
}

impl TryFrom<RoomRow> for Room {
    type Error = CoordinatorError;

    fn try_from(row: RoomRow) -> Result<Self, Self::Error> {
        Ok(Room {
            config: serde_json::from_str(&row.config_json)?,
            start_date: parse_date(&row.start_date)?,
            end_date: parse_date(&row.end_date)?,
            status: row.status.parse()?,
            game_mode: row.game_mode.parse()?,
            day_started_at: parse_ts_opt(&row.day_started_at)?,
            ai_benchmark: serde_json::from_str(&row.ai_benchmark_json)?,
            created_at: parse_ts(&row.created_at)?,
            game_started_at: parse_ts_opt(&row.game_started_at)?,
            game_ended_at: parse_ts_opt(&row.game_ended_at)?,
            id: row.id,
            room_code: row.room_code,
            room_name: row.room_name,
            created_by: row.created_by,
            current_day: row.current_day,
            day_time_limit: row.day_time_limit,
        })
    }
}

impl TryFrom<PlayerRow> for Player {
    type Error = CoordinatorError;

    fn try_from(row: PlayerRow) -> Result<Self, Self::Error> {
        Ok(Player {
            holdings: serde_json::from_str(&row.holdings_json)?,
            trades: serde_json::from_str(&row.trades_json)?,
            portfolio_history: serde_json::from_str(&row.history_json)?,
            score_breakdown: serde_json::from_str(&row.breakdown_json)?,
            ai_shadow: serde_json::from_str(&row.ai_shadow_json)?,
            joined_at: parse_ts(&row.joined_at)?,
            updated_at: parse_ts(&row.updated_at)?,
            game_ended_at: parse_ts_opt(&row.game_ended_at)?,
            id: row.id,
            room_id: row.room_id,
            player_name: row.player_name,
            player_email: row.player_email,
            current_day: row.current_day,
            cash: row.cash,
            portfolio_value: row.portfolio_value,
            score: row.score,
            grade: row.grade,
            is_ready: row.is_ready,
            last_sync_day: row.last_sync_day,
            is_finished: row.is_finished,
        })
    }
}
