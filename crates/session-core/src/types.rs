use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::CoordinatorError;

/// How a room's day advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Self-paced: each student advances their own day.
    Async,
    /// The teacher advances the whole room.
    Sync,
    /// A per-day timer advances the room.
    SyncAuto,
}

impl GameMode {
    /// Sync modes share a room-level day index.
    pub fn is_sync(&self) -> bool {
        matches!(self, GameMode::Sync | GameMode::SyncAuto)
    }
}

impl std::fmt::Display for GameMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameMode::Async => write!(f, "async"),
            GameMode::Sync => write!(f, "sync"),
            GameMode::SyncAuto => write!(f, "sync_auto"),
        }
    }
}

impl std::str::FromStr for GameMode {
    type Err = CoordinatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "async" => Ok(GameMode::Async),
            "sync" => Ok(GameMode::Sync),
            "sync_auto" => Ok(GameMode::SyncAuto),
            _ => Err(CoordinatorError::InvalidRequest(format!(
                "unknown game mode: {}",
                s
            ))),
        }
    }
}

/// Room lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Waiting,
    InProgress,
    Finished,
}

impl std::fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomStatus::Waiting => write!(f, "waiting"),
            RoomStatus::InProgress => write!(f, "in_progress"),
            RoomStatus::Finished => write!(f, "finished"),
        }
    }
}

impl std::str::FromStr for RoomStatus {
    type Err = CoordinatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "waiting" => Ok(RoomStatus::Waiting),
            "in_progress" => Ok(RoomStatus::InProgress),
            "finished" => Ok(RoomStatus::Finished),
            _ => Err(CoordinatorError::InvalidRequest(format!(
                "unknown room status: {}",
                s
            ))),
        }
    }
}

/// Difficulty selects the grade thresholds applied to raw returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Default for Difficulty {
    fn default() -> Self {
        Difficulty::Medium
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

impl std::str::FromStr for Difficulty {
    type Err = CoordinatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(CoordinatorError::InvalidRequest(format!(
                "unknown difficulty: {}",
                s
            ))),
        }
    }
}

/// Per-day label from the offline agent layer. The only source of truth for
/// whether buying a ticker is permitted on a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl Recommendation {
    pub fn allows_buy(&self) -> bool {
        matches!(self, Recommendation::Buy | Recommendation::StrongBuy)
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recommendation::StrongBuy => write!(f, "STRONG_BUY"),
            Recommendation::Buy => write!(f, "BUY"),
            Recommendation::Hold => write!(f, "HOLD"),
            Recommendation::Sell => write!(f, "SELL"),
            Recommendation::StrongSell => write!(f, "STRONG_SELL"),
        }
    }
}

impl std::str::FromStr for Recommendation {
    type Err = CoordinatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "STRONG_BUY" => Ok(Recommendation::StrongBuy),
            "BUY" => Ok(Recommendation::Buy),
            "HOLD" => Ok(Recommendation::Hold),
            "SELL" => Ok(Recommendation::Sell),
            "STRONG_SELL" => Ok(Recommendation::StrongSell),
            _ => Err(CoordinatorError::InvalidRequest(format!(
                "unknown recommendation: {}",
                s
            ))),
        }
    }
}

/// Direction of a technical or sentiment signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalDirection {
    Bullish,
    Neutral,
    Bearish,
}

impl std::str::FromStr for SignalDirection {
    type Err = CoordinatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bullish" => Ok(SignalDirection::Bullish),
            "neutral" => Ok(SignalDirection::Neutral),
            "bearish" => Ok(SignalDirection::Bearish),
            _ => Err(CoordinatorError::InvalidRequest(format!(
                "unknown signal: {}",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl std::str::FromStr for RiskLevel {
    type Err = CoordinatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            _ => Err(CoordinatorError::InvalidRequest(format!(
                "unknown risk level: {}",
                s
            ))),
        }
    }
}

/// Side of a player trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "BUY"),
            TradeSide::Sell => write!(f, "SELL"),
        }
    }
}

/// OHLCV prices for one ticker on one date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerPrices {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// The indicator subset surfaced to clients alongside each day.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub rsi_14: Option<f64>,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
}

/// One AI recommendation row for a (ticker, date).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockRecommendation {
    pub ticker: String,
    pub recommendation: Recommendation,
    pub confidence: f64,
    pub technical_signal: SignalDirection,
    pub sentiment_signal: SignalDirection,
    pub risk_level: RiskLevel,
    pub rationale: String,
}

/// A news article tagged to a configured ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsArticle {
    pub ticker: String,
    pub title: String,
    pub source: Option<String>,
    pub url: Option<String>,
    pub published_on: NaiveDate,
}

/// One calendar date inside a session window. Non-trading dates are kept as
/// placeholders so day indices map 1:1 to calendar dates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDay {
    pub date: NaiveDate,
    pub is_trading_day: bool,
    pub prices: HashMap<String, TickerPrices>,
    pub indicators: HashMap<String, IndicatorSet>,
    /// Sorted lexicographically by ticker; the stable order both the AI
    /// shadow and clients iterate in.
    pub recommendations: Vec<StockRecommendation>,
    pub news: Vec<NewsArticle>,
}

impl MarketDay {
    pub fn open(&self, ticker: &str) -> Option<f64> {
        self.prices.get(ticker).map(|p| p.open)
    }

    pub fn close(&self, ticker: &str) -> Option<f64> {
        self.prices.get(ticker).map(|p| p.close)
    }

    pub fn recommendation_for(&self, ticker: &str) -> Option<&StockRecommendation> {
        self.recommendations.iter().find(|r| r.ticker == ticker)
    }
}

/// Last close at or before `day_index`. Weekends and missing-data days fall
/// back to the most recent trading close.
pub fn last_close(days: &[MarketDay], day_index: usize, ticker: &str) -> Option<f64> {
    if days.is_empty() {
        return None;
    }
    let start = day_index.min(days.len() - 1);
    days[..=start].iter().rev().find_map(|d| d.close(ticker))
}
