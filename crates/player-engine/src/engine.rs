use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use session_core::{last_close, CoordinatorError, Difficulty, GameConfig, MarketDay, TradeSide};

use crate::scoring::{self, ScoreBreakdown};

/// An open position. Entries with zero shares are removed, never kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    pub shares: i64,
    pub avg_cost: f64,
    pub total_cost: f64,
}

/// Append-only trade log entry. Recorded on day D, executed at open(D+1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: String,
    pub day_index: i64,
    pub date: NaiveDate,
    pub ticker: String,
    #[serde(rename = "type")]
    pub side: TradeSide,
    pub shares: i64,
    pub price: f64,
    pub total: f64,
    pub portfolio_value_after: f64,
}

/// End-of-day record, appended exactly once per completed day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub day_index: i64,
    pub date: NaiveDate,
    pub cash: f64,
    pub holdings_value: f64,
    pub total_value: f64,
    pub return_pct: f64,
    pub return_usd: f64,
}

/// A validated order waiting for its next-day-open settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOrder {
    pub ticker: String,
    pub side: TradeSide,
    pub shares: i64,
    pub price: f64,
}

/// An order as submitted by the player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub ticker: String,
    pub side: TradeSide,
    pub shares: i64,
}

/// The full mutable state of one player's simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerPortfolio {
    pub current_day: usize,
    pub initial_cash: f64,
    pub cash: f64,
    pub holdings: BTreeMap<String, Holding>,
    pub trades: Vec<TradeRecord>,
    #[serde(default)]
    pub pending: Vec<PendingOrder>,
    pub history: Vec<PortfolioSnapshot>,
    pub portfolio_value: f64,
    pub total_return_pct: f64,
    pub score: f64,
    pub grade: String,
    pub breakdown: ScoreBreakdown,
    pub is_finished: bool,
    pub game_ended_at: Option<DateTime<Utc>>,
}

impl PlayerPortfolio {
    pub fn new(initial_cash: f64, difficulty: Difficulty) -> Self {
        let breakdown =
            scoring::compute_score(initial_cash, initial_cash, 0, 0.0, &[], difficulty);
        let grade = breakdown.grade.clone();
        Self {
            current_day: 0,
            initial_cash,
            cash: initial_cash,
            holdings: BTreeMap::new(),
            trades: Vec::new(),
            pending: Vec::new(),
            history: Vec::new(),
            portfolio_value: initial_cash,
            total_return_pct: 0.0,
            score: breakdown.total,
            grade,
            breakdown,
            is_finished: false,
            game_ended_at: None,
        }
    }

    /// Cash not already committed to an unsettled buy.
    pub fn available_cash(&self) -> f64 {
        let committed: f64 = self
            .pending
            .iter()
            .filter(|o| o.side == TradeSide::Buy)
            .map(|o| o.total())
            .sum();
        self.cash - committed
    }

    /// Shares not already committed to an unsettled sell.
    pub fn sellable_shares(&self, ticker: &str) -> i64 {
        let held = self.holdings.get(ticker).map(|h| h.shares).unwrap_or(0);
        let committed: i64 = self
            .pending
            .iter()
            .filter(|o| o.side == TradeSide::Sell && o.ticker == ticker)
            .map(|o| o.shares)
            .sum();
        held - committed
    }

    /// Cash plus holdings at the most recent known closes.
    pub fn live_value(&self, days: &[MarketDay]) -> f64 {
        let holdings_value: f64 = self
            .holdings
            .iter()
            .map(|(ticker, h)| {
                h.shares as f64 * last_close(days, self.current_day, ticker).unwrap_or(h.avg_cost)
            })
            .sum();
        self.cash + holdings_value
    }
}

impl PendingOrder {
    fn total(&self) -> f64 {
        self.shares as f64 * self.price
    }
}

/// Stateless engine advancing player portfolios through a session window.
pub struct TradingEngine;

impl TradingEngine {
    pub fn new() -> Self {
        Self
    }

    /// Validate and record an order on the player's current day. The trade
    /// settles at the following day's open when the day advances; the
    /// recorded price is already that open.
    pub fn place_order(
        &self,
        portfolio: &mut PlayerPortfolio,
        days: &[MarketDay],
        order: &OrderRequest,
    ) -> Result<TradeRecord, CoordinatorError> {
        if portfolio.is_finished {
            return Err(CoordinatorError::InvalidTransition(
                "session already finished".into(),
            ));
        }

        let d = portfolio.current_day;
        let day = days.get(d).ok_or_else(|| {
            CoordinatorError::InvalidRequest(format!("no market data for day {}", d))
        })?;

        if !day.is_trading_day {
            return Err(CoordinatorError::MarketsClosed(day.date));
        }
        if order.shares < 1 {
            return Err(CoordinatorError::InvalidRequest(
                "shares must be at least 1".into(),
            ));
        }

        let next = days.get(d + 1).ok_or_else(|| {
            CoordinatorError::InvalidRequest(format!("no session day after {}", day.date))
        })?;
        let price = next.open(&order.ticker).ok_or_else(|| {
            CoordinatorError::InvalidRequest(format!(
                "{} has no open price on {}",
                order.ticker, next.date
            ))
        })?;

        match order.side {
            TradeSide::Buy => {
                let rec = day.recommendation_for(&order.ticker).ok_or_else(|| {
                    CoordinatorError::RecommendationBlocked(
                        order.ticker.clone(),
                        "no recommendation today".into(),
                    )
                })?;
                if !rec.recommendation.allows_buy() {
                    return Err(CoordinatorError::RecommendationBlocked(
                        order.ticker.clone(),
                        format!("recommendation is {}", rec.recommendation),
                    ));
                }

                let needed = order.shares as f64 * price;
                let available = portfolio.available_cash();
                if needed > available + 1e-9 {
                    return Err(CoordinatorError::InsufficientCash { needed, available });
                }
            }
            TradeSide::Sell => {
                let held = portfolio.sellable_shares(&order.ticker);
                if held < order.shares {
                    return Err(CoordinatorError::InsufficientShares {
                        ticker: order.ticker.clone(),
                        requested: order.shares,
                        held,
                    });
                }
            }
        }

        portfolio.pending.push(PendingOrder {
            ticker: order.ticker.clone(),
            side: order.side,
            shares: order.shares,
            price,
        });

        let record = TradeRecord {
            id: Uuid::new_v4().to_string(),
            day_index: d as i64,
            date: day.date,
            ticker: order.ticker.clone(),
            side: order.side,
            shares: order.shares,
            price,
            total: order.shares as f64 * price,
            portfolio_value_after: self.settled_value(portfolio, days, d),
        };
        portfolio.trades.push(record.clone());
        Ok(record)
    }

    /// Move the player from day D to D+1: snapshot day D at its closes with
    /// pre-trade state, settle the day's orders at open(D+1), then rescore.
    pub fn advance_day(
        &self,
        portfolio: &mut PlayerPortfolio,
        days: &[MarketDay],
        config: &GameConfig,
        ai_return_pct: f64,
    ) -> Result<(), CoordinatorError> {
        if portfolio.is_finished {
            return Ok(());
        }

        let d = portfolio.current_day;
        let day = days.get(d).ok_or_else(|| {
            CoordinatorError::InvalidRequest(format!("no market data for day {}", d))
        })?;

        let holdings_value: f64 = portfolio
            .holdings
            .iter()
            .map(|(ticker, h)| {
                h.shares as f64 * last_close(days, d, ticker).unwrap_or(h.avg_cost)
            })
            .sum();
        let total_value = portfolio.cash + holdings_value;
        portfolio.history.push(PortfolioSnapshot {
            day_index: d as i64,
            date: day.date,
            cash: portfolio.cash,
            holdings_value,
            total_value,
            return_pct: 100.0 * (total_value - portfolio.initial_cash) / portfolio.initial_cash,
            return_usd: total_value - portfolio.initial_cash,
        });

        for order in std::mem::take(&mut portfolio.pending) {
            Self::settle(portfolio, &order);
        }

        portfolio.current_day = d + 1;
        if portfolio.current_day >= config.num_days as usize {
            portfolio.is_finished = true;
            if portfolio.game_ended_at.is_none() {
                portfolio.game_ended_at = Some(Utc::now());
            }
        }

        self.rescore(portfolio, days, config, ai_return_pct);
        Ok(())
    }

    /// Recompute portfolio value, the four score components and the grade.
    pub fn rescore(
        &self,
        portfolio: &mut PlayerPortfolio,
        days: &[MarketDay],
        config: &GameConfig,
        ai_return_pct: f64,
    ) {
        let value = portfolio.live_value(days);
        portfolio.portfolio_value = value;
        portfolio.total_return_pct =
            100.0 * (value - portfolio.initial_cash) / portfolio.initial_cash;

        let buy_trades = portfolio
            .trades
            .iter()
            .filter(|t| t.side == TradeSide::Buy)
            .count();
        let breakdown = scoring::compute_score(
            value,
            portfolio.initial_cash,
            buy_trades,
            ai_return_pct,
            &portfolio.history,
            config.difficulty,
        );
        portfolio.score = breakdown.total;
        portfolio.grade = breakdown.grade.clone();
        portfolio.breakdown = breakdown;
    }

    fn settle(portfolio: &mut PlayerPortfolio, order: &PendingOrder) {
        match order.side {
            TradeSide::Buy => {
                portfolio.cash -= order.total();
                let holding = portfolio
                    .holdings
                    .entry(order.ticker.clone())
                    .or_insert(Holding {
                        shares: 0,
                        avg_cost: 0.0,
                        total_cost: 0.0,
                    });
                holding.shares += order.shares;
                holding.total_cost += order.total();
                holding.avg_cost = holding.total_cost / holding.shares as f64;
            }
            TradeSide::Sell => {
                portfolio.cash += order.total();
                if let Some(holding) = portfolio.holdings.get_mut(&order.ticker) {
                    holding.shares -= order.shares;
                    holding.total_cost = holding.avg_cost * holding.shares as f64;
                    if holding.shares <= 0 {
                        portfolio.holdings.remove(&order.ticker);
                    }
                }
            }
        }
    }

    /// Portfolio value as of settlement: all pending orders applied, holdings
    /// marked at the next day's opens where available.
    fn settled_value(&self, portfolio: &PlayerPortfolio, days: &[MarketDay], d: usize) -> f64 {
        let mut settled = portfolio.clone();
        for order in std::mem::take(&mut settled.pending) {
            Self::settle(&mut settled, &order);
        }
        let holdings_value: f64 = settled
            .holdings
            .iter()
            .map(|(ticker, h)| {
                let price = days
                    .get(d + 1)
                    .and_then(|next| next.open(ticker))
                    .or_else(|| last_close(days, d, ticker))
                    .unwrap_or(h.avg_cost);
                h.shares as f64 * price
            })
            .sum();
        settled.cash + holdings_value
    }
}

impl Default for TradingEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use session_core::{
        Recommendation, RiskLevel, SignalDirection, StockRecommendation, TickerPrices,
    };
    use std::collections::HashMap;

    fn make_day(
        date: &str,
        trading: bool,
        prices: &[(&str, f64, f64)],
        recs: &[(&str, Recommendation)],
    ) -> MarketDay {
        let mut price_map = HashMap::new();
        for (ticker, open, close) in prices {
            price_map.insert(
                ticker.to_string(),
                TickerPrices {
                    open: *open,
                    high: open.max(*close),
                    low: open.min(*close),
                    close: *close,
                    volume: 1_000,
                },
            );
        }
        let mut recommendations: Vec<StockRecommendation> = recs
            .iter()
            .map(|(ticker, rec)| StockRecommendation {
                ticker: ticker.to_string(),
                recommendation: *rec,
                confidence: 0.8,
                technical_signal: SignalDirection::Bullish,
                sentiment_signal: SignalDirection::Neutral,
                risk_level: RiskLevel::Medium,
                rationale: String::new(),
            })
            .collect();
        recommendations.sort_by(|a, b| a.ticker.cmp(&b.ticker));

        MarketDay {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            is_trading_day: trading,
            prices: price_map,
            indicators: HashMap::new(),
            recommendations,
            news: Vec::new(),
        }
    }

    fn config(num_days: u32) -> GameConfig {
        GameConfig {
            initial_cash: 100_000.0,
            num_days,
            tickers: vec!["AAPL".to_string()],
            difficulty: Difficulty::Medium,
            day_duration_seconds: None,
        }
    }

    /// Solo async session over a single ticker: buy on day 0, hold to the
    /// end, check cash, holdings, return and score.
    #[test]
    fn test_buy_and_hold_session() {
        let days = vec![
            make_day("2025-03-03", true, &[("AAPL", 98.0, 99.0)], &[("AAPL", Recommendation::Buy)]),
            make_day("2025-03-04", true, &[("AAPL", 100.0, 110.0)], &[("AAPL", Recommendation::Hold)]),
            make_day("2025-03-05", true, &[("AAPL", 112.0, 120.0)], &[("AAPL", Recommendation::Hold)]),
        ];
        let config = config(3);
        let engine = TradingEngine::new();
        let mut portfolio = PlayerPortfolio::new(100_000.0, Difficulty::Medium);

        let trade = engine
            .place_order(
                &mut portfolio,
                &days,
                &OrderRequest {
                    ticker: "AAPL".to_string(),
                    side: TradeSide::Buy,
                    shares: 500,
                },
            )
            .unwrap();
        assert_eq!(trade.price, 100.0);
        assert_eq!(trade.total, 50_000.0);

        for _ in 0..3 {
            engine.advance_day(&mut portfolio, &days, &config, 5.0).unwrap();
        }

        assert_eq!(portfolio.cash, 50_000.0);
        assert_eq!(portfolio.holdings["AAPL"].shares, 500);
        assert_eq!(portfolio.portfolio_value, 110_000.0);
        assert!((portfolio.total_return_pct - 10.0).abs() < 1e-9);
        assert!(portfolio.is_finished);
        assert_eq!(portfolio.grade, "B");
        assert_eq!(portfolio.breakdown.portfolio_return_points, 500.0);
        assert_eq!(portfolio.breakdown.risk_discipline_points, 50.0);
        assert_eq!(portfolio.breakdown.beat_ai_points, 200.0);
        assert_eq!(portfolio.breakdown.drawdown_penalty_points, 0.0);
        assert!(portfolio.score >= 550.0);
    }

    /// The day-D snapshot reflects pre-trade state; the trade takes effect on
    /// day D+1.
    #[test]
    fn test_snapshot_precedes_settlement() {
        let days = vec![
            make_day("2025-03-03", true, &[("AAPL", 98.0, 99.0)], &[("AAPL", Recommendation::Buy)]),
            make_day("2025-03-04", true, &[("AAPL", 100.0, 110.0)], &[]),
            make_day("2025-03-05", true, &[("AAPL", 112.0, 120.0)], &[]),
        ];
        let config = config(3);
        let engine = TradingEngine::new();
        let mut portfolio = PlayerPortfolio::new(100_000.0, Difficulty::Medium);

        engine
            .place_order(
                &mut portfolio,
                &days,
                &OrderRequest {
                    ticker: "AAPL".to_string(),
                    side: TradeSide::Buy,
                    shares: 500,
                },
            )
            .unwrap();
        engine.advance_day(&mut portfolio, &days, &config, 0.0).unwrap();

        let snap = &portfolio.history[0];
        assert_eq!(snap.cash, 100_000.0);
        assert_eq!(snap.holdings_value, 0.0);
        assert_eq!(snap.total_value, 100_000.0);
        assert_eq!(portfolio.cash, 50_000.0);
        assert_eq!(portfolio.holdings["AAPL"].shares, 500);
    }

    #[test]
    fn test_buy_blocked_by_recommendation() {
        let days = vec![
            make_day("2025-03-03", true, &[("MSFT", 200.0, 201.0)], &[("MSFT", Recommendation::Hold)]),
            make_day("2025-03-04", true, &[("MSFT", 202.0, 203.0)], &[]),
        ];
        let engine = TradingEngine::new();
        let mut portfolio = PlayerPortfolio::new(100_000.0, Difficulty::Medium);

        let err = engine
            .place_order(
                &mut portfolio,
                &days,
                &OrderRequest {
                    ticker: "MSFT".to_string(),
                    side: TradeSide::Buy,
                    shares: 10,
                },
            )
            .unwrap_err();

        assert!(matches!(err, CoordinatorError::RecommendationBlocked(..)));
        assert_eq!(portfolio.cash, 100_000.0);
        assert!(portfolio.holdings.is_empty());
        assert!(portfolio.trades.is_empty());
    }

    /// A day with no recommendations only permits selling.
    #[test]
    fn test_no_recommendation_blocks_buy_but_not_sell() {
        let days = vec![
            make_day("2025-03-03", true, &[("AAPL", 98.0, 99.0)], &[("AAPL", Recommendation::Buy)]),
            make_day("2025-03-04", true, &[("AAPL", 100.0, 101.0)], &[]),
            make_day("2025-03-05", true, &[("AAPL", 102.0, 103.0)], &[]),
        ];
        let config = config(3);
        let engine = TradingEngine::new();
        let mut portfolio = PlayerPortfolio::new(100_000.0, Difficulty::Medium);

        engine
            .place_order(
                &mut portfolio,
                &days,
                &OrderRequest {
                    ticker: "AAPL".to_string(),
                    side: TradeSide::Buy,
                    shares: 10,
                },
            )
            .unwrap();
        engine.advance_day(&mut portfolio, &days, &config, 0.0).unwrap();

        // day 1 has no recommendations at all
        let err = engine
            .place_order(
                &mut portfolio,
                &days,
                &OrderRequest {
                    ticker: "AAPL".to_string(),
                    side: TradeSide::Buy,
                    shares: 10,
                },
            )
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::RecommendationBlocked(..)));

        engine
            .place_order(
                &mut portfolio,
                &days,
                &OrderRequest {
                    ticker: "AAPL".to_string(),
                    side: TradeSide::Sell,
                    shares: 10,
                },
            )
            .unwrap();
    }

    #[test]
    fn test_weekend_rejects_orders_but_advances() {
        let days = vec![
            make_day("2025-03-07", true, &[("AAPL", 100.0, 101.0)], &[("AAPL", Recommendation::Buy)]),
            make_day("2025-03-08", false, &[], &[]),
            make_day("2025-03-10", true, &[("AAPL", 102.0, 103.0)], &[]),
        ];
        let config = config(3);
        let engine = TradingEngine::new();
        let mut portfolio = PlayerPortfolio::new(100_000.0, Difficulty::Medium);

        engine.advance_day(&mut portfolio, &days, &config, 0.0).unwrap();

        let err = engine
            .place_order(
                &mut portfolio,
                &days,
                &OrderRequest {
                    ticker: "AAPL".to_string(),
                    side: TradeSide::Buy,
                    shares: 1,
                },
            )
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::MarketsClosed(_)));

        engine.advance_day(&mut portfolio, &days, &config, 0.0).unwrap();
        assert_eq!(portfolio.current_day, 2);
        assert_eq!(portfolio.history.len(), 2);
    }

    /// Buying then selling the same shares at the same open leaves cash
    /// unchanged and removes the holding entirely.
    #[test]
    fn test_buy_sell_round_trip() {
        let days = vec![
            make_day("2025-03-03", true, &[("AAPL", 98.0, 99.0)], &[("AAPL", Recommendation::StrongBuy)]),
            make_day("2025-03-04", true, &[("AAPL", 100.0, 100.0)], &[("AAPL", Recommendation::Hold)]),
            make_day("2025-03-05", true, &[("AAPL", 100.0, 100.0)], &[]),
        ];
        let config = config(3);
        let engine = TradingEngine::new();
        let mut portfolio = PlayerPortfolio::new(100_000.0, Difficulty::Medium);

        engine
            .place_order(
                &mut portfolio,
                &days,
                &OrderRequest {
                    ticker: "AAPL".to_string(),
                    side: TradeSide::Buy,
                    shares: 100,
                },
            )
            .unwrap();
        engine.advance_day(&mut portfolio, &days, &config, 0.0).unwrap();

        engine
            .place_order(
                &mut portfolio,
                &days,
                &OrderRequest {
                    ticker: "AAPL".to_string(),
                    side: TradeSide::Sell,
                    shares: 100,
                },
            )
            .unwrap();
        engine.advance_day(&mut portfolio, &days, &config, 0.0).unwrap();

        assert!((portfolio.cash - 100_000.0).abs() < 1e-9);
        assert!(portfolio.holdings.is_empty());
    }

    #[test]
    fn test_insufficient_cash_accounts_for_pending_buys() {
        let days = vec![
            make_day("2025-03-03", true, &[("AAPL", 98.0, 99.0)], &[("AAPL", Recommendation::Buy)]),
            make_day("2025-03-04", true, &[("AAPL", 100.0, 101.0)], &[]),
        ];
        let engine = TradingEngine::new();
        let mut portfolio = PlayerPortfolio::new(100_000.0, Difficulty::Medium);

        engine
            .place_order(
                &mut portfolio,
                &days,
                &OrderRequest {
                    ticker: "AAPL".to_string(),
                    side: TradeSide::Buy,
                    shares: 600,
                },
            )
            .unwrap();

        // 600 more would need 60k against the 40k still uncommitted
        let err = engine
            .place_order(
                &mut portfolio,
                &days,
                &OrderRequest {
                    ticker: "AAPL".to_string(),
                    side: TradeSide::Buy,
                    shares: 600,
                },
            )
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::InsufficientCash { .. }));
    }

    #[test]
    fn test_sell_more_than_held() {
        let days = vec![
            make_day("2025-03-03", true, &[("AAPL", 98.0, 99.0)], &[]),
            make_day("2025-03-04", true, &[("AAPL", 100.0, 101.0)], &[]),
        ];
        let engine = TradingEngine::new();
        let mut portfolio = PlayerPortfolio::new(100_000.0, Difficulty::Medium);

        let err = engine
            .place_order(
                &mut portfolio,
                &days,
                &OrderRequest {
                    ticker: "AAPL".to_string(),
                    side: TradeSide::Sell,
                    shares: 1,
                },
            )
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::InsufficientShares { .. }));
    }

    #[test]
    fn test_weighted_average_cost() {
        let days = vec![
            make_day("2025-03-03", true, &[("AAPL", 98.0, 99.0)], &[("AAPL", Recommendation::Buy)]),
            make_day("2025-03-04", true, &[("AAPL", 100.0, 101.0)], &[("AAPL", Recommendation::Buy)]),
            make_day("2025-03-05", true, &[("AAPL", 120.0, 121.0)], &[]),
            make_day("2025-03-06", true, &[("AAPL", 122.0, 123.0)], &[]),
        ];
        let config = config(4);
        let engine = TradingEngine::new();
        let mut portfolio = PlayerPortfolio::new(100_000.0, Difficulty::Medium);

        engine
            .place_order(
                &mut portfolio,
                &days,
                &OrderRequest {
                    ticker: "AAPL".to_string(),
                    side: TradeSide::Buy,
                    shares: 100,
                },
            )
            .unwrap();
        engine.advance_day(&mut portfolio, &days, &config, 0.0).unwrap();

        engine
            .place_order(
                &mut portfolio,
                &days,
                &OrderRequest {
                    ticker: "AAPL".to_string(),
                    side: TradeSide::Buy,
                    shares: 100,
                },
            )
            .unwrap();
        engine.advance_day(&mut portfolio, &days, &config, 0.0).unwrap();

        let holding = &portfolio.holdings["AAPL"];
        assert_eq!(holding.shares, 200);
        assert!((holding.avg_cost - 110.0).abs() < 1e-9);
        assert!((holding.total_cost - 22_000.0).abs() < 1e-9);
    }

    /// history length always equals the player's day index.
    #[test]
    fn test_history_tracks_day_index() {
        let days = vec![
            make_day("2025-03-03", true, &[("AAPL", 98.0, 99.0)], &[]),
            make_day("2025-03-04", true, &[("AAPL", 100.0, 101.0)], &[]),
            make_day("2025-03-05", true, &[("AAPL", 102.0, 103.0)], &[]),
            make_day("2025-03-06", true, &[("AAPL", 104.0, 105.0)], &[]),
        ];
        let config = config(4);
        let engine = TradingEngine::new();
        let mut portfolio = PlayerPortfolio::new(100_000.0, Difficulty::Medium);

        for expected in 1..=4 {
            engine.advance_day(&mut portfolio, &days, &config, 0.0).unwrap();
            assert_eq!(portfolio.history.len(), expected);
            assert_eq!(portfolio.current_day, expected);
        }
        assert!(portfolio.is_finished);

        // advancing a finished portfolio is a no-op
        engine.advance_day(&mut portfolio, &days, &config, 0.0).unwrap();
        assert_eq!(portfolio.history.len(), 4);
        assert_eq!(portfolio.current_day, 4);
    }

    #[test]
    fn test_session_of_length_one() {
        let days = vec![make_day("2025-03-03", true, &[("AAPL", 98.0, 99.0)], &[])];
        let config = config(1);
        let engine = TradingEngine::new();
        let mut portfolio = PlayerPortfolio::new(100_000.0, Difficulty::Medium);

        engine.advance_day(&mut portfolio, &days, &config, 0.0).unwrap();
        assert!(portfolio.is_finished);
        assert_eq!(portfolio.current_day, 1);
        assert_eq!(portfolio.history.len(), 1);
    }
}
