//! The AI benchmark portfolio that shadows every player.
//!
//! The shadow trades the same recommendation stream the player sees, under a
//! fixed allocation policy, so scoring always has a reference opponent. The
//! policy is deliberately deterministic: the client simulates the same shadow
//! locally for its UI and the two must agree to the cent.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use session_core::{last_close, MarketDay, Recommendation};

/// Fraction of current cash committed per STRONG_BUY.
const STRONG_BUY_ALLOCATION: f64 = 0.40;
/// Fraction of current cash committed per BUY.
const BUY_ALLOCATION: f64 = 0.25;

/// Benchmark portfolio state, persisted per player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowPortfolio {
    pub initial_cash: f64,
    pub cash: f64,
    pub holdings: BTreeMap<String, i64>,
    pub day: usize,
    pub value: f64,
    pub return_pct: f64,
}

/// The room-level benchmark summary shown to teachers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkSnapshot {
    pub value: f64,
    pub return_pct: f64,
    pub day: i64,
}

impl Default for BenchmarkSnapshot {
    fn default() -> Self {
        Self {
            value: 0.0,
            return_pct: 0.0,
            day: 0,
        }
    }
}

impl ShadowPortfolio {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            initial_cash,
            cash: initial_cash,
            holdings: BTreeMap::new(),
            day: 0,
            value: initial_cash,
            return_pct: 0.0,
        }
    }

    pub fn snapshot(&self) -> BenchmarkSnapshot {
        BenchmarkSnapshot {
            value: self.value,
            return_pct: self.return_pct,
            day: self.day as i64,
        }
    }

    /// Step the shadow forward to `new_day`, one day at a time. Entering day
    /// N executes the recommendations revealed on day N−1 at day-N opens, the
    /// same decide-on-D, trade-at-open(D+1) rule players are held to. Days at
    /// or past the end of the window only revalue the book.
    pub fn advance_to(&mut self, days: &[MarketDay], new_day: usize) {
        while self.day < new_day {
            let entering = self.day + 1;
            self.step_into(days, entering);
        }
    }

    fn step_into(&mut self, days: &[MarketDay], entering: usize) {
        if entering < days.len() && days[entering].is_trading_day {
            // split borrows: the decisions come from the completed day, the
            // fills from the day being entered
            let (rec_day, exec_day) = (&days[entering - 1], &days[entering]);

            for rec in &rec_day.recommendations {
                let Some(open) = exec_day.open(&rec.ticker) else {
                    continue;
                };
                if open <= 0.0 {
                    continue;
                }

                match rec.recommendation {
                    Recommendation::StrongBuy => self.buy_fraction(&rec.ticker, open, STRONG_BUY_ALLOCATION),
                    Recommendation::Buy => self.buy_fraction(&rec.ticker, open, BUY_ALLOCATION),
                    Recommendation::StrongSell => self.sell_all(&rec.ticker, open),
                    Recommendation::Sell => self.sell_half(&rec.ticker, open),
                    Recommendation::Hold => {}
                }
            }
        }

        self.day = entering;
        self.revalue(days);
    }

    fn buy_fraction(&mut self, ticker: &str, open: f64, fraction: f64) {
        let shares = (self.cash * fraction / open).floor() as i64;
        if shares < 1 {
            return;
        }
        self.cash -= shares as f64 * open;
        *self.holdings.entry(ticker.to_string()).or_insert(0) += shares;
    }

    fn sell_all(&mut self, ticker: &str, open: f64) {
        if let Some(shares) = self.holdings.remove(ticker) {
            self.cash += shares as f64 * open;
        }
    }

    fn sell_half(&mut self, ticker: &str, open: f64) {
        if let Some(held) = self.holdings.get_mut(ticker) {
            let to_sell = ((*held as f64 / 2.0).ceil() as i64).max(1);
            let to_sell = to_sell.min(*held);
            self.cash += to_sell as f64 * open;
            *held -= to_sell;
            if *held <= 0 {
                self.holdings.remove(ticker);
            }
        }
    }

    fn revalue(&mut self, days: &[MarketDay]) {
        let holdings_value: f64 = self
            .holdings
            .iter()
            .map(|(ticker, shares)| {
                *shares as f64 * last_close(days, self.day, ticker).unwrap_or(0.0)
            })
            .sum();
        self.value = self.cash + holdings_value;
        self.return_pct = 100.0 * (self.value - self.initial_cash) / self.initial_cash;
    }
}
