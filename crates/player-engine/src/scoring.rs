use serde::{Deserialize, Serialize};

use session_core::Difficulty;

use crate::engine::PortfolioSnapshot;

/// Four-component decomposition of a player's score, recomputed on every day
/// advance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreBreakdown {
    pub portfolio_return_points: f64,
    pub risk_discipline_points: f64,
    pub beat_ai_points: f64,
    pub drawdown_penalty_points: f64,
    pub total: f64,
    pub grade: String,
}

impl Default for ScoreBreakdown {
    fn default() -> Self {
        Self {
            portfolio_return_points: 0.0,
            risk_discipline_points: 0.0,
            beat_ai_points: 0.0,
            drawdown_penalty_points: 0.0,
            total: 0.0,
            grade: "C".to_string(),
        }
    }
}

/// Letter grade from the raw return under difficulty-dependent thresholds.
/// An A requires strictly beating its cut so a return sitting exactly on the
/// A threshold still grades B; the lower cuts are inclusive.
pub fn grade_for(difficulty: Difficulty, return_pct: f64) -> &'static str {
    let (a, b, c, d) = match difficulty {
        Difficulty::Easy => (5.0, 2.0, 0.0, -3.0),
        Difficulty::Medium => (10.0, 5.0, 0.0, -5.0),
        Difficulty::Hard => (15.0, 10.0, 5.0, 0.0),
    };

    if return_pct > a {
        "A"
    } else if return_pct >= b {
        "B"
    } else if return_pct >= c {
        "C"
    } else if return_pct >= d {
        "D"
    } else {
        "F"
    }
}

/// Maximum drawdown across the portfolio history as a non-positive
/// percentage: min over t of 100 × (V(t) − peak(t)) / peak(t).
pub fn max_drawdown_pct(history: &[PortfolioSnapshot]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0f64;

    for snapshot in history {
        peak = peak.max(snapshot.total_value);
        if peak > 0.0 {
            let drawdown = 100.0 * (snapshot.total_value - peak) / peak;
            worst = worst.min(drawdown);
        }
    }
    worst
}

/// Compute the composite score.
pub fn compute_score(
    portfolio_value: f64,
    initial_cash: f64,
    buy_trades: usize,
    ai_return_pct: f64,
    history: &[PortfolioSnapshot],
    difficulty: Difficulty,
) -> ScoreBreakdown {
    let return_pct = 100.0 * (portfolio_value - initial_cash) / initial_cash;

    let portfolio_return_points = (return_pct * 50.0).clamp(0.0, 500.0);

    // Buys are gated to BUY/STRONG_BUY recommendations, so every recorded buy
    // is compliant by construction.
    let risk_discipline_points = 50.0 * buy_trades as f64;

    let beat_ai_points = if return_pct > ai_return_pct { 200.0 } else { 0.0 };

    let max_drawdown = max_drawdown_pct(history);
    let drawdown_penalty_points = if max_drawdown < -10.0 {
        20.0 * max_drawdown
    } else {
        0.0
    };

    let total = portfolio_return_points
        + risk_discipline_points
        + beat_ai_points
        + drawdown_penalty_points;

    ScoreBreakdown {
        portfolio_return_points,
        risk_discipline_points,
        beat_ai_points,
        drawdown_penalty_points,
        total,
        grade: grade_for(difficulty, return_pct).to_string(),
    }
}
