//! Deterministic per-player trading simulation.
//!
//! The engine is a pure function over (portfolio, market day sequence,
//! action); the same crate drives both the server-side representation and the
//! client's local replay, which is what keeps the two from diverging.

pub mod engine;
pub mod scoring;

pub use engine::{
    Holding, OrderRequest, PendingOrder, PlayerPortfolio, PortfolioSnapshot, TradeRecord,
    TradingEngine,
};
pub use scoring::{compute_score, grade_for, max_drawdown_pct, ScoreBreakdown};
