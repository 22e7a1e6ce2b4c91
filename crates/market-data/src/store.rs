use chrono::{Datelike, Duration, NaiveDate};
use sqlx::SqlitePool;
use std::collections::HashMap;

use session_core::{
    CoordinatorError, IndicatorSet, MarketDay, NewsArticle, StockRecommendation, TickerPrices,
};

/// Read-only view over the market data tables.
#[derive(Clone)]
pub struct MarketStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct PriceRow {
    date: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: i64,
}

#[derive(sqlx::FromRow)]
struct IndicatorRow {
    date: String,
    rsi_14: Option<f64>,
    sma_20: Option<f64>,
    sma_50: Option<f64>,
    macd: Option<f64>,
    macd_signal: Option<f64>,
}

#[derive(sqlx::FromRow)]
struct RecommendationRow {
    ticker: String,
    date: String,
    recommendation: String,
    confidence: f64,
    technical_signal: String,
    sentiment_signal: String,
    risk_level: String,
    rationale: String,
}

#[derive(sqlx::FromRow)]
struct NewsRow {
    ticker: String,
    title: String,
    source: Option<String>,
    url: Option<String>,
    published_on: String,
}

fn parse_date(s: &str) -> Result<NaiveDate, CoordinatorError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| CoordinatorError::InvalidRequest(format!("bad date {}: {}", s, e)))
}

fn is_weekday(date: NaiveDate) -> bool {
    date.weekday().num_days_from_monday() < 5
}

impl MarketStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Assemble the ordered sequence of `MarketDay`s for every calendar date
    /// in the inclusive window. Day index i maps to `start_date + i` days;
    /// weekends and missing-data dates stay in the sequence as non-trading
    /// placeholders.
    ///
    /// Fails with `InsufficientData` when the window holds fewer than
    /// `min_trading_days` trading days.
    pub async fn get_session_window(
        &self,
        tickers: &[String],
        start_date: NaiveDate,
        end_date: NaiveDate,
        min_trading_days: usize,
    ) -> Result<Vec<MarketDay>, CoordinatorError> {
        if end_date < start_date {
            return Err(CoordinatorError::InvalidRequest(format!(
                "window end {} precedes start {}",
                end_date, start_date
            )));
        }
        if tickers.is_empty() {
            return Err(CoordinatorError::InvalidRequest(
                "no tickers configured".into(),
            ));
        }

        let start = start_date.format("%Y-%m-%d").to_string();
        let end = end_date.format("%Y-%m-%d").to_string();

        // prices: (ticker, date) -> TickerPrices
        let mut prices: HashMap<(String, NaiveDate), TickerPrices> = HashMap::new();
        for ticker in tickers {
            let rows = sqlx::query_as::<_, PriceRow>(
                "SELECT date, open, high, low, close, volume FROM price_bars \
                 WHERE ticker = ? AND date BETWEEN ? AND ? ORDER BY date",
            )
            .bind(ticker)
            .bind(&start)
            .bind(&end)
            .fetch_all(&self.pool)
            .await?;

            for row in rows {
                prices.insert(
                    (ticker.clone(), parse_date(&row.date)?),
                    TickerPrices {
                        open: row.open,
                        high: row.high,
                        low: row.low,
                        close: row.close,
                        volume: row.volume,
                    },
                );
            }
        }

        // indicators: per ticker, ascending history up to the window end; each
        // day picks the latest row at or before its date
        let mut indicator_history: HashMap<String, Vec<(NaiveDate, IndicatorSet)>> =
            HashMap::new();
        for ticker in tickers {
            let rows = sqlx::query_as::<_, IndicatorRow>(
                "SELECT date, rsi_14, sma_20, sma_50, macd, macd_signal \
                 FROM technical_indicators WHERE ticker = ? AND date <= ? ORDER BY date",
            )
            .bind(ticker)
            .bind(&end)
            .fetch_all(&self.pool)
            .await?;

            let mut history = Vec::with_capacity(rows.len());
            for row in rows {
                history.push((
                    parse_date(&row.date)?,
                    IndicatorSet {
                        rsi_14: row.rsi_14,
                        sma_20: row.sma_20,
                        sma_50: row.sma_50,
                        macd: row.macd,
                        macd_signal: row.macd_signal,
                    },
                ));
            }
            indicator_history.insert(ticker.clone(), history);
        }

        // recommendations grouped by date
        let mut recs_by_date: HashMap<NaiveDate, Vec<StockRecommendation>> = HashMap::new();
        for ticker in tickers {
            let rows = sqlx::query_as::<_, RecommendationRow>(
                "SELECT ticker, date, recommendation, confidence, technical_signal, \
                 sentiment_signal, risk_level, rationale FROM recommendations \
                 WHERE ticker = ? AND date BETWEEN ? AND ? ORDER BY date",
            )
            .bind(ticker)
            .bind(&start)
            .bind(&end)
            .fetch_all(&self.pool)
            .await?;

            for row in rows {
                let date = parse_date(&row.date)?;
                recs_by_date.entry(date).or_default().push(StockRecommendation {
                    ticker: row.ticker,
                    recommendation: row.recommendation.parse()?,
                    confidence: row.confidence,
                    technical_signal: row.technical_signal.parse()?,
                    sentiment_signal: row.sentiment_signal.parse()?,
                    risk_level: row.risk_level.parse()?,
                    rationale: row.rationale,
                });
            }
        }

        // news inside the window, ascending by publication date
        let mut news: Vec<(NaiveDate, NewsArticle)> = Vec::new();
        for ticker in tickers {
            let rows = sqlx::query_as::<_, NewsRow>(
                "SELECT ticker, title, source, url, published_on FROM news_articles \
                 WHERE ticker = ? AND published_on BETWEEN ? AND ? ORDER BY published_on",
            )
            .bind(ticker)
            .bind(&start)
            .bind(&end)
            .fetch_all(&self.pool)
            .await?;

            for row in rows {
                let published_on = parse_date(&row.published_on)?;
                news.push((
                    published_on,
                    NewsArticle {
                        ticker: row.ticker,
                        title: row.title,
                        source: row.source,
                        url: row.url,
                        published_on,
                    },
                ));
            }
        }
        news.sort_by_key(|(date, _)| *date);

        let mut days = Vec::new();
        let mut found_trading_days = 0usize;
        let num_days = (end_date - start_date).num_days() + 1;

        for offset in 0..num_days {
            let date = start_date + Duration::days(offset);

            let day_prices: HashMap<String, TickerPrices> = tickers
                .iter()
                .filter_map(|t| {
                    prices
                        .get(&(t.clone(), date))
                        .map(|p| (t.clone(), p.clone()))
                })
                .collect();

            let day_indicators: HashMap<String, IndicatorSet> = tickers
                .iter()
                .filter_map(|t| {
                    indicator_history.get(t).and_then(|history| {
                        history
                            .iter()
                            .rev()
                            .find(|(d, _)| *d <= date)
                            .map(|(_, set)| (t.clone(), set.clone()))
                    })
                })
                .collect();

            let mut recommendations = recs_by_date.remove(&date).unwrap_or_default();
            recommendations.sort_by(|a, b| a.ticker.cmp(&b.ticker));

            let day_news: Vec<NewsArticle> = news
                .iter()
                .take_while(|(published, _)| *published <= date)
                .map(|(_, article)| article.clone())
                .collect();

            let is_trading_day = is_weekday(date) && day_prices.len() == tickers.len();
            if is_trading_day {
                found_trading_days += 1;
            }

            days.push(MarketDay {
                date,
                is_trading_day,
                prices: day_prices,
                indicators: day_indicators,
                recommendations,
                news: day_news,
            });
        }

        if found_trading_days < min_trading_days {
            tracing::warn!(
                start = %start_date,
                end = %end_date,
                found = found_trading_days,
                required = min_trading_days,
                "session window lacks trading days"
            );
            return Err(CoordinatorError::InsufficientData {
                found: found_trading_days,
                required: min_trading_days,
            });
        }

        Ok(days)
    }

    /// Trading days available in a window, used to validate room creation
    /// before any player joins.
    pub async fn count_trading_days(
        &self,
        tickers: &[String],
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<usize, CoordinatorError> {
        let days = self
            .get_session_window(tickers, start_date, end_date, 0)
            .await?;
        Ok(days.iter().filter(|d| d.is_trading_day).count())
    }
}
