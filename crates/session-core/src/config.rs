use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoordinatorError;
use crate::types::Difficulty;

pub const DEFAULT_INITIAL_CASH: f64 = 100_000.0;

/// The validated room configuration envelope. Clients send an open structured
/// object; unrecognized keys are dropped on ingress, invalid values are
/// rejected with `InvalidRequest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    pub initial_cash: f64,
    pub num_days: u32,
    pub tickers: Vec<String>,
    pub difficulty: Difficulty,
    pub day_duration_seconds: Option<u64>,
}

impl GameConfig {
    /// Validate an open config object against the recognized options.
    pub fn from_value(value: &Value) -> Result<Self, CoordinatorError> {
        let obj = value.as_object().ok_or_else(|| {
            CoordinatorError::InvalidRequest("config must be an object".into())
        })?;

        let initial_cash = match obj.get("initial_cash") {
            None | Some(Value::Null) => DEFAULT_INITIAL_CASH,
            Some(v) => v.as_f64().ok_or_else(|| {
                CoordinatorError::InvalidRequest("initial_cash must be a number".into())
            })?,
        };

        let num_days = obj
            .get("num_days")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                CoordinatorError::InvalidRequest("num_days must be a positive integer".into())
            })?;

        let tickers = obj
            .get("tickers")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                CoordinatorError::InvalidRequest("tickers must be a list of symbols".into())
            })?
            .iter()
            .map(|t| {
                t.as_str()
                    .map(|s| s.trim().to_uppercase())
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| {
                        CoordinatorError::InvalidRequest(
                            "tickers must be non-empty strings".into(),
                        )
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let difficulty = match obj.get("difficulty") {
            None | Some(Value::Null) => Difficulty::default(),
            Some(v) => v
                .as_str()
                .ok_or_else(|| {
                    CoordinatorError::InvalidRequest("difficulty must be a string".into())
                })?
                .parse()?,
        };

        let day_duration_seconds = match obj.get("day_duration_seconds") {
            None | Some(Value::Null) => None,
            Some(v) => Some(v.as_u64().ok_or_else(|| {
                CoordinatorError::InvalidRequest(
                    "day_duration_seconds must be a positive integer".into(),
                )
            })?),
        };

        let config = Self {
            initial_cash,
            num_days: num_days as u32,
            tickers,
            difficulty,
            day_duration_seconds,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoordinatorError> {
        if !(self.initial_cash > 0.0) {
            return Err(CoordinatorError::InvalidRequest(
                "initial_cash must be positive".into(),
            ));
        }
        if self.num_days == 0 {
            return Err(CoordinatorError::InvalidRequest(
                "num_days must be positive".into(),
            ));
        }
        if self.tickers.is_empty() {
            return Err(CoordinatorError::InvalidRequest(
                "tickers must not be empty".into(),
            ));
        }
        if self.day_duration_seconds == Some(0) {
            return Err(CoordinatorError::InvalidRequest(
                "day_duration_seconds must be positive".into(),
            ));
        }
        Ok(())
    }
}
