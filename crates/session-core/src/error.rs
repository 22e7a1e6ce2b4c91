use thiserror::Error;

/// Every error kind the coordinator surfaces to clients, plus the internal
/// faults that render as a generic `Unavailable`.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    #[error("Room {0} has already finished")]
    RoomFinished(String),

    #[error("Room {0} is already in progress")]
    RoomInProgress(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Insufficient data: found {found} trading days, required {required}")]
    InsufficientData { found: usize, required: usize },

    #[error("Markets are closed on {0}")]
    MarketsClosed(chrono::NaiveDate),

    #[error("Buying {0} is blocked: {1}")]
    RecommendationBlocked(String, String),

    #[error("Insufficient cash: need ${needed:.2}, have ${available:.2}")]
    InsufficientCash { needed: f64, available: f64 },

    #[error("Insufficient shares of {ticker}: requested {requested}, holding {held}")]
    InsufficientShares {
        ticker: String,
        requested: i64,
        held: i64,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoordinatorError {
    /// Stable kind name surfaced in API error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            CoordinatorError::RoomNotFound(_) => "RoomNotFound",
            CoordinatorError::RoomFinished(_) => "RoomFinished",
            CoordinatorError::RoomInProgress(_) => "RoomInProgress",
            CoordinatorError::InvalidTransition(_) => "InvalidTransition",
            CoordinatorError::NotAuthorized(_) => "NotAuthorized",
            CoordinatorError::InsufficientData { .. } => "InsufficientData",
            CoordinatorError::MarketsClosed(_) => "MarketsClosed",
            CoordinatorError::RecommendationBlocked(..) => "RecommendationBlocked",
            CoordinatorError::InsufficientCash { .. } => "InsufficientCash",
            CoordinatorError::InsufficientShares { .. } => "InsufficientShares",
            CoordinatorError::InvalidRequest(_) => "InvalidRequest",
            CoordinatorError::Database(_)
            | CoordinatorError::Serialization(_)
            | CoordinatorError::Internal(_) => "Unavailable",
        }
    }

    /// Internal faults are logged server-side and surfaced generically.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            CoordinatorError::Database(_)
                | CoordinatorError::Serialization(_)
                | CoordinatorError::Internal(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(
            CoordinatorError::RoomNotFound("ABC123".into()).kind(),
            "RoomNotFound"
        );
        assert_eq!(
            CoordinatorError::InsufficientData {
                found: 2,
                required: 5
            }
            .kind(),
            "InsufficientData"
        );
    }

    #[test]
    fn test_internal_faults_masked() {
        let err: CoordinatorError = serde_json::from_str::<i64>("not json")
            .map_err(CoordinatorError::from)
            .unwrap_err();
        assert!(err.is_internal());
        assert_eq!(err.kind(), "Unavailable");
    }
}
