use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use session_core::CoordinatorError;

const SCHEMA: &str = include_str!("../../../schema.sql");

/// Shared sqlite handle behind rooms, players and the market data tables.
///
/// WAL mode keeps the ~1 Hz room-state polls readable while an advance-day
/// transaction is in flight.
#[derive(Clone)]
pub struct CoordinatorDb {
    pool: SqlitePool,
}

impl CoordinatorDb {
    /// Open the database at `database_url`, creating the file and applying
    /// the DDL on first boot.
    pub async fn new(database_url: &str) -> Result<Self, CoordinatorError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| {
                CoordinatorError::Internal(format!(
                    "unusable database url {}: {}",
                    database_url, e
                ))
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        Self::connect(options, 5).await
    }

    /// Throwaway database for tests, capped at a single connection so every
    /// query lands on the same sqlite memory instance.
    pub async fn in_memory() -> Result<Self, CoordinatorError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| CoordinatorError::Internal(e.to_string()))?;

        Self::connect(options, 1).await
    }

    async fn connect(
        options: SqliteConnectOptions,
        max_connections: u32,
    ) -> Result<Self, CoordinatorError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        // the DDL is all IF NOT EXISTS, so re-applying on every boot is fine
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_applies_on_connect() {
        let db = CoordinatorDb::in_memory().await.unwrap();

        let (rooms,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rooms")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(rooms, 0);

        let (players,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM players")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(players, 0);
    }
}
