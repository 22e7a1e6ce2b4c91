//! Background actor that advances `sync_auto` rooms when their day timer
//! runs out, so the game keeps moving even if the teacher client is gone.
//!
//! Deadlines are recomputed from the persisted `day_started_at` on every
//! tick; a process restart resumes exactly where the database says it
//! should. The advance itself re-validates the deadline under the room lock,
//! so a tick racing a teacher command or a `set-timer` re-anchor is a no-op.

use std::time::Duration;
use tokio::time::MissedTickBehavior;

use room_registry::Initiator;

use crate::AppState;

const TICK_INTERVAL: Duration = Duration::from_secs(1);

pub async fn run(state: AppState) {
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!("auto-timer driver started");

    loop {
        interval.tick().await;
        tick_once(&state).await;
    }
}

/// One scan over the due rooms. A failing room is logged and skipped; the
/// scan keeps going.
pub async fn tick_once(state: &AppState) -> usize {
    let due = match state.sessions.expired_auto_rooms().await {
        Ok(due) => due,
        Err(err) => {
            tracing::error!("timer scan failed: {err}");
            return 0;
        }
    };

    let mut advanced = 0;
    for code in due {
        match state
            .sessions
            .advance_day(&code, Initiator::System, None)
            .await
        {
            Ok(room) => {
                advanced += 1;
                tracing::info!(room = %code, day = room.current_day, "auto-advanced day");
            }
            Err(err) => {
                tracing::warn!(room = %code, "auto-advance failed: {err}");
            }
        }
    }
    advanced
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use room_registry::{CoordinatorDb, CreateRoomRequest};
    use serde_json::json;
    use session_core::{GameMode, RoomStatus};

    async fn seed_week(db: &CoordinatorDb) {
        for (i, date) in [
            "2025-03-03",
            "2025-03-04",
            "2025-03-05",
            "2025-03-06",
            "2025-03-07",
        ]
        .iter()
        .enumerate()
        {
            let open = 100.0 + i as f64;
            sqlx::query(
                "INSERT INTO price_bars (ticker, date, open, high, low, close, volume) \
                 VALUES ('AAPL', ?, ?, ?, ?, ?, 1000)",
            )
            .bind(date)
            .bind(open)
            .bind(open + 2.0)
            .bind(open - 1.0)
            .bind(open + 1.0)
            .execute(db.pool())
            .await
            .unwrap();
        }
    }

    #[tokio::test]
    async fn test_timer_fires_without_teacher() {
        let db = CoordinatorDb::in_memory().await.unwrap();
        seed_week(&db).await;
        let state = AppState::new(db);

        let room = state
            .registry
            .create(CreateRoomRequest {
                created_by: "teacher".to_string(),
                room_name: None,
                config: json!({
                    "num_days": 3,
                    "tickers": ["AAPL"],
                }),
                start_date: Some(chrono::NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()),
                end_date: Some(chrono::NaiveDate::from_ymd_opt(2025, 3, 5).unwrap()),
                game_mode: GameMode::SyncAuto,
                day_duration_seconds: Some(300),
            })
            .await
            .unwrap();
        state.sessions.start(&room.room_code, "teacher").await.unwrap();

        // nothing due while the day clock is fresh
        assert_eq!(tick_once(&state).await, 0);
        let snapshot = state.sessions.room_state(&room.room_code).await.unwrap();
        assert_eq!(snapshot.current_day, 0);

        // rewind the persisted clock past the deadline, as if 300s elapsed
        let past = (Utc::now() - chrono::Duration::seconds(301)).to_rfc3339();
        sqlx::query("UPDATE rooms SET day_started_at = ? WHERE id = ?")
            .bind(&past)
            .bind(&room.id)
            .execute(state.registry.db().pool())
            .await
            .unwrap();

        assert_eq!(tick_once(&state).await, 1);
        let snapshot = state.sessions.room_state(&room.room_code).await.unwrap();
        assert_eq!(snapshot.current_day, 1);
        assert_eq!(snapshot.status, RoomStatus::InProgress);

        // the advance re-anchored the clock; the next tick is quiet
        assert_eq!(tick_once(&state).await, 0);
    }
}
