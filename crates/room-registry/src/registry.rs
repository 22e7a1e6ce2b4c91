use chrono::{Duration, NaiveDate, Utc};
use rand::Rng;
use serde_json::Value;

use session_core::{CoordinatorError, GameConfig, GameMode, RoomStatus};

use crate::db::CoordinatorDb;
use crate::models::{
    fmt_date, fmt_ts, fmt_ts_opt, Player, PlayerRow, Room, RoomRow, RoomSummary,
};

const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_LEN: usize = 6;
const CODE_ATTEMPTS: usize = 64;

/// Body of the create-room command after HTTP decoding.
#[derive(Debug, Clone)]
pub struct CreateRoomRequest {
    pub created_by: String,
    pub room_name: Option<String>,
    pub config: Value,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub game_mode: GameMode,
    pub day_duration_seconds: Option<u64>,
}

/// Creation, joining and the plain read paths over rooms and players.
#[derive(Clone)]
pub struct RoomRegistry {
    db: CoordinatorDb,
}

impl RoomRegistry {
    pub fn new(db: CoordinatorDb) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &CoordinatorDb {
        &self.db
    }

    /// Create a room in `waiting` with a fresh unique code.
    pub async fn create(&self, request: CreateRoomRequest) -> Result<Room, CoordinatorError> {
        if request.created_by.trim().is_empty() {
            return Err(CoordinatorError::InvalidRequest(
                "created_by must not be empty".into(),
            ));
        }

        let mut config = GameConfig::from_value(&request.config)?;
        if let Some(seconds) = request.day_duration_seconds {
            if seconds == 0 {
                return Err(CoordinatorError::InvalidRequest(
                    "day_duration_seconds must be positive".into(),
                ));
            }
            config.day_duration_seconds = Some(seconds);
        }
        if request.game_mode == GameMode::SyncAuto && config.day_duration_seconds.is_none() {
            return Err(CoordinatorError::InvalidRequest(
                "sync_auto rooms require day_duration_seconds".into(),
            ));
        }

        let num_days = config.num_days as i64;
        let start_date = request
            .start_date
            .unwrap_or_else(|| Utc::now().date_naive() - Duration::days(num_days));
        let end_date = request
            .end_date
            .unwrap_or(start_date + Duration::days(num_days - 1));
        if end_date < start_date {
            return Err(CoordinatorError::InvalidRequest(
                "end_date precedes start_date".into(),
            ));
        }
        let window_days = (end_date - start_date).num_days() + 1;
        if window_days < num_days {
            return Err(CoordinatorError::InvalidRequest(format!(
                "window holds {} calendar days but num_days is {}",
                window_days, num_days
            )));
        }

        let room_code = self.generate_code().await?;
        let room = Room {
            id: uuid::Uuid::new_v4().to_string(),
            room_code,
            room_name: request.room_name,
            created_by: request.created_by,
            day_time_limit: config.day_duration_seconds.map(|s| s as i64),
            config,
            start_date,
            end_date,
            status: RoomStatus::Waiting,
            game_mode: request.game_mode,
            current_day: 0,
            day_started_at: None,
            ai_benchmark: Default::default(),
            created_at: Utc::now(),
            game_started_at: None,
            game_ended_at: None,
        };

        insert_room(self.db.pool(), &room).await?;
        tracing::info!(
            room = %room.room_code,
            mode = %room.game_mode,
            days = room.config.num_days,
            "room created"
        );
        Ok(room)
    }

    /// Add a player. Sync modes only admit players while the room is still
    /// waiting; async rooms admit them until the game has finished.
    pub async fn join(
        &self,
        room_code: &str,
        player_name: String,
        player_email: Option<String>,
    ) -> Result<Player, CoordinatorError> {
        if player_name.trim().is_empty() {
            return Err(CoordinatorError::InvalidRequest(
                "player_name must not be empty".into(),
            ));
        }

        let room = self.get(room_code).await?;
        match room.status {
            RoomStatus::Finished => {
                return Err(CoordinatorError::RoomFinished(room.room_code));
            }
            RoomStatus::InProgress if room.game_mode.is_sync() => {
                return Err(CoordinatorError::RoomInProgress(room.room_code));
            }
            _ => {}
        }

        let player = Player::new(&room, player_name, player_email);
        insert_player(self.db.pool(), &player).await?;
        tracing::info!(room = %room.room_code, player = %player.player_name, "player joined");
        Ok(player)
    }

    /// Case-insensitive lookup; live rooms shadow finished ones that carried
    /// the same code.
    pub async fn get(&self, room_code: &str) -> Result<Room, CoordinatorError> {
        let code = room_code.trim().to_uppercase();
        fetch_room_by_code(self.db.pool(), &code)
            .await?
            .ok_or(CoordinatorError::RoomNotFound(code))
    }

    pub async fn list(
        &self,
        status: Option<RoomStatus>,
    ) -> Result<Vec<RoomSummary>, CoordinatorError> {
        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, RoomRow>(
                    "SELECT * FROM rooms WHERE status = ? ORDER BY created_at DESC",
                )
                .bind(status.to_string())
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, RoomRow>("SELECT * FROM rooms ORDER BY created_at DESC")
                    .fetch_all(self.db.pool())
                    .await?
            }
        };

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let room = Room::try_from(row)?;
            let (player_count,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM players WHERE room_id = ?")
                    .bind(&room.id)
                    .fetch_one(self.db.pool())
                    .await?;
            summaries.push(RoomSummary {
                room_code: room.room_code,
                room_name: room.room_name,
                created_by: room.created_by,
                status: room.status,
                game_mode: room.game_mode,
                current_day: room.current_day,
                num_days: room.config.num_days as i64,
                player_count,
                created_at: room.created_at,
            });
        }
        Ok(summaries)
    }

    pub async fn get_player(&self, player_id: &str) -> Result<Player, CoordinatorError> {
        fetch_player(self.db.pool(), player_id)
            .await?
            .ok_or_else(|| {
                CoordinatorError::InvalidRequest(format!("unknown player: {}", player_id))
            })
    }

    pub async fn players(&self, room_id: &str) -> Result<Vec<Player>, CoordinatorError> {
        fetch_players_for_room(self.db.pool(), room_id).await
    }

    /// Teacher commands are only honored from the room creator.
    pub fn verify_teacher(room: &Room, caller: &str) -> Result<(), CoordinatorError> {
        if room.created_by != caller.trim() {
            return Err(CoordinatorError::NotAuthorized(format!(
                "{} is not the creator of room {}",
                caller, room.room_code
            )));
        }
        Ok(())
    }

    /// Rejection sampling over 6-char uppercase alphanumerics until the code
    /// is free among non-finished rooms.
    async fn generate_code(&self) -> Result<String, CoordinatorError> {
        for _ in 0..CODE_ATTEMPTS {
            let code: String = {
                let mut rng = rand::rng();
                (0..CODE_LEN)
                    .map(|_| CODE_CHARSET[rng.random_range(0..CODE_CHARSET.len())] as char)
                    .collect()
            };

            let (in_use,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM rooms WHERE room_code = ? AND status != 'finished'",
            )
            .bind(&code)
            .fetch_one(self.db.pool())
            .await?;

            if in_use == 0 {
                return Ok(code);
            }
        }
        Err(CoordinatorError::Internal(
            "could not allocate a unique room code".into(),
        ))
    }
}

// --- shared persistence helpers, usable inside a transaction ---------------

pub(crate) async fn fetch_room_by_code<'e, E>(
    executor: E,
    code: &str,
) -> Result<Option<Room>, CoordinatorError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let row = sqlx::query_as::<_, RoomRow>(
        "SELECT * FROM rooms WHERE room_code = ? \
         ORDER BY (status != 'finished') DESC, created_at DESC LIMIT 1",
    )
    .bind(code)
    .fetch_optional(executor)
    .await?;
    row.map(Room::try_from).transpose()
}

pub(crate) async fn fetch_room_by_id<'e, E>(
    executor: E,
    id: &str,
) -> Result<Option<Room>, CoordinatorError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let row = sqlx::query_as::<_, RoomRow>("SELECT * FROM rooms WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    row.map(Room::try_from).transpose()
}

pub(crate) async fn insert_room<'e, E>(executor: E, room: &Room) -> Result<(), CoordinatorError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO rooms (id, room_code, room_name, created_by, config_json, start_date,
                           end_date, status, game_mode, current_day, day_started_at,
                           day_time_limit, ai_benchmark_json, created_at, game_started_at,
                           game_ended_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&room.id)
    .bind(&room.room_code)
    .bind(&room.room_name)
    .bind(&room.created_by)
    .bind(serde_json::to_string(&room.config)?)
    .bind(fmt_date(room.start_date))
    .bind(fmt_date(room.end_date))
    .bind(room.status.to_string())
    .bind(room.game_mode.to_string())
    .bind(room.current_day)
    .bind(fmt_ts_opt(room.day_started_at))
    .bind(room.day_time_limit)
    .bind(serde_json::to_string(&room.ai_benchmark)?)
    .bind(fmt_ts(room.created_at))
    .bind(fmt_ts_opt(room.game_started_at))
    .bind(fmt_ts_opt(room.game_ended_at))
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn update_room<'e, E>(executor: E, room: &Room) -> Result<(), CoordinatorError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        UPDATE rooms
        SET status = ?, current_day = ?, day_started_at = ?, day_time_limit = ?,
            ai_benchmark_json = ?, game_started_at = ?, game_ended_at = ?
        WHERE id = ?
        "#,
    )
    .bind(room.status.to_string())
    .bind(room.current_day)
    .bind(fmt_ts_opt(room.day_started_at))
    .bind(room.day_time_limit)
    .bind(serde_json::to_string(&room.ai_benchmark)?)
    .bind(fmt_ts_opt(room.game_started_at))
    .bind(fmt_ts_opt(room.game_ended_at))
    .bind(&room.id)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn fetch_player<'e, E>(
    executor: E,
    id: &str,
) -> Result<Option<Player>, CoordinatorError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let row = sqlx::query_as::<_, PlayerRow>("SELECT * FROM players WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    row.map(Player::try_from).transpose()
}

pub(crate) async fn fetch_players_for_room<'e, E>(
    executor: E,
    room_id: &str,
) -> Result<Vec<Player>, CoordinatorError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let rows = sqlx::query_as::<_, PlayerRow>(
        "SELECT * FROM players WHERE room_id = ? ORDER BY joined_at",
    )
    .bind(room_id)
    .fetch_all(executor)
    .await?;
    rows.into_iter().map(Player::try_from).collect()
}

pub(crate) async fn insert_player<'e, E>(
    executor: E,
    player: &Player,
) -> Result<(), CoordinatorError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO players (id, room_id, player_name, player_email, current_day, cash,
                             holdings_json, trades_json, history_json, portfolio_value,
                             score, grade, breakdown_json, is_ready, last_sync_day,
                             is_finished, ai_shadow_json, joined_at, updated_at,
                             game_ended_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&player.id)
    .bind(&player.room_id)
    .bind(&player.player_name)
    .bind(&player.player_email)
    .bind(player.current_day)
    .bind(player.cash)
    .bind(serde_json::to_string(&player.holdings)?)
    .bind(serde_json::to_string(&player.trades)?)
    .bind(serde_json::to_string(&player.portfolio_history)?)
    .bind(player.portfolio_value)
    .bind(player.score)
    .bind(&player.grade)
    .bind(serde_json::to_string(&player.score_breakdown)?)
    .bind(player.is_ready)
    .bind(player.last_sync_day)
    .bind(player.is_finished)
    .bind(serde_json::to_string(&player.ai_shadow)?)
    .bind(fmt_ts(player.joined_at))
    .bind(fmt_ts(player.updated_at))
    .bind(fmt_ts_opt(player.game_ended_at))
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn update_player<'e, E>(
    executor: E,
    player: &Player,
) -> Result<(), CoordinatorError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        UPDATE players
        SET current_day = ?, cash = ?, holdings_json = ?, trades_json = ?, history_json = ?,
            portfolio_value = ?, score = ?, grade = ?, breakdown_json = ?, is_ready = ?,
            last_sync_day = ?, is_finished = ?, ai_shadow_json = ?, updated_at = ?,
            game_ended_at = ?
        WHERE id = ?
        "#,
    )
    .bind(player.current_day)
    .bind(player.cash)
    .bind(serde_json::to_string(&player.holdings)?)
    .bind(serde_json::to_string(&player.trades)?)
    .bind(serde_json::to_string(&player.portfolio_history)?)
    .bind(player.portfolio_value)
    .bind(player.score)
    .bind(&player.grade)
    .bind(serde_json::to_string(&player.score_breakdown)?)
    .bind(player.is_ready)
    .bind(player.last_sync_day)
    .bind(player.is_finished)
    .bind(serde_json::to_string(&player.ai_shadow)?)
    .bind(fmt_ts(player.updated_at))
    .bind(fmt_ts_opt(player.game_ended_at))
    .bind(&player.id)
    .execute(executor)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn setup() -> RoomRegistry {
        let db = CoordinatorDb::in_memory().await.unwrap();
        RoomRegistry::new(db)
    }

    fn create_request(mode: GameMode) -> CreateRoomRequest {
        CreateRoomRequest {
            created_by: "ms-rivera".to_string(),
            room_name: Some("Period 3".to_string()),
            config: json!({
                "initial_cash": 100000.0,
                "num_days": 5,
                "tickers": ["AAPL", "MSFT"],
                "difficulty": "medium",
            }),
            start_date: None,
            end_date: None,
            game_mode: mode,
            day_duration_seconds: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_room() {
        let registry = setup().await;
        let room = registry.create(create_request(GameMode::Sync)).await.unwrap();

        assert_eq!(room.room_code.len(), 6);
        assert!(room
            .room_code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        assert_eq!(room.status, RoomStatus::Waiting);
        assert_eq!(room.current_day, 0);

        // case-insensitive lookup
        let fetched = registry.get(&room.room_code.to_lowercase()).await.unwrap();
        assert_eq!(fetched.id, room.id);
    }

    #[tokio::test]
    async fn test_sync_auto_requires_timer() {
        let registry = setup().await;
        let err = registry
            .create(create_request(GameMode::SyncAuto))
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidRequest(_)));

        let mut request = create_request(GameMode::SyncAuto);
        request.day_duration_seconds = Some(30);
        let room = registry.create(request).await.unwrap();
        assert_eq!(room.day_time_limit, Some(30));
    }

    #[tokio::test]
    async fn test_join_creates_funded_player() {
        let registry = setup().await;
        let room = registry.create(create_request(GameMode::Sync)).await.unwrap();

        let player = registry
            .join(&room.room_code, "sam".to_string(), None)
            .await
            .unwrap();
        assert_eq!(player.cash, 100_000.0);
        assert_eq!(player.portfolio_value, 100_000.0);
        assert!(player.holdings.is_empty());
        assert_eq!(player.ai_shadow.cash, 100_000.0);
        assert_eq!(player.current_day, room.current_day);

        let players = registry.players(&room.id).await.unwrap();
        assert_eq!(players.len(), 1);
    }

    #[tokio::test]
    async fn test_join_unknown_room() {
        let registry = setup().await;
        let err = registry
            .join("ZZZZZZ", "sam".to_string(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::RoomNotFound(_)));
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let registry = setup().await;
        registry.create(create_request(GameMode::Sync)).await.unwrap();
        registry.create(create_request(GameMode::Async)).await.unwrap();

        let waiting = registry.list(Some(RoomStatus::Waiting)).await.unwrap();
        assert_eq!(waiting.len(), 2);

        let finished = registry.list(Some(RoomStatus::Finished)).await.unwrap();
        assert!(finished.is_empty());
    }

    #[tokio::test]
    async fn test_verify_teacher() {
        let registry = setup().await;
        let room = registry.create(create_request(GameMode::Sync)).await.unwrap();

        assert!(RoomRegistry::verify_teacher(&room, "ms-rivera").is_ok());
        let err = RoomRegistry::verify_teacher(&room, "impostor").unwrap_err();
        assert!(matches!(err, CoordinatorError::NotAuthorized(_)));
    }

    #[tokio::test]
    async fn test_config_rejects_unknown_shape() {
        let registry = setup().await;
        let mut request = create_request(GameMode::Sync);
        request.config = json!({"num_days": 5});
        let err = registry.create(request).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidRequest(_)));
    }
}
