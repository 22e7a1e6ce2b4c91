use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;

use room_registry::{CreateRoomRequest, Initiator, LeaderboardEntry, Player, Room, RoomState, RoomSummary};
use session_core::{GameMode, RoomStatus};

use crate::{ApiResponse, AppError, AppState};

#[derive(Deserialize)]
pub struct CreateRoomBody {
    pub created_by: String,
    pub room_name: Option<String>,
    pub config: serde_json::Value,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub game_mode: GameMode,
    pub day_duration_seconds: Option<u64>,
}

#[derive(Deserialize)]
pub struct JoinRoomBody {
    pub room_code: String,
    pub player_name: String,
    pub player_email: Option<String>,
}

#[derive(Deserialize)]
pub struct ListRoomsQuery {
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct StartBody {
    pub started_by: String,
}

#[derive(Deserialize)]
pub struct AdvanceDayBody {
    pub initiated_by: String,
    pub day_time_limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct EndGameBody {
    pub ended_by: String,
}

#[derive(Deserialize)]
pub struct SetTimerBody {
    pub duration_seconds: i64,
    pub set_by: Option<String>,
}

pub fn room_routes() -> Router<AppState> {
    Router::new()
        .route("/rooms", post(create_room).get(list_rooms))
        .route("/rooms/join", post(join_room))
        .route("/rooms/:code", get(get_room))
        .route("/rooms/:code/state", get(get_room_state))
        .route("/rooms/:code/leaderboard", get(get_leaderboard))
        .route("/rooms/:code/start", post(start_room))
        .route("/rooms/:code/advance-day", post(advance_day))
        .route("/rooms/:code/end-game", post(end_game))
        .route("/rooms/:code/set-timer", post(set_timer))
}

async fn create_room(
    State(state): State<AppState>,
    Json(body): Json<CreateRoomBody>,
) -> Result<(StatusCode, Json<ApiResponse<Room>>), AppError> {
    let room = state
        .registry
        .create(CreateRoomRequest {
            created_by: body.created_by,
            room_name: body.room_name,
            config: body.config,
            start_date: body.start_date,
            end_date: body.end_date,
            game_mode: body.game_mode,
            day_duration_seconds: body.day_duration_seconds,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(room))))
}

async fn join_room(
    State(state): State<AppState>,
    Json(body): Json<JoinRoomBody>,
) -> Result<(StatusCode, Json<ApiResponse<Player>>), AppError> {
    let player = state
        .registry
        .join(&body.room_code, body.player_name, body.player_email)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(player))))
}

async fn get_room(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<ApiResponse<Room>>, AppError> {
    let room = state.registry.get(&code).await?;
    Ok(Json(ApiResponse::success(room)))
}

async fn list_rooms(
    State(state): State<AppState>,
    Query(query): Query<ListRoomsQuery>,
) -> Result<Json<ApiResponse<Vec<RoomSummary>>>, AppError> {
    let status = query
        .status
        .as_deref()
        .map(|s| s.parse::<RoomStatus>())
        .transpose()?;

    let rooms = state.registry.list(status).await?;
    Ok(Json(ApiResponse::success(rooms)))
}

async fn get_room_state(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<ApiResponse<RoomState>>, AppError> {
    let snapshot = state.sessions.room_state(&code).await?;
    Ok(Json(ApiResponse::success(snapshot)))
}

async fn get_leaderboard(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<ApiResponse<Vec<LeaderboardEntry>>>, AppError> {
    let board = state.sessions.leaderboard(&code).await?;
    Ok(Json(ApiResponse::success(board)))
}

async fn start_room(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(body): Json<StartBody>,
) -> Result<Json<ApiResponse<Room>>, AppError> {
    let room = state.sessions.start(&code, &body.started_by).await?;
    Ok(Json(ApiResponse::success(room)))
}

async fn advance_day(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(body): Json<AdvanceDayBody>,
) -> Result<Json<ApiResponse<Room>>, AppError> {
    let room = state
        .sessions
        .advance_day(
            &code,
            Initiator::Teacher(&body.initiated_by),
            body.day_time_limit,
        )
        .await?;
    Ok(Json(ApiResponse::success(room)))
}

async fn end_game(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(body): Json<EndGameBody>,
) -> Result<Json<ApiResponse<Room>>, AppError> {
    let room = state.sessions.end_game(&code, &body.ended_by).await?;
    Ok(Json(ApiResponse::success(room)))
}

async fn set_timer(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(body): Json<SetTimerBody>,
) -> Result<Json<ApiResponse<Room>>, AppError> {
    let room = state
        .sessions
        .set_timer(&code, body.set_by.as_deref(), body.duration_seconds)
        .await?;
    Ok(Json(ApiResponse::success(room)))
}
