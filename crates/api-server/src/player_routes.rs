use axum::{
    extract::{Path, State},
    routing::{post, put},
    Json, Router,
};

use room_registry::{Player, UpdatePlayerState};

use crate::{ApiResponse, AppError, AppState};

pub fn player_routes() -> Router<AppState> {
    Router::new()
        .route("/players/:id", put(update_player_state))
        .route("/players/:id/ready", post(mark_ready))
}

/// Async-mode sync path: the client pushes its full post-day state and the
/// server applies it last-writer-wins. In sync modes the room's day stays
/// authoritative.
async fn update_player_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdatePlayerState>,
) -> Result<Json<ApiResponse<Player>>, AppError> {
    let player = state.sessions.update_player_state(&id, body).await?;
    Ok(Json(ApiResponse::success(player)))
}

async fn mark_ready(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Player>>, AppError> {
    let player = state.sessions.mark_ready(&id).await?;
    Ok(Json(ApiResponse::success(player)))
}
