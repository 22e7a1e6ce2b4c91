//! HTTP surface of the classroom session coordinator.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::env;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use market_data::MarketStore;
use room_registry::{CoordinatorDb, RoomRegistry, SessionManager};
use session_core::CoordinatorError;

pub mod player_routes;
pub mod room_routes;
pub mod timer_driver;

pub use player_routes::player_routes;
pub use room_routes::room_routes;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    pub sessions: Arc<SessionManager>,
    pub market: Arc<MarketStore>,
}

impl AppState {
    pub fn new(db: CoordinatorDb) -> Self {
        let market = Arc::new(MarketStore::new(db.pool().clone()));
        let registry = Arc::new(RoomRegistry::new(db.clone()));
        let sessions = Arc::new(SessionManager::new(db, market.clone()));
        Self {
            registry,
            sessions,
            market,
        }
    }
}

/// Uniform JSON envelope for every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
        }
    }

    pub fn error(kind: &'static str, message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            error_kind: Some(kind),
        }
    }
}

/// Route-level error: domain kinds map to client statuses, everything else is
/// logged and masked as a 503.
pub enum AppError {
    Domain(CoordinatorError),
    Internal(anyhow::Error),
}

impl From<CoordinatorError> for AppError {
    fn from(err: CoordinatorError) -> Self {
        AppError::Domain(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

pub(crate) fn status_for(err: &CoordinatorError) -> StatusCode {
    match err {
        CoordinatorError::RoomNotFound(_) => StatusCode::NOT_FOUND,
        CoordinatorError::RoomFinished(_)
        | CoordinatorError::RoomInProgress(_)
        | CoordinatorError::InvalidTransition(_) => StatusCode::CONFLICT,
        CoordinatorError::NotAuthorized(_) => StatusCode::FORBIDDEN,
        CoordinatorError::InsufficientData { .. }
        | CoordinatorError::MarketsClosed(_)
        | CoordinatorError::RecommendationBlocked(..)
        | CoordinatorError::InsufficientCash { .. }
        | CoordinatorError::InsufficientShares { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        CoordinatorError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        CoordinatorError::Database(_)
        | CoordinatorError::Serialization(_)
        | CoordinatorError::Internal(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            AppError::Domain(err) if err.is_internal() => {
                tracing::error!("internal fault: {err}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Unavailable",
                    "service temporarily unavailable".to_string(),
                )
            }
            AppError::Domain(err) => (status_for(&err), err.kind(), err.to_string()),
            AppError::Internal(err) => {
                tracing::error!("internal error: {err:#}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Unavailable",
                    "service temporarily unavailable".to_string(),
                )
            }
        };

        (status, Json(ApiResponse::<()>::error(kind, message))).into_response()
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub database_url: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT").unwrap_or_else(|_| "8080".to_string());
        Self {
            bind_addr: format!("{}:{}", host, port),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:tradeclass.db".to_string()),
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(room_routes())
        .merge(player_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "classroom-coordinator",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn init_tracing() {
    let json_logging = env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ServerConfig::from_env();
    tracing::info!("Starting classroom session coordinator");
    tracing::info!("  Bind address: {}", config.bind_addr);
    tracing::info!("  Database: {}", config.database_url);

    let db = CoordinatorDb::new(&config.database_url).await?;
    let state = AppState::new(db);

    // the auto-timer driver lives and dies with the process
    tokio::spawn(timer_driver::run(state.clone()));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("listening on {}", config.bind_addr);
    axum::serve(listener, app(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&CoordinatorError::RoomNotFound("ABC123".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&CoordinatorError::NotAuthorized("nope".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(&CoordinatorError::RecommendationBlocked(
                "MSFT".into(),
                "recommendation is HOLD".into()
            )),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&CoordinatorError::InvalidRequest("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&CoordinatorError::Internal("corrupt".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_api_response_envelope() {
        let ok = ApiResponse::success(42);
        let body = serde_json::to_value(&ok).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"], 42);
        assert!(body.get("error").is_none());

        let err = ApiResponse::<()>::error("RoomNotFound", "Room not found: ABC123".into());
        let body = serde_json::to_value(&err).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error_kind"], "RoomNotFound");
    }
}
