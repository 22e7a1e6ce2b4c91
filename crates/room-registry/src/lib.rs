//! Room and player persistence plus the session state machine.
//!
//! Everything that mutates a room goes through `SessionManager`, which
//! serializes writers on a per-room lock and a sqlite transaction. The
//! `RoomRegistry` owns creation, joining and the read paths.

pub mod db;
pub mod models;
pub mod query;
pub mod registry;
pub mod session;

pub use db::CoordinatorDb;
pub use models::{Player, Room, RoomSummary};
pub use query::{LeaderboardEntry, RoomState, UpdatePlayerState};
pub use registry::{CreateRoomRequest, RoomRegistry};
pub use session::{Initiator, SessionManager};
