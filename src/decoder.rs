//! Typed decoding of client push traffic.
//!
//! The subscription delivers every JSON API event the client emits. Only two
//! resources matter to us; everything else is dropped without logging. The
//! decoder produces full snapshots — diffing against prior state is the
//! draft model's job, not ours.

use serde::{Deserialize, Serialize};

use crate::lcu_websocket::LcuEvent;
use crate::state::GameflowPhase;
use crate::{AppError, Result};

/// Event URIs the agent consumes.
pub mod uris {
    /// Gameflow phase changes (lobby, champ select, in game, etc.)
    pub const GAMEFLOW_PHASE: &str = "/lol-gameflow/v1/gameflow-phase";
    /// Champ select session snapshots
    pub const CHAMP_SELECT_SESSION: &str = "/lol-champ-select/v1/session";
}

/// A decoded domain event.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    PhaseChanged(GameflowPhase),
    ChampSelectSnapshot(Box<ChampSelectSession>),
}

/// Full champion select snapshot as pushed by the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChampSelectSession {
    pub game_id: Option<i64>,
    /// -1 until the client has told us which cell is ours.
    #[serde(default = "unknown_cell_id")]
    pub local_player_cell_id: i64,
    pub my_team: Vec<CellSelection>,
    pub their_team: Vec<CellSelection>,
    /// Action groups in draft order; inner lists run concurrently.
    pub actions: Vec<Vec<SelectAction>>,
    pub bans: BanState,
}

fn unknown_cell_id() -> i64 {
    -1
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CellSelection {
    pub cell_id: i64,
    /// 0 until a champion is on the cell.
    pub champion_id: u32,
    pub champion_pick_intent: u32,
    pub assigned_position: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectAction {
    pub id: i64,
    pub actor_cell_id: i64,
    pub champion_id: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub completed: bool,
    pub is_in_progress: bool,
}

impl SelectAction {
    pub fn is_completed_pick(&self) -> bool {
        self.kind == "pick" && self.completed && self.champion_id != 0
    }

    pub fn is_completed_ban(&self) -> bool {
        self.kind == "ban" && self.completed && self.champion_id != 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BanState {
    pub my_team_bans: Vec<u32>,
    pub their_team_bans: Vec<u32>,
}

/// Decode one pushed event. `Ok(None)` means the event is not ours.
pub fn decode(event: &LcuEvent) -> Result<Option<Event>> {
    match event.uri.as_str() {
        uris::GAMEFLOW_PHASE => {
            let phase = event
                .data
                .as_str()
                .ok_or_else(|| AppError::Decode("gameflow phase payload is not a string".into()))?;
            Ok(Some(Event::PhaseChanged(GameflowPhase::from(phase))))
        }
        uris::CHAMP_SELECT_SESSION => {
            // The resource is deleted when champion select ends; the phase
            // event carries that transition, so a Delete is not a snapshot.
            if event.event_type == "Delete" || event.data.is_null() {
                return Ok(None);
            }
            let session: ChampSelectSession = serde_json::from_value(event.data.clone())
                .map_err(|e| AppError::Decode(format!("champ select session: {e}")))?;
            Ok(Some(Event::ChampSelectSnapshot(Box::new(session))))
        }
        _ => Ok(None),
    }
}
