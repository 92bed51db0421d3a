//! Client lifecycle tracking.
//!
//! [`GameflowPhase`] mirrors the strings the client reports at
//! `/lol-gameflow/v1/gameflow-phase`. [`PhaseMachine`] folds those reports
//! into the agent's five-state lifecycle and owns session identity; phase
//! reports that do not correspond to a legal transition are treated as noise
//! and discarded.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// The phase reported by the client.
///
/// Unknown strings map to `None` so a client update cannot wedge the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum GameflowPhase {
    #[default]
    None,
    Lobby,
    Matchmaking,
    ReadyCheck,
    ChampSelect,
    GameStart,
    FailedToLaunch,
    InProgress,
    Reconnect,
    WaitingForStats,
    PreEndOfGame,
    EndOfGame,
    TerminatedInError,
}

impl GameflowPhase {
    pub fn is_in_game(&self) -> bool {
        matches!(
            self,
            GameflowPhase::InProgress | GameflowPhase::Reconnect | GameflowPhase::GameStart
        )
    }

    pub fn is_queue(&self) -> bool {
        matches!(
            self,
            GameflowPhase::Lobby | GameflowPhase::Matchmaking | GameflowPhase::ReadyCheck
        )
    }

    pub fn is_post_game(&self) -> bool {
        matches!(
            self,
            GameflowPhase::WaitingForStats | GameflowPhase::PreEndOfGame | GameflowPhase::EndOfGame
        )
    }
}

impl From<&str> for GameflowPhase {
    fn from(s: &str) -> Self {
        match s {
            "Lobby" => GameflowPhase::Lobby,
            "Matchmaking" => GameflowPhase::Matchmaking,
            "ReadyCheck" => GameflowPhase::ReadyCheck,
            "ChampSelect" => GameflowPhase::ChampSelect,
            "GameStart" => GameflowPhase::GameStart,
            "FailedToLaunch" => GameflowPhase::FailedToLaunch,
            "InProgress" => GameflowPhase::InProgress,
            "Reconnect" => GameflowPhase::Reconnect,
            "WaitingForStats" => GameflowPhase::WaitingForStats,
            "PreEndOfGame" => GameflowPhase::PreEndOfGame,
            "EndOfGame" => GameflowPhase::EndOfGame,
            "TerminatedInError" => GameflowPhase::TerminatedInError,
            _ => GameflowPhase::None,
        }
    }
}

/// The agent's own lifecycle, coarser than the client's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentPhase {
    #[default]
    Idle,
    InQueue,
    ChampSelect,
    InGame,
    PostGame,
}

/// Identity of one champion-select-to-postgame run.
///
/// The generation bumps on every champion select entry; `client_id` is
/// adopted from the session resource when it carries one, and a mismatch
/// against an adopted id means the client silently started a new session
/// (for example during a transport outage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SessionIdentity {
    pub generation: u64,
    pub client_id: Option<i64>,
}

/// Side effects of an accepted transition, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    /// Champion select entered: reset the draft to this session.
    SessionStarted { session: SessionIdentity },
    /// Picks are frozen, the game is loading.
    GameStart,
    /// The game ended; draft is retained for the post-game grace.
    GameEnd,
    /// Returned to idle; the draft is dropped.
    SessionDropped,
}

#[derive(Debug)]
pub struct PhaseMachine {
    phase: AgentPhase,
    epoch: u32,
    session: SessionIdentity,
}

impl PhaseMachine {
    pub fn new() -> Self {
        Self {
            phase: AgentPhase::Idle,
            epoch: 0,
            session: SessionIdentity::default(),
        }
    }

    pub fn phase(&self) -> AgentPhase {
        self.phase
    }

    /// Bumped on every accepted transition. Trigger fingerprints carry it so
    /// the same feature can fire once per lifecycle stage.
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn session(&self) -> SessionIdentity {
        self.session
    }

    /// Record the client's own id for the current session.
    pub fn adopt_client_session_id(&mut self, id: i64) {
        self.session.client_id = Some(id);
    }

    /// Start a fresh session without a phase change, used when a snapshot
    /// proves the client swapped sessions behind our back.
    pub fn force_new_session(&mut self) -> Lifecycle {
        self.session = SessionIdentity {
            generation: self.session.generation + 1,
            client_id: None,
        };
        self.epoch += 1;
        info!(generation = self.session.generation, "session replaced under us");
        Lifecycle::SessionStarted {
            session: self.session,
        }
    }

    /// Fold one phase report into the machine.
    ///
    /// Re-reports of the current state (as happen during a post-reconnect
    /// resync) are no-ops, which is what keeps a reconnect from resetting
    /// the draft.
    pub fn apply_phase(&mut self, phase: GameflowPhase) -> Vec<Lifecycle> {
        use AgentPhase::*;

        let target = match phase {
            p if p.is_queue() => InQueue,
            GameflowPhase::ChampSelect => ChampSelect,
            p if p.is_in_game() => InGame,
            p if p.is_post_game() => PostGame,
            GameflowPhase::None => Idle,
            // FailedToLaunch / TerminatedInError carry no lifecycle meaning.
            _ => return Vec::new(),
        };

        if target == self.phase {
            return Vec::new();
        }

        let effects = match (self.phase, target) {
            (_, ChampSelect) => {
                self.session = SessionIdentity {
                    generation: self.session.generation + 1,
                    client_id: None,
                };
                vec![Lifecycle::SessionStarted {
                    session: self.session,
                }]
            }
            (ChampSelect, InGame) => vec![Lifecycle::GameStart],
            (_, PostGame) => vec![Lifecycle::GameEnd],
            (_, Idle) => vec![Lifecycle::SessionDropped],
            (Idle, InQueue) => Vec::new(),
            // Everything else is noise from a client state we did not see
            // the path into; ignore it rather than guess.
            _ => {
                debug!(from = ?self.phase, report = ?phase, "discarding impossible transition");
                return Vec::new();
            }
        };

        debug!(from = ?self.phase, to = ?target, "phase transition");
        self.phase = target;
        self.epoch += 1;
        effects
    }
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self::new()
    }
}
