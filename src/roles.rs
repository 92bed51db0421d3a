//! Lane assignment.
//!
//! Champion select only reports a lane for allies (and only in modes with
//! assigned positions). Everything else is inferred from the per-champion
//! lane-aptitude table in the registry, with pick order as a tie-breaker.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::registry::LaneAptitude;

/// One of the five logical positions, or `Unknown` when no confident
/// assignment exists yet.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Top,
    Jungle,
    Middle,
    Bottom,
    Support,
    #[default]
    Unknown,
}

impl Role {
    /// The five lanes in logical row order (top = 0 .. support = 4).
    pub const LANES: [Role; 5] = [
        Role::Top,
        Role::Jungle,
        Role::Middle,
        Role::Bottom,
        Role::Support,
    ];

    /// Row index for a known lane.
    pub fn row(self) -> Option<usize> {
        match self {
            Role::Top => Some(0),
            Role::Jungle => Some(1),
            Role::Middle => Some(2),
            Role::Bottom => Some(3),
            Role::Support => Some(4),
            Role::Unknown => None,
        }
    }

    pub fn from_row(row: usize) -> Role {
        Role::LANES.get(row).copied().unwrap_or(Role::Unknown)
    }

    /// Map the client's `assignedPosition` strings. The client says
    /// `utility` where everyone else says support.
    pub fn from_client_position(position: &str) -> Role {
        match position.to_ascii_lowercase().as_str() {
            "top" => Role::Top,
            "jungle" => Role::Jungle,
            "middle" | "mid" => Role::Middle,
            "bottom" | "bot" => Role::Bottom,
            "utility" | "support" => Role::Support,
            _ => Role::Unknown,
        }
    }

    pub fn is_known(self) -> bool {
        self != Role::Unknown
    }
}

/// Pick a lane for a champion among the rows not yet occupied.
///
/// The aptitude table dominates; pick order nudges near-ties (earlier picks
/// toward the solo lanes, later picks toward the bottom half). Equal scores
/// resolve to the lower row index. Returns `Unknown` when there is no
/// aptitude data or every free lane has zero weight.
pub fn infer_lane(aptitude: Option<&LaneAptitude>, pick_order: u8, occupied: [bool; 5]) -> Role {
    let Some(aptitude) = aptitude else {
        return Role::Unknown;
    };

    let mut best: Option<(Role, u16)> = None;
    for (row, role) in Role::LANES.iter().enumerate() {
        if occupied[row] {
            continue;
        }
        let weight = aptitude.get(*role);
        if weight == 0 {
            continue;
        }
        let score = u16::from(weight) * 10 + order_bias(*role, pick_order);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((*role, score));
        }
    }

    best.map(|(role, _)| role).unwrap_or(Role::Unknown)
}

fn order_bias(role: Role, pick_order: u8) -> u16 {
    let early = pick_order <= 2;
    match role {
        Role::Top | Role::Jungle => {
            if early {
                2
            } else {
                0
            }
        }
        Role::Bottom | Role::Support => {
            if early {
                0
            } else {
                2
            }
        }
        _ => 1,
    }
}
