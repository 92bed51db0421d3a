//! The canonical picture of the current draft.
//!
//! Snapshots from the client are noisy and partial: hovers come and go,
//! action groups repeat, and a reconnect replays everything from scratch.
//! The draft model folds each snapshot in additively — a committed pick is
//! never unset by a later empty or partial snapshot; only a new session
//! clears entries.
//!
//! Ally and enemy rows are kept in logical lane order (0 = top .. 4 =
//! support), not raw cell order. Allies land in the lane the client assigns
//! them; enemies are placed by lane aptitude since the client never tells us
//! their positions.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use tracing::debug;

use crate::decoder::ChampSelectSession;
use crate::registry::{ChampionId, RegistryData};
use crate::roles::{infer_lane, Role};
use crate::state::SessionIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    Ally,
    Enemy,
}

/// One cell's champion choice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pick {
    pub cell_id: i64,
    /// `None` until a champion is hovered or committed on the cell. Only
    /// meaningful as a commitment once `completed` is true.
    pub champion: Option<ChampionId>,
    pub team: Team,
    /// 1-based position within the team's cell list.
    pub pick_order: u8,
    pub is_local_player: bool,
    pub completed: bool,
    pub assigned_lane: Role,
}

/// New facts produced by folding one snapshot, in detection order.
#[derive(Debug, Clone, PartialEq)]
pub enum DraftChange {
    /// The local player is hovering a champion they have not committed.
    LocalHover { champion: ChampionId },
    /// A pick action completed.
    PickCompleted {
        team: Team,
        champion: ChampionId,
        by_local: bool,
    },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DraftState {
    pub session: SessionIdentity,
    pub local_cell_id: Option<i64>,
    pub allies: [Option<Pick>; 5],
    pub enemies: [Option<Pick>; 5],
    pub bans: BTreeSet<ChampionId>,
    #[serde(skip)]
    last_local_hover: Option<ChampionId>,
    #[serde(skip)]
    fresh: bool,
}

impl DraftState {
    /// Clear everything and bind to a new session.
    pub fn reset(&mut self, session: SessionIdentity) {
        *self = DraftState {
            session,
            fresh: true,
            ..DraftState::default()
        };
    }

    /// True until the first snapshot of the session has been applied.
    pub fn is_new_session(&self) -> bool {
        self.fresh
    }

    pub fn local_pick(&self) -> Option<&Pick> {
        self.allies
            .iter()
            .flatten()
            .find(|pick| pick.is_local_player)
    }

    /// The committed enemy occupying `lane`, if any.
    pub fn opposing_pick_in_lane(&self, lane: Role) -> Option<&Pick> {
        if !lane.is_known() {
            return None;
        }
        self.enemies
            .iter()
            .flatten()
            .find(|pick| pick.completed && pick.champion.is_some() && pick.assigned_lane == lane)
    }

    /// First enemy champion visible on a cell but not yet committed.
    pub fn pending_enemy_hover(&self) -> Option<ChampionId> {
        self.enemies
            .iter()
            .flatten()
            .find(|pick| !pick.completed)
            .and_then(|pick| pick.champion)
    }

    pub fn completed_enemies(&self) -> impl Iterator<Item = &Pick> {
        self.enemies
            .iter()
            .flatten()
            .filter(|pick| pick.completed && pick.champion.is_some())
    }

    /// Fold one snapshot in. Returns only the facts that are new relative to
    /// the current state, so re-applying a snapshot yields nothing.
    pub fn apply_snapshot(
        &mut self,
        snapshot: &ChampSelectSession,
        registry: &RegistryData,
    ) -> Vec<DraftChange> {
        let mut changes = Vec::new();
        self.fresh = false;

        if snapshot.local_player_cell_id >= 0 {
            self.local_cell_id = Some(snapshot.local_player_cell_id);
        }

        // Committed actions are the only thing that moves a pick from hover
        // to committed.
        let mut committed: HashMap<i64, ChampionId> = HashMap::new();
        let mut local_action_hover = None;
        for action in snapshot.actions.iter().flatten() {
            if action.is_completed_pick() {
                committed.insert(action.actor_cell_id, ChampionId(action.champion_id));
            } else if action.is_completed_ban() {
                self.record_ban(ChampionId(action.champion_id));
            } else if action.kind == "pick"
                && action.is_in_progress
                && action.champion_id != 0
                && Some(action.actor_cell_id) == self.local_cell_id
            {
                local_action_hover = Some(ChampionId(action.champion_id));
            }
        }
        for id in snapshot
            .bans
            .my_team_bans
            .iter()
            .chain(&snapshot.bans.their_team_bans)
        {
            if *id != 0 {
                self.record_ban(ChampionId(*id));
            }
        }

        // Exactly one ally may carry the local flag, even across noise that
        // moves the local cell id.
        let local_cell = self.local_cell_id;
        for pick in self.allies.iter_mut().flatten() {
            pick.is_local_player = Some(pick.cell_id) == local_cell;
        }

        for (index, cell) in snapshot.my_team.iter().enumerate() {
            self.merge_member(Team::Ally, index, cell, &committed, registry, &mut changes);
        }
        for (index, cell) in snapshot.their_team.iter().enumerate() {
            self.merge_member(Team::Enemy, index, cell, &committed, registry, &mut changes);
        }

        self.detect_local_hover(snapshot, local_action_hover, &mut changes);

        changes
    }

    fn merge_member(
        &mut self,
        team: Team,
        index: usize,
        cell: &crate::decoder::CellSelection,
        committed: &HashMap<i64, ChampionId>,
        registry: &RegistryData,
        changes: &mut Vec<DraftChange>,
    ) {
        let pick_order = (index + 1).min(5) as u8;
        let snapshot_lane = match team {
            Team::Ally => Role::from_client_position(&cell.assigned_position),
            Team::Enemy => Role::Unknown,
        };

        let mut row = match self.row_of_cell(team, cell.cell_id) {
            Some(row) => row,
            None => {
                let preferred = snapshot_lane
                    .row()
                    .filter(|&r| self.rows(team)[r].is_none());
                let Some(row) = preferred.or_else(|| self.first_empty_row(team)) else {
                    debug!(?team, cell = cell.cell_id, "no free row for cell");
                    return;
                };
                self.rows_mut(team)[row] = Some(Pick {
                    cell_id: cell.cell_id,
                    champion: None,
                    team,
                    pick_order,
                    is_local_player: team == Team::Ally
                        && Some(cell.cell_id) == self.local_cell_id,
                    completed: false,
                    assigned_lane: snapshot_lane,
                });
                row
            }
        };

        if team == Team::Ally {
            // The client's assignment is authoritative; inference never
            // overrides it, and a committed, laned pick never moves.
            if snapshot_lane.is_known() {
                let current = self.rows(team)[row]
                    .as_ref()
                    .map(|p| (p.assigned_lane, p.completed));
                if let Some((lane, completed)) = current {
                    if lane != snapshot_lane && !(completed && lane.is_known()) {
                        row = self.place_in_lane(team, row, snapshot_lane);
                    }
                }
            }
        }

        // Visible but uncommitted champion on the cell (enemy hover).
        if team == Team::Enemy {
            let visible = match (cell.champion_id, cell.champion_pick_intent) {
                (0, 0) => None,
                (0, intent) => Some(ChampionId(intent)),
                (id, _) => Some(ChampionId(id)),
            };
            if let Some(champion) = visible {
                if !self.is_committed(champion)
                    && !self.rows(team)[row].as_ref().is_some_and(|p| p.completed)
                {
                    if let Some(pick) = self.rows_mut(team)[row].as_mut() {
                        pick.champion = Some(champion);
                    }
                }
            }
        }

        if let Some(&champion) = committed.get(&cell.cell_id) {
            self.commit_pick(team, row, champion, registry, changes);
        }
    }

    fn commit_pick(
        &mut self,
        team: Team,
        row: usize,
        champion: ChampionId,
        registry: &RegistryData,
        changes: &mut Vec<DraftChange>,
    ) {
        let already_done = self.rows(team)[row].as_ref().is_some_and(|p| p.completed);
        if already_done {
            return;
        }
        if self.is_committed(champion) || self.bans.contains(&champion) {
            debug!(%champion, "duplicate champion in snapshot, dropped as noise");
            return;
        }
        self.clear_uncommitted(champion);

        let Some(pick) = self.rows_mut(team)[row].as_mut() else {
            return;
        };
        pick.champion = Some(champion);
        pick.completed = true;
        let by_local = pick.is_local_player;
        let pick_order = pick.pick_order;
        let lane = pick.assigned_lane;
        changes.push(DraftChange::PickCompleted {
            team,
            champion,
            by_local,
        });

        if !lane.is_known() {
            let mut occupied = self.occupied_rows(team);
            occupied[row] = false;
            let inferred = infer_lane(registry.aptitude(champion), pick_order, occupied);
            if inferred.is_known() {
                let target = self.place_in_lane(team, row, inferred);
                if let Some(pick) = self.rows_mut(team)[target].as_mut() {
                    pick.assigned_lane = inferred;
                }
            }
        }
    }

    /// Move the pick at `row` to the row of `lane` when that row is free;
    /// when the row is occupied the pick stays put but takes the lane label.
    fn place_in_lane(&mut self, team: Team, row: usize, lane: Role) -> usize {
        let final_row = match lane.row() {
            Some(target) if target != row && self.rows(team)[target].is_none() => {
                let rows = self.rows_mut(team);
                rows[target] = rows[row].take();
                target
            }
            _ => row,
        };
        if let Some(pick) = self.rows_mut(team)[final_row].as_mut() {
            pick.assigned_lane = lane;
        }
        final_row
    }

    fn detect_local_hover(
        &mut self,
        snapshot: &ChampSelectSession,
        action_hover: Option<ChampionId>,
        changes: &mut Vec<DraftChange>,
    ) {
        let local_committed = self
            .local_pick()
            .is_some_and(|pick| pick.completed && pick.champion.is_some());

        let hover = if local_committed {
            None
        } else {
            action_hover.or_else(|| {
                let cell = snapshot
                    .my_team
                    .iter()
                    .find(|c| Some(c.cell_id) == self.local_cell_id)?;
                match (cell.champion_id, cell.champion_pick_intent) {
                    (0, 0) => None,
                    (0, intent) => Some(ChampionId(intent)),
                    (id, _) => Some(ChampionId(id)),
                }
            })
        };

        if let Some(champion) = hover {
            if self.last_local_hover != Some(champion) {
                changes.push(DraftChange::LocalHover { champion });
            }
        }
        self.last_local_hover = hover;
    }

    fn record_ban(&mut self, champion: ChampionId) {
        if !self.is_committed(champion) {
            self.bans.insert(champion);
        }
    }

    /// A champion already committed on any cell.
    fn is_committed(&self, champion: ChampionId) -> bool {
        self.allies
            .iter()
            .chain(self.enemies.iter())
            .flatten()
            .any(|pick| pick.completed && pick.champion == Some(champion))
    }

    /// Drop hover-level references to `champion` so a commit elsewhere wins.
    fn clear_uncommitted(&mut self, champion: ChampionId) {
        for pick in self
            .allies
            .iter_mut()
            .chain(self.enemies.iter_mut())
            .flatten()
        {
            if !pick.completed && pick.champion == Some(champion) {
                pick.champion = None;
            }
        }
    }

    fn rows(&self, team: Team) -> &[Option<Pick>; 5] {
        match team {
            Team::Ally => &self.allies,
            Team::Enemy => &self.enemies,
        }
    }

    fn rows_mut(&mut self, team: Team) -> &mut [Option<Pick>; 5] {
        match team {
            Team::Ally => &mut self.allies,
            Team::Enemy => &mut self.enemies,
        }
    }

    fn row_of_cell(&self, team: Team, cell_id: i64) -> Option<usize> {
        self.rows(team)
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|p| p.cell_id == cell_id))
    }

    fn first_empty_row(&self, team: Team) -> Option<usize> {
        self.rows(team).iter().position(Option::is_none)
    }

    fn occupied_rows(&self, team: Team) -> [bool; 5] {
        let rows = self.rows(team);
        [
            rows[0].is_some(),
            rows[1].is_some(),
            rows[2].is_some(),
            rows[3].is_some(),
            rows[4].is_some(),
        ]
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::decoder::{BanState, CellSelection, SelectAction};

    /// Everything the draft must satisfy after any merge sequence.
    pub fn invariants_hold(draft: &DraftState) -> bool {
        let mut committed = std::collections::HashSet::new();
        for pick in draft.allies.iter().chain(draft.enemies.iter()).flatten() {
            if pick.completed {
                let Some(champion) = pick.champion else {
                    return false;
                };
                if !committed.insert(champion) {
                    return false;
                }
                if draft.bans.contains(&champion) {
                    return false;
                }
            }
        }
        let locals = draft
            .allies
            .iter()
            .flatten()
            .filter(|p| p.is_local_player)
            .count();
        if draft.local_cell_id.is_some() && locals > 1 {
            return false;
        }
        true
    }

    pub fn cell(cell_id: i64, champion_id: u32, position: &str) -> CellSelection {
        CellSelection {
            cell_id,
            champion_id,
            champion_pick_intent: 0,
            assigned_position: position.to_string(),
        }
    }

    pub fn pick_action(actor: i64, champion_id: u32, completed: bool) -> SelectAction {
        SelectAction {
            id: actor * 10,
            actor_cell_id: actor,
            champion_id,
            kind: "pick".to_string(),
            completed,
            is_in_progress: !completed,
        }
    }

    pub fn ban_action(actor: i64, champion_id: u32) -> SelectAction {
        SelectAction {
            id: actor * 10 + 1,
            actor_cell_id: actor,
            champion_id,
            kind: "ban".to_string(),
            completed: true,
            is_in_progress: false,
        }
    }

    pub fn snapshot(
        local_cell: i64,
        my_team: Vec<CellSelection>,
        their_team: Vec<CellSelection>,
        actions: Vec<SelectAction>,
    ) -> ChampSelectSession {
        ChampSelectSession {
            game_id: None,
            local_player_cell_id: local_cell,
            my_team,
            their_team,
            actions: vec![actions],
            bans: BanState::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::registry::ChampionRegistry;
    use proptest::prelude::*;
    use std::sync::{Arc, OnceLock};

    const AHRI: u32 = 103;
    const ZED: u32 = 238;
    const YASUO: u32 = 157;
    const GAREN: u32 = 86;
    const LEESIN: u32 = 64;
    const JINX: u32 = 222;
    const THRESH: u32 = 412;

    fn registry() -> Arc<RegistryData> {
        static REGISTRY: OnceLock<Arc<RegistryData>> = OnceLock::new();
        REGISTRY
            .get_or_init(|| ChampionRegistry::embedded().unwrap().snapshot())
            .clone()
    }

    fn fresh_draft() -> DraftState {
        let mut draft = DraftState::default();
        draft.reset(SessionIdentity {
            generation: 1,
            client_id: None,
        });
        draft
    }

    #[test]
    fn test_ally_placed_by_assigned_position() {
        let mut draft = fresh_draft();
        let snap = snapshot(
            0,
            vec![cell(0, 0, "support"), cell(1, 0, "top")],
            vec![],
            vec![],
        );
        draft.apply_snapshot(&snap, &registry());

        assert_eq!(draft.allies[4].as_ref().unwrap().cell_id, 0);
        assert_eq!(draft.allies[4].as_ref().unwrap().assigned_lane, Role::Support);
        assert_eq!(draft.allies[0].as_ref().unwrap().cell_id, 1);
        assert!(draft.allies[4].as_ref().unwrap().is_local_player);
    }

    #[test]
    fn test_completed_ally_pick_without_position_is_inferred() {
        let mut draft = fresh_draft();
        let snap = snapshot(
            0,
            vec![cell(0, AHRI, "")],
            vec![],
            vec![pick_action(0, AHRI, true)],
        );
        let changes = draft.apply_snapshot(&snap, &registry());

        assert!(changes.contains(&DraftChange::PickCompleted {
            team: Team::Ally,
            champion: ChampionId(AHRI),
            by_local: true,
        }));
        // Ahri is a mid laner: row 2.
        let pick = draft.allies[2].as_ref().unwrap();
        assert_eq!(pick.champion, Some(ChampionId(AHRI)));
        assert_eq!(pick.assigned_lane, Role::Middle);
        assert!(pick.completed);
    }

    #[test]
    fn test_enemy_placed_by_lane_aptitude() {
        let mut draft = fresh_draft();
        let snap = snapshot(
            0,
            vec![],
            vec![cell(5, ZED, ""), cell(6, THRESH, "")],
            vec![pick_action(5, ZED, true), pick_action(6, THRESH, true)],
        );
        draft.apply_snapshot(&snap, &registry());

        assert_eq!(
            draft.enemies[2].as_ref().unwrap().champion,
            Some(ChampionId(ZED))
        );
        assert_eq!(
            draft.enemies[4].as_ref().unwrap().champion,
            Some(ChampionId(THRESH))
        );
        assert_eq!(
            draft.opposing_pick_in_lane(Role::Middle).unwrap().champion,
            Some(ChampionId(ZED))
        );
    }

    #[test]
    fn test_uncompleted_actions_do_not_advance_pick_state() {
        let mut draft = fresh_draft();
        let snap = snapshot(
            0,
            vec![cell(0, 0, "")],
            vec![],
            vec![pick_action(0, AHRI, false)],
        );
        let changes = draft.apply_snapshot(&snap, &registry());

        assert!(!changes
            .iter()
            .any(|c| matches!(c, DraftChange::PickCompleted { .. })));
        assert!(draft.local_pick().map_or(true, |p| !p.completed));
    }

    #[test]
    fn test_hover_is_reported_once_per_champion() {
        let mut draft = fresh_draft();
        let snap = snapshot(
            0,
            vec![cell(0, 0, "")],
            vec![],
            vec![pick_action(0, AHRI, false)],
        );
        let first = draft.apply_snapshot(&snap, &registry());
        assert_eq!(
            first,
            vec![DraftChange::LocalHover {
                champion: ChampionId(AHRI)
            }]
        );

        // Identical snapshot: nothing new.
        let second = draft.apply_snapshot(&snap, &registry());
        assert!(second.is_empty());
    }

    #[test]
    fn test_committed_pick_survives_empty_snapshot() {
        let mut draft = fresh_draft();
        let snap = snapshot(
            0,
            vec![cell(0, AHRI, "middle")],
            vec![],
            vec![pick_action(0, AHRI, true)],
        );
        draft.apply_snapshot(&snap, &registry());
        assert!(draft.local_pick().unwrap().completed);

        // A partial snapshot with the champion gone does not unset the pick.
        let partial = snapshot(0, vec![cell(0, 0, "")], vec![], vec![]);
        draft.apply_snapshot(&partial, &registry());
        let pick = draft.local_pick().unwrap();
        assert!(pick.completed);
        assert_eq!(pick.champion, Some(ChampionId(AHRI)));
        assert_eq!(pick.assigned_lane, Role::Middle);
    }

    #[test]
    fn test_duplicate_champion_across_teams_is_noise() {
        let mut draft = fresh_draft();
        let snap = snapshot(
            0,
            vec![cell(0, AHRI, "")],
            vec![cell(5, AHRI, "")],
            vec![pick_action(0, AHRI, true), pick_action(5, AHRI, true)],
        );
        draft.apply_snapshot(&snap, &registry());

        let committed: Vec<_> = draft
            .allies
            .iter()
            .chain(draft.enemies.iter())
            .flatten()
            .filter(|p| p.completed)
            .collect();
        assert_eq!(committed.len(), 1);
        assert!(invariants_hold(&draft));
    }

    #[test]
    fn test_bans_recorded_and_informational() {
        let mut draft = fresh_draft();
        let snap = snapshot(
            0,
            vec![cell(0, 0, "")],
            vec![],
            vec![ban_action(0, YASUO), ban_action(5, GAREN)],
        );
        let changes = draft.apply_snapshot(&snap, &registry());
        assert!(changes.is_empty());
        assert!(draft.bans.contains(&ChampionId(YASUO)));
        assert!(draft.bans.contains(&ChampionId(GAREN)));
    }

    #[test]
    fn test_applying_snapshot_twice_is_idempotent() {
        let mut draft = fresh_draft();
        let snap = snapshot(
            2,
            vec![
                cell(0, GAREN, "top"),
                cell(1, LEESIN, "jungle"),
                cell(2, AHRI, "middle"),
            ],
            vec![cell(5, JINX, "")],
            vec![
                pick_action(0, GAREN, true),
                pick_action(1, LEESIN, true),
                pick_action(2, AHRI, true),
                pick_action(5, JINX, true),
            ],
        );
        let first = draft.apply_snapshot(&snap, &registry());
        assert!(!first.is_empty());
        let before = format!("{draft:?}");

        let second = draft.apply_snapshot(&snap, &registry());
        assert!(second.is_empty());
        assert_eq!(format!("{draft:?}"), before);
    }

    #[test]
    fn test_enemy_hover_visible_before_commit() {
        let mut draft = fresh_draft();
        let snap = snapshot(0, vec![], vec![cell(5, YASUO, "")], vec![]);
        draft.apply_snapshot(&snap, &registry());

        assert_eq!(draft.pending_enemy_hover(), Some(ChampionId(YASUO)));
        assert!(draft.opposing_pick_in_lane(Role::Middle).is_none());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut draft = fresh_draft();
        let snap = snapshot(
            0,
            vec![cell(0, AHRI, "")],
            vec![],
            vec![pick_action(0, AHRI, true)],
        );
        draft.apply_snapshot(&snap, &registry());
        assert!(!draft.is_new_session());

        draft.reset(SessionIdentity {
            generation: 2,
            client_id: None,
        });
        assert!(draft.is_new_session());
        assert!(draft.allies.iter().all(Option::is_none));
        assert!(draft.bans.is_empty());
        assert_eq!(draft.session.generation, 2);
    }

    prop_compose! {
        fn arb_cell(team_base: i64)(
            slot in 0..5i64,
            champion in prop::sample::select(vec![0u32, AHRI, ZED, YASUO, GAREN, LEESIN, JINX, THRESH]),
            position in prop::sample::select(vec!["", "top", "jungle", "middle", "bottom", "utility"]),
        ) -> crate::decoder::CellSelection {
            cell(team_base + slot, champion, position)
        }
    }

    prop_compose! {
        fn arb_snapshot()(
            my_team in prop::collection::vec(arb_cell(0), 0..5),
            their_team in prop::collection::vec(arb_cell(5), 0..5),
            completed_mask in prop::collection::vec(any::<bool>(), 0..10),
            local_cell in 0..5i64,
        ) -> ChampSelectSession {
            let mut actions = Vec::new();
            for (i, c) in my_team.iter().chain(their_team.iter()).enumerate() {
                if c.champion_id != 0 {
                    let completed = completed_mask.get(i).copied().unwrap_or(false);
                    actions.push(pick_action(c.cell_id, c.champion_id, completed));
                }
            }
            snapshot(local_cell, my_team, their_team, actions)
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn prop_invariants_hold_for_any_snapshot_sequence(
            snapshots in prop::collection::vec(arb_snapshot(), 1..8)
        ) {
            let mut draft = fresh_draft();
            for snap in &snapshots {
                draft.apply_snapshot(snap, &registry());
                prop_assert!(invariants_hold(&draft));
            }
        }

        #[test]
        fn prop_reapplying_final_snapshot_changes_nothing(
            snapshots in prop::collection::vec(arb_snapshot(), 1..6)
        ) {
            let mut draft = fresh_draft();
            for snap in &snapshots {
                draft.apply_snapshot(snap, &registry());
            }
            let last = snapshots.last().unwrap();
            draft.apply_snapshot(last, &registry());
            let frozen = format!("{draft:?}");
            let changes = draft.apply_snapshot(last, &registry());
            prop_assert!(changes.is_empty());
            prop_assert_eq!(format!("{draft:?}"), frozen);
        }
    }
}
