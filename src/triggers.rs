//! Trigger policy: state deltas → URL-open intents.
//!
//! Every draft update is evaluated against the per-feature policy. An intent
//! fires at most once per fingerprint, and the fingerprint is recorded at
//! emission — before dispatch — so a failed browser launch cannot cause a
//! duplicate open.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;

use crate::config::AgentConfig;
use crate::draft::{DraftChange, DraftState, Team};
use crate::registry::{ChampionId, RegistryData};
use crate::roles::Role;
use crate::urls::UrlBuilder;

/// The analytics surfaces the agent can open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Feature {
    Matchup,
    MyCounters,
    EnemyCounters,
    BuildGuide,
}

impl Feature {
    /// Evaluation and dispatch order when several features fire at once.
    pub const ORDER: [Feature; 4] = [
        Feature::Matchup,
        Feature::MyCounters,
        Feature::EnemyCounters,
        Feature::BuildGuide,
    ];
}

/// The commitment level a feature reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TriggerMoment {
    Hover,
    Pick,
    LockIn,
}

/// Dedup key; lives for one session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TriggerFingerprint {
    pub feature: Feature,
    pub champion: ChampionId,
    pub opponent: Option<ChampionId>,
    pub role: Option<Role>,
    pub session_generation: u64,
    pub phase_epoch: u32,
}

/// A fully resolved request to open one analytics page.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenIntent {
    pub feature: Feature,
    pub url: String,
    pub fingerprint: TriggerFingerprint,
}

pub struct TriggerEngine {
    config: AgentConfig,
    urls: UrlBuilder,
    fired: HashSet<TriggerFingerprint>,
}

impl TriggerEngine {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            config: config.clone(),
            urls: UrlBuilder::new(&config.analytics.base_url),
            fired: HashSet::new(),
        }
    }

    /// Hot-apply new settings. Already-fired fingerprints stay recorded so a
    /// settings change mid-session cannot replay old opens.
    pub fn apply_config(&mut self, config: &AgentConfig) {
        self.urls = UrlBuilder::new(&config.analytics.base_url);
        self.config = config.clone();
    }

    /// Forget all fingerprints; called when a new session starts.
    pub fn begin_session(&mut self) {
        self.fired.clear();
    }

    /// Evaluate one draft update.
    pub fn evaluate(
        &mut self,
        draft: &DraftState,
        registry: &RegistryData,
        changes: &[DraftChange],
        phase_epoch: u32,
    ) -> Vec<OpenIntent> {
        let hover = changes.iter().find_map(|c| match c {
            DraftChange::LocalHover { champion } => Some(*champion),
            _ => None,
        });
        let enemy_picks: Vec<ChampionId> = changes
            .iter()
            .filter_map(|c| match c {
                DraftChange::PickCompleted {
                    team: Team::Enemy,
                    champion,
                    ..
                } => Some(*champion),
                _ => None,
            })
            .collect();
        let any_pick = changes
            .iter()
            .any(|c| matches!(c, DraftChange::PickCompleted { .. }));
        let local_lock_in = changes.iter().any(|c| {
            matches!(
                c,
                DraftChange::PickCompleted { by_local: true, .. }
            )
        });

        let moment_occurred = |moment: TriggerMoment| match moment {
            TriggerMoment::Hover => hover.is_some(),
            TriggerMoment::Pick => any_pick,
            TriggerMoment::LockIn => local_lock_in,
        };

        let mut intents = Vec::new();

        let features = self.config.features.clone();

        // matchup
        if features.matchup.enabled && moment_occurred(features.matchup.trigger) {
            if let Some((champion, lane)) = self.local_champion(draft, hover, features.matchup.trigger) {
                if lane.is_known() {
                    if let Some(opponent) = draft
                        .opposing_pick_in_lane(lane)
                        .and_then(|pick| pick.champion)
                    {
                        self.emit(
                            &mut intents,
                            registry,
                            Feature::Matchup,
                            champion,
                            Some(opponent),
                            Some(lane),
                            draft,
                            phase_epoch,
                        );
                    }
                }
            }
        }

        // my_counters
        if features.my_counters.enabled && moment_occurred(features.my_counters.trigger) {
            if let Some((champion, lane)) =
                self.local_champion(draft, hover, features.my_counters.trigger)
            {
                self.emit(
                    &mut intents,
                    registry,
                    Feature::MyCounters,
                    champion,
                    None,
                    Some(lane).filter(|l| l.is_known()),
                    draft,
                    phase_epoch,
                );
            }
        }

        // enemy_counters
        //
        // Enemy lanes are only ever inferred, so the counters page is opened
        // without a role segment rather than with a guess.
        if features.enemy_counters.enabled && moment_occurred(features.enemy_counters.trigger) {
            let candidates: Vec<ChampionId> =
                if features.enemy_counters.trigger == TriggerMoment::Pick {
                    // Only the picks that completed in this very update.
                    enemy_picks
                } else {
                    draft
                        .completed_enemies()
                        .filter_map(|pick| pick.champion)
                        .collect()
                };
            for champion in candidates {
                self.emit(
                    &mut intents,
                    registry,
                    Feature::EnemyCounters,
                    champion,
                    None,
                    None,
                    draft,
                    phase_epoch,
                );
            }
        }

        // build_guide
        if features.build_guide.enabled && moment_occurred(features.build_guide.trigger) {
            if let Some((champion, lane)) =
                self.local_champion(draft, hover, features.build_guide.trigger)
            {
                self.emit(
                    &mut intents,
                    registry,
                    Feature::BuildGuide,
                    champion,
                    None,
                    Some(lane).filter(|l| l.is_known()),
                    draft,
                    phase_epoch,
                );
            }
        }

        intents
    }

    /// The game-start edge: only the build guide reacts, and only when the
    /// user asked for an in-game open.
    pub fn on_game_start(
        &mut self,
        draft: &DraftState,
        registry: &RegistryData,
        phase_epoch: u32,
    ) -> Vec<OpenIntent> {
        let mut intents = Vec::new();
        let build_guide = self.config.features.build_guide;
        if !build_guide.enabled || !build_guide.open_in_game {
            return intents;
        }
        let Some((champion, lane)) = self.committed_local(draft) else {
            return intents;
        };
        self.emit(
            &mut intents,
            registry,
            Feature::BuildGuide,
            champion,
            None,
            Some(lane).filter(|l| l.is_known()),
            draft,
            phase_epoch,
        );
        intents
    }

    fn committed_local(&self, draft: &DraftState) -> Option<(ChampionId, Role)> {
        let pick = draft.local_pick().filter(|pick| pick.completed)?;
        pick.champion.map(|champion| (champion, pick.assigned_lane))
    }

    /// Resolve the local champion a feature should target: a committed pick
    /// always wins; a hover only counts when the feature fires on hover.
    fn local_champion(
        &self,
        draft: &DraftState,
        hover: Option<ChampionId>,
        moment: TriggerMoment,
    ) -> Option<(ChampionId, Role)> {
        if let Some(committed) = self.committed_local(draft) {
            return Some(committed);
        }
        if moment == TriggerMoment::Hover {
            let lane = draft
                .local_pick()
                .map(|pick| pick.assigned_lane)
                .unwrap_or(Role::Unknown);
            return hover.map(|champion| (champion, lane));
        }
        None
    }

    #[allow(clippy::too_many_arguments)]
    fn emit(
        &mut self,
        intents: &mut Vec<OpenIntent>,
        registry: &RegistryData,
        feature: Feature,
        champion: ChampionId,
        opponent: Option<ChampionId>,
        role: Option<Role>,
        draft: &DraftState,
        phase_epoch: u32,
    ) {
        let Some(name) = registry.canonical_name(champion) else {
            debug!(%champion, %feature, "champion unknown to registry, intent skipped");
            return;
        };
        let opponent_name = match opponent {
            Some(id) => match registry.canonical_name(id) {
                Some(name) => Some(name.to_string()),
                None => {
                    debug!(champion = %id, %feature, "opponent unknown to registry, intent skipped");
                    return;
                }
            },
            None => None,
        };

        let url = match feature {
            Feature::Matchup => match opponent_name {
                Some(opponent) => self.urls.matchup(name, &opponent, role),
                None => return,
            },
            Feature::MyCounters | Feature::EnemyCounters => self.urls.counters(name, role),
            Feature::BuildGuide => self.urls.build_guide(name, role),
        };

        // Recorded before the intent ever reaches the dispatcher: a failed
        // browser launch must not earn a retry.
        let fingerprint = TriggerFingerprint {
            feature,
            champion,
            opponent,
            role,
            session_generation: draft.session.generation,
            phase_epoch,
        };
        if !self.fired.insert(fingerprint.clone()) {
            return;
        }

        intents.push(OpenIntent {
            feature,
            url,
            fingerprint,
        });
    }

    #[cfg(test)]
    fn has_fired(&self, fingerprint: &TriggerFingerprint) -> bool {
        self.fired.contains(fingerprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::draft::test_support::*;
    use crate::registry::ChampionRegistry;
    use crate::state::SessionIdentity;
    use std::sync::{Arc, OnceLock};

    const AHRI: u32 = 103;
    const ZED: u32 = 238;
    const YASUO: u32 = 157;
    const GAREN: u32 = 86;
    const LEESIN: u32 = 64;
    const JINX: u32 = 222;

    fn registry() -> Arc<RegistryData> {
        static REGISTRY: OnceLock<Arc<RegistryData>> = OnceLock::new();
        REGISTRY
            .get_or_init(|| ChampionRegistry::embedded().unwrap().snapshot())
            .clone()
    }

    fn config_with(update: impl FnOnce(&mut AgentConfig)) -> AgentConfig {
        let mut config = AgentConfig::default();
        config.features.matchup.enabled = false;
        config.features.my_counters.enabled = false;
        config.features.enemy_counters.enabled = false;
        config.features.build_guide.enabled = false;
        update(&mut config);
        config
    }

    fn fresh_draft() -> DraftState {
        let mut draft = DraftState::default();
        draft.reset(SessionIdentity {
            generation: 1,
            client_id: None,
        });
        draft
    }

    /// Hovering a champion opens its counters page exactly once.
    #[test]
    fn test_hover_opens_counters_once() {
        let config = config_with(|c| {
            c.features.my_counters.enabled = true;
            c.features.my_counters.trigger = TriggerMoment::Hover;
        });
        let mut engine = TriggerEngine::new(&config);
        let mut draft = fresh_draft();

        let snap = snapshot(
            0,
            vec![cell(0, AHRI, "")],
            vec![],
            vec![pick_action(0, AHRI, false)],
        );
        let changes = draft.apply_snapshot(&snap, &registry());
        let intents = engine.evaluate(&draft, &registry(), &changes, 1);

        assert_eq!(intents.len(), 1);
        assert_eq!(
            intents[0].url,
            "https://lolanalytics.com/champion/ahri/counters"
        );
        assert!(engine.has_fired(&intents[0].fingerprint));

        // Hovering the same champion again produces no second open.
        let changes = vec![DraftChange::LocalHover {
            champion: ChampionId(AHRI),
        }];
        let again = engine.evaluate(&draft, &registry(), &changes, 1);
        assert!(again.is_empty());
    }

    /// Matchup on pick, lane and opponent both known.
    #[test]
    fn test_matchup_on_pick() {
        let config = config_with(|c| {
            c.features.matchup.enabled = true;
            c.features.matchup.trigger = TriggerMoment::Pick;
        });
        let mut engine = TriggerEngine::new(&config);
        let mut draft = fresh_draft();

        // Enemy Zed commits first; lane inferred as middle.
        let snap = snapshot(
            0,
            vec![cell(0, 0, "middle")],
            vec![cell(5, ZED, "")],
            vec![pick_action(5, ZED, true)],
        );
        let changes = draft.apply_snapshot(&snap, &registry());
        let intents = engine.evaluate(&draft, &registry(), &changes, 1);
        assert!(intents.is_empty(), "no local champion yet");

        // Local Ahri commits in middle.
        let snap = snapshot(
            0,
            vec![cell(0, AHRI, "middle")],
            vec![cell(5, ZED, "")],
            vec![pick_action(0, AHRI, true), pick_action(5, ZED, true)],
        );
        let changes = draft.apply_snapshot(&snap, &registry());
        let intents = engine.evaluate(&draft, &registry(), &changes, 1);

        assert_eq!(intents.len(), 1);
        assert_eq!(
            intents[0].url,
            "https://lolanalytics.com/champion/ahri/matchup/zed/middle"
        );
    }

    /// Enemy counters fire on the enemy's pick, once.
    #[test]
    fn test_enemy_counters_on_enemy_pick() {
        let config = config_with(|c| {
            c.features.enemy_counters.enabled = true;
            c.features.enemy_counters.trigger = TriggerMoment::Pick;
        });
        let mut engine = TriggerEngine::new(&config);
        let mut draft = fresh_draft();

        let snap = snapshot(
            0,
            vec![cell(0, GAREN, "top"), cell(1, LEESIN, "jungle")],
            vec![cell(5, YASUO, "")],
            vec![
                pick_action(0, GAREN, true),
                pick_action(1, LEESIN, true),
                pick_action(5, YASUO, true),
            ],
        );
        let changes = draft.apply_snapshot(&snap, &registry());
        let intents = engine.evaluate(&draft, &registry(), &changes, 1);

        let yasuo: Vec<_> = intents
            .iter()
            .filter(|i| i.feature == Feature::EnemyCounters)
            .collect();
        assert_eq!(yasuo.len(), 1);
        assert_eq!(
            yasuo[0].url,
            "https://lolanalytics.com/champion/yasuo/counters"
        );

        // The identical snapshot again: no changes, nothing fires.
        let changes = draft.apply_snapshot(&snap, &registry());
        assert!(changes.is_empty());
        let again = engine.evaluate(&draft, &registry(), &changes, 1);
        assert!(again.is_empty());
    }

    /// Build guide on lock-in, then a second open at game start.
    #[test]
    fn test_build_guide_lock_in_then_game_start() {
        let config = config_with(|c| {
            c.features.build_guide.enabled = true;
            c.features.build_guide.trigger = TriggerMoment::LockIn;
            c.features.build_guide.open_in_game = true;
        });
        let mut engine = TriggerEngine::new(&config);
        let mut draft = fresh_draft();

        let snap = snapshot(
            0,
            vec![cell(0, JINX, "bottom")],
            vec![],
            vec![pick_action(0, JINX, true)],
        );
        let changes = draft.apply_snapshot(&snap, &registry());
        let intents = engine.evaluate(&draft, &registry(), &changes, 1);
        assert_eq!(intents.len(), 1);
        assert_eq!(
            intents[0].url,
            "https://lolanalytics.com/champion/jinx/build/bottom"
        );

        // Game start is a different lifecycle stage: same URL, second open.
        let in_game = engine.on_game_start(&draft, &registry(), 2);
        assert_eq!(in_game.len(), 1);
        assert_eq!(in_game[0].url, intents[0].url);
        assert_ne!(in_game[0].fingerprint, intents[0].fingerprint);

        // But not a third within the same stage.
        assert!(engine.on_game_start(&draft, &registry(), 2).is_empty());
    }

    #[test]
    fn test_game_start_respects_open_in_game_flag() {
        let config = config_with(|c| {
            c.features.build_guide.enabled = true;
            c.features.build_guide.open_in_game = false;
        });
        let mut engine = TriggerEngine::new(&config);
        let mut draft = fresh_draft();
        let snap = snapshot(
            0,
            vec![cell(0, JINX, "bottom")],
            vec![],
            vec![pick_action(0, JINX, true)],
        );
        draft.apply_snapshot(&snap, &registry());
        assert!(engine.on_game_start(&draft, &registry(), 2).is_empty());
    }

    #[test]
    fn test_disabled_features_never_fire() {
        let config = config_with(|_| {});
        let mut engine = TriggerEngine::new(&config);
        let mut draft = fresh_draft();
        let snap = snapshot(
            0,
            vec![cell(0, AHRI, "middle")],
            vec![],
            vec![pick_action(0, AHRI, true)],
        );
        let changes = draft.apply_snapshot(&snap, &registry());
        assert!(engine.evaluate(&draft, &registry(), &changes, 1).is_empty());
    }

    #[test]
    fn test_unknown_lane_omits_role_segment() {
        let config = config_with(|c| {
            c.features.my_counters.enabled = true;
            c.features.my_counters.trigger = TriggerMoment::Hover;
        });
        let mut engine = TriggerEngine::new(&config);
        let mut draft = fresh_draft();

        // Hover with no assigned position and nothing committed: no lane.
        let snap = snapshot(
            0,
            vec![cell(0, 0, "")],
            vec![],
            vec![pick_action(0, AHRI, false)],
        );
        let changes = draft.apply_snapshot(&snap, &registry());
        let intents = engine.evaluate(&draft, &registry(), &changes, 1);
        assert_eq!(intents.len(), 1);
        assert!(intents[0].url.ends_with("/champion/ahri/counters"));
        assert_eq!(intents[0].fingerprint.role, None);
    }

    #[test]
    fn test_intent_order_is_stable() {
        let config = config_with(|c| {
            c.features.matchup.enabled = true;
            c.features.matchup.trigger = TriggerMoment::Pick;
            c.features.my_counters.enabled = true;
            c.features.my_counters.trigger = TriggerMoment::Pick;
            c.features.enemy_counters.enabled = true;
            c.features.enemy_counters.trigger = TriggerMoment::Pick;
            c.features.build_guide.enabled = true;
            c.features.build_guide.trigger = TriggerMoment::Pick;
        });
        let mut engine = TriggerEngine::new(&config);
        let mut draft = fresh_draft();

        let snap = snapshot(
            0,
            vec![cell(0, AHRI, "middle")],
            vec![cell(5, ZED, "")],
            vec![pick_action(0, AHRI, true), pick_action(5, ZED, true)],
        );
        let changes = draft.apply_snapshot(&snap, &registry());
        let intents = engine.evaluate(&draft, &registry(), &changes, 1);

        let order: Vec<Feature> = intents.iter().map(|i| i.feature).collect();
        assert_eq!(
            order,
            vec![
                Feature::Matchup,
                Feature::MyCounters,
                Feature::EnemyCounters,
                Feature::BuildGuide,
            ]
        );
    }

    #[test]
    fn test_new_session_forgets_fingerprints() {
        let config = config_with(|c| {
            c.features.my_counters.enabled = true;
            c.features.my_counters.trigger = TriggerMoment::Hover;
        });
        let mut engine = TriggerEngine::new(&config);
        let mut draft = fresh_draft();
        let changes = vec![DraftChange::LocalHover {
            champion: ChampionId(AHRI),
        }];
        assert_eq!(engine.evaluate(&draft, &registry(), &changes, 1).len(), 1);

        engine.begin_session();
        draft.reset(SessionIdentity {
            generation: 2,
            client_id: None,
        });
        assert_eq!(engine.evaluate(&draft, &registry(), &changes, 1).len(), 1);
    }
}
