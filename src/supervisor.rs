//! Lifecycle supervision.
//!
//! One task owns the whole pipeline: it acquires credentials, opens the
//! event stream, folds decoded events through the phase machine and draft
//! model, hands trigger intents to the dispatcher, and reconnects with
//! backoff when the transport drops. The engine step is synchronous — no
//! await happens between reading an event and finishing the state mutation.
//!
//! # Event flow
//!
//! ```text
//!  ClientLocator ──▶ RestClient ──▶ resync gets ─┐
//!                     │                          ▼
//!                     └──▶ EventStream ──▶ decode ──▶ Engine ──▶ intents
//!                                                      │            │
//!                                                 observers    Dispatcher
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::{AgentConfig, BackoffKind, TransportSettings};
use crate::decoder::{self, uris, ChampSelectSession, Event};
use crate::dispatch::{DispatchReport, Dispatcher, UrlOpener};
use crate::draft::DraftState;
use crate::lcu::{ClientLocator, RestClient};
use crate::lcu_websocket::EventStream;
use crate::registry::ChampionRegistry;
use crate::state::{AgentPhase, GameflowPhase, Lifecycle, PhaseMachine};
use crate::triggers::{OpenIntent, TriggerEngine};
use crate::{AppError, Result};

/// Connection state surfaced to embedders (tray icon, settings window).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No client found yet, or the transport dropped; retrying.
    WaitingForClient,
    Connecting,
    Connected,
    /// REST works but the event stream is down; polling instead.
    Degraded,
    /// The client keeps rejecting our credentials; it likely needs a restart.
    CannotAuthenticate,
}

/// Narrow observer surface for the excluded UI layers. All methods default
/// to no-ops; core behaviour is identical with zero observers attached.
pub trait AgentObserver: Send + Sync {
    fn on_state_change(&self, phase: AgentPhase, draft: &DraftState) {
        let _ = (phase, draft);
    }
    fn on_connection_change(&self, state: ConnectionState) {
        let _ = state;
    }
    fn on_dispatch(&self, intent: &OpenIntent) {
        let _ = intent;
    }
    fn on_error(&self, error: &AppError) {
        let _ = error;
    }
}

/// Handle for hot-applying a new configuration to a running supervisor.
pub struct ConfigHandle {
    tx: watch::Sender<AgentConfig>,
}

impl ConfigHandle {
    pub fn apply(&self, config: AgentConfig) {
        let _ = self.tx.send(config);
    }
}

/// The synchronous core: phase machine + draft model + trigger engine.
/// Everything async lives in the supervisor around it.
pub(crate) struct Engine {
    machine: PhaseMachine,
    draft: DraftState,
    triggers: TriggerEngine,
}

#[derive(Debug, Default)]
pub(crate) struct EngineOutcome {
    pub intents: Vec<OpenIntent>,
    pub new_session: bool,
    pub state_changed: bool,
}

impl Engine {
    pub(crate) fn new(config: &AgentConfig) -> Self {
        Self {
            machine: PhaseMachine::new(),
            draft: DraftState::default(),
            triggers: TriggerEngine::new(config),
        }
    }

    pub(crate) fn apply_config(&mut self, config: &AgentConfig) {
        self.triggers.apply_config(config);
    }

    pub(crate) fn phase(&self) -> AgentPhase {
        self.machine.phase()
    }

    pub(crate) fn draft(&self) -> &DraftState {
        &self.draft
    }

    pub(crate) fn handle_event(
        &mut self,
        event: Event,
        registry: &crate::registry::RegistryData,
    ) -> EngineOutcome {
        let mut outcome = EngineOutcome::default();
        match event {
            Event::PhaseChanged(phase) => {
                let effects = self.machine.apply_phase(phase);
                outcome.state_changed = !effects.is_empty();
                for effect in effects {
                    match effect {
                        Lifecycle::SessionStarted { session } => {
                            self.draft.reset(session);
                            self.triggers.begin_session();
                            outcome.new_session = true;
                        }
                        Lifecycle::GameStart => {
                            outcome.intents.extend(self.triggers.on_game_start(
                                &self.draft,
                                registry,
                                self.machine.epoch(),
                            ));
                        }
                        Lifecycle::GameEnd => {}
                        Lifecycle::SessionDropped => {
                            self.draft = DraftState::default();
                        }
                    }
                }
            }
            Event::ChampSelectSnapshot(session) => {
                if self.machine.phase() != AgentPhase::ChampSelect {
                    debug!("snapshot outside champion select, dropped");
                    return outcome;
                }
                if let Some(game_id) = session.game_id {
                    let known = self.machine.session().client_id;
                    if known.is_some_and(|old| old != game_id) {
                        if let Lifecycle::SessionStarted { session } =
                            self.machine.force_new_session()
                        {
                            self.draft.reset(session);
                            self.triggers.begin_session();
                            outcome.new_session = true;
                        }
                    }
                    self.machine.adopt_client_session_id(game_id);
                    self.draft.session.client_id = Some(game_id);
                }
                let changes = self.draft.apply_snapshot(&session, registry);
                outcome.state_changed = !changes.is_empty();
                outcome.intents = self.triggers.evaluate(
                    &self.draft,
                    registry,
                    &changes,
                    self.machine.epoch(),
                );
            }
        }
        outcome
    }
}

/// Owns lifecycles: connect, resync, event application, reconnect, shutdown.
pub struct Supervisor {
    locator: ClientLocator,
    registry: Arc<ChampionRegistry>,
    opener: Arc<dyn UrlOpener>,
    observers: Vec<Arc<dyn AgentObserver>>,
    config_rx: watch::Receiver<AgentConfig>,
}

enum PollExit {
    Stream(EventStream),
    TransportLost(AppError),
    Shutdown,
}

impl Supervisor {
    pub fn new(
        registry: Arc<ChampionRegistry>,
        opener: Arc<dyn UrlOpener>,
        config: AgentConfig,
    ) -> (Self, ConfigHandle) {
        let (tx, rx) = watch::channel(config);
        (
            Self {
                locator: ClientLocator::new(),
                registry,
                opener,
                observers: Vec::new(),
                config_rx: rx,
            },
            ConfigHandle { tx },
        )
    }

    pub fn add_observer(&mut self, observer: Arc<dyn AgentObserver>) {
        self.observers.push(observer);
    }

    /// Run until shutdown. Only returns an error once the retry budget is
    /// exhausted; everything recoverable is handled internally.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let mut config_rx = self.config_rx.clone();
        let config = config_rx.borrow_and_update().clone();

        let mut engine = Engine::new(&config);
        let (report_tx, mut report_rx) = mpsc::channel::<DispatchReport>(32);
        let dispatcher = Dispatcher::new(self.opener.clone(), report_tx);
        let mut delay = Duration::from_millis(config.dispatch.delay_ms);
        let mut transport = config.transport;
        let mut attempt: u32 = 0;

        'reconnect: loop {
            // Acquire credentials, waiting for the client if need be.
            let credentials = loop {
                match self.locator.acquire() {
                    Ok(credentials) => break credentials,
                    Err(e) => {
                        self.notify_connection(ConnectionState::WaitingForClient);
                        self.notify_error(&e);
                        attempt += 1;
                        if retries_exhausted(&transport, attempt) {
                            dispatcher.cancel_pending();
                            return Err(e);
                        }
                        if !sleep_backoff(&transport, attempt, &mut shutdown_rx).await {
                            dispatcher.cancel_pending();
                            return Ok(());
                        }
                    }
                }
            };

            self.notify_connection(ConnectionState::Connecting);
            let rest = match RestClient::new(credentials) {
                Ok(rest) => rest,
                Err(e) => {
                    self.notify_error(&e);
                    attempt += 1;
                    if retries_exhausted(&transport, attempt) {
                        dispatcher.cancel_pending();
                        return Err(e);
                    }
                    if !sleep_backoff(&transport, attempt, &mut shutdown_rx).await {
                        dispatcher.cancel_pending();
                        return Ok(());
                    }
                    continue 'reconnect;
                }
            };

            // Subscribe before the resync so nothing pushed in between is
            // lost; buffered events are applied after the resync gets.
            let mut events = match EventStream::connect(rest.credentials()).await {
                Ok(stream) => stream,
                Err(AppError::Auth) => {
                    self.notify_connection(ConnectionState::CannotAuthenticate);
                    self.notify_error(&AppError::Auth);
                    attempt += 1;
                    if retries_exhausted(&transport, attempt) {
                        dispatcher.cancel_pending();
                        return Err(AppError::Auth);
                    }
                    if !sleep_backoff(&transport, attempt, &mut shutdown_rx).await {
                        dispatcher.cancel_pending();
                        return Ok(());
                    }
                    continue 'reconnect;
                }
                Err(e) => {
                    // REST may still work; poll the tracked resources until
                    // the socket comes back rather than going dark.
                    self.notify_error(&e);
                    self.notify_connection(ConnectionState::Degraded);
                    match self
                        .poll_until_stream(
                            &rest,
                            &mut engine,
                            &dispatcher,
                            delay,
                            &transport,
                            &mut shutdown_rx,
                        )
                        .await
                    {
                        PollExit::Stream(stream) => stream,
                        PollExit::Shutdown => {
                            dispatcher.cancel_pending();
                            return Ok(());
                        }
                        PollExit::TransportLost(e) => {
                            self.notify_error(&e);
                            attempt += 1;
                            if retries_exhausted(&transport, attempt) {
                                dispatcher.cancel_pending();
                                return Err(e);
                            }
                            if !sleep_backoff(&transport, attempt, &mut shutdown_rx).await {
                                dispatcher.cancel_pending();
                                return Ok(());
                            }
                            continue 'reconnect;
                        }
                    }
                }
            };

            // Repair anything missed while disconnected.
            if let Err(e) = self.resync(&rest, &mut engine, &dispatcher, delay).await {
                self.notify_error(&e);
                if matches!(e, AppError::Auth) {
                    self.notify_connection(ConnectionState::CannotAuthenticate);
                }
                attempt += 1;
                if retries_exhausted(&transport, attempt) {
                    dispatcher.cancel_pending();
                    return Err(e);
                }
                if !sleep_backoff(&transport, attempt, &mut shutdown_rx).await {
                    dispatcher.cancel_pending();
                    return Ok(());
                }
                continue 'reconnect;
            }

            attempt = 0;
            self.notify_connection(ConnectionState::Connected);
            info!("connected to client, event stream live");

            loop {
                tokio::select! {
                    maybe_event = events.recv() => match maybe_event {
                        Some(raw) => match decoder::decode(&raw) {
                            Ok(Some(event)) => self.step(&mut engine, event, &dispatcher, delay),
                            Ok(None) => {}
                            Err(e) => {
                                // Malformed frame: log, drop, never mutate state.
                                debug!(uri = %raw.uri, error = %e, "dropping malformed frame");
                                self.notify_error(&e);
                            }
                        },
                        None => {
                            warn!("event stream dropped, reconnecting");
                            self.notify_connection(ConnectionState::WaitingForClient);
                            continue 'reconnect;
                        }
                    },
                    report = report_rx.recv() => {
                        if let Some(report) = report {
                            match &report.outcome {
                                Ok(()) => self.notify_dispatch(&report.intent),
                                Err(e) => self.notify_error(e),
                            }
                        }
                    },
                    changed = config_rx.changed() => {
                        if changed.is_ok() {
                            let new = config_rx.borrow_and_update().clone();
                            engine.apply_config(&new);
                            delay = Duration::from_millis(new.dispatch.delay_ms);
                            transport = new.transport;
                            info!("configuration hot-applied");
                        }
                    },
                    _ = shutdown_rx.recv() => {
                        events.close();
                        dispatcher.cancel_pending();
                        info!("shutdown: event stream closed, pending opens cancelled");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// One synchronous engine step plus its side effects.
    fn step(&self, engine: &mut Engine, event: Event, dispatcher: &Dispatcher, delay: Duration) {
        let registry = self.registry.snapshot();
        let outcome = engine.handle_event(event, &registry);

        if outcome.new_session {
            // Opens still waiting out their delay belong to the old session.
            dispatcher.cancel_pending();
        }
        for intent in outcome.intents {
            dispatcher.dispatch(intent, delay);
        }
        if outcome.state_changed || outcome.new_session {
            for observer in &self.observers {
                observer.on_state_change(engine.phase(), engine.draft());
            }
        }
    }

    /// Replay one GET of each tracked resource through the normal event
    /// path, so a reconnect converges on the same state an uninterrupted
    /// connection would have reached.
    async fn resync(
        &self,
        rest: &RestClient,
        engine: &mut Engine,
        dispatcher: &Dispatcher,
        delay: Duration,
    ) -> Result<()> {
        match rest.get(uris::GAMEFLOW_PHASE).await {
            Ok(value) => {
                let phase = value
                    .as_str()
                    .map(GameflowPhase::from)
                    .unwrap_or_default();
                self.step(engine, Event::PhaseChanged(phase), dispatcher, delay);
            }
            Err(AppError::NotInPhase) => {
                self.step(
                    engine,
                    Event::PhaseChanged(GameflowPhase::None),
                    dispatcher,
                    delay,
                );
            }
            Err(e) => return Err(e),
        }

        match rest.get(uris::CHAMP_SELECT_SESSION).await {
            Ok(value) => match serde_json::from_value::<ChampSelectSession>(value) {
                Ok(session) => self.step(
                    engine,
                    Event::ChampSelectSnapshot(Box::new(session)),
                    dispatcher,
                    delay,
                ),
                Err(e) => {
                    let e = AppError::Decode(format!("champ select session: {e}"));
                    self.notify_error(&e);
                }
            },
            // 404 means "not in champion select": no data, state untouched.
            Err(AppError::NotInPhase) => {}
            Err(e) => return Err(e),
        }

        Ok(())
    }

    /// Degraded mode: fold REST reads at the retry interval and keep trying
    /// to reopen the event stream.
    async fn poll_until_stream(
        &self,
        rest: &RestClient,
        engine: &mut Engine,
        dispatcher: &Dispatcher,
        delay: Duration,
        transport: &TransportSettings,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> PollExit {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(transport.retry_interval_ms)) => {}
                _ = shutdown_rx.recv() => return PollExit::Shutdown,
            }

            if let Err(e) = self.resync(rest, engine, dispatcher, delay).await {
                return PollExit::TransportLost(e);
            }
            match EventStream::connect(rest.credentials()).await {
                Ok(stream) => return PollExit::Stream(stream),
                Err(e) => debug!(error = %e, "event stream still unavailable"),
            }
        }
    }

    fn notify_connection(&self, state: ConnectionState) {
        for observer in &self.observers {
            observer.on_connection_change(state);
        }
    }

    fn notify_dispatch(&self, intent: &OpenIntent) {
        for observer in &self.observers {
            observer.on_dispatch(intent);
        }
    }

    fn notify_error(&self, error: &AppError) {
        for observer in &self.observers {
            observer.on_error(error);
        }
    }
}

fn retries_exhausted(transport: &TransportSettings, attempt: u32) -> bool {
    transport.max_retries != 0 && attempt > transport.max_retries
}

/// Sleep out one backoff step; false means shutdown arrived instead.
async fn sleep_backoff(
    transport: &TransportSettings,
    attempt: u32,
    shutdown_rx: &mut broadcast::Receiver<()>,
) -> bool {
    let wait = backoff_delay(
        transport.backoff,
        Duration::from_millis(transport.retry_interval_ms),
        attempt,
    );
    tokio::select! {
        _ = tokio::time::sleep(wait) => true,
        _ = shutdown_rx.recv() => false,
    }
}

fn backoff_delay(kind: BackoffKind, base: Duration, attempt: u32) -> Duration {
    const CAP: Duration = Duration::from_secs(30);
    let attempt = attempt.max(1);
    let delay = match kind {
        BackoffKind::Linear => base.saturating_mul(attempt),
        BackoffKind::Exponential => base.saturating_mul(1u32 << (attempt - 1).min(16)),
    };
    delay.min(CAP)
}
