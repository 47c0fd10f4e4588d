use chrono::Utc;
use crawlgraph_source::{CrawlScope, DataSource, Page, SourceError};
use futures::future::{self, BoxFuture, FutureExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::build::build_graph;
use crate::error::{GraphError, Result};
use crate::graph::{GraphSnapshot, RefreshMode, ViewMode};
use crate::layout::{LayoutConfig, LayoutEngine};

#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub view_mode: ViewMode,
    pub refresh_mode: RefreshMode,
    pub scope: CrawlScope,
    /// Live-mode tick period
    pub interval: Duration,
    /// Age after which an in-flight Live fetch stops coalescing ticks
    pub stale_after: Duration,
    pub layout: LayoutConfig,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            view_mode: ViewMode::Website,
            refresh_mode: RefreshMode::Static,
            scope: CrawlScope::All,
            interval: Duration::from_secs(5),
            stale_after: Duration::from_secs(15),
            layout: LayoutConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshPhase {
    Idle,
    Fetching,
    Building,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// View mode, refresh mode or scope changed
    ModeChange,
    Tick,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub generation: u64,
    pub scope: CrawlScope,
}

#[derive(Debug)]
pub enum Completion {
    Applied(Arc<GraphSnapshot>),
    /// Response belonged to a superseded or cancelled fetch
    Discarded { generation: u64, latest: u64 },
    Failed(SourceError),
}

/// What the rendering layer sees. Replaced as a whole on every change.
#[derive(Debug, Clone)]
pub struct GraphView {
    pub phase: RefreshPhase,
    pub view_mode: ViewMode,
    pub refresh_mode: RefreshMode,
    pub snapshot: Option<Arc<GraphSnapshot>>,
    /// Last refresh failed and `snapshot` is older than the latest attempt
    pub stale: bool,
    pub last_error: Option<String>,
}

/// Refresh state machine without any I/O.
///
/// Every issued fetch is tagged with a monotonically increasing generation;
/// only a response carrying the latest generation is ever applied.
#[derive(Debug)]
pub struct RefreshState {
    config: RefreshConfig,
    layout: LayoutEngine,
    phase: RefreshPhase,
    issued: u64,
    in_flight_since: Option<Instant>,
    snapshot: Option<Arc<GraphSnapshot>>,
    stale: bool,
    last_error: Option<String>,
}

impl RefreshState {
    pub fn new(config: RefreshConfig) -> Self {
        let layout = LayoutEngine::new(config.layout);
        Self {
            config,
            layout,
            phase: RefreshPhase::Idle,
            issued: 0,
            in_flight_since: None,
            snapshot: None,
            stale: false,
            last_error: None,
        }
    }

    pub fn phase(&self) -> RefreshPhase {
        self.phase
    }

    pub fn view_mode(&self) -> ViewMode {
        self.config.view_mode
    }

    pub fn refresh_mode(&self) -> RefreshMode {
        self.config.refresh_mode
    }

    pub fn scope(&self) -> &CrawlScope {
        &self.config.scope
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    pub fn latest_generation(&self) -> u64 {
        self.issued
    }

    pub fn snapshot(&self) -> Option<&Arc<GraphSnapshot>> {
        self.snapshot.as_ref()
    }

    pub fn view(&self) -> GraphView {
        GraphView {
            phase: self.phase,
            view_mode: self.config.view_mode,
            refresh_mode: self.config.refresh_mode,
            snapshot: self.snapshot.clone(),
            stale: self.stale,
            last_error: self.last_error.clone(),
        }
    }

    fn busy(&self) -> bool {
        matches!(self.phase, RefreshPhase::Fetching | RefreshPhase::Building)
    }

    /// Ask for a new fetch. Returns `None` when the trigger is coalesced into
    /// the fetch already in flight.
    pub fn request(&mut self, trigger: Trigger, now: Instant) -> Option<FetchTicket> {
        if self.busy() {
            let age = self
                .in_flight_since
                .map(|since| now.saturating_duration_since(since))
                .unwrap_or_default();
            match trigger {
                Trigger::ModeChange => {
                    debug!("Superseding generation {} after mode change", self.issued);
                }
                Trigger::Tick
                    if self.config.refresh_mode == RefreshMode::Live
                        && age >= self.config.stale_after =>
                {
                    warn!(
                        "Fetch generation {} outstanding for {:?}, superseding",
                        self.issued, age
                    );
                }
                _ => {
                    debug!("Coalescing {:?} into generation {}", trigger, self.issued);
                    return None;
                }
            }
        }

        self.issued += 1;
        self.in_flight_since = Some(now);
        self.phase = RefreshPhase::Fetching;
        debug!("Issuing fetch generation {} ({:?})", self.issued, trigger);

        Some(FetchTicket {
            generation: self.issued,
            scope: self.config.scope.clone(),
        })
    }

    pub fn set_view_mode(&mut self, mode: ViewMode, now: Instant) -> Option<FetchTicket> {
        if self.config.view_mode == mode {
            return None;
        }
        info!("View mode -> {}", mode.as_str());
        self.config.view_mode = mode;
        self.request(Trigger::ModeChange, now)
    }

    pub fn set_scope(&mut self, scope: CrawlScope, now: Instant) -> Option<FetchTicket> {
        if self.config.scope == scope {
            return None;
        }
        info!("Scope -> {:?}", scope);
        self.config.scope = scope;
        self.request(Trigger::ModeChange, now)
    }

    /// Going Live fetches immediately; going Static drops whatever is in flight.
    pub fn set_refresh_mode(&mut self, mode: RefreshMode, now: Instant) -> Option<FetchTicket> {
        if self.config.refresh_mode == mode {
            return None;
        }
        info!("Refresh mode -> {:?}", mode);
        self.config.refresh_mode = mode;
        match mode {
            RefreshMode::Live => self.request(Trigger::ModeChange, now),
            RefreshMode::Static => {
                self.cancel();
                None
            }
        }
    }

    /// Invalidate any fetch in flight so its response is never applied.
    pub fn cancel(&mut self) {
        if self.busy() {
            debug!("Cancelling fetch generation {}", self.issued);
            self.issued += 1;
        }
        self.in_flight_since = None;
        self.phase = self.settled_phase();
    }

    fn settled_phase(&self) -> RefreshPhase {
        if self.snapshot.is_some() {
            RefreshPhase::Ready
        } else {
            RefreshPhase::Idle
        }
    }

    pub fn complete(
        &mut self,
        generation: u64,
        result: std::result::Result<Vec<Page>, SourceError>,
    ) -> Completion {
        if generation != self.issued || !self.busy() {
            debug!(
                "Discarding response for generation {} (latest {})",
                generation, self.issued
            );
            return Completion::Discarded {
                generation,
                latest: self.issued,
            };
        }
        self.in_flight_since = None;

        match result {
            Ok(pages) => {
                self.phase = RefreshPhase::Building;
                let snapshot = Arc::new(self.build(generation, &pages));
                info!(
                    "Snapshot {}: {} nodes, {} edges ({} diagnostics)",
                    generation,
                    snapshot.nodes.len(),
                    snapshot.edges.len(),
                    snapshot.diagnostics.len()
                );
                self.snapshot = Some(snapshot.clone());
                self.stale = false;
                self.last_error = None;
                self.phase = RefreshPhase::Ready;
                Completion::Applied(snapshot)
            }
            Err(e) => {
                warn!("Fetch generation {} failed: {}", generation, e);
                self.stale = true;
                self.last_error = Some(e.to_string());
                self.phase = self.settled_phase();
                Completion::Failed(e)
            }
        }
    }

    fn build(&self, generation: u64, pages: &[Page]) -> GraphSnapshot {
        let mut graph = build_graph(pages, self.config.view_mode);
        self.layout.apply(&mut graph.nodes, &graph.edges);

        GraphSnapshot {
            generation,
            view_mode: self.config.view_mode,
            direction: self.layout.config().direction,
            nodes: graph.nodes,
            edges: graph.edges,
            diagnostics: graph.diagnostics,
            built_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Command {
    SetViewMode(ViewMode),
    SetRefreshMode(RefreshMode),
    SetScope(CrawlScope),
    Refresh,
    Shutdown,
}

type InFlight = BoxFuture<'static, (u64, std::result::Result<Vec<Page>, SourceError>)>;

/// Drives `RefreshState` from commands, the Live-mode timer and fetch
/// completions, all on one task. At most one fetch is held at a time; a
/// superseded or cancelled fetch is dropped, not left to finish.
pub struct RefreshController<S> {
    source: S,
    state: RefreshState,
    in_flight: Option<InFlight>,
    view_tx: watch::Sender<Arc<GraphView>>,
}

impl<S: DataSource + 'static> RefreshController<S> {
    pub fn new(source: S, config: RefreshConfig) -> Self {
        let state = RefreshState::new(config);
        let (view_tx, _) = watch::channel(Arc::new(state.view()));
        Self {
            source,
            state,
            in_flight: None,
            view_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<GraphView>> {
        self.view_tx.subscribe()
    }

    pub fn state(&self) -> &RefreshState {
        &self.state
    }

    /// First fetch, awaited inline. Failure here is a hard error.
    pub async fn prime(&mut self) -> Result<Arc<GraphSnapshot>> {
        let Some(ticket) = self.state.request(Trigger::Manual, Instant::now()) else {
            return Err(GraphError::ControllerBusy);
        };
        let result = self.source.fetch(&ticket.scope).await;
        let completion = self.state.complete(ticket.generation, result);
        self.publish();

        match completion {
            Completion::Applied(snapshot) => Ok(snapshot),
            Completion::Failed(e) => Err(GraphError::SourceUnavailable(e)),
            Completion::Discarded { .. } => Err(GraphError::ControllerBusy),
        }
    }

    pub fn spawn(self) -> (RefreshHandle, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::channel(16);
        let handle = RefreshHandle {
            commands: commands_tx,
            view: self.subscribe(),
        };
        let task = tokio::spawn(self.run(commands_rx));
        (handle, task)
    }

    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let interval = self.state.interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        if self.state.refresh_mode() == RefreshMode::Live && self.state.snapshot().is_none() {
            self.trigger(Trigger::Manual);
        }

        loop {
            let live = self.state.refresh_mode() == RefreshMode::Live;
            tokio::select! {
                command = commands.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => {
                        if self.handle(command) {
                            ticker.reset();
                        }
                    }
                },
                _ = ticker.tick(), if live => self.trigger(Trigger::Tick),
                (generation, result) = next_completion(&mut self.in_flight), if self.in_flight.is_some() => {
                    self.state.complete(generation, result);
                    self.publish();
                }
            }
        }

        debug!("Refresh controller stopping");
        self.state.cancel();
        self.in_flight = None;
        self.publish();
    }

    /// Returns true when the Live timer should restart.
    fn handle(&mut self, command: Command) -> bool {
        let now = Instant::now();
        let mut restart_timer = false;
        let ticket = match command {
            Command::SetViewMode(mode) => self.state.set_view_mode(mode, now),
            Command::SetScope(scope) => self.state.set_scope(scope, now),
            Command::SetRefreshMode(mode) => {
                let ticket = self.state.set_refresh_mode(mode, now);
                if mode == RefreshMode::Static {
                    self.in_flight = None;
                } else {
                    restart_timer = true;
                }
                ticket
            }
            Command::Refresh => self.state.request(Trigger::Manual, now),
            Command::Shutdown => None,
        };

        if let Some(ticket) = ticket {
            self.issue(ticket);
        }
        self.publish();
        restart_timer
    }

    fn trigger(&mut self, trigger: Trigger) {
        if let Some(ticket) = self.state.request(trigger, Instant::now()) {
            self.issue(ticket);
            self.publish();
        }
    }

    fn issue(&mut self, ticket: FetchTicket) {
        let generation = ticket.generation;
        if self.in_flight.take().is_some() {
            debug!("Dropped superseded fetch before generation {}", generation);
        }
        let fetch = self.source.fetch(&ticket.scope);
        self.in_flight = Some(async move { (generation, fetch.await) }.boxed());
    }

    fn publish(&self) {
        self.view_tx.send_replace(Arc::new(self.state.view()));
    }
}

/// Resolves with the held fetch and empties the slot. Pending forever when
/// nothing is held.
async fn next_completion(
    slot: &mut Option<InFlight>,
) -> (u64, std::result::Result<Vec<Page>, SourceError>) {
    match slot {
        Some(fetch) => {
            let completion = fetch.await;
            *slot = None;
            completion
        }
        None => future::pending().await,
    }
}

/// Cloneable control surface for a spawned `RefreshController`.
#[derive(Debug, Clone)]
pub struct RefreshHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<Arc<GraphView>>,
}

impl RefreshHandle {
    pub async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| GraphError::ControllerClosed)
    }

    pub async fn set_view_mode(&self, mode: ViewMode) -> Result<()> {
        self.send(Command::SetViewMode(mode)).await
    }

    pub async fn set_refresh_mode(&self, mode: RefreshMode) -> Result<()> {
        self.send(Command::SetRefreshMode(mode)).await
    }

    pub async fn set_scope(&self, scope: CrawlScope) -> Result<()> {
        self.send(Command::SetScope(scope)).await
    }

    pub async fn refresh(&self) -> Result<()> {
        self.send(Command::Refresh).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown).await
    }

    pub fn current(&self) -> Arc<GraphView> {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<GraphView>> {
        self.view.clone()
    }
}
