// Tests for the refresh state machine and controller

use crawlgraph_core::error::GraphError;
use crawlgraph_core::graph::{RefreshMode, ViewMode};
use crawlgraph_core::refresh::{
    Completion, RefreshConfig, RefreshController, RefreshPhase, RefreshState, Trigger,
};
use crawlgraph_source::{
    CrawlRecord, CrawlRecordRef, CrawlScope, DataSource, Page, SourceError,
};
use futures::future::{self, BoxFuture, FutureExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

fn page(url: &str, links: &[&str]) -> Page {
    links.iter().fold(
        Page::new(url, CrawlRecordRef::new("1", "^https://a.com")),
        |page, link| page.with_link(*link),
    )
}

fn crawl() -> Vec<Page> {
    vec![
        page("https://a.com/", &["https://a.com/about", "https://b.com/"]),
        page("https://a.com/about", &["https://a.com/"]),
    ]
}

fn live_config() -> RefreshConfig {
    RefreshConfig {
        refresh_mode: RefreshMode::Live,
        ..RefreshConfig::default()
    }
}

// ============================================================================
// Scripted data source
// ============================================================================

enum Step {
    Pages(Vec<Page>),
    Fail,
    Hang,
}

/// Plays back queued steps, then serves `crawl()` forever (or hangs, when
/// built with `hanging`).
#[derive(Default)]
struct ScriptedSource {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    scopes: Mutex<Vec<CrawlScope>>,
    hang_when_empty: bool,
    pending: Arc<AtomicUsize>,
}

/// Counts a hanging fetch until its future is dropped.
struct PendingGuard(Arc<AtomicUsize>);

impl PendingGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedSource {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            ..Self::default()
        })
    }

    fn hanging() -> Arc<Self> {
        Arc::new(Self {
            hang_when_empty: true,
            ..Self::default()
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Hanging fetch futures that have not been dropped yet.
    fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    fn hang(&self) -> BoxFuture<'static, crawlgraph_source::error::Result<Vec<Page>>> {
        let guard = PendingGuard::new(&self.pending);
        async move {
            let _guard = guard;
            future::pending().await
        }
        .boxed()
    }
}

impl DataSource for ScriptedSource {
    fn fetch(&self, scope: &CrawlScope) -> BoxFuture<'static, crawlgraph_source::error::Result<Vec<Page>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.scopes.lock().unwrap().push(scope.clone());
        match self.steps.lock().unwrap().pop_front() {
            Some(Step::Pages(pages)) => future::ready(Ok(pages)).boxed(),
            Some(Step::Fail) => future::ready(Err(SourceError::MissingData)).boxed(),
            Some(Step::Hang) => self.hang(),
            None if self.hang_when_empty => self.hang(),
            None => future::ready(Ok(crawl())).boxed(),
        }
    }

    fn records(&self) -> BoxFuture<'static, crawlgraph_source::error::Result<Vec<CrawlRecord>>> {
        future::ready(Ok(Vec::new())).boxed()
    }
}

// ============================================================================
// State Machine Tests
// ============================================================================

#[test]
fn test_first_request_issues_generation_one() {
    let mut state = RefreshState::new(RefreshConfig::default());
    assert_eq!(state.phase(), RefreshPhase::Idle);

    let ticket = state.request(Trigger::Manual, Instant::now()).unwrap();
    assert_eq!(ticket.generation, 1);
    assert_eq!(ticket.scope, CrawlScope::All);
    assert_eq!(state.phase(), RefreshPhase::Fetching);
}

#[test]
fn test_triggers_coalesce_while_fetching() {
    let mut state = RefreshState::new(live_config());
    let now = Instant::now();
    state.request(Trigger::Manual, now).unwrap();

    assert!(state.request(Trigger::Manual, now).is_none());
    assert!(state.request(Trigger::Tick, now + Duration::from_secs(5)).is_none());
    assert_eq!(state.latest_generation(), 1);
}

#[test]
fn test_mode_change_supersedes_in_flight_fetch() {
    let mut state = RefreshState::new(RefreshConfig::default());
    let now = Instant::now();
    state.request(Trigger::Manual, now).unwrap();

    let ticket = state.set_view_mode(ViewMode::Domain, now).unwrap();
    assert_eq!(ticket.generation, 2);
    assert_eq!(state.view_mode(), ViewMode::Domain);
}

#[test]
fn test_successful_fetch_is_applied() {
    let mut state = RefreshState::new(RefreshConfig::default());
    let ticket = state.request(Trigger::Manual, Instant::now()).unwrap();

    let snapshot = match state.complete(ticket.generation, Ok(crawl())) {
        Completion::Applied(snapshot) => snapshot,
        other => panic!("expected applied, got {:?}", other),
    };

    assert_eq!(snapshot.generation, 1);
    assert_eq!(snapshot.view_mode, ViewMode::Website);
    assert_eq!(snapshot.nodes.len(), 2);
    assert_eq!(snapshot.edges.len(), 2);
    assert_eq!(state.phase(), RefreshPhase::Ready);
    assert!(!state.view().stale);
}

#[test]
fn test_late_response_from_older_generation_is_discarded() {
    let mut state = RefreshState::new(RefreshConfig::default());
    let now = Instant::now();
    let first = state.request(Trigger::Manual, now).unwrap();
    let second = state.set_view_mode(ViewMode::Domain, now).unwrap();

    assert!(matches!(
        state.complete(second.generation, Ok(crawl())),
        Completion::Applied(_)
    ));
    let applied = state.snapshot().unwrap().clone();

    match state.complete(first.generation, Ok(vec![page("https://z.com/", &[])])) {
        Completion::Discarded { generation, latest } => {
            assert_eq!(generation, 1);
            assert_eq!(latest, 2);
        }
        other => panic!("expected discard, got {:?}", other),
    }
    assert!(Arc::ptr_eq(state.snapshot().unwrap(), &applied));
    assert_eq!(applied.view_mode, ViewMode::Domain);
}

#[test]
fn test_older_generation_arriving_first_is_discarded() {
    let mut state = RefreshState::new(RefreshConfig::default());
    let now = Instant::now();
    let first = state.request(Trigger::Manual, now).unwrap();
    let second = state.set_view_mode(ViewMode::Domain, now).unwrap();

    assert!(matches!(
        state.complete(first.generation, Ok(crawl())),
        Completion::Discarded { .. }
    ));
    assert!(state.snapshot().is_none());
    assert_eq!(state.phase(), RefreshPhase::Fetching);

    assert!(matches!(
        state.complete(second.generation, Ok(crawl())),
        Completion::Applied(_)
    ));
}

#[test]
fn test_failed_fetch_keeps_previous_snapshot() {
    let mut state = RefreshState::new(RefreshConfig::default());
    let ticket = state.request(Trigger::Manual, Instant::now()).unwrap();
    state.complete(ticket.generation, Ok(crawl()));
    let before = state.snapshot().unwrap().clone();

    let ticket = state.request(Trigger::Manual, Instant::now()).unwrap();
    assert!(matches!(
        state.complete(ticket.generation, Err(SourceError::MissingData)),
        Completion::Failed(SourceError::MissingData)
    ));

    let view = state.view();
    assert!(view.stale);
    assert!(view.last_error.is_some());
    assert_eq!(view.phase, RefreshPhase::Ready);
    assert!(Arc::ptr_eq(view.snapshot.as_ref().unwrap(), &before));

    let ticket = state.request(Trigger::Manual, Instant::now()).unwrap();
    state.complete(ticket.generation, Ok(crawl()));
    let view = state.view();
    assert!(!view.stale);
    assert!(view.last_error.is_none());
}

#[test]
fn test_failed_first_fetch_returns_to_idle() {
    let mut state = RefreshState::new(RefreshConfig::default());
    let ticket = state.request(Trigger::Manual, Instant::now()).unwrap();
    state.complete(ticket.generation, Err(SourceError::MissingData));

    assert_eq!(state.phase(), RefreshPhase::Idle);
    assert!(state.snapshot().is_none());
}

#[test]
fn test_switching_to_static_cancels_in_flight_fetch() {
    let mut state = RefreshState::new(live_config());
    let now = Instant::now();
    let ticket = state.request(Trigger::Tick, now).unwrap();

    assert!(state.set_refresh_mode(RefreshMode::Static, now).is_none());
    assert_eq!(state.phase(), RefreshPhase::Idle);
    assert!(matches!(
        state.complete(ticket.generation, Ok(crawl())),
        Completion::Discarded { .. }
    ));
    assert!(state.snapshot().is_none());
}

#[test]
fn test_switching_to_live_requests_immediately() {
    let mut state = RefreshState::new(RefreshConfig::default());
    let ticket = state.set_refresh_mode(RefreshMode::Live, Instant::now());
    assert_eq!(ticket.map(|t| t.generation), Some(1));
    assert_eq!(state.refresh_mode(), RefreshMode::Live);
}

#[test]
fn test_unchanged_settings_do_not_request() {
    let mut state = RefreshState::new(RefreshConfig::default());
    let now = Instant::now();
    assert!(state.set_view_mode(ViewMode::Website, now).is_none());
    assert!(state.set_refresh_mode(RefreshMode::Static, now).is_none());
    assert!(state.set_scope(CrawlScope::All, now).is_none());
    assert_eq!(state.latest_generation(), 0);
}

#[test]
fn test_scope_change_is_carried_on_ticket() {
    let mut state = RefreshState::new(RefreshConfig::default());
    let scope = CrawlScope::Records(vec!["7".to_string()]);
    let ticket = state.set_scope(scope.clone(), Instant::now()).unwrap();
    assert_eq!(ticket.scope, scope);
    assert_eq!(state.scope(), &scope);
}

#[test]
fn test_stuck_live_fetch_is_superseded_after_stale_after() {
    let mut state = RefreshState::new(RefreshConfig {
        stale_after: Duration::from_secs(15),
        ..live_config()
    });
    let start = Instant::now();
    state.request(Trigger::Manual, start).unwrap();

    assert!(state.request(Trigger::Tick, start + Duration::from_secs(10)).is_none());
    let ticket = state.request(Trigger::Tick, start + Duration::from_secs(15)).unwrap();
    assert_eq!(ticket.generation, 2);
}

#[test]
fn test_static_mode_never_supersedes_on_age() {
    let mut state = RefreshState::new(RefreshConfig::default());
    let start = Instant::now();
    state.request(Trigger::Manual, start).unwrap();

    assert!(state.request(Trigger::Tick, start + Duration::from_secs(600)).is_none());
    assert!(state.request(Trigger::Manual, start + Duration::from_secs(600)).is_none());
}

#[test]
fn test_snapshot_uses_view_mode_at_completion() {
    let mut state = RefreshState::new(RefreshConfig {
        view_mode: ViewMode::Domain,
        ..RefreshConfig::default()
    });
    let ticket = state.request(Trigger::Manual, Instant::now()).unwrap();
    state.complete(ticket.generation, Ok(crawl()));

    let snapshot = state.snapshot().unwrap();
    assert_eq!(snapshot.view_mode, ViewMode::Domain);
    let hosts: Vec<&str> = snapshot.nodes.iter().map(|n| n.label()).collect();
    assert_eq!(hosts, vec!["a.com", "b.com"]);
    assert_eq!(snapshot.restricted_count(), 1);
}

// ============================================================================
// Controller Tests
// ============================================================================

#[tokio::test]
async fn test_prime_failure_is_source_unavailable() {
    let source = ScriptedSource::new(vec![Step::Fail]);
    let mut controller = RefreshController::new(source, RefreshConfig::default());

    let err = controller.prime().await.unwrap_err();
    assert!(matches!(err, GraphError::SourceUnavailable(SourceError::MissingData)));
    assert!(controller.subscribe().borrow().last_error.is_some());
}

#[tokio::test]
async fn test_prime_publishes_snapshot() {
    let source = ScriptedSource::new(vec![]);
    let mut controller = RefreshController::new(source, RefreshConfig::default());
    let view = controller.subscribe();

    let snapshot = controller.prime().await.unwrap();
    assert_eq!(snapshot.generation, 1);
    assert_eq!(view.borrow().phase, RefreshPhase::Ready);
    assert_eq!(
        view.borrow().snapshot.as_ref().map(|s| s.generation),
        Some(1)
    );
}

#[tokio::test(start_paused = true)]
async fn test_static_mode_does_not_poll() {
    let source = ScriptedSource::new(vec![]);
    let mut controller = RefreshController::new(source.clone(), RefreshConfig::default());
    controller.prime().await.unwrap();
    let (handle, task) = controller.spawn();

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(source.calls(), 1);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_live_mode_polls_on_interval() {
    let source = ScriptedSource::new(vec![]);
    let controller = RefreshController::new(source.clone(), live_config());
    let (handle, task) = controller.spawn();

    let mut view = handle.subscribe();
    view.wait_for(|v| v.snapshot.as_ref().is_some_and(|s| s.generation >= 3))
        .await
        .unwrap();
    assert!(source.calls() >= 3);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_view_mode_change_rebuilds_through_handle() {
    let source = ScriptedSource::new(vec![]);
    let mut controller = RefreshController::new(source, RefreshConfig::default());
    controller.prime().await.unwrap();
    let (handle, task) = controller.spawn();

    handle.set_view_mode(ViewMode::Domain).await.unwrap();
    let mut view = handle.subscribe();
    let current = view
        .wait_for(|v| {
            v.snapshot
                .as_ref()
                .is_some_and(|s| s.view_mode == ViewMode::Domain)
        })
        .await
        .unwrap()
        .clone();

    assert_eq!(current.view_mode, ViewMode::Domain);
    assert_eq!(current.phase, RefreshPhase::Ready);
    assert!(current.snapshot.as_ref().unwrap().generation >= 2);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_hung_live_fetch_is_superseded() {
    let source = ScriptedSource::new(vec![Step::Hang]);
    let controller = RefreshController::new(
        source.clone(),
        RefreshConfig {
            interval: Duration::from_secs(5),
            stale_after: Duration::from_secs(15),
            ..live_config()
        },
    );
    let start = Instant::now();
    let (handle, task) = controller.spawn();

    let mut view = handle.subscribe();
    let generation = view
        .wait_for(|v| v.snapshot.is_some())
        .await
        .unwrap()
        .snapshot
        .as_ref()
        .map(|s| s.generation);

    assert_eq!(generation, Some(2));
    assert!(start.elapsed() >= Duration::from_secs(15));

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_switching_to_static_drops_hung_fetch() {
    let source = ScriptedSource::new(vec![Step::Hang]);
    let controller = RefreshController::new(source.clone(), live_config());
    let (handle, task) = controller.spawn();

    let mut view = handle.subscribe();
    view.wait_for(|v| v.phase == RefreshPhase::Fetching)
        .await
        .unwrap();

    handle.set_refresh_mode(RefreshMode::Static).await.unwrap();
    let current = view
        .wait_for(|v| v.refresh_mode == RefreshMode::Static)
        .await
        .unwrap()
        .clone();
    assert_eq!(current.phase, RefreshPhase::Idle);
    assert!(current.snapshot.is_none());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(source.calls(), 1);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_scope_change_reaches_source() {
    let source = ScriptedSource::new(vec![]);
    let mut controller = RefreshController::new(source.clone(), RefreshConfig::default());
    controller.prime().await.unwrap();
    let (handle, task) = controller.spawn();

    let scope = CrawlScope::Records(vec!["3".to_string()]);
    handle.set_scope(scope.clone()).await.unwrap();
    handle
        .subscribe()
        .wait_for(|v| v.snapshot.as_ref().is_some_and(|s| s.generation == 2))
        .await
        .unwrap();

    assert_eq!(source.scopes.lock().unwrap().last(), Some(&scope));

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_commands_fail_after_shutdown() {
    let source = ScriptedSource::new(vec![]);
    let mut controller = RefreshController::new(source, RefreshConfig::default());
    controller.prime().await.unwrap();
    let (handle, task) = controller.spawn();

    handle.shutdown().await.unwrap();
    task.await.unwrap();

    assert!(matches!(
        handle.refresh().await,
        Err(GraphError::ControllerClosed)
    ));
    assert_eq!(handle.current().phase, RefreshPhase::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_superseded_live_fetches_are_dropped() {
    let source = ScriptedSource::hanging();
    let controller = RefreshController::new(
        source.clone(),
        RefreshConfig {
            interval: Duration::from_secs(1),
            stale_after: Duration::from_secs(3),
            ..live_config()
        },
    );
    let (handle, task) = controller.spawn();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(source.calls() > 1);
    assert!(source.pending() <= 1);

    for i in 0..40 {
        let mode = if i % 2 == 0 {
            ViewMode::Domain
        } else {
            ViewMode::Website
        };
        handle.set_view_mode(mode).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(source.calls() > 40);
    assert!(source.pending() <= 1);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
    assert_eq!(source.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_switching_to_static_drops_pending_fetch() {
    let source = ScriptedSource::hanging();
    let controller = RefreshController::new(source.clone(), live_config());
    let (handle, task) = controller.spawn();

    let mut view = handle.subscribe();
    view.wait_for(|v| v.phase == RefreshPhase::Fetching)
        .await
        .unwrap();
    assert_eq!(source.pending(), 1);

    handle.set_refresh_mode(RefreshMode::Static).await.unwrap();
    view.wait_for(|v| v.refresh_mode == RefreshMode::Static)
        .await
        .unwrap();
    assert_eq!(source.pending(), 0);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_primed_live_controller_waits_for_first_tick() {
    let source = ScriptedSource::new(vec![]);
    let mut controller = RefreshController::new(
        source.clone(),
        RefreshConfig {
            interval: Duration::from_secs(5),
            ..live_config()
        },
    );
    controller.prime().await.unwrap();
    let start = Instant::now();
    let (handle, task) = controller.spawn();

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(source.calls(), 1);

    handle
        .subscribe()
        .wait_for(|v| v.snapshot.as_ref().is_some_and(|s| s.generation == 2))
        .await
        .unwrap();
    assert!(start.elapsed() >= Duration::from_secs(5));
    assert_eq!(source.calls(), 2);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}
