use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use dashmap::{DashMap, DashSet};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::dispatch::DispatchCoordinator;
use crate::executor::SearchExecutor;
use crate::state::{KeywordRegistry, RunLog};
use crate::throttle::{self, NightPolicy};
use crate::types::{Keyword, RunOutcome, RunRecord, TriggeredBy};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Injected wall clock so the throttle policy is testable at fixed instants.
/// Times are local; the night window is a local wall-clock concept.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

// ---------------------------------------------------------------------------
// Shared scheduler state
// ---------------------------------------------------------------------------

/// Per-keyword scheduling state, owned by the scheduler and read by the API.
/// `running` doubles as the per-keyword exclusion lock: a keyword id is a
/// member for exactly the duration of one run, so runs for the same keyword
/// can never overlap while runs for different keywords proceed in parallel.
pub struct SchedulerState {
    last_run: DashMap<String, NaiveDateTime>,
    running: DashSet<String>,
    pending_manual: DashSet<String>,
}

impl SchedulerState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            last_run: DashMap::new(),
            running: DashSet::new(),
            pending_manual: DashSet::new(),
        })
    }

    pub fn last_run_at(&self, keyword_id: &str) -> Option<NaiveDateTime> {
        self.last_run.get(keyword_id).map(|e| *e.value())
    }

    pub fn is_running(&self, keyword_id: &str) -> bool {
        self.running.contains(keyword_id)
    }

    pub fn manual_pending(&self, keyword_id: &str) -> bool {
        self.pending_manual.contains(keyword_id)
    }

    /// Advances the keyword's clock. Called only after a successful run;
    /// failed runs leave it unchanged so the next tick retries promptly.
    pub fn note_run_completed(&self, keyword_id: &str, at: NaiveDateTime) {
        self.last_run.insert(keyword_id.to_string(), at);
    }

    /// Forget the keyword's last run (used by "reset results": the keyword
    /// behaves as brand new and is due on the next tick).
    pub fn clear_last_run(&self, keyword_id: &str) {
        self.last_run.remove(keyword_id);
    }

    /// Acquire the run lock; false when a run is already in flight.
    fn begin_run(&self, keyword_id: &str) -> bool {
        self.running.insert(keyword_id.to_string())
    }

    fn end_run(&self, keyword_id: &str) {
        self.running.remove(keyword_id);
    }

    /// Drop state for keywords no longer in the registry. In-flight runs are
    /// left alone; they release their own lock when they finish.
    fn retain_keywords(&self, live: &HashSet<String>) {
        self.last_run.retain(|id, _| live.contains(id));
        self.pending_manual.retain(|id| live.contains(id));
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct Scheduler {
    registry: Arc<KeywordRegistry>,
    state: Arc<SchedulerState>,
    executor: Arc<SearchExecutor>,
    dispatcher: Arc<DispatchCoordinator>,
    run_log: Arc<RunLog>,
    night: NightPolicy,
    clock: Arc<dyn Clock>,
    manual_rx: mpsc::Receiver<String>,
    shutdown_rx: watch::Receiver<bool>,
    tick: Duration,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<KeywordRegistry>,
        state: Arc<SchedulerState>,
        executor: Arc<SearchExecutor>,
        dispatcher: Arc<DispatchCoordinator>,
        run_log: Arc<RunLog>,
        night: NightPolicy,
        clock: Arc<dyn Clock>,
        manual_rx: mpsc::Receiver<String>,
        shutdown_rx: watch::Receiver<bool>,
        tick: Duration,
    ) -> Self {
        Self {
            registry,
            state,
            executor,
            dispatcher,
            run_log,
            night,
            clock,
            manual_rx,
            shutdown_rx,
            tick,
        }
    }

    pub async fn run(mut self) {
        let mut ticker = interval(self.tick);
        let mut in_flight: JoinSet<()> = JoinSet::new();
        info!(tick_secs = self.tick.as_secs(), "scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Reap finished runs so the JoinSet does not grow unbounded.
                    while in_flight.try_join_next().is_some() {}
                    self.tick_once(&mut in_flight);
                }
                Some(keyword_id) = self.manual_rx.recv() => {
                    self.handle_manual(keyword_id, &mut in_flight);
                }
                _ = self.shutdown_rx.changed() => break,
            }
        }

        // Let in-flight runs finish their store writes before exiting.
        info!("scheduler stopping; waiting for in-flight runs");
        while in_flight.join_next().await.is_some() {}
        info!("scheduler stopped");
    }

    /// One pass over the registry snapshot. Deleted keywords disappear from
    /// scheduler state here; edited keywords take effect because the snapshot
    /// is re-read every tick.
    fn tick_once(&self, in_flight: &mut JoinSet<()>) {
        let snapshot = self.registry.snapshot();
        let live: HashSet<String> = snapshot.iter().map(|kw| kw.id.clone()).collect();
        self.state.retain_keywords(&live);

        let now = self.clock.now();
        for keyword in snapshot {
            if self.state.is_running(&keyword.id) {
                continue;
            }
            if self.state.manual_pending(&keyword.id) {
                self.launch(keyword, TriggeredBy::Manual, in_flight);
            } else if throttle::is_due(&keyword, &self.night, now, self.state.last_run_at(&keyword.id)) {
                self.launch(keyword, TriggeredBy::Scheduled, in_flight);
            }
        }
    }

    /// Manual triggers launch immediately when the keyword is idle. While a
    /// run is in flight the request is parked in pending_manual, which is a
    /// set; any number of repeat requests coalesce into one queued run.
    fn handle_manual(&self, keyword_id: String, in_flight: &mut JoinSet<()>) {
        let Some(keyword) = self.registry.get(&keyword_id) else {
            warn!(keyword = %keyword_id, "manual trigger for unknown keyword ignored");
            return;
        };
        self.state.pending_manual.insert(keyword_id);
        if !self.state.is_running(&keyword.id) {
            self.launch(keyword, TriggeredBy::Manual, in_flight);
        }
    }

    fn launch(&self, keyword: Keyword, triggered_by: TriggeredBy, in_flight: &mut JoinSet<()>) {
        if !self.state.begin_run(&keyword.id) {
            return;
        }
        self.state.pending_manual.remove(&keyword.id);

        let state = Arc::clone(&self.state);
        let executor = Arc::clone(&self.executor);
        let dispatcher = Arc::clone(&self.dispatcher);
        let run_log = Arc::clone(&self.run_log);
        let clock = Arc::clone(&self.clock);
        in_flight.spawn(async move {
            run_keyword(keyword, triggered_by, state, executor, dispatcher, run_log, clock).await;
        });
    }
}

/// One run: fetch → filter → dedup → notify, with the outcome recorded.
async fn run_keyword(
    keyword: Keyword,
    triggered_by: TriggeredBy,
    state: Arc<SchedulerState>,
    executor: Arc<SearchExecutor>,
    dispatcher: Arc<DispatchCoordinator>,
    run_log: Arc<RunLog>,
    clock: Arc<dyn Clock>,
) {
    let started_at = clock.now();

    let (outcome, fetched, new) = match executor.execute(&keyword).await {
        Err(e) => {
            warn!(keyword = %keyword.id, "fetch failed, will retry next tick: {e}");
            (RunOutcome::FetchError, 0, 0)
        }
        Ok(candidates) => {
            let fetched = candidates.len();
            match dispatcher.dispatch(&keyword, &candidates, clock.now()).await {
                Err(e) => {
                    error!(keyword = %keyword.id, "store failure, run aborted: {e}");
                    (RunOutcome::StoreError, fetched, 0)
                }
                Ok(newly_reported) => {
                    state.note_run_completed(&keyword.id, clock.now());
                    let outcome = if fetched == 0 {
                        RunOutcome::Empty
                    } else {
                        RunOutcome::Success
                    };
                    (outcome, fetched, newly_reported.len())
                }
            }
        }
    };

    info!(
        keyword = %keyword.id,
        trigger = %triggered_by,
        outcome = %outcome,
        fetched,
        new,
        "run finished"
    );
    run_log.push(RunRecord {
        keyword_id: keyword.id.clone(),
        triggered_by,
        started_at,
        outcome,
        fetched,
        new,
    });
    state.end_run(&keyword.id);
}
