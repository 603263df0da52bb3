use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::location::LocationProvider;
use crate::models::order::Order;
use crate::observability::metrics::Metrics;
use crate::realtime::LocationPublisher;
use crate::session::SessionStore;

/// Source of the orders currently assigned to the logged-in driver.
#[async_trait]
pub trait OrderFeed: Send + Sync {
    async fn assigned_orders(&self) -> Result<Vec<Order>, AppError>;
}

/// What the driver's home screen renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderBoard {
    pub orders: Vec<Order>,
    pub loading: bool,
    pub last_error: Option<String>,
    /// Cycle whose result is currently shown; 0 before the first result.
    pub generation: u64,
    pub refreshed_at: Option<DateTime<Utc>>,
}

pub struct PollerDeps {
    pub feed: Arc<dyn OrderFeed>,
    pub location: Arc<dyn LocationProvider>,
    pub publisher: LocationPublisher,
    pub session: Arc<SessionStore>,
    pub metrics: Metrics,
}

pub struct OrderPoller {
    deps: Arc<PollerDeps>,
    interval: Duration,
    location_budget: Duration,
}

impl OrderPoller {
    /// The location step of a cycle gets a third of the interval.
    pub fn new(deps: PollerDeps, interval: Duration) -> Self {
        Self {
            deps: Arc::new(deps),
            interval,
            location_budget: interval / 3,
        }
    }

    pub fn with_location_budget(mut self, budget: Duration) -> Self {
        self.location_budget = budget;
        self
    }

    /// Runs the first cycle immediately, then one per interval, until the
    /// returned handle is shut down or dropped.
    pub fn start(self) -> PollerHandle {
        let (board_tx, board_rx) = watch::channel(OrderBoard {
            loading: true,
            ..OrderBoard::default()
        });
        let (refresh_tx, refresh_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(run_poller(
            self.deps,
            self.interval,
            self.location_budget,
            board_tx,
            refresh_rx,
            shutdown_rx,
        ));

        PollerHandle {
            board: board_rx,
            refresh_tx,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

pub struct PollerHandle {
    board: watch::Receiver<OrderBoard>,
    refresh_tx: mpsc::Sender<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn board(&self) -> OrderBoard {
        self.board.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<OrderBoard> {
        self.board.clone()
    }

    /// Requests an extra cycle outside the timer. Returns false if the
    /// poller is gone or already has refreshes queued.
    pub fn refresh(&self) -> bool {
        self.refresh_tx.try_send(()).is_ok()
    }

    /// Stops the timer and discards any cycle still in flight.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                if !err.is_cancelled() {
                    warn!(error = %err, "order poller task failed");
                }
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

type CycleResult = (u64, Result<Vec<Order>, AppError>);

async fn run_poller(
    deps: Arc<PollerDeps>,
    interval: Duration,
    location_budget: Duration,
    board_tx: watch::Sender<OrderBoard>,
    mut refresh_rx: mpsc::Receiver<()>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    info!(interval_secs = interval.as_secs(), "order poller started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut cycles: JoinSet<CycleResult> = JoinSet::new();
    let mut issued: u64 = 0;
    let mut applied: u64 = 0;

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown_rx => break,

            _ = ticker.tick() => {
                if !cycles.is_empty() {
                    debug!(in_flight = cycles.len(), "previous cycle still running; skipping tick");
                    deps.metrics.poll_cycles_total.with_label_values(&["skipped"]).inc();
                    continue;
                }
                issued += 1;
                spawn_cycle(&mut cycles, deps.clone(), issued, location_budget);
            }

            Some(()) = refresh_rx.recv() => {
                issued += 1;
                debug!(generation = issued, "manual refresh requested");
                spawn_cycle(&mut cycles, deps.clone(), issued, location_budget);
            }

            Some(joined) = cycles.join_next() => {
                match joined {
                    Ok((generation, result)) => {
                        if generation < applied {
                            debug!(generation, applied, "discarding stale order list");
                            deps.metrics.poll_cycles_total.with_label_values(&["stale"]).inc();
                            continue;
                        }
                        applied = generation;
                        apply_result(&deps, &board_tx, generation, result);
                    }
                    Err(err) => warn!(error = %err, "poll cycle task failed"),
                }
            }
        }
    }

    cycles.abort_all();
    info!(cycles = issued, "order poller stopped");
}

/// Publish is polled first but the fetch never waits on it; a fix that does
/// not arrive within `location_budget` is abandoned.
fn spawn_cycle(
    cycles: &mut JoinSet<CycleResult>,
    deps: Arc<PollerDeps>,
    generation: u64,
    location_budget: Duration,
) {
    cycles.spawn(async move {
        let ((), result) = tokio::join!(
            publish_location(&deps, location_budget),
            deps.feed.assigned_orders(),
        );
        (generation, result)
    });
}

fn apply_result(
    deps: &PollerDeps,
    board_tx: &watch::Sender<OrderBoard>,
    generation: u64,
    result: Result<Vec<Order>, AppError>,
) {
    match result {
        Ok(orders) => {
            deps.metrics.assigned_orders.set(orders.len() as i64);
            deps.metrics.poll_cycles_total.with_label_values(&["success"]).inc();
            debug!(generation, count = orders.len(), "order list replaced");

            board_tx.send_modify(|board| {
                board.orders = orders;
                board.loading = false;
                board.last_error = None;
                board.generation = generation;
                board.refreshed_at = Some(Utc::now());
            });
        }
        Err(err) => {
            deps.metrics.poll_cycles_total.with_label_values(&["error"]).inc();
            warn!(generation, error = %err, "failed to fetch driver orders");

            board_tx.send_modify(|board| {
                board.loading = false;
                board.last_error = Some(err.user_message());
                board.generation = generation;
            });
        }
    }
}

async fn publish_location(deps: &PollerDeps, budget: Duration) {
    if tokio::time::timeout(budget, publish_once(deps)).await.is_err() {
        warn!(budget_ms = budget.as_millis() as u64, "location step timed out; skipping publish");
        deps.metrics.location_publish_total.with_label_values(&["skipped"]).inc();
    }
}

/// Never fails: a missing session, a denied permission or a failed write
/// only skips this cycle's publish.
async fn publish_once(deps: &PollerDeps) {
    let Some(session) = deps.session.get_all() else {
        debug!("no session; skipping location publish");
        deps.metrics.location_publish_total.with_label_values(&["skipped"]).inc();
        return;
    };

    let point = match deps.location.current_location().await {
        Ok(point) => point,
        Err(err) => {
            warn!(error = %err, "location unavailable; skipping publish");
            deps.metrics.location_publish_total.with_label_values(&["skipped"]).inc();
            return;
        }
    };

    match deps.publisher.publish(&session.driver_id, point).await {
        Ok(_) => {
            deps.metrics.location_publish_total.with_label_values(&["success"]).inc();
        }
        Err(err) => {
            warn!(driver_id = %session.driver_id, error = %err, "failed to publish driver location");
            deps.metrics.location_publish_total.with_label_values(&["error"]).inc();
        }
    }
}
