//! Status polling for submitted queries.
//!
//! A non-terminal query gets one poll task. The task asks the backend for
//! the query's status once per interval and writes each answer into the
//! shared [`QueryRegistry`] under the query's id. It stops on the first of:
//!
//! - a terminal status (completed or failed)
//! - a failed status request (no retry)
//! - the wall-clock timeout
//! - an abort from the owning [`PollHandle`], including the handle being
//!   dropped
//!
//! The first request goes out one interval after the task starts. A tick
//! that lands exactly on the deadline is not issued, so with a 2s interval
//! and a 120s timeout a query is polled at most 59 times.

use crate::api_client::RecruiterApiClient;
use crate::config::Config;
use crate::errors::{AppError, GENERIC_POLL_ERROR};
use crate::models::Query;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Anything that can report the current state of a query by id.
pub trait StatusSource: Send + Sync + 'static {
    fn fetch_status(
        &self,
        query_id: &str,
    ) -> impl Future<Output = Result<Query, AppError>> + Send;
}

impl StatusSource for RecruiterApiClient {
    fn fetch_status(
        &self,
        query_id: &str,
    ) -> impl Future<Output = Result<Query, AppError>> + Send {
        self.get_query_status(query_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(crate::config::DEFAULT_POLL_INTERVAL_SECS),
            timeout: Duration::from_secs(crate::config::DEFAULT_POLL_TIMEOUT_SECS),
        }
    }
}

impl From<&Config> for PollConfig {
    fn from(config: &Config) -> Self {
        Self {
            interval: config.poll_interval,
            timeout: config.poll_timeout,
        }
    }
}

/// Where the client is in following a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    /// Not followed by any poll task (terminal on submission, or looked up
    /// by id).
    Idle,
    Polling,
    /// Reached completed or failed.
    Finished,
    /// A status request failed; holds the user-visible message.
    Errored(String),
    TimedOut,
    Aborted,
}

impl PollState {
    /// True once the poll task for this record has stopped.
    pub fn is_settled(&self) -> bool {
        !matches!(self, PollState::Polling)
    }
}

/// A query as the client last saw it, plus how polling went.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedQuery {
    pub query: Query,
    pub poll_state: PollState,
    /// Status requests issued so far.
    pub polls: u32,
}

impl TrackedQuery {
    pub fn new(query: Query) -> Self {
        let poll_state = if query.is_terminal() {
            PollState::Idle
        } else {
            PollState::Polling
        };
        Self {
            query,
            poll_state,
            polls: 0,
        }
    }

    /// A record nobody polls, e.g. one looked up by id.
    pub fn unfollowed(query: Query) -> Self {
        Self {
            query,
            poll_state: PollState::Idle,
            polls: 0,
        }
    }
}

/// In-flight and finished query records keyed by query id.
pub type QueryRegistry = Arc<RwLock<HashMap<String, TrackedQuery>>>;

pub fn new_registry() -> QueryRegistry {
    Arc::new(RwLock::new(HashMap::new()))
}

/// How a poll task ended.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// The query reached completed or failed.
    Finished(Query),
    /// The deadline passed first; holds the last known state.
    TimedOut { last: Query, waited: Duration },
    /// The owner aborted or dropped the handle.
    Aborted(Query),
    /// A status request failed.
    Errored { last: Query, error: AppError },
}

/// Owning handle for one poll task. Dropping it aborts the task.
pub struct PollHandle {
    query_id: String,
    updates: watch::Receiver<Query>,
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<PollOutcome>,
}

impl PollHandle {
    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    /// Latest state written by the task.
    pub fn latest(&self) -> Query {
        self.updates.borrow().clone()
    }

    /// Receiver that wakes on every fetched status.
    pub fn subscribe(&self) -> watch::Receiver<Query> {
        self.updates.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Asks the task to stop. In-flight requests are dropped.
    pub fn abort(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            tracing::debug!("Abort requested for query {}", self.query_id);
            let _ = cancel.send(());
        }
    }

    /// Waits for the task to end.
    pub async fn wait(self) -> Result<PollOutcome, AppError> {
        let PollHandle {
            query_id,
            cancel,
            task,
            ..
        } = self;
        // Hold the sender so waiting is not mistaken for a drop.
        let _cancel = cancel;
        task.await
            .map_err(|e| AppError::Internal(format!("poll task for {} died: {}", query_id, e)))
    }
}

/// Starts following `initial` and returns the owning handle.
///
/// The caller is expected to have recorded `initial` in `registry` already.
/// If `initial` is terminal the task ends without issuing any request.
pub fn spawn_poll<S: StatusSource>(
    source: Arc<S>,
    initial: Query,
    registry: QueryRegistry,
    config: PollConfig,
) -> PollHandle {
    let query_id = initial.query_id.clone();
    let (updates_tx, updates_rx) = watch::channel(initial.clone());
    let (cancel_tx, cancel_rx) = oneshot::channel();

    tracing::info!(
        "Following query {} every {:?} for up to {:?}",
        query_id,
        config.interval,
        config.timeout
    );

    let task = tokio::spawn(run_poll(
        source, initial, registry, config, updates_tx, cancel_rx,
    ));

    PollHandle {
        query_id,
        updates: updates_rx,
        cancel: Some(cancel_tx),
        task,
    }
}

enum Wake<T> {
    Ready(T),
    Cancelled,
    Deadline,
}

async fn run_poll<S: StatusSource>(
    source: Arc<S>,
    mut current: Query,
    registry: QueryRegistry,
    config: PollConfig,
    updates: watch::Sender<Query>,
    mut cancel: oneshot::Receiver<()>,
) -> PollOutcome {
    let query_id = current.query_id.clone();

    if current.is_terminal() {
        tracing::debug!("Query {} already {}; not polling", query_id, current.status);
        record(&registry, &current, PollState::Idle, 0).await;
        return PollOutcome::Finished(current);
    }

    let started = Instant::now();
    let deadline = tokio::time::sleep_until(started + config.timeout);
    tokio::pin!(deadline);

    let mut ticker = tokio::time::interval_at(started + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut polls: u32 = 0;

    loop {
        let wake = tokio::select! {
            biased;
            _ = &mut cancel => Wake::Cancelled,
            _ = &mut deadline => Wake::Deadline,
            _ = ticker.tick() => Wake::Ready(()),
        };
        match wake {
            Wake::Ready(()) => {}
            Wake::Cancelled => return aborted(&registry, current, polls).await,
            Wake::Deadline => return timed_out(&registry, current, polls, config.timeout).await,
        }

        polls += 1;
        tracing::debug!("Polling query {} (#{})", query_id, polls);

        let wake = tokio::select! {
            biased;
            _ = &mut cancel => Wake::Cancelled,
            _ = &mut deadline => Wake::Deadline,
            result = source.fetch_status(&query_id) => Wake::Ready(result),
        };

        let fetched = match wake {
            Wake::Ready(result) => result,
            Wake::Cancelled => return aborted(&registry, current, polls).await,
            Wake::Deadline => return timed_out(&registry, current, polls, config.timeout).await,
        };

        match fetched {
            Ok(query) => {
                if query.query_id != query_id {
                    tracing::warn!(
                        "Status for {} came back as {}; keeping original id",
                        query_id,
                        query.query_id
                    );
                }
                current = Query {
                    query_id: query_id.clone(),
                    ..query
                };
                let _ = updates.send(current.clone());

                if current.is_terminal() {
                    tracing::info!(
                        "Query {} {} after {} poll(s)",
                        query_id,
                        current.status,
                        polls
                    );
                    record(&registry, &current, PollState::Finished, polls).await;
                    return PollOutcome::Finished(current);
                }
                record(&registry, &current, PollState::Polling, polls).await;
            }
            Err(error) => {
                tracing::error!("Status request for query {} failed: {}", query_id, error);
                record(
                    &registry,
                    &current,
                    PollState::Errored(GENERIC_POLL_ERROR.to_string()),
                    polls,
                )
                .await;
                return PollOutcome::Errored {
                    last: current,
                    error,
                };
            }
        }
    }
}

async fn aborted(registry: &QueryRegistry, current: Query, polls: u32) -> PollOutcome {
    tracing::info!("Stopped polling query {} on request", current.query_id);
    record(registry, &current, PollState::Aborted, polls).await;
    PollOutcome::Aborted(current)
}

async fn timed_out(
    registry: &QueryRegistry,
    current: Query,
    polls: u32,
    waited: Duration,
) -> PollOutcome {
    tracing::warn!(
        "Query {} still {} after {:?}; giving up",
        current.query_id,
        current.status,
        waited
    );
    record(registry, &current, PollState::TimedOut, polls).await;
    PollOutcome::TimedOut {
        last: current,
        waited,
    }
}

async fn record(registry: &QueryRegistry, query: &Query, state: PollState, polls: u32) {
    let mut records = registry.write().await;
    let entry = records
        .entry(query.query_id.clone())
        .or_insert_with(|| TrackedQuery::new(query.clone()));
    entry.query = query.clone();
    entry.poll_state = state;
    entry.polls = polls;
}
