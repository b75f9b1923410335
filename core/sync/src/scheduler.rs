//! Sync scheduling - periodic tick and single-flight fetches.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use dripsync_common::{Error, Result, UtcMillis};
use dripsync_store::CursorStore;

use crate::clock::Clock;
use crate::config::SyncTimings;
use crate::cursor::Cursor;
use crate::policy::{self, Decision, SkipReason};
use crate::sink::{DataSink, InfoPayload};
use crate::state::SchedulerState;
use crate::transport::{Request, Response, Transport};

/// How a fetch attempt ended.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Payload delivered to the sink and persisted.
    Success { written_at: UtcMillis },
    /// Transport, parse, sink or store failure.
    Failed(Error),
    /// No response within the request timeout.
    TimedOut,
    /// No link to the companion.
    Disconnected,
}

impl FetchOutcome {
    /// Whether the attempt succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success { .. })
    }
}

/// A fetch issued by a tick.
#[derive(Debug)]
pub enum Fetch {
    /// Ended before any request was sent.
    Aborted(FetchOutcome),
    /// Request in flight; the handle yields its outcome.
    Pending(JoinHandle<FetchOutcome>),
}

impl Fetch {
    /// Wait for the attempt to end.
    pub async fn outcome(self) -> FetchOutcome {
        match self {
            Fetch::Aborted(outcome) => outcome,
            Fetch::Pending(handle) => handle.await.unwrap_or_else(|e| {
                FetchOutcome::Failed(Error::Transport(format!("fetch task ended: {}", e)))
            }),
        }
    }
}

/// Result of one tick evaluation.
#[derive(Debug)]
pub struct Tick {
    pub decision: Decision,
    pub fetch: Option<Fetch>,
}

/// Scheduler deciding, once per tick, whether to pull fresh data from the
/// companion.
///
/// Cloning yields another handle to the same scheduler.
#[derive(Clone)]
pub struct SyncScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    cursor: Cursor,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn DataSink>,
    clock: Arc<dyn Clock>,
    timings: SyncTimings,
    state: Mutex<SchedulerState>,
    /// Present iff the periodic tick is armed.
    ticker: Mutex<Option<JoinHandle<()>>>,
    verbose: AtomicBool,
}

/// Holds the single-flight guard for one attempt and releases it on drop,
/// whichever way the attempt ends.
struct InFlight {
    inner: Arc<Inner>,
    generation: u64,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.inner.lock_state().release(self.generation) {
            debug!(
                "Attempt {} was superseded, leaving guard alone",
                self.generation
            );
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SyncScheduler {
    /// Create a stopped scheduler.
    ///
    /// # Errors
    /// - Invalid timings
    pub fn new(
        store: Arc<dyn CursorStore>,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn DataSink>,
        clock: Arc<dyn Clock>,
        timings: SyncTimings,
    ) -> Result<Self> {
        timings.validate()?;

        Ok(Self {
            inner: Arc::new(Inner {
                cursor: Cursor::new(store),
                transport,
                sink,
                clock,
                timings,
                state: Mutex::new(SchedulerState::new()),
                ticker: Mutex::new(None),
                verbose: AtomicBool::new(false),
            }),
        })
    }

    /// Timing knobs in use.
    pub fn timings(&self) -> &SyncTimings {
        &self.inner.timings
    }

    /// Cursor this scheduler reads and writes.
    pub fn cursor(&self) -> &Cursor {
        &self.inner.cursor
    }

    /// Snapshot of the in-memory state.
    pub fn state(&self) -> SchedulerState {
        self.inner.lock_state().clone()
    }

    /// Whether the periodic tick is armed.
    pub fn is_running(&self) -> bool {
        lock(&self.inner.ticker).is_some()
    }

    /// Whether a request is outstanding.
    pub fn is_updating(&self) -> bool {
        self.inner.lock_state().updating_data
    }

    /// Log every tick decision, not only the ones that fetch.
    pub fn set_verbose(&self, verbose: bool) {
        self.inner.verbose.store(verbose, Ordering::Relaxed);
    }

    /// Evaluate once immediately, then every tick interval.
    ///
    /// Returns false if the tick was already armed; nothing happens then.
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        let mut ticker = lock(&self.inner.ticker);
        if ticker.is_some() {
            return false;
        }

        info!("Starting data updates");
        self.inner.check_updates();

        let period = self.inner.timings.tick_interval;
        let weak = Arc::downgrade(&self.inner);
        *ticker = Some(tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                // Every scheduler handle is gone; nothing left to tick for.
                let Some(inner) = weak.upgrade() else { break };
                inner.check_updates();
            }
        }));

        true
    }

    /// Cancel the periodic tick. An in-flight request is not cancelled.
    ///
    /// Returns false if the tick was not armed.
    pub fn stop(&self) -> bool {
        match lock(&self.inner.ticker).take() {
            Some(handle) => {
                handle.abort();
                info!("Stopping data updates");
                true
            }
            None => false,
        }
    }

    /// Run one tick evaluation now.
    pub fn check_updates(&self) -> Tick {
        self.inner.check_updates()
    }

    /// Drop the single-flight guard unconditionally.
    ///
    /// For host suspend/resume boundaries, across which a pending response
    /// cannot be trusted to arrive.
    pub fn reset_guard(&self) {
        self.inner.lock_state().reset_guard();
    }

    /// Count an out-of-band refresh request (such as launching the
    /// companion app) as an update attempt.
    pub fn note_attempt(&self) {
        let now = self.inner.clock.now();
        self.inner.lock_state().note_attempt(now);
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        lock(&self.state)
    }

    fn check_updates(self: &Arc<Self>) -> Tick {
        let now = self.clock.now();

        let (decision, generation) = {
            let mut state = self.lock_state();
            let decision = if state.updating_data {
                Decision::Skip(SkipReason::InFlight)
            } else {
                match self.cursor.info_last_update() {
                    Ok(persisted) => policy::evaluate(&state, persisted, now, &self.timings),
                    Err(e) => {
                        warn!("Cursor unreadable, skipping tick: {}", e);
                        Decision::Skip(SkipReason::StoreUnavailable)
                    }
                }
            };
            let generation = decision.is_fetch().then(|| state.begin_attempt(now));
            (decision, generation)
        };

        if decision.is_fetch() {
            info!("Tick at {}: {}", now, decision);
        } else if self.verbose.load(Ordering::Relaxed) {
            debug!("Tick at {}: {}", now, decision);
        }

        let fetch = generation.map(|generation| self.fetch_info(generation));
        Tick { decision, fetch }
    }

    fn fetch_info(self: &Arc<Self>, generation: u64) -> Fetch {
        let guard = InFlight {
            inner: Arc::clone(self),
            generation,
        };

        if !self.transport.is_connected() {
            info!("No connection to companion, attempt aborted");
            drop(guard);
            return Fetch::Aborted(FetchOutcome::Disconnected);
        }

        debug!("Connection ok, requesting info");
        let inner = Arc::clone(self);
        Fetch::Pending(tokio::spawn(async move {
            let outcome = inner.request_info(generation).await;
            inner.log_outcome(&outcome);
            // Guard release is the last thing an attempt does.
            drop(guard);
            outcome
        }))
    }

    async fn request_info(&self, generation: u64) -> FetchOutcome {
        let request = Request::get_info();
        let request_id = request.id;
        let timeout = self.timings.request_timeout;

        let response =
            match tokio::time::timeout(timeout, self.transport.request(request)).await {
                Ok(Ok(response)) => response,
                Ok(Err(Error::TransportDisconnected)) => return FetchOutcome::Disconnected,
                Ok(Err(e)) => return FetchOutcome::Failed(e),
                Err(_) => return FetchOutcome::TimedOut,
            };

        if response.id != request_id {
            return FetchOutcome::Failed(Error::Transport(format!(
                "response {} does not match request {}",
                response.id, request_id
            )));
        }

        match self.apply_response(generation, response) {
            Ok(written_at) => FetchOutcome::Success { written_at },
            Err(e) => FetchOutcome::Failed(e),
        }
    }

    /// Parse, hand to the sink, then persist. Any failure leaves the
    /// cursor untouched.
    fn apply_response(&self, generation: u64, response: Response) -> Result<UtcMillis> {
        let now = self.clock.now();
        let payload = InfoPayload::parse(response.result, now)?;

        self.sink.set_data(&payload)?;
        let written_at = self.cursor.save_info(&payload.raw, now)?;

        self.lock_state().record_success(generation, written_at);
        Ok(written_at)
    }

    fn log_outcome(&self, outcome: &FetchOutcome) {
        match outcome {
            FetchOutcome::Success { written_at } => {
                info!("Received data, cursor now at {}", written_at)
            }
            FetchOutcome::Failed(e) => warn!("Fetch error: {}", e),
            FetchOutcome::TimedOut => warn!(
                "{}",
                Error::RequestTimeout(self.timings.request_timeout.as_millis() as u64)
            ),
            FetchOutcome::Disconnected => info!("Companion link lost during request"),
        }
    }
}
