//! Shared fixtures for scheduler and lifecycle tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

use dripsync_common::{Error, Result};
use dripsync_store::MemoryStore;

use crate::clock::ManualClock;
use crate::config::SyncTimings;
use crate::scheduler::SyncScheduler;
use crate::sink::LatestPayload;
use crate::transport::{Request, Response, Transport};

pub const T0: i64 = 1_700_000_000_000;
pub const TICK: Duration = Duration::from_secs(1);
pub const STALE_MS: i64 = 60_000;

pub fn timings() -> SyncTimings {
    SyncTimings::default()
        .with_tick_interval(TICK)
        .with_stale_time(Duration::from_millis(STALE_MS as u64))
        .with_update_interval(Duration::from_secs(300))
        .with_request_timeout(Duration::from_secs(10))
}

#[derive(Debug, Clone)]
enum Behavior {
    Respond(String),
    Fail,
    Hang,
    Gated,
}

/// Transport whose answers are scripted by the test.
pub struct ScriptedTransport {
    connected: AtomicBool,
    calls: AtomicUsize,
    connects: AtomicUsize,
    behavior: Mutex<Behavior>,
    gates: Mutex<VecDeque<oneshot::Sender<String>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
            behavior: Mutex::new(Behavior::Respond(r#"{"bg":{"val":"5.8"}}"#.to_string())),
            gates: Mutex::new(VecDeque::new()),
        }
    }

    /// Requests that reached the transport.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn respond_with(&self, payload: &str) {
        *self.behavior.lock().unwrap() = Behavior::Respond(payload.to_string());
    }

    pub fn fail(&self) {
        *self.behavior.lock().unwrap() = Behavior::Fail;
    }

    pub fn hang(&self) {
        *self.behavior.lock().unwrap() = Behavior::Hang;
    }

    /// Hold every request until `release_next` answers it.
    pub fn gate(&self) {
        *self.behavior.lock().unwrap() = Behavior::Gated;
    }

    /// Answer the oldest held request.
    pub fn release_next(&self, payload: &str) {
        let gate = self
            .gates
            .lock()
            .unwrap()
            .pop_front()
            .expect("no request is waiting");
        let _ = gate.send(payload.to_string());
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn connect(&self) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.set_connected(true);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.set_connected(false);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn request(&self, request: Request) -> Result<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior.lock().unwrap().clone();

        match behavior {
            Behavior::Respond(payload) => Ok(Response::reply(&request, payload)),
            Behavior::Fail => Err(Error::Transport("link reset by peer".to_string())),
            Behavior::Hang => futures::future::pending().await,
            Behavior::Gated => {
                let (tx, rx) = oneshot::channel();
                self.gates.lock().unwrap().push_back(tx);
                let payload = rx
                    .await
                    .map_err(|_| Error::Transport("gate dropped".to_string()))?;
                Ok(Response::reply(&request, payload))
            }
        }
    }
}

/// A scheduler wired to in-memory collaborators.
pub struct Harness {
    pub scheduler: SyncScheduler,
    pub store: MemoryStore,
    pub clock: ManualClock,
    pub transport: Arc<ScriptedTransport>,
    pub sink: Arc<LatestPayload>,
}

impl Harness {
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let clock = ManualClock::new(T0);
        let transport = Arc::new(ScriptedTransport::new());
        let sink = Arc::new(LatestPayload::new());

        let scheduler = SyncScheduler::new(
            Arc::new(store.clone()),
            transport.clone(),
            sink.clone(),
            Arc::new(clock.clone()),
            timings(),
        )
        .unwrap();

        Self {
            scheduler,
            store,
            clock,
            transport,
            sink,
        }
    }
}
