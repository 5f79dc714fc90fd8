//! Runtime: per-identity workers, update polling, expiry sweeps
//!
//! Events from one identity are handled strictly in delivery order by a
//! single worker task; events from different identities run concurrently.

mod executor;

#[cfg(test)]
mod testing;

pub use executor::Engine;

use crate::channel::{Channel, Inbound, UpdateSource};
use crate::identity::Identity;
use crate::state_machine::{Session, StateKind};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Workers exit after this long without events
pub const WORKER_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

// ============================================================================
// Session Store
// ============================================================================

/// In-memory sessions keyed by identity. An idle session is not stored, so
/// an identity without a dialogue in progress has no entry at all.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<Identity, Session>>,
}

impl SessionStore {
    pub fn get(&self, identity: Identity) -> Option<Session> {
        self.lock().get(&identity).cloned()
    }

    pub fn get_or_create(&self, identity: Identity) -> Session {
        self.lock().entry(identity).or_default().clone()
    }

    /// Routing state; identities without a session are idle.
    pub fn state_of(&self, identity: Identity) -> StateKind {
        self.lock()
            .get(&identity)
            .map_or(StateKind::Idle, |s| s.state.kind())
    }

    pub fn store(&self, identity: Identity, session: Session) {
        let mut sessions = self.lock();
        if session.is_idle() {
            sessions.remove(&identity);
        } else {
            sessions.insert(identity, session);
        }
    }

    pub fn clear(&self, identity: Identity) {
        self.lock().remove(&identity);
    }

    #[allow(dead_code)] // Used in tests
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Identity, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// Runtime Manager
// ============================================================================

/// Queues are unbounded: a slow identity must never hold up polling for
/// everyone else.
struct Worker {
    tx: mpsc::UnboundedSender<Inbound>,
    task: JoinHandle<()>,
}

/// Fans inbound events out to per-identity workers
pub struct RuntimeManager<C: Channel + 'static> {
    engine: Arc<Engine<C>>,
    workers: Mutex<HashMap<Identity, Worker>>,
    idle_timeout: Duration,
}

impl<C: Channel + 'static> RuntimeManager<C> {
    pub fn new(engine: Arc<Engine<C>>) -> Arc<Self> {
        Self::with_idle_timeout(engine, WORKER_IDLE_TIMEOUT)
    }

    pub fn with_idle_timeout(engine: Arc<Engine<C>>, idle_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            engine,
            workers: Mutex::new(HashMap::new()),
            idle_timeout,
        })
    }

    #[allow(dead_code)] // Used in tests
    pub fn engine(&self) -> &Arc<Engine<C>> {
        &self.engine
    }

    /// Queue an event on its identity's worker, starting one if needed.
    /// Never waits on the worker.
    pub fn dispatch(self: &Arc<Self>, inbound: Inbound) {
        let identity = inbound.actor.id;
        let mut pending = inbound;
        loop {
            let tx = self.get_or_create(identity);
            match tx.send(pending) {
                Ok(()) => return,
                // The worker shut down between lookup and send; a fresh one
                // is started on the next pass.
                Err(mpsc::error::SendError(returned)) => pending = returned,
            }
        }
    }

    #[allow(dead_code)] // Used in tests
    pub fn worker_count(&self) -> usize {
        self.lock_workers().len()
    }

    fn get_or_create(self: &Arc<Self>, identity: Identity) -> mpsc::UnboundedSender<Inbound> {
        let mut workers = self.lock_workers();
        if let Some(worker) = workers.get(&identity) {
            if !worker.tx.is_closed() {
                return worker.tx.clone();
            }
        }

        // A retiring worker may still be draining its queue; its successor
        // starts only once it is done.
        let predecessor = workers.remove(&identity).map(|w| w.task);
        let (tx, rx) = mpsc::unbounded_channel();
        let manager = Arc::clone(self);
        let task = tokio::spawn(async move {
            if let Some(previous) = predecessor {
                let _ = previous.await;
            }
            manager.run_worker(identity, rx).await;
        });
        workers.insert(
            identity,
            Worker {
                tx: tx.clone(),
                task,
            },
        );
        tracing::debug!(identity = %identity, "Worker started");
        tx
    }

    async fn run_worker(
        self: Arc<Self>,
        identity: Identity,
        mut rx: mpsc::UnboundedReceiver<Inbound>,
    ) {
        loop {
            match tokio::time::timeout(self.idle_timeout, rx.recv()).await {
                Ok(Some(inbound)) => self.engine.handle(&inbound).await,
                Ok(None) => break,
                Err(_) => {
                    // Refuse new events, then finish what was already queued.
                    rx.close();
                    while let Some(inbound) = rx.recv().await {
                        self.engine.handle(&inbound).await;
                    }
                    break;
                }
            }
        }

        let mut workers = self.lock_workers();
        if workers.get(&identity).is_some_and(|w| w.tx.is_closed()) {
            workers.remove(&identity);
        }
        tracing::debug!(identity = %identity, "Worker stopped");
    }

    /// Long-poll `source` until `cancel` fires. Fetch failures are retried
    /// with exponential backoff.
    pub async fn run_polling<S: UpdateSource + ?Sized>(
        self: &Arc<Self>,
        source: &S,
        cancel: CancellationToken,
    ) {
        tracing::info!("Polling for updates");
        let mut backoff = INITIAL_BACKOFF;
        loop {
            let batch = tokio::select! {
                () = cancel.cancelled() => break,
                batch = source.next_batch() => batch,
            };
            match batch {
                Ok(events) => {
                    backoff = INITIAL_BACKOFF;
                    for inbound in events {
                        self.dispatch(inbound);
                    }
                }
                Err(e) => {
                    tracing::warn!(kind = ?e.kind, error = %e, retry_in = ?backoff, "Failed to fetch updates");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
        tracing::info!("Polling stopped");
    }

    /// Periodically evict expired handoffs until `cancel` fires.
    pub fn start_sweeper(&self, every: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let evicted = engine.sweep_expired().await;
                        if evicted > 0 {
                            tracing::info!(evicted, "Expired reports swept");
                        }
                    }
                }
            }
            tracing::info!("Sweeper stopped");
        })
    }

    fn lock_workers(&self) -> MutexGuard<'_, HashMap<Identity, Worker>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
