//! Periodic batch sender.
//!
//! Each cycle merges the persisted pending set with everything drained from
//! the queue (older events first), splits the result into chunks of at most
//! `batch_size` events and sends them in order. The first failing chunk stops
//! the cycle: it and every later chunk become the new pending set, while
//! chunks already accepted by the remote are dropped.

use super::queue::EventQueue;
use super::stats::{DeliveryStats, SharedStats, StatsTracker};
use super::store::PendingStore;
use super::transport::{Transport, TransportError};
use crate::event::Event;
use crossbeam_channel::{bounded, select, tick, Sender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Lifecycle state of the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Idle,
    Sending,
    Stopped,
}

/// Result of one non-empty send cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// Every chunk was accepted
    Delivered(usize),
    /// A chunk failed; `remaining` is what was persisted for the next cycle
    Failed {
        delivered: usize,
        remaining: Vec<Event>,
    },
}

impl DeliveryOutcome {
    pub fn delivered(&self) -> usize {
        match self {
            DeliveryOutcome::Delivered(n) => *n,
            DeliveryOutcome::Failed { delivered, .. } => *delivered,
        }
    }
}

/// Sender errors.
#[derive(Debug)]
pub enum SenderError {
    /// The sender was stopped and cannot send again
    Stopped,
    /// The worker thread could not be spawned
    Spawn(std::io::Error),
}

impl std::fmt::Display for SenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SenderError::Stopped => write!(f, "Sender has been stopped"),
            SenderError::Spawn(e) => write!(f, "Failed to spawn sender thread: {e}"),
        }
    }
}

impl std::error::Error for SenderError {}

/// Timing and sizing for the sender.
#[derive(Debug, Clone, Copy)]
pub struct SenderConfig {
    /// Time between send cycles (clamped to at least one second)
    pub interval: Duration,
    /// Maximum events per request (clamped to at least one)
    pub batch_size: usize,
}

impl SenderConfig {
    pub fn new(interval: Duration, batch_size: usize) -> Self {
        Self {
            interval: interval.max(Duration::from_secs(1)),
            batch_size: batch_size.max(1),
        }
    }
}

/// Split `items` into consecutive chunks of at most `size` elements.
pub fn chunk<T>(items: &[T], size: usize) -> std::slice::Chunks<'_, T> {
    items.chunks(size.max(1))
}

/// State shared between the handle and the worker thread.
struct Core {
    queue: EventQueue,
    store: PendingStore,
    transport: Arc<dyn Transport>,
    stats: SharedStats,
    batch_size: usize,
    /// Mirror of the persisted set. Held for the whole cycle so cycles and
    /// the final flush never overlap.
    pending: Mutex<Vec<Event>>,
    /// Only becomes `Stopped` while `pending` is held. `enqueue` pushes
    /// while holding this lock, so nothing lands in the queue after the
    /// final flush.
    state: Mutex<SenderState>,
}

struct Worker {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Background worker delivering queued events to a [`Transport`].
pub struct BatchSender {
    core: Arc<Core>,
    interval: Duration,
    worker: Mutex<Option<Worker>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl BatchSender {
    /// Create a sender. Events left in `store` by a previous run are loaded
    /// immediately and sent ahead of anything newly queued.
    pub fn new(
        config: SenderConfig,
        queue: EventQueue,
        store: PendingStore,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let config = SenderConfig::new(config.interval, config.batch_size);
        let pending = store.load();
        if !pending.is_empty() {
            tracing::info!(
                "Recovered {} pending events from {:?}",
                pending.len(),
                store.path()
            );
        }

        let stats = Arc::new(StatsTracker::new());
        stats.set_held(pending.len() as u64);

        Self {
            core: Arc::new(Core {
                queue,
                store,
                transport,
                stats,
                batch_size: config.batch_size,
                pending: Mutex::new(pending),
                state: Mutex::new(SenderState::Idle),
            }),
            interval: config.interval,
            worker: Mutex::new(None),
        }
    }

    /// Start the periodic worker. Calling `start` on a running sender is a no-op.
    pub fn start(&self) -> Result<(), SenderError> {
        if self.state() == SenderState::Stopped {
            return Err(SenderError::Stopped);
        }

        let mut worker = lock(&self.worker);
        if worker.is_some() {
            return Ok(());
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let core = Arc::clone(&self.core);
        let interval = self.interval;

        let handle = thread::Builder::new()
            .name("batch-sender".to_string())
            .spawn(move || {
                let ticker = tick(interval);
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            // A stop that arrived together with the tick wins.
                            match stop_rx.try_recv() {
                                Err(TryRecvError::Empty) => {}
                                _ => break,
                            }
                            if core.run_cycle().is_err() {
                                break;
                            }
                        }
                    }
                }
            })
            .map_err(SenderError::Spawn)?;

        *worker = Some(Worker { stop_tx, handle });
        tracing::info!(
            "Batch sender started (interval {}s, batch size {})",
            interval.as_secs(),
            self.core.batch_size
        );
        Ok(())
    }

    /// Stop the worker and persist everything not yet delivered.
    ///
    /// Waits for an in-flight cycle to finish, then moves any queued events
    /// into the pending store. No sends happen after `stop` returns.
    pub fn stop(&self) {
        let worker = lock(&self.worker).take();
        if let Some(worker) = worker {
            let _ = worker.stop_tx.send(());
            if worker.handle.join().is_err() {
                tracing::error!("Batch sender thread panicked");
            }
        }

        self.core.shutdown();
        tracing::info!("Batch sender stopped");
    }

    /// Queue an event for the next cycle.
    ///
    /// Fails with [`SenderError::Stopped`] once `stop` has begun its final
    /// flush; an accepted event is always either sent or persisted. Pushing
    /// straight onto [`BatchSender::queue`] skips this check.
    pub fn enqueue(&self, event: Event) -> Result<(), SenderError> {
        let state = lock(&self.core.state);
        if *state == SenderState::Stopped {
            return Err(SenderError::Stopped);
        }
        self.core.queue.enqueue(event);
        Ok(())
    }

    /// Run one send cycle on the calling thread.
    ///
    /// Returns `Ok(None)` when there was nothing to send.
    pub fn run_cycle(&self) -> Result<Option<DeliveryOutcome>, SenderError> {
        self.core.run_cycle()
    }

    pub fn state(&self) -> SenderState {
        *lock(&self.core.state)
    }

    pub fn is_running(&self) -> bool {
        lock(&self.worker).is_some()
    }

    /// Delivered and pending counts.
    pub fn stats(&self) -> DeliveryStats {
        self.core.stats.snapshot(&self.core.queue)
    }

    pub fn shared_stats(&self) -> SharedStats {
        Arc::clone(&self.core.stats)
    }

    pub fn queue(&self) -> &EventQueue {
        &self.core.queue
    }

    pub fn store(&self) -> &PendingStore {
        &self.core.store
    }
}

impl Drop for BatchSender {
    fn drop(&mut self) {
        if self.state() != SenderState::Stopped {
            self.stop();
        }
    }
}

impl Core {
    fn set_state(&self, state: SenderState) {
        let mut current = lock(&self.state);
        if *current != SenderState::Stopped {
            *current = state;
        }
    }

    fn run_cycle(&self) -> Result<Option<DeliveryOutcome>, SenderError> {
        let mut pending = lock(&self.pending);
        if *lock(&self.state) == SenderState::Stopped {
            return Err(SenderError::Stopped);
        }
        let mut working = std::mem::take(&mut *pending);
        working.extend(self.queue.drain_all());

        if working.is_empty() {
            return Ok(None);
        }

        self.set_state(SenderState::Sending);
        self.stats.set_held(working.len() as u64);
        tracing::debug!("Send cycle started with {} events", working.len());

        let delivered = self.deliver(&working);
        let remaining = working.split_off(delivered);

        let outcome = if remaining.is_empty() {
            if let Err(e) = self.store.clear() {
                // Delivered events left on disk are resent after a restart.
                tracing::error!("Unable to clear pending store: {}", e);
            }
            DeliveryOutcome::Delivered(delivered)
        } else {
            self.persist(&remaining);
            *pending = remaining.clone();
            DeliveryOutcome::Failed {
                delivered,
                remaining,
            }
        };

        self.stats.set_held(pending.len() as u64);
        self.set_state(SenderState::Idle);
        Ok(Some(outcome))
    }

    /// Send chunks in order until one fails. Returns how many events were
    /// accepted, always a whole number of chunks.
    fn deliver(&self, working: &[Event]) -> usize {
        let mut sent = 0;
        for batch in chunk(working, self.batch_size) {
            match self.transport.send(batch) {
                Ok(()) => {
                    sent += batch.len();
                    self.stats.record_delivered(batch.len() as u64);
                    self.stats.set_held((working.len() - sent) as u64);
                }
                Err(TransportError::Rejected { status, .. }) => {
                    tracing::warn!("Server rejected batch with status {}", status);
                    break;
                }
                Err(e) => {
                    tracing::error!("Failed to send batch: {}", e);
                    break;
                }
            }
        }
        sent
    }

    /// Mark the sender stopped, then move queued events into the pending set
    /// and write it out.
    fn shutdown(&self) {
        let mut pending = lock(&self.pending);
        *lock(&self.state) = SenderState::Stopped;
        pending.extend(self.queue.drain_all());
        if !pending.is_empty() {
            self.persist(&pending);
        }
        self.stats.set_held(pending.len() as u64);
    }

    fn persist(&self, events: &[Event]) {
        match self.store.save(events) {
            Ok(()) => tracing::info!("Persisted {} pending events", events.len()),
            // The events stay in memory and are retried next cycle, but are
            // lost if the process dies before a save succeeds.
            Err(e) => tracing::error!("Unable to persist pending queue: {}", e),
        }
    }
}
