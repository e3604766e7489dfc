//! Order manager: the last internal hop before the execution boundary
//! (spec.md §4.6).
//!
//! `submit_order` re-checks risk and hands accepted orders to a bounded
//! queue; a single consumer worker thread drains that queue and forwards to
//! the execution boundary. The queue is the only hand-off, and there is no
//! retry on enqueue failure; the caller is told immediately so it can count
//! the drop (spec.md §7: backpressure is surfaced, never silently retried).

use crate::execution::Executor;
use crate::queue::SpscQueue;
use crate::risk::RiskEngine;
use crate::types::Order;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Why `submit_order` did not hand the order to the execution boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("order rejected by risk engine")]
    RiskRejected,
    #[error("order queue full, order dropped")]
    QueueFull,
    #[error("order manager has been stopped")]
    Stopped,
}

struct Counters {
    rejected: AtomicU64,
    dropped: AtomicU64,
}

pub struct OrderManager {
    queue: Arc<SpscQueue<Order>>,
    risk: Arc<RiskEngine>,
    executor: Arc<dyn Executor>,
    shutdown: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl OrderManager {
    pub fn new(risk: Arc<RiskEngine>, executor: Arc<dyn Executor>) -> Self {
        Self::with_capacity(1024, risk, executor)
    }

    pub fn with_capacity(capacity: usize, risk: Arc<RiskEngine>, executor: Arc<dyn Executor>) -> Self {
        Self {
            queue: Arc::new(SpscQueue::with_capacity(capacity)),
            risk,
            executor,
            shutdown: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            counters: Arc::new(Counters {
                rejected: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Re-check risk and, if accepted, enqueue for the execution boundary.
    /// A no-op after `stop()` (spec.md §5: operations after shutdown are
    /// no-ops).
    pub fn submit_order(&self, order: Order) -> Result<(), SubmitError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(SubmitError::Stopped);
        }
        if !self.risk.check_order(&order) {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            debug!(order_id = %order.order_id, symbol = %order.symbol, "order rejected by risk engine");
            return Err(SubmitError::RiskRejected);
        }
        match self.queue.push(order) {
            Ok(()) => Ok(()),
            Err((order, _)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(order_id = %order.order_id, "order queue full, dropping order");
                Err(SubmitError::QueueFull)
            }
        }
    }

    /// Forward a cancel request straight to the execution boundary, which
    /// owns reconciliation with any in-flight fill (spec.md §9).
    pub fn cancel_order(&self, order_id: &str) {
        if self.shutdown.load(Ordering::Acquire) {
            return;
        }
        if let Err(err) = self.executor.cancel(order_id) {
            warn!(order_id, %err, "execution boundary failed to cancel order");
        }
    }

    pub fn rejected_count(&self) -> u64 {
        self.counters.rejected.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    /// Spawn the consumer worker thread. Idempotent: calling twice without
    /// an intervening `stop()` is a no-op.
    pub fn start(&self) {
        let mut worker = self.worker.lock().unwrap();
        if worker.is_some() {
            return;
        }
        self.shutdown.store(false, Ordering::Release);
        let queue = self.queue.clone();
        let executor = self.executor.clone();
        let shutdown = self.shutdown.clone();
        info!("order manager worker starting");
        *worker = Some(thread::spawn(move || {
            run_consumer(queue, executor, shutdown);
        }));
    }

    /// Set the shutdown flag and join the worker. Idempotent and safe to
    /// call even if `start()` was never called.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
        info!("order manager worker stopped");
    }
}

fn run_consumer(queue: Arc<SpscQueue<Order>>, executor: Arc<dyn Executor>, shutdown: Arc<AtomicBool>) {
    let mut spins = 0u32;
    loop {
        match queue.pop() {
            Ok(order) => {
                spins = 0;
                if let Err(err) = executor.send(order) {
                    warn!(%err, "execution boundary rejected order send");
                }
            }
            Err(_) => {
                if shutdown.load(Ordering::Acquire) {
                    return;
                }
                idle(&mut spins);
            }
        }
    }
}

/// Spin briefly, then fall back to a short sleep, re-checking the shutdown
/// flag on every iteration (spec.md §4.4, §5).
fn idle(spins: &mut u32) {
    const SPIN_LIMIT: u32 = 64;
    if *spins < SPIN_LIMIT {
        *spins += 1;
        std::hint::spin_loop();
    } else {
        thread::sleep(Duration::from_millis(1));
    }
}
