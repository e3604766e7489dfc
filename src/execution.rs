//! The execution boundary (spec.md §6): a pluggable sink for accepted
//! orders. Order submission itself is modeled only by this interface; the
//! exchange/broker transport is out of scope for this crate.
//!
//! `send`/`cancel` are required to return promptly; delivery is at-most-once
//! with an external reconciliation assumption. This is a narrower trait than
//! the teacher's `execution::Executor` (which also tracks fills and order
//! state internally) because spec.md §6 names exactly two operations.

use crate::types::Order;
use anyhow::Result;

/// Pluggable sink for orders accepted by the order manager.
pub trait Executor: Send + Sync {
    /// Submit an order. Must not block.
    fn send(&self, order: Order) -> Result<()>;

    /// Request cancellation of a previously sent order. The execution
    /// boundary owns reconciliation with in-flight fills (spec.md §9, open
    /// question #4); this crate does not prescribe a policy.
    fn cancel(&self, order_id: &str) -> Result<()>;
}

/// Instant-fill test double, grounded in the teacher's
/// `execution::simulated::SimulatedExecutor`. Every sent order is recorded;
/// cancels are recorded separately. Used to exercise the pipeline in tests
/// and examples without a real exchange connection.
#[derive(Default)]
pub struct SimulatedExecutor {
    sent: parking_lot::Mutex<Vec<Order>>,
    cancelled: parking_lot::Mutex<Vec<String>>,
}

impl SimulatedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_orders(&self) -> Vec<Order> {
        self.sent.lock().clone()
    }

    pub fn cancelled_ids(&self) -> Vec<String> {
        self.cancelled.lock().clone()
    }
}

impl Executor for SimulatedExecutor {
    fn send(&self, order: Order) -> Result<()> {
        self.sent.lock().push(order);
        Ok(())
    }

    fn cancel(&self, order_id: &str) -> Result<()> {
        self.cancelled.lock().push(order_id.to_string());
        Ok(())
    }
}
