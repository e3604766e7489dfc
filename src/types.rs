//! Shared wire-ish types that flow through the pipeline: quotes, trades and
//! orders. These carry the invariants from spec.md §3; construction helpers
//! enforce them instead of leaving it to callers.

use crate::symbol::Symbol;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// A published top-of-book quote for a symbol.
///
/// Invariant: `bid <= ask`, both non-negative. Immutable once constructed;
/// `Quote::new` is the only way to build one, and it enforces the invariant.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub symbol: Symbol,
    pub bid: f64,
    pub ask: f64,
    pub bid_size: f64,
    pub ask_size: f64,
    pub ts: u64,
}

impl Quote {
    /// Build a quote, returning `None` if the invariant (`bid <= ask`, both
    /// non-negative, both finite) is violated.
    pub fn new(symbol: Symbol, bid: f64, ask: f64, bid_size: f64, ask_size: f64) -> Option<Self> {
        if !bid.is_finite() || !ask.is_finite() || bid < 0.0 || ask < 0.0 || bid > ask {
            return None;
        }
        Some(Self {
            symbol,
            bid,
            ask,
            bid_size,
            ask_size,
            ts: now_nanos(),
        })
    }

    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }
}

/// A report of an execution on this participant's behalf.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub symbol: Symbol,
    pub price: Decimal,
    pub quantity: Decimal,
    pub is_buy: bool,
    pub ts: u64,
}

impl Trade {
    pub fn new(symbol: Symbol, price: Decimal, quantity: Decimal, is_buy: bool) -> Self {
        Self {
            symbol,
            price,
            quantity,
            is_buy,
            ts: now_nanos(),
        }
    }

    /// Signed quantity: positive for buys, negative for sells.
    pub fn signed_quantity(&self) -> Decimal {
        if self.is_buy {
            self.quantity
        } else {
            -self.quantity
        }
    }
}

/// Order lifecycle state. Assigned by the execution boundary except for
/// `New`, which the market maker assigns at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    New,
    Filled,
    Cancelled,
    Rejected,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::New => "NEW",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Rejected => "REJECTED",
        };
        write!(f, "{}", s)
    }
}

/// Global monotonically increasing counter backing order IDs. A process-wide
/// atomic increment, no lock required: order IDs are opaque strings, so
/// there is nothing to gain from a richer encoding (spec.md §9).
static ORDER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Allocate the next order ID: `"MM_"` followed by the decimal counter value.
pub fn next_order_id() -> String {
    let n = ORDER_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("MM_{}", n)
}

/// An order created by the market maker, validated by risk, queued by the
/// order manager, and given a terminal state by the execution boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub order_id: String,
    pub symbol: Symbol,
    pub price: Decimal,
    pub quantity: Decimal,
    pub is_buy: bool,
    pub ts: u64,
    pub status: OrderStatus,
}

impl Order {
    pub fn new(symbol: Symbol, price: Decimal, quantity: Decimal, is_buy: bool) -> Self {
        Self {
            order_id: next_order_id(),
            symbol,
            price,
            quantity,
            is_buy,
            ts: now_nanos(),
            status: OrderStatus::New,
        }
    }
}
