//! Risk data model: per-symbol limits and the position/PnL tracker they're
//! checked against. Field shapes follow spec.md §3; `Position`'s
//! realized/daily-PnL split and high-water mark mirror the teacher's
//! `risk::types::Position`.

use crate::types::Trade;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Bound on the `recent_trades` ring per spec.md §3.
pub const RECENT_TRADES_CAPACITY: usize = 1000;

/// Per-symbol hard risk ceilings. Every field is a ceiling; a check
/// exceeding it rejects the order (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    pub max_gross_position: f64,
    pub max_net_position: f64,
    pub max_dollar_exposure: f64,
    pub var_limit: f64,
    pub es_limit: f64,
    pub max_drawdown_limit: f64,
    pub max_position_duration: Duration,
    pub max_order_size: f64,
    pub max_daily_loss: f64,
    pub max_daily_trades: u32,
}

/// Per-symbol position and PnL state.
///
/// `vwap` is `None` whenever `position == 0`; consumers must treat that as
/// uninitialized rather than defaulting to zero (spec.md §3).
#[derive(Debug, Clone)]
pub struct PositionTracker {
    pub position: Decimal,
    pub vwap: Option<Decimal>,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub recent_trades: VecDeque<Trade>,
    pub last_update: u64,

    /// Resets at each new UTC day bucket; backs `max_daily_loss` /
    /// `max_daily_trades`.
    pub daily_pnl: Decimal,
    pub daily_trade_count: u32,
    pub daily_reset_bucket: u64,

    /// High-water mark of cumulative realized+unrealized PnL since the last
    /// daily reset; backs the drawdown check.
    pub high_water_mark: Decimal,

    /// Timestamp (ns) at which the current non-flat position was opened;
    /// `None` while flat. Backs `max_position_duration`.
    pub position_opened_at: Option<u64>,
}

impl Default for PositionTracker {
    fn default() -> Self {
        Self {
            position: Decimal::ZERO,
            vwap: None,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            recent_trades: VecDeque::with_capacity(RECENT_TRADES_CAPACITY),
            last_update: 0,
            daily_pnl: Decimal::ZERO,
            daily_trade_count: 0,
            daily_reset_bucket: 0,
            high_water_mark: Decimal::ZERO,
            position_opened_at: None,
        }
    }
}

impl PositionTracker {
    pub fn push_trade(&mut self, trade: Trade) {
        if self.recent_trades.len() >= RECENT_TRADES_CAPACITY {
            self.recent_trades.pop_front();
        }
        self.last_update = trade.ts;
        self.recent_trades.push_back(trade);
    }

    pub fn is_flat(&self) -> bool {
        self.position == Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn default_is_flat_with_undefined_vwap() {
        let p = PositionTracker::default();
        assert!(p.is_flat());
        assert!(p.vwap.is_none());
    }

    #[test]
    fn recent_trades_ring_is_bounded() {
        use crate::symbol::Symbol;
        let mut p = PositionTracker::default();
        for i in 0..(RECENT_TRADES_CAPACITY + 10) {
            p.push_trade(Trade::new(Symbol::new("AAPL"), dec!(100), dec!(1), i % 2 == 0));
        }
        assert_eq!(p.recent_trades.len(), RECENT_TRADES_CAPACITY);
    }
}
