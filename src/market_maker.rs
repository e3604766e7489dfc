//! Market maker: per-symbol quote-ladder generator (spec.md §4.7).
//!
//! On every `update_quotes` call the maker cancels its outstanding orders
//! for that symbol, recomputes an inventory-skewed ladder from the new mid
//! price, and submits each level to the order manager. Concurrency for a
//! single maker instance is a per-maker lock (here, one `parking_lot::Mutex`
//! per symbol's mutable state); `update_quotes` and `configure_symbol` must
//! not be re-entered from inside a risk-engine callback (spec.md §4.7).

use crate::order_manager::OrderManager;
use crate::risk::RiskEngine;
use crate::symbol::Symbol;
use crate::types::{Order, Quote};
use crate::volatility::VolatilityEstimator;
use parking_lot::Mutex;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Per-symbol quote-ladder configuration (spec.md §3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MarketMakingParams {
    pub spread_pct: f64,
    pub base_size: f64,
    pub skew_factor: f64,
    pub tick_size: f64,
    pub levels: u32,
    pub level_spacing: f64,
}

impl MarketMakingParams {
    pub fn is_valid(&self) -> bool {
        self.tick_size > 0.0 && self.levels >= 1 && self.spread_pct > 0.0 && self.spread_pct < 1.0
    }
}

/// `round(p / t) * t`, half-away-from-zero (spec.md §4.7). Both `p` and `t`
/// must be positive.
pub fn round_to_tick(price: f64, tick_size: f64) -> f64 {
    debug_assert!(tick_size > 0.0);
    let units = price / tick_size;
    let rounded = if units >= 0.0 {
        (units + 0.5).floor()
    } else {
        (units - 0.5).ceil()
    };
    rounded * tick_size
}

struct SymbolMakerState {
    params: MarketMakingParams,
    volatility: VolatilityEstimator,
    active_orders: Vec<String>,
}

#[derive(Default)]
struct MakerState {
    symbols: HashMap<Symbol, SymbolMakerState>,
}

/// Generates and maintains a per-symbol quote ladder.
pub struct MarketMaker {
    state: Mutex<MakerState>,
    risk: Arc<RiskEngine>,
    order_manager: Arc<OrderManager>,
    vol_window: usize,
}

impl MarketMaker {
    pub fn new(risk: Arc<RiskEngine>, order_manager: Arc<OrderManager>) -> Self {
        Self::with_volatility_window(64, risk, order_manager)
    }

    pub fn with_volatility_window(
        vol_window: usize,
        risk: Arc<RiskEngine>,
        order_manager: Arc<OrderManager>,
    ) -> Self {
        Self {
            state: Mutex::new(MakerState::default()),
            risk,
            order_manager,
            vol_window,
        }
    }

    /// Configure (or replace) the quoting parameters for a symbol.
    pub fn configure_symbol(&self, symbol: Symbol, params: MarketMakingParams) {
        if !params.is_valid() {
            debug!(symbol = %symbol, "refusing invalid market-making params");
            return;
        }
        let mut state = self.state.lock();
        let window = self.vol_window;
        let entry = state.symbols.entry(symbol).or_insert_with(|| SymbolMakerState {
            params,
            volatility: VolatilityEstimator::new(window),
            active_orders: Vec::new(),
        });
        entry.params = params;
    }

    pub fn active_order_count(&self, symbol: &Symbol) -> usize {
        self.state
            .lock()
            .symbols
            .get(symbol)
            .map(|s| s.active_orders.len())
            .unwrap_or(0)
    }

    /// React to a new top-of-book quote for `symbol` (spec.md §4.7).
    /// Silently skipped if the symbol has no configured parameters.
    pub fn update_quotes(&self, symbol: &Symbol, market_quote: &Quote) {
        let mut state = self.state.lock();
        let Some(sym_state) = state.symbols.get_mut(symbol) else {
            trace!(symbol = %symbol, "no market-making params configured, skipping");
            return;
        };

        let mid = market_quote.mid();
        sym_state.volatility.update(mid);
        if !mid.is_finite() || mid <= 0.0 {
            debug!(symbol = %symbol, "non-positive or non-finite mid, skipping quote");
            return;
        }

        let params = sym_state.params;
        let sigma = sym_state.volatility.volatility();
        let position = self
            .risk
            .current_position(symbol)
            .and_then(|d| d.to_f64())
            .unwrap_or(0.0);

        let inventory_ratio = if params.base_size != 0.0 { position / params.base_size } else { 0.0 };
        let adjusted_spread = params.spread_pct * (1.0 + inventory_ratio * params.skew_factor * sigma);
        let stale_orders: Vec<String> = sym_state.active_orders.drain(..).collect();
        drop(state);

        // Cancel all outstanding orders for this symbol before re-quoting.
        // Dropped the lock above first: cancel_order crosses the execution
        // boundary and must never run while holding it.
        for order_id in &stale_orders {
            self.order_manager.cancel_order(order_id);
        }

        let levels = ladder(mid, inventory_ratio, adjusted_spread, params);

        for level in levels {
            for side_order in [
                build_order(symbol, level.bid_px, level.size, true),
                build_order(symbol, level.ask_px, level.size, false),
            ] {
                if let Some(order) = side_order {
                    let order_id = order.order_id.clone();
                    if self.order_manager.submit_order(order).is_ok() {
                        let mut state = self.state.lock();
                        if let Some(sym_state) = state.symbols.get_mut(symbol) {
                            sym_state.active_orders.push(order_id);
                        }
                    }
                }
            }
        }
    }
}

struct LadderLevel {
    bid_px: f64,
    ask_px: f64,
    size: f64,
}

/// Pure computation of one symbol's quote ladder (spec.md §4.7 step 5),
/// split out so it can be unit-tested and benchmarked without the maker's
/// locks or order plumbing.
fn ladder(mid: f64, inventory_ratio: f64, adjusted_spread: f64, params: MarketMakingParams) -> Vec<LadderLevel> {
    let mut out = Vec::with_capacity(params.levels as usize);
    for l in 0..params.levels {
        let mult = 1.0 + l as f64 * params.level_spacing;
        let bid_raw = mid * (1.0 - adjusted_spread * mult - inventory_ratio * params.skew_factor);
        let ask_raw = mid * (1.0 + adjusted_spread * mult - inventory_ratio * params.skew_factor);
        let bid_px = round_to_tick(bid_raw, params.tick_size);
        let ask_px = round_to_tick(ask_raw, params.tick_size);
        let size = params.base_size / 2f64.powi(l as i32);
        out.push(LadderLevel { bid_px, ask_px, size });
    }
    out
}

fn build_order(symbol: &Symbol, price: f64, size: f64, is_buy: bool) -> Option<Order> {
    if !price.is_finite() || !size.is_finite() || price <= 0.0 || size <= 0.0 {
        return None;
    }
    let price = Decimal::from_f64(price)?;
    let size = Decimal::from_f64(size)?;
    Some(Order::new(symbol.clone(), price, size, is_buy))
}
