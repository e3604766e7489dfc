//! Lifecycle supervisor: owns the engine's worker threads end to end
//! (spec.md §4.4, §5).
//!
//! `start()` brings up the order manager's consumer thread first, then the
//! market data consumer thread, so an order can never be produced before
//! there is a worker ready to drain it. `stop()` tears down in the reverse
//! order and is expected to return well within spec.md §8 scenario S6's
//! 100ms budget; both workers' idle loops poll their shutdown flag at most
//! a 1ms sleep apart.

use crate::execution::Executor;
use crate::market_data::MarketDataHandler;
use crate::market_maker::{MarketMaker, MarketMakingParams};
use crate::orderbook::BookRegistry;
use crate::order_manager::{OrderManager, SubmitError};
use crate::risk::{RiskEngine, RiskLimits};
use crate::symbol::Symbol;
use crate::types::Quote;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Wires the risk engine, order manager, market maker and market data
/// handler together and manages their shared start/stop lifecycle.
pub struct Supervisor {
    risk: Arc<RiskEngine>,
    order_manager: Arc<OrderManager>,
    market_maker: Arc<MarketMaker>,
    market_data: Arc<MarketDataHandler>,
    books: Arc<BookRegistry>,
    running: AtomicBool,
}

impl Supervisor {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        let risk = Arc::new(RiskEngine::new());
        let order_manager = Arc::new(OrderManager::new(risk.clone(), executor));
        let market_maker = Arc::new(MarketMaker::new(risk.clone(), order_manager.clone()));
        let books = Arc::new(BookRegistry::new());
        let market_data = Arc::new(MarketDataHandler::new(books.clone(), market_maker.clone()));
        Self {
            risk,
            order_manager,
            market_maker,
            market_data,
            books,
            running: AtomicBool::new(false),
        }
    }

    /// Register a symbol to be traded: sets its risk limits and its quote
    /// ladder parameters (spec.md §4: a symbol must be configured before the
    /// market maker or risk engine will act on it).
    pub fn add_strategy(&self, symbol: Symbol, limits: RiskLimits, params: MarketMakingParams) {
        self.risk.set_risk_limits(symbol.clone(), limits);
        self.market_maker.configure_symbol(symbol, params);
    }

    /// Feed a new top-of-book quote into the pipeline. Never blocks.
    pub fn on_quote(&self, quote: Quote) {
        self.market_data.on_quote(quote);
    }

    /// Submit an order directly, bypassing the market maker (used by tests
    /// and by any caller driving order flow without a quote ladder).
    pub fn submit_order(&self, order: crate::types::Order) -> Result<(), SubmitError> {
        self.order_manager.submit_order(order)
    }

    pub fn current_position(&self, symbol: &Symbol) -> Option<rust_decimal::Decimal> {
        self.risk.current_position(symbol)
    }

    /// Report a confirmed fill from the execution boundary, updating
    /// position, PnL and the symbol's volatility estimate. The execution
    /// boundary is responsible for reconciling this against any in-flight
    /// cancel (spec §9's open question on cancel/fill races is left to it).
    pub fn report_fill(&self, symbol: &Symbol, trade: crate::types::Trade) {
        self.risk.update_position(symbol, trade);
    }

    pub fn top_of_book(&self, symbol: &Symbol) -> Option<Quote> {
        self.books.top(symbol)
    }

    /// Start all worker threads. Idempotent.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("supervisor starting");
        self.order_manager.start();
        self.market_data.start();
    }

    /// Stop all worker threads in reverse start order. Idempotent, and safe
    /// to call even if `start()` was never called.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        info!("supervisor stopping");
        self.market_data.stop();
        self.order_manager.stop();
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::SimulatedExecutor;
    use rust_decimal_macros::dec;
    use std::time::{Duration, Instant};

    fn permissive_limits() -> RiskLimits {
        RiskLimits {
            max_gross_position: 1e9,
            max_net_position: 1e9,
            max_dollar_exposure: 1e12,
            var_limit: 1e9,
            es_limit: 1e9,
            max_drawdown_limit: 1.0,
            max_position_duration: Duration::from_secs(3600),
            max_order_size: 1e9,
            max_daily_loss: 1e9,
            max_daily_trades: 1_000_000,
        }
    }

    fn ladder_params() -> MarketMakingParams {
        MarketMakingParams {
            spread_pct: 0.001,
            base_size: 10.0,
            skew_factor: 0.0,
            tick_size: 0.01,
            levels: 1,
            level_spacing: 0.5,
        }
    }

    #[test]
    fn quote_flows_to_book_and_order_reaches_executor() {
        let exec = Arc::new(SimulatedExecutor::new());
        let sup = Supervisor::new(exec.clone());
        let sym = Symbol::new("AAPL");
        sup.add_strategy(sym.clone(), permissive_limits(), ladder_params());
        sup.start();

        sup.on_quote(Quote::new(sym.clone(), 99.0, 101.0, 1.0, 1.0).unwrap());

        let deadline = Instant::now() + Duration::from_millis(500);
        while exec.sent_orders().is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(!exec.sent_orders().is_empty());
        assert!(sup.top_of_book(&sym).is_some());
        sup.stop();
    }

    #[test]
    fn scenario_s6_shutdown_is_fast_and_stops_new_work() {
        let exec = Arc::new(SimulatedExecutor::new());
        let sup = Supervisor::new(exec.clone());
        let sym = Symbol::new("AAPL");
        sup.add_strategy(sym, permissive_limits(), ladder_params());
        sup.start();

        let start = Instant::now();
        sup.stop();
        assert!(start.elapsed() < Duration::from_millis(100));

        let order = crate::types::Order::new(Symbol::new("AAPL"), dec!(100), dec!(1), true);
        assert_eq!(sup.submit_order(order), Err(SubmitError::Stopped));
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let exec = Arc::new(SimulatedExecutor::new());
        let sup = Supervisor::new(exec);
        sup.start();
        sup.start();
        sup.stop();
        sup.stop();
    }
}
