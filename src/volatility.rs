//! Per-symbol rolling volatility estimator.
//!
//! Maintains a bounded FIFO of recent mid prices and the log-returns derived
//! from them, and exposes a scalar current-volatility estimate used by both
//! the risk engine (VaR/ES) and the market maker (inventory-skew spread).

use std::collections::VecDeque;

/// Rolling log-return volatility estimator over a fixed window.
///
/// `update(price)` seeds the estimator with a price-only observation the
/// first time it is called. The teacher's maker path (and several
/// market-making implementations in the wild) mistakenly folds the very
/// first price into a return against an implicit zero base, producing a
/// spurious early value. Seeding with a price-only observation (open
/// question #2 in spec.md §9) avoids that.
#[derive(Debug, Clone)]
pub struct VolatilityEstimator {
    window_size: usize,
    prices: VecDeque<f64>,
    returns: VecDeque<f64>,
}

impl VolatilityEstimator {
    pub fn new(window_size: usize) -> Self {
        assert!(window_size >= 2, "window_size must allow at least one return");
        Self {
            window_size,
            prices: VecDeque::with_capacity(window_size),
            returns: VecDeque::with_capacity(window_size - 1),
        }
    }

    /// Ingest the latest mid price. Non-positive prices are rejected and
    /// silently skipped (the caller is expected to have already dropped
    /// degenerate quotes; this is a second line of defense).
    pub fn update(&mut self, price: f64) {
        if !(price > 0.0) || !price.is_finite() {
            return;
        }

        if let Some(&prev) = self.prices.back() {
            let ratio = price / prev;
            if ratio.is_finite() && ratio > 0.0 {
                let log_return = ratio.ln();
                if log_return.is_finite() {
                    if self.returns.len() >= self.window_size - 1 {
                        self.returns.pop_front();
                    }
                    self.returns.push_back(log_return);
                }
            }
        }

        if self.prices.len() >= self.window_size {
            self.prices.pop_front();
        }
        self.prices.push_back(price);
    }

    /// Current volatility estimate: `sqrt(mean(r^2) - mean(r)^2)` over the
    /// current log-return window, or `0` with fewer than two returns.
    pub fn volatility(&self) -> f64 {
        let n = self.returns.len();
        if n == 0 {
            return 0.0;
        }
        let mean = self.returns.iter().sum::<f64>() / n as f64;
        let mean_sq = self.returns.iter().map(|r| r * r).sum::<f64>() / n as f64;
        let variance = mean_sq - mean * mean;
        if variance.is_finite() && variance > 0.0 {
            variance.sqrt()
        } else {
            0.0
        }
    }

    pub fn observation_count(&self) -> usize {
        self.prices.len()
    }
}
