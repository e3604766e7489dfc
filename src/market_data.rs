//! Market-data handler: the producer-side ingress (spec.md §4.3) and the
//! consumer worker thread that drains it.
//!
//! `on_quote` is the hot-path entry point: it must never block, so a full
//! queue simply drops the quote and counts it rather than applying
//! backpressure to whatever feed thread called in. The consumer thread
//! applies every quote it pops to the book registry and then, if the
//! symbol's market-making parameters are configured, asks the market maker
//! to requote.

use crate::market_maker::MarketMaker;
use crate::orderbook::BookRegistry;
use crate::queue::SpscQueue;
use crate::types::Quote;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{info, warn};

/// Owns the quote queue, the book registry, and the consumer thread that
/// wires one to the other (and onward to the market maker).
pub struct MarketDataHandler {
    queue: Arc<SpscQueue<Quote>>,
    books: Arc<BookRegistry>,
    market_maker: Arc<MarketMaker>,
    shutdown: Arc<AtomicBool>,
    worker: std::sync::Mutex<Option<JoinHandle<()>>>,
    dropped: Arc<AtomicU64>,
}

impl MarketDataHandler {
    pub fn new(books: Arc<BookRegistry>, market_maker: Arc<MarketMaker>) -> Self {
        Self::with_capacity(4096, books, market_maker)
    }

    pub fn with_capacity(capacity: usize, books: Arc<BookRegistry>, market_maker: Arc<MarketMaker>) -> Self {
        Self {
            queue: Arc::new(SpscQueue::with_capacity(capacity)),
            books,
            market_maker,
            shutdown: Arc::new(AtomicBool::new(false)),
            worker: std::sync::Mutex::new(None),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Non-blocking ingress: enqueue a quote for the consumer thread. Drops
    /// and counts it if the queue is full (spec.md §4.3: feed threads are
    /// never blocked by a slow consumer).
    pub fn on_quote(&self, quote: Quote) {
        if self.queue.push(quote).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!("market data queue full, dropping quote");
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn start(&self) {
        let mut worker = self.worker.lock().unwrap();
        if worker.is_some() {
            return;
        }
        self.shutdown.store(false, Ordering::Release);
        let queue = self.queue.clone();
        let books = self.books.clone();
        let market_maker = self.market_maker.clone();
        let shutdown = self.shutdown.clone();
        info!("market data worker starting");
        *worker = Some(thread::spawn(move || {
            run_consumer(queue, books, market_maker, shutdown);
        }));
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
        info!("market data worker stopped");
    }
}

fn run_consumer(
    queue: Arc<SpscQueue<Quote>>,
    books: Arc<BookRegistry>,
    market_maker: Arc<MarketMaker>,
    shutdown: Arc<AtomicBool>,
) {
    let mut spins = 0u32;
    loop {
        match queue.pop() {
            Ok(quote) => {
                spins = 0;
                let symbol = quote.symbol.clone();
                books.update(quote.clone());
                market_maker.update_quotes(&symbol, &quote);
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

fn idle(spins: &mut u32) {
    const SPIN_LIMIT: u32 = 64;
    if *spins < SPIN_LIMIT {
        *spins += 1;
        std::hint::spin_loop();
    } else {
        thread::sleep(Duration::from_millis(1));
    }
}
