//! Order book registry: per-symbol top-of-book state, updated from quotes.
//!
//! Only the top-of-book is consumed by the core pipeline (spec.md §4.3);
//! level vectors are out of scope. `update` replaces a symbol's quote
//! atomically; `top` returns a consistent snapshot, so a reader never observes
//! a partially-updated quote, because each symbol's slot is guarded by its
//! own lock rather than one lock over the whole registry (spec.md §5:
//! "each order book's top-of-book" is one of the three mutex-protected
//! regions).

use crate::symbol::Symbol;
use crate::types::Quote;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Registry of per-symbol top-of-book state.
#[derive(Default)]
pub struct BookRegistry {
    books: RwLock<HashMap<Symbol, RwLock<Quote>>>,
}

impl BookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the top-of-book for `quote.symbol`. Creates the symbol's slot
    /// lazily on first observation (spec.md §3: "created lazily on first
    /// observation").
    pub fn update(&self, quote: Quote) {
        // Fast path: symbol already registered, only a read lock needed on
        // the outer map.
        {
            let books = self.books.read();
            if let Some(slot) = books.get(&quote.symbol) {
                *slot.write() = quote;
                return;
            }
        }
        // Slow path: insert a new per-symbol slot.
        let mut books = self.books.write();
        books
            .entry(quote.symbol.clone())
            .or_insert_with(|| RwLock::new(quote.clone()));
        // In case of a race where another thread inserted first, make sure
        // the stored quote is still the latest one we were asked to apply.
        if let Some(slot) = books.get(&quote.symbol) {
            *slot.write() = quote;
        }
    }

    /// Snapshot the current top-of-book for `symbol`, if known.
    pub fn top(&self, symbol: &Symbol) -> Option<Quote> {
        let books = self.books.read();
        books.get(symbol).map(|slot| slot.read().clone())
    }
}
