//! Read-copy-update holder for the live price book
//!
//! Readers take a cheap `Arc` clone of the current book and never observe a
//! half-written cycle. The single writer swaps in a complete new book.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::domain::PriceBook;

pub struct PublishedBook {
    current: RwLock<Arc<PriceBook>>,
}

impl PublishedBook {
    pub fn new(book: PriceBook) -> Self {
        Self {
            current: RwLock::new(Arc::new(book)),
        }
    }

    /// Snapshot of the latest committed book
    pub fn load(&self) -> Arc<PriceBook> {
        Arc::clone(&self.current.read())
    }

    /// Replace the live book in one step
    pub fn publish(&self, book: PriceBook) -> Arc<PriceBook> {
        let book = Arc::new(book);
        *self.current.write() = Arc::clone(&book);
        book
    }
}
