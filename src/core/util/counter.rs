use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Atomic RAM-usage counter shared between a `DocumentsWriterPerThread` and
/// the block pools it owns (§4.3 "RAM usage is tracked by an atomic
/// counter"). Cloning yields a handle over the *same* atomic cell, mirroring
/// the teacher's `Counter::shallow_copy`.
#[derive(Debug)]
pub struct Counter {
    inner: Arc<AtomicI64>,
}

impl Counter {
    pub fn new(_thread_safe: bool) -> Self {
        Counter {
            inner: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn get(&self) -> i64 {
        self.inner.load(Ordering::Acquire)
    }

    pub fn add_get(&self, delta: i64) -> i64 {
        self.inner.fetch_add(delta, Ordering::AcqRel) + delta
    }

    /// Returns a handle sharing the same underlying atomic cell. Named
    /// `unsafe` in the teacher because the Java original relied on raw
    /// aliasing; here it is a plain, safe `Arc` clone.
    pub fn shallow_copy(&self) -> Counter {
        Counter {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Clone for Counter {
    fn clone(&self) -> Self {
        self.shallow_copy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_counter_observes_updates() {
        let c = Counter::new(true);
        let c2 = c.shallow_copy();
        c.add_get(100);
        c2.add_get(-30);
        assert_eq!(c.get(), 70);
        assert_eq!(c2.get(), 70);
    }
}
